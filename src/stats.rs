/// Transmit/loss tally for one ping session.
///
/// `received` is derived, never stored, so the accounting identity
/// `received + lost == transmitted` holds by construction.
#[derive(Debug, Default, Clone)]
pub struct Stats {
    transmitted: u64,
    lost: u64,
    rtts: Vec<f64>,
}

impl Stats {
    pub fn record_sent(&mut self) {
        self.transmitted += 1;
    }

    pub fn record_lost(&mut self) {
        self.lost += 1;
    }

    pub fn record_rtt(&mut self, rtt_ms: f64) {
        self.rtts.push(rtt_ms);
    }

    pub fn transmitted(&self) -> u64 {
        self.transmitted
    }

    pub fn received(&self) -> u64 {
        self.transmitted.saturating_sub(self.lost)
    }

    /// Loss percentage; 0.0 when nothing was transmitted.
    pub fn loss_percent(&self) -> f64 {
        if self.transmitted == 0 {
            0.0
        } else {
            self.lost as f64 / self.transmitted as f64 * 100.0
        }
    }

    /// Min/avg/max over the recorded round-trip times, if any.
    pub fn rtt_summary(&self) -> Option<(f64, f64, f64)> {
        if self.rtts.is_empty() {
            return None;
        }
        let min = self.rtts.iter().fold(f64::INFINITY, |a, &b| a.min(b));
        let max = self.rtts.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
        let avg = self.rtts.iter().sum::<f64>() / self.rtts.len() as f64;
        Some((min, avg, max))
    }

    /// Renders the closing summary lines.
    pub fn summary(&self, destination: &str) -> String {
        let mut out = format!(
            "--- {} ping statistics ---\n{} packets transmitted, {} packets received, {:.1}% packet loss",
            destination,
            self.transmitted,
            self.received(),
            self.loss_percent()
        );
        if let Some((min, avg, max)) = self.rtt_summary() {
            out.push_str(&format!(
                "\nround-trip min/avg/max = {min:.3}/{avg:.3}/{max:.3} ms"
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accounting_identity() {
        let mut stats = Stats::default();
        for _ in 0..5 {
            stats.record_sent();
        }
        stats.record_lost();
        stats.record_lost();
        assert_eq!(5, stats.transmitted());
        assert_eq!(3, stats.received());
        assert_eq!(stats.transmitted(), stats.received() + 2);
        assert!((stats.loss_percent() - 40.0).abs() < f64::EPSILON);
    }

    #[test]
    fn zero_transmitted_does_not_divide() {
        let stats = Stats::default();
        assert_eq!(0.0, stats.loss_percent());
        assert!(stats.summary("127.0.0.1").contains("0 packets transmitted"));
    }

    #[test]
    fn all_lost_session() {
        let mut stats = Stats::default();
        stats.record_sent();
        stats.record_sent();
        stats.record_lost();
        stats.record_lost();
        assert!(
            stats
                .summary("203.0.113.1")
                .contains("2 packets transmitted, 0 packets received, 100.0% packet loss")
        );
    }

    #[test]
    fn rtt_summary_folds_min_avg_max() {
        let mut stats = Stats::default();
        for rtt in [4.0, 1.0, 7.0] {
            stats.record_rtt(rtt);
        }
        let (min, avg, max) = stats.rtt_summary().unwrap();
        assert_eq!(1.0, min);
        assert_eq!(4.0, avg);
        assert_eq!(7.0, max);
        assert!(Stats::default().rtt_summary().is_none());
    }
}
