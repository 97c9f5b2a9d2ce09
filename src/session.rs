use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::packet::{self, IP_HEADER_LEN};
use crate::resolve;
use crate::stats::Stats;
use crate::transport::RawIcmpSocket;
use std::net::Ipv4Addr;
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default echo payload size in bytes.
pub const DEFAULT_PAYLOAD_SIZE: usize = 56;

/// Outbound TTL for echo probes; only traceroute varies it.
const PING_TTL: u8 = 255;
/// Per-probe reply window.
const REPLY_WINDOW: Duration = Duration::from_secs(2);
const RECV_BUF_LEN: usize = 1024;

/// Ping session configuration.
#[derive(Debug, Clone)]
pub struct PingConfig {
    /// Number of probes; `None` is unbounded. Validated positive.
    pub count: Option<i64>,
    /// Pause between probes.
    pub interval: Duration,
    /// Overall session deadline; `None` is unbounded.
    pub deadline: Option<Duration>,
    pub payload_size: usize,
}

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            count: None,
            interval: Duration::from_secs(1),
            deadline: None,
            payload_size: DEFAULT_PAYLOAD_SIZE,
        }
    }
}

/// A correlated reply to one probe.
#[derive(Debug, Clone, Copy)]
pub struct ProbeReply {
    pub sequence: u16,
    pub rtt_ms: f64,
    pub ttl: u8,
    pub from: Ipv4Addr,
    /// ICMP bytes received (IP header stripped).
    pub icmp_len: usize,
}

/// Per-probe report delivered to the observer callback.
#[derive(Debug, Clone, Copy)]
pub enum ProbeReport {
    Reply(ProbeReply),
    Timeout { sequence: u16 },
    SendFailed { sequence: u16 },
}

enum ProbeOutcome {
    Reply(ProbeReply),
    TimedOut,
    SendFailed,
    Interrupted,
}

/// One ping invocation: sequential send/await/record probes against a
/// single destination, with loss accounting and a closing summary.
#[derive(Debug)]
pub struct PingSession {
    dest_name: String,
    dest: Ipv4Addr,
    config: PingConfig,
    identifier: u16,
    sequence: u16,
    stats: Stats,
}

impl PingSession {
    /// Validates the configuration and resolves the destination. Both
    /// failures are fatal before any probe is sent.
    pub fn new(destination: &str, config: PingConfig) -> Result<Self> {
        if let Some(count) = config.count {
            if count <= 0 {
                return Err(Error::InvalidCount(count));
            }
        }
        let dest = resolve::resolve_ipv4(destination)?;
        Ok(Self {
            dest_name: destination.to_string(),
            dest,
            config,
            identifier: std::process::id() as u16,
            sequence: 0,
            stats: Stats::default(),
        })
    }

    pub fn destination(&self) -> Ipv4Addr {
        self.dest
    }

    /// Runs the session to completion, interrupt or fatal error.
    pub fn run(&mut self, cancel: &CancelToken) -> Result<Stats> {
        self.run_with(cancel, |_| {})
    }

    /// Runs the session, handing each probe report to `observer` as well as
    /// printing it.
    pub fn run_with(
        &mut self,
        cancel: &CancelToken,
        mut observer: impl FnMut(&ProbeReport),
    ) -> Result<Stats> {
        println!(
            "PING {} ({}): {} data bytes",
            self.dest_name, self.dest, self.config.payload_size
        );
        let started = Instant::now();
        let count = self.config.count.map(|c| c as u64);
        let mut iterations: u64 = 0;
        loop {
            if cancel.is_cancelled() {
                break;
            }
            let sequence = self.sequence;
            let report = match self.probe_once(iterations == 0, cancel)? {
                ProbeOutcome::Reply(reply) => {
                    println!(
                        "{} bytes from {}: icmp_seq={} ttl={} time={:.3} ms",
                        reply.icmp_len, reply.from, reply.sequence, reply.ttl, reply.rtt_ms
                    );
                    self.stats.record_rtt(reply.rtt_ms);
                    Some(ProbeReport::Reply(reply))
                }
                ProbeOutcome::TimedOut => {
                    println!("Request timeout for icmp_seq {sequence}");
                    self.stats.record_lost();
                    Some(ProbeReport::Timeout { sequence })
                }
                ProbeOutcome::SendFailed => {
                    self.stats.record_lost();
                    Some(ProbeReport::SendFailed { sequence })
                }
                // The aborted probe got no reply; keep the accounting
                // identity without printing a timeout notice.
                ProbeOutcome::Interrupted => {
                    self.stats.record_lost();
                    None
                }
            };
            if let Some(report) = &report {
                observer(report);
            }
            self.sequence = self.sequence.wrapping_add(1);
            iterations += 1;

            // Termination checks, in order: count, deadline, interrupt.
            if count.is_some_and(|limit| iterations >= limit) {
                break;
            }
            if self
                .config
                .deadline
                .is_some_and(|deadline| started.elapsed() >= deadline)
            {
                break;
            }
            if cancel.is_cancelled() {
                break;
            }
            thread::sleep(self.config.interval);
        }
        println!("{}", self.stats.summary(&self.dest_name));
        Ok(self.stats.clone())
    }

    fn probe_once(&mut self, first: bool, cancel: &CancelToken) -> Result<ProbeOutcome> {
        // Fresh socket per probe; dropped on every exit path below.
        let socket = RawIcmpSocket::open()?;
        socket.set_ttl(PING_TTL)?;
        let request =
            packet::build_echo_request(self.identifier, self.sequence, self.config.payload_size);
        self.stats.record_sent();
        let sent_at = Instant::now();
        if let Err(err) = socket.send_to(self.dest, &request) {
            // The very first failed send is indistinguishable from an
            // unreachable host and is fatal; later ones count as loss.
            if first {
                return Err(err);
            }
            println!("ping: {err}");
            println!("Request timeout for icmp_seq {}", self.sequence);
            debug!(sequence = self.sequence, "send failed");
            return Ok(ProbeOutcome::SendFailed);
        }
        self.await_correlated(&socket, sent_at, cancel)
    }

    /// Waits out the reply window, skipping malformed and foreign packets
    /// on the remaining time.
    fn await_correlated(
        &self,
        socket: &RawIcmpSocket,
        sent_at: Instant,
        cancel: &CancelToken,
    ) -> Result<ProbeOutcome> {
        let deadline = sent_at + REPLY_WINDOW;
        let mut buf = [0u8; RECV_BUF_LEN];
        loop {
            if cancel.is_cancelled() {
                return Ok(ProbeOutcome::Interrupted);
            }
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                debug!(sequence = self.sequence, "reply window elapsed");
                return Ok(ProbeOutcome::TimedOut);
            };
            let Some(inbound) = socket.await_reply(remaining, &mut buf)? else {
                continue;
            };
            match packet::parse_reply(&buf[..inbound.len]) {
                // Not ours; keep waiting on the remaining window.
                Err(_) => continue,
                Ok(reply) if reply.matches(self.identifier) => {
                    let rtt_ms =
                        inbound.received_at.duration_since(sent_at).as_secs_f64() * 1000.0;
                    return Ok(ProbeOutcome::Reply(ProbeReply {
                        sequence: reply.sequence,
                        rtt_ms,
                        ttl: reply.ttl,
                        from: inbound.from,
                        icmp_len: inbound.len.saturating_sub(IP_HEADER_LEN),
                    }));
                }
                Ok(_) => continue,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = PingConfig::default();
        assert_eq!(None, config.count);
        assert_eq!(Duration::from_secs(1), config.interval);
        assert_eq!(None, config.deadline);
        assert_eq!(DEFAULT_PAYLOAD_SIZE, config.payload_size);
    }

    #[test]
    fn non_positive_count_is_fatal() {
        for count in [0, -3] {
            let config = PingConfig {
                count: Some(count),
                ..PingConfig::default()
            };
            let err = PingSession::new("127.0.0.1", config).unwrap_err();
            assert!(matches!(err, Error::InvalidCount(c) if c == count));
        }
    }

    #[test]
    fn positive_count_resolves() {
        let config = PingConfig {
            count: Some(3),
            ..PingConfig::default()
        };
        let session = PingSession::new("127.0.0.1", config).unwrap();
        assert_eq!(Ipv4Addr::LOCALHOST, session.destination());
    }
}
