use crate::cancel::CancelToken;
use crate::error::Result;
use crate::packet::{self, ECHO_REPLY, TIME_EXCEEDED};
use crate::resolve;
use crate::transport::RawIcmpSocket;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};
use tracing::debug;

/// Hop ceiling for the TTL sweep.
pub const MAX_HOPS: u8 = 64;
/// Fixed echo payload size for hop probes.
pub const TRACE_PAYLOAD_SIZE: usize = 52;

const REPLY_WINDOW: Duration = Duration::from_secs(2);
const RECV_BUF_LEN: usize = 512;

/// Traceroute configuration.
#[derive(Debug, Clone)]
pub struct TraceConfig {
    /// Probes per hop.
    pub queries: usize,
    /// Print numeric addresses, suppressing reverse lookup.
    pub numeric: bool,
    /// Annotate rows with the per-hop loss percentage.
    pub show_loss: bool,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            queries: 3,
            numeric: false,
            show_loss: false,
        }
    }
}

/// Outcome of a single hop probe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HopProbe {
    Reply { rtt_ms: f64, from: Ipv4Addr },
    TimedOut,
    SendFailed,
}

/// One TTL value's record: the ordered per-probe outcomes. Consumed to
/// render a single row; only the responder survives for the stop check.
#[derive(Debug, Clone)]
pub struct Hop {
    pub ttl: u8,
    pub probes: Vec<HopProbe>,
}

impl Hop {
    /// The hop's responder: the source of the last reply, if any.
    pub fn responder(&self) -> Option<Ipv4Addr> {
        self.probes
            .iter()
            .rev()
            .find_map(|probe| match probe {
                HopProbe::Reply { from, .. } => Some(*from),
                _ => None,
            })
    }

    pub fn reached(&self, destination: Ipv4Addr) -> bool {
        self.responder() == Some(destination)
    }

    fn timeouts(&self) -> usize {
        self.probes
            .iter()
            .filter(|p| matches!(p, HopProbe::TimedOut))
            .count()
    }

    fn send_failures(&self) -> usize {
        self.probes
            .iter()
            .filter(|p| matches!(p, HopProbe::SendFailed))
            .count()
    }
}

fn loss_percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

/// Renders one hop row.
///
/// Any send failure yields a loss line regardless of the other probes;
/// a fully timed-out hop yields an asterisk row; otherwise the responder
/// identity and the per-probe RTTs, with `*` cells for timeouts. Loss
/// annotations are emitted only with `show_loss`, except for send
/// failures where the loss line is unconditional.
fn format_row(hop: &Hop, identity: &str, config: &TraceConfig, dest_name: &str) -> String {
    let total = hop.probes.len();
    if hop.send_failures() > 0 {
        return format!(
            "traceroute: wrote {} {} chars, ret=-1 ({:.1}% loss)",
            dest_name,
            TRACE_PAYLOAD_SIZE,
            loss_percent(hop.send_failures(), total)
        );
    }
    let cells: Vec<String> = hop
        .probes
        .iter()
        .map(|probe| match probe {
            HopProbe::Reply { rtt_ms, .. } => format!("{rtt_ms:.2} ms"),
            _ => "*".to_string(),
        })
        .collect();
    let mut row = if hop.timeouts() == total {
        format!("{:2}  {}", hop.ttl, cells.join("  "))
    } else {
        format!("{:2}  {}  {}", hop.ttl, identity, cells.join("  "))
    };
    if config.show_loss {
        row.push_str(&format!(
            " ({:.1}% loss)",
            loss_percent(hop.timeouts(), total)
        ));
    }
    row
}

/// One traceroute invocation: sweeps the TTL from 1 upward until the
/// destination answers or the hop ceiling is reached.
pub struct HopDiscovery {
    dest_name: String,
    dest: Ipv4Addr,
    config: TraceConfig,
    identifier: u16,
    sequence: u16,
}

impl HopDiscovery {
    /// Resolves the destination; failure is fatal before any probe.
    pub fn new(destination: &str, config: TraceConfig) -> Result<Self> {
        let dest = resolve::resolve_ipv4(destination)?;
        Ok(Self {
            dest_name: destination.to_string(),
            dest,
            config,
            identifier: std::process::id() as u16,
            sequence: 0,
        })
    }

    pub fn destination(&self) -> Ipv4Addr {
        self.dest
    }

    pub fn run(&mut self, cancel: &CancelToken) -> Result<()> {
        self.run_with(cancel, |_| {})
    }

    /// Runs the sweep, handing each completed hop to `observer` as well as
    /// printing its row. An interrupt halts immediately with no summary.
    pub fn run_with(
        &mut self,
        cancel: &CancelToken,
        mut observer: impl FnMut(&Hop),
    ) -> Result<()> {
        println!(
            "traceroute to {} ({}), {} hops max, {} byte packets",
            self.dest_name, self.dest, MAX_HOPS, TRACE_PAYLOAD_SIZE
        );
        for ttl in 1..=MAX_HOPS {
            if cancel.is_cancelled() {
                break;
            }
            let hop = self.probe_hop(ttl, cancel)?;
            if cancel.is_cancelled() {
                // Partial hops from a mid-row interrupt are discarded.
                break;
            }
            let identity = match hop.responder() {
                Some(addr) if self.config.numeric => addr.to_string(),
                Some(addr) => format!("{} ({})", resolve::reverse_lookup(addr), addr),
                None => String::new(),
            };
            println!(
                "{}",
                format_row(&hop, &identity, &self.config, &self.dest_name)
            );
            observer(&hop);
            if hop.reached(self.dest) {
                debug!(ttl, "destination reached");
                break;
            }
        }
        Ok(())
    }

    fn probe_hop(&mut self, ttl: u8, cancel: &CancelToken) -> Result<Hop> {
        // One socket per TTL level, shared by this hop's probes and
        // dropped when the hop completes.
        let socket = RawIcmpSocket::open()?;
        socket.set_ttl(ttl)?;
        let mut probes = Vec::with_capacity(self.config.queries);
        for _ in 0..self.config.queries {
            if cancel.is_cancelled() {
                break;
            }
            probes.push(self.probe_once(&socket, cancel)?);
        }
        Ok(Hop { ttl, probes })
    }

    fn probe_once(&mut self, socket: &RawIcmpSocket, cancel: &CancelToken) -> Result<HopProbe> {
        let request =
            packet::build_echo_request(self.identifier, self.sequence, TRACE_PAYLOAD_SIZE);
        self.sequence = self.sequence.wrapping_add(1);
        let sent_at = Instant::now();
        if let Err(err) = socket.send_to(self.dest, &request) {
            // Send failures are recorded, never fatal, first probe included.
            println!("* traceroute: {err}");
            return Ok(HopProbe::SendFailed);
        }
        let deadline = sent_at + REPLY_WINDOW;
        let mut buf = [0u8; RECV_BUF_LEN];
        loop {
            if cancel.is_cancelled() {
                return Ok(HopProbe::TimedOut);
            }
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return Ok(HopProbe::TimedOut);
            };
            let Some(inbound) = socket.await_reply(remaining, &mut buf)? else {
                continue;
            };
            match packet::parse_reply(&buf[..inbound.len]) {
                // Not an ICMP answer; keep waiting on the remaining window.
                Err(_) => continue,
                Ok(reply)
                    if reply.icmp_type == ECHO_REPLY || reply.icmp_type == TIME_EXCEEDED =>
                {
                    let rtt_ms =
                        inbound.received_at.duration_since(sent_at).as_secs_f64() * 1000.0;
                    return Ok(HopProbe::Reply {
                        rtt_ms,
                        from: inbound.from,
                    });
                }
                Ok(_) => continue,
            }
        }
    }
}
