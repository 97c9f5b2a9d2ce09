//! End-to-end probes over real raw sockets.
//!
//! Raw ICMP sockets need elevated privileges, so these are ignored by
//! default; run them with `sudo -E cargo test -- --ignored`.

use icmptool::CancelToken;
use icmptool::hop::{HopDiscovery, TraceConfig};
use icmptool::session::{PingConfig, PingSession, ProbeReport};
use std::net::Ipv4Addr;
use std::time::Duration;

#[test]
#[ignore = "requires raw socket privilege"]
fn loopback_ping_replies_to_every_probe() {
    let config = PingConfig {
        count: Some(3),
        interval: Duration::ZERO,
        ..PingConfig::default()
    };
    let mut session = PingSession::new("127.0.0.1", config).unwrap();
    let mut replies = Vec::new();
    let stats = session
        .run_with(&CancelToken::new(), |report| {
            if let ProbeReport::Reply(reply) = report {
                replies.push(*reply);
            }
        })
        .unwrap();

    assert_eq!(3, stats.transmitted());
    assert_eq!(3, stats.received());
    assert_eq!(0.0, stats.loss_percent());
    assert_eq!(3, replies.len());
    for reply in &replies {
        assert!(reply.ttl >= 1);
        assert!(reply.rtt_ms >= 0.0);
        assert_eq!(Ipv4Addr::LOCALHOST, reply.from);
    }
    // Sequence increments per probe.
    let sequences: Vec<u16> = replies.iter().map(|r| r.sequence).collect();
    assert_eq!(vec![0, 1, 2], sequences);
}

#[test]
#[ignore = "requires raw socket privilege and a default route"]
fn blackhole_ping_loses_every_probe() {
    // TEST-NET-3 (RFC 5737): routable towards the gateway, never answered.
    let config = PingConfig {
        count: Some(2),
        interval: Duration::ZERO,
        ..PingConfig::default()
    };
    let mut session = PingSession::new("203.0.113.1", config).unwrap();
    let mut timeouts = 0;
    let stats = session
        .run_with(&CancelToken::new(), |report| {
            if matches!(report, ProbeReport::Timeout { .. }) {
                timeouts += 1;
            }
        })
        .unwrap();

    assert_eq!(2, stats.transmitted());
    assert_eq!(0, stats.received());
    assert_eq!(100.0, stats.loss_percent());
    assert_eq!(2, timeouts);
}

#[test]
#[ignore = "requires raw socket privilege"]
fn loopback_traceroute_terminates_at_first_hop() {
    let mut discovery = HopDiscovery::new("127.0.0.1", TraceConfig::default()).unwrap();
    let mut rows = Vec::new();
    discovery
        .run_with(&CancelToken::new(), |hop| rows.push(hop.clone()))
        .unwrap();

    assert_eq!(1, rows.len());
    assert_eq!(1, rows[0].ttl);
    assert!(rows[0].reached(Ipv4Addr::LOCALHOST));
}
