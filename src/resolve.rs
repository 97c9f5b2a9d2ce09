use crate::error::{Error, Result};
use std::net::{IpAddr, Ipv4Addr};
use tracing::debug;

/// Resolves a host name (or dotted quad) to an IPv4 address via the system
/// resolver. Resolution is not retried; a failure is fatal at startup.
pub fn resolve_ipv4(host: &str) -> Result<Ipv4Addr> {
    let addrs =
        dns_lookup::lookup_host(host).map_err(|_| Error::Resolution(host.to_string()))?;
    let addr = addrs
        .into_iter()
        .find_map(|ip| match ip {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(_) => None,
        })
        .ok_or_else(|| Error::Resolution(host.to_string()))?;
    debug!(host, %addr, "resolved");
    Ok(addr)
}

/// Reverse-resolves an address to a display name, falling back to the
/// numeric form when the resolver has no name for it.
pub fn reverse_lookup(addr: Ipv4Addr) -> String {
    dns_lookup::lookup_addr(&IpAddr::V4(addr)).unwrap_or_else(|_| addr.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_dotted_quad() {
        assert_eq!(Ipv4Addr::LOCALHOST, resolve_ipv4("127.0.0.1").unwrap());
    }

    #[test]
    fn unknown_host_is_fatal() {
        let err = resolve_ipv4("host.invalid.").unwrap_err();
        assert!(matches!(err, Error::Resolution(_)));
    }
}
