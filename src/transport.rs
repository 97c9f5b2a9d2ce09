use crate::error::{Error, Result};
use nix::errno::Errno;
use nix::sys::select::{FdSet, select};
use nix::sys::time::{TimeVal, TimeValLike};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::os::fd::AsFd;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// One inbound datagram: raw length, source address and arrival instant.
#[derive(Debug, Clone, Copy)]
pub struct Inbound {
    pub len: usize,
    pub from: Ipv4Addr,
    pub received_at: Instant,
}

/// A raw ICMPv4 socket, scoped to a single probe (ping) or a single TTL
/// level (traceroute). Closed on drop, on every exit path.
pub struct RawIcmpSocket {
    inner: Socket,
}

impl RawIcmpSocket {
    /// Opens a raw ICMP-protocol socket. Requires elevated privileges.
    pub fn open() -> Result<Self> {
        let inner = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4))
            .map_err(classify_open_error)?;
        debug!("raw ICMP socket opened");
        Ok(Self { inner })
    }

    /// Applies the IP-level TTL option; must precede every send when the
    /// TTL varies per probe.
    pub fn set_ttl(&self, ttl: u8) -> Result<()> {
        self.inner.set_ttl_v4(u32::from(ttl))?;
        Ok(())
    }

    /// Transmits `packet` to the already-resolved destination.
    pub fn send_to(&self, dest: Ipv4Addr, packet: &[u8]) -> Result<()> {
        let addr = SockAddr::from(SocketAddr::new(IpAddr::V4(dest), 0));
        trace!(%dest, len = packet.len(), "sendto");
        self.inner
            .send_to(packet, &addr)
            .map_err(Error::SendFailed)?;
        Ok(())
    }

    /// Waits up to `timeout` for an inbound datagram and reads it into
    /// `buf`, recording the arrival instant immediately after the read.
    /// Returns `None` when nothing became readable within the window.
    pub fn await_reply(&self, timeout: Duration, buf: &mut [u8]) -> Result<Option<Inbound>> {
        if !self.is_readable(timeout)? {
            return Ok(None);
        }
        let (len, addr) = self.recv_from_into_buf(buf)?;
        let received_at = Instant::now();
        let from = match addr.map(|a| a.ip()) {
            Some(IpAddr::V4(v4)) => v4,
            // Raw ICMPv4 sockets always report a v4 peer.
            _ => Ipv4Addr::UNSPECIFIED,
        };
        trace!(%from, len, "inbound datagram");
        Ok(Some(Inbound {
            len,
            from,
            received_at,
        }))
    }

    fn is_readable(&self, timeout: Duration) -> Result<bool> {
        let mut read = FdSet::new();
        read.insert(self.inner.as_fd());
        let readable = select(
            None,
            Some(&mut read),
            None,
            None,
            Some(&mut TimeVal::milliseconds(timeout.as_millis() as i64)),
        );
        match readable {
            Ok(readable) => Ok(readable == 1),
            Err(Errno::EINTR) => Ok(false),
            Err(err) => Err(Error::Io(io::Error::from(err))),
        }
    }

    // `socket2::Socket::recv_from` only accepts `&mut [MaybeUninit<u8>]`;
    // see https://github.com/rust-lang/socket2/issues/223.
    //
    // Safety: `recv` promises not to write uninitialised bytes into the
    // buffer, so viewing the initialised buffer as `MaybeUninit` is sound.
    fn recv_from_into_buf(&self, buf: &mut [u8]) -> io::Result<(usize, Option<SocketAddr>)> {
        let uninit = unsafe {
            &mut *(std::ptr::from_mut::<[u8]>(buf) as *mut [std::mem::MaybeUninit<u8>])
        };
        self.inner
            .recv_from(uninit)
            .map(|(len, addr)| (len, addr.as_socket()))
    }
}

fn classify_open_error(err: io::Error) -> Error {
    if err.kind() == io::ErrorKind::PermissionDenied {
        Error::PermissionDenied(err)
    } else if err.raw_os_error() == Some(libc::EPROTONOSUPPORT) {
        Error::ProtocolUnavailable(err)
    } else {
        Error::Io(err)
    }
}
