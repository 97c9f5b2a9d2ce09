use std::io;
use thiserror::Error;

/// A probe engine result.
pub type Result<T> = std::result::Result<T, Error>;

/// A probe engine error.
///
/// Fatal variants terminate the invocation before or during the first probe;
/// everything recoverable (timeouts, later send failures, foreign packets)
/// is modelled as an outcome by the callers, not as an error.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid count of packets to transmit: {0}")]
    InvalidCount(i64),
    #[error("cannot resolve {0}: Unknown host")]
    Resolution(String),
    #[error("raw ICMP socket requires elevated privileges: {0}")]
    PermissionDenied(#[source] io::Error),
    #[error("ICMP protocol unavailable: {0}")]
    ProtocolUnavailable(#[source] io::Error),
    #[error("sendto: {0}")]
    SendFailed(#[source] io::Error),
    #[error("malformed packet: {0} bytes")]
    MalformedPacket(usize),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}
