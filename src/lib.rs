//! ICMP Echo probing over raw sockets: a latency prober (`ping`) and a
//! TTL-sweep hop discoverer (`traceroute`) sharing one probe engine.

pub mod cancel;
pub mod error;
pub mod hop;
pub mod packet;
pub mod resolve;
pub mod session;
pub mod stats;
pub mod transport;

pub use cancel::CancelToken;
pub use error::{Error, Result};
