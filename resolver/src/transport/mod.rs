pub mod socks;
pub mod tcp;
pub mod udp;

pub use socks::{Credentials, SocksError};
pub use tcp::{TcpState, TcpTransport};
pub use udp::{SendOutcome, UdpTransport};
