pub mod checksum;
pub mod ipv4;
pub mod protocol;

pub use checksum::{checksum, finalize, sum16};
pub use ipv4::{parse_ipv4, Ipv4Datagram, ParseError, Precedence};
pub use protocol::TransportProtocol;
