pub mod config;
pub mod error;
pub mod logging;
pub mod raw;
pub mod registry;
pub mod system;

#[cfg(target_os = "linux")]
pub mod gateway;

pub use ipcap_proto::{parse_ipv4, Ipv4Datagram, ParseError, TransportProtocol};
