use std::fmt;

pub const IPPROTO_ICMP: u8 = 1;
pub const IPPROTO_TCP: u8 = 6;
pub const IPPROTO_UDP: u8 = 17;
pub const IPPROTO_RAW: u8 = 255;

/// Value of the IPv4 protocol byte, as far as capture cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportProtocol {
    Icmp,
    Tcp,
    Udp,
    Raw,
    Other(u8),
}

impl TransportProtocol {
    pub fn number(&self) -> u8 {
        match self {
            TransportProtocol::Icmp => IPPROTO_ICMP,
            TransportProtocol::Tcp => IPPROTO_TCP,
            TransportProtocol::Udp => IPPROTO_UDP,
            TransportProtocol::Raw => IPPROTO_RAW,
            TransportProtocol::Other(n) => *n,
        }
    }
}

impl From<u8> for TransportProtocol {
    fn from(value: u8) -> Self {
        match value {
            IPPROTO_ICMP => TransportProtocol::Icmp,
            IPPROTO_TCP => TransportProtocol::Tcp,
            IPPROTO_UDP => TransportProtocol::Udp,
            IPPROTO_RAW => TransportProtocol::Raw,
            n => TransportProtocol::Other(n),
        }
    }
}

impl fmt::Display for TransportProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportProtocol::Icmp => "ICMP",
            TransportProtocol::Tcp => "TCP",
            TransportProtocol::Udp => "UDP",
            TransportProtocol::Raw => "RAW",
            TransportProtocol::Other(_) => "UNKNOWN",
        };
        f.write_str(name)
    }
}
