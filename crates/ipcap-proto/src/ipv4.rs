use std::fmt;
use std::net::Ipv4Addr;

use thiserror::Error;

use crate::checksum::{finalize, sum16};
use crate::protocol::TransportProtocol;

/// Size of the fixed part of the header, i.e. IHL 5.
pub const IPV4_MIN_HEADER_LEN: usize = 20;
/// IHL is four bits of 32-bit words.
pub const IPV4_MAX_HEADER_LEN: usize = 60;

const CHECKSUM_OFFSET: usize = 10;

// Type-of-service bits, RFC 791 layout (precedence in the top three bits).
pub const LOW_DELAY: u8 = 1 << 4;
pub const HIGH_THROUGHPUT: u8 = 1 << 3;
pub const HIGH_RELIABILITY: u8 = 1 << 2;

// Values of the three-bit flags field.
pub const MORE_FRAGMENTS: u8 = 1 << 0;
pub const DONT_FRAGMENT: u8 = 1 << 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Buffer too short for IPv4 header: {len} of {needed} bytes")]
    TooShort { len: usize, needed: usize },

    #[error("Invalid IPv4 header length: IHL {ihl} is below the 5-word minimum")]
    BadHeaderLength { ihl: u8 },
}

/// RFC 791 precedence, the top three bits of the type-of-service byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    Routine = 0,
    Priority = 1,
    Immediate = 2,
    Flash = 3,
    FlashOverride = 4,
    CriticEcp = 5,
    InternetworkControl = 6,
    NetworkControl = 7,
}

impl Precedence {
    pub fn from_tos(tos: u8) -> Self {
        match tos >> 5 {
            0 => Precedence::Routine,
            1 => Precedence::Priority,
            2 => Precedence::Immediate,
            3 => Precedence::Flash,
            4 => Precedence::FlashOverride,
            5 => Precedence::CriticEcp,
            6 => Precedence::InternetworkControl,
            _ => Precedence::NetworkControl,
        }
    }

    /// The precedence bits in place within the type-of-service byte.
    pub fn mask(&self) -> u8 {
        (*self as u8) << 5
    }
}

/// A zero-copy view of one IPv4 datagram.
///
/// The view borrows the receive buffer; every accessor reads straight from
/// the header bytes in network order.
#[derive(Clone, Copy)]
pub struct Ipv4Datagram<'a> {
    header: &'a [u8],
    data: &'a [u8],
}

impl<'a> Ipv4Datagram<'a> {
    pub fn header(&self) -> &'a [u8] {
        self.header
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn header_len(&self) -> usize {
        self.header.len()
    }

    pub fn version(&self) -> u8 {
        self.header[0] >> 4
    }

    pub fn ihl(&self) -> u8 {
        self.header[0] & 0x0F
    }

    pub fn type_of_service(&self) -> u8 {
        self.header[1]
    }

    /// Differentiated services code point (RFC 2474).
    pub fn dscp(&self) -> u8 {
        self.header[1] >> 2
    }

    /// Explicit congestion notification (RFC 3168).
    pub fn ecn(&self) -> u8 {
        self.header[1] & 0x03
    }

    pub fn precedence(&self) -> Precedence {
        Precedence::from_tos(self.header[1])
    }

    pub fn total_length(&self) -> u16 {
        u16::from_be_bytes([self.header[2], self.header[3]])
    }

    pub fn identification(&self) -> u16 {
        u16::from_be_bytes([self.header[4], self.header[5]])
    }

    pub fn flags(&self) -> u8 {
        self.header[6] >> 5
    }

    pub fn dont_fragment(&self) -> bool {
        self.flags() & DONT_FRAGMENT != 0
    }

    pub fn more_fragments(&self) -> bool {
        self.flags() & MORE_FRAGMENTS != 0
    }

    /// Offset in 8-byte units, 13 bits.
    pub fn fragment_offset(&self) -> u16 {
        u16::from_be_bytes([self.header[6] & 0x1F, self.header[7]])
    }

    pub fn time_to_live(&self) -> u8 {
        self.header[8]
    }

    pub fn protocol(&self) -> u8 {
        self.header[9]
    }

    pub fn transport(&self) -> TransportProtocol {
        TransportProtocol::from(self.protocol())
    }

    pub fn header_checksum(&self) -> u16 {
        u16::from_be_bytes([self.header[CHECKSUM_OFFSET], self.header[CHECKSUM_OFFSET + 1]])
    }

    pub fn source_address(&self) -> Ipv4Addr {
        Ipv4Addr::new(self.header[12], self.header[13], self.header[14], self.header[15])
    }

    pub fn destination_address(&self) -> Ipv4Addr {
        Ipv4Addr::new(self.header[16], self.header[17], self.header[18], self.header[19])
    }

    /// Header bytes past the fixed 20, empty for IHL 5.
    pub fn options(&self) -> &'a [u8] {
        &self.header[IPV4_MIN_HEADER_LEN..]
    }

    /// Checksum the header should carry, computed as if its checksum field
    /// were zero.
    pub fn calculate_checksum(&self) -> u16 {
        let sum = sum16(&self.header[..CHECKSUM_OFFSET], 0);
        finalize(sum16(&self.header[CHECKSUM_OFFSET + 2..], sum))
    }

    /// True when the header, stored checksum included, sums to zero.
    pub fn is_valid(&self) -> bool {
        finalize(sum16(self.header, 0)) == 0
    }
}

impl fmt::Debug for Ipv4Datagram<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ipv4Datagram")
            .field("src", &self.source_address())
            .field("dst", &self.destination_address())
            .field("protocol", &self.transport())
            .field("header_len", &self.header_len())
            .field("data_len", &self.data.len())
            .finish()
    }
}

impl fmt::Display for Ipv4Datagram<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Packet {{")?;
        writeln!(f, "\tVersion: {}", self.version())?;
        writeln!(f, "\tIHL: {}", self.ihl())?;
        writeln!(f, "\tTypeOfService: {:#04x}", self.type_of_service())?;
        writeln!(f, "\tTotalLength: {}", self.total_length())?;
        writeln!(f, "\tIdentification: {}", self.identification())?;
        writeln!(f, "\tFlags: {:#05b}", self.flags())?;
        writeln!(f, "\tFragmentOffset: {}", self.fragment_offset())?;
        writeln!(f, "\tTimeToLive: {}", self.time_to_live())?;
        writeln!(f, "\tProtocol: {}", self.transport())?;
        writeln!(f, "\tHeaderChecksum: {:#06x}", self.header_checksum())?;
        writeln!(f, "\tSourceAddress: {}", self.source_address())?;
        writeln!(f, "\tDestinationAddress: {}", self.destination_address())?;
        writeln!(f, "\tOptions: {:02x?}", self.options())?;
        write!(f, "}}")
    }
}

/// Split `data` into an IPv4 header and payload without copying.
pub fn parse_ipv4(data: &[u8]) -> Result<Ipv4Datagram<'_>, ParseError> {
    if data.len() < IPV4_MIN_HEADER_LEN {
        return Err(ParseError::TooShort { len: data.len(), needed: IPV4_MIN_HEADER_LEN });
    }

    let ihl = data[0] & 0x0F;
    let header_len = (ihl as usize) * 4;
    if header_len < IPV4_MIN_HEADER_LEN {
        return Err(ParseError::BadHeaderLength { ihl });
    }
    if data.len() < header_len {
        return Err(ParseError::TooShort { len: data.len(), needed: header_len });
    }

    let (header, payload) = data.split_at(header_len);
    Ok(Ipv4Datagram { header, data: payload })
}
