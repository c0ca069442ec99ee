#[cfg(target_os = "linux")]
pub mod socket;
#[cfg(target_os = "linux")]
pub mod stream;

#[cfg(target_os = "linux")]
pub use socket::RawCaptureSocket;
#[cfg(target_os = "linux")]
pub use stream::{CaptureStream, SocketCloser};

use std::fmt;
use std::io;

use ipcap_proto::TransportProtocol;
use tracing::warn;

use crate::error::GatewayError;

/// Network-layer family a raw socket is opened in. Only IPv4 is captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    Inet,
}

impl AddressFamily {
    #[cfg(target_os = "linux")]
    pub fn as_raw(&self) -> i32 {
        match self {
            AddressFamily::Inet => libc::AF_INET,
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::Inet => f.write_str("AF_INET"),
        }
    }
}

/// One (family, protocol) cell of the capture matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SocketSpec {
    pub family: AddressFamily,
    pub protocol: TransportProtocol,
}

impl SocketSpec {
    pub fn new(family: AddressFamily, protocol: TransportProtocol) -> Self {
        Self { family, protocol }
    }
}

impl fmt::Display for SocketSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.family, self.protocol)
    }
}

/// Open one socket per spec, in order.
///
/// Sockets close on drop, so when an open fails everything already opened in
/// the batch is dropped (closed) before the error is returned.
pub fn open_batch<S, F>(specs: &[SocketSpec], mut open: F) -> Result<Vec<S>, GatewayError>
where
    F: FnMut(&SocketSpec) -> io::Result<S>,
{
    let mut opened = Vec::with_capacity(specs.len());
    for spec in specs {
        match open(spec) {
            Ok(socket) => opened.push(socket),
            Err(source) => {
                warn!(
                    socket = %spec,
                    rolled_back = opened.len(),
                    error = %source,
                    "raw socket open failed, closing batch"
                );
                drop(opened);
                return Err(GatewayError::Open {
                    family: spec.family,
                    protocol: spec.protocol,
                    source,
                });
            }
        }
    }
    Ok(opened)
}
