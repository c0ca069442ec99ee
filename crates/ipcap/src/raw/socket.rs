use std::fmt;
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};

use ipcap_core::sys::SocketFd;
use ipcap_proto::TransportProtocol;
use tracing::debug;

use crate::error::ErrorSink;
use crate::raw::stream::CaptureStream;
use crate::raw::{AddressFamily, SocketSpec};

/// A kernel raw socket bound to one (family, protocol) pair.
///
/// The descriptor is closed when this is dropped, or when the reader task
/// started by [`read_stream`](Self::read_stream) exits.
pub struct RawCaptureSocket {
    fd: SocketFd,
    spec: SocketSpec,
}

impl RawCaptureSocket {
    /// Open a raw socket with `IP_HDRINCL` set.
    pub fn open(family: AddressFamily, protocol: TransportProtocol) -> io::Result<Self> {
        let fd = SocketFd::open_raw(family.as_raw(), protocol.number() as i32)?;
        debug!(fd = fd.as_raw_fd(), %family, %protocol, "opened raw socket");
        Ok(Self { fd, spec: SocketSpec::new(family, protocol) })
    }

    pub fn spec(&self) -> SocketSpec {
        self.spec
    }

    pub fn family(&self) -> AddressFamily {
        self.spec.family
    }

    pub fn protocol(&self) -> TransportProtocol {
        self.spec.protocol
    }

    pub(crate) fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.fd.recv(buf)
    }

    /// Start the background reader. Each received datagram lands on a
    /// bounded queue of `queue_depth` buffers of at most `buffer_size` bytes;
    /// receive errors go to `errors`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn read_stream(self, queue_depth: usize, buffer_size: usize, errors: ErrorSink) -> io::Result<CaptureStream> {
        CaptureStream::spawn(self, queue_depth, buffer_size, errors)
    }
}

impl AsRawFd for RawCaptureSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl fmt::Debug for RawCaptureSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawCaptureSocket")
            .field("fd", &self.fd.as_raw_fd())
            .field("spec", &self.spec)
            .finish()
    }
}

impl Drop for RawCaptureSocket {
    fn drop(&mut self) {
        if let Err(e) = self.fd.shutdown() {
            debug!(fd = self.fd.as_raw_fd(), error = %e, "raw socket shutdown failed");
        }
        debug!(fd = self.fd.as_raw_fd(), socket = %self.spec, "closing raw socket");
    }
}
