use std::io;
use std::os::unix::io::{AsRawFd, RawFd};

use tracing::warn;

use crate::sys::socket::{close_socket, create_raw_socket, recv_datagram, set_header_included, shutdown_socket};

/// An owned raw socket descriptor.
/// Implements Drop to close the descriptor.
#[derive(Debug)]
pub struct SocketFd {
    fd: RawFd,
}

impl SocketFd {
    /// Open a raw socket with `IP_HDRINCL` set. The descriptor is closed again
    /// if the option cannot be applied.
    pub fn open_raw(family: i32, protocol: i32) -> io::Result<Self> {
        let socket = Self { fd: create_raw_socket(family, protocol)? };
        set_header_included(socket.fd, true)?;
        Ok(socket)
    }

    /// Take ownership of an open descriptor.
    /// SAFETY: `fd` must be open and not owned by anything else.
    #[cfg(test)]
    pub(crate) unsafe fn from_raw(fd: RawFd) -> Self {
        Self { fd }
    }

    pub fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        recv_datagram(self.fd, buf)
    }

    pub fn shutdown(&self) -> io::Result<()> {
        shutdown_socket(self.fd)
    }
}

impl AsRawFd for SocketFd {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl Drop for SocketFd {
    fn drop(&mut self) {
        if let Err(e) = close_socket(self.fd) {
            warn!(fd = self.fd, error = %e, "failed to close raw socket");
        }
    }
}
