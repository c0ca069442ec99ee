use std::io;
pub use std::os::unix::io::RawFd;
use std::mem;
use libc::{
    socket, setsockopt, recv, shutdown, close,
    SOCK_RAW, SOCK_NONBLOCK, SOCK_CLOEXEC, IPPROTO_IP, IP_HDRINCL, SHUT_RDWR, ENOTCONN,
    c_int, c_void, socklen_t,
};

/// Open a non-blocking `SOCK_RAW` socket for `family`/`protocol`.
pub fn create_raw_socket(family: c_int, protocol: c_int) -> io::Result<RawFd> {
    let fd = unsafe { socket(family, SOCK_RAW | SOCK_NONBLOCK | SOCK_CLOEXEC, protocol) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(fd)
}

/// Toggle `IP_HDRINCL`: outgoing datagrams carry a caller-built IP header.
pub fn set_header_included(fd: RawFd, on: bool) -> io::Result<()> {
    let value: c_int = on as c_int;
    let ret = unsafe {
        setsockopt(fd, IPPROTO_IP, IP_HDRINCL, &value as *const _ as *const c_void, mem::size_of::<c_int>() as socklen_t)
    };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Read one datagram into `buf`. Returns the number of bytes copied, which is
/// less than the datagram size if `buf` was too small.
pub fn recv_datagram(fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
    let ret = unsafe { recv(fd, buf.as_mut_ptr() as *mut c_void, buf.len(), 0) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(ret as usize)
}

/// Shut down both directions. Wakes any reader parked on the socket.
pub fn shutdown_socket(fd: RawFd) -> io::Result<()> {
    let ret = unsafe { shutdown(fd, SHUT_RDWR) };
    if ret < 0 {
        let err = io::Error::last_os_error();
        // Raw sockets are never connected; the shutdown flag is still applied.
        if err.raw_os_error() != Some(ENOTCONN) {
            return Err(err);
        }
    }
    Ok(())
}

pub fn close_socket(fd: RawFd) -> io::Result<()> {
    let ret = unsafe { close(fd) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
