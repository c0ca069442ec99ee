pub mod fd;
pub mod socket;

pub use fd::SocketFd;
