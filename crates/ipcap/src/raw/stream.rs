use std::io;
use std::os::unix::io::AsRawFd;
use std::sync::Arc;

use tokio::io::unix::AsyncFd;
use tokio::io::Interest;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::error::{report, CaptureError, ErrorSink};
use crate::raw::socket::RawCaptureSocket;
use crate::raw::SocketSpec;

/// Something the capture reader can pull datagrams from.
pub trait DatagramSocket: AsRawFd + Send + Sync + 'static {
    fn spec(&self) -> SocketSpec;

    /// Non-blocking receive of one datagram.
    fn recv(&self, buf: &mut [u8]) -> io::Result<usize>;
}

impl DatagramSocket for RawCaptureSocket {
    fn spec(&self) -> SocketSpec {
        RawCaptureSocket::spec(self)
    }

    fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        RawCaptureSocket::recv(self, buf)
    }
}

/// Closes a [`CaptureStream`]'s socket from anywhere.
#[derive(Debug, Clone)]
pub struct SocketCloser {
    closed: Arc<watch::Sender<bool>>,
}

impl SocketCloser {
    pub fn close(&self) {
        self.closed.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

/// The receive side of one raw socket: a bounded queue of datagrams filled by
/// a background task that owns the socket.
///
/// The queue never ends on its own. After [`close`](Self::close) the task
/// drops the socket and the queue drains and closes.
#[derive(Debug)]
pub struct CaptureStream {
    spec: SocketSpec,
    packets: mpsc::Receiver<Vec<u8>>,
    closer: SocketCloser,
    task: JoinHandle<()>,
}

impl CaptureStream {
    /// Spawn the reader for `socket`. Must be called from within a Tokio runtime.
    pub fn spawn<S: DatagramSocket>(
        socket: S,
        queue_depth: usize,
        buffer_size: usize,
        errors: ErrorSink,
    ) -> io::Result<Self> {
        if queue_depth == 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "queue depth must be non-zero"));
        }

        let spec = socket.spec();
        let socket = AsyncFd::with_interest(socket, Interest::READABLE)?;
        let (tx, packets) = mpsc::channel(queue_depth);
        let (closed_tx, closed_rx) = watch::channel(false);

        let task = tokio::spawn(capture_loop(socket, buffer_size, tx, errors, closed_rx));
        debug!(socket = %spec, queue_depth, buffer_size, "capture stream started");

        Ok(Self {
            spec,
            packets,
            closer: SocketCloser { closed: Arc::new(closed_tx) },
            task,
        })
    }

    pub fn spec(&self) -> SocketSpec {
        self.spec
    }

    pub fn closer(&self) -> SocketCloser {
        self.closer.clone()
    }

    pub fn close(&self) {
        self.closer.close();
    }

    /// Next datagram, or `None` once the stream has been closed and drained.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.packets.recv().await
    }

    pub fn into_parts(self) -> (mpsc::Receiver<Vec<u8>>, SocketCloser, JoinHandle<()>) {
        (self.packets, self.closer, self.task)
    }
}

async fn capture_loop<S: DatagramSocket>(
    socket: AsyncFd<S>,
    buffer_size: usize,
    packets: mpsc::Sender<Vec<u8>>,
    errors: ErrorSink,
    mut closed: watch::Receiver<bool>,
) {
    let spec = socket.get_ref().spec();

    loop {
        let mut guard = tokio::select! {
            biased;
            _ = closed.changed() => break,
            ready = socket.readable() => match ready {
                Ok(guard) => guard,
                Err(e) => {
                    report(&errors, CaptureError::Recv { protocol: spec.protocol, source: e });
                    break;
                }
            },
        };

        let mut buf = vec![0u8; buffer_size];
        let n = match guard.try_io(|inner| inner.get_ref().recv(&mut buf)) {
            Ok(Ok(n)) => n,
            Ok(Err(e)) if e.kind() == io::ErrorKind::Interrupted => continue,
            Ok(Err(e)) => {
                report(&errors, CaptureError::Recv { protocol: spec.protocol, source: e });
                continue;
            }
            Err(_would_block) => continue,
        };
        drop(guard);
        buf.truncate(n);
        trace!(socket = %spec, len = n, "datagram received");

        // A full queue parks the reader here; closing must still get through.
        tokio::select! {
            biased;
            _ = closed.changed() => break,
            sent = packets.send(buf) => {
                if sent.is_err() {
                    debug!(socket = %spec, "capture queue receiver dropped");
                    break;
                }
            }
        }
    }

    debug!(socket = %spec, "capture stream closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::AddressFamily;
    use ipcap_proto::TransportProtocol;
    use std::os::unix::io::RawFd;
    use std::os::unix::net::UnixDatagram;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio::time::timeout;

    struct PairSocket {
        sock: UnixDatagram,
        fail_next: Arc<AtomicBool>,
    }

    impl AsRawFd for PairSocket {
        fn as_raw_fd(&self) -> RawFd {
            self.sock.as_raw_fd()
        }
    }

    impl DatagramSocket for PairSocket {
        fn spec(&self) -> SocketSpec {
            SocketSpec::new(AddressFamily::Inet, TransportProtocol::Udp)
        }

        fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(io::Error::from_raw_os_error(libc::ENOBUFS));
            }
            self.sock.recv(buf)
        }
    }

    fn pair() -> (PairSocket, UnixDatagram, Arc<AtomicBool>) {
        let (a, b) = UnixDatagram::pair().expect("socketpair");
        a.set_nonblocking(true).expect("nonblocking");
        let fail_next = Arc::new(AtomicBool::new(false));
        (PairSocket { sock: a, fail_next: fail_next.clone() }, b, fail_next)
    }

    const WAIT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_stream_preserves_order_and_length() {
        let (socket, peer, _) = pair();
        let (errors, _error_rx) = mpsc::unbounded_channel();
        let mut stream = CaptureStream::spawn(socket, 100, 1500, errors).expect("spawn");

        peer.send(&[1u8; 20]).unwrap();
        peer.send(&[2u8; 40]).unwrap();
        peer.send(&[3u8; 7]).unwrap();

        for (fill, len) in [(1u8, 20usize), (2, 40), (3, 7)] {
            let buf = timeout(WAIT, stream.recv()).await.expect("timely").expect("open");
            assert_eq!(buf.len(), len);
            assert!(buf.iter().all(|b| *b == fill));
        }
        stream.close();
    }

    #[tokio::test]
    async fn test_stream_truncates_to_buffer_size() {
        let (socket, peer, _) = pair();
        let (errors, _error_rx) = mpsc::unbounded_channel();
        let mut stream = CaptureStream::spawn(socket, 4, 8, errors).expect("spawn");

        peer.send(&[9u8; 32]).unwrap();
        let buf = timeout(WAIT, stream.recv()).await.expect("timely").expect("open");
        assert_eq!(buf, vec![9u8; 8]);
        stream.close();
    }

    #[tokio::test]
    async fn test_close_ends_stream_and_task() {
        let (socket, peer, _) = pair();
        let (errors, _error_rx) = mpsc::unbounded_channel();
        let stream = CaptureStream::spawn(socket, 4, 64, errors).expect("spawn");
        let closer = stream.closer();
        let (mut packets, _, task) = stream.into_parts();

        assert!(!closer.is_closed());
        closer.close();
        assert!(closer.is_closed());

        assert_eq!(timeout(WAIT, packets.recv()).await.expect("timely"), None);
        timeout(WAIT, task).await.expect("timely").expect("task ok");

        // The reader dropped its end of the pair
        assert!(peer.send(&[0u8; 4]).is_err());
    }

    #[tokio::test]
    async fn test_recv_error_is_reported_and_capture_continues() {
        let (socket, peer, fail_next) = pair();
        let (errors, mut error_rx) = mpsc::unbounded_channel();
        fail_next.store(true, Ordering::SeqCst);
        let mut stream = CaptureStream::spawn(socket, 4, 64, errors).expect("spawn");

        peer.send(&[5u8; 24]).unwrap();

        let err = timeout(WAIT, error_rx.recv()).await.expect("timely").expect("error");
        match err {
            CaptureError::Recv { protocol, source } => {
                assert_eq!(protocol, TransportProtocol::Udp);
                assert_eq!(source.raw_os_error(), Some(libc::ENOBUFS));
            }
            other => panic!("unexpected error: {other}"),
        }

        let buf = timeout(WAIT, stream.recv()).await.expect("timely").expect("open");
        assert_eq!(buf.len(), 24);
        stream.close();
    }

    #[tokio::test]
    async fn test_bounded_queue_loses_nothing() {
        let (socket, peer, _) = pair();
        let (errors, _error_rx) = mpsc::unbounded_channel();
        let mut stream = CaptureStream::spawn(socket, 2, 64, errors).expect("spawn");

        for i in 0..8u8 {
            peer.send(&[i; 20]).unwrap();
        }
        for i in 0..8u8 {
            let buf = timeout(WAIT, stream.recv()).await.expect("timely").expect("open");
            assert_eq!(buf[0], i);
        }
        stream.close();
    }

    #[tokio::test]
    async fn test_zero_queue_depth_rejected() {
        let (socket, _peer, _) = pair();
        let (errors, _error_rx) = mpsc::unbounded_channel();
        let err = CaptureStream::spawn(socket, 0, 64, errors).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
