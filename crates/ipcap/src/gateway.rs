//! The raw-socket gateway: the full socket set for one logical interface.

use std::fmt;
use std::sync::Arc;

use ipcap_proto::TransportProtocol;
use tracing::{debug, info, warn};

use crate::config::CaptureConfig;
use crate::error::{ErrorSink, GatewayError};
use crate::raw::{open_batch, AddressFamily, CaptureStream, RawCaptureSocket, SocketCloser, SocketSpec};
use crate::registry::{Gateway, GatewayKind, InterfaceInfo};
use crate::system::PacketStream;

pub const GATEWAY_INDEX: u32 = 0;
pub const GATEWAY_MTU: u32 = 15 * 1024;
pub const GATEWAY_HARDWARE_ADDR: [u8; 6] = [0x01, 0x23, 0x45, 0x67, 0x89, 0xab];

/// An opened gateway. Holds one inject socket `(AF_INET, IPPROTO_RAW)` and
/// one capture socket per configured (family, protocol) pair.
///
/// Either every socket is open or the gateway does not exist.
pub struct CaptureGateway {
    info: InterfaceInfo,
    config: CaptureConfig,
    inject: RawCaptureSocket,
    sockets: Vec<RawCaptureSocket>,
}

impl CaptureGateway {
    /// Open the whole socket set. On failure every socket opened so far is
    /// closed before the error is returned.
    pub fn open(config: CaptureConfig) -> Result<Self, GatewayError> {
        config.validate()?;

        let inject = RawCaptureSocket::open(AddressFamily::Inet, TransportProtocol::Raw).map_err(|source| {
            GatewayError::Open {
                family: AddressFamily::Inet,
                protocol: TransportProtocol::Raw,
                source,
            }
        })?;

        // `inject` drops with the error path below
        let sockets = open_batch(&config.socket_specs(), |spec| {
            RawCaptureSocket::open(spec.family, spec.protocol)
        })?;

        let info = InterfaceInfo {
            index: GATEWAY_INDEX,
            mtu: GATEWAY_MTU,
            name: config.interface_name.clone(),
            hardware_addr: GATEWAY_HARDWARE_ADDR,
            up: true,
        };

        info!(
            interface = %info.name,
            sockets = sockets.len() + 1,
            queue_depth = config.queue_depth,
            "gateway opened"
        );

        Ok(Self { info, config, inject, sockets })
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Capture sockets, in configuration order.
    pub fn sockets(&self) -> &[RawCaptureSocket] {
        &self.sockets
    }

    pub fn inject_socket(&self) -> &RawCaptureSocket {
        &self.inject
    }

    pub fn specs(&self) -> Vec<SocketSpec> {
        self.sockets.iter().map(|s| s.spec()).collect()
    }

    /// Start a reader per capture socket and merge them.
    ///
    /// The returned [`PacketStream`] yields until [`CaptureHandle::close`] is
    /// called or every clone of the handle is dropped. Must be called from
    /// within a Tokio runtime.
    ///
    /// `errors` is unbounded: keep draining its receiver for as long as the
    /// capture runs, or drop the receiver to have errors logged instead.
    pub fn listen(self, errors: ErrorSink) -> Result<(CaptureHandle, PacketStream), GatewayError> {
        let Self { info, config, inject, sockets } = self;

        let mut specs = Vec::with_capacity(sockets.len());
        let mut closers: Vec<SocketCloser> = Vec::with_capacity(sockets.len());
        let mut queues = Vec::with_capacity(sockets.len());

        for socket in sockets {
            let spec = socket.spec();
            let stream: CaptureStream =
                match socket.read_stream(config.queue_depth, config.recv_buffer_size, errors.clone()) {
                    Ok(stream) => stream,
                    Err(e) => {
                        warn!(socket = %spec, error = %e, "failed to start capture, closing started streams");
                        closers.iter().for_each(SocketCloser::close);
                        return Err(GatewayError::Io(e));
                    }
                };
            let (packets, closer, _task) = stream.into_parts();
            specs.push(spec);
            closers.push(closer);
            queues.push(packets);
        }

        debug!(interface = %info.name, streams = queues.len(), "gateway listening");

        let handle = CaptureHandle {
            inner: Arc::new(HandleInner { info, specs, closers, _inject: inject }),
        };
        Ok((handle, PacketStream::merge(queues, errors)))
    }
}

impl Gateway for CaptureGateway {
    fn info(&self) -> &InterfaceInfo {
        &self.info
    }

    fn kind(&self) -> GatewayKind {
        GatewayKind::Raw
    }
}

impl fmt::Debug for CaptureGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureGateway")
            .field("info", &self.info)
            .field("inject", &self.inject)
            .field("sockets", &self.sockets)
            .finish()
    }
}

struct HandleInner {
    info: InterfaceInfo,
    specs: Vec<SocketSpec>,
    closers: Vec<SocketCloser>,
    _inject: RawCaptureSocket,
}

/// A running gateway. Cloning shares the same capture.
#[derive(Clone)]
pub struct CaptureHandle {
    inner: Arc<HandleInner>,
}

impl CaptureHandle {
    /// Signal every capture stream. The packet stream drains and ends.
    pub fn close(&self) {
        for closer in &self.inner.closers {
            closer.close();
        }
        info!(interface = %self.inner.info.name, "capture closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closers.iter().all(SocketCloser::is_closed)
    }

    pub fn specs(&self) -> &[SocketSpec] {
        &self.inner.specs
    }
}

impl Gateway for CaptureHandle {
    fn info(&self) -> &InterfaceInfo {
        &self.inner.info
    }

    fn kind(&self) -> GatewayKind {
        GatewayKind::Raw
    }
}

impl fmt::Debug for CaptureHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureHandle")
            .field("interface", &self.inner.info.name)
            .field("specs", &self.inner.specs)
            .field("closed", &self.is_closed())
            .finish()
    }
}
