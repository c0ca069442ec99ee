use std::io;

use ipcap_proto::{ParseError, TransportProtocol};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::warn;

use crate::config::ConfigError;
use crate::raw::AddressFamily;

/// Sending half of the per-packet error channel. Unbounded, so the receiver
/// must be drained while capture runs; a dropped receiver falls back to logging.
pub type ErrorSink = mpsc::UnboundedSender<CaptureError>;

/// Non-fatal, per-packet failure. Reported on an [`ErrorSink`]; capture
/// carries on.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Malformed datagram: {0}")]
    Parse(#[from] ParseError),

    #[error("Receive failed on {protocol} socket: {source}")]
    Recv {
        protocol: TransportProtocol,
        #[source]
        source: io::Error,
    },
}

/// Failure to bring a gateway up. Nothing stays open when this is returned.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Failed to open raw socket ({family}, {protocol}): {source}")]
    Open {
        family: AddressFamily,
        protocol: TransportProtocol,
        #[source]
        source: io::Error,
    },

    #[error("IO Error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

impl GatewayError {
    /// Raw sockets need CAP_NET_RAW.
    pub fn is_permission_denied(&self) -> bool {
        match self {
            GatewayError::Open { source, .. } | GatewayError::Io(source) => {
                source.kind() == io::ErrorKind::PermissionDenied
            }
            GatewayError::Config(_) => false,
        }
    }
}

/// Push `err` onto `sink`, falling back to the log when nobody is listening.
pub(crate) fn report(sink: &ErrorSink, err: CaptureError) {
    if let Err(mpsc::error::SendError(err)) = sink.send(err) {
        warn!(error = %err, "error sink closed, dropping capture error");
    }
}
