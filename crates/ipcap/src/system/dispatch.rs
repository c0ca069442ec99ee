use ipcap_proto::{parse_ipv4, Ipv4Datagram};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::error::{report, CaptureError, ErrorSink};
use crate::system::mux::{merge, Completion};

/// Counters returned when a [`PacketStream`] runs dry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Buffers pulled off the merged stream.
    pub received: usize,
    /// Buffers that parsed and reached the handler.
    pub dispatched: usize,
    /// Buffers rejected by the parser and reported on the error sink.
    pub malformed: usize,
}

/// The consumer end of a capture: one merged stream of raw buffers, parsed
/// one at a time and handed to a callback.
#[derive(Debug)]
pub struct PacketStream {
    packets: mpsc::Receiver<Vec<u8>>,
    completion: Completion,
    errors: ErrorSink,
}

impl PacketStream {
    /// Merge per-socket queues into one stream. Must be called from within a
    /// Tokio runtime.
    pub fn merge(streams: Vec<mpsc::Receiver<Vec<u8>>>, errors: ErrorSink) -> Self {
        let (packets, completion) = merge(streams);
        Self { packets, completion, errors }
    }

    /// Parse every buffer and call `handler` with the datagram view. Parse
    /// failures go to the error sink and the loop continues. Returns once
    /// every source has closed.
    pub async fn run<F>(mut self, mut handler: F) -> DispatchStats
    where
        F: FnMut(&Ipv4Datagram<'_>),
    {
        let mut stats = DispatchStats::default();

        while let Some(buf) = self.packets.recv().await {
            stats.received += 1;
            match parse_ipv4(&buf) {
                Ok(datagram) => {
                    trace!(
                        src = %datagram.source_address(),
                        dst = %datagram.destination_address(),
                        protocol = %datagram.transport(),
                        len = buf.len(),
                        "datagram parsed"
                    );
                    stats.dispatched += 1;
                    handler(&datagram);
                }
                Err(e) => {
                    stats.malformed += 1;
                    report(&self.errors, CaptureError::Parse(e));
                }
            }
        }

        match self.completion.wait().await {
            Ok(forwarded) => debug!(forwarded, ?stats, "packet stream drained"),
            Err(e) => warn!(error = %e, ?stats, "merge barrier failed"),
        }
        stats
    }
}
