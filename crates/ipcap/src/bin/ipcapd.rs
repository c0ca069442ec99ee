#[cfg(target_os = "linux")]
#[tokio::main]
async fn main() {
    use std::process;
    use std::sync::Arc;

    use ipcap::config::{CaptureConfig, ConfigStore};
    use ipcap::gateway::CaptureGateway;
    use ipcap::logging::init_logging;
    use ipcap::registry::{Gateway, InterfaceRegistry};
    use tokio::sync::mpsc;
    use tracing::{debug, error, info, trace, warn};

    let level = std::env::args().nth(1).unwrap_or_else(|| "info".to_string());
    init_logging(&level);

    let store = ConfigStore::new();
    let overrides = store.merge_env("IPCAP_");
    let config = match CaptureConfig::from_store(&store) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, overrides, "invalid configuration");
            process::exit(2);
        }
    };

    let gateway = match CaptureGateway::open(config) {
        Ok(gateway) => gateway,
        Err(e) => {
            if e.is_permission_denied() {
                error!(error = %e, "raw sockets need CAP_NET_RAW");
            } else {
                error!(error = %e, "failed to open gateway");
            }
            process::exit(1);
        }
    };

    let (errors, mut error_rx) = mpsc::unbounded_channel();
    let (handle, packets) = match gateway.listen(errors) {
        Ok(listening) => listening,
        Err(e) => {
            error!(error = %e, "failed to start capture");
            process::exit(1);
        }
    };

    let registry = InterfaceRegistry::new();
    if let Err(e) = registry.add(Arc::new(handle.clone())) {
        error!(error = %e, "failed to register gateway");
        process::exit(1);
    }

    tokio::spawn(async move {
        while let Some(e) = error_rx.recv().await {
            warn!(error = %e, "capture error");
        }
    });

    let stopper = handle.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("interrupt received, stopping capture"),
            Err(e) => warn!(error = %e, "cannot listen for ctrl-c, stopping capture"),
        }
        stopper.close();
    });

    info!(interface = %handle.name(), sockets = ?handle.specs(), "capturing");

    let stats = packets
        .run(|datagram| {
            debug!(
                src = %datagram.source_address(),
                dst = %datagram.destination_address(),
                protocol = %datagram.transport(),
                len = datagram.total_length(),
                valid = datagram.is_valid(),
                "datagram"
            );
            trace!("{}", datagram);
        })
        .await;

    if let Err(e) = registry.remove(handle.name()) {
        warn!(error = %e, "gateway already unregistered");
    }
    info!(
        received = stats.received,
        dispatched = stats.dispatched,
        malformed = stats.malformed,
        "capture finished"
    );
}

#[cfg(not(target_os = "linux"))]
fn main() {
    eprintln!("ipcapd requires Linux raw sockets");
    std::process::exit(1);
}
