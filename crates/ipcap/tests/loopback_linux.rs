#[cfg(target_os = "linux")]
mod linux_loopback {
    use ipcap::config::{CaptureConfig, ConfigStore, IPV4_PACKET_CHANNEL_SIZE};
    use ipcap::gateway::CaptureGateway;
    use ipcap::registry::{Gateway, GatewayKind, InterfaceRegistry};
    use ipcap::TransportProtocol;
    use std::net::{Ipv4Addr, UdpSocket};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    const MARKER: &[u8] = b"ipcap loopback marker";

    fn open_or_skip(config: CaptureConfig) -> Option<CaptureGateway> {
        match CaptureGateway::open(config) {
            Ok(gateway) => Some(gateway),
            Err(e) if e.is_permission_denied() => {
                eprintln!("Skipping: raw sockets need root/CAP_NET_RAW ({e})");
                None
            }
            Err(e) => panic!("Failed to open gateway: {e}"),
        }
    }

    #[tokio::test]
    async fn test_udp_on_loopback_is_captured() {
        let store = ConfigStore::new();
        store.set(IPV4_PACKET_CHANNEL_SIZE, 16i64);
        let config = CaptureConfig::from_store(&store).expect("config");
        assert_eq!(config.queue_depth, 16);

        let Some(gateway) = open_or_skip(config) else {
            return;
        };

        let (errors, _error_rx) = mpsc::unbounded_channel();
        let (handle, packets) = gateway.listen(errors).expect("listen");

        let (found_tx, mut found_rx) = mpsc::unbounded_channel();
        let run = tokio::spawn(packets.run(move |datagram| {
            if datagram.transport() == TransportProtocol::Udp
                && datagram.destination_address() == Ipv4Addr::LOCALHOST
                && datagram.data().windows(MARKER.len()).any(|w| w == MARKER)
            {
                let _ = found_tx.send((datagram.is_valid(), datagram.header_len()));
            }
        }));

        let receiver = UdpSocket::bind("127.0.0.1:0").expect("bind receiver");
        let sender = UdpSocket::bind("127.0.0.1:0").expect("bind sender");
        let target = receiver.local_addr().expect("receiver addr");

        // Keep sending until the capture side has seen one
        let found = timeout(Duration::from_secs(5), async {
            loop {
                sender.send_to(MARKER, target).expect("send");
                tokio::select! {
                    found = found_rx.recv() => break found,
                    _ = tokio::time::sleep(Duration::from_millis(50)) => {}
                }
            }
        })
        .await
        .expect("marker datagram captured");

        let (valid, header_len) = found.expect("handler alive");
        assert!(valid, "kernel-built header must carry a valid checksum");
        assert_eq!(header_len, 20);

        handle.close();
        let stats = timeout(Duration::from_secs(5), run)
            .await
            .expect("stream drained")
            .expect("run task");
        assert!(stats.dispatched >= 1);
        assert_eq!(stats.received, stats.dispatched + stats.malformed);
    }

    #[tokio::test]
    async fn test_running_gateway_registers_by_name() {
        let Some(gateway) = open_or_skip(CaptureConfig::default().interface_name("gn3")) else {
            return;
        };

        let (errors, _error_rx) = mpsc::unbounded_channel();
        let (handle, packets) = gateway.listen(errors).expect("listen");

        let registry = InterfaceRegistry::new();
        registry.add(Arc::new(handle.clone())).expect("register");
        assert!(registry.add(Arc::new(handle.clone())).is_err());

        let registered = registry.get("gn3").expect("registered");
        assert_eq!(registered.kind(), GatewayKind::Raw);
        assert_eq!(registered.info().mtu, 15 * 1024);

        handle.close();
        timeout(Duration::from_secs(5), packets.run(|_| {}))
            .await
            .expect("stream drained");
        registry.remove("gn3").expect("unregister");
    }
}
