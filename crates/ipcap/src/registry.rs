use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayKind {
    Uninitialized,
    /// Backed by kernel raw sockets.
    Raw,
    /// Backed by an in-process device.
    Virtual,
}

impl fmt::Display for GatewayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GatewayKind::Uninitialized => "Uninitialized",
            GatewayKind::Raw => "Raw",
            GatewayKind::Virtual => "Virtual",
        };
        f.write_str(name)
    }
}

/// Link-level description a gateway presents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceInfo {
    pub index: u32,
    pub mtu: u32,
    pub name: String,
    pub hardware_addr: [u8; 6],
    pub up: bool,
}

impl InterfaceInfo {
    pub fn hardware_addr_string(&self) -> String {
        self.hardware_addr
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<Vec<_>>()
            .join(":")
    }
}

/// A named source of captured traffic.
pub trait Gateway: Send + Sync {
    fn info(&self) -> &InterfaceInfo;

    fn kind(&self) -> GatewayKind;

    fn name(&self) -> &str {
        &self.info().name
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Interface '{0}' already registered")]
    AlreadyExists(String),

    #[error("Interface '{0}' not found")]
    NotFound(String),
}

/// Gateways by name.
#[derive(Default)]
pub struct InterfaceRegistry {
    gateways: RwLock<HashMap<String, Arc<dyn Gateway>>>,
}

impl InterfaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, gateway: Arc<dyn Gateway>) -> Result<(), RegistryError> {
        let name = gateway.name().to_string();
        let mut gateways = self.gateways.write();
        if gateways.contains_key(&name) {
            return Err(RegistryError::AlreadyExists(name));
        }
        info!(interface = %name, kind = %gateway.kind(), "interface registered");
        gateways.insert(name, gateway);
        Ok(())
    }

    pub fn remove(&self, name: &str) -> Result<Arc<dyn Gateway>, RegistryError> {
        let removed = self
            .gateways
            .write()
            .remove(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        info!(interface = %name, "interface removed");
        Ok(removed)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Gateway>> {
        self.gateways.read().get(name).cloned()
    }

    /// Every registered gateway, ordered by name.
    pub fn list(&self) -> Vec<Arc<dyn Gateway>> {
        let gateways = self.gateways.read();
        let mut list: Vec<_> = gateways.values().cloned().collect();
        list.sort_by(|a, b| a.name().cmp(b.name()));
        list
    }

    pub fn len(&self) -> usize {
        self.gateways.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.gateways.read().is_empty()
    }
}

impl fmt::Debug for InterfaceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let gateways = self.gateways.read();
        let mut names: Vec<_> = gateways.keys().collect();
        names.sort();
        f.debug_struct("InterfaceRegistry").field("interfaces", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct VirtualGateway {
        info: InterfaceInfo,
    }

    impl VirtualGateway {
        fn new(name: &str) -> Arc<dyn Gateway> {
            Arc::new(Self {
                info: InterfaceInfo {
                    index: 1,
                    mtu: 1500,
                    name: name.to_string(),
                    hardware_addr: [0x02, 0, 0, 0, 0, 0x01],
                    up: true,
                },
            })
        }
    }

    impl Gateway for VirtualGateway {
        fn info(&self) -> &InterfaceInfo {
            &self.info
        }

        fn kind(&self) -> GatewayKind {
            GatewayKind::Virtual
        }
    }

    #[test]
    fn test_add_get_remove() {
        let registry = InterfaceRegistry::new();
        registry.add(VirtualGateway::new("vn0")).unwrap();

        let gateway = registry.get("vn0").expect("registered");
        assert_eq!(gateway.name(), "vn0");
        assert_eq!(gateway.kind(), GatewayKind::Virtual);
        assert!(registry.get("vn1").is_none());

        let removed = registry.remove("vn0").unwrap();
        assert_eq!(removed.name(), "vn0");
        assert!(registry.is_empty());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let registry = InterfaceRegistry::new();
        registry.add(VirtualGateway::new("vn0")).unwrap();
        assert_eq!(
            registry.add(VirtualGateway::new("vn0")).unwrap_err(),
            RegistryError::AlreadyExists("vn0".into())
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_missing() {
        let registry = InterfaceRegistry::new();
        assert_eq!(registry.remove("gn0").err(), Some(RegistryError::NotFound("gn0".into())));
    }

    #[test]
    fn test_list_is_sorted() {
        let registry = InterfaceRegistry::new();
        for name in ["vn2", "vn0", "vn1"] {
            registry.add(VirtualGateway::new(name)).unwrap();
        }
        let names: Vec<String> = registry.list().iter().map(|g| g.name().to_string()).collect();
        assert_eq!(names, ["vn0", "vn1", "vn2"]);
        assert_eq!(format!("{:?}", registry), r#"InterfaceRegistry { interfaces: ["vn0", "vn1", "vn2"] }"#);
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(GatewayKind::Uninitialized.to_string(), "Uninitialized");
        assert_eq!(GatewayKind::Raw.to_string(), "Raw");
        assert_eq!(GatewayKind::Virtual.to_string(), "Virtual");
    }

    #[test]
    fn test_hardware_addr_string() {
        let info = InterfaceInfo {
            index: 0,
            mtu: 15 * 1024,
            name: "gn0".into(),
            hardware_addr: [0x01, 0x23, 0x45, 0x67, 0x89, 0xab],
            up: true,
        };
        assert_eq!(info.hardware_addr_string(), "01:23:45:67:89:ab");
    }
}
