//! Capture configuration.
//!
//! [`ConfigStore`] is a typed key/value store shared by everything in the
//! process; [`CaptureConfig`] is the typed view the gateway is built from.

use std::collections::HashMap;

use ipcap_proto::TransportProtocol;
use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::raw::{AddressFamily, SocketSpec};

/// Depth of each per-socket datagram queue.
pub const IPV4_PACKET_CHANNEL_SIZE: &str = "ipv4_packet_channel_size";
/// Bytes reserved for each receive.
pub const RECV_BUFFER_SIZE: &str = "recv_buffer_size";
/// Name the gateway registers under.
pub const INTERFACE_NAME: &str = "interface_name";

pub const DEFAULT_QUEUE_DEPTH: usize = 100;
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 1500;
/// Largest IPv4 datagram, the ceiling of the total-length field.
pub const MAX_RECV_BUFFER_SIZE: usize = u16::MAX as usize;
/// Most buffers a tokio bounded channel can hold.
pub const MAX_QUEUE_DEPTH: usize = Semaphore::MAX_PERMITS;
pub const DEFAULT_INTERFACE_NAME: &str = "gn0";

pub const DEFAULT_INTERNET_PROTOCOLS: [AddressFamily; 1] = [AddressFamily::Inet];
pub const DEFAULT_TRANSPORT_PROTOCOLS: [TransportProtocol; 3] =
    [TransportProtocol::Tcp, TransportProtocol::Udp, TransportProtocol::Icmp];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Configuration key '{0}' not present")]
    KeyNotFound(String),

    #[error("Configuration key '{key}' holds a {found}, not a {expected}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Invalid value for '{key}': {reason}")]
    Invalid { key: String, reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

impl ConfigValue {
    pub fn kind(&self) -> &'static str {
        match self {
            ConfigValue::Int(_) => i64::KIND,
            ConfigValue::Float(_) => f64::KIND,
            ConfigValue::Str(_) => String::KIND,
            ConfigValue::Bool(_) => bool::KIND,
        }
    }

    /// Read a value from text: integer, then float, then boolean, else string.
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        if let Ok(v) = text.parse::<i64>() {
            ConfigValue::Int(v)
        } else if let Ok(v) = text.parse::<f64>() {
            ConfigValue::Float(v)
        } else if let Ok(v) = text.parse::<bool>() {
            ConfigValue::Bool(v)
        } else {
            ConfigValue::Str(text.to_string())
        }
    }
}

/// Rust types that map onto one [`ConfigValue`] variant.
pub trait ConfigType: Sized {
    const KIND: &'static str;

    fn from_value(value: &ConfigValue) -> Option<Self>;
    fn into_value(self) -> ConfigValue;
}

macro_rules! config_type {
    ($ty:ty, $variant:ident, $kind:literal) => {
        impl ConfigType for $ty {
            const KIND: &'static str = $kind;

            fn from_value(value: &ConfigValue) -> Option<Self> {
                match value {
                    ConfigValue::$variant(v) => Some(v.clone()),
                    _ => None,
                }
            }

            fn into_value(self) -> ConfigValue {
                ConfigValue::$variant(self)
            }
        }
    };
}

config_type!(i64, Int, "int");
config_type!(f64, Float, "float");
config_type!(String, Str, "string");
config_type!(bool, Bool, "bool");

/// Typed key/value store. Readers share the lock; writers are exclusive.
#[derive(Debug, Default)]
pub struct ConfigStore {
    values: RwLock<HashMap<String, ConfigValue>>,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<T: ConfigType>(&self, key: impl Into<String>, value: T) {
        self.values.write().insert(key.into(), value.into_value());
    }

    pub fn set_value(&self, key: impl Into<String>, value: ConfigValue) {
        self.values.write().insert(key.into(), value);
    }

    pub fn get<T: ConfigType>(&self, key: &str) -> Result<T, ConfigError> {
        let values = self.values.read();
        let value = values.get(key).ok_or_else(|| ConfigError::KeyNotFound(key.to_string()))?;
        extract(key, value)
    }

    /// Read `key`, storing `default` first if it is missing.
    ///
    /// The check and the insert happen under one write lock, so concurrent
    /// callers agree on a single value: whichever default landed first.
    pub fn get_or<T: ConfigType>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        if let Some(value) = self.values.read().get(key) {
            return extract(key, value);
        }

        let mut values = self.values.write();
        let value = values.entry(key.to_string()).or_insert_with(|| default.into_value());
        extract(key, value)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.read().contains_key(key)
    }

    pub fn remove(&self, key: &str) -> Option<ConfigValue> {
        self.values.write().remove(key)
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }

    /// Copy every `PREFIX_NAME=value` pair from `vars` in as `name` (lowercased).
    pub fn merge_vars<I, K, V>(&self, prefix: &str, vars: I) -> usize
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut merged = 0;
        let mut values = self.values.write();
        for (name, value) in vars {
            let Some(key) = name.as_ref().strip_prefix(prefix) else {
                continue;
            };
            let key = key.to_ascii_lowercase();
            debug!(key = %key, "configuration override");
            values.insert(key, ConfigValue::parse(value.as_ref()));
            merged += 1;
        }
        merged
    }

    /// [`merge_vars`](Self::merge_vars) over the process environment.
    pub fn merge_env(&self, prefix: &str) -> usize {
        self.merge_vars(prefix, std::env::vars())
    }
}

fn extract<T: ConfigType>(key: &str, value: &ConfigValue) -> Result<T, ConfigError> {
    T::from_value(value).ok_or_else(|| ConfigError::TypeMismatch {
        key: key.to_string(),
        expected: T::KIND,
        found: value.kind(),
    })
}

/// Everything a gateway needs to open and run its sockets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    pub interface_name: String,
    pub queue_depth: usize,
    pub recv_buffer_size: usize,
    pub internet_protocols: Vec<AddressFamily>,
    pub transport_protocols: Vec<TransportProtocol>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interface_name: DEFAULT_INTERFACE_NAME.to_string(),
            queue_depth: DEFAULT_QUEUE_DEPTH,
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
            internet_protocols: DEFAULT_INTERNET_PROTOCOLS.to_vec(),
            transport_protocols: DEFAULT_TRANSPORT_PROTOCOLS.to_vec(),
        }
    }
}

impl CaptureConfig {
    /// Build from `store`, writing the defaults back for any missing key.
    pub fn from_store(store: &ConfigStore) -> Result<Self, ConfigError> {
        let queue_depth = store.get_or(IPV4_PACKET_CHANNEL_SIZE, DEFAULT_QUEUE_DEPTH as i64)?;
        let recv_buffer_size = store.get_or(RECV_BUFFER_SIZE, DEFAULT_RECV_BUFFER_SIZE as i64)?;
        let interface_name = store.get_or(INTERFACE_NAME, DEFAULT_INTERFACE_NAME.to_string())?;

        let config = Self {
            interface_name,
            queue_depth: to_size(IPV4_PACKET_CHANNEL_SIZE, queue_depth)?,
            recv_buffer_size: to_size(RECV_BUFFER_SIZE, recv_buffer_size)?,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn interface_name(mut self, name: &str) -> Self {
        self.interface_name = name.to_string();
        self
    }

    pub fn queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth;
        self
    }

    pub fn recv_buffer_size(mut self, size: usize) -> Self {
        self.recv_buffer_size = size;
        self
    }

    pub fn internet_protocols(mut self, families: Vec<AddressFamily>) -> Self {
        self.internet_protocols = families;
        self
    }

    pub fn transport_protocols(mut self, protocols: Vec<TransportProtocol>) -> Self {
        self.transport_protocols = protocols;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_depth == 0 {
            return Err(ConfigError::Invalid {
                key: IPV4_PACKET_CHANNEL_SIZE.to_string(),
                reason: "queue depth must be at least 1".to_string(),
            });
        }
        if self.queue_depth > MAX_QUEUE_DEPTH {
            return Err(ConfigError::Invalid {
                key: IPV4_PACKET_CHANNEL_SIZE.to_string(),
                reason: format!("queue depth {} exceeds {}", self.queue_depth, MAX_QUEUE_DEPTH),
            });
        }
        if self.recv_buffer_size < ipcap_proto::ipv4::IPV4_MIN_HEADER_LEN {
            return Err(ConfigError::Invalid {
                key: RECV_BUFFER_SIZE.to_string(),
                reason: format!("{} bytes cannot hold an IPv4 header", self.recv_buffer_size),
            });
        }
        if self.recv_buffer_size > MAX_RECV_BUFFER_SIZE {
            return Err(ConfigError::Invalid {
                key: RECV_BUFFER_SIZE.to_string(),
                reason: format!("{} bytes is larger than any IPv4 datagram", self.recv_buffer_size),
            });
        }
        if self.interface_name.is_empty() {
            return Err(ConfigError::Invalid {
                key: INTERFACE_NAME.to_string(),
                reason: "interface name is empty".to_string(),
            });
        }
        Ok(())
    }

    /// The capture matrix, family-major: one spec per (family, protocol).
    pub fn socket_specs(&self) -> Vec<SocketSpec> {
        self.internet_protocols
            .iter()
            .flat_map(|family| {
                self.transport_protocols
                    .iter()
                    .map(move |protocol| SocketSpec::new(*family, *protocol))
            })
            .collect()
    }
}

fn to_size(key: &str, value: i64) -> Result<usize, ConfigError> {
    usize::try_from(value).map_err(|_| ConfigError::Invalid {
        key: key.to_string(),
        reason: format!("{} is out of range", value),
    })
}
