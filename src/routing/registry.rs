use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::{Config, ConfigError, DestinationConfig, SecretRef, ValidationError};

/// A named remote endpoint that can receive relayed files
///
/// Immutable once registered. The credential stays a reference until a
/// transport resolves it while connecting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub remote_root: String,
    credential: SecretRef,
}

impl Destination {
    pub fn new(
        name: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        credential: SecretRef,
        remote_root: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
            user: user.into(),
            remote_root: remote_root.into(),
            credential,
        }
    }

    /// Build from configuration; `address` may carry its own port (`host:port`)
    pub fn from_config(config: &DestinationConfig, default_port: u16) -> Self {
        let (host, port) = match config.address.parse::<SocketAddr>() {
            Ok(addr) => (addr.ip().to_string(), config.port.unwrap_or(addr.port())),
            Err(_) => (
                config.address.clone(),
                config.port.unwrap_or(default_port),
            ),
        };

        Self::new(
            config.name.clone(),
            host,
            port,
            config.user.clone(),
            config.credential.clone(),
            config.target_dir.clone(),
        )
    }

    pub fn credential(&self) -> &SecretRef {
        &self.credential
    }

    /// `host:port` string suitable for a TCP connect
    pub fn endpoint(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Remote path a file lands at, preserving its base name
    pub fn remote_path_for(&self, file_name: &str) -> String {
        let root = self.remote_root.trim_end_matches('/');
        format!("{}/{}", root, file_name)
    }
}

/// Registry of destinations, loaded once per configuration
///
/// Read-only after construction; shared across workers behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct DestinationRegistry {
    destinations: Vec<Arc<Destination>>,
    index: HashMap<String, usize>,
}

impl DestinationRegistry {
    pub fn new(destinations: Vec<Destination>) -> Result<Self, ConfigError> {
        let mut registry = Self::default();
        for destination in destinations {
            if registry.index.contains_key(&destination.name) {
                return Err(ValidationError::DuplicateDestination(destination.name).into());
            }
            registry
                .index
                .insert(destination.name.clone(), registry.destinations.len());
            registry.destinations.push(Arc::new(destination));
        }
        Ok(registry)
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let destinations = config
            .destinations
            .iter()
            .map(|d| Destination::from_config(d, config.sftp_port))
            .collect();
        Self::new(destinations)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Destination>> {
        self.index.get(name).map(|&i| self.destinations[i].clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Every registered name, in registration order
    pub fn names(&self) -> Vec<String> {
        self.destinations.iter().map(|d| d.name.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.destinations.is_empty()
    }
}
