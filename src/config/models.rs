use crate::humanize::ByteSize;
use serde::de::{MapAccess, SeqAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use super::secret::SecretRef;

pub const ALL_TARGETS: &str = "all";

/// Top-level relay configuration
///
/// Field names follow the JSON configuration format used by the gateway
/// deployments (`incoming_dir`, `file_patterns`, `default_target`, ...).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub incoming_dir: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outgoing_dir: Option<PathBuf>,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default)]
    pub destinations: Vec<DestinationConfig>,
    #[serde(default)]
    pub file_patterns: PatternTable,
    #[serde(default)]
    pub default_target: TargetSpec,
    #[serde(default = "default_server_port")]
    pub server_port: u16,
    /// Default SSH port for destinations that do not carry their own
    #[serde(default = "default_sftp_port")]
    pub sftp_port: u16,
    #[serde(default = "default_bind_host")]
    pub bind_host: IpAddr,
    #[serde(default = "default_api_addr")]
    pub api_addr: SocketAddr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_path: Option<PathBuf>,
    #[serde(default)]
    pub limits: LimitsConfig,
}

impl Config {
    /// Minimal configuration for a landing directory, used as a starting point in code
    pub fn new(incoming_dir: impl Into<PathBuf>, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            incoming_dir: incoming_dir.into(),
            outgoing_dir: None,
            log_dir: log_dir.into(),
            destinations: Vec::new(),
            file_patterns: PatternTable::default(),
            default_target: TargetSpec::All,
            server_port: default_server_port(),
            sftp_port: default_sftp_port(),
            bind_host: default_bind_host(),
            api_addr: default_api_addr(),
            index_path: None,
            limits: LimitsConfig::default(),
        }
    }

    pub fn receiver_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_host, self.server_port)
    }

    pub fn index_path(&self) -> PathBuf {
        self.index_path
            .clone()
            .unwrap_or_else(|| self.log_dir.join("index"))
    }

    /// Directory where partially received network uploads are written
    pub fn staging_dir(&self) -> PathBuf {
        self.incoming_dir.join(".staging")
    }

    /// Directory where truncated network uploads are kept for inspection
    pub fn quarantine_dir(&self) -> PathBuf {
        self.incoming_dir.join(".quarantine")
    }

    /// Configuration with every credential masked, safe to return to operators
    pub fn redacted(&self) -> serde_json::Value {
        // SecretRef serializes as the mask, so plain serialization is already safe
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// One remote endpoint as written in configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DestinationConfig {
    pub name: String,
    #[serde(alias = "ip")]
    pub address: String,
    pub user: String,
    #[serde(alias = "password")]
    pub credential: SecretRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    pub target_dir: String,
}

/// Target selector: every registered destination, or an explicit list of names
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TargetSpec {
    #[default]
    All,
    Names(Vec<String>),
}

impl TargetSpec {
    pub fn names(&self) -> &[String] {
        match self {
            TargetSpec::All => &[],
            TargetSpec::Names(names) => names,
        }
    }
}

impl Serialize for TargetSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            TargetSpec::All => serializer.serialize_str(ALL_TARGETS),
            TargetSpec::Names(names) => names.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for TargetSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TargetVisitor;

        impl<'de> Visitor<'de> for TargetVisitor {
            type Value = TargetSpec;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("\"all\", a destination name, or a list of destination names")
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Self::Value, E> {
                if v.eq_ignore_ascii_case(ALL_TARGETS) {
                    Ok(TargetSpec::All)
                } else {
                    Ok(TargetSpec::Names(vec![v.to_string()]))
                }
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut names = Vec::with_capacity(seq.size_hint().unwrap_or(0));
                while let Some(name) = seq.next_element::<String>()? {
                    names.push(name);
                }
                Ok(TargetSpec::Names(names))
            }
        }

        deserializer.deserialize_any(TargetVisitor)
    }
}

/// A filename-prefix rule, in declaration order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternRule {
    pub prefix: String,
    pub targets: TargetSpec,
}

/// Ordered `file_patterns` table
///
/// Written as a JSON object; the declared key order is kept because routing
/// takes the first matching prefix.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PatternTable(pub Vec<PatternRule>);

impl PatternTable {
    pub fn rules(&self) -> &[PatternRule] {
        &self.0
    }

    pub fn push(&mut self, prefix: impl Into<String>, targets: TargetSpec) {
        self.0.push(PatternRule {
            prefix: prefix.into(),
            targets,
        });
    }
}

impl Serialize for PatternTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for rule in &self.0 {
            map.serialize_entry(&rule.prefix, &rule.targets)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for PatternTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TableVisitor;

        impl<'de> Visitor<'de> for TableVisitor {
            type Value = PatternTable;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object mapping filename prefixes to targets")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut rules = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((prefix, targets)) = map.next_entry::<String, TargetSpec>()? {
                    rules.push(PatternRule { prefix, targets });
                }
                Ok(PatternTable(rules))
            }
        }

        deserializer.deserialize_map(TableVisitor)
    }
}

/// Operational limits and timeouts
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LimitsConfig {
    /// Delay after a creation event before the file is treated as complete
    #[serde(default = "default_quiescence_ms")]
    pub quiescence_ms: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_max_header_bytes")]
    pub max_header_bytes: usize,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: ByteSize,
    #[serde(default = "default_receive_idle_timeout_secs")]
    pub receive_idle_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_transfer_timeout_secs")]
    pub transfer_timeout_secs: u64,
    #[serde(default = "default_max_concurrent_transfers")]
    pub max_concurrent_transfers: usize,
    #[serde(default = "default_dispatch_workers")]
    pub dispatch_workers: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl LimitsConfig {
    pub fn quiescence(&self) -> Duration {
        Duration::from_millis(self.quiescence_ms)
    }

    pub fn receive_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.receive_idle_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            quiescence_ms: default_quiescence_ms(),
            max_connections: default_max_connections(),
            max_header_bytes: default_max_header_bytes(),
            max_file_bytes: default_max_file_bytes(),
            receive_idle_timeout_secs: default_receive_idle_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            transfer_timeout_secs: default_transfer_timeout_secs(),
            max_concurrent_transfers: default_max_concurrent_transfers(),
            dispatch_workers: default_dispatch_workers(),
            queue_capacity: default_queue_capacity(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_server_port() -> u16 {
    8000
}

fn default_sftp_port() -> u16 {
    22
}

fn default_bind_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_api_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 5000))
}

fn default_quiescence_ms() -> u64 {
    1000
}

fn default_max_connections() -> usize {
    64
}

fn default_max_header_bytes() -> usize {
    1024
}

fn default_max_file_bytes() -> ByteSize {
    ByteSize::gib(4)
}

fn default_receive_idle_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_transfer_timeout_secs() -> u64 {
    300
}

fn default_max_concurrent_transfers() -> usize {
    16
}

fn default_dispatch_workers() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    100
}

fn default_shutdown_grace_secs() -> u64 {
    30
}
