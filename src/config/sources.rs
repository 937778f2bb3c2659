use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::{Path, PathBuf};

const CONFIG_ENV_VAR: &str = "RELAYBOX_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/relaybox.json";
const ENV_PREFIX: &str = "RELAYBOX";
const ENV_SEPARATOR: &str = "__";

/// Resolve the configuration file path: explicit path, `RELAYBOX_CONFIG`, or the default
pub fn config_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(|| env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. JSON or TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables (highest priority)
pub fn load(explicit: Option<PathBuf>) -> Result<Config, ConfigError> {
    // A missing .env file is normal
    let _ = dotenvy::dotenv();

    load_from_sources(&config_path(explicit))
}

/// Load configuration from a specific path and environment
pub fn load_from_sources(config_path: &Path) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::warn!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // RELAYBOX__SERVER_PORT -> server_port, RELAYBOX__LIMITS__MAX_CONNECTIONS -> limits.max_connections
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator(ENV_SEPARATOR)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize()
}

/// Parse a configuration document supplied directly (e.g. over the operator API)
pub fn from_json(value: serde_json::Value) -> Result<Config, serde_json::Error> {
    serde_json::from_value(value)
}

#[cfg(test)]
mod tests {
    use super::super::models::TargetSpec;
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_defaults_only() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.json");

        let config = load_from_sources(&config_path).unwrap();
        assert_eq!(config.server_port, 8000);
        assert!(config.destinations.is_empty());
        assert_eq!(config.default_target, TargetSpec::All);
    }

    #[test]
    fn test_load_gateway_json() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("relay.json");

        let json = r#"{
            "incoming_dir": "/home/root/incoming",
            "outgoing_dir": "/home/root/outgoing",
            "log_dir": "/home/root/logs",
            "destinations": [
                {"name": "zc1", "address": "192.168.1.106", "user": "raspberry",
                 "credential": "env:ZC1_PASS", "target_dir": "/home/raspberry/received_files"},
                {"name": "zc3", "ip": "192.168.1.118", "user": "dev1", "port": 2200,
                 "password": "file:/run/secrets/zc3", "target_dir": "/home/dev1/received_files"}
            ],
            "file_patterns": {
                "zc1_": ["zc1"],
                "zc13_": ["zc1", "zc3"],
                "all_": "all"
            },
            "default_target": ["zc1"],
            "server_port": 8001,
            "sftp_port": 2222,
            "limits": {"quiescence_ms": 250, "max_file_bytes": "16MB"}
        }"#;
        fs::write(&config_path, json).unwrap();

        let config = load_from_sources(&config_path).unwrap();

        assert_eq!(config.server_port, 8001);
        assert_eq!(config.sftp_port, 2222);
        assert_eq!(config.destinations.len(), 2);
        assert_eq!(config.destinations[1].address, "192.168.1.118");
        assert_eq!(config.destinations[1].port, Some(2200));
        assert_eq!(config.default_target, TargetSpec::Names(vec!["zc1".into()]));
        assert_eq!(config.limits.quiescence_ms, 250);
        assert_eq!(config.limits.max_file_bytes.as_u64(), 16 * 1024 * 1024);

        let prefixes: Vec<&str> = config
            .file_patterns
            .rules()
            .iter()
            .map(|r| r.prefix.as_str())
            .collect();
        assert_eq!(prefixes, vec!["zc1_", "zc13_", "all_"]);
    }

    #[test]
    fn test_from_json_document() {
        let value = serde_json::json!({
            "incoming_dir": "/in",
            "destinations": [],
            "default_target": "all"
        });

        let config = from_json(value).unwrap();
        assert_eq!(config.incoming_dir, PathBuf::from("/in"));
        assert_eq!(config.log_dir, PathBuf::from("logs"));
    }
}
