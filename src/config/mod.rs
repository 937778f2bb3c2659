//! Configuration management for the relay
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. JSON configuration file (TOML is accepted too, chosen by extension)
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use relaybox::config::Config;
//!
//! let config = Config::load(None).expect("Failed to load configuration");
//! println!("Watching: {}", config.incoming_dir.display());
//! ```
//!
//! # Environment Variables
//!
//! Values can be overridden with `RELAYBOX__<key>`, nested sections joined by `__`:
//! - `RELAYBOX__SERVER_PORT=9000`
//! - `RELAYBOX__LIMITS__MAX_CONNECTIONS=32`
//!
//! # Configuration File
//!
//! By default the configuration is loaded from `config/relaybox.json`.
//! This can be overridden using the `RELAYBOX_CONFIG` environment variable
//! or the `--config` flag.

mod models;
mod secret;
mod sources;
mod validation;

pub use crate::humanize::ByteSize;
pub use models::{
    ALL_TARGETS, Config, DestinationConfig, LimitsConfig, PatternRule, PatternTable, TargetSpec,
};
pub use secret::{REDACTED, SecretError, SecretRef};
pub use validation::ValidationError;

use std::path::PathBuf;
use thiserror::Error;

/// Configuration problems: fatal to the operation that hit them, never to a running relay
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),

    #[error("Unknown destination '{0}'")]
    UnknownDestination(String),

    #[error("No destinations resolved for '{0}'")]
    NoTargets(String),

    #[error("Path '{}' has no usable file name", .0.display())]
    NoFileName(PathBuf),

    #[error("Directory '{path}' unavailable: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file is malformed
    /// - Validation fails (unknown destinations, empty target lists, etc.)
    pub fn load(path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let config = sources::load(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a configuration document
    pub fn from_json(value: serde_json::Value) -> Result<Self, ConfigError> {
        let config = sources::from_json(value)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::validate(self)
    }
}
