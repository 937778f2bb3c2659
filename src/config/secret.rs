//! Credential references resolved at connection time
//!
//! A destination credential is written in configuration as one of:
//! - `env:VARIABLE` - read from the process environment
//! - `file:/path/to/secret` - first line of a file
//! - anything else - an inline literal (accepted for older configs, warned at load)
//!
//! The resolved value never leaves [`SecretRef::resolve`]. `Debug` and
//! `Serialize` both mask the reference, so a serialized [`super::Config`] is
//! always the redacted view.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub const REDACTED: &str = "***";

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("environment variable '{0}' is not set")]
    MissingEnv(String),

    #[error("secret file '{path}' unreadable: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("secret reference resolved to an empty value")]
    Empty,
}

#[derive(Clone, PartialEq, Eq)]
pub enum SecretRef {
    Env(String),
    File(PathBuf),
    Inline(String),
}

impl SecretRef {
    pub fn parse(raw: &str) -> Self {
        if let Some(var) = raw.strip_prefix("env:") {
            SecretRef::Env(var.trim().to_string())
        } else if let Some(path) = raw.strip_prefix("file:") {
            SecretRef::File(PathBuf::from(path.trim()))
        } else {
            SecretRef::Inline(raw.to_string())
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(self, SecretRef::Inline(_))
    }

    /// Resolve the reference to the actual secret value
    pub fn resolve(&self) -> Result<String, SecretError> {
        let value = match self {
            SecretRef::Env(var) => {
                std::env::var(var).map_err(|_| SecretError::MissingEnv(var.clone()))?
            }
            SecretRef::File(path) => std::fs::read_to_string(path)
                .map_err(|source| SecretError::Unreadable {
                    path: path.clone(),
                    source,
                })?
                .lines()
                .next()
                .unwrap_or_default()
                .to_string(),
            SecretRef::Inline(value) => value.clone(),
        };

        if value.is_empty() {
            return Err(SecretError::Empty);
        }
        Ok(value)
    }
}

impl fmt::Debug for SecretRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecretRef::Env(var) => write!(f, "SecretRef::Env({var})"),
            SecretRef::File(path) => write!(f, "SecretRef::File({})", path.display()),
            SecretRef::Inline(_) => write!(f, "SecretRef::Inline({REDACTED})"),
        }
    }
}

impl Serialize for SecretRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(REDACTED)
    }
}

impl<'de> Deserialize<'de> for SecretRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(SecretRef::parse(&raw))
    }
}
