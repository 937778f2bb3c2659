use super::models::{Config, TargetSpec};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("incoming_dir is not configured")]
    MissingIncomingDir,

    #[error("No destinations configured (at least one is required)")]
    NoDestinations,

    #[error("Destination #{index} has an empty '{field}'")]
    EmptyDestinationField { index: usize, field: &'static str },

    #[error("Destination '{0}' is declared more than once")]
    DuplicateDestination(String),

    #[error("Pattern '{pattern}' references unknown destination '{name}'")]
    UnknownPatternTarget { pattern: String, name: String },

    #[error("Pattern '{0}' has an empty target list")]
    EmptyPatternTargets(String),

    #[error("default_target references unknown destination '{0}'")]
    UnknownDefaultTarget(String),

    #[error("default_target is an empty list")]
    EmptyDefaultTarget,

    #[error("Limit must be positive: {0}")]
    ZeroLimit(&'static str),
}

/// Validate the entire configuration
///
/// Misconfiguration is surfaced here, at load time, rather than while a
/// relay job is in flight.
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_incoming(config)?;
    let names = validate_destinations(config)?;
    validate_patterns(config, &names)?;
    validate_default_target(config, &names)?;
    validate_limits(config)?;
    Ok(())
}

fn validate_incoming(config: &Config) -> Result<(), ValidationError> {
    if config.incoming_dir.as_os_str().is_empty() {
        return Err(ValidationError::MissingIncomingDir);
    }
    Ok(())
}

/// Ensure destinations exist, carry the fields needed to connect, and have unique names
fn validate_destinations(config: &Config) -> Result<HashSet<&str>, ValidationError> {
    if config.destinations.is_empty() {
        return Err(ValidationError::NoDestinations);
    }

    let mut names = HashSet::new();
    for (index, dest) in config.destinations.iter().enumerate() {
        for (field, value) in [
            ("name", dest.name.as_str()),
            ("address", dest.address.as_str()),
            ("user", dest.user.as_str()),
            ("target_dir", dest.target_dir.as_str()),
        ] {
            if value.trim().is_empty() {
                return Err(ValidationError::EmptyDestinationField { index, field });
            }
        }

        if !names.insert(dest.name.as_str()) {
            return Err(ValidationError::DuplicateDestination(dest.name.clone()));
        }

        if dest.credential.is_inline() {
            tracing::warn!(
                destination = %dest.name,
                "Inline credential in configuration; prefer an env: or file: reference"
            );
        }
    }

    Ok(names)
}

fn validate_patterns(config: &Config, names: &HashSet<&str>) -> Result<(), ValidationError> {
    for rule in config.file_patterns.rules() {
        if let TargetSpec::Names(targets) = &rule.targets {
            if targets.is_empty() {
                return Err(ValidationError::EmptyPatternTargets(rule.prefix.clone()));
            }
            if let Some(unknown) = targets.iter().find(|t| !names.contains(t.as_str())) {
                return Err(ValidationError::UnknownPatternTarget {
                    pattern: rule.prefix.clone(),
                    name: unknown.clone(),
                });
            }
        }
    }
    Ok(())
}

fn validate_default_target(config: &Config, names: &HashSet<&str>) -> Result<(), ValidationError> {
    if let TargetSpec::Names(targets) = &config.default_target {
        if targets.is_empty() {
            return Err(ValidationError::EmptyDefaultTarget);
        }
        if let Some(unknown) = targets.iter().find(|t| !names.contains(t.as_str())) {
            return Err(ValidationError::UnknownDefaultTarget(unknown.clone()));
        }
    }
    Ok(())
}

fn validate_limits(config: &Config) -> Result<(), ValidationError> {
    let limits = &config.limits;
    for (field, value) in [
        ("max_connections", limits.max_connections as u64),
        ("max_header_bytes", limits.max_header_bytes as u64),
        ("max_concurrent_transfers", limits.max_concurrent_transfers as u64),
        ("dispatch_workers", limits.dispatch_workers as u64),
        ("queue_capacity", limits.queue_capacity as u64),
        ("transfer_timeout_secs", limits.transfer_timeout_secs),
        ("connect_timeout_secs", limits.connect_timeout_secs),
        ("receive_idle_timeout_secs", limits.receive_idle_timeout_secs),
    ] {
        if value == 0 {
            return Err(ValidationError::ZeroLimit(field));
        }
    }
    Ok(())
}
