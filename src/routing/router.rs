use crate::config::{Config, ConfigError, PatternTable, TargetSpec, ValidationError};

use super::registry::DestinationRegistry;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Targets {
    All,
    Names(Vec<String>),
}

/// Maps a file name to the destinations it should be relayed to
///
/// Rules are tried in declaration order and the first prefix match wins,
/// not the longest one: with `zc1` declared before `zc12`, the file
/// `zc12_x` matches `zc1` and gets `zc1`'s targets. Performs no I/O.
#[derive(Debug, Clone)]
pub struct PatternRouter {
    rules: Vec<(String, Targets)>,
    default: Targets,
    all: Vec<String>,
}

impl PatternRouter {
    /// Build a router, checking every referenced name against the registry
    pub fn new(
        table: &PatternTable,
        default: &TargetSpec,
        registry: &DestinationRegistry,
    ) -> Result<Self, ConfigError> {
        let rules = table
            .rules()
            .iter()
            .map(|rule| {
                let targets = compile(&rule.targets, registry).map_err(|err| match err {
                    ConfigError::NoTargets(_) => {
                        ValidationError::EmptyPatternTargets(rule.prefix.clone()).into()
                    }
                    other => other,
                })?;
                Ok((rule.prefix.clone(), targets))
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        let default = compile(default, registry).map_err(|err| match err {
            ConfigError::NoTargets(_) => ValidationError::EmptyDefaultTarget.into(),
            other => other,
        })?;

        if registry.is_empty() {
            return Err(ValidationError::NoDestinations.into());
        }

        Ok(Self {
            rules,
            default,
            all: registry.names(),
        })
    }

    pub fn from_config(config: &Config, registry: &DestinationRegistry) -> Result<Self, ConfigError> {
        Self::new(&config.file_patterns, &config.default_target, registry)
    }

    /// Ordered, deduplicated destination names for `file_name`
    pub fn route(&self, file_name: &str) -> Vec<String> {
        let targets = self
            .rules
            .iter()
            .find(|(prefix, _)| file_name.starts_with(prefix.as_str()))
            .map(|(_, targets)| targets)
            .unwrap_or(&self.default);

        match targets {
            Targets::All => self.all.clone(),
            Targets::Names(names) => names.clone(),
        }
    }
}

fn compile(spec: &TargetSpec, registry: &DestinationRegistry) -> Result<Targets, ConfigError> {
    match spec {
        TargetSpec::All => Ok(Targets::All),
        TargetSpec::Names(names) => {
            let mut unique: Vec<String> = Vec::with_capacity(names.len());
            for name in names {
                if !registry.contains(name) {
                    return Err(ConfigError::UnknownDestination(name.clone()));
                }
                if !unique.contains(name) {
                    unique.push(name.clone());
                }
            }
            if unique.is_empty() {
                return Err(ConfigError::NoTargets(String::new()));
            }
            Ok(Targets::Names(unique))
        }
    }
}
