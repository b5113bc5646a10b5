//! Event store configuration.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How `save` treats an aggregate whose committed version no longer matches
/// the stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConcurrencyMode {
    /// Append unconditionally. Concurrent saves of the same identity may
    /// interleave.
    #[default]
    Permissive,
    /// Reject the save with `DomainError::ConcurrencyConflict` unless the
    /// aggregate's committed version equals the record's.
    Optimistic,
}

impl FromStr for ConcurrencyMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "permissive" => Ok(Self::Permissive),
            "optimistic" => Ok(Self::Optimistic),
            _ => Err(ConfigError::Invalid {
                key: StoreConfig::CONCURRENCY_ENV,
                value: s.to_owned(),
            }),
        }
    }
}

/// Errors raised while reading configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A configuration value could not be parsed.
    #[error("configuration error: invalid value {value:?} for {key}")]
    Invalid {
        /// The offending key.
        key: &'static str,
        /// The raw value found.
        value: String,
    },
}

/// Runtime options for [`crate::InMemoryEventStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Save-time version check policy.
    pub concurrency: ConcurrencyMode,
}

impl StoreConfig {
    /// Environment variable selecting the [`ConcurrencyMode`].
    pub const CONCURRENCY_ENV: &'static str = "EVENTKEEL_CONCURRENCY";

    /// Reads the configuration from the process environment, falling back to
    /// defaults for unset variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if a variable is set to an unknown
    /// value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name
    /// to its value.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if a variable is set to an unknown
    /// value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let concurrency = lookup(Self::CONCURRENCY_ENV)
            .map(|raw| raw.parse::<ConcurrencyMode>())
            .transpose()?
            .unwrap_or_default();
        Ok(Self { concurrency })
    }

    /// Returns a copy with the given concurrency mode.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: ConcurrencyMode) -> Self {
        self.concurrency = concurrency;
        self
    }
}
