//! Core configuration loading.
//!
//! # Responsibility
//! - Describe runtime settings for storage, logging, identity lookups and
//!   store permissions.
//! - Parse TOML configuration with per-section defaults.
//!
//! # Invariants
//! - Every section and key is optional; missing values fall back to defaults.
//! - Unknown keys are rejected so typos surface at startup.

use crate::logging::default_log_level;
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

const DEFAULT_GRAVATAR_BASE_URL: &str = "https://secure.gravatar.com/avatar";
const DEFAULT_AVATAR_SIZE: u32 = 200;
const DEFAULT_LOOKUP_TIMEOUT_MS: u64 = 2_000;

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(toml::de::Error),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config: {err}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
        }
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(value: toml::de::Error) -> Self {
        Self::Parse(value)
    }
}

/// Top-level runtime configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoreConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub identity: IdentityConfig,
    pub permissions: PermissionsConfig,
}

/// `[database]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// SQLite file path. `None` opens an in-memory database.
    pub path: Option<PathBuf>,
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub level: String,
    /// Absolute log directory. Logging stays off when unset.
    pub dir: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level().to_string(),
            dir: None,
        }
    }
}

/// `[identity]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IdentityConfig {
    /// Probe Gravatar over the network for avatars.
    pub gravatar_lookup: bool,
    pub gravatar_base_url: String,
    pub avatar_size: u32,
    pub lookup_timeout_ms: u64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            gravatar_lookup: true,
            gravatar_base_url: DEFAULT_GRAVATAR_BASE_URL.to_string(),
            avatar_size: DEFAULT_AVATAR_SIZE,
            lookup_timeout_ms: DEFAULT_LOOKUP_TIMEOUT_MS,
        }
    }
}

/// `[permissions]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PermissionsConfig {
    /// Whether callers may write contacts without an explicit bypass.
    pub allow_contact_writes: bool,
}

impl Default for PermissionsConfig {
    fn default() -> Self {
        Self {
            allow_contact_writes: true,
        }
    }
}

impl CoreConfig {
    /// Parses configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}
