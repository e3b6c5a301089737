//! Run configuration.
//!
//! The defaults live in `config/default.toml` and are embedded at compile
//! time. A user file only needs the keys it changes.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

const DEFAULT_TOML: &str = include_str!("../config/default.toml");

/// Errors from loading a [`TaskConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// File that was read.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The TOML is malformed or has values of the wrong type.
    #[error("Invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Settings for one isochrone run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Points between two progress log lines. Zero disables them.
    pub progress_log_interval: usize,
    /// Fill opacity given to the result layer style.
    pub fill_opacity: f64,
    /// File extension of persisted result layers.
    pub output_extension: String,
    /// HTTP client settings.
    pub service: ServiceConfig,
}

/// Settings of the HTTP isochrone client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Path segment appended to the base URL.
    pub endpoint: String,
    /// Scheme prefixed to base URLs given without one.
    pub default_scheme: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// `User-Agent` header sent with every request.
    pub user_agent: String,
}

impl TaskConfig {
    /// The embedded default configuration file.
    #[must_use]
    pub const fn default_toml() -> &'static str {
        DEFAULT_TOML
    }

    /// The configuration of the embedded default file alone.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the embedded file is invalid.
    pub fn embedded() -> Result<Self, ConfigError> {
        Self::from_toml_str("")
    }

    /// Parses `text` layered over the embedded defaults. Keys missing from
    /// `text` keep their default values; nested tables are merged key by
    /// key.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if either document is not valid TOML
    /// or a value has the wrong type.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let mut table: toml::Table = DEFAULT_TOML.parse()?;
        merge(&mut table, text.parse()?);
        Ok(toml::Value::Table(table).try_into()?)
    }

    /// Reads and parses a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        log::debug!("Loaded task configuration from {}", path.display());
        Ok(config)
    }
}

fn merge(base: &mut toml::Table, overrides: toml::Table) {
    for (key, value) in overrides {
        match value {
            toml::Value::Table(nested) => match base.get_mut(&key) {
                Some(toml::Value::Table(existing)) => merge(existing, nested),
                _ => {
                    base.insert(key, toml::Value::Table(nested));
                }
            },
            value => {
                base.insert(key, value);
            }
        }
    }
}
