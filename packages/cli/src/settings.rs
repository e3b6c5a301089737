//! Persisted operator settings.
//!
//! The service URL, API key and result directory outlive a single run, so
//! they are kept in a small TOML file next to where the CLI is invoked.

use std::fmt;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Settings file used when `--settings` is not given.
pub const DEFAULT_SETTINGS_PATH: &str = "catchment.toml";

/// Errors reading or writing the settings file.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// The file could not be read or written.
    #[error("{path}: {source}")]
    Io {
        /// Settings file.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file is not valid TOML.
    #[error("Invalid settings file: {0}")]
    Parse(#[from] toml::de::Error),

    /// The settings could not be rendered as TOML.
    #[error("Could not serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// A settings entry that can be changed from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SettingKey {
    /// Isochrone service base URL.
    Url,
    /// Service API key.
    ApiKey,
    /// Directory result layers are written to.
    ResultDir,
}

/// Values remembered between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Isochrone service base URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Service API key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Directory result layers are written to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_dir: Option<PathBuf>,
}

impl Settings {
    /// Reads the settings file. A missing file gives empty settings.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] if the file exists but cannot be read or
    /// parsed.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No settings at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(SettingsError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Ok(toml::from_str(&text)?)
    }

    /// Writes the settings file.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] if the settings cannot be serialized or
    /// written.
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let text = toml::to_string(self)?;
        std::fs::write(path, text).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Sets `key` to `value`. An empty value clears the entry.
    pub fn set(&mut self, key: SettingKey, value: &str) {
        let value = Some(value.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        match key {
            SettingKey::Url => self.url = value,
            SettingKey::ApiKey => self.api_key = value,
            SettingKey::ResultDir => self.result_dir = value.map(PathBuf::from),
        }
    }
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "url        = {}", self.url.as_deref().unwrap_or("(not set)"))?;
        writeln!(
            f,
            "api_key    = {}",
            if self.api_key.is_some() { "****" } else { "(not set)" }
        )?;
        write!(
            f,
            "result_dir = {}",
            self.result_dir
                .as_deref()
                .map_or_else(|| "(not set)".to_string(), |d| d.display().to_string())
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn saved_settings_load_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catchment.toml");

        let mut settings = Settings::default();
        settings.set(SettingKey::Url, "localhost:8989");
        settings.set(SettingKey::ResultDir, "/tmp/isochrones");
        settings.save(&path).unwrap();

        let loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded.url.as_deref(), Some("localhost:8989"));
        assert_eq!(loaded.api_key, None);
        assert_eq!(loaded.result_dir, Some(PathBuf::from("/tmp/isochrones")));

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(!text.contains("api_key"));
    }

    #[test]
    fn empty_value_clears() {
        let mut settings = Settings::default();
        settings.set(SettingKey::ApiKey, "secret");
        assert_eq!(settings.api_key.as_deref(), Some("secret"));
        settings.set(SettingKey::ApiKey, "  ");
        assert_eq!(settings.api_key, None);
    }

    #[test]
    fn api_key_is_masked() {
        let mut settings = Settings::default();
        settings.set(SettingKey::ApiKey, "secret");
        let shown = settings.to_string();
        assert!(!shown.contains("secret"));
        assert!(shown.contains("url        = (not set)"));
    }

    #[test]
    fn invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catchment.toml");
        std::fs::write(&path, "url = [").unwrap();
        assert!(matches!(
            Settings::load(&path),
            Err(SettingsError::Parse(_))
        ));
    }
}
