use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::batch::DEFAULT_PACING;
use crate::connection::ConnectorPool;
use crate::logging::LogFormat;

/// CLI defaults, stored as JSON in the platform config directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Retries for descriptors that do not set their own.
    pub default_retries: u32,
    pub default_retry_delay_ms: u64,
    pub batch_pacing_ms: u64,
    pub connector_pool_capacity: usize,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_retries: 0,
            default_retry_delay_ms: 0,
            batch_pacing_ms: u64::try_from(DEFAULT_PACING.as_millis()).unwrap_or(500),
            connector_pool_capacity: ConnectorPool::DEFAULT_CAPACITY,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        match Self::settings_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Reads settings from `path`; a missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content =
            fs::read_to_string(path).with_context(|| format!("reading settings from {}", path.display()))?;
        let settings: Settings =
            serde_json::from_str(&content).with_context(|| format!("parsing settings in {}", path.display()))?;
        Ok(settings)
    }

    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::settings_path().context("no configuration directory on this platform")?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).with_context(|| format!("writing settings to {}", path.display()))?;
        Ok(())
    }

    pub fn settings_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "remotefs", "remotefs").map(|dirs| dirs.config_dir().join("settings.json"))
    }

    /// Updates one setting from its textual form, as given on the command
    /// line.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "default_retries" => self.default_retries = value.parse().context("expected a whole number")?,
            "default_retry_delay_ms" => {
                self.default_retry_delay_ms = value.parse().context("expected milliseconds")?;
            }
            "batch_pacing_ms" => self.batch_pacing_ms = value.parse().context("expected milliseconds")?,
            "connector_pool_capacity" => {
                self.connector_pool_capacity = value.parse().context("expected a whole number")?;
            }
            "log_level" => self.log_level = value.to_string(),
            "log_format" => {
                self.log_format = serde_json::from_value(serde_json::Value::String(value.to_lowercase()))
                    .context("expected pretty, compact or json")?;
            }
            other => bail!("unknown setting {other:?}"),
        }
        Ok(())
    }

    pub const fn batch_pacing(&self) -> Duration {
        Duration::from_millis(self.batch_pacing_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.default_retries, 0);
        assert_eq!(settings.default_retry_delay_ms, 0);
        assert_eq!(settings.batch_pacing(), Duration::from_millis(500));
        assert_eq!(settings.connector_pool_capacity, 16);
        assert_eq!(settings.log_level, "info");
        assert_eq!(settings.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_settings_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("settings.json");

        let mut settings = Settings::default();
        settings.default_retries = 3;
        settings.log_format = LogFormat::Json;
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(&path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let loaded = Settings::load_from(&temp_dir.path().join("absent.json")).unwrap();
        assert_eq!(loaded, Settings::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        fs::write(&path, r#"{"default_retries": 2}"#).unwrap();

        let loaded = Settings::load_from(&path).unwrap();
        assert_eq!(loaded.default_retries, 2);
        assert_eq!(loaded.batch_pacing_ms, 500);
    }

    #[test]
    fn test_set_by_key() {
        let mut settings = Settings::default();
        settings.set("default_retries", "4").unwrap();
        settings.set("log_format", "Compact").unwrap();
        settings.set("log_level", "debug").unwrap();

        assert_eq!(settings.default_retries, 4);
        assert_eq!(settings.log_format, LogFormat::Compact);
        assert_eq!(settings.log_level, "debug");
        assert!(settings.set("default_retries", "many").is_err());
        assert!(settings.set("colour", "blue").is_err());
    }
}
