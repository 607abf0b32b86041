//! TOML configuration for the sync engine and the CLI.
//!
//! ```toml
//! [sync]
//! payload_kind = 11
//! icon_range = 100
//! color_range = 100
//! receive_retry_delay_ms = 1000
//!
//! [log]
//! filter = "beaconsync=info"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::sync::{EngineSettings, PayloadKind};

const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sync: SyncConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Payload kind tag; 0-9 are reserved and rejected on load.
    pub payload_kind: PayloadKind,
    pub icon_range: u32,
    pub color_range: u32,
    pub receive_retry_delay_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        let settings = EngineSettings::default();
        Self {
            payload_kind: settings.payload_kind,
            icon_range: settings.icon_range,
            color_range: settings.color_range,
            receive_retry_delay_ms: u64::try_from(settings.receive_retry_delay.as_millis())
                .unwrap_or(u64::MAX),
        }
    }
}

impl TryFrom<&SyncConfig> for EngineSettings {
    type Error = SyncError;

    fn try_from(cfg: &SyncConfig) -> Result<Self, SyncError> {
        let settings = EngineSettings {
            payload_kind: cfg.payload_kind,
            icon_range: cfg.icon_range,
            color_range: cfg.color_range,
            receive_retry_delay: Duration::from_millis(cfg.receive_retry_delay_ms),
        };
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `tracing_subscriber::EnvFilter` directive; `RUST_LOG` overrides it.
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "beaconsync=info".into(),
        }
    }
}

impl Config {
    /// Load from `path`, or from the platform config directory when `None`.
    ///
    /// An explicit path must exist. A missing file in the default location
    /// yields the defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => match default_config_path() {
                Some(p) => (p, false),
                None => return Ok(Self::default()),
            },
        };

        if !required && !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config to TOML")
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        EngineSettings::try_from(&self.sync)?;
        if self.log.filter.trim().is_empty() {
            anyhow::bail!("log.filter cannot be empty");
        }
        Ok(())
    }

    pub fn engine_settings(&self) -> Result<EngineSettings, SyncError> {
        EngineSettings::try_from(&self.sync)
    }
}

/// `<platform config dir>/beaconsync/config.toml`, if a home directory exists.
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "beaconsync")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}
