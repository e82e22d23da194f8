use std::path::PathBuf;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::WatariError;

const DEFAULT_CONFIG: &str = include_str!("../../../config/default.toml");

/// Well-known identifier of the one recurring sync alarm.
pub const ALARM_KEY: &str = "plex-library-sync";

/// Delay before the first tick when sync is started with `run_immediately`.
pub const IMMEDIATE_FIRE_DELAY_MS: u64 = 100;

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub plex: ServiceCredentials,
    pub simkl: ServiceCredentials,
    pub sync: SyncConfig,
}

/// OAuth client credentials for one external service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceCredentials {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Default recurring sync period, in hours.
    pub period_hours: f64,
    /// Budget for a surrounding retry wrapper; not consulted by the
    /// orchestrator itself (the next scheduled tick is the retry).
    pub max_retry_count: u32,
    /// How long the transient "unexpected error" state stays visible.
    pub unexpected_dismiss_secs: u64,
}

impl AppConfig {
    /// Load config: user file (if exists), else built-in defaults.
    pub fn load() -> Result<Self, WatariError> {
        let user_path = Self::config_path();
        if user_path.exists() {
            let user_str = std::fs::read_to_string(&user_path)
                .map_err(|e| WatariError::Config(e.to_string()))?;
            toml::from_str(&user_str).map_err(|e| WatariError::Config(e.to_string()))
        } else {
            toml::from_str(DEFAULT_CONFIG).map_err(|e| WatariError::Config(e.to_string()))
        }
    }

    /// Save current config to the user config file.
    pub fn save(&self) -> Result<(), WatariError> {
        let path = Self::config_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| WatariError::Config(e.to_string()))?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| WatariError::Config(e.to_string()))?;
        std::fs::write(&path, content).map_err(|e| WatariError::Config(e.to_string()))?;
        Ok(())
    }

    /// Path to the user config file (XDG on Linux, AppData on Windows).
    pub fn config_path() -> PathBuf {
        Self::project_dirs()
            .map(|d| d.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    /// Path to the key-value store database file.
    pub fn store_path() -> PathBuf {
        Self::project_dirs()
            .map(|d| d.data_dir().join("watari.db"))
            .unwrap_or_else(|| PathBuf::from("watari.db"))
    }

    /// Ensure the data directory exists and return the store path.
    pub fn ensure_store_path() -> Result<PathBuf, WatariError> {
        let path = Self::store_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| WatariError::Config(e.to_string()))?;
        }
        Ok(path)
    }

    fn project_dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("", "", "watari")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG).expect("built-in default config is valid TOML")
    }
}
