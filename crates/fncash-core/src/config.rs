//! Application configuration management.
//!
//! This module handles loading and saving the application configuration:
//! the backend address, whether to use the OS keychain, and where the plain
//! credential file lives.
//!
//! Configuration is stored at `~/.config/fncash/config.json`. The
//! `FNCASH_API_URL` and `FNCASH_SECURE_STORE` environment variables override
//! the file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::api::DEFAULT_BASE_URL;

/// Application name used for config/data directory paths
const APP_NAME: &str = "fncash";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const ENV_API_URL: &str = "FNCASH_API_URL";
const ENV_SECURE_STORE: &str = "FNCASH_SECURE_STORE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub use_secure_store: bool,
    /// Directory for the plain credential file; platform data dir when unset
    pub data_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_BASE_URL.to_string(),
            use_secure_store: true,
            data_dir: None,
        }
    }
}

impl Config {
    /// Load from the standard location, then apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_overrides(
            std::env::var(ENV_API_URL).ok(),
            std::env::var(ENV_SECURE_STORE).ok(),
        );
        Ok(config)
    }

    /// Like [`load`](Self::load), reading a `.env` file first if one exists
    pub fn load_with_env() -> Result<Self> {
        // Missing .env is fine
        let _ = dotenvy::dotenv();
        Self::load()
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    fn apply_overrides(&mut self, api_url: Option<String>, secure_store: Option<String>) {
        if let Some(url) = api_url.filter(|u| !u.trim().is_empty()) {
            self.api_base_url = url.trim().to_string();
        }
        if let Some(raw) = secure_store {
            match parse_flag(&raw) {
                Some(flag) => self.use_secure_store = flag,
                None => warn!(value = %raw, "Ignoring unrecognized {} value", ENV_SECURE_STORE),
            }
        }
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.data_dir {
            return Ok(dir.clone());
        }
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
