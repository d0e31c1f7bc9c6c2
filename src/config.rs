//! Client configuration.
//!
//! Values are layered: built-in defaults, then the optional JSON file at
//! `<config dir>/matseg/config.json`, then environment variables:
//! - `MATSEG_URL` - Service base URL
//! - `MATSEG_API_KEY` - Bearer token
//! - `MATSEG_DEBOUNCE_MS` - Coalescing window for refinement requests
//! - `MATSEG_MIN_OBJECT_PIXELS` - Noise threshold for object counting
//! - `MATSEG_PIXEL_AREA` - Physical area of one pixel

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};

use crate::client::DEFAULT_URL;
use crate::stats::{
    check_pixel_area, StatsError, StatsReducer, DEFAULT_MIN_OBJECT_PIXELS, DEFAULT_PIXEL_AREA,
};

const APP_NAME: &str = "matseg";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the segmentation service, including the `/api/v1` prefix.
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// How long a refinement request waits for newer prompts before sending.
    /// Zero sends immediately.
    pub debounce_ms: u64,
    pub min_object_pixels: usize,
    pub pixel_area: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_URL.to_string(),
            api_key: None,
            debounce_ms: 0,
            min_object_pixels: DEFAULT_MIN_OBJECT_PIXELS,
            pixel_area: DEFAULT_PIXEL_AREA,
        }
    }
}

impl Config {
    /// Load the config file (if any) and apply environment overrides.
    /// Falls back to defaults if the file fails to parse.
    pub fn from_env() -> Self {
        let mut config = match Self::try_load() {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config, using defaults: {:#}", e);
                Self::default()
            }
        };
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    fn try_load() -> Result<Self> {
        let config_path = get_config_path()?;
        if !config_path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&config_path)
    }

    /// Read a config file; missing fields take their defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let config: Self =
            serde_json::from_str(&content).context("Failed to parse config file")?;
        config
            .validate()
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// Check values that serde alone cannot. Run after every override layer.
    pub fn validate(&self) -> Result<()> {
        self.stats_reducer()?;
        Ok(())
    }

    /// Write the configuration to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }

    /// Apply overrides from a variable lookup. Unparseable values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("MATSEG_URL") {
            self.base_url = url;
        }
        if let Some(key) = lookup("MATSEG_API_KEY") {
            self.api_key = Some(key);
        }
        if let Some(ms) = lookup("MATSEG_DEBOUNCE_MS").and_then(|s| s.parse().ok()) {
            self.debounce_ms = ms;
        }
        if let Some(px) = lookup("MATSEG_MIN_OBJECT_PIXELS").and_then(|s| s.parse().ok()) {
            self.min_object_pixels = px;
        }
        if let Some(area) = lookup("MATSEG_PIXEL_AREA")
            .and_then(|s| s.parse::<f64>().ok())
            .and_then(|a| check_pixel_area(a).ok())
        {
            self.pixel_area = area;
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce_ms = debounce.as_millis() as u64;
        self
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn stats_reducer(&self) -> Result<StatsReducer, StatsError> {
        StatsReducer::new(self.min_object_pixels, self.pixel_area)
    }
}

/// Location of the user config file.
pub fn get_config_path() -> Result<PathBuf> {
    let mut path =
        config_dir().ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
    path.push(APP_NAME);
    path.push(CONFIG_FILE);
    Ok(path)
}
