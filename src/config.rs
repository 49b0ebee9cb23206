use serde::{Deserialize, Serialize};
use std::{fs::File, path::PathBuf, time::Duration};
use tracing::{info, warn};

use crate::error::{PadError, Result};

/// Default belt speed in km/h when none is configured
pub const DEFAULT_TARGET_SPEED: f64 = 2.5;

/// Default minimum session duration before a webhook is sent
pub const DEFAULT_WEBHOOK_THRESHOLD: Duration = Duration::from_secs(5 * 60);

/// Application configuration loaded from `walkingpad.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Address of the device to prefer during discovery; empty for any
    #[serde(default)]
    pub preferred_device: String,
    /// Belt speed in km/h used by the start intent
    #[serde(default = "default_target_speed")]
    pub target_speed: f64,
    /// Webhook URL template; placeholders `{start_ts}`, `{duration_min}`,
    /// `{steps}` and `{distance_km}` are substituted per session
    #[serde(default, rename = "webhookURL")]
    pub webhook_url: Option<String>,
    /// Minimum session length in minutes before the webhook fires
    #[serde(default)]
    pub webhook_threshold_min: Option<f64>,
}

const fn default_target_speed() -> f64 {
    DEFAULT_TARGET_SPEED
}

impl Default for Config {
    fn default() -> Self {
        Self {
            preferred_device: String::new(),
            target_speed: DEFAULT_TARGET_SPEED,
            webhook_url: None,
            webhook_threshold_min: None,
        }
    }
}

impl Config {
    /// Path of the config file inside the user config directory
    ///
    /// # Errors
    ///
    /// Returns [`PadError::Config`] if the platform has no user config
    /// directory.
    pub fn path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("walkingpad.json"))
            .ok_or_else(|| PadError::Config("no user config directory".into()))
    }

    /// Load the configuration from the user config directory
    ///
    /// # Errors
    ///
    /// Returns [`PadError::Io`] if the file cannot be opened or
    /// [`PadError::Json`] if it does not parse.
    pub fn load() -> Result<Self> {
        let path = Self::path()?;
        info!(path = %path.display(), "loading config");

        let file = File::open(&path)?;
        let config: Self = serde_json::from_reader(file)?;

        info!(?config, "loaded config");
        Ok(config)
    }

    /// Load the configuration, falling back to defaults on any failure
    #[must_use]
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|err| {
            warn!(error = %err, "failed to load config, using defaults");
            Self::default()
        })
    }

    /// Preferred device filter for discovery, if configured
    #[must_use]
    pub fn preferred_device(&self) -> Option<String> {
        if self.preferred_device.is_empty() {
            None
        } else {
            Some(self.preferred_device.clone())
        }
    }

    /// Webhook threshold as a duration
    #[must_use]
    pub fn webhook_threshold(&self) -> Duration {
        self.webhook_threshold_min
            .map_or(DEFAULT_WEBHOOK_THRESHOLD, |min| {
                Duration::from_secs_f64(min * 60.0)
            })
    }
}
