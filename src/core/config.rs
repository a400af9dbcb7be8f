use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::alerts::notifier::NotifierKind;
use super::tracker::HISTORY_CAPACITY;
use super::zones::Zone;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} must not be negative (got {value})")]
    Negative { field: &'static str, value: f64 },
    #[error("{field} must be a finite number")]
    NotFinite { field: &'static str },
    #[error("{field} is out of range (got {value})")]
    OutOfRange { field: &'static str, value: f64 },
    #[error("zone `{zone}` needs at least 3 finite vertices (got {vertices})")]
    DegenerateZone { zone: String, vertices: usize },
    #[error("restricted zones must be named")]
    UnnamedZone,
    #[error("zone name `{0}` is used more than once")]
    DuplicateZone(String),
    #[error("settings I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("settings file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Rule thresholds. Field names match the config API surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Seconds a track must be present before it can count as loitering
    pub loitering_time: f64,
    /// Maximum movement extent (x or y) still considered stationary
    pub loitering_distance: f64,
    /// Position samples required before loitering is judged
    pub loitering_min_samples: usize,
    pub max_persons: usize,
    pub crowd_threshold: usize,
    pub cooldown_seconds: f64,
    /// Width/height ratio above which a person box counts as fallen
    pub fall_aspect_ratio: f64,
    /// Mean displacement per frame above which movement is suspicious
    pub suspicious_speed: f64,
    /// Tracks unseen for this long are forgotten
    pub track_ttl_seconds: f64,
    pub notify_timeout_ms: u64,
    pub restricted_zones: Vec<Zone>,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            loitering_time: 15.0,
            loitering_distance: 50.0,
            loitering_min_samples: 10,
            max_persons: 3,
            crowd_threshold: 5,
            cooldown_seconds: 5.0,
            fall_aspect_ratio: 1.5,
            suspicious_speed: 100.0,
            track_ttl_seconds: 30.0,
            notify_timeout_ms: 2_000,
            restricted_zones: Vec::new(),
        }
    }
}

fn check_number(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() {
        return Err(ConfigError::NotFinite { field });
    }
    if value < 0.0 {
        return Err(ConfigError::Negative { field, value });
    }
    Ok(())
}

fn check_seconds(field: &'static str, value: f64) -> Result<(), ConfigError> {
    check_number(field, value)?;
    Duration::try_from_secs_f64(value)
        .map(|_| ())
        .map_err(|_| ConfigError::OutOfRange { field, value })
}

impl AlertConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_seconds("loitering_time", self.loitering_time)?;
        check_number("loitering_distance", self.loitering_distance)?;
        check_seconds("cooldown_seconds", self.cooldown_seconds)?;
        check_number("fall_aspect_ratio", self.fall_aspect_ratio)?;
        check_number("suspicious_speed", self.suspicious_speed)?;
        check_seconds("track_ttl_seconds", self.track_ttl_seconds)?;
        // More samples than a track can hold would never be reached
        if self.loitering_min_samples > HISTORY_CAPACITY {
            return Err(ConfigError::OutOfRange {
                field: "loitering_min_samples",
                value: self.loitering_min_samples as f64,
            });
        }

        let mut names = HashSet::new();
        for zone in &self.restricted_zones {
            if zone.name.trim().is_empty() {
                return Err(ConfigError::UnnamedZone);
            }
            if zone.points.len() < 3 || zone.points.iter().any(|p| !p.is_finite()) {
                return Err(ConfigError::DegenerateZone {
                    zone: zone.name.clone(),
                    vertices: zone.points.len(),
                });
            }
            if !names.insert(zone.name.as_str()) {
                return Err(ConfigError::DuplicateZone(zone.name.clone()));
            }
        }
        Ok(())
    }

    pub fn loitering_duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.loitering_time).unwrap_or(Duration::MAX)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::try_from_secs_f64(self.cooldown_seconds).unwrap_or(Duration::MAX)
    }

    pub fn track_ttl(&self) -> Duration {
        Duration::try_from_secs_f64(self.track_ttl_seconds).unwrap_or(Duration::MAX)
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_millis(self.notify_timeout_ms)
    }

    /// Apply a partial update and validate the result without touching `self`.
    pub fn patched(&self, patch: &ConfigPatch) -> Result<AlertConfig, ConfigError> {
        let mut next = self.clone();
        if let Some(v) = patch.loitering_time {
            next.loitering_time = v;
        }
        if let Some(v) = patch.loitering_distance {
            next.loitering_distance = v;
        }
        if let Some(v) = patch.max_persons {
            next.max_persons = v;
        }
        if let Some(v) = patch.crowd_threshold {
            next.crowd_threshold = v;
        }
        if let Some(v) = patch.cooldown_seconds {
            next.cooldown_seconds = v;
        }
        if let Some(zones) = &patch.restricted_zones {
            next.restricted_zones = zones.clone();
        }
        next.validate()?;
        Ok(next)
    }
}

/// Partial config update; absent fields keep their current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigPatch {
    pub loitering_time: Option<f64>,
    pub loitering_distance: Option<f64>,
    pub max_persons: Option<usize>,
    pub crowd_threshold: Option<usize>,
    pub cooldown_seconds: Option<f64>,
    pub restricted_zones: Option<Vec<Zone>>,
}

/// Application settings persisted in `settings.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub alert: AlertConfig,
    #[serde(default)]
    pub notifier: NotifierKind,
    /// Age window used when counting active alerts for frame stats
    #[serde(default = "default_recent_window")]
    pub recent_window_seconds: u64,
}

fn default_recent_window() -> u64 {
    10
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            alert: AlertConfig::default(),
            notifier: NotifierKind::default(),
            recent_window_seconds: default_recent_window(),
        }
    }
}

pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new(config_dir: PathBuf) -> Self {
        Self {
            config_path: config_dir.join("settings.json"),
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.config_path
    }

    /// Load settings, falling back to defaults when the file is missing,
    /// unreadable or fails validation.
    pub fn load(&self) -> Settings {
        if !self.config_path.exists() {
            return Settings::default();
        }
        match self.try_load() {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("Ignoring {:?}: {}", self.config_path, e);
                Settings::default()
            }
        }
    }

    fn try_load(&self) -> Result<Settings, ConfigError> {
        let content = fs::read_to_string(&self.config_path)?;
        let settings: Settings = serde_json::from_str(&content)?;
        settings.alert.validate()?;
        Ok(settings)
    }

    pub fn save(&self, settings: &Settings) -> io::Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(settings)?;
        fs::write(&self.config_path, content)
    }
}
