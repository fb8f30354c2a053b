//! Monitor configuration: JSON file with range validation.
//!
//! Every field has a default, so a partial file (or no file at all) is a
//! valid configuration. Values are bounds-checked after parsing and an
//! out-of-range value is rejected rather than clamped.
//!
//! ```json
//! {
//!   "update_interval_seconds": 300,
//!   "show_notifications": true,
//!   "low_battery_threshold": 20,
//!   "debug_mode": false,
//!   "hotplug": { "arrival_debounce_ms": 1500, "max_arrival_retries": 3 }
//! }
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "MOUSE_BATTERY_CONFIG";
/// Config file name looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "config.json";

pub const UPDATE_INTERVAL_MIN: u64 = 1;
pub const UPDATE_INTERVAL_MAX: u64 = 86_400;
pub const THRESHOLD_MAX: u8 = 100;
pub const WINDOW_MS_MIN: u64 = 1;
pub const WINDOW_MS_MAX: u64 = 60_000;
pub const ARRIVAL_RETRIES_MIN: u32 = 1;
pub const ARRIVAL_RETRIES_MAX: u32 = 10;

/// Hotplug debounce and retry tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HotplugSettings {
    /// Quiet period after an arrival signal before connecting.
    pub arrival_debounce_ms: u64,
    /// Quiet period after a removal signal before disconnecting.
    pub removal_debounce_ms: u64,
    /// Interval between re-reads after a failed first arrival read.
    pub arrival_retry_ms: u64,
    pub max_arrival_retries: u32,
}

impl Default for HotplugSettings {
    fn default() -> Self {
        Self {
            arrival_debounce_ms: 1500,
            removal_debounce_ms: 100,
            arrival_retry_ms: 3000,
            max_arrival_retries: 3,
        }
    }
}

impl HotplugSettings {
    pub fn arrival_debounce(&self) -> Duration {
        Duration::from_millis(self.arrival_debounce_ms)
    }

    pub fn removal_debounce(&self) -> Duration {
        Duration::from_millis(self.removal_debounce_ms)
    }

    pub fn arrival_retry(&self) -> Duration {
        Duration::from_millis(self.arrival_retry_ms)
    }

    pub fn validate(&self) -> Result<()> {
        check_window("arrival_debounce_ms", self.arrival_debounce_ms)?;
        check_window("removal_debounce_ms", self.removal_debounce_ms)?;
        check_window("arrival_retry_ms", self.arrival_retry_ms)?;
        check_range(
            "max_arrival_retries",
            u64::from(self.max_arrival_retries),
            u64::from(ARRIVAL_RETRIES_MIN),
            u64::from(ARRIVAL_RETRIES_MAX),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub update_interval_seconds: u64,
    pub show_notifications: bool,
    /// Percentage at or below which a low-battery notice fires.
    pub low_battery_threshold: u8,
    pub debug_mode: bool,
    pub hotplug: HotplugSettings,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            update_interval_seconds: 300,
            show_notifications: true,
            low_battery_threshold: 20,
            debug_mode: false,
            hotplug: HotplugSettings::default(),
        }
    }
}

impl MonitorConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_seconds)
    }

    pub fn validate(&self) -> Result<()> {
        check_range(
            "update_interval_seconds",
            self.update_interval_seconds,
            UPDATE_INTERVAL_MIN,
            UPDATE_INTERVAL_MAX,
        )?;
        check_range(
            "low_battery_threshold",
            u64::from(self.low_battery_threshold),
            0,
            u64::from(THRESHOLD_MAX),
        )?;
        self.hotplug.validate()
    }

    /// Parse and validate a JSON document.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| Error::Config(format!("invalid JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(Error::Config(format!("{}: {e}", path.display())));
            }
        };

        let config = Self::from_json(&text)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        debug!(path = %path.display(), ?config, "Config loaded");
        Ok(config)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }
}

/// `$MOUSE_BATTERY_CONFIG`, else `config.json` in the working directory.
pub fn default_config_path() -> PathBuf {
    std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME))
}

fn check_window(field: &'static str, ms: u64) -> Result<()> {
    check_range(field, ms, WINDOW_MS_MIN, WINDOW_MS_MAX)
}

fn check_range(field: &'static str, value: u64, min: u64, max: u64) -> Result<()> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(Error::OutOfRange {
            field,
            value,
            min,
            max,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = MonitorConfig::default();
        assert_eq!(c.update_interval(), Duration::from_secs(300));
        assert!(c.show_notifications);
        assert_eq!(c.low_battery_threshold, 20);
        assert!(!c.debug_mode);
        assert_eq!(c.hotplug.arrival_debounce(), Duration::from_millis(1500));
        assert_eq!(c.hotplug.removal_debounce(), Duration::from_millis(100));
        assert_eq!(c.hotplug.arrival_retry(), Duration::from_millis(3000));
        assert_eq!(c.hotplug.max_arrival_retries, 3);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn partial_document_fills_defaults() {
        let c = MonitorConfig::from_json(
            r#"{ "low_battery_threshold": 15, "hotplug": { "max_arrival_retries": 5 } }"#,
        )
        .unwrap();
        assert_eq!(c.low_battery_threshold, 15);
        assert_eq!(c.update_interval_seconds, 300);
        assert_eq!(c.hotplug.max_arrival_retries, 5);
        assert_eq!(c.hotplug.arrival_debounce_ms, 1500);
    }

    #[test]
    fn rejects_out_of_range_values() {
        let err = MonitorConfig::from_json(r#"{ "update_interval_seconds": 0 }"#).unwrap_err();
        assert!(matches!(
            err,
            Error::OutOfRange {
                field: "update_interval_seconds",
                ..
            }
        ));
        assert!(MonitorConfig::from_json(r#"{ "low_battery_threshold": 101 }"#).is_err());
        assert!(MonitorConfig::from_json(r#"{ "hotplug": { "max_arrival_retries": 0 } }"#).is_err());
        assert!(MonitorConfig::from_json(r#"{ "hotplug": { "arrival_retry_ms": 60001 } }"#).is_err());
    }

    #[test]
    fn rejects_malformed_json() {
        let err = MonitorConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let path = std::env::temp_dir().join("mouse-battery-missing-config-8f3a.json");
        let c = MonitorConfig::load(&path).unwrap();
        assert_eq!(c, MonitorConfig::default());
    }

    #[test]
    fn load_reads_file() {
        let path = std::env::temp_dir().join(format!(
            "mouse-battery-config-{}.json",
            std::process::id()
        ));
        std::fs::write(&path, r#"{ "debug_mode": true }"#).unwrap();
        let c = MonitorConfig::load(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert!(c.debug_mode);
    }

    #[test]
    fn pretty_json_parses_back() {
        let text = MonitorConfig::default().to_json_pretty().unwrap();
        assert!(text.contains("\"update_interval_seconds\": 300"));
        assert_eq!(MonitorConfig::from_json(&text).unwrap(), MonitorConfig::default());
    }
}
