//! Low-battery notice policy.

use crate::device::BatteryStatus;
use serde::Serialize;
use tracing::info;

/// Margin above the threshold a reading must reach before the alert re-arms.
pub const REARM_MARGIN: i32 = 5;

/// Title used when no device name is available.
const FALLBACK_NAME: &str = "Mouse";

/// A notice for the presentation layer to show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LowBatteryNotice {
    pub title: String,
    pub message: String,
    pub percentage: i32,
}

impl LowBatteryNotice {
    pub fn new(device_name: Option<&str>, percentage: i32) -> Self {
        Self {
            title: format!("{} - Low Battery", device_name.unwrap_or(FALLBACK_NAME)),
            message: format!("Battery at {percentage}%"),
            percentage,
        }
    }
}

/// Fires once per discharge below the threshold.
#[derive(Debug, Clone)]
pub struct LowBatteryAlert {
    threshold: u8,
    enabled: bool,
    shown: bool,
}

impl LowBatteryAlert {
    pub fn new(threshold: u8, enabled: bool) -> Self {
        Self {
            threshold,
            enabled,
            shown: false,
        }
    }

    pub fn is_shown(&self) -> bool {
        self.shown
    }

    /// Evaluate a fresh reading.
    pub fn check(&mut self, status: &BatteryStatus, device_name: Option<&str>) -> Option<LowBatteryNotice> {
        let threshold = i32::from(self.threshold);

        if status.percentage > threshold + REARM_MARGIN {
            self.shown = false;
        }

        let low = status.percentage > 0 && status.percentage <= threshold;
        if !self.enabled || self.shown || !low || status.is_charging {
            return None;
        }

        self.shown = true;
        info!(percentage = status.percentage, threshold, "Low battery");
        Some(LowBatteryNotice::new(device_name, status.percentage))
    }

    /// Forget a shown notice, e.g. after the device went away.
    pub fn reset(&mut self) {
        self.shown = false;
    }
}
