//! Polling engine: cache and failure-tolerance policy over the registry.
//!
//! A read failure while the device handle is still open and a reading is
//! cached counts as the mouse sleeping: the cached reading is re-emitted and
//! nothing is disconnected. Any other failure gets one reconnect attempt
//! before the cache is cleared.

use crate::alert::{LowBatteryAlert, LowBatteryNotice};
use crate::comm::FailureKind;
use crate::device::{BatteryStatus, ConnectionMode};
use crate::error::Error;
use crate::registry::DeviceRegistry;
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};

/// Where an emitted status came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StatusSource {
    /// Read from the device on this poll.
    Fresh,
    /// Last good reading held while the device does not answer.
    Cached,
    /// No reading available.
    Disconnected,
}

/// Everything the presentation layer needs after one poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub status: BatteryStatus,
    pub device_name: Option<&'static str>,
    pub connection_mode: ConnectionMode,
    pub source: StatusSource,
    pub low_battery: Option<LowBatteryNotice>,
}

impl StatusReport {
    pub fn disconnected() -> Self {
        Self {
            status: BatteryStatus::unknown(),
            device_name: None,
            connection_mode: ConnectionMode::Unknown,
            source: StatusSource::Disconnected,
            low_battery: None,
        }
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.status.is_valid() {
            return write!(f, "Mouse Battery Monitor\nNo device connected");
        }
        write!(
            f,
            "{}\n{}\nBattery: {}%",
            self.device_name.unwrap_or("Unknown"),
            self.connection_mode,
            self.status.percentage
        )
    }
}

pub struct BatteryMonitor {
    registry: DeviceRegistry,
    alert: LowBatteryAlert,
    last_known: BatteryStatus,
    consecutive_failures: u32,
    current: StatusReport,
}

impl BatteryMonitor {
    pub fn new(registry: DeviceRegistry, alert: LowBatteryAlert) -> Self {
        Self {
            registry,
            alert,
            last_known: BatteryStatus::unknown(),
            consecutive_failures: 0,
            current: StatusReport::disconnected(),
        }
    }

    /// One poll tick.
    pub fn update(&mut self) -> StatusReport {
        self.ensure_connected();

        let err = match self.registry.read_battery() {
            Ok(status) => return self.accept(status),
            Err(e) => e,
        };

        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        let handle_open = self.handle_usable(&err);

        if handle_open && self.last_known.is_valid() {
            debug!(
                failures = self.consecutive_failures,
                percentage = self.last_known.percentage,
                error = %err,
                "Device not answering, holding cached reading"
            );
            return self.emit(self.last_known, StatusSource::Cached, None);
        }

        debug!(
            failures = self.consecutive_failures,
            error = %err,
            "Read failed without a usable handle or cache, reconnecting"
        );
        self.registry.disconnect();
        if !self.registry.find_and_connect() {
            return self.clear("reconnect failed");
        }

        match self.registry.read_battery() {
            Ok(status) => {
                info!("Device reconnected");
                self.accept(status)
            }
            Err(e) if self.last_known.is_valid() => {
                debug!(error = %e, "Read after reconnect failed, holding cached reading");
                self.emit(self.last_known, StatusSource::Cached, None)
            }
            Err(e) => {
                debug!(error = %e, "Read after reconnect failed");
                self.emit(BatteryStatus::unknown(), StatusSource::Disconnected, None)
            }
        }
    }

    /// A debounced OS arrival: connect and read once.
    pub fn on_device_arrived(&mut self) -> StatusReport {
        info!("Device arrival");
        self.update()
    }

    /// A debounced OS removal. Authoritative: bypasses sleep tolerance.
    pub fn on_device_removed(&mut self) -> StatusReport {
        info!("Device removal");
        self.registry.disconnect();
        self.consecutive_failures = 0;
        self.alert.reset();
        self.clear("device removed")
    }

    /// Last poll succeeded and produced a reading.
    pub fn has_valid_status(&self) -> bool {
        self.consecutive_failures == 0 && self.last_known.is_valid()
    }

    /// Ad-hoc read for diagnostics. Leaves cache, failure count and alert
    /// state untouched.
    pub fn trigger_test_notification(&mut self, fallback_percentage: i32) -> LowBatteryNotice {
        let percentage = match self.registry.read_battery() {
            Ok(status) => status.percentage,
            Err(e) => {
                debug!(error = %e, fallback_percentage, "Test read failed, using fallback");
                fallback_percentage
            }
        };
        let name = if self.registry.is_connected() {
            self.registry.device_name()
        } else {
            None
        };
        info!(percentage, "Test notification");
        LowBatteryNotice::new(name, percentage)
    }

    /// Most recently emitted report.
    pub fn current(&self) -> &StatusReport {
        &self.current
    }

    pub fn last_known(&self) -> BatteryStatus {
        self.last_known
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn is_connected(&self) -> bool {
        self.registry.is_connected()
    }

    /// Release the device handle.
    pub fn shutdown(&mut self) {
        self.registry.disconnect();
    }

    fn ensure_connected(&mut self) {
        if self.registry.is_connected() {
            self.registry.should_switch_device();
        } else {
            debug!("No device connected, searching");
            self.registry.find_and_connect();
        }
    }

    /// A handle that reported itself gone is not worth holding on to.
    fn handle_usable(&self, err: &Error) -> bool {
        self.registry.is_connected() && FailureKind::classify(err) != FailureKind::Disconnected
    }

    fn accept(&mut self, status: BatteryStatus) -> StatusReport {
        if self.consecutive_failures > 0 {
            debug!(failures = self.consecutive_failures, "Device answering again");
        }
        self.consecutive_failures = 0;
        self.last_known = status;
        let notice = self.alert.check(&status, self.registry.device_name());
        self.emit(status, StatusSource::Fresh, notice)
    }

    fn clear(&mut self, reason: &str) -> StatusReport {
        if self.last_known.is_valid() {
            warn!(reason, "Device lost, clearing cached reading");
        }
        self.last_known = BatteryStatus::unknown();
        self.emit(BatteryStatus::unknown(), StatusSource::Disconnected, None)
    }

    fn emit(
        &mut self,
        status: BatteryStatus,
        source: StatusSource,
        low_battery: Option<LowBatteryNotice>,
    ) -> StatusReport {
        self.current = StatusReport {
            status,
            device_name: self.registry.device_name(),
            connection_mode: self.registry.connection_mode(),
            source,
            low_battery,
        };
        self.current.clone()
    }
}
