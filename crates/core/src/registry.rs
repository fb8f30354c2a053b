//! Device registry: priority arbitration over the registered drivers.
//!
//! At most one driver is active, and only the active driver holds an open
//! handle between calls.

use crate::comm::Pacing;
use crate::device::{BatteryStatus, ConnectionMode, SUPPORTED_VARIANTS};
use crate::driver::{driver_for, MouseDriver};
use crate::error::{Error, Result};
use crate::transport::HidBackend;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{debug, info, warn};

pub struct DeviceRegistry {
    drivers: Vec<Box<dyn MouseDriver>>,
    active: Option<usize>,
    /// Enumerated paths of preemption candidates that refused to open,
    /// keyed by driver index. Skipped until their enumeration changes.
    refused: HashMap<usize, Vec<String>>,
}

impl DeviceRegistry {
    /// Build a registry from drivers, ordered by priority once. Equal
    /// priorities keep construction order.
    pub fn new(mut drivers: Vec<Box<dyn MouseDriver>>) -> Self {
        drivers.sort_by_key(|d| d.priority());
        Self {
            drivers,
            active: None,
            refused: HashMap::new(),
        }
    }

    /// Registry with one driver per supported device variant.
    pub fn standard(backend: Rc<dyn HidBackend>, pacing: Pacing) -> Self {
        let drivers = SUPPORTED_VARIANTS
            .iter()
            .map(|variant| driver_for(variant, Rc::clone(&backend), pacing))
            .collect();
        Self::new(drivers)
    }

    /// Connect the highest-priority driver that can open its device.
    pub fn find_and_connect(&mut self) -> bool {
        self.disconnect();
        self.refused.clear();
        for (index, driver) in self.drivers.iter_mut().enumerate() {
            if driver.find_and_connect() {
                info!(device_type = driver.device_type(), "Active device selected");
                self.active = Some(index);
                return true;
            }
            let paths = driver.present_paths();
            if !paths.is_empty() {
                self.refused.insert(index, paths);
            }
        }
        debug!("No registered device could be connected");
        false
    }

    /// Release the active driver, if any.
    pub fn disconnect(&mut self) {
        if let Some(driver) = self.active_driver_mut() {
            driver.disconnect();
        }
        self.active = None;
    }

    pub fn is_connected(&self) -> bool {
        self.active_driver().is_some_and(|d| d.is_connected())
    }

    pub fn read_battery(&mut self) -> Result<BatteryStatus> {
        match self.active_driver_mut() {
            Some(driver) => driver.read_battery(),
            None => Err(Error::NotConnected),
        }
    }

    pub fn device_name(&self) -> Option<&'static str> {
        self.active_driver().and_then(|d| d.device_name())
    }

    pub fn connection_mode(&self) -> ConnectionMode {
        self.active_driver()
            .map_or(ConnectionMode::Unknown, |d| d.connection_mode())
    }

    pub fn active_device_type(&self) -> Option<&'static str> {
        self.active_driver().map(|d| d.device_type())
    }

    /// Preempt the active driver with a strictly higher-priority one that
    /// can connect now. Returns true when a switch happened.
    ///
    /// The active handle is released before the candidate opens, and
    /// restored if the candidate fails to open. A candidate that refused
    /// to open is not tried again while its enumerated paths stay the same.
    pub fn should_switch_device(&mut self) -> bool {
        let Some(current) = self.active else {
            return false;
        };
        let current_priority = self.drivers[current].priority();

        for index in 0..self.drivers.len() {
            if index == current || self.drivers[index].priority() >= current_priority {
                continue;
            }
            let paths = self.drivers[index].present_paths();
            if paths.is_empty() {
                self.refused.remove(&index);
                continue;
            }
            if self.refused.get(&index) == Some(&paths) {
                continue;
            }

            self.drivers[current].disconnect();
            if self.drivers[index].find_and_connect() {
                info!(
                    from = self.drivers[current].device_type(),
                    to = self.drivers[index].device_type(),
                    "Switching to higher priority device"
                );
                self.refused.remove(&index);
                self.active = Some(index);
                return true;
            }

            debug!(
                device_type = self.drivers[index].device_type(),
                "Higher priority device present but not connectable"
            );
            self.refused.insert(index, paths);
            if !self.drivers[current].find_and_connect() {
                warn!(
                    device_type = self.drivers[current].device_type(),
                    "Active device lost while trying candidate"
                );
                self.active = None;
                return false;
            }
        }
        false
    }

    /// Number of drivers holding an open handle.
    pub fn connected_count(&self) -> usize {
        self.drivers.iter().filter(|d| d.is_connected()).count()
    }

    fn active_driver(&self) -> Option<&dyn MouseDriver> {
        let index = self.active?;
        self.drivers.get(index).map(|d| d.as_ref())
    }

    fn active_driver_mut(&mut self) -> Option<&mut Box<dyn MouseDriver>> {
        let index = self.active?;
        self.drivers.get_mut(index)
    }
}

impl Drop for DeviceRegistry {
    fn drop(&mut self) {
        self.disconnect();
    }
}
