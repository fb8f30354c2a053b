//! Protocol drivers: one instance per registered device variant.
//!
//! A driver owns at most one open HID handle. It is connected exactly when
//! that handle is open, and it remembers which product ID it matched so the
//! display name and connection mode can be derived from it.

use crate::comm::{self, Pacing, READ_ATTEMPTS};
use crate::device::{BatteryStatus, ConnectionMode, DeviceVariant, Family, Product};
use crate::endgame::EndgameProtocol;
use crate::error::{Error, Result};
use crate::transport::{FeatureReportDevice, HidBackend, InterfaceInfo};
use crate::vaxee::VaxeeProtocol;
use std::rc::Rc;
use tracing::{debug, info};

/// Fixed capability set every device driver provides.
pub trait MouseDriver {
    /// Open the first matching interface, trying product IDs in declared order.
    fn find_and_connect(&mut self) -> bool;

    /// Close the handle. Idempotent.
    fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    /// Paths of matching interfaces currently enumerated, without opening any.
    fn present_paths(&self) -> Vec<String>;

    fn is_present(&self) -> bool {
        !self.present_paths().is_empty()
    }

    /// Perform the vendor exchange. The handle stays open on failure.
    fn read_battery(&mut self) -> Result<BatteryStatus>;

    /// Display name of the matched product, if connected.
    fn device_name(&self) -> Option<&'static str>;

    fn device_type(&self) -> &'static str;

    /// Arbitration priority; lower wins.
    fn priority(&self) -> u8;

    fn connection_mode(&self) -> ConnectionMode;

    /// Matched product ID, or 0 when disconnected.
    fn current_pid(&self) -> u16;
}

/// One vendor's battery exchange over an already open device.
pub trait BatteryProtocol {
    fn read_status(&self, device: &dyn FeatureReportDevice, product: &Product)
        -> Result<BatteryStatus>;
}

/// Driver for one device variant speaking protocol `P`.
pub struct FeatureReportDriver<P> {
    variant: &'static DeviceVariant,
    backend: Rc<dyn HidBackend>,
    protocol: P,
    handle: Option<Box<dyn FeatureReportDevice>>,
    product: Option<&'static Product>,
}

impl<P: BatteryProtocol> FeatureReportDriver<P> {
    pub fn new(variant: &'static DeviceVariant, backend: Rc<dyn HidBackend>, protocol: P) -> Self {
        Self {
            variant,
            backend,
            protocol,
            handle: None,
            product: None,
        }
    }

    /// Enumerated interfaces of `product` on this family's command usage.
    fn command_interfaces(&self, product: &Product) -> Vec<InterfaceInfo> {
        let family = self.variant.family;
        match self.backend.enumerate(family.vendor_id(), product.pid) {
            Ok(list) => list
                .into_iter()
                .filter(|i| i.usage_page == family.usage_page() && i.usage == family.usage())
                .collect(),
            Err(e) => {
                debug!(
                    device_type = self.variant.device_type,
                    pid = format_args!("0x{:04X}", product.pid),
                    error = %e,
                    "Enumeration failed"
                );
                Vec::new()
            }
        }
    }

    fn connect_product(&mut self, product: &'static Product) -> bool {
        for info in self.command_interfaces(product) {
            match self.backend.open(&info.path) {
                Ok(handle) => {
                    self.handle = Some(handle);
                    self.product = Some(product);
                    info!(
                        device_type = self.variant.device_type,
                        pid = format_args!("0x{:04X}", product.pid),
                        name = product.name,
                        "Device connected"
                    );
                    return true;
                }
                Err(e) => {
                    debug!(
                        device_type = self.variant.device_type,
                        path = %info.path,
                        error = %e,
                        "Open failed, trying next interface"
                    );
                }
            }
        }
        false
    }
}

impl<P: BatteryProtocol> MouseDriver for FeatureReportDriver<P> {
    fn find_and_connect(&mut self) -> bool {
        self.disconnect();
        let variant = self.variant;
        variant
            .products
            .iter()
            .any(|product| self.connect_product(product))
    }

    fn disconnect(&mut self) {
        if self.handle.take().is_some() {
            debug!(device_type = self.variant.device_type, "Device handle closed");
        }
        self.product = None;
    }

    fn is_connected(&self) -> bool {
        self.handle.is_some()
    }

    fn present_paths(&self) -> Vec<String> {
        self.variant
            .products
            .iter()
            .flat_map(|product| self.command_interfaces(product))
            .map(|info| info.path)
            .collect()
    }

    fn read_battery(&mut self) -> Result<BatteryStatus> {
        let (Some(device), Some(product)) = (self.handle.as_deref(), self.product) else {
            debug!(device_type = self.variant.device_type, "Device not connected");
            return Err(Error::NotConnected);
        };

        let status = comm::read_with_retry(self.variant.device_type, READ_ATTEMPTS, || {
            self.protocol.read_status(device, product)
        })?;

        debug!(
            device_type = self.variant.device_type,
            percentage = status.percentage,
            charging = status.is_charging,
            "Battery read"
        );
        Ok(status)
    }

    fn device_name(&self) -> Option<&'static str> {
        self.product.map(|p| p.name)
    }

    fn device_type(&self) -> &'static str {
        self.variant.device_type
    }

    fn priority(&self) -> u8 {
        self.variant.priority
    }

    fn connection_mode(&self) -> ConnectionMode {
        self.product
            .map_or(ConnectionMode::Unknown, |p| p.connection_mode())
    }

    fn current_pid(&self) -> u16 {
        self.product.map_or(0, |p| p.pid)
    }
}

/// Build the driver matching a variant's protocol family.
pub fn driver_for(
    variant: &'static DeviceVariant,
    backend: Rc<dyn HidBackend>,
    pacing: Pacing,
) -> Box<dyn MouseDriver> {
    match variant.family {
        Family::EndgameGear => Box::new(FeatureReportDriver::new(
            variant,
            backend,
            EndgameProtocol::new(pacing),
        )),
        Family::Vaxee => Box::new(FeatureReportDriver::new(
            variant,
            backend,
            VaxeeProtocol::new(pacing),
        )),
    }
}
