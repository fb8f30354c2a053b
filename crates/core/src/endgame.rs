//! Endgame Gear battery protocol.
//!
//! A single command/response over a fixed feature report:
//! - Request: `[0xA1, 0xB4, 0x00 ...]`, 64 bytes
//! - Response: report `0xA1`, status byte at offset 1, battery level at offset 16
//!
//! Devices that were idle answer the first query with stale data, so every
//! read issues a wake exchange whose response is discarded, then a second
//! exchange whose response is validated.

use crate::comm::Pacing;
use crate::device::{BatteryStatus, Product};
use crate::driver::BatteryProtocol;
use crate::error::{Error, Result};
use crate::transport::FeatureReportDevice;
use std::time::Duration;
use tracing::trace;

/// Endgame Gear USB Vendor ID.
pub const VENDOR_ID: u16 = 0x3367;
/// Vendor-defined usage page of the command interface.
pub const USAGE_PAGE: u16 = 0xFF01;
pub const USAGE: u16 = 0x0002;

pub const REPORT_ID: u8 = 0xA1;
pub const BATTERY_CMD: u8 = 0xB4;
pub const REPORT_LEN: usize = 64;

/// Status byte values accepted as a valid battery reply.
pub const STATUS_NORMAL: u8 = 0x01;
pub const STATUS_CHARGING: u8 = 0x08;

const STATUS_OFFSET: usize = 1;
const LEVEL_OFFSET: usize = 16;

/// Delay between the command write and the reply read.
pub const SETTLE: Duration = Duration::from_millis(350);
/// Extra delay after the discarded wake exchange.
pub const WAKE_PAUSE: Duration = Duration::from_millis(100);

/// Encode the battery query report.
pub fn encode_battery_query() -> Vec<u8> {
    let mut buf = vec![0u8; REPORT_LEN];
    buf[0] = REPORT_ID;
    buf[1] = BATTERY_CMD;
    buf
}

/// A validated battery reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatteryReply {
    pub status: u8,
    pub level: u8,
}

impl BatteryReply {
    /// Decode and validate a raw feature report.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() <= LEVEL_OFFSET {
            return Err(Error::InvalidResponse(format!(
                "battery reply too short: {} bytes (need {})",
                data.len(),
                LEVEL_OFFSET + 1
            )));
        }

        let status = data[STATUS_OFFSET];
        if status != STATUS_NORMAL && status != STATUS_CHARGING {
            return Err(Error::InvalidResponse(format!(
                "unexpected status byte 0x{status:02X}"
            )));
        }

        Ok(Self {
            status,
            level: data[LEVEL_OFFSET],
        })
    }

    /// Battery level clamped to 0..=100.
    pub fn percentage(&self) -> u8 {
        self.level.min(100)
    }
}

/// Endgame Gear command/response protocol.
#[derive(Debug, Clone, Copy, Default)]
pub struct EndgameProtocol {
    pacing: Pacing,
}

impl EndgameProtocol {
    pub fn new(pacing: Pacing) -> Self {
        Self { pacing }
    }

    fn exchange(&self, device: &dyn FeatureReportDevice) -> Result<Vec<u8>> {
        device.send_feature_report(&encode_battery_query())?;
        self.pacing.pause(SETTLE);
        let raw = device.get_feature_report(REPORT_ID, REPORT_LEN)?;
        trace!(
            head_hex = format_args!("{:02X?}", &raw[..raw.len().min(4)]),
            level = raw.get(LEVEL_OFFSET).copied(),
            "Endgame Gear RX"
        );
        Ok(raw)
    }
}

impl BatteryProtocol for EndgameProtocol {
    fn read_status(
        &self,
        device: &dyn FeatureReportDevice,
        product: &Product,
    ) -> Result<BatteryStatus> {
        // Wake exchange: response discarded.
        self.exchange(device)?;
        self.pacing.pause(WAKE_PAUSE);

        let raw = self.exchange(device)?;
        let reply = BatteryReply::decode(&raw)?;
        Ok(BatteryStatus::new(
            reply.percentage(),
            product.wired,
            !product.wired,
        ))
    }
}
