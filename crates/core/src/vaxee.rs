//! VAXEE battery protocol.
//!
//! Tagged command/response over feature report `0x0E`:
//! - Request: `[0x0E, 0xA5, cmd_id, read_write, data_len, 0x00 ...]`, 64 bytes
//! - Response: `cmd_id` echoed at offset 2, payload byte at offset 5
//!
//! Battery level is reported in 5% steps. Charging state is a separate
//! command; if that exchange fails the reading is still returned, with
//! charging reported as false.

use crate::comm::Pacing;
use crate::device::{BatteryStatus, Product};
use crate::driver::BatteryProtocol;
use crate::error::{Error, Result};
use crate::transport::FeatureReportDevice;
use std::time::Duration;
use tracing::{debug, trace};

/// VAXEE USB Vendor ID.
pub const VENDOR_ID: u16 = 0x3057;
/// Vendor-defined usage page of the command interface.
pub const USAGE_PAGE: u16 = 0xFF05;
pub const USAGE: u16 = 0x0001;

pub const REPORT_ID: u8 = 0x0E;
pub const HEADER: u8 = 0xA5;
pub const REPORT_LEN: usize = 64;

/// Command IDs.
pub mod cmd {
    pub const BATTERY_LEVEL: u8 = 0x0B;
    pub const CHARGING_STATUS: u8 = 0x10;
}

/// Read/write flag for a read request.
pub const READ: u8 = 0x01;

const ECHO_OFFSET: usize = 2;
const PAYLOAD_OFFSET: usize = 5;

/// Wire units per percent step.
pub const PERCENT_PER_UNIT: u16 = 5;

/// Delay between the command write and the reply read.
pub const SETTLE: Duration = Duration::from_millis(100);

/// A VAXEE request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VaxeeCommand {
    pub cmd_id: u8,
    pub read_write: u8,
    pub data_len: u8,
}

impl VaxeeCommand {
    /// A one-byte read of `cmd_id`.
    pub fn read(cmd_id: u8) -> Self {
        Self {
            cmd_id,
            read_write: READ,
            data_len: 0x01,
        }
    }

    /// Encode into a 64-byte feature report.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; REPORT_LEN];
        buf[0] = REPORT_ID;
        buf[1] = HEADER;
        buf[2] = self.cmd_id;
        buf[3] = self.read_write;
        buf[4] = self.data_len;
        buf
    }
}

/// A decoded VAXEE response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VaxeeReply {
    pub cmd_echo: u8,
    pub payload: u8,
}

impl VaxeeReply {
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() <= PAYLOAD_OFFSET {
            return Err(Error::InvalidResponse(format!(
                "VAXEE reply too short: {} bytes (need {})",
                data.len(),
                PAYLOAD_OFFSET + 1
            )));
        }
        Ok(Self {
            cmd_echo: data[ECHO_OFFSET],
            payload: data[PAYLOAD_OFFSET],
        })
    }

    /// A zero echo means the device did not process the command.
    pub fn has_echo(&self) -> bool {
        self.cmd_echo != 0
    }
}

/// Convert the battery payload (5% units) to a percentage.
pub fn battery_percent(raw: u8) -> u8 {
    (u16::from(raw) * PERCENT_PER_UNIT).min(100) as u8
}

/// VAXEE tagged command protocol.
#[derive(Debug, Clone, Copy, Default)]
pub struct VaxeeProtocol {
    pacing: Pacing,
}

impl VaxeeProtocol {
    pub fn new(pacing: Pacing) -> Self {
        Self { pacing }
    }

    fn transact(&self, device: &dyn FeatureReportDevice, command: VaxeeCommand) -> Result<VaxeeReply> {
        device.send_feature_report(&command.encode())?;
        self.pacing.pause(SETTLE);
        let raw = device.get_feature_report(REPORT_ID, REPORT_LEN)?;
        trace!(
            cmd_id = format_args!("0x{:02X}", command.cmd_id),
            head_hex = format_args!("{:02X?}", &raw[..raw.len().min(6)]),
            "VAXEE RX"
        );
        VaxeeReply::decode(&raw)
    }

    fn read_charging(&self, device: &dyn FeatureReportDevice) -> bool {
        match self.transact(device, VaxeeCommand::read(cmd::CHARGING_STATUS)) {
            Ok(reply) => reply.payload != 0,
            Err(e) => {
                debug!(error = %e, "Charging status unavailable, assuming not charging");
                false
            }
        }
    }
}

impl BatteryProtocol for VaxeeProtocol {
    fn read_status(
        &self,
        device: &dyn FeatureReportDevice,
        product: &Product,
    ) -> Result<BatteryStatus> {
        let reply = self.transact(device, VaxeeCommand::read(cmd::BATTERY_LEVEL))?;
        if !reply.has_echo() {
            return Err(Error::InvalidResponse("no cmd_id echo".into()));
        }

        let percentage = battery_percent(reply.payload);
        let is_charging = self.read_charging(device);
        Ok(BatteryStatus::new(percentage, is_charging, !product.wired))
    }
}
