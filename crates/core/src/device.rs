//! Device model: battery readings, supported products, and discovery.

use crate::error::Result;
use crate::transport::HidBackend;
use crate::{endgame, vaxee};
use serde::Serialize;
use tracing::{debug, info};

/// A single battery reading.
///
/// `percentage` is `-1` when the level is unknown (no device, or the read
/// failed); otherwise it lies in `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatteryStatus {
    pub percentage: i32,
    pub is_charging: bool,
    pub is_wireless: bool,
}

impl BatteryStatus {
    /// Sentinel percentage for "unknown / disconnected".
    pub const UNKNOWN_PERCENTAGE: i32 = -1;

    /// A reading with the level clamped to 100.
    pub fn new(percentage: u8, is_charging: bool, is_wireless: bool) -> Self {
        Self {
            percentage: i32::from(percentage.min(100)),
            is_charging,
            is_wireless,
        }
    }

    pub const fn unknown() -> Self {
        Self {
            percentage: Self::UNKNOWN_PERCENTAGE,
            is_charging: false,
            is_wireless: false,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.percentage >= 0
    }
}

impl Default for BatteryStatus {
    fn default() -> Self {
        Self::unknown()
    }
}

/// How the active device is attached, derived from its product ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionMode {
    Unknown,
    Wired,
    Wireless,
}

impl ConnectionMode {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Wired => "Wired (Charging)",
            Self::Wireless => "Wireless",
        }
    }
}

impl std::fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Vendor protocol family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    /// Endgame Gear: fixed report ID command/response with a wake pass.
    EndgameGear,
    /// VAXEE: tagged header + command ID exchanges.
    Vaxee,
}

impl Family {
    pub fn vendor_id(&self) -> u16 {
        match self {
            Self::EndgameGear => endgame::VENDOR_ID,
            Self::Vaxee => vaxee::VENDOR_ID,
        }
    }

    pub fn usage_page(&self) -> u16 {
        match self {
            Self::EndgameGear => endgame::USAGE_PAGE,
            Self::Vaxee => vaxee::USAGE_PAGE,
        }
    }

    pub fn usage(&self) -> u16 {
        match self {
            Self::EndgameGear => endgame::USAGE,
            Self::Vaxee => vaxee::USAGE,
        }
    }
}

/// One USB product ID a variant can appear under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Product {
    pub pid: u16,
    pub name: &'static str,
    /// Cable-attached (and therefore charging) rather than through a dongle.
    pub wired: bool,
}

impl Product {
    pub const fn wired(pid: u16, name: &'static str) -> Self {
        Self {
            pid,
            name,
            wired: true,
        }
    }

    pub const fn dongle(pid: u16, name: &'static str) -> Self {
        Self {
            pid,
            name,
            wired: false,
        }
    }

    pub fn connection_mode(&self) -> ConnectionMode {
        if self.wired {
            ConnectionMode::Wired
        } else {
            ConnectionMode::Wireless
        }
    }
}

/// A registrable device type: its protocol family, arbitration priority, and
/// the product IDs it answers to (tried in order).
#[derive(Debug, PartialEq, Eq)]
pub struct DeviceVariant {
    /// Stable identity for logs and diagnostics.
    pub device_type: &'static str,
    pub family: Family,
    /// Lower wins.
    pub priority: u8,
    pub products: &'static [Product],
}

impl DeviceVariant {
    pub fn product(&self, pid: u16) -> Option<&'static Product> {
        self.products.iter().find(|p| p.pid == pid)
    }
}

pub static OP1W_MOUSE: DeviceVariant = DeviceVariant {
    device_type: "OP1WMouse",
    family: Family::EndgameGear,
    priority: 1,
    products: &[Product::wired(crate::pids::OP1W, "OP1W")],
};

pub static XM2W_V2_MOUSE: DeviceVariant = DeviceVariant {
    device_type: "XM2Wv2Mouse",
    family: Family::EndgameGear,
    priority: 2,
    products: &[Product::wired(crate::pids::XM2W_V2, "XM2W v2")],
};

pub static ENDGAME_GEAR_DONGLE: DeviceVariant = DeviceVariant {
    device_type: "EndgameGearDongle",
    family: Family::EndgameGear,
    priority: 3,
    products: &[Product::dongle(
        crate::pids::ENDGAME_GEAR_DONGLE,
        "Endgame Gear Dongle",
    )],
};

pub static VAXEE_MOUSE: DeviceVariant = DeviceVariant {
    device_type: "VaxeeMouse",
    family: Family::Vaxee,
    priority: 4,
    products: &[
        Product::wired(crate::pids::VAXEE_XE, "VAXEE XE Wireless"),
        Product::wired(crate::pids::ZYGEN_NP01S, "ZYGEN NP-01S Wireless"),
        Product::wired(crate::pids::VAXEE_AX, "VAXEE AX Wireless"),
        Product::wired(crate::pids::ZYGEN_NP01, "ZYGEN NP-01 Wireless"),
        Product::wired(crate::pids::VAXEE_XE_S, "VAXEE XE-S Wireless"),
        Product::wired(crate::pids::VAXEE_XE_S_L, "VAXEE XE-S-L Wireless"),
        Product::wired(crate::pids::VAXEE_SORA, "VAXEE x NINJUTSO Sora Wireless"),
        Product::wired(crate::pids::VAXEE_E1, "VAXEE E1 Wireless"),
        Product::wired(crate::pids::ZYGEN_NP01S_V2, "ZYGEN NP-01S V2 Wireless"),
        Product::wired(crate::pids::VAXEE_XE_V2, "VAXEE XE V2 Wireless"),
        Product::wired(crate::pids::ZYGEN_NP01S_ERGO, "ZYGEN NP-01S Ergo Wireless"),
    ],
};

pub static VAXEE_DONGLE: DeviceVariant = DeviceVariant {
    device_type: "VaxeeDongle",
    family: Family::Vaxee,
    priority: 5,
    products: &[
        Product::dongle(crate::pids::VAXEE_DONGLE, "VAXEE Dongle"),
        Product::dongle(crate::pids::VAXEE_4K_DONGLE, "VAXEE 4K Dongle"),
        Product::dongle(crate::pids::VAXEE_DONGLE_LEGACY, "VAXEE Dongle"),
        Product::dongle(
            crate::pids::VAXEE_4K_DUAL_TRACK,
            "VAXEE 4K Dongle (Dual-track)",
        ),
    ],
};

/// Every variant the registry knows, in registration order.
pub static SUPPORTED_VARIANTS: [&DeviceVariant; 5] = [
    &OP1W_MOUSE,
    &XM2W_V2_MOUSE,
    &ENDGAME_GEAR_DONGLE,
    &VAXEE_MOUSE,
    &VAXEE_DONGLE,
];

/// Vendor IDs of all supported families, deduplicated.
pub fn supported_vendor_ids() -> Vec<u16> {
    let mut vids: Vec<u16> = SUPPORTED_VARIANTS
        .iter()
        .map(|v| v.family.vendor_id())
        .collect();
    vids.sort_unstable();
    vids.dedup();
    vids
}

/// Information about a discovered supported interface.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    pub device_type: &'static str,
    pub name: &'static str,
    pub vid: u16,
    pub pid: u16,
    pub mode: ConnectionMode,
    pub path: String,
}

/// Discover all connected supported mice and dongles.
///
/// Only interfaces carrying the family's vendor usage page/usage are
/// reported, since those are the ones battery commands go to.
pub fn discover_devices(backend: &dyn HidBackend) -> Result<Vec<DeviceInfo>> {
    debug!("Starting HID device enumeration");
    let interfaces = backend.interfaces()?;

    let mut devices = Vec::new();
    for info in &interfaces {
        for variant in SUPPORTED_VARIANTS {
            let family = variant.family;
            if info.vendor_id != family.vendor_id()
                || info.usage_page != family.usage_page()
                || info.usage != family.usage()
            {
                continue;
            }
            if let Some(product) = variant.product(info.product_id) {
                info!(
                    device_type = variant.device_type,
                    name = product.name,
                    vid = format_args!("0x{:04X}", info.vendor_id),
                    pid = format_args!("0x{:04X}", info.product_id),
                    path = %info.path,
                    "Found supported device"
                );
                devices.push(DeviceInfo {
                    device_type: variant.device_type,
                    name: product.name,
                    vid: info.vendor_id,
                    pid: info.product_id,
                    mode: product.connection_mode(),
                    path: info.path.clone(),
                });
            }
        }
    }

    debug!(count = devices.len(), "Device enumeration complete");
    Ok(devices)
}
