//! mouse-battery-core: vendor battery protocols, device arbitration, and the
//! polling/hotplug engine.
//!
//! This crate reads battery telemetry from Endgame Gear and VAXEE wireless
//! mice over HID feature reports and reduces it to a single normalized
//! status, tolerating mice that sleep and noisy hotplug notifications.

pub mod alert;
pub mod comm;
pub mod config;
pub mod device;
pub mod driver;
pub mod endgame;
pub mod engine;
pub mod error;
pub mod hotplug;
pub mod monitor;
pub mod registry;
pub mod timer;
pub mod transport;
pub mod vaxee;
pub mod watcher;

/// Known product IDs.
pub mod pids {
    /// Endgame Gear OP1W (wired).
    pub const OP1W: u16 = 0x1972;
    /// Endgame Gear XM2W v2 (wired).
    pub const XM2W_V2: u16 = 0x1982;
    /// Endgame Gear wireless receiver.
    pub const ENDGAME_GEAR_DONGLE: u16 = 0x1970;
    /// VAXEE wireless receiver.
    pub const VAXEE_DONGLE: u16 = 0x1001;
    /// VAXEE 4K wireless receiver.
    pub const VAXEE_4K_DONGLE: u16 = 0x1002;
    /// Older VAXEE receiver firmware.
    pub const VAXEE_DONGLE_LEGACY: u16 = 0x0005;
    /// VAXEE 4K receiver, dual-track firmware.
    pub const VAXEE_4K_DUAL_TRACK: u16 = 0x2001;

    /// VAXEE XE Wireless (cabled).
    pub const VAXEE_XE: u16 = 0x1003;
    /// ZYGEN NP-01S Wireless (cabled).
    pub const ZYGEN_NP01S: u16 = 0x1004;
    /// VAXEE AX Wireless (cabled).
    pub const VAXEE_AX: u16 = 0x1005;
    /// ZYGEN NP-01 Wireless (cabled).
    pub const ZYGEN_NP01: u16 = 0x1006;
    /// VAXEE XE-S Wireless (cabled).
    pub const VAXEE_XE_S: u16 = 0x1007;
    /// VAXEE XE-S-L Wireless (cabled).
    pub const VAXEE_XE_S_L: u16 = 0x1008;
    /// VAXEE x NINJUTSO Sora Wireless (cabled).
    pub const VAXEE_SORA: u16 = 0x1009;
    /// VAXEE E1 Wireless (cabled).
    pub const VAXEE_E1: u16 = 0x1010;
    /// ZYGEN NP-01S V2 Wireless (cabled).
    pub const ZYGEN_NP01S_V2: u16 = 0x1011;
    /// VAXEE XE V2 Wireless (cabled).
    pub const VAXEE_XE_V2: u16 = 0x1012;
    /// ZYGEN NP-01S Ergo Wireless (cabled).
    pub const ZYGEN_NP01S_ERGO: u16 = 0x1013;
}
