//! Error types for mouse-battery-core.

use thiserror::Error;

/// Core library error type.
#[derive(Debug, Error)]
pub enum Error {
    /// HID device communication failure.
    #[error("HID error: {0}")]
    Hid(String),

    /// Operation needs an open device handle and there is none.
    #[error("device not connected")]
    NotConnected,

    /// Response failed a protocol sanity check.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Value out of safe range.
    #[error("value out of range: {field} = {value} (allowed {min}..={max})")]
    OutOfRange {
        field: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },

    /// Configuration file could not be read or parsed.
    #[error("config error: {0}")]
    Config(String),

    /// Permission denied (interface held exclusively or missing udev rule).
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Operation timed out.
    #[error("timeout: {0}")]
    Timeout(String),
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, Error>;
