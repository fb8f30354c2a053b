//! Device communication layer with failure classification and retry logic.
//!
//! Battery reads are retried as a whole: a vendor exchange is several
//! write/settle/read steps and a partial retry cannot recover a device that
//! lost the first command.

use crate::error::{Error, Result};
use std::time::Duration;
use tracing::{debug, warn};

/// Whole-read attempts a driver makes before giving up.
pub const READ_ATTEMPTS: u32 = 2;

/// Classification of read failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Report write/read failed at the transport.
    Transport,
    /// Response arrived but failed a protocol sanity check.
    Validation,
    /// Device did not answer in time (typical of a sleeping mouse).
    Timeout,
    /// Device handle is gone or was never opened.
    Disconnected,
    /// Interface is held exclusively or lacks access rights.
    PermissionDenied,
}

impl FailureKind {
    /// Classify an error for retry decisions.
    pub fn classify(err: &Error) -> Self {
        match err {
            Error::Timeout(_) => Self::Timeout,
            Error::InvalidResponse(_) | Error::OutOfRange { .. } | Error::Config(_) => {
                Self::Validation
            }
            Error::NotConnected => Self::Disconnected,
            Error::PermissionDenied(_) => Self::PermissionDenied,
            Error::Hid(msg) => {
                let lower = msg.to_lowercase();
                if lower.contains("no such device") || lower.contains("disconnect") {
                    Self::Disconnected
                } else if lower.contains("timeout") || lower.contains("timed out") {
                    Self::Timeout
                } else {
                    Self::Transport
                }
            }
        }
    }

    /// Whether a whole-read retry can help.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport | Self::Validation | Self::Timeout)
    }
}

/// Run `read` up to `attempts` times, stopping at the first success or at
/// a failure that retrying cannot fix.
pub fn read_with_retry<T>(
    device_type: &str,
    attempts: u32,
    mut read: impl FnMut() -> Result<T>,
) -> Result<T> {
    let attempts = attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        match read() {
            Ok(value) => {
                if attempt > 1 {
                    debug!(device_type, attempt, "Battery read succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) => {
                let kind = FailureKind::classify(&e);
                if !kind.is_retryable() || attempt == attempts {
                    debug!(
                        device_type,
                        kind = ?kind,
                        attempt,
                        attempts,
                        error = %e,
                        "Battery read failed"
                    );
                    return Err(e);
                }
                debug!(device_type, kind = ?kind, attempt, error = %e, "Battery read failed, retrying");
                last_error = Some(e);
            }
        }
    }

    let err = last_error.unwrap_or_else(|| Error::Hid("retry loop completed without result".into()));
    warn!(device_type, error = %err, "Battery read gave up");
    Err(err)
}

/// Whether protocol settle times are honoured.
///
/// Real hardware needs the pauses between a command write and its reply
/// read; simulated devices answer immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pacing {
    #[default]
    Hardware,
    Immediate,
}

impl Pacing {
    /// Block for `duration` under hardware pacing.
    pub fn pause(self, duration: Duration) {
        if self == Self::Hardware && !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn classify_timeout() {
        let err = Error::Timeout("350ms elapsed".into());
        assert_eq!(FailureKind::classify(&err), FailureKind::Timeout);
        assert!(FailureKind::classify(&err).is_retryable());
    }

    #[test]
    fn classify_validation() {
        let err = Error::InvalidResponse("status byte 0x00".into());
        assert_eq!(FailureKind::classify(&err), FailureKind::Validation);
        assert!(FailureKind::classify(&err).is_retryable());
    }

    #[test]
    fn classify_not_connected() {
        assert_eq!(
            FailureKind::classify(&Error::NotConnected),
            FailureKind::Disconnected
        );
        assert!(!FailureKind::Disconnected.is_retryable());
    }

    #[test]
    fn classify_hid_messages() {
        assert_eq!(
            FailureKind::classify(&Error::Hid("hidapi: No such device".into())),
            FailureKind::Disconnected
        );
        assert_eq!(
            FailureKind::classify(&Error::Hid("read timed out".into())),
            FailureKind::Timeout
        );
        assert_eq!(
            FailureKind::classify(&Error::Hid("Broken pipe".into())),
            FailureKind::Transport
        );
    }

    #[test]
    fn classify_permission_denied() {
        let err = Error::PermissionDenied("open: Permission denied".into());
        assert!(!FailureKind::classify(&err).is_retryable());
    }

    #[test]
    fn retry_succeeds_on_second_attempt() {
        let calls = Cell::new(0);
        let result = read_with_retry("test", READ_ATTEMPTS, || {
            calls.set(calls.get() + 1);
            if calls.get() == 1 {
                Err(Error::Timeout("asleep".into()))
            } else {
                Ok(42)
            }
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn retry_gives_up_after_attempts() {
        let calls = Cell::new(0);
        let result: Result<u8> = read_with_retry("test", READ_ATTEMPTS, || {
            calls.set(calls.get() + 1);
            Err(Error::InvalidResponse("bad".into()))
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), READ_ATTEMPTS);
    }

    #[test]
    fn retry_stops_on_disconnect() {
        let calls = Cell::new(0);
        let result: Result<u8> = read_with_retry("test", READ_ATTEMPTS, || {
            calls.set(calls.get() + 1);
            Err(Error::NotConnected)
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn immediate_pacing_does_not_sleep() {
        let start = std::time::Instant::now();
        Pacing::Immediate.pause(Duration::from_secs(5));
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
