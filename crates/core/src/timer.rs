//! Cooperative timers identified by small integer IDs.
//!
//! Arming a timer always replaces the previous instance with the same ID, so
//! an ID can never fire twice for one arming. Time is supplied by the caller.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(pub u32);

impl TimerId {
    /// Periodic battery poll.
    pub const POLL: Self = Self(1);
    /// Hotplug debounce window.
    pub const DEVICE_CHANGE: Self = Self(2);
    /// Re-read after an arrival whose first read failed.
    pub const ARRIVAL_RETRY: Self = Self(3);
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::POLL => write!(f, "poll"),
            Self::DEVICE_CHANGE => write!(f, "device-change"),
            Self::ARRIVAL_RETRY => write!(f, "arrival-retry"),
            Self(id) => write!(f, "timer-{id}"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Armed {
    deadline: Instant,
    /// Re-arm interval for repeating timers.
    every: Option<Duration>,
}

/// Pending timers keyed by ID.
#[derive(Debug, Default)]
pub struct TimerQueue {
    timers: BTreeMap<TimerId, Armed>,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire once at `now + after`.
    pub fn arm_once(&mut self, id: TimerId, now: Instant, after: Duration) {
        self.arm(id, now, after, None);
    }

    /// Fire every `every`, first at `now + every`.
    pub fn arm_repeating(&mut self, id: TimerId, now: Instant, every: Duration) {
        self.arm(id, now, every, Some(every));
    }

    fn arm(&mut self, id: TimerId, now: Instant, after: Duration, every: Option<Duration>) {
        self.kill(id);
        trace!(timer = %id, after_ms = after.as_millis() as u64, repeating = every.is_some(), "Timer armed");
        self.timers.insert(
            id,
            Armed {
                deadline: now + after,
                every,
            },
        );
    }

    /// Cancel a timer. Killing an unarmed timer is a no-op.
    pub fn kill(&mut self, id: TimerId) {
        if self.timers.remove(&id).is_some() {
            trace!(timer = %id, "Timer killed");
        }
    }

    pub fn is_armed(&self, id: TimerId) -> bool {
        self.timers.contains_key(&id)
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.values().map(|t| t.deadline).min()
    }

    /// Take the earliest expired timer. One-shot timers are removed,
    /// repeating timers re-arm from `now`. Ties go to the lower ID.
    pub fn pop_due(&mut self, now: Instant) -> Option<TimerId> {
        let (&id, armed) = self
            .timers
            .iter()
            .filter(|(_, t)| t.deadline <= now)
            .min_by_key(|(id, t)| (t.deadline, **id))?;
        let every = armed.every;

        match every {
            Some(every) => {
                let rearmed = Armed {
                    deadline: now + every,
                    every: Some(every),
                };
                self.timers.insert(id, rearmed);
            }
            None => {
                self.timers.remove(&id);
            }
        }
        Some(id)
    }
}
