//! Single-threaded event dispatch.
//!
//! Timer fires, device-change signals and user commands are queued by the
//! caller and handled one at a time; no two protocol exchanges ever overlap.

use crate::alert::{LowBatteryAlert, LowBatteryNotice};
use crate::comm::Pacing;
use crate::config::MonitorConfig;
use crate::hotplug::{DeviceSignal, HotplugCoordinator, HotplugState};
use crate::monitor::{BatteryMonitor, StatusReport};
use crate::registry::DeviceRegistry;
use crate::timer::{TimerId, TimerQueue};
use crate::transport::HidBackend;
use serde::Serialize;
use std::rc::Rc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// User-initiated actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    UpdateNow,
    TestNotification,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Timer(TimerId),
    Device(DeviceSignal),
    Command(Command),
}

/// What the presentation layer should show after an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    Status(StatusReport),
    TestNotice(LowBatteryNotice),
}

pub struct Engine {
    monitor: BatteryMonitor,
    hotplug: HotplugCoordinator,
    timers: TimerQueue,
    poll_interval: Duration,
    test_fallback_percentage: i32,
}

impl Engine {
    pub fn new(monitor: BatteryMonitor, config: &MonitorConfig) -> Self {
        Self {
            monitor,
            hotplug: HotplugCoordinator::new(config.hotplug.clone()),
            timers: TimerQueue::new(),
            poll_interval: config.update_interval(),
            test_fallback_percentage: i32::from(config.low_battery_threshold),
        }
    }

    /// Engine over every supported device variant.
    pub fn with_backend(backend: Rc<dyn HidBackend>, pacing: Pacing, config: &MonitorConfig) -> Self {
        let registry = DeviceRegistry::standard(backend, pacing);
        let alert = LowBatteryAlert::new(config.low_battery_threshold, config.show_notifications);
        Self::new(BatteryMonitor::new(registry, alert), config)
    }

    /// Arm the poll timer and take the first reading.
    pub fn start(&mut self, now: Instant) -> StatusReport {
        info!(interval_s = self.poll_interval.as_secs(), "Starting battery monitor");
        self.timers.arm_repeating(TimerId::POLL, now, self.poll_interval);
        self.monitor.update()
    }

    /// Handle one event.
    pub fn handle(&mut self, event: Event, now: Instant) -> Option<Outcome> {
        debug!(?event, "Dispatch");
        let report = match event {
            Event::Timer(TimerId::POLL) => Some(self.monitor.update()),
            Event::Timer(TimerId::DEVICE_CHANGE) => Some(self.hotplug.on_debounce_elapsed(
                &mut self.monitor,
                &mut self.timers,
                now,
            )),
            Event::Timer(TimerId::ARRIVAL_RETRY) => self
                .hotplug
                .on_retry_elapsed(&mut self.monitor, &mut self.timers),
            Event::Timer(other) => {
                warn!(timer = %other, "Unknown timer fired, cancelling");
                self.timers.kill(other);
                None
            }
            Event::Device(signal) => {
                self.hotplug
                    .on_signal(signal, &mut self.monitor, &mut self.timers, now)
            }
            Event::Command(Command::UpdateNow) => Some(self.monitor.update()),
            Event::Command(Command::TestNotification) => {
                let notice = self
                    .monitor
                    .trigger_test_notification(self.test_fallback_percentage);
                return Some(Outcome::TestNotice(notice));
            }
        };
        report.map(Outcome::Status)
    }

    /// Take the next expired timer as an event.
    pub fn due_timer(&mut self, now: Instant) -> Option<Event> {
        self.timers.pop_due(now).map(Event::Timer)
    }

    /// Handle every timer that has expired by `now`.
    pub fn run_due(&mut self, now: Instant) -> Vec<Outcome> {
        let mut outcomes = Vec::new();
        while let Some(event) = self.due_timer(now) {
            outcomes.extend(self.handle(event, now));
        }
        outcomes
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    pub fn monitor(&self) -> &BatteryMonitor {
        &self.monitor
    }

    pub fn hotplug_state(&self) -> HotplugState {
        self.hotplug.state()
    }

    pub fn timers(&self) -> &TimerQueue {
        &self.timers
    }

    /// Cancel all timers and release the device.
    pub fn shutdown(&mut self) {
        for id in [TimerId::POLL, TimerId::DEVICE_CHANGE, TimerId::ARRIVAL_RETRY] {
            self.timers.kill(id);
        }
        self.monitor.shutdown();
        info!("Battery monitor stopped");
    }
}
