//! Hotplug coordinator: debounces OS device-change signals and retries a
//! failed first read after an arrival.
//!
//! ```text
//! idle ──signal──▶ armed(kind) ──debounce──▶ removal: disconnect, clear
//!                     ▲   │                  arrival: connect + read
//!                     └───┘ new signal:             │ read failed
//!                       kind overwritten,           ▼
//!                       debounce restarted     retrying(n) ──valid or n = max──▶ idle
//! ```
//!
//! The coordinator never reports errors; exhausting the retries leaves the
//! monitor disconnected until the next poll or signal.

use crate::config::HotplugSettings;
use crate::monitor::{BatteryMonitor, StatusReport};
use crate::timer::{TimerId, TimerQueue};
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info};

/// A raw OS device-change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeviceSignal {
    Arrival,
    Removal,
    /// Any other device change; treated as a plain re-poll.
    Other,
}

/// Observable coordinator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotplugState {
    Idle,
    /// Debounce running for the pending signal kind.
    Armed(DeviceSignal),
    /// Arrival retries performed so far.
    Retrying(u32),
}

#[derive(Debug)]
pub struct HotplugCoordinator {
    settings: HotplugSettings,
    pending: Option<DeviceSignal>,
    retrying: bool,
    arrival_retry_count: u32,
}

impl HotplugCoordinator {
    pub fn new(settings: HotplugSettings) -> Self {
        Self {
            settings,
            pending: None,
            retrying: false,
            arrival_retry_count: 0,
        }
    }

    pub fn state(&self) -> HotplugState {
        match self.pending {
            Some(kind) => HotplugState::Armed(kind),
            None if self.retrying => HotplugState::Retrying(self.arrival_retry_count),
            None => HotplugState::Idle,
        }
    }

    pub fn arrival_retry_count(&self) -> u32 {
        self.arrival_retry_count
    }

    /// Feed a raw signal. Arrival and removal (re)start the debounce window
    /// with the latest kind; anything else polls immediately.
    pub fn on_signal(
        &mut self,
        signal: DeviceSignal,
        monitor: &mut BatteryMonitor,
        timers: &mut TimerQueue,
        now: Instant,
    ) -> Option<StatusReport> {
        let debounce = match signal {
            DeviceSignal::Arrival => self.settings.arrival_debounce(),
            DeviceSignal::Removal => self.settings.removal_debounce(),
            DeviceSignal::Other => {
                debug!("Generic device change, polling now");
                return Some(monitor.update());
            }
        };

        if let Some(previous) = self.pending.replace(signal) {
            if previous != signal {
                debug!(?previous, ?signal, "Pending device change overwritten");
            }
        }
        debug!(?signal, debounce_ms = debounce.as_millis() as u64, "USB event received");
        timers.arm_once(TimerId::DEVICE_CHANGE, now, debounce);
        None
    }

    /// The debounce window closed: act on the last pending kind.
    pub fn on_debounce_elapsed(
        &mut self,
        monitor: &mut BatteryMonitor,
        timers: &mut TimerQueue,
        now: Instant,
    ) -> StatusReport {
        timers.kill(TimerId::DEVICE_CHANGE);

        match self.pending.take() {
            Some(DeviceSignal::Removal) => {
                debug!("Device change settled: removal");
                self.stop_retrying(timers);
                monitor.on_device_removed()
            }
            Some(DeviceSignal::Arrival) => {
                debug!("Device change settled: arrival");
                self.stop_retrying(timers);
                let report = monitor.on_device_arrived();
                if !monitor.has_valid_status() {
                    debug!(
                        retry_ms = self.settings.arrival_retry_ms,
                        "First arrival read failed, scheduling retry"
                    );
                    self.retrying = true;
                    timers.arm_repeating(TimerId::ARRIVAL_RETRY, now, self.settings.arrival_retry());
                }
                report
            }
            Some(DeviceSignal::Other) | None => {
                debug!("Device change settled: generic update");
                monitor.update()
            }
        }
    }

    /// An arrival retry interval elapsed. Returns `None` for a stale fire.
    pub fn on_retry_elapsed(
        &mut self,
        monitor: &mut BatteryMonitor,
        timers: &mut TimerQueue,
    ) -> Option<StatusReport> {
        if !self.retrying {
            timers.kill(TimerId::ARRIVAL_RETRY);
            return None;
        }

        self.arrival_retry_count += 1;
        debug!(
            attempt = self.arrival_retry_count,
            max = self.settings.max_arrival_retries,
            "Arrival retry"
        );
        let report = monitor.update();

        if monitor.has_valid_status() {
            info!(attempt = self.arrival_retry_count, "Arrival retry succeeded");
            self.stop_retrying(timers);
        } else if self.arrival_retry_count >= self.settings.max_arrival_retries {
            info!(attempts = self.arrival_retry_count, "Arrival retries exhausted");
            self.stop_retrying(timers);
        }
        Some(report)
    }

    fn stop_retrying(&mut self, timers: &mut TimerQueue) {
        timers.kill(TimerId::ARRIVAL_RETRY);
        self.retrying = false;
        self.arrival_retry_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::LowBatteryAlert;
    use crate::comm::Pacing;
    use crate::endgame;
    use crate::monitor::StatusSource;
    use crate::registry::DeviceRegistry;
    use crate::transport::mock::MockHid;
    use std::time::Duration;

    struct Rig {
        mock: MockHid,
        monitor: BatteryMonitor,
        timers: TimerQueue,
        hotplug: HotplugCoordinator,
        t0: Instant,
    }

    impl Rig {
        fn new() -> Self {
            let mock = MockHid::new();
            let registry = DeviceRegistry::standard(mock.backend(), Pacing::Immediate);
            Self {
                monitor: BatteryMonitor::new(registry, LowBatteryAlert::new(20, true)),
                mock,
                timers: TimerQueue::new(),
                hotplug: HotplugCoordinator::new(HotplugSettings::default()),
                t0: Instant::now(),
            }
        }

        fn at(&self, ms: u64) -> Instant {
            self.t0 + Duration::from_millis(ms)
        }

        fn plug_dongle(&self, level: u8) -> String {
            let path = self.mock.plug(
                endgame::VENDOR_ID,
                0x1970,
                endgame::USAGE_PAGE,
                endgame::USAGE,
            );
            let mut reply = vec![0u8; endgame::REPORT_LEN];
            reply[1] = endgame::STATUS_NORMAL;
            reply[16] = level;
            self.mock
                .on_request(&path, &[endgame::REPORT_ID, endgame::BATTERY_CMD], reply);
            path
        }

        fn signal(&mut self, signal: DeviceSignal, ms: u64) -> Option<StatusReport> {
            let now = self.at(ms);
            self.hotplug
                .on_signal(signal, &mut self.monitor, &mut self.timers, now)
        }

        fn settle(&mut self, ms: u64) -> StatusReport {
            let now = self.at(ms);
            self.hotplug
                .on_debounce_elapsed(&mut self.monitor, &mut self.timers, now)
        }

        fn retry(&mut self) -> Option<StatusReport> {
            self.hotplug
                .on_retry_elapsed(&mut self.monitor, &mut self.timers)
        }
    }

    #[test]
    fn arrival_arms_long_debounce() {
        let mut rig = Rig::new();
        assert!(rig.signal(DeviceSignal::Arrival, 0).is_none());
        assert_eq!(rig.hotplug.state(), HotplugState::Armed(DeviceSignal::Arrival));
        assert_eq!(rig.timers.next_deadline(), Some(rig.at(1500)));
    }

    #[test]
    fn removal_overrides_pending_arrival() {
        let mut rig = Rig::new();
        rig.plug_dongle(60);
        rig.monitor.update();

        rig.signal(DeviceSignal::Arrival, 0);
        rig.signal(DeviceSignal::Removal, 500);
        assert_eq!(rig.hotplug.state(), HotplugState::Armed(DeviceSignal::Removal));
        assert_eq!(rig.timers.next_deadline(), Some(rig.at(600)));

        assert_eq!(rig.timers.pop_due(rig.at(600)), Some(TimerId::DEVICE_CHANGE));
        let report = rig.settle(600);
        assert_eq!(report.status.percentage, -1);
        assert_eq!(rig.hotplug.state(), HotplugState::Idle);
        assert_eq!(rig.mock.open_count(), 0);
    }

    #[test]
    fn generic_signal_polls_immediately() {
        let mut rig = Rig::new();
        rig.plug_dongle(70);
        let report = rig.signal(DeviceSignal::Other, 0).unwrap();
        assert_eq!(report.status.percentage, 70);
        assert_eq!(rig.hotplug.state(), HotplugState::Idle);
        assert_eq!(rig.timers.next_deadline(), None);
    }

    #[test]
    fn successful_arrival_does_not_retry() {
        let mut rig = Rig::new();
        rig.plug_dongle(80);
        rig.signal(DeviceSignal::Arrival, 0);
        let report = rig.settle(1500);
        assert_eq!(report.source, StatusSource::Fresh);
        assert!(!rig.timers.is_armed(TimerId::ARRIVAL_RETRY));
        assert_eq!(rig.hotplug.state(), HotplugState::Idle);
    }

    #[test]
    fn failed_arrival_retries_until_valid() {
        let mut rig = Rig::new();
        let path = rig.plug_dongle(64);
        rig.mock.set_silent(&path, true);

        rig.signal(DeviceSignal::Arrival, 0);
        rig.settle(1500);
        assert!(rig.timers.is_armed(TimerId::ARRIVAL_RETRY));
        assert_eq!(rig.hotplug.state(), HotplugState::Retrying(0));

        rig.retry();
        assert_eq!(rig.hotplug.state(), HotplugState::Retrying(1));

        rig.mock.set_silent(&path, false);
        let report = rig.retry().unwrap();
        assert_eq!(report.status.percentage, 64);
        assert!(!rig.timers.is_armed(TimerId::ARRIVAL_RETRY));
        assert_eq!(rig.hotplug.state(), HotplugState::Idle);
        assert_eq!(rig.monitor.consecutive_failures(), 0);
    }

    #[test]
    fn retries_stop_at_budget() {
        let mut rig = Rig::new();
        rig.signal(DeviceSignal::Arrival, 0);
        rig.settle(1500);

        for _ in 0..3 {
            assert!(rig.retry().is_some());
        }
        assert!(!rig.timers.is_armed(TimerId::ARRIVAL_RETRY));
        assert_eq!(rig.hotplug.state(), HotplugState::Idle);
        assert!(rig.retry().is_none());
    }

    #[test]
    fn removal_cancels_arrival_retries() {
        let mut rig = Rig::new();
        rig.signal(DeviceSignal::Arrival, 0);
        rig.settle(1500);
        rig.retry();

        rig.signal(DeviceSignal::Removal, 2000);
        rig.settle(2100);
        assert!(!rig.timers.is_armed(TimerId::ARRIVAL_RETRY));
        assert_eq!(rig.hotplug.arrival_retry_count(), 0);
        assert_eq!(rig.hotplug.state(), HotplugState::Idle);
    }
}
