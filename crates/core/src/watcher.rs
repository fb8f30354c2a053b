//! Device-change signal source based on periodic enumeration.
//!
//! hidapi offers no hotplug callback, so each scan diffs the set of
//! interface paths belonging to supported vendors against the previous scan.

use crate::device::supported_vendor_ids;
use crate::hotplug::DeviceSignal;
use crate::transport::HidBackend;
use std::collections::BTreeSet;
use std::rc::Rc;
use tracing::{debug, trace};

pub struct DeviceWatcher {
    backend: Rc<dyn HidBackend>,
    vendor_ids: Vec<u16>,
    known: BTreeSet<String>,
}

impl DeviceWatcher {
    pub fn new(backend: Rc<dyn HidBackend>) -> Self {
        Self {
            backend,
            vendor_ids: supported_vendor_ids(),
            known: BTreeSet::new(),
        }
    }

    /// Record the current interfaces without emitting signals.
    pub fn prime(&mut self) {
        if let Some(paths) = self.snapshot() {
            self.known = paths;
        }
    }

    /// Compare against the previous scan. Removals come before arrivals so a
    /// device that re-enumerated under a new path ends up as an arrival.
    pub fn scan(&mut self) -> Vec<DeviceSignal> {
        let Some(current) = self.snapshot() else {
            return Vec::new();
        };

        let removed = self.known.difference(&current).count();
        let added = current.difference(&self.known).count();
        if removed + added > 0 {
            debug!(removed, added, "HID interface set changed");
        }

        let mut signals = vec![DeviceSignal::Removal; removed];
        signals.extend(std::iter::repeat(DeviceSignal::Arrival).take(added));
        self.known = current;
        signals
    }

    pub fn known_paths(&self) -> impl Iterator<Item = &str> {
        self.known.iter().map(String::as_str)
    }

    fn snapshot(&self) -> Option<BTreeSet<String>> {
        match self.backend.interfaces() {
            Ok(list) => Some(
                list.into_iter()
                    .filter(|info| self.vendor_ids.contains(&info.vendor_id))
                    .map(|info| info.path)
                    .collect(),
            ),
            Err(e) => {
                trace!(error = %e, "Device scan failed");
                None
            }
        }
    }
}
