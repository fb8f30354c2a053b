//! HID transport abstraction for feature-report communication.
//!
//! Provides a trait-based transport layer so that real HID devices and
//! mock devices share the same interface. The transport knows nothing about
//! battery protocols: it lists interfaces, opens a path, and moves raw
//! feature reports.

use crate::error::{Error, Result};
use std::cell::RefCell;
use std::ffi::CString;
use std::time::Duration;
use tracing::{debug, trace};

/// Settle time after opening a device before the first feature report.
const OPEN_SETTLE: Duration = Duration::from_millis(100);

/// One HID interface as reported by enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceInfo {
    pub path: String,
    pub vendor_id: u16,
    pub product_id: u16,
    pub usage_page: u16,
    pub usage: u16,
}

/// An open HID device handle. Dropping the handle closes it.
pub trait FeatureReportDevice {
    /// Write a feature report. `data[0]` is the report ID.
    fn send_feature_report(&self, data: &[u8]) -> Result<()>;

    /// Read a feature report of `len` bytes (including the report ID byte).
    fn get_feature_report(&self, report_id: u8, len: usize) -> Result<Vec<u8>>;
}

/// Enumerates and opens HID interfaces.
pub trait HidBackend {
    /// List every HID interface currently present.
    fn interfaces(&self) -> Result<Vec<InterfaceInfo>>;

    /// Open the interface at `path`.
    fn open(&self, path: &str) -> Result<Box<dyn FeatureReportDevice>>;

    /// List interfaces matching a vendor/product pair.
    fn enumerate(&self, vendor_id: u16, product_id: u16) -> Result<Vec<InterfaceInfo>> {
        Ok(self
            .interfaces()?
            .into_iter()
            .filter(|info| info.vendor_id == vendor_id && info.product_id == product_id)
            .collect())
    }
}

/// Map a hidapi error message onto the core error taxonomy.
fn hid_error(context: &str, err: hidapi::HidError) -> Error {
    let msg = format!("{context}: {err}");
    let lower = msg.to_lowercase();
    if lower.contains("permission") || lower.contains("access is denied") {
        Error::PermissionDenied(msg)
    } else {
        Error::Hid(msg)
    }
}

/// [`HidBackend`] backed by hidapi.
pub struct HidApiBackend {
    api: RefCell<hidapi::HidApi>,
}

impl HidApiBackend {
    pub fn new() -> Result<Self> {
        let api = hidapi::HidApi::new().map_err(|e| hid_error("hidapi init", e))?;
        Ok(Self {
            api: RefCell::new(api),
        })
    }
}

impl HidBackend for HidApiBackend {
    fn interfaces(&self) -> Result<Vec<InterfaceInfo>> {
        let mut api = self.api.borrow_mut();
        api.refresh_devices()
            .map_err(|e| hid_error("refresh devices", e))?;

        let list: Vec<InterfaceInfo> = api
            .device_list()
            .map(|info| InterfaceInfo {
                path: info.path().to_string_lossy().into_owned(),
                vendor_id: info.vendor_id(),
                product_id: info.product_id(),
                usage_page: info.usage_page(),
                usage: info.usage(),
            })
            .collect();

        trace!(count = list.len(), "HID enumeration complete");
        Ok(list)
    }

    fn open(&self, path: &str) -> Result<Box<dyn FeatureReportDevice>> {
        let c_path =
            CString::new(path).map_err(|e| Error::Hid(format!("invalid device path: {e}")))?;
        let device = self
            .api
            .borrow()
            .open_path(&c_path)
            .map_err(|e| hid_error("open", e))?;

        debug!(path, "HID device opened");
        std::thread::sleep(OPEN_SETTLE);
        Ok(Box::new(HidApiDevice { device }))
    }
}

struct HidApiDevice {
    device: hidapi::HidDevice,
}

impl FeatureReportDevice for HidApiDevice {
    fn send_feature_report(&self, data: &[u8]) -> Result<()> {
        trace!(report_hex = format_args!("{:02X?}", &data[..data.len().min(8)]), "SET_FEATURE");
        self.device
            .send_feature_report(data)
            .map_err(|e| hid_error("send_feature_report", e))
    }

    fn get_feature_report(&self, report_id: u8, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        if let Some(first) = buf.first_mut() {
            *first = report_id;
        }
        let n = self
            .device
            .get_feature_report(&mut buf)
            .map_err(|e| hid_error("get_feature_report", e))?;
        buf.truncate(n);
        trace!(len = n, report_hex = format_args!("{:02X?}", &buf[..n.min(8)]), "GET_FEATURE");
        Ok(buf)
    }
}

/// A mock HID backend for testing.
///
/// Interfaces can be plugged and unplugged at runtime, and replies are
/// registered against a prefix of the last feature report written to a path.
#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::{HashMap, HashSet, VecDeque};
    use std::rc::Rc;

    struct Rule {
        prefix: Vec<u8>,
        replies: VecDeque<Option<Vec<u8>>>,
    }

    #[derive(Default)]
    struct MockState {
        interfaces: Vec<InterfaceInfo>,
        refuse_open: HashSet<String>,
        silent: HashSet<String>,
        open: HashMap<String, usize>,
        opened: HashMap<String, usize>,
        peak_open: usize,
        rules: HashMap<String, Vec<Rule>>,
        last_request: HashMap<String, Vec<u8>>,
        sent: Vec<(String, Vec<u8>)>,
        next_id: usize,
    }

    impl MockState {
        fn total_open(&self) -> usize {
            self.open.values().sum()
        }
    }

    /// Shared handle to a simulated set of HID interfaces.
    #[derive(Clone, Default)]
    pub struct MockHid {
        state: Rc<RefCell<MockState>>,
    }

    impl MockHid {
        pub fn new() -> Self {
            Self::default()
        }

        /// The mock as a shareable backend.
        pub fn backend(&self) -> Rc<dyn HidBackend> {
            Rc::new(self.clone())
        }

        /// Add an interface and return its path.
        pub fn plug(&self, vendor_id: u16, product_id: u16, usage_page: u16, usage: u16) -> String {
            let mut state = self.state.borrow_mut();
            state.next_id += 1;
            let path = format!("mock/{vendor_id:04x}:{product_id:04x}/{}", state.next_id);
            state.interfaces.push(InterfaceInfo {
                path: path.clone(),
                vendor_id,
                product_id,
                usage_page,
                usage,
            });
            path
        }

        /// Remove an interface. Open handles to it start failing.
        pub fn unplug(&self, path: &str) {
            self.state
                .borrow_mut()
                .interfaces
                .retain(|info| info.path != path);
        }

        /// Make `open` fail for this path.
        pub fn refuse_open(&self, path: &str) {
            self.state.borrow_mut().refuse_open.insert(path.to_string());
        }

        /// A silent device accepts writes but never answers reads.
        pub fn set_silent(&self, path: &str, silent: bool) {
            let mut state = self.state.borrow_mut();
            if silent {
                state.silent.insert(path.to_string());
            } else {
                state.silent.remove(path);
            }
        }

        /// Register a reply returned whenever the last write starts with `prefix`.
        pub fn on_request(&self, path: &str, prefix: &[u8], reply: Vec<u8>) {
            self.on_request_sequence(path, prefix, vec![Some(reply)]);
        }

        /// Register a reply sequence; `None` entries fail the read. The last
        /// entry repeats once the others are consumed.
        pub fn on_request_sequence(&self, path: &str, prefix: &[u8], replies: Vec<Option<Vec<u8>>>) {
            let mut state = self.state.borrow_mut();
            let rules = state.rules.entry(path.to_string()).or_default();
            rules.retain(|rule| rule.prefix != prefix);
            rules.push(Rule {
                prefix: prefix.to_vec(),
                replies: replies.into(),
            });
        }

        pub fn is_open(&self, path: &str) -> bool {
            self.state.borrow().open.get(path).copied().unwrap_or(0) > 0
        }

        /// Successful opens of `path` so far, closed or not.
        pub fn times_opened(&self, path: &str) -> usize {
            self.state.borrow().opened.get(path).copied().unwrap_or(0)
        }

        pub fn open_count(&self) -> usize {
            self.state.borrow().total_open()
        }

        /// Highest number of simultaneously open handles seen so far.
        pub fn peak_open(&self) -> usize {
            self.state.borrow().peak_open
        }

        pub fn reset_peak_open(&self) {
            let mut state = self.state.borrow_mut();
            state.peak_open = state.total_open();
        }

        /// Every report written to `path`, in order.
        pub fn sent_to(&self, path: &str) -> Vec<Vec<u8>> {
            self.state
                .borrow()
                .sent
                .iter()
                .filter(|(p, _)| p == path)
                .map(|(_, data)| data.clone())
                .collect()
        }
    }

    impl HidBackend for MockHid {
        fn interfaces(&self) -> Result<Vec<InterfaceInfo>> {
            Ok(self.state.borrow().interfaces.clone())
        }

        fn open(&self, path: &str) -> Result<Box<dyn FeatureReportDevice>> {
            let mut state = self.state.borrow_mut();
            let present = state.interfaces.iter().any(|info| info.path == path);
            if !present || state.refuse_open.contains(path) {
                return Err(Error::Hid(format!("mock: cannot open {path}")));
            }
            *state.open.entry(path.to_string()).or_default() += 1;
            *state.opened.entry(path.to_string()).or_default() += 1;
            state.peak_open = state.peak_open.max(state.total_open());
            Ok(Box::new(MockDevice {
                path: path.to_string(),
                state: Rc::clone(&self.state),
            }))
        }
    }

    struct MockDevice {
        path: String,
        state: Rc<RefCell<MockState>>,
    }

    impl MockDevice {
        fn present(&self, state: &MockState) -> bool {
            state.interfaces.iter().any(|info| info.path == self.path)
        }
    }

    impl FeatureReportDevice for MockDevice {
        fn send_feature_report(&self, data: &[u8]) -> Result<()> {
            let mut state = self.state.borrow_mut();
            if !self.present(&state) {
                return Err(Error::Hid("mock: no such device".into()));
            }
            state.last_request.insert(self.path.clone(), data.to_vec());
            state.sent.push((self.path.clone(), data.to_vec()));
            Ok(())
        }

        fn get_feature_report(&self, report_id: u8, len: usize) -> Result<Vec<u8>> {
            let mut state = self.state.borrow_mut();
            if !self.present(&state) {
                return Err(Error::Hid("mock: no such device".into()));
            }
            if state.silent.contains(&self.path) {
                return Err(Error::Timeout("mock: device did not answer".into()));
            }
            let request = state
                .last_request
                .get(&self.path)
                .cloned()
                .unwrap_or_default();
            let rule = state
                .rules
                .get_mut(&self.path)
                .and_then(|rules| rules.iter_mut().find(|r| request.starts_with(&r.prefix)))
                .ok_or_else(|| {
                    Error::Hid(format!(
                        "mock: no reply registered for request {:02X?}",
                        &request[..request.len().min(5)]
                    ))
                })?;

            let reply = if rule.replies.len() > 1 {
                rule.replies.pop_front().flatten()
            } else {
                rule.replies.front().cloned().flatten()
            };

            let mut reply =
                reply.ok_or_else(|| Error::Hid("mock: scripted read failure".into()))?;
            reply.resize(len, 0);
            if let Some(first) = reply.first_mut() {
                *first = report_id;
            }
            Ok(reply)
        }
    }

    impl Drop for MockDevice {
        fn drop(&mut self) {
            let mut state = self.state.borrow_mut();
            if let Some(count) = state.open.get_mut(&self.path) {
                *count = count.saturating_sub(1);
            }
        }
    }
}
