//! Multi-device connection lifecycle.
//!
//! The manager owns the process-wide [`HidApi`] handle and a map of
//! connected drivers keyed by `"vid:pid"`. Connecting is idempotent, and
//! connecting one device never disturbs another. Drivers whose protocol
//! is unverified are never opened: connecting one runs its diagnostic
//! probe and reports that no stream was started.

use hidapi::HidApi;
use std::collections::{HashMap, HashSet};

use super::registry::{driver_for, is_known};
use super::{device_key, DisplayDriver, ProtocolStatus};
use crate::error::{PanelError, Result};

type ConnectedCallback = Box<dyn FnMut(&dyn DisplayDriver, &str) + Send>;
type DisconnectedCallback = Box<dyn FnMut(Option<&str>) + Send>;
type ErrorCallback = Box<dyn FnMut(&PanelError) + Send>;

/// A known panel found on the HID bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    pub vendor_id: u16,
    pub product_id: u16,
    pub name: &'static str,
    pub width: u32,
    pub height: u32,
    pub path: String,
}

/// Owns every device connection.
pub struct DeviceManager {
    api: HidApi,
    connected: HashMap<String, Box<dyn DisplayDriver>>,
    on_connected: Option<ConnectedCallback>,
    on_disconnected: Option<DisconnectedCallback>,
    on_error: Option<ErrorCallback>,
}

impl DeviceManager {
    /// Create a manager with a freshly-enumerated HID context.
    pub fn new() -> Result<Self> {
        Ok(Self::with_api(HidApi::new()?))
    }

    /// Create a manager around an existing HID context (tests use a
    /// non-enumerating one).
    pub fn with_api(api: HidApi) -> Self {
        Self {
            api,
            connected: HashMap::new(),
            on_connected: None,
            on_disconnected: None,
            on_error: None,
        }
    }

    pub fn hid_api(&self) -> &HidApi {
        &self.api
    }

    // ------------------------------------------------------------------
    // Callbacks
    // ------------------------------------------------------------------

    pub fn set_on_connected(&mut self, cb: ConnectedCallback) {
        self.on_connected = Some(cb);
    }

    pub fn set_on_disconnected(&mut self, cb: DisconnectedCallback) {
        self.on_disconnected = Some(cb);
    }

    pub fn set_on_error(&mut self, cb: ErrorCallback) {
        self.on_error = Some(cb);
    }

    // ------------------------------------------------------------------
    // State
    // ------------------------------------------------------------------

    /// True when at least one device is connected.
    pub fn is_connected(&self) -> bool {
        !self.connected.is_empty()
    }

    pub fn connected_keys(&self) -> Vec<String> {
        self.connected.keys().cloned().collect()
    }

    pub fn get_device(&self, key: &str) -> Option<&dyn DisplayDriver> {
        self.connected.get(key).map(|b| b.as_ref())
    }

    pub fn get_device_mut(&mut self, key: &str) -> Option<&mut Box<dyn DisplayDriver>> {
        self.connected.get_mut(key)
    }

    // ------------------------------------------------------------------
    // Enumeration
    // ------------------------------------------------------------------

    /// Rescan the HID bus for registered panels.
    pub fn enumerate_devices(&mut self) -> Vec<DiscoveredDevice> {
        if let Err(e) = self.api.refresh_devices() {
            log::warn!("HID enumeration error: {e}");
            return Vec::new();
        }
        let mut seen = HashSet::new();
        let mut found = Vec::new();
        for info in self.api.device_list() {
            let (vid, pid) = (info.vendor_id(), info.product_id());
            if !is_known(vid, pid) || !seen.insert((vid, pid)) {
                continue;
            }
            // Instantiate briefly to read the driver's identity
            if let Some(driver) = driver_for(vid, pid) {
                found.push(DiscoveredDevice {
                    vendor_id: vid,
                    product_id: pid,
                    name: driver.device_name(),
                    width: driver.display_width(),
                    height: driver.display_height(),
                    path: info.path().to_string_lossy().into_owned(),
                });
            }
        }
        found
    }

    // ------------------------------------------------------------------
    // Connection
    // ------------------------------------------------------------------

    /// Connect to one device. Returns its key, or `None` when there is no
    /// driver or the driver is diagnose-only. Already-connected devices
    /// return their key unchanged.
    pub fn connect(&mut self, vid: u16, pid: u16) -> Result<Option<String>> {
        let key = device_key(vid, pid);
        if self.connected.contains_key(&key) {
            return Ok(Some(key));
        }

        let Some(mut driver) = driver_for(vid, pid) else {
            log::warn!("no driver for {vid:#06x}:{pid:#06x}");
            return Ok(None);
        };

        if driver.protocol_status() == ProtocolStatus::Unverified {
            self.run_diagnostic(driver.as_ref());
            return Ok(None);
        }

        log::info!("opening {} ({key})...", driver.device_name());
        let opened = driver.open(&self.api).and_then(|_| driver.send_init());
        if let Err(e) = opened {
            driver.close();
            log::error!("connect failed for {key}: {e}");
            if let Some(cb) = &mut self.on_error {
                cb(&e);
            }
            return Err(e);
        }
        log::info!("connected: {}", driver.as_ref());

        if let Some(cb) = &mut self.on_connected {
            cb(driver.as_ref(), &key);
        }
        self.connected.insert(key.clone(), driver);
        Ok(Some(key))
    }

    /// Unverified protocol: probe, report, never stream.
    fn run_diagnostic(&self, driver: &dyn DisplayDriver) {
        let banner = "=".repeat(55);
        println!("\n{banner}");
        println!(
            "  Device Diagnostic: {} ({:#06x}:{:#06x})",
            driver.device_name(),
            driver.vendor_id(),
            driver.product_id()
        );
        println!("{banner}");
        println!("This device's protocol is unverified. Collecting diagnostic data...\n");
        driver.diagnose(&self.api);
        println!("\n{banner}");
        println!("  Diagnostic Complete");
        println!("{banner}");
        println!("Please share the output above with the project maintainers.");
        println!("This data helps us verify support for your device.\n");
    }

    /// Disconnect one device. Does nothing if it is not connected.
    pub fn disconnect(&mut self, vid: u16, pid: u16) {
        let key = device_key(vid, pid);
        if let Some(mut driver) = self.connected.remove(&key) {
            driver.close();
            log::info!("disconnected {}", driver.device_name());
            if let Some(cb) = &mut self.on_disconnected {
                cb(Some(&key));
            }
        }
    }

    /// Disconnect everything; fires one `on_disconnected(None)`.
    pub fn disconnect_all(&mut self) {
        if self.connected.is_empty() {
            return;
        }
        for (key, mut driver) in self.connected.drain() {
            driver.close();
            log::info!("disconnected {key} ({})", driver.device_name());
        }
        if let Some(cb) = &mut self.on_disconnected {
            cb(None);
        }
    }

    // ------------------------------------------------------------------
    // Sleep / wake
    // ------------------------------------------------------------------

    pub fn notify_sleep(&mut self) {
        for driver in self.connected.values_mut() {
            driver.on_sleep();
        }
    }

    pub fn notify_wake(&mut self) {
        for driver in self.connected.values_mut() {
            driver.on_wake();
        }
    }

    /// Run a driver's diagnostic probe without connecting. Unknown IDs
    /// are reported on stdout.
    pub fn diagnose(&self, vid: u16, pid: u16) {
        match driver_for(vid, pid) {
            Some(driver) => self.run_diagnostic(driver.as_ref()),
            None => println!("No driver registered for {vid:#06x}:{pid:#06x}"),
        }
    }
}

impl Drop for DeviceManager {
    fn drop(&mut self) {
        self.disconnect_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn manager() -> DeviceManager {
        DeviceManager::with_api(HidApi::new_without_enumerate().unwrap())
    }

    #[test]
    fn test_connect_dummy_is_idempotent() {
        let mut mgr = manager();
        let key = mgr.connect(0xFFFF, 0x0001).unwrap().unwrap();
        assert_eq!(key, "ffff:0001");
        assert!(mgr.is_connected());

        // Second connect returns the same key without reopening
        let again = mgr.connect(0xFFFF, 0x0001).unwrap().unwrap();
        assert_eq!(again, key);
        assert_eq!(mgr.connected_keys().len(), 1);
    }

    #[test]
    fn test_unknown_device_returns_none() {
        let mut mgr = manager();
        assert_eq!(mgr.connect(0x1234, 0x5678).unwrap(), None);
        assert!(!mgr.is_connected());
    }

    #[test]
    fn test_unverified_driver_diagnoses_instead_of_connecting() {
        let mut mgr = manager();
        // ALi stub: probe runs (and finds no hardware), no connection made
        assert_eq!(mgr.connect(0x0416, 0x5406).unwrap(), None);
        assert!(!mgr.is_connected());
    }

    #[test]
    fn test_disconnect_fires_callback_with_key() {
        let mut mgr = manager();
        let disconnects = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&disconnects);
        mgr.set_on_disconnected(Box::new(move |key| {
            assert_eq!(key, Some("ffff:0001"));
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        mgr.connect(0xFFFF, 0x0001).unwrap();
        mgr.disconnect(0xFFFF, 0x0001);
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
        assert!(!mgr.is_connected());

        // Disconnecting again is a no-op
        mgr.disconnect(0xFFFF, 0x0001);
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_connected_callback_receives_driver_identity() {
        let mut mgr = manager();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        mgr.set_on_connected(Box::new(move |driver, key| {
            assert_eq!(driver.device_name(), "Dummy (Test)");
            assert_eq!(key, "ffff:0001");
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        mgr.connect(0xFFFF, 0x0001).unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_disconnect_all_signals_once() {
        let mut mgr = manager();
        let signals = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&signals);
        mgr.set_on_disconnected(Box::new(move |key| {
            assert_eq!(key, None);
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        mgr.connect(0xFFFF, 0x0001).unwrap();
        mgr.disconnect_all();
        assert_eq!(signals.load(Ordering::SeqCst), 1);

        // Nothing connected: no further signal
        mgr.disconnect_all();
        assert_eq!(signals.load(Ordering::SeqCst), 1);
    }
}
