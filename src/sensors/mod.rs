//! # Sensor Acquisition
//!
//! Background acquisition of live system metrics that feed theme elements.
//!
//! Two independently-scheduled pollers write into mutex-guarded caches:
//!
//! - [`system`]: OS counters (CPU load, memory, network throughput) sampled
//!   at ~5 Hz via `sysinfo`.
//! - [`hwmon`]: temperature/clock/power telemetry from a helper subprocess
//!   over a line-oriented JSON protocol, sampled at ~2 Hz.
//!
//! The stream scheduler reads a merged [`SensorSnapshot`] through
//! [`SensorCache::snapshot`], which copies the latest values under lock and
//! releases immediately. The scheduler never blocks on sensor availability;
//! a poller that dies leaves the last-known-good values in place.

pub mod hwmon;
pub mod system;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

pub use hwmon::HardwareMonitor;
pub use system::SystemPoller;

// ============================================================================
// SOURCE KEYS
// ============================================================================

/// Closed set of sensor source keys a theme element can bind to.
///
/// `Static` means the element keeps its user-assigned value and is never
/// overwritten from a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceKey {
    #[default]
    Static,
    CpuPercent,
    CpuTemp,
    CpuClock,
    CpuPower,
    RamPercent,
    RamUsed,
    RamAvailable,
    GpuPercent,
    GpuTemp,
    GpuClock,
    GpuMemoryPercent,
    GpuMemoryClock,
    GpuPower,
    NetUpload,
    NetDownload,
}

/// Unit class for a source key, controls formatting precision and symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    Percent,
    Temperature,
    Clock,
    Power,
    Size,
    Speed,
}

impl SourceKey {
    /// All keys that can appear in a snapshot (everything except `Static`).
    pub const LIVE_KEYS: [SourceKey; 15] = [
        SourceKey::CpuPercent,
        SourceKey::CpuTemp,
        SourceKey::CpuClock,
        SourceKey::CpuPower,
        SourceKey::RamPercent,
        SourceKey::RamUsed,
        SourceKey::RamAvailable,
        SourceKey::GpuPercent,
        SourceKey::GpuTemp,
        SourceKey::GpuClock,
        SourceKey::GpuMemoryPercent,
        SourceKey::GpuMemoryClock,
        SourceKey::GpuPower,
        SourceKey::NetUpload,
        SourceKey::NetDownload,
    ];

    pub fn unit_kind(self) -> UnitKind {
        match self {
            SourceKey::CpuTemp | SourceKey::GpuTemp => UnitKind::Temperature,
            SourceKey::CpuClock | SourceKey::GpuClock | SourceKey::GpuMemoryClock => {
                UnitKind::Clock
            }
            SourceKey::CpuPower | SourceKey::GpuPower => UnitKind::Power,
            SourceKey::RamUsed | SourceKey::RamAvailable => UnitKind::Size,
            SourceKey::NetUpload | SourceKey::NetDownload => UnitKind::Speed,
            _ => UnitKind::Percent,
        }
    }

    pub fn unit_symbol(self) -> &'static str {
        match self.unit_kind() {
            UnitKind::Percent => "%",
            UnitKind::Temperature => "°C",
            UnitKind::Clock => "MHz",
            UnitKind::Power => "W",
            UnitKind::Size => "GB",
            UnitKind::Speed => "MB/s",
        }
    }

    /// Format a value with its unit symbol.
    ///
    /// Sizes and speeds get one decimal place, everything else is rounded
    /// to a whole number. `hide_temp_unit` shortens `°C` to `°`.
    pub fn format_value(self, value: f64, hide_temp_unit: bool) -> String {
        match self.unit_kind() {
            UnitKind::Size | UnitKind::Speed => format!("{:.1}{}", value, self.unit_symbol()),
            UnitKind::Temperature if hide_temp_unit => format!("{:.0}°", value),
            _ => format!("{:.0}{}", value, self.unit_symbol()),
        }
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // serde's snake_case name is the canonical spelling
        let name = match self {
            SourceKey::Static => "static",
            SourceKey::CpuPercent => "cpu_percent",
            SourceKey::CpuTemp => "cpu_temp",
            SourceKey::CpuClock => "cpu_clock",
            SourceKey::CpuPower => "cpu_power",
            SourceKey::RamPercent => "ram_percent",
            SourceKey::RamUsed => "ram_used",
            SourceKey::RamAvailable => "ram_available",
            SourceKey::GpuPercent => "gpu_percent",
            SourceKey::GpuTemp => "gpu_temp",
            SourceKey::GpuClock => "gpu_clock",
            SourceKey::GpuMemoryPercent => "gpu_memory_percent",
            SourceKey::GpuMemoryClock => "gpu_memory_clock",
            SourceKey::GpuPower => "gpu_power",
            SourceKey::NetUpload => "net_upload",
            SourceKey::NetDownload => "net_download",
        };
        f.write_str(name)
    }
}

// ============================================================================
// SNAPSHOT
// ============================================================================

/// One coherent set of sensor values, copied out of the caches.
///
/// Unknown or never-reported keys read as 0.
#[derive(Debug, Clone, Default)]
pub struct SensorSnapshot {
    values: HashMap<SourceKey, f64>,
}

impl SensorSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: SourceKey) -> f64 {
        self.values.get(&key).copied().unwrap_or(0.0)
    }

    pub fn set(&mut self, key: SourceKey, value: f64) {
        self.values.insert(key, value);
    }
}

// ============================================================================
// OS-METRICS STATE
// ============================================================================

/// Latest OS counter readings, written atomically by the system poller.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemMetrics {
    pub cpu_percent: f64,
    pub ram_percent: f64,
    pub ram_used_gb: f64,
    pub ram_available_gb: f64,
    pub net_upload_mbs: f64,
    pub net_download_mbs: f64,
}

/// Latest hardware-monitor readings, written atomically by the hwmon poller.
///
/// A value of 0 means "not reported"; the merge keeps the OS-side value (or
/// zero) for those keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct HardwareReadings {
    pub cpu_temp: f64,
    pub cpu_clock: f64,
    pub cpu_power: f64,
    pub gpu_percent: f64,
    pub gpu_temp: f64,
    pub gpu_clock: f64,
    pub gpu_memory_percent: f64,
    pub gpu_memory_clock: f64,
    pub gpu_power: f64,
}

// ============================================================================
// CACHE
// ============================================================================

/// Shared handle to the system poller's output slot.
pub type SystemSlot = Arc<Mutex<SystemMetrics>>;

/// Shared handle to the hardware poller's output slot.
pub type HardwareSlot = Arc<Mutex<HardwareReadings>>;

/// Process-root owned sensor cache.
///
/// Owns the two mutex-guarded value slots the pollers write into and merges
/// them into one [`SensorSnapshot`] on demand. The merge takes each lock
/// briefly, copies the plain value out, and works lock-free afterwards.
#[derive(Clone, Default)]
pub struct SensorCache {
    system: SystemSlot,
    hardware: HardwareSlot,
}

impl SensorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot handle for [`SystemPoller`].
    pub fn system_slot(&self) -> SystemSlot {
        Arc::clone(&self.system)
    }

    /// Slot handle for [`HardwareMonitor`].
    pub fn hardware_slot(&self) -> HardwareSlot {
        Arc::clone(&self.hardware)
    }

    /// Copy the latest values out of both caches and merge them.
    ///
    /// Hardware-monitor values take precedence over OS values only when they
    /// are non-zero, so a missing or broken helper degrades to OS metrics
    /// instead of zeroing out previously-good keys.
    pub fn snapshot(&self) -> SensorSnapshot {
        let sys = *self.system.lock().unwrap_or_else(|e| e.into_inner());
        let hw = *self.hardware.lock().unwrap_or_else(|e| e.into_inner());

        let mut snap = SensorSnapshot::new();
        snap.set(SourceKey::CpuPercent, sys.cpu_percent);
        snap.set(SourceKey::RamPercent, sys.ram_percent);
        snap.set(SourceKey::RamUsed, sys.ram_used_gb);
        snap.set(SourceKey::RamAvailable, sys.ram_available_gb);
        snap.set(SourceKey::NetUpload, sys.net_upload_mbs);
        snap.set(SourceKey::NetDownload, sys.net_download_mbs);

        let overrides = [
            (SourceKey::CpuTemp, hw.cpu_temp),
            (SourceKey::CpuClock, hw.cpu_clock),
            (SourceKey::CpuPower, hw.cpu_power),
            (SourceKey::GpuPercent, hw.gpu_percent),
            (SourceKey::GpuTemp, hw.gpu_temp),
            (SourceKey::GpuClock, hw.gpu_clock),
            (SourceKey::GpuMemoryPercent, hw.gpu_memory_percent),
            (SourceKey::GpuMemoryClock, hw.gpu_memory_clock),
            (SourceKey::GpuPower, hw.gpu_power),
        ];
        for (key, value) in overrides {
            if value > 0.0 {
                snap.set(key, value);
            }
        }

        snap
    }
}

// ============================================================================
// WORKER LIFECYCLE
// ============================================================================

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::time::Duration;

/// How long `WorkerHandle::stop` waits for a poller thread to exit.
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Handle to a background poller thread.
///
/// The worker loops until the stop flag is set, then signals `done` right
/// before returning. `stop` waits a bounded time for that signal; a thread
/// that does not exit in time is abandoned rather than blocking shutdown.
pub struct WorkerHandle {
    stop: Arc<AtomicBool>,
    done: mpsc::Receiver<()>,
    thread: Option<std::thread::JoinHandle<()>>,
    name: &'static str,
}

impl WorkerHandle {
    pub(crate) fn spawn<F>(name: &'static str, body: F) -> Self
    where
        F: FnOnce(Arc<AtomicBool>) + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = mpsc::channel();
        let flag = Arc::clone(&stop);
        let thread = std::thread::spawn(move || {
            body(flag);
            let _ = done_tx.send(());
        });
        Self {
            stop,
            done: done_rx,
            thread: Some(thread),
            name,
        }
    }

    /// Request the worker to stop and wait up to [`JOIN_TIMEOUT`] for it.
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        match self.done.recv_timeout(JOIN_TIMEOUT) {
            Ok(()) => {
                if let Some(t) = self.thread.take() {
                    let _ = t.join();
                }
            }
            Err(_) => {
                log::warn!("{} did not stop within {:?}, abandoning", self.name, JOIN_TIMEOUT);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_snapshot_defaults_to_zero() {
        let snap = SensorSnapshot::new();
        assert_eq!(snap.get(SourceKey::CpuTemp), 0.0);
        assert_eq!(snap.get(SourceKey::NetDownload), 0.0);
    }

    #[test]
    fn test_merge_prefers_nonzero_hardware_values() {
        let cache = SensorCache::new();
        {
            let mut sys = cache.system_slot().lock().unwrap().clone();
            sys.cpu_percent = 42.0;
            *cache.system_slot().lock().unwrap() = sys;
        }
        {
            let mut hw = cache.hardware_slot().lock().unwrap().clone();
            hw.cpu_temp = 61.5;
            hw.gpu_percent = 0.0; // unreported, must not clobber anything
            *cache.hardware_slot().lock().unwrap() = hw;
        }

        let snap = cache.snapshot();
        assert_eq!(snap.get(SourceKey::CpuPercent), 42.0);
        assert_eq!(snap.get(SourceKey::CpuTemp), 61.5);
        assert_eq!(snap.get(SourceKey::GpuPercent), 0.0);
    }

    #[test]
    fn test_source_key_serde_spelling() {
        let key: SourceKey = serde_json::from_str("\"gpu_memory_percent\"").unwrap();
        assert_eq!(key, SourceKey::GpuMemoryPercent);
        assert_eq!(key.to_string(), "gpu_memory_percent");
    }

    #[test]
    fn test_value_formatting() {
        assert_eq!(SourceKey::CpuPercent.format_value(43.6, false), "44%");
        assert_eq!(SourceKey::CpuTemp.format_value(61.2, false), "61°C");
        assert_eq!(SourceKey::CpuTemp.format_value(61.2, true), "61°");
        assert_eq!(SourceKey::RamUsed.format_value(12.34, false), "12.3GB");
        assert_eq!(SourceKey::NetDownload.format_value(3.5, false), "3.5MB/s");
        assert_eq!(SourceKey::GpuClock.format_value(1810.0, false), "1810MHz");
    }
}
