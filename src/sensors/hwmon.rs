//! # Hardware-Monitor Poller
//!
//! Polls a long-lived helper subprocess for temperature/clock/power telemetry
//! the OS does not expose directly. The helper wraps a platform-specific
//! sensor library; isolating it in its own process is the fault boundary —
//! a crashed or wedged helper can never take the host process down.
//!
//! ## Wire Protocol
//!
//! Newline-delimited commands on the helper's stdin, newline-delimited
//! single-line JSON objects on its stdout:
//!
//! | Direction | Line | Meaning |
//! |-----------|------|---------|
//! | helper → host | `{"status":"ready"}` | startup complete |
//! | helper → host | `{"error":"..."}` | fatal init failure |
//! | host → helper | `read` | request one reading |
//! | helper → host | `{"cpu_temp":61.0,...}` | one reading |
//! | host → helper | `quit` | shut down |
//!
//! ## Failure Handling
//!
//! Any I/O or decode failure keeps the last-known-good values and continues
//! polling. After [`MAX_FAILURES`] consecutive failures the helper is
//! killed and respawned. Nothing here is ever fatal to the poller thread.

use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use crate::error::{PanelError, Result};

use super::{HardwareReadings, HardwareSlot, WorkerHandle};

/// Poll period (~2 Hz; hardware sensors change slowly)
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// How long to wait for the startup ready line
const READY_TIMEOUT: Duration = Duration::from_secs(10);

/// How long to wait for a single reading
const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Consecutive failures before the helper is respawned
const MAX_FAILURES: u32 = 3;

/// Background hardware-monitor poller.
pub struct HardwareMonitor {
    worker: WorkerHandle,
}

impl HardwareMonitor {
    /// Start polling the helper at `helper_path` into the given slot.
    ///
    /// A helper that fails to start is retried from inside the poll loop;
    /// spawn itself never fails.
    pub fn spawn(helper_path: PathBuf, slot: HardwareSlot) -> Self {
        let worker = WorkerHandle::spawn("hwmon-poller", move |stop| {
            poll_loop(&helper_path, slot, &stop);
        });
        log::info!("hardware-monitor poller started");
        Self { worker }
    }

    /// Stop the poller, waiting a bounded time for the thread to exit.
    pub fn stop(self) {
        self.worker.stop();
        log::info!("hardware-monitor poller stopped");
    }
}

// ============================================================================
// HELPER PROCESS
// ============================================================================

/// A running helper subprocess with a dedicated stdout reader thread.
///
/// The reader thread forwards lines over a channel so the poller only ever
/// blocks with a timeout, never directly on the pipe.
struct HelperProcess {
    child: Child,
    stdin: ChildStdin,
    lines: mpsc::Receiver<String>,
}

impl HelperProcess {
    fn start(path: &PathBuf) -> Result<Self> {
        let mut child = Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                PanelError::Connection(format!("failed to start {}: {e}", path.display()))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| PanelError::Connection("helper stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PanelError::Connection("helper stdout unavailable".into()))?;

        let (tx, rx) = mpsc::channel();
        std::thread::Builder::new()
            .name("hwmon-reader".to_string())
            .spawn(move || {
                let reader = BufReader::new(stdout);
                for line in reader.lines() {
                    match line {
                        Ok(l) => {
                            if tx.send(l).is_err() {
                                break;
                            }
                        }
                        Err(_) => break,
                    }
                }
            })
            .map_err(|e| PanelError::Connection(format!("reader thread spawn failed: {e}")))?;

        let mut helper = Self {
            child,
            stdin,
            lines: rx,
        };
        helper.await_ready()?;
        Ok(helper)
    }

    /// Wait for the `{"status":"ready"}` startup line.
    fn await_ready(&mut self) -> Result<()> {
        let line = self
            .lines
            .recv_timeout(READY_TIMEOUT)
            .map_err(|_| PanelError::Connection("no ready signal from helper".into()))?;
        let value: serde_json::Value = serde_json::from_str(&line)
            .map_err(|e| PanelError::Decode(format!("bad startup line: {e}")))?;
        if let Some(err) = value.get("error").and_then(|v| v.as_str()) {
            return Err(PanelError::Connection(format!("helper init failed: {err}")));
        }
        match value.get("status").and_then(|v| v.as_str()) {
            Some("ready") => Ok(()),
            _ => Err(PanelError::Decode(format!("unexpected startup line: {line}"))),
        }
    }

    /// Request and decode one reading.
    fn read(&mut self) -> Result<HardwareReadings> {
        self.stdin.write_all(b"read\n")?;
        self.stdin.flush()?;

        let line = self
            .lines
            .recv_timeout(READ_TIMEOUT)
            .map_err(|_| PanelError::Decode("read timed out".into()))?;
        parse_reading(&line)
    }

    fn alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Best-effort shutdown: polite quit, then kill.
    fn shutdown(mut self) {
        let _ = self.stdin.write_all(b"quit\n");
        let _ = self.stdin.flush();
        std::thread::sleep(Duration::from_millis(100));
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Decode one JSON reading line into [`HardwareReadings`].
///
/// Keys absent from the object read as 0 (the cache merge treats 0 as
/// "not reported").
fn parse_reading(line: &str) -> Result<HardwareReadings> {
    let value: serde_json::Value =
        serde_json::from_str(line).map_err(|e| PanelError::Decode(format!("bad reading: {e}")))?;
    if let Some(err) = value.get("error").and_then(|v| v.as_str()) {
        return Err(PanelError::Decode(format!("helper error: {err}")));
    }
    let obj = value
        .as_object()
        .ok_or_else(|| PanelError::Decode(format!("reading is not an object: {line}")))?;

    let field = |key: &str| obj.get(key).and_then(|v| v.as_f64()).unwrap_or(0.0);

    Ok(HardwareReadings {
        cpu_temp: field("cpu_temp"),
        cpu_clock: field("cpu_clock"),
        cpu_power: field("cpu_power"),
        gpu_percent: field("gpu_percent"),
        gpu_temp: field("gpu_temp"),
        gpu_clock: field("gpu_clock"),
        gpu_memory_percent: field("gpu_memory_percent"),
        gpu_memory_clock: field("gpu_memory_clock"),
        gpu_power: field("gpu_power"),
    })
}

// ============================================================================
// POLL LOOP
// ============================================================================

fn poll_loop(helper_path: &PathBuf, slot: HardwareSlot, stop: &Arc<AtomicBool>) {
    let mut helper: Option<HelperProcess> = match HelperProcess::start(helper_path) {
        Ok(h) => Some(h),
        Err(e) => {
            log::warn!("sensor helper unavailable: {e} (will retry)");
            None
        }
    };
    let mut failures: u32 = 0;

    while !stop.load(Ordering::Relaxed) {
        std::thread::sleep(POLL_INTERVAL);
        if stop.load(Ordering::Relaxed) {
            break;
        }

        match helper.as_mut() {
            Some(h) => {
                if h.alive() {
                    match h.read() {
                        Ok(readings) => {
                            failures = 0;
                            *slot.lock().unwrap_or_else(|e| e.into_inner()) = readings;
                        }
                        Err(e) => {
                            failures += 1;
                            log::debug!("sensor read failed ({failures}/{MAX_FAILURES}): {e}");
                        }
                    }
                } else {
                    // Process died underneath us; count toward restart
                    failures += 1;
                }
            }
            None => {
                // Never started; count toward restart
                failures += 1;
            }
        }

        if failures >= MAX_FAILURES {
            failures = 0;
            log::warn!("restarting sensor helper after repeated failures");
            if let Some(h) = helper.take() {
                h.shutdown();
            }
            match HelperProcess::start(helper_path) {
                Ok(h) => {
                    log::info!("sensor helper restarted");
                    helper = Some(h);
                }
                Err(e) => log::warn!("sensor helper restart failed: {e}"),
            }
        }
    }

    if let Some(h) = helper.take() {
        h.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::SensorCache;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_reading_full() {
        let line = r#"{"cpu_temp":61.5,"cpu_clock":4200,"cpu_power":45.2,
                       "gpu_temp":55,"gpu_percent":12,"gpu_clock":1810,
                       "gpu_memory_clock":875,"gpu_memory_percent":30,"gpu_power":80}"#;
        let r = parse_reading(line).unwrap();
        assert_eq!(r.cpu_temp, 61.5);
        assert_eq!(r.gpu_clock, 1810.0);
        assert_eq!(r.gpu_power, 80.0);
    }

    #[test]
    fn test_parse_reading_missing_keys_default_to_zero() {
        let r = parse_reading(r#"{"cpu_temp": 50}"#).unwrap();
        assert_eq!(r.cpu_temp, 50.0);
        assert_eq!(r.gpu_temp, 0.0);
    }

    #[test]
    fn test_parse_reading_rejects_garbage() {
        assert!(parse_reading("not json").is_err());
        assert!(parse_reading(r#"{"error":"driver missing"}"#).is_err());
        assert!(parse_reading("[1,2,3]").is_err());
    }

    #[test]
    fn test_dead_helper_freezes_last_values() {
        // Helper binary that never existed: the poller must keep running
        // and leave the slot at its last value without panicking.
        let cache = SensorCache::new();
        {
            let slot = cache.hardware_slot();
            let mut hw = slot.lock().unwrap();
            hw.cpu_temp = 58.0;
        }
        let poller = HardwareMonitor::spawn(
            PathBuf::from("/nonexistent/sensor-helper"),
            cache.hardware_slot(),
        );
        std::thread::sleep(Duration::from_millis(700));
        let snap = cache.snapshot();
        assert_eq!(snap.get(crate::sensors::SourceKey::CpuTemp), 58.0);
        poller.stop();
    }
}
