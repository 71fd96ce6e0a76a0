//! # OS-Metrics Poller
//!
//! Samples CPU load, memory, and network throughput from the OS at ~5 Hz
//! using the `sysinfo` crate and publishes the result set atomically into
//! the shared [`SystemMetrics`](super::SystemMetrics) slot.
//!
//! - CPU load is smoothed over a trailing window of the last 5 samples to
//!   keep gauges from flickering at high frame rates.
//! - Network rates are instantaneous: delta of the cumulative counters over
//!   the elapsed time between consecutive reads, summed across interfaces.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use sysinfo::{CpuRefreshKind, MemoryRefreshKind, Networks, RefreshKind, System};

use super::{SystemMetrics, SystemSlot, WorkerHandle};

/// Poll period (~5 Hz keeps CPU readings responsive without much overhead)
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Trailing window length for CPU smoothing
const CPU_WINDOW: usize = 5;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;
const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Background OS-metrics poller.
///
/// Runs on its own thread from `spawn` until `stop`. The thread only ever
/// blocks on its own sleep-based pacing, never on shared state.
pub struct SystemPoller {
    worker: WorkerHandle,
}

impl SystemPoller {
    /// Start polling into the given slot.
    pub fn spawn(slot: SystemSlot) -> Self {
        let worker = WorkerHandle::spawn("system-poller", move |stop| {
            poll_loop(slot, &stop);
        });
        log::info!("OS-metrics poller started");
        Self { worker }
    }

    /// Stop the poller, waiting a bounded time for the thread to exit.
    pub fn stop(self) {
        self.worker.stop();
        log::info!("OS-metrics poller stopped");
    }
}

fn poll_loop(slot: SystemSlot, stop: &Arc<AtomicBool>) {
    let mut system = System::new_with_specifics(
        RefreshKind::new()
            .with_cpu(CpuRefreshKind::new().with_cpu_usage())
            .with_memory(MemoryRefreshKind::new().with_ram()),
    );
    let mut networks = Networks::new_with_refreshed_list();

    let mut cpu_window: Vec<f64> = Vec::with_capacity(CPU_WINDOW);
    let mut last_net: Option<(u64, u64, Instant)> = None;

    // First cpu_usage() call after construction reads 0; prime it.
    system.refresh_cpu_usage();

    while !stop.load(Ordering::Relaxed) {
        std::thread::sleep(POLL_INTERVAL);

        system.refresh_cpu_usage();
        system.refresh_memory();
        networks.refresh();

        let raw_cpu = system.global_cpu_usage() as f64;
        cpu_window.push(raw_cpu);
        if cpu_window.len() > CPU_WINDOW {
            cpu_window.remove(0);
        }
        let smoothed_cpu = cpu_window.iter().sum::<f64>() / cpu_window.len() as f64;

        let total_mem = system.total_memory();
        let used_mem = system.used_memory();
        let avail_mem = system.available_memory();
        let ram_percent = if total_mem > 0 {
            used_mem as f64 / total_mem as f64 * 100.0
        } else {
            0.0
        };

        // Sum cumulative counters across all interfaces, then rate = delta/dt
        let mut sent_total: u64 = 0;
        let mut recv_total: u64 = 0;
        for (_, data) in networks.iter() {
            sent_total = sent_total.saturating_add(data.total_transmitted());
            recv_total = recv_total.saturating_add(data.total_received());
        }
        let now = Instant::now();
        let (net_upload, net_download) = match last_net {
            Some((prev_sent, prev_recv, prev_time)) => {
                let dt = now.duration_since(prev_time).as_secs_f64();
                if dt > 0.0 {
                    (
                        sent_total.saturating_sub(prev_sent) as f64 / dt / BYTES_PER_MB,
                        recv_total.saturating_sub(prev_recv) as f64 / dt / BYTES_PER_MB,
                    )
                } else {
                    (0.0, 0.0)
                }
            }
            None => (0.0, 0.0),
        };
        last_net = Some((sent_total, recv_total, now));

        let metrics = SystemMetrics {
            cpu_percent: round1(smoothed_cpu),
            ram_percent: round1(ram_percent),
            ram_used_gb: round1(used_mem as f64 / BYTES_PER_GB),
            ram_available_gb: round1(avail_mem as f64 / BYTES_PER_GB),
            net_upload_mbs: round2(net_upload),
            net_download_mbs: round2(net_download),
        };

        // Single short-held lock, full value replaced at once
        *slot.lock().unwrap_or_else(|e| e.into_inner()) = metrics;
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::SensorCache;

    #[test]
    fn test_rounding_helpers() {
        assert_eq!(round1(12.34), 12.3);
        assert_eq!(round2(3.456), 3.46);
    }

    #[test]
    fn test_poller_writes_and_stops_cleanly() {
        let cache = SensorCache::new();
        let poller = SystemPoller::spawn(cache.system_slot());
        std::thread::sleep(Duration::from_millis(450));
        poller.stop();

        // After at least one poll the memory fields are populated.
        let metrics = *cache.system_slot().lock().unwrap();
        assert!(metrics.ram_used_gb >= 0.0);
        assert!(metrics.ram_percent >= 0.0 && metrics.ram_percent <= 100.0);
    }
}
