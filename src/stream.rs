//! # Stream Scheduler
//!
//! Timer-driven pump that renders the active theme and pushes the frame
//! to every connected device at a target rate.
//!
//! ## Behavior
//!
//! - The target FPS lives in an atomic; retargeting re-paces even an
//!   in-flight sleep without restarting the stream.
//! - Per-tick errors (render or device write) are logged and the loop
//!   keeps running; a flaky cable never kills the stream.
//! - Frame times feed a 30-sample rolling window; when the achieved rate
//!   drops below 70% of target a performance warning is logged.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::device::DeviceManager;
use crate::render::FrameProducer;
use crate::sensors::{SensorCache, WorkerHandle};
use crate::theme::Theme;

/// Rolling frame-time window length.
const FRAME_WINDOW: usize = 30;

/// Achieved/target ratio below which a warning is logged.
const PERF_WARN_RATIO: f64 = 0.7;

/// Ticks between performance checks.
const PERF_CHECK_EVERY: u64 = 100;

/// Sleep slice; keeps stop and retarget responsive mid-interval.
const SLEEP_SLICE: Duration = Duration::from_millis(10);

struct SchedulerShared {
    target_fps: AtomicU32,
    frame_times: Mutex<VecDeque<f64>>,
}

impl SchedulerShared {
    fn record_frame_time(&self, dt: f64) {
        let mut window = self.frame_times.lock().unwrap_or_else(|e| e.into_inner());
        window.push_back(dt);
        while window.len() > FRAME_WINDOW {
            window.pop_front();
        }
    }

    fn actual_fps(&self) -> f64 {
        let window = self.frame_times.lock().unwrap_or_else(|e| e.into_inner());
        if window.is_empty() {
            return 0.0;
        }
        let avg = window.iter().sum::<f64>() / window.len() as f64;
        if avg > 0.0 {
            1.0 / avg
        } else {
            0.0
        }
    }
}

/// Handle to a running stream.
pub struct StreamScheduler {
    shared: Arc<SchedulerShared>,
    worker: Option<WorkerHandle>,
}

impl StreamScheduler {
    /// Start streaming. The scheduler renders `theme` with the latest
    /// sensor snapshot each tick and sends the frame to every device the
    /// manager holds open.
    pub fn start(
        manager: Arc<Mutex<DeviceManager>>,
        theme: Arc<Mutex<Theme>>,
        cache: SensorCache,
        target_fps: u32,
    ) -> Self {
        let shared = Arc::new(SchedulerShared {
            target_fps: AtomicU32::new(clamp_fps(target_fps)),
            frame_times: Mutex::new(VecDeque::with_capacity(FRAME_WINDOW)),
        });
        let state = Arc::clone(&shared);

        let worker = WorkerHandle::spawn("stream-scheduler", move |stop| {
            let mut producer = FrameProducer::new();
            let mut last_tick: Option<Instant> = None;
            let mut tick: u64 = 0;

            while !stop.load(Ordering::Relaxed) {
                let tick_start = Instant::now();
                let target = state.target_fps.load(Ordering::Relaxed);

                let keys = {
                    let mgr = manager.lock().unwrap_or_else(|e| e.into_inner());
                    mgr.connected_keys()
                };
                if keys.is_empty() {
                    // Nothing to drive; skip the render work but keep pacing
                    last_tick = None;
                } else {
                    let frame = {
                        let theme = theme.lock().unwrap_or_else(|e| e.into_inner()).clone();
                        producer.render(&theme, &cache.snapshot())
                    };
                    {
                        let mut mgr = manager.lock().unwrap_or_else(|e| e.into_inner());
                        for key in &keys {
                            if let Some(driver) = mgr.get_device_mut(key) {
                                if let Err(e) = driver.send_frame(&frame) {
                                    log::warn!("frame send failed on {key}: {e}");
                                }
                            }
                        }
                    }

                    if let Some(prev) = last_tick {
                        state.record_frame_time(tick_start.duration_since(prev).as_secs_f64());
                    }
                    last_tick = Some(tick_start);
                }

                tick += 1;
                if tick % PERF_CHECK_EVERY == 0 {
                    let actual = state.actual_fps();
                    if actual > 0.0 && actual < target as f64 * PERF_WARN_RATIO {
                        log::warn!(
                            "performance warning: achieving {actual:.1} FPS against a {target} FPS target"
                        );
                    }
                }

                // Sleep the remainder of the interval in short slices,
                // re-reading the target each slice so a stop request or a
                // retarget cuts an in-flight sleep short
                loop {
                    if stop.load(Ordering::Relaxed) {
                        break;
                    }
                    let fps = state.target_fps.load(Ordering::Relaxed);
                    let deadline = tick_start + Duration::from_secs_f64(1.0 / fps as f64);
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    std::thread::sleep(deadline.duration_since(now).min(SLEEP_SLICE));
                }
            }
        });

        Self {
            shared,
            worker: Some(worker),
        }
    }

    /// Change the target rate; takes effect immediately, shortening the
    /// current inter-frame sleep if one is in progress.
    pub fn set_target_fps(&self, fps: u32) {
        self.shared
            .target_fps
            .store(clamp_fps(fps), Ordering::Relaxed);
    }

    pub fn target_fps(&self) -> u32 {
        self.shared.target_fps.load(Ordering::Relaxed)
    }

    /// Achieved rate over the rolling window; 0 until two frames have
    /// been produced.
    pub fn actual_fps(&self) -> f64 {
        self.shared.actual_fps()
    }

    /// Stop the stream and wait (bounded) for the worker to exit.
    pub fn stop(mut self) {
        if let Some(worker) = self.worker.take() {
            worker.stop();
        }
    }
}

fn clamp_fps(fps: u32) -> u32 {
    fps.clamp(1, 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hidapi::HidApi;
    use pretty_assertions::assert_eq;

    fn running_scheduler(fps: u32) -> (StreamScheduler, Arc<Mutex<DeviceManager>>) {
        let mut mgr = DeviceManager::with_api(HidApi::new_without_enumerate().unwrap());
        mgr.connect(0xFFFF, 0x0001).unwrap();
        let manager = Arc::new(Mutex::new(mgr));
        let theme = Arc::new(Mutex::new(Theme {
            display_width: 64,
            display_height: 64,
            ..Theme::default()
        }));
        let scheduler = StreamScheduler::start(
            Arc::clone(&manager),
            theme,
            SensorCache::new(),
            fps,
        );
        (scheduler, manager)
    }

    #[test]
    fn test_stream_produces_frames() {
        let (scheduler, manager) = running_scheduler(30);
        std::thread::sleep(Duration::from_millis(500));
        // 30 FPS for 0.5s; accept wide margins on loaded machines
        assert!(scheduler.actual_fps() > 1.0);
        scheduler.stop();
        assert!(manager.lock().unwrap().is_connected());
    }

    #[test]
    fn test_retarget_applies_without_restart() {
        let (scheduler, _manager) = running_scheduler(30);
        assert_eq!(scheduler.target_fps(), 30);
        scheduler.set_target_fps(10);
        assert_eq!(scheduler.target_fps(), 10);
        scheduler.stop();
    }

    #[test]
    fn test_fps_is_clamped() {
        assert_eq!(clamp_fps(0), 1);
        assert_eq!(clamp_fps(30), 30);
        assert_eq!(clamp_fps(1000), 60);
    }

    #[test]
    fn test_actual_fps_tracks_frame_times() {
        let shared = SchedulerShared {
            target_fps: AtomicU32::new(10),
            frame_times: Mutex::new(VecDeque::new()),
        };
        assert_eq!(shared.actual_fps(), 0.0);
        for _ in 0..10 {
            shared.record_frame_time(0.1);
        }
        let fps = shared.actual_fps();
        assert!((fps - 10.0).abs() < 1e-6);

        // Window stays bounded
        for _ in 0..100 {
            shared.record_frame_time(0.05);
        }
        assert_eq!(shared.frame_times.lock().unwrap().len(), FRAME_WINDOW);
    }

    #[test]
    fn test_no_devices_means_no_render_work() {
        let mgr = DeviceManager::with_api(HidApi::new_without_enumerate().unwrap());
        let manager = Arc::new(Mutex::new(mgr));
        let theme = Arc::new(Mutex::new(Theme::default()));
        let scheduler = StreamScheduler::start(manager, theme, SensorCache::new(), 30);
        std::thread::sleep(Duration::from_millis(300));
        // Ticks with an empty manager never produce frames
        assert_eq!(scheduler.actual_fps(), 0.0);
        scheduler.stop();
    }

    #[test]
    fn test_stop_returns_promptly() {
        let (scheduler, _manager) = running_scheduler(10);
        let begin = Instant::now();
        scheduler.stop();
        assert!(begin.elapsed() < Duration::from_secs(2));
    }
}
