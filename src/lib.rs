//! # Panelstream - USB LCD Panel Streaming Library
//!
//! Panelstream drives the small HID LCD panels that ship with PC cooling
//! hardware. It renders a JSON-described theme (gauges, charts, clocks,
//! images, animated backgrounds) with live sensor data and streams the
//! result to the panel over USB HID. It provides:
//!
//! - **Device drivers**: verified Trofeo Vision support plus diagnostic
//!   probes for four unverified chipsets
//! - **Rendering**: a software compositor for the full theme element set
//! - **Sensors**: OS metrics via `sysinfo` plus an external hardware
//!   monitor helper process
//! - **Streaming**: a retargetable fixed-rate frame scheduler
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::{Arc, Mutex};
//! use panelstream::{
//!     device::DeviceManager,
//!     sensors::{SensorCache, SystemPoller},
//!     stream::StreamScheduler,
//!     theme::Theme,
//! };
//!
//! let cache = SensorCache::new();
//! let poller = SystemPoller::spawn(cache.system_slot());
//!
//! let mut manager = DeviceManager::new()?;
//! manager.connect(0x0416, 0x5302)?;
//!
//! let theme = Theme::from_json(&std::fs::read_to_string("theme.json")?)?;
//! let scheduler = StreamScheduler::start(
//!     Arc::new(Mutex::new(manager)),
//!     Arc::new(Mutex::new(theme)),
//!     cache,
//!     20,
//! );
//!
//! // ... stream runs until stopped
//! scheduler.stop();
//! poller.stop();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`theme`] | Theme model and element data |
//! | [`sensors`] | Sensor sources and merged snapshots |
//! | [`render`] | Frame compositing and JPEG encoding |
//! | [`device`] | Panel drivers, registry, and manager |
//! | [`stream`] | Frame scheduler |
//! | [`error`] | Error types |
//!
//! ## Supported Panels
//!
//! Currently verified with:
//! - Thermalright Trofeo Vision (1280x480, JPEG over HID)
//!
//! ALi, LianYun, LianYun V2, and Xsail chipset panels are recognized and
//! can be probed for diagnostics, pending hardware to verify their
//! protocols against.

pub mod device;
pub mod error;
pub mod render;
pub mod sensors;
pub mod stream;
pub mod theme;

// Re-exports for convenience
pub use device::DeviceManager;
pub use error::PanelError;
pub use render::FrameProducer;
pub use stream::StreamScheduler;
pub use theme::Theme;
