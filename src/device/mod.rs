//! # Device Drivers
//!
//! Driver contract and implementations for the supported LCD panels.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`hid`] | Shared HID open/write/read helpers |
//! | [`protocol`] | Wire-protocol constant tables |
//! | [`trofeo`] | Trofeo Vision 1280x480 JPEG driver (verified) |
//! | [`stubs`] | Diagnostic-only drivers for unverified chipsets |
//! | [`dummy`] | Virtual device for hardware-free testing |
//! | [`registry`] | VID/PID to driver lookup |
//! | [`manager`] | Multi-device connection lifecycle |
//!
//! ## Verified vs. unverified
//!
//! Every driver reports a [`ProtocolStatus`]. A `Verified` driver can open
//! the hardware and stream frames. An `Unverified` driver carries the wire
//! protocol recovered from the vendor tool but has never been exercised
//! against a physical panel; the manager never streams to one — connecting
//! runs its diagnostic probe instead, so users can capture the data needed
//! to finish the driver.

pub mod dummy;
pub mod hid;
pub mod manager;
pub mod protocol;
pub mod registry;
pub mod stubs;
pub mod trofeo;

use hidapi::HidApi;
use image::RgbaImage;
use std::fmt;

use crate::error::Result;

pub use dummy::DummyDriver;
pub use manager::{DeviceManager, DiscoveredDevice};
pub use registry::driver_for;
pub use trofeo::TrofeoVisionDriver;

/// Frame encoding a panel expects on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    Jpeg,
    Rgb565,
}

/// Implementation maturity of a driver's wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolStatus {
    /// Tested against physical hardware; safe to stream.
    Verified,
    /// Protocol documented but untested; diagnose-only.
    Unverified,
}

/// Contract every panel driver implements.
///
/// Drivers own their encoding and chunking: the caller hands over an RGBA
/// frame at the panel's native resolution and the driver does the rest.
/// `close` must be idempotent. `open`/`diagnose` borrow the process-wide
/// [`HidApi`] owned by the [`DeviceManager`].
pub trait DisplayDriver: Send {
    fn device_name(&self) -> &'static str;
    fn vendor_id(&self) -> u16;
    fn product_id(&self) -> u16;
    /// Native panel width in pixels.
    fn display_width(&self) -> u32;
    fn display_height(&self) -> u32;
    fn frame_format(&self) -> FrameFormat;
    fn protocol_status(&self) -> ProtocolStatus;

    fn open(&mut self, api: &HidApi) -> Result<()>;
    fn close(&mut self);
    /// Send the device's initialization packet. Called once after `open`.
    fn send_init(&mut self) -> Result<()>;
    /// Encode and transmit one frame at native resolution.
    fn send_frame(&mut self, frame: &RgbaImage) -> Result<()>;

    /// Print a diagnostic probe report to stdout. Never streams.
    fn diagnose(&self, api: &HidApi);

    /// System is suspending.
    fn on_sleep(&mut self) {}
    /// System resumed.
    fn on_wake(&mut self) {}
}

impl fmt::Display for dyn DisplayDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}x{})",
            self.device_name(),
            self.display_width(),
            self.display_height()
        )
    }
}

/// Canonical device key: `"vvvv:pppp"` lower-case hex.
pub fn device_key(vid: u16, pid: u16) -> String {
    format!("{vid:04x}:{pid:04x}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_device_key_format() {
        assert_eq!(device_key(0x0416, 0x5302), "0416:5302");
        assert_eq!(device_key(0x87AD, 0x70DB), "87ad:70db");
        assert_eq!(device_key(0xFFFF, 0x0001), "ffff:0001");
    }
}
