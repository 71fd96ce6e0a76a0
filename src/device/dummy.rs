//! Virtual device for exercising the pipeline without USB hardware.
//!
//! Accepts frames, tracks throughput, and optionally writes the most
//! recent frame to disk for visual inspection. Its fake VID/PID never
//! matches real hardware.

use hidapi::HidApi;
use image::RgbaImage;
use std::path::PathBuf;
use std::time::Instant;

use super::{DisplayDriver, FrameFormat, ProtocolStatus};
use crate::error::{PanelError, Result};
use crate::render::FrameProducer;

pub const VENDOR_ID: u16 = 0xFFFF;
pub const PRODUCT_ID: u16 = 0x0001;

/// Rolling window size for the throughput estimate.
const FPS_WINDOW: usize = 60;

/// Hardware-free test device.
pub struct DummyDriver {
    width: u32,
    height: u32,
    output_dir: Option<PathBuf>,
    open: bool,
    frame_count: u64,
    fps_window: Vec<Instant>,
}

impl DummyDriver {
    pub fn new() -> Self {
        Self::with_size(480, 480)
    }

    pub fn with_size(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            output_dir: None,
            open: false,
            frame_count: 0,
            fps_window: Vec::new(),
        }
    }

    /// Save the latest frame to `dir/last_frame.jpg` on every send.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Rolling frames-per-second over the last [`FPS_WINDOW`] frames.
    pub fn fps(&self) -> f64 {
        if self.fps_window.len() < 2 {
            return 0.0;
        }
        let elapsed = self.fps_window[self.fps_window.len() - 1]
            .duration_since(self.fps_window[0])
            .as_secs_f64();
        if elapsed <= 0.0 {
            return 0.0;
        }
        (self.fps_window.len() - 1) as f64 / elapsed
    }

    fn require_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(PanelError::Connection("device not open".to_string()))
        }
    }
}

impl Default for DummyDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplayDriver for DummyDriver {
    fn device_name(&self) -> &'static str {
        "Dummy (Test)"
    }

    fn vendor_id(&self) -> u16 {
        VENDOR_ID
    }

    fn product_id(&self) -> u16 {
        PRODUCT_ID
    }

    fn display_width(&self) -> u32 {
        self.width
    }

    fn display_height(&self) -> u32 {
        self.height
    }

    fn frame_format(&self) -> FrameFormat {
        FrameFormat::Jpeg
    }

    fn protocol_status(&self) -> ProtocolStatus {
        ProtocolStatus::Verified
    }

    fn open(&mut self, _api: &HidApi) -> Result<()> {
        self.open = true;
        self.frame_count = 0;
        self.fps_window.clear();
        log::info!("[Dummy] opened ({}x{})", self.width, self.height);
        Ok(())
    }

    fn close(&mut self) {
        if self.open {
            log::info!("[Dummy] closed after {} frames", self.frame_count);
        }
        self.open = false;
    }

    fn send_init(&mut self) -> Result<()> {
        self.require_open()?;
        log::info!("[Dummy] init OK");
        Ok(())
    }

    fn send_frame(&mut self, frame: &RgbaImage) -> Result<()> {
        self.require_open()?;
        self.frame_count += 1;
        self.fps_window.push(Instant::now());
        if self.fps_window.len() > FPS_WINDOW {
            self.fps_window.remove(0);
        }

        if let Some(dir) = &self.output_dir {
            std::fs::create_dir_all(dir)?;
            let jpeg = FrameProducer::encode_jpeg(frame)?;
            std::fs::write(dir.join("last_frame.jpg"), jpeg)?;
        }
        Ok(())
    }

    fn diagnose(&self, _api: &HidApi) {
        println!("--- Dummy Device ---");
        println!("  Virtual device, no USB hardware to probe.");
        println!("  Resolution: {}x{}", self.width, self.height);
        println!("  Frames accepted so far: {}", self.frame_count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn frame() -> RgbaImage {
        RgbaImage::from_pixel(4, 4, Rgba([1, 2, 3, 255]))
    }

    #[test]
    fn test_rejects_frames_while_closed() {
        let mut dev = DummyDriver::new();
        assert!(dev.send_frame(&frame()).is_err());
        assert!(dev.send_init().is_err());
    }

    #[test]
    fn test_counts_frames_and_resets_on_open() {
        let api = HidApi::new_without_enumerate().unwrap();
        let mut dev = DummyDriver::new();
        dev.open(&api).unwrap();
        dev.send_init().unwrap();
        for _ in 0..5 {
            dev.send_frame(&frame()).unwrap();
        }
        assert_eq!(dev.frame_count(), 5);
        assert!(dev.fps() > 0.0);

        dev.open(&api).unwrap();
        assert_eq!(dev.frame_count(), 0);
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut dev = DummyDriver::new();
        dev.close();
        dev.close();
    }

    #[test]
    fn test_writes_last_frame_to_output_dir() {
        let api = HidApi::new_without_enumerate().unwrap();
        let dir = std::env::temp_dir().join(format!("panelstream-dummy-{}", std::process::id()));
        let mut dev = DummyDriver::new().with_output_dir(&dir);
        dev.open(&api).unwrap();
        dev.send_frame(&frame()).unwrap();

        let saved = std::fs::read(dir.join("last_frame.jpg")).unwrap();
        assert_eq!(&saved[..2], &[0xFF, 0xD8]);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
