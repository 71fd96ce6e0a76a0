//! Animated video background.
//!
//! A one-shot worker thread fully decodes and pre-scales every frame of the
//! source before the background becomes active, then playback is a pure
//! index computation from wall-clock time — the render path never touches
//! the decoder. Animated GIF is the supported container (decoded with the
//! `image` crate); decode fidelity beyond scaling and centering is out of
//! scope.
//!
//! Loading is observable without blocking: [`VideoBackground::poll`] drains
//! the worker's completion channel and flips the state to `Ready` or
//! `Failed`.

use image::codecs::gif::GifDecoder;
use image::{imageops, AnimationDecoder, RgbaImage};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Instant;

use crate::theme::{is_safe_path, VideoFitMode};

/// Fallback playback rate when the container carries no usable timing
const DEFAULT_FPS: f32 = 30.0;

/// Fully-decoded, display-ready video.
#[derive(Debug)]
struct LoadedVideo {
    frames: Vec<RgbaImage>,
    fps: f32,
    x_offset: i32,
    y_offset: i32,
}

/// Loading lifecycle of a video background.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    Loading,
    Ready,
    Failed(String),
}

/// An active (or loading) video background for one display resolution.
pub struct VideoBackground {
    state: LoadState,
    video: Option<LoadedVideo>,
    pending: Option<mpsc::Receiver<Result<LoadedVideo, String>>>,
    epoch: Instant,
}

impl VideoBackground {
    /// Start decoding `path` for a `display_width` x `display_height`
    /// panel. Returns immediately; decoding happens on a worker thread.
    pub fn load(path: &Path, display_width: u32, display_height: u32, fit: VideoFitMode) -> Self {
        let (tx, rx) = mpsc::channel();
        let path: PathBuf = path.to_path_buf();
        std::thread::spawn(move || {
            let result = decode_and_scale(&path, display_width, display_height, fit);
            let _ = tx.send(result);
        });

        Self {
            state: LoadState::Loading,
            video: None,
            pending: Some(rx),
            epoch: Instant::now(),
        }
    }

    /// Drain the worker's completion signal, if any. Non-blocking.
    pub fn poll(&mut self) -> &LoadState {
        if let Some(rx) = &self.pending {
            match rx.try_recv() {
                Ok(Ok(video)) => {
                    log::info!(
                        "video loaded: {} frames @ {:.1} fps ({:.1} MB in memory)",
                        video.frames.len(),
                        video.fps,
                        video.frames.iter().map(|f| f.len()).sum::<usize>() as f64 / 1e6
                    );
                    self.video = Some(video);
                    self.state = LoadState::Ready;
                    self.pending = None;
                    self.epoch = Instant::now();
                }
                Ok(Err(msg)) => {
                    log::warn!("video load failed: {msg}");
                    self.state = LoadState::Failed(msg);
                    self.pending = None;
                }
                Err(mpsc::TryRecvError::Empty) => {}
                Err(mpsc::TryRecvError::Disconnected) => {
                    self.state = LoadState::Failed("decode worker died".into());
                    self.pending = None;
                }
            }
        }
        &self.state
    }

    /// The frame for the current wall-clock instant, plus its blit offset.
    ///
    /// `None` while loading or after a failed load (callers fall back to
    /// the solid background color).
    pub fn current_frame(&self) -> Option<(&RgbaImage, i32, i32)> {
        let video = self.video.as_ref()?;
        if video.frames.is_empty() {
            return None;
        }
        let elapsed = self.epoch.elapsed().as_secs_f32();
        let index = (elapsed * video.fps) as usize % video.frames.len();
        Some((&video.frames[index], video.x_offset, video.y_offset))
    }

    /// Restart playback from frame 0.
    pub fn reset_timing(&mut self) {
        self.epoch = Instant::now();
    }

    pub fn frame_count(&self) -> usize {
        self.video.as_ref().map(|v| v.frames.len()).unwrap_or(0)
    }

    pub fn fps(&self) -> f32 {
        self.video.as_ref().map(|v| v.fps).unwrap_or(DEFAULT_FPS)
    }
}

/// Decode every frame and pre-scale it per the fit mode.
fn decode_and_scale(
    path: &Path,
    display_width: u32,
    display_height: u32,
    fit: VideoFitMode,
) -> Result<LoadedVideo, String> {
    if !is_safe_path(path) {
        return Err(format!("unsafe video path blocked: {}", path.display()));
    }
    let file = File::open(path).map_err(|e| format!("cannot open {}: {e}", path.display()))?;
    let decoder = GifDecoder::new(BufReader::new(file)).map_err(|e| format!("bad gif: {e}"))?;
    let raw_frames = decoder
        .into_frames()
        .collect_frames()
        .map_err(|e| format!("gif decode failed: {e}"))?;
    if raw_frames.is_empty() {
        return Err("video has no frames".into());
    }

    // Per-frame delays can vary; use the average for a steady clock
    let mut total_ms = 0.0f32;
    for frame in &raw_frames {
        let (numer, denom) = frame.delay().numer_denom_ms();
        if denom > 0 {
            total_ms += numer as f32 / denom as f32;
        }
    }
    let avg_ms = total_ms / raw_frames.len() as f32;
    let fps = if avg_ms > 0.0 { 1000.0 / avg_ms } else { DEFAULT_FPS };

    let first = raw_frames[0].buffer();
    let (src_w, src_h) = (first.width().max(1), first.height().max(1));
    let aspect = src_w as f32 / src_h as f32;
    let (new_w, new_h, x_offset, y_offset) = match fit {
        VideoFitMode::FitHeight => {
            let h = display_height;
            let w = (h as f32 * aspect) as u32;
            ((w.max(1)), h, (display_width as i32 - w as i32) / 2, 0)
        }
        VideoFitMode::FitWidth => {
            let w = display_width;
            let h = (w as f32 / aspect) as u32;
            (w, h.max(1), 0, (display_height as i32 - h as i32) / 2)
        }
    };

    let frames: Vec<RgbaImage> = raw_frames
        .into_iter()
        .map(|frame| {
            imageops::resize(frame.buffer(), new_w, new_h, imageops::FilterType::Triangle)
        })
        .collect();

    Ok(LoadedVideo {
        frames,
        fps,
        x_offset,
        y_offset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_missing_file_reports_failure() {
        let mut bg = VideoBackground::load(
            Path::new("/nonexistent/background.gif"),
            1280,
            480,
            VideoFitMode::FitHeight,
        );
        // Worker finishes quickly for a missing file
        let deadline = Instant::now() + std::time::Duration::from_secs(2);
        loop {
            if !matches!(bg.poll(), LoadState::Loading) || Instant::now() > deadline {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        assert!(matches!(bg.poll(), LoadState::Failed(_)));
        assert!(bg.current_frame().is_none());
        assert_eq!(bg.frame_count(), 0);
    }

    #[test]
    fn test_traversal_path_is_blocked() {
        let err = decode_and_scale(
            Path::new("../../evil.gif"),
            1280,
            480,
            VideoFitMode::FitHeight,
        )
        .unwrap_err();
        assert!(err.contains("unsafe"));
    }
}
