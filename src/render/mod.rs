//! # Frame Rendering
//!
//! Turns a [`Theme`] plus the latest [`SensorSnapshot`] into a finished
//! RGBA frame, then into the JPEG payload the panels consume.
//!
//! ## Pipeline
//!
//! | Stage | Module |
//! |-------|--------|
//! | Compositing primitives | [`canvas`] |
//! | Font resolution & glyph layout | [`text`] |
//! | Animated video backgrounds | [`video`] |
//! | Element dispatch & caches | [`FrameProducer`] |
//!
//! The producer owns every per-stream cache: parsed fonts, pre-scaled
//! image and gif overlays, line-chart history, and the video background
//! worker. One producer serves one stream; it is not shared across
//! devices.
//!
//! Elements are composited in reverse list order (last element first), so
//! index 0 ends up on top. A live-bound element always draws the snapshot
//! value; the stored value is only honored for static elements.

pub mod canvas;
pub mod text;
pub mod video;

use chrono::{Local, Timelike};
use image::codecs::jpeg::JpegEncoder;
use image::{imageops, DynamicImage, Rgba, RgbaImage};
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::error::{PanelError, Result};
use crate::sensors::{SensorSnapshot, SourceKey, UnitKind};
use crate::theme::element::{BarTextMode, BarTextPosition, ClockFaceStyle, ScaleMode, TextAlign, TimeFormat};
use crate::theme::{is_safe_path, CustomElementRegistry, Element, ElementKind, Theme};
use canvas::{parse_color, Canvas};
use text::{Align, FontStore};

/// JPEG quality for panel frames.
pub const JPEG_QUALITY: u8 = 80;

/// Gauge arc band thickness in pixels.
const GAUGE_ARC_WIDTH: f32 = 18.0;

/// Warning color once a gauge value passes its first threshold.
const WARN_COLOR: &str = "#ffcc00";
/// Critical color past the second threshold.
const CRIT_COLOR: &str = "#ff3232";

/// Line charts accept at most one sample per this interval.
const CHART_UPDATE_INTERVAL: f64 = 0.05;
/// Samples retained per chart.
const CHART_MAX_HISTORY: usize = 100;

// ============================================================================
// CACHES
// ============================================================================

/// A decoded, pre-scaled animated gif overlay.
struct GifClip {
    frames: Vec<RgbaImage>,
    /// Per-frame display time in seconds.
    durations: Vec<f64>,
    total_duration: f64,
}

impl GifClip {
    /// Frame index for `elapsed` seconds of looped playback.
    fn frame_at(&self, elapsed: f64) -> usize {
        if self.frames.len() <= 1 || self.total_duration <= 0.0 {
            return 0;
        }
        let mut t = elapsed % self.total_duration;
        for (i, d) in self.durations.iter().enumerate() {
            if t < *d {
                return i;
            }
            t -= d;
        }
        self.frames.len() - 1
    }
}

/// Rolling value history for one line chart.
struct ChartSeries {
    values: Vec<f64>,
    last_push: Option<Instant>,
}

impl ChartSeries {
    fn new() -> Self {
        Self {
            values: Vec::new(),
            last_push: None,
        }
    }

    /// Append rate-limited; drops samples arriving faster than the chart
    /// scrolls.
    fn push(&mut self, value: f64) {
        if let Some(last) = self.last_push {
            if last.elapsed().as_secs_f64() < CHART_UPDATE_INTERVAL {
                return;
            }
        }
        self.values.push(value);
        if self.values.len() > CHART_MAX_HISTORY {
            self.values.remove(0);
        }
        self.last_push = Some(Instant::now());
    }
}

// ============================================================================
// FRAME PRODUCER
// ============================================================================

/// Stateful theme-to-frame renderer for one stream.
pub struct FrameProducer {
    fonts: FontStore,
    registry: CustomElementRegistry,
    /// Pre-scaled static image overlays, keyed by path + box + scale flag.
    images: HashMap<String, Option<Arc<RgbaImage>>>,
    /// Pre-scaled gif clips, keyed by path + box + scale mode.
    gifs: HashMap<String, Option<Arc<GifClip>>>,
    /// Per-element gif playback epochs.
    gif_epochs: HashMap<String, Instant>,
    charts: HashMap<String, ChartSeries>,
    video: Option<(String, video::VideoBackground)>,
    warned_custom: HashSet<String>,
}

impl FrameProducer {
    pub fn new() -> Self {
        Self::with_fonts(FontStore::new())
    }

    /// Construct with a caller-built font store (tests point this at a
    /// temp dir so rendering is deterministic).
    pub fn with_fonts(fonts: FontStore) -> Self {
        Self {
            fonts,
            registry: CustomElementRegistry::new(),
            images: HashMap::new(),
            gifs: HashMap::new(),
            gif_epochs: HashMap::new(),
            charts: HashMap::new(),
            video: None,
            warned_custom: HashSet::new(),
        }
    }

    /// Register a custom element renderer under its theme type id.
    pub fn register_custom(&mut self, type_id: impl Into<String>, imp: Box<dyn crate::theme::CustomElement>) {
        self.registry.register(type_id, imp);
    }

    /// Render one complete frame.
    pub fn render(&mut self, theme: &Theme, snapshot: &SensorSnapshot) -> RgbaImage {
        let mut canvas = self.background(theme);
        // Reverse order: index 0 is painted last, ending up on top
        for element in theme.elements.iter().rev() {
            self.draw_element(&mut canvas, element, snapshot);
        }
        canvas.into_image()
    }

    /// Encode a rendered frame as the JPEG payload sent to the panel.
    pub fn encode_jpeg(frame: &RgbaImage) -> Result<Vec<u8>> {
        let rgb = DynamicImage::ImageRgba8(frame.clone()).to_rgb8();
        let mut buf = Cursor::new(Vec::new());
        JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY)
            .encode_image(&rgb)
            .map_err(|e| PanelError::Render(format!("jpeg encode failed: {e}")))?;
        Ok(buf.into_inner())
    }

    // ------------------------------------------------------------------
    // Background
    // ------------------------------------------------------------------

    fn background(&mut self, theme: &Theme) -> Canvas {
        let bg = parse_color(&theme.background_color, 100);
        if !theme.video_enabled() {
            self.video = None;
            return Canvas::new(theme.display_width, theme.display_height, bg);
        }
        let video_ref = theme.video_background.as_ref().filter(|v| v.enabled);
        let Some(video_ref) = video_ref else {
            self.video = None;
            return Canvas::new(theme.display_width, theme.display_height, bg);
        };

        // (Re)start the decode worker when the path changes
        let stale = match &self.video {
            Some((path, _)) => path != &video_ref.video_path,
            None => true,
        };
        if stale {
            self.video = Some((
                video_ref.video_path.clone(),
                video::VideoBackground::load(
                    Path::new(&video_ref.video_path),
                    theme.display_width,
                    theme.display_height,
                    video_ref.fit_mode,
                ),
            ));
        }

        let mut canvas = Canvas::new(theme.display_width, theme.display_height, bg);
        if let Some((_, bgv)) = &mut self.video {
            bgv.poll();
            if let Some((frame, x, y)) = bgv.current_frame() {
                canvas.blit(frame, x, y, 100);
            }
        }
        canvas
    }

    // ------------------------------------------------------------------
    // Element dispatch
    // ------------------------------------------------------------------

    fn draw_element(&mut self, canvas: &mut Canvas, el: &Element, snapshot: &SensorSnapshot) {
        let value = el.resolved_value(snapshot);
        match &el.kind {
            ElementKind::CircleGauge => self.draw_circle_gauge(canvas, el, value),
            ElementKind::BarGauge => self.draw_bar_gauge(canvas, el, value),
            ElementKind::Text => self.draw_text(canvas, el, value),
            ElementKind::Rectangle => draw_rectangle(canvas, el),
            ElementKind::Clock => self.draw_clock(canvas, el),
            ElementKind::AnalogClock => self.draw_analog_clock(canvas, el),
            ElementKind::Image => self.draw_image(canvas, el),
            ElementKind::Gif => self.draw_gif(canvas, el),
            ElementKind::LineChart => self.draw_line_chart(canvas, el, value),
            ElementKind::Custom(type_id) => {
                if let Some(imp) = self.registry.get(type_id) {
                    imp.draw(canvas, el, value);
                } else if self.warned_custom.insert(type_id.clone()) {
                    log::warn!("no renderer registered for custom element '{type_id}'");
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Gauges
    // ------------------------------------------------------------------

    fn draw_circle_gauge(&mut self, canvas: &mut Canvas, el: &Element, value: f64) {
        let (cx, cy) = (el.x as f32, el.y as f32);
        let radius = el.radius as f32;
        let color = auto_color(el, value);

        // Track, then value arc over it; the band hangs inward from the
        // nominal radius
        let band_radius = radius - GAUGE_ARC_WIDTH / 2.0 + 1.0;
        let bg = parse_color(&el.background_color, el.background_color_opacity);
        canvas.stroke_arc(cx, cy, band_radius, GAUGE_ARC_WIDTH, 225.0, -270.0, bg);

        let sweep = -270.0 * (value.clamp(0.0, 100.0) as f32) / 100.0;
        let fg = parse_color(color, el.color_opacity);
        canvas.stroke_arc(cx, cy, band_radius, GAUGE_ARC_WIDTH, 225.0, sweep, fg);

        // Value readout in white, label below in the gauge color
        if let Some(font) = self.fonts.resolve(&el.font_family, el.font_bold, el.font_italic) {
            let value_text = el.source.format_value(value, el.temp_hide_unit);
            let size = el.font_size as f32;
            let extent = text::measure(&font, &value_text, size);
            let text_h = extent.ascent - extent.descent;
            text::draw_line(
                canvas,
                &font,
                &value_text,
                size,
                cx - extent.width / 2.0,
                cy - text_h / 2.0 - 10.0 + extent.ascent,
                Rgba([255, 255, 255, 255]),
            );

            let small = size * 0.6;
            let extent = text::measure(&font, &el.text, small);
            text::draw_line(
                canvas,
                &font,
                &el.text,
                small,
                cx - extent.width / 2.0,
                cy + radius / 3.0 + extent.ascent,
                fg,
            );
        }
    }

    fn draw_bar_gauge(&mut self, canvas: &mut Canvas, el: &Element, value: f64) {
        let (x, y) = (el.x, el.y);
        let (w, h) = (el.width, el.height);
        let color = bar_auto_color(el, value);
        let corner = if el.rounded_corners { h / 2 } else { 0 };

        let bg = parse_color(&el.background_color, el.background_color_opacity);
        canvas.fill_rounded_rect(x, y, w, h, corner, bg);

        let fill_width = (w as f64 * value.clamp(0.0, 100.0) / 100.0) as u32;
        if fill_width > 0 {
            let fg = parse_color(color, el.color_opacity);
            if el.gradient_fill {
                fill_gradient_bar(
                    canvas,
                    x,
                    y,
                    fill_width,
                    w,
                    h,
                    corner,
                    &el.gradient_stops,
                    el.color_opacity,
                    fg,
                );
            } else {
                canvas.fill_rounded_rect(x, y, fill_width, h, corner, fg);
            }
        }

        if el.bar_text_mode == BarTextMode::None {
            return;
        }
        let Some(font) = self.fonts.resolve(&el.font_family, el.font_bold, el.font_italic) else {
            return;
        };
        let value_text = el.source.format_value(value, el.temp_hide_unit);
        let display = match el.bar_text_mode {
            BarTextMode::Full => format!("{}: {}", el.text, value_text),
            _ => value_text,
        };
        let size = el.font_size as f32 * 0.6;
        let white = Rgba([255, 255, 255, 255]);
        match el.bar_text_position {
            BarTextPosition::Inside => {
                text::draw_in_box(canvas, &font, &display, size, x, y, w, h, Align::Center, white);
            }
            BarTextPosition::Left => {
                let extent = text::measure(&font, &display, size);
                let tx = x as f32 - extent.width - 10.0;
                let baseline = y as f32 + (h as f32 + extent.ascent - extent.descent.abs()) / 2.0;
                text::draw_line(canvas, &font, &display, size, tx, baseline, white);
            }
        }
    }

    // ------------------------------------------------------------------
    // Text & clocks
    // ------------------------------------------------------------------

    fn draw_text(&mut self, canvas: &mut Canvas, el: &Element, value: f64) {
        let content = if el.source == SourceKey::Static {
            el.text.clone()
        } else {
            let value_text = el.source.format_value(value, el.temp_hide_unit);
            if el.text.is_empty() {
                value_text
            } else {
                format!("{}: {}", el.text, value_text)
            }
        };
        self.draw_aligned_text(canvas, el, &content);
    }

    fn draw_clock(&mut self, canvas: &mut Canvas, el: &Element) {
        let now = Local::now();
        let fmt = match (el.time_format, el.show_seconds) {
            (TimeFormat::H12, true) => "%I:%M:%S",
            (TimeFormat::H12, false) => "%I:%M",
            (TimeFormat::H24, true) => "%H:%M:%S",
            (TimeFormat::H24, false) => "%H:%M",
        };
        let mut time_text = now.format(fmt).to_string();
        if el.time_format == TimeFormat::H12 && el.show_am_pm {
            time_text = format!("{time_text} {}", now.format("%p"));
        }
        if !el.show_leading_zero && time_text.starts_with('0') {
            time_text.remove(0);
        }
        self.draw_aligned_text(canvas, el, &time_text);
    }

    /// Shared box-aligned single line (text and digital clock elements).
    fn draw_aligned_text(&mut self, canvas: &mut Canvas, el: &Element, content: &str) {
        let Some(font) = self.fonts.resolve(&el.font_family, el.font_bold, el.font_italic) else {
            return;
        };
        let align = match el.text_align {
            TextAlign::Left => Align::Left,
            TextAlign::Center => Align::Center,
            TextAlign::Right => Align::Right,
        };
        let color = parse_color(&el.color, el.color_opacity);
        text::draw_in_box(
            canvas,
            &font,
            content,
            el.font_size as f32,
            el.x,
            el.y,
            el.width,
            el.height,
            align,
            color,
        );
    }

    fn draw_analog_clock(&mut self, canvas: &mut Canvas, el: &Element) {
        let (cx, cy) = (el.x as f32, el.y as f32);
        let radius = el.radius as f32;
        let color = parse_color(&el.color, el.color_opacity);
        let bg = parse_color(&el.background_color, el.background_color_opacity);

        let now = Local::now();
        let (hours, minutes, seconds) = (
            (now.hour() % 12) as f32,
            now.minute() as f32,
            now.second() as f32,
        );
        let subsec = now.nanosecond() as f32 / 1e9;
        // Fractional hands by default; whole-unit steps when smoothing is off
        let (hour_angle, minute_angle, second_angle) = if el.smooth {
            (
                (hours + minutes / 60.0) * 30.0,
                (minutes + seconds / 60.0) * 6.0,
                (seconds + subsec) * 6.0,
            )
        } else {
            (
                hours * 30.0 + minutes * 0.5,
                minutes * 6.0,
                seconds * 6.0,
            )
        };

        canvas.fill_circle(cx, cy, radius, bg);
        if el.show_clock_border {
            canvas.stroke_circle(cx, cy, radius, 2.0, color);
        }

        match el.clock_face_style {
            ClockFaceStyle::Numbers => {
                if let Some(font) = self.fonts.resolve(&el.font_family, el.font_bold, el.font_italic) {
                    let size = el.font_size as f32 * 0.8;
                    for i in 0..12u32 {
                        let num = if i == 0 { 12 } else { i };
                        let label = num.to_string();
                        let rad = (i as f32 * 30.0 - 90.0).to_radians();
                        let extent = text::measure(&font, &label, size);
                        let text_h = extent.ascent - extent.descent;
                        let tr = radius * 0.78;
                        text::draw_line(
                            canvas,
                            &font,
                            &label,
                            size,
                            cx + tr * rad.cos() - extent.width / 2.0,
                            cy + tr * rad.sin() - text_h / 2.0 + extent.ascent,
                            color,
                        );
                    }
                }
            }
            ClockFaceStyle::Ticks => {
                for i in 0..12u32 {
                    let rad = (i as f32 * 30.0 - 90.0).to_radians();
                    let (inner, width) = if i % 3 == 0 {
                        (radius * 0.75, 3.0)
                    } else {
                        (radius * 0.85, 1.0)
                    };
                    let outer = radius * 0.95;
                    canvas.draw_line(
                        cx + inner * rad.cos(),
                        cy + inner * rad.sin(),
                        cx + outer * rad.cos(),
                        cy + outer * rad.sin(),
                        width,
                        color,
                    );
                }
            }
            ClockFaceStyle::None => {}
        }

        let hand = |canvas: &mut Canvas, angle_deg: f32, length: f32, width: f32, c: Rgba<u8>| {
            let rad = (angle_deg - 90.0).to_radians();
            canvas.draw_line(cx, cy, cx + length * rad.cos(), cy + length * rad.sin(), width, c);
        };
        hand(canvas, hour_angle, radius * 0.5, 4.0, color);
        hand(canvas, minute_angle, radius * 0.7, 3.0, color);
        if el.show_seconds_hand {
            let alpha = (255u32 * el.color_opacity.min(100) as u32 / 100) as u8;
            hand(canvas, second_angle, radius * 0.85, 2.0, Rgba([255, 80, 80, alpha]));
        }
        canvas.fill_circle(cx, cy, 4.0, color);
    }

    // ------------------------------------------------------------------
    // Images & gifs
    // ------------------------------------------------------------------

    fn draw_image(&mut self, canvas: &mut Canvas, el: &Element) {
        if el.image_path.is_empty() {
            return;
        }
        let key = format!(
            "{}|{}x{}|{}",
            el.image_path, el.width, el.height, el.scale_proportionally
        );
        if !self.images.contains_key(&key) {
            let loaded = load_image_overlay(&el.image_path, el.width, el.height, el.scale_proportionally);
            self.images.insert(key.clone(), loaded.map(Arc::new));
        }
        if let Some(Some(overlay)) = self.images.get(&key) {
            canvas.blit(overlay, el.x, el.y, el.color_opacity);
        }
    }

    fn draw_gif(&mut self, canvas: &mut Canvas, el: &Element) {
        if el.gif_path.is_empty() {
            return;
        }
        let key = format!(
            "{}|{}x{}|{:?}",
            el.gif_path, el.width, el.height, el.scale_mode
        );
        if !self.gifs.contains_key(&key) {
            let loaded = load_gif_clip(&el.gif_path, el.width, el.height, el.scale_mode);
            self.gifs.insert(key.clone(), loaded.map(Arc::new));
        }
        let Some(Some(clip)) = self.gifs.get(&key) else {
            return;
        };
        let clip = Arc::clone(clip);
        let epoch = *self
            .gif_epochs
            .entry(element_key(el))
            .or_insert_with(Instant::now);
        let idx = clip.frame_at(epoch.elapsed().as_secs_f64());
        canvas.blit(&clip.frames[idx], el.x, el.y, el.color_opacity);
    }

    // ------------------------------------------------------------------
    // Line chart
    // ------------------------------------------------------------------

    fn draw_line_chart(&mut self, canvas: &mut Canvas, el: &Element, value: f64) {
        let (x, y) = (el.x, el.y);
        let (w, h) = (el.width, el.height);

        if el.show_background {
            let bg = parse_color(&el.background_color, el.background_color_opacity);
            canvas.fill_rect(x, y, w, h, bg);
            stroke_rect_outline(canvas, x, y, w, h, Rgba([60, 60, 80, 255]));
        }

        let series = self
            .charts
            .entry(element_key(el))
            .or_insert_with(ChartSeries::new);
        series.push(value);
        let history = &series.values;
        let num_points = history.len().min((w / 3).max(2) as usize);
        if num_points < 2 {
            return;
        }
        let slice = &history[history.len() - num_points..];

        let mut points: Vec<(f32, f32)> = Vec::with_capacity(num_points);
        for (i, v) in slice.iter().enumerate() {
            let px = x as f32 + (i as f32 / (num_points - 1) as f32) * w as f32;
            let clamped = v.clamp(0.0, 100.0) as f32;
            let py = y as f32 + h as f32 - (clamped / 100.0) * h as f32;
            points.push((px, py));
        }
        let draw_points = if el.smooth && points.len() >= 3 {
            catmull_rom_spline(&points, 8)
        } else {
            points
        };

        let color = parse_color(&el.color, el.color_opacity);
        if el.show_gradient {
            let fill_alpha = (60u32 * el.color_opacity.min(100) as u32 / 100) as u8;
            let fill = Rgba([color[0], color[1], color[2], fill_alpha]);
            fill_under_curve(canvas, &draw_points, (y + h as i32) as f32, fill);
        }

        canvas.draw_polyline(&draw_points, el.line_thickness as f32, color);
        let dot = (el.line_thickness + 1).max(3) as f32;
        if let Some(&(lx, ly)) = draw_points.last() {
            canvas.fill_circle(lx, ly, dot, color);
        }

        if el.show_label {
            if let Some(font) = self.fonts.resolve(&el.font_family, el.font_bold, el.font_italic) {
                let label = format!(
                    "{}: {}",
                    el.text,
                    el.source.format_value(value, el.temp_hide_unit)
                );
                let size = el.font_size as f32;
                let extent = text::measure(&font, &label, size);
                text::draw_line(
                    canvas,
                    &font,
                    &label,
                    size,
                    x as f32 + 5.0,
                    y as f32 + 2.0 + extent.ascent,
                    color,
                );
            }
        }
    }
}

impl Default for FrameProducer {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// FREE HELPERS
// ============================================================================

/// History/playback key: the element name, or a position-derived fallback
/// for unnamed elements.
fn element_key(el: &Element) -> String {
    if el.name.is_empty() {
        format!("{}@{},{}", el.kind.as_str(), el.x, el.y)
    } else {
        el.name.clone()
    }
}

/// Threshold-driven color for circle gauges.
///
/// Temperature sources step at 60/80, everything else at 70/90.
fn auto_color<'a>(el: &'a Element, value: f64) -> &'a str {
    if !el.auto_color_change {
        return &el.color;
    }
    let (warn, crit) = if el.source.unit_kind() == UnitKind::Temperature {
        (60.0, 80.0)
    } else {
        (70.0, 90.0)
    };
    if value < warn {
        &el.color
    } else if value < crit {
        WARN_COLOR
    } else {
        CRIT_COLOR
    }
}

/// Bar gauges use the percent thresholds regardless of source.
fn bar_auto_color<'a>(el: &'a Element, value: f64) -> &'a str {
    if !el.auto_color_change {
        &el.color
    } else if value < 70.0 {
        &el.color
    } else if value < 90.0 {
        WARN_COLOR
    } else {
        CRIT_COLOR
    }
}

fn draw_rectangle(canvas: &mut Canvas, el: &Element) {
    let color = parse_color(&el.color, el.color_opacity);
    canvas.fill_rect(el.x, el.y, el.width, el.height, color);
}

/// Gradient fill for bar gauges, drawn one pixel column at a time.
///
/// The color stops span the full bar width (`total_w`), so the fill reveals
/// them left to right as the value grows. With fewer than two stops the base
/// color gets a lighten ramp across the fill instead.
#[allow(clippy::too_many_arguments)]
fn fill_gradient_bar(
    canvas: &mut Canvas,
    x: i32,
    y: i32,
    fill_w: u32,
    total_w: u32,
    h: u32,
    corner: u32,
    stops: &[(f32, String)],
    opacity: u8,
    base: Rgba<u8>,
) {
    if h == 0 || fill_w == 0 {
        return;
    }
    for col in 0..fill_w {
        let t = if total_w > 1 {
            col as f32 / (total_w - 1) as f32
        } else {
            0.0
        };
        let color = gradient_color_at(stops, t, opacity).unwrap_or_else(|| {
            // Lighter at the left fading to the base color at the fill edge
            let f = col as f32 / fill_w as f32;
            let shade = |c: u8| (c as f32 + (255.0 - c as f32) * 0.3 * (1.0 - f)).min(255.0) as u8;
            Rgba([shade(base[0]), shade(base[1]), shade(base[2]), base[3]])
        });
        // Respect the rounded silhouette by shortening capped columns
        let inset = if corner > 0 {
            let r = corner.min(h / 2).min(fill_w / 2) as f32;
            let cx = if (col as f32) < r {
                r - col as f32
            } else if col as f32 >= fill_w as f32 - r {
                col as f32 - (fill_w as f32 - r - 1.0)
            } else {
                0.0
            };
            r - (r * r - cx * cx).max(0.0).sqrt()
        } else {
            0.0
        };
        let inset = inset as i32;
        let col_h = (h as i32 - 2 * inset).max(0) as u32;
        canvas.fill_rect(x + col as i32, y + inset, 1, col_h, color);
    }
}

/// Interpolated color at position `t` (0..=1) along a list of gradient
/// stops sorted by position. Fewer than two stops yields no color.
fn gradient_color_at(stops: &[(f32, String)], t: f32, opacity: u8) -> Option<Rgba<u8>> {
    let (first, rest) = stops.split_first()?;
    let last = rest.last()?;
    if t <= first.0 {
        return Some(parse_color(&first.1, opacity));
    }
    if t >= last.0 {
        return Some(parse_color(&last.1, opacity));
    }
    for pair in stops.windows(2) {
        let (p0, p1) = (pair[0].0, pair[1].0);
        if t >= p0 && t <= p1 {
            let f = if p1 > p0 { (t - p0) / (p1 - p0) } else { 0.0 };
            let a = parse_color(&pair[0].1, opacity);
            let b = parse_color(&pair[1].1, opacity);
            let mix = |ca: u8, cb: u8| (ca as f32 + (cb as f32 - ca as f32) * f).round() as u8;
            return Some(Rgba([
                mix(a[0], b[0]),
                mix(a[1], b[1]),
                mix(a[2], b[2]),
                mix(a[3], b[3]),
            ]));
        }
    }
    Some(parse_color(&last.1, opacity))
}

/// 1px rectangle outline.
fn stroke_rect_outline(canvas: &mut Canvas, x: i32, y: i32, w: u32, h: u32, color: Rgba<u8>) {
    canvas.fill_rect(x, y, w, 1, color);
    canvas.fill_rect(x, y + h as i32 - 1, w, 1, color);
    canvas.fill_rect(x, y, 1, h, color);
    canvas.fill_rect(x + w as i32 - 1, y, 1, h, color);
}

/// Fill the area between a left-to-right curve and `bottom_y` with a flat
/// translucent color, one pixel column at a time.
fn fill_under_curve(canvas: &mut Canvas, points: &[(f32, f32)], bottom_y: f32, color: Rgba<u8>) {
    for pair in points.windows(2) {
        let (x0, y0) = pair[0];
        let (x1, y1) = pair[1];
        let from = x0.round() as i32;
        let to = x1.round() as i32;
        if to <= from {
            continue;
        }
        for col in from..to {
            let t = (col as f32 - x0) / (x1 - x0);
            let top = y0 + (y1 - y0) * t;
            let height = (bottom_y - top).max(0.0) as u32;
            canvas.fill_rect(col, top.round() as i32, 1, height, color);
        }
    }
}

/// Catmull-Rom interpolation through `points`, `per_segment` interpolated
/// points between each input pair.
fn catmull_rom_spline(points: &[(f32, f32)], per_segment: usize) -> Vec<(f32, f32)> {
    if points.len() < 3 {
        return points.to_vec();
    }
    let at = |i: isize| -> (f32, f32) {
        let clamped = i.clamp(0, points.len() as isize - 1) as usize;
        points[clamped]
    };
    let mut out = Vec::with_capacity(points.len() * per_segment);
    for i in 0..points.len() as isize - 1 {
        let p0 = at(i - 1);
        let p1 = at(i);
        let p2 = at(i + 1);
        let p3 = at(i + 2);
        for step in 0..per_segment {
            let t = step as f32 / per_segment as f32;
            let (t2, t3) = (t * t, t * t * t);
            let interp = |a: f32, b: f32, c: f32, d: f32| {
                0.5 * (2.0 * b
                    + (-a + c) * t
                    + (2.0 * a - 5.0 * b + 4.0 * c - d) * t2
                    + (-a + 3.0 * b - 3.0 * c + d) * t3)
            };
            out.push((
                interp(p0.0, p1.0, p2.0, p3.0),
                interp(p0.1, p1.1, p2.1, p3.1),
            ));
        }
    }
    if let Some(last) = points.last() {
        out.push(*last);
    }
    out
}

/// Load and pre-scale a static image overlay.
///
/// Proportional scaling only shrinks (thumbnail semantics); exact scaling
/// stretches to the element box.
fn load_image_overlay(path: &str, width: u32, height: u32, proportional: bool) -> Option<RgbaImage> {
    let p = Path::new(path);
    if !is_safe_path(p) {
        log::warn!("unsafe image path blocked: {path}");
        return None;
    }
    let img = match image::open(p) {
        Ok(img) => img.to_rgba8(),
        Err(e) => {
            log::warn!("image load error for {path}: {e}");
            return None;
        }
    };
    let (sw, sh) = (img.width().max(1), img.height().max(1));
    let (nw, nh) = if proportional {
        let scale = (width as f32 / sw as f32)
            .min(height as f32 / sh as f32)
            .min(1.0);
        (
            ((sw as f32 * scale) as u32).max(1),
            ((sh as f32 * scale) as u32).max(1),
        )
    } else {
        (width.max(1), height.max(1))
    };
    if (nw, nh) == (sw, sh) {
        return Some(img);
    }
    Some(imageops::resize(&img, nw, nh, imageops::FilterType::Lanczos3))
}

/// Decode a gif and pre-scale every frame to the element box.
fn load_gif_clip(path: &str, width: u32, height: u32, mode: ScaleMode) -> Option<GifClip> {
    use image::codecs::gif::GifDecoder;
    use image::AnimationDecoder;
    use std::fs::File;
    use std::io::BufReader;

    let p = Path::new(path);
    if !is_safe_path(p) {
        log::warn!("unsafe gif path blocked: {path}");
        return None;
    }
    let file = match File::open(p) {
        Ok(f) => f,
        Err(e) => {
            log::warn!("gif open error for {path}: {e}");
            return None;
        }
    };
    let decoder = match GifDecoder::new(BufReader::new(file)) {
        Ok(d) => d,
        Err(e) => {
            log::warn!("gif decode error for {path}: {e}");
            return None;
        }
    };
    let raw = match decoder.into_frames().collect_frames() {
        Ok(frames) if !frames.is_empty() => frames,
        Ok(_) => return None,
        Err(e) => {
            log::warn!("gif frame error for {path}: {e}");
            return None;
        }
    };

    let mut frames = Vec::with_capacity(raw.len());
    let mut durations = Vec::with_capacity(raw.len());
    for frame in &raw {
        let (numer, denom) = frame.delay().numer_denom_ms();
        let ms = if denom > 0 { numer as f64 / denom as f64 } else { 100.0 };
        durations.push((ms.max(1.0)) / 1000.0);
        frames.push(scale_to_box(frame.buffer(), width, height, mode));
    }
    let total_duration = durations.iter().sum();
    Some(GifClip {
        frames,
        durations,
        total_duration,
    })
}

/// Scale one frame into a `width` x `height` box per the scale mode.
fn scale_to_box(src: &RgbaImage, width: u32, height: u32, mode: ScaleMode) -> RgbaImage {
    let (w, h) = (width.max(1), height.max(1));
    let (sw, sh) = (src.width().max(1), src.height().max(1));
    match mode {
        ScaleMode::Stretch => imageops::resize(src, w, h, imageops::FilterType::Lanczos3),
        ScaleMode::Fill => {
            let scale = (w as f32 / sw as f32).max(h as f32 / sh as f32);
            let nw = ((sw as f32 * scale) as u32).max(1);
            let nh = ((sh as f32 * scale) as u32).max(1);
            let scaled = imageops::resize(src, nw, nh, imageops::FilterType::Lanczos3);
            // Center crop the overflow
            let left = (nw.saturating_sub(w)) / 2;
            let top = (nh.saturating_sub(h)) / 2;
            imageops::crop_imm(&scaled, left, top, w, h).to_image()
        }
        ScaleMode::Fit => {
            let scale = (w as f32 / sw as f32).min(h as f32 / sh as f32);
            let nw = ((sw as f32 * scale) as u32).max(1);
            let nh = ((sh as f32 * scale) as u32).max(1);
            let scaled = imageops::resize(src, nw, nh, imageops::FilterType::Lanczos3);
            let mut out = RgbaImage::from_pixel(w, h, Rgba([0, 0, 0, 0]));
            let x_off = (w - nw) / 2;
            let y_off = (h - nh) / 2;
            imageops::overlay(&mut out, &scaled, x_off as i64, y_off as i64);
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::theme::VideoRef;
    use pretty_assertions::assert_eq;

    fn producer() -> FrameProducer {
        // Empty font store keeps rendering deterministic on any host
        FrameProducer::with_fonts(FontStore::with_dirs(&[]))
    }

    fn theme_with(elements: Vec<Element>) -> Theme {
        Theme {
            display_width: 100,
            display_height: 100,
            background_color: "#000000".to_string(),
            elements,
            ..Theme::default()
        }
    }

    #[test]
    fn test_background_color_fills_frame() {
        let mut p = producer();
        let theme = theme_with(Vec::new());
        let frame = p.render(&theme, &SensorSnapshot::new());
        assert_eq!(frame.get_pixel(50, 50), &Rgba([0, 0, 0, 255]));
        assert_eq!(frame.dimensions(), (100, 100));
    }

    #[test]
    fn test_elements_draw_in_reverse_order() {
        // Index 0 covers the same area as index 1 and must win
        let mut front = Element::new(ElementKind::Rectangle);
        front.x = 0;
        front.y = 0;
        front.width = 50;
        front.height = 50;
        front.color = "#ff0000".to_string();

        let mut back = front.clone();
        back.color = "#00ff00".to_string();

        let mut p = producer();
        let theme = theme_with(vec![front, back]);
        let frame = p.render(&theme, &SensorSnapshot::new());
        assert_eq!(frame.get_pixel(25, 25), &Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn test_live_source_overrides_stored_value() {
        let mut bar = Element::new(ElementKind::BarGauge);
        bar.x = 0;
        bar.y = 0;
        bar.width = 100;
        bar.height = 10;
        bar.source = SourceKey::CpuPercent;
        bar.value = 100.0; // stale stored value
        bar.color = "#0000ff".to_string();
        bar.background_color = "#000000".to_string();
        bar.auto_color_change = false;
        bar.bar_text_mode = BarTextMode::None;

        let mut snapshot = SensorSnapshot::new();
        snapshot.set(SourceKey::CpuPercent, 50.0);

        let mut p = producer();
        let frame = p.render(&theme_with(vec![bar]), &snapshot);
        // Fill reaches 50%, not 100%
        assert_eq!(frame.get_pixel(25, 5), &Rgba([0, 0, 255, 255]));
        assert_eq!(frame.get_pixel(75, 5), &Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn test_bar_gradient_follows_stops() {
        let mut bar = Element::new(ElementKind::BarGauge);
        bar.x = 0;
        bar.y = 0;
        bar.width = 100;
        bar.height = 10;
        bar.source = SourceKey::CpuPercent;
        bar.background_color = "#202020".to_string();
        bar.auto_color_change = false;
        bar.bar_text_mode = BarTextMode::None;
        bar.gradient_fill = true;
        bar.gradient_stops = vec![(0.0, "#000000".to_string()), (1.0, "#ffffff".to_string())];

        let mut snapshot = SensorSnapshot::new();
        snapshot.set(SourceKey::CpuPercent, 100.0);

        let mut p = producer();
        let frame = p.render(&theme_with(vec![bar.clone()]), &snapshot);
        let left = frame.get_pixel(2, 5)[0];
        let mid = frame.get_pixel(50, 5)[0];
        let right = frame.get_pixel(97, 5)[0];
        assert!(left < 30, "left edge should sit near the first stop");
        assert!(right > 225, "right edge should sit near the last stop");
        assert!(left < mid && mid < right);

        // The stops span the full bar; a half fill only reveals the lower
        // half of the ramp and leaves the rest as background
        snapshot.set(SourceKey::CpuPercent, 50.0);
        let frame = p.render(&theme_with(vec![bar]), &snapshot);
        assert_eq!(frame.get_pixel(75, 5), &Rgba([0x20, 0x20, 0x20, 255]));
        let edge = frame.get_pixel(49, 5)[0];
        assert!((100..156).contains(&edge));
    }

    #[test]
    fn test_gradient_color_interpolation() {
        let stops = vec![(0.0, "#000000".to_string()), (1.0, "#ff0000".to_string())];
        assert_eq!(gradient_color_at(&stops, 0.0, 255), Some(Rgba([0, 0, 0, 255])));
        assert_eq!(gradient_color_at(&stops, 1.0, 255), Some(Rgba([255, 0, 0, 255])));
        let mid = gradient_color_at(&stops, 0.5, 255).unwrap();
        assert!((mid[0] as i32 - 128).abs() <= 1);

        // Out-of-range positions clamp to the end stops
        assert_eq!(gradient_color_at(&stops, -1.0, 255), Some(Rgba([0, 0, 0, 255])));
        assert_eq!(gradient_color_at(&stops, 2.0, 255), Some(Rgba([255, 0, 0, 255])));

        // A single stop is not a gradient
        assert_eq!(gradient_color_at(&stops[..1], 0.5, 255), None);
    }

    #[test]
    fn test_auto_color_thresholds() {
        let mut el = Element::new(ElementKind::CircleGauge);
        el.color = "#00ff96".to_string();
        el.source = SourceKey::CpuTemp;
        assert_eq!(auto_color(&el, 45.0), "#00ff96");
        assert_eq!(auto_color(&el, 65.0), WARN_COLOR);
        assert_eq!(auto_color(&el, 85.0), CRIT_COLOR);

        // Non-temperature sources step later
        el.source = SourceKey::CpuPercent;
        assert_eq!(auto_color(&el, 65.0), "#00ff96");
        assert_eq!(auto_color(&el, 75.0), WARN_COLOR);
        assert_eq!(auto_color(&el, 95.0), CRIT_COLOR);

        el.auto_color_change = false;
        assert_eq!(auto_color(&el, 99.0), "#00ff96");
    }

    #[test]
    fn test_chart_series_rate_limit_and_cap() {
        let mut series = ChartSeries::new();
        // Burst of pushes inside the rate window collapses to one sample
        for i in 0..10 {
            series.push(i as f64);
        }
        assert_eq!(series.values.len(), 1);

        // Force-feed past the cap
        series.last_push = None;
        for i in 0..(CHART_MAX_HISTORY + 50) {
            series.values.push(i as f64);
        }
        series.values.drain(..series.values.len() - CHART_MAX_HISTORY);
        assert_eq!(series.values.len(), CHART_MAX_HISTORY);
    }

    #[test]
    fn test_gif_clip_frame_timing() {
        let clip = GifClip {
            frames: vec![RgbaImage::new(1, 1); 3],
            durations: vec![0.1, 0.1, 0.2],
            total_duration: 0.4,
        };
        assert_eq!(clip.frame_at(0.05), 0);
        assert_eq!(clip.frame_at(0.15), 1);
        assert_eq!(clip.frame_at(0.3), 2);
        // Playback loops
        assert_eq!(clip.frame_at(0.45), 0);
    }

    #[test]
    fn test_catmull_rom_passes_through_endpoints() {
        let pts = vec![(0.0, 0.0), (10.0, 10.0), (20.0, 0.0)];
        let smooth = catmull_rom_spline(&pts, 8);
        assert_eq!(smooth[0], (0.0, 0.0));
        assert_eq!(*smooth.last().unwrap(), (20.0, 0.0));
        assert!(smooth.len() > pts.len());
    }

    #[test]
    fn test_encode_jpeg_produces_jfif_payload() {
        let frame = RgbaImage::from_pixel(16, 16, Rgba([10, 20, 30, 255]));
        let jpeg = FrameProducer::encode_jpeg(&frame).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]); // SOI marker
        assert_eq!(&jpeg[jpeg.len() - 2..], &[0xFF, 0xD9]); // EOI marker
    }

    #[test]
    fn test_missing_video_file_falls_back_to_solid_background() {
        let mut theme = theme_with(Vec::new());
        theme.background_color = "#112233".to_string();
        theme.video_background = Some(VideoRef {
            video_path: "/nonexistent/loop.gif".to_string(),
            fit_mode: Default::default(),
            enabled: true,
        });
        let mut p = producer();
        let frame = p.render(&theme, &SensorSnapshot::new());
        assert_eq!(frame.get_pixel(50, 50), &Rgba([17, 34, 51, 255]));
    }

    #[test]
    fn test_unknown_custom_element_is_skipped() {
        let mut el = Element::new(ElementKind::Custom("waveform".to_string()));
        el.x = 0;
        el.y = 0;
        let mut p = producer();
        let frame = p.render(&theme_with(vec![el]), &SensorSnapshot::new());
        // Nothing drawn, background intact
        assert_eq!(frame.get_pixel(10, 10), &Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn test_scale_to_box_modes() {
        let src = RgbaImage::from_pixel(10, 20, Rgba([255, 0, 0, 255]));
        let stretched = scale_to_box(&src, 40, 40, ScaleMode::Stretch);
        assert_eq!(stretched.dimensions(), (40, 40));

        let filled = scale_to_box(&src, 40, 40, ScaleMode::Fill);
        assert_eq!(filled.dimensions(), (40, 40));
        // Fill crops, so every pixel is source content
        assert_eq!(filled.get_pixel(0, 0)[3], 255);

        let fitted = scale_to_box(&src, 40, 40, ScaleMode::Fit);
        assert_eq!(fitted.dimensions(), (40, 40));
        // Fit letterboxes: the left margin is transparent
        assert_eq!(fitted.get_pixel(0, 0)[3], 0);
        assert_eq!(fitted.get_pixel(20, 20)[3], 255);
    }
}
