//! Theme element data model.
//!
//! One [`Element`] struct carries the common fields every variant shares;
//! [`ElementKind`] is the closed set of variants plus an escape hatch for
//! externally-registered custom types. Variant-specific options (gradient
//! stops, clock format flags, ...) live as plain fields with defaults, the
//! same way the on-disk JSON stores them.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;

use crate::render::canvas::Canvas;
use crate::sensors::{SensorSnapshot, SourceKey};

// ============================================================================
// ELEMENT KIND
// ============================================================================

/// Closed set of element variants.
///
/// Serialized as the `"type"` string in theme JSON; unknown strings map to
/// `Custom` so themes referencing plugin elements still load.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ElementKind {
    CircleGauge,
    BarGauge,
    #[default]
    Text,
    Rectangle,
    Clock,
    AnalogClock,
    Image,
    Gif,
    LineChart,
    Custom(String),
}

impl ElementKind {
    pub fn as_str(&self) -> &str {
        match self {
            ElementKind::CircleGauge => "circle_gauge",
            ElementKind::BarGauge => "bar_gauge",
            ElementKind::Text => "text",
            ElementKind::Rectangle => "rectangle",
            ElementKind::Clock => "clock",
            ElementKind::AnalogClock => "analog_clock",
            ElementKind::Image => "image",
            ElementKind::Gif => "gif",
            ElementKind::LineChart => "line_chart",
            ElementKind::Custom(id) => id,
        }
    }

    pub fn from_name(name: &str) -> Self {
        match name {
            "circle_gauge" => ElementKind::CircleGauge,
            "bar_gauge" => ElementKind::BarGauge,
            "text" => ElementKind::Text,
            "rectangle" => ElementKind::Rectangle,
            "clock" => ElementKind::Clock,
            "analog_clock" => ElementKind::AnalogClock,
            "image" => ElementKind::Image,
            "gif" => ElementKind::Gif,
            "line_chart" => ElementKind::LineChart,
            other => ElementKind::Custom(other.to_string()),
        }
    }
}

impl Serialize for ElementKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ElementKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(ElementKind::from_name(&name))
    }
}

// ============================================================================
// OPTION ENUMS
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TextAlign {
    Left,
    #[default]
    Center,
    Right,
}

/// What a bar gauge prints on top of its fill.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BarTextMode {
    /// `"label: value"`
    #[default]
    Full,
    ValueOnly,
    None,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BarTextPosition {
    #[default]
    Inside,
    Left,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum TimeFormat {
    #[serde(rename = "24h")]
    #[default]
    H24,
    #[serde(rename = "12h")]
    H12,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClockFaceStyle {
    #[default]
    Numbers,
    Ticks,
    None,
}

/// How gif/image content is scaled into its box.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScaleMode {
    #[default]
    Fit,
    Fill,
    Stretch,
}

// ============================================================================
// ELEMENT
// ============================================================================

/// A single drawable theme element.
///
/// Exactly one of `{width, height}` or `radius` is semantically active
/// depending on the variant (gauges and analog clocks are radial, the rest
/// are boxes). `value` is the cached value: for `source == Static` it is
/// user-controlled, for any live source it is overwritten from the sensor
/// snapshot on every scheduler tick and never trusted as stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Element {
    #[serde(rename = "type")]
    pub kind: ElementKind,
    #[serde(default)]
    pub name: String,

    // Geometry
    #[serde(default = "d_i32_100")]
    pub x: i32,
    #[serde(default = "d_i32_100")]
    pub y: i32,
    #[serde(default = "d_u32_200")]
    pub width: u32,
    #[serde(default = "d_u32_50")]
    pub height: u32,
    #[serde(default = "d_u32_100")]
    pub radius: u32,

    // Colors (hex strings as stored on disk, opacity 0-100)
    #[serde(default = "d_accent")]
    pub color: String,
    #[serde(default = "d_opacity")]
    pub color_opacity: u8,
    #[serde(default = "d_bg")]
    pub background_color: String,
    #[serde(default = "d_opacity")]
    pub background_color_opacity: u8,
    #[serde(default)]
    pub use_custom_text_color: bool,
    #[serde(default = "d_accent")]
    pub text_color: String,
    #[serde(default = "d_opacity")]
    pub text_color_opacity: u8,

    // Text / font
    #[serde(default = "d_label")]
    pub text: String,
    #[serde(default = "d_font_size")]
    pub font_size: u32,
    #[serde(default = "d_font_family")]
    pub font_family: String,
    #[serde(default)]
    pub font_bold: bool,
    #[serde(default)]
    pub font_italic: bool,
    #[serde(default)]
    pub text_align: TextAlign,

    // Data binding
    #[serde(default)]
    pub source: SourceKey,
    #[serde(default = "d_value")]
    pub value: f64,

    // Image / gif
    #[serde(default)]
    pub image_path: String,
    #[serde(default = "d_true")]
    pub scale_proportionally: bool,
    #[serde(default)]
    pub gif_path: String,
    #[serde(default)]
    pub scale_mode: ScaleMode,

    // Line chart
    #[serde(default = "d_true")]
    pub show_background: bool,
    #[serde(default = "d_true")]
    pub show_label: bool,
    #[serde(default = "d_true")]
    pub show_gradient: bool,
    #[serde(default = "d_u32_2")]
    pub line_thickness: u32,
    #[serde(default)]
    pub smooth: bool,

    // Bar gauge
    #[serde(default)]
    pub rounded_corners: bool,
    #[serde(default)]
    pub gradient_fill: bool,
    #[serde(default = "d_gradient_stops")]
    pub gradient_stops: Vec<(f32, String)>,
    #[serde(default)]
    pub bar_text_mode: BarTextMode,
    #[serde(default)]
    pub bar_text_position: BarTextPosition,

    // Circle gauge
    #[serde(default = "d_true")]
    pub auto_color_change: bool,

    // Digital clock
    #[serde(default)]
    pub time_format: TimeFormat,
    #[serde(default = "d_true")]
    pub show_am_pm: bool,
    #[serde(default = "d_true")]
    pub show_seconds: bool,
    #[serde(default = "d_true")]
    pub show_leading_zero: bool,

    // Analog clock
    #[serde(default = "d_true")]
    pub show_seconds_hand: bool,
    #[serde(default = "d_true")]
    pub show_clock_border: bool,
    #[serde(default)]
    pub clock_face_style: ClockFaceStyle,

    // Editor bookkeeping (carried so save/load round-trips, unused here)
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub locked: bool,

    #[serde(default)]
    pub temp_hide_unit: bool,
}

fn d_i32_100() -> i32 {
    100
}
fn d_u32_2() -> u32 {
    2
}
fn d_u32_50() -> u32 {
    50
}
fn d_u32_100() -> u32 {
    100
}
fn d_u32_200() -> u32 {
    200
}
fn d_accent() -> String {
    "#00ff96".to_string()
}
fn d_bg() -> String {
    "#1a1a2e".to_string()
}
fn d_opacity() -> u8 {
    100
}
fn d_label() -> String {
    "Label".to_string()
}
fn d_font_size() -> u32 {
    32
}
fn d_font_family() -> String {
    "Arial".to_string()
}
fn d_value() -> f64 {
    50.0
}
fn d_true() -> bool {
    true
}
fn d_gradient_stops() -> Vec<(f32, String)> {
    vec![(0.0, "#00ff96".to_string()), (1.0, "#ff4444".to_string())]
}

impl Default for Element {
    fn default() -> Self {
        // serde defaults are the single source of truth for field defaults
        serde_json::from_str("{\"type\":\"text\"}").expect("default element")
    }
}

impl Element {
    pub fn new(kind: ElementKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    /// The value this element draws on the current tick.
    ///
    /// Live-bound elements always read the snapshot (missing keys read 0);
    /// only `Static` elements use the stored `value`.
    pub fn resolved_value(&self, snapshot: &SensorSnapshot) -> f64 {
        if self.source == SourceKey::Static {
            self.value
        } else {
            snapshot.get(self.source)
        }
    }
}

// ============================================================================
// CUSTOM ELEMENT EXTENSION POINT
// ============================================================================

/// Renderer capability for externally-defined element types.
pub trait CustomElement: Send + Sync {
    /// Composite the element onto the canvas. `value` is already resolved
    /// from the sensor snapshot.
    fn draw(&self, canvas: &mut Canvas, element: &Element, value: f64);

    /// Bounding box `(x, y, width, height)` of the drawn output.
    fn bounds(&self, element: &Element) -> (i32, i32, u32, u32) {
        (element.x, element.y, element.width, element.height)
    }
}

/// Registry of custom element implementations, keyed by type id.
///
/// Themes referencing an unregistered custom type render nothing for that
/// element (logged once per render pass, never an error).
#[derive(Default)]
pub struct CustomElementRegistry {
    entries: HashMap<String, Box<dyn CustomElement>>,
}

impl CustomElementRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, type_id: impl Into<String>, imp: Box<dyn CustomElement>) {
        self.entries.insert(type_id.into(), imp);
    }

    pub fn get(&self, type_id: &str) -> Option<&dyn CustomElement> {
        self.entries.get(type_id).map(|b| b.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_kind_string_round_trip() {
        for name in [
            "circle_gauge",
            "bar_gauge",
            "text",
            "rectangle",
            "clock",
            "analog_clock",
            "image",
            "gif",
            "line_chart",
        ] {
            assert_eq!(ElementKind::from_name(name).as_str(), name);
        }
        let custom = ElementKind::from_name("waveform");
        assert_eq!(custom, ElementKind::Custom("waveform".to_string()));
        assert_eq!(custom.as_str(), "waveform");
    }

    #[test]
    fn test_resolved_value_ignores_stored_value_for_live_sources() {
        let mut snapshot = SensorSnapshot::new();
        snapshot.set(SourceKey::CpuPercent, 77.0);

        let mut el = Element::new(ElementKind::CircleGauge);
        el.value = 12.0;
        el.source = SourceKey::CpuPercent;
        assert_eq!(el.resolved_value(&snapshot), 77.0);

        // Unknown key reads 0, not the stale stored value
        el.source = SourceKey::GpuTemp;
        assert_eq!(el.resolved_value(&snapshot), 0.0);

        el.source = SourceKey::Static;
        assert_eq!(el.resolved_value(&snapshot), 12.0);
    }

    #[test]
    fn test_element_defaults_match_disk_format() {
        let el: Element = serde_json::from_str(r#"{"type": "bar_gauge"}"#).unwrap();
        assert_eq!(el.kind, ElementKind::BarGauge);
        assert_eq!(el.color, "#00ff96");
        assert_eq!(el.color_opacity, 100);
        assert_eq!(el.value, 50.0);
        assert_eq!(el.bar_text_mode, BarTextMode::Full);
        assert!(el.scale_proportionally);
        assert_eq!(el.gradient_stops.len(), 2);
    }

    #[test]
    fn test_time_format_serde_names() {
        let fmt: TimeFormat = serde_json::from_str("\"12h\"").unwrap();
        assert_eq!(fmt, TimeFormat::H12);
        assert_eq!(serde_json::to_string(&TimeFormat::H24).unwrap(), "\"24h\"");
    }
}
