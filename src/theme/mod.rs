//! # Theme Model
//!
//! An immutable-at-a-point-in-time description of what to draw: background,
//! an ordered element list, and an optional video background.
//!
//! Themes are produced by an external editor and persisted as JSON; the
//! field names here match that on-disk format so existing theme files load
//! unchanged. The streaming pipeline only ever reads a theme snapshot — it
//! never mutates one.
//!
//! ## Draw Order
//!
//! Elements are drawn in **reverse list order**: the last element in the
//! list is painted first (back), index 0 is painted last (front). The
//! renderer reproduces this exactly.

pub mod element;

use serde::{Deserialize, Serialize};
use std::path::{Component, Path};

pub use element::{CustomElement, CustomElementRegistry, Element, ElementKind};

/// Reference to a video file used as an animated theme background.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoRef {
    #[serde(default)]
    pub video_path: String,
    #[serde(default)]
    pub fit_mode: VideoFitMode,
    #[serde(default)]
    pub enabled: bool,
}

/// How a video frame is scaled onto the display.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum VideoFitMode {
    /// Scale so the video height matches the display height, center horizontally
    #[default]
    FitHeight,
    /// Scale so the video width matches the display width, center vertically
    FitWidth,
}

/// A complete visual theme.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Theme {
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_background")]
    pub background_color: String,
    #[serde(default = "default_width")]
    pub display_width: u32,
    #[serde(default = "default_height")]
    pub display_height: u32,
    #[serde(default)]
    pub elements: Vec<Element>,
    #[serde(default)]
    pub video_background: Option<VideoRef>,
}

fn default_background() -> String {
    "#1a1a2e".to_string()
}

fn default_width() -> u32 {
    1280
}

fn default_height() -> u32 {
    480
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            name: String::new(),
            background_color: default_background(),
            display_width: default_width(),
            display_height: default_height(),
            elements: Vec::new(),
            video_background: None,
        }
    }
}

impl Theme {
    /// Parse a theme from its JSON representation.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize to the on-disk JSON format.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Whether the video background is active.
    pub fn video_enabled(&self) -> bool {
        self.video_background
            .as_ref()
            .map(|v| v.enabled && !v.video_path.is_empty())
            .unwrap_or(false)
    }
}

/// Validate a user-supplied asset path.
///
/// Rejects parent-directory traversal; everything else (including absolute
/// paths the user chose in a file picker) is allowed. This is the extent of
/// path hardening the pipeline performs.
pub fn is_safe_path(path: &Path) -> bool {
    !path
        .components()
        .any(|c| matches!(c, Component::ParentDir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::SourceKey;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_theme_json_round_trip() {
        let json = r##"{
            "name": "demo",
            "background_color": "#101020",
            "display_width": 1280,
            "display_height": 480,
            "elements": [
                {"type": "circle_gauge", "x": 200, "y": 240, "radius": 120,
                 "source": "cpu_percent", "text": "CPU"},
                {"type": "rectangle", "x": 0, "y": 0, "width": 1280, "height": 40}
            ],
            "video_background": {"video_path": "", "fit_mode": "fit_height", "enabled": false}
        }"##;
        let theme = Theme::from_json(json).unwrap();
        assert_eq!(theme.name, "demo");
        assert_eq!(theme.elements.len(), 2);
        assert_eq!(theme.elements[0].kind, ElementKind::CircleGauge);
        assert_eq!(theme.elements[0].source, SourceKey::CpuPercent);
        assert!(!theme.video_enabled());

        let round = Theme::from_json(&theme.to_json().unwrap()).unwrap();
        assert_eq!(round.elements[0].radius, theme.elements[0].radius);
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        // Old editor versions write fields the pipeline does not model
        let json = r#"{"elements": [{"type": "text", "glass_effect": true, "glass_blur": 10}]}"#;
        let theme = Theme::from_json(json).unwrap();
        assert_eq!(theme.elements[0].kind, ElementKind::Text);
    }

    #[test]
    fn test_safe_path_rejects_traversal() {
        assert!(is_safe_path(Path::new("/home/user/pic.png")));
        assert!(is_safe_path(Path::new("assets/pic.png")));
        assert!(!is_safe_path(Path::new("../../etc/passwd")));
        assert!(!is_safe_path(Path::new("assets/../../secret")));
    }
}
