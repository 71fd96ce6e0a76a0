//! Glyph layout and font resolution.
//!
//! Fonts are resolved by family name against the host's font directories:
//! exact variant names first (`"DejaVu Sans Bold"`), then a normalized
//! substring match on file names. Resolved fonts are cached for the life of
//! the [`FontStore`]; a family that cannot be resolved is logged once and
//! its text is skipped rather than failing the frame.

use ab_glyph::{Font, FontVec, Glyph, PxScale, ScaleFont};
use image::Rgba;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::canvas::Canvas;

/// Directories scanned for `.ttf`/`.otf` files, in priority order.
fn default_font_dirs() -> Vec<PathBuf> {
    let mut dirs = vec![
        PathBuf::from("/usr/share/fonts"),
        PathBuf::from("/usr/local/share/fonts"),
        PathBuf::from("/System/Library/Fonts"),
        PathBuf::from("C:\\Windows\\Fonts"),
    ];
    if let Ok(home) = std::env::var("HOME") {
        let home = PathBuf::from(home);
        dirs.push(home.join(".fonts"));
        dirs.push(home.join(".local/share/fonts"));
    }
    dirs
}

/// Font file lookup + parsed-font cache.
pub struct FontStore {
    files: Vec<PathBuf>,
    cache: HashMap<String, Option<Arc<FontVec>>>,
}

impl FontStore {
    /// Scan the default system font directories.
    pub fn new() -> Self {
        Self::with_dirs(&default_font_dirs())
    }

    /// Scan a caller-provided set of directories (tests use this).
    pub fn with_dirs(dirs: &[PathBuf]) -> Self {
        let mut files = Vec::new();
        for dir in dirs {
            collect_font_files(dir, &mut files, 0);
        }
        log::debug!("font store: {} candidate files", files.len());
        Self {
            files,
            cache: HashMap::new(),
        }
    }

    /// Resolve a family name (plus style flags) to a parsed font.
    ///
    /// Returns `None` when nothing matches; the caller skips the text.
    pub fn resolve(&mut self, family: &str, bold: bool, italic: bool) -> Option<Arc<FontVec>> {
        let key = format!("{family}|{bold}|{italic}");
        if let Some(cached) = self.cache.get(&key) {
            return cached.clone();
        }

        let loaded = self
            .find_file(family, bold, italic)
            .and_then(|path| match std::fs::read(&path) {
                Ok(bytes) => match FontVec::try_from_vec(bytes) {
                    Ok(font) => Some(Arc::new(font)),
                    Err(_) => {
                        log::warn!("unparseable font file: {}", path.display());
                        None
                    }
                },
                Err(e) => {
                    log::warn!("cannot read font {}: {e}", path.display());
                    None
                }
            });
        if loaded.is_none() {
            log::warn!("no font found for family '{family}' (bold={bold}, italic={italic})");
        }
        self.cache.insert(key, loaded.clone());
        loaded
    }

    fn find_file(&self, family: &str, bold: bool, italic: bool) -> Option<PathBuf> {
        let mut variants: Vec<String> = Vec::new();
        match (bold, italic) {
            (true, true) => {
                variants.push(format!("{family} Bold Italic"));
                variants.push(format!("{family} Bold Oblique"));
            }
            (true, false) => variants.push(format!("{family} Bold")),
            (false, true) => {
                variants.push(format!("{family} Italic"));
                variants.push(format!("{family} Oblique"));
            }
            (false, false) => variants.push(format!("{family} Regular")),
        }
        variants.push(family.to_string());

        // Exact-ish stem match first, then substring fallback
        for variant in &variants {
            let want = normalize(variant);
            if let Some(path) = self.files.iter().find(|p| stem_normalized(p) == want) {
                return Some(path.clone());
            }
        }
        let want = normalize(family);
        self.files
            .iter()
            .find(|p| stem_normalized(p).contains(&want))
            .cloned()
    }
}

impl Default for FontStore {
    fn default() -> Self {
        Self::new()
    }
}

fn collect_font_files(dir: &Path, out: &mut Vec<PathBuf>, depth: usize) {
    if depth > 4 {
        return;
    }
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_font_files(&path, out, depth + 1);
        } else if matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("ttf") | Some("otf") | Some("TTF") | Some("OTF")
        ) {
            out.push(path);
        }
    }
}

fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase()
}

fn stem_normalized(path: &Path) -> String {
    normalize(path.file_stem().and_then(|s| s.to_str()).unwrap_or(""))
}

// ============================================================================
// LAYOUT & RASTERIZATION
// ============================================================================

/// Measured extent of a laid-out line of text.
#[derive(Debug, Clone, Copy)]
pub struct TextExtent {
    pub width: f32,
    pub ascent: f32,
    pub descent: f32,
}

/// Measure a single line at the given pixel size.
pub fn measure(font: &FontVec, text: &str, px_size: f32) -> TextExtent {
    let scaled = font.as_scaled(PxScale::from(px_size));
    let mut width = 0.0f32;
    let mut prev = None;
    for ch in text.chars() {
        let id = scaled.glyph_id(ch);
        if let Some(prev_id) = prev {
            width += scaled.kern(prev_id, id);
        }
        width += scaled.h_advance(id);
        prev = Some(id);
    }
    TextExtent {
        width,
        ascent: scaled.ascent(),
        descent: scaled.descent(),
    }
}

/// Draw a single line with its left edge at `x` and baseline at `baseline_y`.
pub fn draw_line(
    canvas: &mut Canvas,
    font: &FontVec,
    text: &str,
    px_size: f32,
    x: f32,
    baseline_y: f32,
    color: Rgba<u8>,
) {
    let scaled = font.as_scaled(PxScale::from(px_size));
    let mut caret = x;
    let mut prev = None;
    for ch in text.chars() {
        let id = scaled.glyph_id(ch);
        if let Some(prev_id) = prev {
            caret += scaled.kern(prev_id, id);
        }
        let glyph: Glyph = id.with_scale_and_position(PxScale::from(px_size), ab_glyph::point(caret, baseline_y));
        caret += scaled.h_advance(id);
        prev = Some(id);

        if let Some(outlined) = font.outline_glyph(glyph) {
            let bounds = outlined.px_bounds();
            outlined.draw(|gx, gy, coverage| {
                if coverage <= 0.0 {
                    return;
                }
                let mut px = color;
                px[3] = (px[3] as f32 * coverage.min(1.0)) as u8;
                canvas.blend(bounds.min.x as i32 + gx as i32, bounds.min.y as i32 + gy as i32, px);
            });
        }
    }
}

/// Horizontal anchor for [`draw_in_box`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Center,
    Right,
}

/// Draw a line aligned inside the box `(x, y, w, h)`, vertically centered
/// on the font's ascent/descent midline.
pub fn draw_in_box(
    canvas: &mut Canvas,
    font: &FontVec,
    text: &str,
    px_size: f32,
    x: i32,
    y: i32,
    w: u32,
    h: u32,
    align: Align,
    color: Rgba<u8>,
) {
    let extent = measure(font, text, px_size);
    let tx = match align {
        Align::Left => x as f32,
        Align::Center => x as f32 + (w as f32 - extent.width) / 2.0,
        Align::Right => x as f32 + w as f32 - extent.width,
    };
    let baseline = y as f32 + (h as f32 + extent.ascent - extent.descent.abs()) / 2.0;
    draw_line(canvas, font, text, px_size, tx, baseline, color);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("DejaVu Sans Bold"), "dejavusansbold");
        assert_eq!(normalize("Liberation-Mono_2"), "liberationmono2");
    }

    #[test]
    fn test_missing_family_resolves_to_none_and_caches() {
        let mut store = FontStore::with_dirs(&[PathBuf::from("/nonexistent-fonts")]);
        assert!(store.resolve("No Such Font", false, false).is_none());
        // Second lookup hits the cache (still None, no re-scan)
        assert!(store.resolve("No Such Font", false, false).is_none());
    }
}
