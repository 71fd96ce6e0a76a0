//! Canvas drawing primitives for theme rendering.
//!
//! A thin RGBA compositing layer over `image::RgbaImage` with the shapes
//! the element renderers need: rects, thick lines, arcs, discs, and alpha
//! blits. All compositing is source-over; coordinates are y-down.
//!
//! ## Arc Convention
//!
//! Arcs use the editor's convention: angles in degrees, 0° at 3 o'clock,
//! positive counterclockwise on screen. A negative sweep therefore runs
//! clockwise, which is how the circular gauges are specified (start 225°,
//! sweep −270°).

use image::{Rgba, RgbaImage};

// ============================================================================
// COLOR
// ============================================================================

/// Parse a `#rrggbb` (or `#rgb`) hex color and apply a 0-100 opacity.
///
/// Unparseable strings fall back to opaque white so a malformed theme is
/// visibly wrong rather than invisible.
pub fn parse_color(hex: &str, opacity: u8) -> Rgba<u8> {
    let alpha = (255u32 * opacity.min(100) as u32 / 100) as u8;
    let digits = hex.trim_start_matches('#');
    let (r, g, b) = match digits.len() {
        6 => (
            u8::from_str_radix(&digits[0..2], 16),
            u8::from_str_radix(&digits[2..4], 16),
            u8::from_str_radix(&digits[4..6], 16),
        ),
        3 => {
            let d = |s: &str| u8::from_str_radix(s, 16).map(|v| v * 17);
            (d(&digits[0..1]), d(&digits[1..2]), d(&digits[2..3]))
        }
        _ => return Rgba([255, 255, 255, alpha]),
    };
    match (r, g, b) {
        (Ok(r), Ok(g), Ok(b)) => Rgba([r, g, b, alpha]),
        _ => Rgba([255, 255, 255, alpha]),
    }
}

/// Source-over blend of `src` onto `dst`.
#[inline]
fn blend_over(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    let sa = src[3] as u32;
    if sa == 255 {
        return src;
    }
    if sa == 0 {
        return dst;
    }
    let ia = 255 - sa;
    Rgba([
        ((src[0] as u32 * sa + dst[0] as u32 * ia) / 255) as u8,
        ((src[1] as u32 * sa + dst[1] as u32 * ia) / 255) as u8,
        ((src[2] as u32 * sa + dst[2] as u32 * ia) / 255) as u8,
        (sa + dst[3] as u32 * ia / 255).min(255) as u8,
    ])
}

// ============================================================================
// CANVAS
// ============================================================================

/// RGBA compositing canvas at the device's native resolution.
pub struct Canvas {
    img: RgbaImage,
}

impl Canvas {
    /// New canvas filled with `background`.
    pub fn new(width: u32, height: u32, background: Rgba<u8>) -> Self {
        Self {
            img: RgbaImage::from_pixel(width, height, background),
        }
    }

    /// Wrap an existing image (used for video-frame backgrounds).
    pub fn from_image(img: RgbaImage) -> Self {
        Self { img }
    }

    pub fn width(&self) -> u32 {
        self.img.width()
    }

    pub fn height(&self) -> u32 {
        self.img.height()
    }

    pub fn into_image(self) -> RgbaImage {
        self.img
    }

    #[inline]
    pub fn blend(&mut self, x: i32, y: i32, color: Rgba<u8>) {
        if x >= 0 && y >= 0 && (x as u32) < self.img.width() && (y as u32) < self.img.height() {
            let px = self.img.get_pixel_mut(x as u32, y as u32);
            *px = blend_over(*px, color);
        }
    }

    /// Axis-aligned filled rectangle.
    pub fn fill_rect(&mut self, x: i32, y: i32, w: u32, h: u32, color: Rgba<u8>) {
        for py in y..y + h as i32 {
            for px in x..x + w as i32 {
                self.blend(px, py, color);
            }
        }
    }

    /// Filled rectangle with semicircular end caps (rounded bar gauges).
    ///
    /// `corner_radius` is clamped to half the height.
    pub fn fill_rounded_rect(&mut self, x: i32, y: i32, w: u32, h: u32, corner_radius: u32, color: Rgba<u8>) {
        let r = corner_radius.min(h / 2).min(w / 2) as i32;
        if r == 0 {
            self.fill_rect(x, y, w, h, color);
            return;
        }
        let (w, h) = (w as i32, h as i32);
        for py in 0..h {
            for px in 0..w {
                // Distance test only matters inside the corner squares
                let cx = if px < r {
                    Some(r)
                } else if px >= w - r {
                    Some(w - r - 1)
                } else {
                    None
                };
                let cy = if py < r {
                    Some(r)
                } else if py >= h - r {
                    Some(h - r - 1)
                } else {
                    None
                };
                if let (Some(cx), Some(cy)) = (cx, cy) {
                    let dx = (px - cx) as f32;
                    let dy = (py - cy) as f32;
                    if dx * dx + dy * dy > (r as f32) * (r as f32) {
                        continue;
                    }
                }
                self.blend(x + px, y + py, color);
            }
        }
    }

    /// Filled disc.
    pub fn fill_circle(&mut self, cx: f32, cy: f32, radius: f32, color: Rgba<u8>) {
        let r_ceil = radius.ceil() as i32 + 1;
        let (cxi, cyi) = (cx.round() as i32, cy.round() as i32);
        for dy in -r_ceil..=r_ceil {
            for dx in -r_ceil..=r_ceil {
                let dist = ((dx * dx + dy * dy) as f32).sqrt();
                if dist <= radius {
                    self.blend(cxi + dx, cyi + dy, color);
                }
            }
        }
    }

    /// Thick line segment, drawn as a swept disc.
    pub fn draw_line(&mut self, x0: f32, y0: f32, x1: f32, y1: f32, thickness: f32, color: Rgba<u8>) {
        let (dx, dy) = (x1 - x0, y1 - y0);
        let len = (dx * dx + dy * dy).sqrt();
        let radius = (thickness / 2.0).max(0.5);
        let steps = (len / (radius * 0.5).max(0.5)).ceil().max(1.0) as usize;
        // Stamp discs sparsely; blending is max-free so overdraw on opaque
        // colors is harmless, but translucent strokes use a coverage mask.
        if color[3] == 255 {
            for i in 0..=steps {
                let t = i as f32 / steps as f32;
                self.fill_circle(x0 + dx * t, y0 + dy * t, radius, color);
            }
        } else {
            self.stroke_masked(|mask| {
                for i in 0..=steps {
                    let t = i as f32 / steps as f32;
                    mask.fill_circle(x0 + dx * t, y0 + dy * t, radius);
                }
            }, color);
        }
    }

    /// Connected polyline (line charts).
    pub fn draw_polyline(&mut self, points: &[(f32, f32)], thickness: f32, color: Rgba<u8>) {
        if points.len() < 2 {
            return;
        }
        if color[3] == 255 {
            for pair in points.windows(2) {
                self.draw_line(pair[0].0, pair[0].1, pair[1].0, pair[1].1, thickness, color);
            }
        } else {
            let pts = points.to_vec();
            self.stroke_masked(move |mask| {
                for pair in pts.windows(2) {
                    mask.line(pair[0].0, pair[0].1, pair[1].0, pair[1].1, thickness);
                }
            }, color);
        }
    }

    /// Stroked arc of `thickness` centered on `radius`.
    ///
    /// `start_deg`/`sweep_deg` follow the arc convention in the module docs.
    pub fn stroke_arc(
        &mut self,
        cx: f32,
        cy: f32,
        radius: f32,
        thickness: f32,
        start_deg: f32,
        sweep_deg: f32,
        color: Rgba<u8>,
    ) {
        if sweep_deg == 0.0 || radius <= 0.0 {
            return;
        }
        let half = thickness / 2.0;
        let outer = radius + half;
        let bound = outer.ceil() as i32 + 1;
        let (cxi, cyi) = (cx.round() as i32, cy.round() as i32);
        let sweep_abs = sweep_deg.abs().min(360.0);

        for dy in -bound..=bound {
            for dx in -bound..=bound {
                let fx = dx as f32;
                let fy = -(dy as f32); // y-down screen -> y-up math
                let dist = (fx * fx + fy * fy).sqrt();
                if (dist - radius).abs() > half {
                    continue;
                }
                let mut angle = fy.atan2(fx).to_degrees();
                if angle < 0.0 {
                    angle += 360.0;
                }
                let offset = if sweep_deg < 0.0 {
                    (start_deg - angle).rem_euclid(360.0)
                } else {
                    (angle - start_deg).rem_euclid(360.0)
                };
                if offset <= sweep_abs {
                    self.blend(cxi + dx, cyi + dy, color);
                }
            }
        }
    }

    /// Circle outline (analog clock borders).
    pub fn stroke_circle(&mut self, cx: f32, cy: f32, radius: f32, thickness: f32, color: Rgba<u8>) {
        self.stroke_arc(cx, cy, radius, thickness, 0.0, 360.0, color);
    }

    /// Alpha-blit `src` at `(x, y)`, scaling each source alpha by
    /// `opacity` (0-100).
    pub fn blit(&mut self, src: &RgbaImage, x: i32, y: i32, opacity: u8) {
        let scale = opacity.min(100) as u32;
        for (sx, sy, px) in src.enumerate_pixels() {
            let mut p = *px;
            if scale < 100 {
                p[3] = (p[3] as u32 * scale / 100) as u8;
            }
            self.blend(x + sx as i32, y + sy as i32, p);
        }
    }

    /// Render a shape through a coverage mask so self-overlapping strokes
    /// of a translucent color blend once instead of stacking.
    fn stroke_masked<F: FnOnce(&mut CoverageMask)>(&mut self, shape: F, color: Rgba<u8>) {
        let mut mask = CoverageMask::new(self.width(), self.height());
        shape(&mut mask);
        for (i, covered) in mask.bits.iter().enumerate() {
            if *covered {
                let x = (i as u32 % mask.width) as i32;
                let y = (i as u32 / mask.width) as i32;
                self.blend(x, y, color);
            }
        }
    }
}

/// One-bit coverage buffer for translucent stroke compositing.
struct CoverageMask {
    bits: Vec<bool>,
    width: u32,
    height: u32,
}

impl CoverageMask {
    fn new(width: u32, height: u32) -> Self {
        Self {
            bits: vec![false; (width * height) as usize],
            width,
            height,
        }
    }

    #[inline]
    fn set(&mut self, x: i32, y: i32) {
        if x >= 0 && y >= 0 && (x as u32) < self.width && (y as u32) < self.height {
            self.bits[(y as u32 * self.width + x as u32) as usize] = true;
        }
    }

    fn fill_circle(&mut self, cx: f32, cy: f32, radius: f32) {
        let r_ceil = radius.ceil() as i32 + 1;
        let (cxi, cyi) = (cx.round() as i32, cy.round() as i32);
        for dy in -r_ceil..=r_ceil {
            for dx in -r_ceil..=r_ceil {
                if ((dx * dx + dy * dy) as f32).sqrt() <= radius {
                    self.set(cxi + dx, cyi + dy);
                }
            }
        }
    }

    fn line(&mut self, x0: f32, y0: f32, x1: f32, y1: f32, thickness: f32) {
        let (dx, dy) = (x1 - x0, y1 - y0);
        let len = (dx * dx + dy * dy).sqrt();
        let radius = (thickness / 2.0).max(0.5);
        let steps = (len / (radius * 0.5).max(0.5)).ceil().max(1.0) as usize;
        for i in 0..=steps {
            let t = i as f32 / steps as f32;
            self.fill_circle(x0 + dx * t, y0 + dy * t, radius);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_color() {
        assert_eq!(parse_color("#00ff96", 100), Rgba([0, 255, 150, 255]));
        assert_eq!(parse_color("#fff", 100), Rgba([255, 255, 255, 255]));
        assert_eq!(parse_color("#000000", 50), Rgba([0, 0, 0, 127]));
        // Garbage falls back to white
        assert_eq!(parse_color("teal-ish", 100), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn test_fill_rect_clips_to_bounds() {
        let mut canvas = Canvas::new(10, 10, Rgba([0, 0, 0, 255]));
        canvas.fill_rect(-5, -5, 8, 8, Rgba([255, 0, 0, 255]));
        let img = canvas.into_image();
        assert_eq!(img.get_pixel(0, 0), &Rgba([255, 0, 0, 255]));
        assert_eq!(img.get_pixel(3, 3), &Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn test_alpha_blend_is_source_over() {
        let mut canvas = Canvas::new(1, 1, Rgba([0, 0, 0, 255]));
        canvas.blend(0, 0, Rgba([255, 255, 255, 127]));
        let px = *canvas.into_image().get_pixel(0, 0);
        // ~50% white over black
        assert!(px[0] > 120 && px[0] < 135);
    }

    #[test]
    fn test_arc_sweep_covers_expected_quadrant() {
        // Clockwise 90° sweep from the lower-left runs up the left side
        let mut canvas = Canvas::new(100, 100, Rgba([0, 0, 0, 255]));
        canvas.stroke_arc(50.0, 50.0, 30.0, 6.0, 225.0, -90.0, Rgba([255, 0, 0, 255]));
        let img = canvas.into_image();
        // 180° (9 o'clock) is inside the sweep
        assert_eq!(img.get_pixel(20, 50)[0], 255);
        // Straight down and straight right are not
        assert_eq!(img.get_pixel(50, 80)[0], 0);
        assert_eq!(img.get_pixel(80, 50)[0], 0);
    }

    #[test]
    fn test_full_gauge_sweep_leaves_bottom_gap() {
        // The circular gauge track: 225° start, -270° sweep
        let mut canvas = Canvas::new(100, 100, Rgba([0, 0, 0, 255]));
        canvas.stroke_arc(50.0, 50.0, 30.0, 6.0, 225.0, -270.0, Rgba([255, 0, 0, 255]));
        let img = canvas.into_image();
        // Top, left, and right are covered
        assert_eq!(img.get_pixel(50, 20)[0], 255);
        assert_eq!(img.get_pixel(20, 50)[0], 255);
        assert_eq!(img.get_pixel(80, 50)[0], 255);
        // Straight down stays open
        assert_eq!(img.get_pixel(50, 80)[0], 0);
    }

    #[test]
    fn test_translucent_polyline_does_not_double_blend() {
        let mut canvas = Canvas::new(40, 40, Rgba([0, 0, 0, 255]));
        // A sharp zig-zag revisits pixels at the joint
        canvas.draw_polyline(
            &[(5.0, 20.0), (20.0, 20.0), (5.0, 21.0)],
            3.0,
            Rgba([255, 255, 255, 100]),
        );
        let img = canvas.into_image();
        let joint = img.get_pixel(12, 20)[0];
        let single = img.get_pixel(18, 20)[0];
        // Same coverage, same resulting intensity
        assert_eq!(joint, single);
    }
}
