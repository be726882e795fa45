//! Minimal raster plotting on an RGB buffer.
//!
//! Output is RGB without alpha so the PDF engine can embed it as-is, and
//! drawing is integer-only so the same data always yields the same bytes.

use image::{Rgb, RgbImage};

use super::font::{self, ADVANCE, GLYPH_HEIGHT, GLYPH_WIDTH};

pub type Color = Rgb<u8>;

pub const WHITE: Color = Rgb([255, 255, 255]);
pub const BLACK: Color = Rgb([20, 20, 20]);
pub const GRID: Color = Rgb([225, 225, 225]);
pub const AXIS: Color = Rgb([90, 90, 90]);

/// Series colours, cycled by index.
pub const PALETTE: [Color; 10] = [
    Rgb([31, 119, 180]),
    Rgb([255, 127, 14]),
    Rgb([44, 160, 44]),
    Rgb([214, 39, 40]),
    Rgb([148, 103, 189]),
    Rgb([140, 86, 75]),
    Rgb([227, 119, 194]),
    Rgb([127, 127, 127]),
    Rgb([188, 189, 34]),
    Rgb([23, 190, 207]),
];

pub fn palette(i: usize) -> Color {
    PALETTE[i % PALETTE.len()]
}

pub struct Canvas {
    img: RgbImage,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            img: RgbImage::from_pixel(width, height, WHITE),
        }
    }

    pub fn width(&self) -> i64 {
        self.img.width() as i64
    }

    pub fn height(&self) -> i64 {
        self.img.height() as i64
    }

    pub fn into_image(self) -> RgbImage {
        self.img
    }

    fn put(&mut self, x: i64, y: i64, color: Color) {
        if x >= 0 && y >= 0 && x < self.width() && y < self.height() {
            self.img.put_pixel(x as u32, y as u32, color);
        }
    }

    /// Fills the rectangle spanned by two corners (inclusive, any order).
    pub fn fill_rect(&mut self, x0: i64, y0: i64, x1: i64, y1: i64, color: Color) {
        let (xa, xb) = (x0.min(x1), x0.max(x1));
        let (ya, yb) = (y0.min(y1), y0.max(y1));
        for y in ya.max(0)..=yb.min(self.height() - 1) {
            for x in xa.max(0)..=xb.min(self.width() - 1) {
                self.img.put_pixel(x as u32, y as u32, color);
            }
        }
    }

    pub fn hline(&mut self, x0: i64, x1: i64, y: i64, color: Color) {
        self.fill_rect(x0, y, x1, y, color);
    }

    pub fn vline(&mut self, x: i64, y0: i64, y1: i64, color: Color) {
        self.fill_rect(x, y0, x, y1, color);
    }

    /// Bresenham line, `thickness` pixels wide.
    pub fn line(&mut self, x0: i64, y0: i64, x1: i64, y1: i64, thickness: i64, color: Color) {
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let half = thickness / 2;
        let (mut x, mut y) = (x0, y0);
        let mut err = dx + dy;
        loop {
            for ox in -half..=half {
                for oy in -half..=half {
                    self.put(x + ox, y + oy, color);
                }
            }
            if x == x1 && y == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    fn glyph(&mut self, x: i64, y: i64, c: char, scale: i64, color: Color) {
        let rows = font::glyph(c);
        for (row, bits) in rows.iter().enumerate() {
            for col in 0..GLYPH_WIDTH as i64 {
                if bits & (1 << (GLYPH_WIDTH as i64 - 1 - col)) != 0 {
                    let px = x + col * scale;
                    let py = y + row as i64 * scale;
                    self.fill_rect(px, py, px + scale - 1, py + scale - 1, color);
                }
            }
        }
    }

    /// Horizontal text with its top-left corner at `(x, y)`.
    pub fn text(&mut self, x: i64, y: i64, text: &str, scale: u32, color: Color) {
        let advance = (ADVANCE * scale) as i64;
        for (i, c) in text.chars().enumerate() {
            self.glyph(x + i as i64 * advance, y, c, scale as i64, color);
        }
    }

    /// Text centred horizontally on `cx`.
    pub fn text_centered(&mut self, cx: i64, y: i64, text: &str, scale: u32, color: Color) {
        let w = font::text_width(text, scale) as i64;
        self.text(cx - w / 2, y, text, scale, color);
    }

    /// Text right-aligned so it ends at `right`.
    pub fn text_right(&mut self, right: i64, y: i64, text: &str, scale: u32, color: Color) {
        let w = font::text_width(text, scale) as i64;
        self.text(right - w, y, text, scale, color);
    }

    /// Tick label stepped down-left at 45° so that its last glyph sits under `x`.
    pub fn text_slanted(&mut self, x: i64, y: i64, text: &str, color: Color) {
        let step = (GLYPH_HEIGHT as i64 + 1) / 2 + 1;
        let n = text.chars().count() as i64;
        for (i, c) in text.chars().enumerate() {
            let back = n - 1 - i as i64;
            let gx = x - GLYPH_WIDTH as i64 / 2 - back * step;
            let gy = y + (i as i64) * step;
            self.glyph(gx, gy, c, 1, color);
        }
    }
}
