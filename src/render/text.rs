//! Bitmap text drawn straight into an RGB buffer.
//!
//! plotters is built without a font backend, so titles, tick labels and
//! legends use the 8×8 glyphs from `font8x8`, scaled by an integer factor.

use font8x8::{BASIC_FONTS, GREEK_FONTS, LATIN_FONTS, UnicodeFonts};

use super::figure::Rgb;

/// Glyph edge in pixels at scale 1.
pub const GLYPH: i32 = 8;

/// Where a text box sits relative to its anchor point, on one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    Start,
    Center,
    End,
}

impl Anchor {
    fn offset(self, extent: i32) -> i32 {
        match self {
            Self::Start => 0,
            Self::Center => extent / 2,
            Self::End => extent,
        }
    }
}

/// A string queued for drawing once the chart primitives are done.
#[derive(Debug, Clone, PartialEq)]
pub struct TextItem {
    pub x: i32,
    pub y: i32,
    pub text: String,
    pub color: Rgb,
    pub scale: i32,
    pub horizontal: Anchor,
    pub vertical: Anchor,
    /// Rotated a quarter turn counterclockwise, reading bottom to top.
    pub rotated: bool,
}

impl TextItem {
    pub fn new(x: i32, y: i32, text: impl Into<String>, scale: i32) -> Self {
        Self {
            x,
            y,
            text: text.into(),
            color: Rgb::BLACK,
            scale: scale.max(1),
            horizontal: Anchor::Start,
            vertical: Anchor::Start,
            rotated: false,
        }
    }

    pub fn anchored(mut self, horizontal: Anchor, vertical: Anchor) -> Self {
        self.horizontal = horizontal;
        self.vertical = vertical;
        self
    }

    pub fn colored(mut self, color: Rgb) -> Self {
        self.color = color;
        self
    }

    pub fn rotated(mut self) -> Self {
        self.rotated = true;
        self
    }
}

/// Width in pixels of `text` laid out on one line.
pub fn text_width(text: &str, scale: i32) -> i32 {
    text.chars().count() as i32 * GLYPH * scale.max(1)
}

/// Shorten `text` to at most `max_chars`, marking the cut with `..`.
pub fn truncate(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    if max_chars <= 2 {
        return text.chars().take(max_chars).collect();
    }
    let mut out: String = text.chars().take(max_chars - 2).collect();
    out.push_str("..");
    out
}

fn glyph(ch: char) -> Option<[u8; 8]> {
    BASIC_FONTS
        .get(ch)
        .or_else(|| LATIN_FONTS.get(ch))
        .or_else(|| GREEK_FONTS.get(ch))
        .or_else(|| BASIC_FONTS.get('?'))
}

/// Mutable view of a packed RGB buffer.
pub struct Raster<'a> {
    pixels: &'a mut [u8],
    width: i32,
    height: i32,
}

impl<'a> Raster<'a> {
    pub fn new(pixels: &'a mut [u8], width: u32, height: u32) -> Self {
        Self {
            pixels,
            width: width as i32,
            height: height as i32,
        }
    }

    fn put(&mut self, x: i32, y: i32, color: Rgb) {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return;
        }
        let idx = ((y * self.width + x) * 3) as usize;
        if let Some(px) = self.pixels.get_mut(idx..idx + 3) {
            px.copy_from_slice(&[color.0, color.1, color.2]);
        }
    }

    pub fn draw(&mut self, item: &TextItem) {
        let scale = item.scale.max(1);
        let length = text_width(&item.text, scale);
        let thickness = GLYPH * scale;

        // Top-left corner of the unrotated box, or bottom-left of the rotated one.
        let (origin_x, origin_y) = if item.rotated {
            (
                item.x - item.horizontal.offset(thickness),
                item.y + length - item.vertical.offset(length),
            )
        } else {
            (
                item.x - item.horizontal.offset(length),
                item.y - item.vertical.offset(thickness),
            )
        };

        for (i, ch) in item.text.chars().enumerate() {
            let Some(rows) = glyph(ch) else { continue };
            let advance = i as i32 * thickness;
            for (row, bits) in rows.iter().enumerate() {
                for col in 0..GLYPH {
                    if (bits >> col) & 1 == 0 {
                        continue;
                    }
                    for sy in 0..scale {
                        for sx in 0..scale {
                            let (u, v) = (advance + col * scale + sx, row as i32 * scale + sy);
                            if item.rotated {
                                self.put(origin_x + v, origin_y - u, item.color);
                            } else {
                                self.put(origin_x + u, origin_y + v, item.color);
                            }
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ink(pixels: &[u8]) -> usize {
        pixels.chunks(3).filter(|px| px != &[255, 255, 255]).count()
    }

    #[test]
    fn test_text_width_scales() {
        assert_eq!(text_width("abc", 1), 24);
        assert_eq!(text_width("abc", 2), 48);
        assert_eq!(text_width("", 3), 0);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("revenue", 10), "revenue");
        assert_eq!(truncate("quarterly revenue", 8), "quarte..");
    }

    #[test]
    fn test_draws_inside_bounds_only() {
        let mut pixels = vec![255u8; 40 * 20 * 3];
        let mut raster = Raster::new(&mut pixels, 40, 20);
        raster.draw(&TextItem::new(-4, -4, "Hi", 1));
        raster.draw(&TextItem::new(36, 16, "clipped", 1));
        assert!(ink(&pixels) > 0);
    }

    #[test]
    fn test_centered_and_rotated_text_lands_on_canvas() {
        let mut pixels = vec![255u8; 64 * 64 * 3];
        let mut raster = Raster::new(&mut pixels, 64, 64);
        raster.draw(&TextItem::new(32, 32, "y", 2).anchored(Anchor::Center, Anchor::Center).rotated());
        assert!(ink(&pixels) > 0);
    }

    #[test]
    fn test_unknown_glyph_falls_back() {
        assert!(glyph('\u{2603}').is_some());
    }
}
