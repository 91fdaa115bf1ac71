//!
//! Built-in 3x5 bitmap font.
//!
//! Each glyph is five rows of three bits, most significant bit leftmost.
//! Lowercase letters render with their uppercase glyph; characters without
//! a glyph render as `?`.
//!

use crate::bitmap::{Bitmap, Color};

pub const GLYPH_WIDTH: i64 = 3;
pub const GLYPH_HEIGHT: i64 = 5;

/// Horizontal distance between glyph origins, in unscaled pixels.
pub const ADVANCE: i64 = GLYPH_WIDTH + 1;

const UNKNOWN: [u8; 5] = [0b110, 0b001, 0b010, 0b000, 0b010];

pub fn glyph(ch: char) -> [u8; 5] {
    match ch.to_ascii_uppercase() {
        ' ' => [0; 5],
        'A' => [0b010, 0b101, 0b111, 0b101, 0b101],
        'B' => [0b110, 0b101, 0b110, 0b101, 0b110],
        'C' => [0b011, 0b100, 0b100, 0b100, 0b011],
        'D' => [0b110, 0b101, 0b101, 0b101, 0b110],
        'E' => [0b111, 0b100, 0b110, 0b100, 0b111],
        'F' => [0b111, 0b100, 0b110, 0b100, 0b100],
        'G' => [0b011, 0b100, 0b101, 0b101, 0b011],
        'H' => [0b101, 0b101, 0b111, 0b101, 0b101],
        'I' => [0b111, 0b010, 0b010, 0b010, 0b111],
        'J' => [0b001, 0b001, 0b001, 0b101, 0b010],
        'K' => [0b101, 0b101, 0b110, 0b101, 0b101],
        'L' => [0b100, 0b100, 0b100, 0b100, 0b111],
        'M' => [0b101, 0b111, 0b111, 0b101, 0b101],
        'N' => [0b110, 0b101, 0b101, 0b101, 0b101],
        'O' => [0b010, 0b101, 0b101, 0b101, 0b010],
        'P' => [0b110, 0b101, 0b110, 0b100, 0b100],
        'Q' => [0b010, 0b101, 0b101, 0b110, 0b011],
        'R' => [0b110, 0b101, 0b110, 0b101, 0b101],
        'S' => [0b011, 0b100, 0b010, 0b001, 0b110],
        'T' => [0b111, 0b010, 0b010, 0b010, 0b010],
        'U' => [0b101, 0b101, 0b101, 0b101, 0b111],
        'V' => [0b101, 0b101, 0b101, 0b101, 0b010],
        'W' => [0b101, 0b101, 0b111, 0b111, 0b101],
        'X' => [0b101, 0b101, 0b010, 0b101, 0b101],
        'Y' => [0b101, 0b101, 0b010, 0b010, 0b010],
        'Z' => [0b111, 0b001, 0b010, 0b100, 0b111],
        '0' => [0b111, 0b101, 0b101, 0b101, 0b111],
        '1' => [0b010, 0b110, 0b010, 0b010, 0b111],
        '2' => [0b110, 0b001, 0b010, 0b100, 0b111],
        '3' => [0b110, 0b001, 0b010, 0b001, 0b110],
        '4' => [0b101, 0b101, 0b111, 0b001, 0b001],
        '5' => [0b111, 0b100, 0b110, 0b001, 0b110],
        '6' => [0b011, 0b100, 0b111, 0b101, 0b111],
        '7' => [0b111, 0b001, 0b010, 0b010, 0b010],
        '8' => [0b111, 0b101, 0b111, 0b101, 0b111],
        '9' => [0b111, 0b101, 0b111, 0b001, 0b110],
        '-' => [0b000, 0b000, 0b111, 0b000, 0b000],
        '+' => [0b000, 0b010, 0b111, 0b010, 0b000],
        '=' => [0b000, 0b111, 0b000, 0b111, 0b000],
        '_' => [0b000, 0b000, 0b000, 0b000, 0b111],
        '.' => [0b000, 0b000, 0b000, 0b000, 0b010],
        ',' => [0b000, 0b000, 0b000, 0b010, 0b100],
        ':' => [0b000, 0b010, 0b000, 0b010, 0b000],
        '(' => [0b001, 0b010, 0b010, 0b010, 0b001],
        ')' => [0b100, 0b010, 0b010, 0b010, 0b100],
        '/' => [0b001, 0b001, 0b010, 0b100, 0b100],
        '%' => [0b101, 0b001, 0b010, 0b100, 0b101],
        _ => UNKNOWN,
    }
}

/// Width of `text` in pixels at `scale`, without trailing spacing.
pub fn text_width(text: &str, scale: i64) -> i64 {
    let chars = text.chars().count() as i64;
    if chars == 0 {
        return 0;
    }
    (chars * ADVANCE - 1) * scale
}

/// Draws `text` left to right with its top-left corner at (`x`, `y`).
pub fn draw_text(bitmap: &mut Bitmap, x: i64, y: i64, text: &str, scale: i64, color: Color) {
    for (i, ch) in text.chars().enumerate() {
        let origin = x + i as i64 * ADVANCE * scale;
        for (row, bits) in glyph(ch).iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if bits & (1_u8 << (GLYPH_WIDTH - 1 - col)) != 0 {
                    bitmap.fill_rect(origin + col * scale, y + row as i64 * scale, scale, scale, color);
                }
            }
        }
    }
}

/// Draws `text` bottom to top, rotated a quarter turn counterclockwise, with
/// the baseline's bottom-left corner at (`x`, `y`).
pub fn draw_text_up(bitmap: &mut Bitmap, x: i64, y: i64, text: &str, scale: i64, color: Color) {
    for (i, ch) in text.chars().enumerate() {
        let origin = y - i as i64 * ADVANCE * scale;
        for (row, bits) in glyph(ch).iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if bits & (1_u8 << (GLYPH_WIDTH - 1 - col)) != 0 {
                    let px = x + row as i64 * scale;
                    let py = origin - (col + 1) * scale;
                    bitmap.fill_rect(px, py, scale, scale, color);
                }
            }
        }
    }
}
