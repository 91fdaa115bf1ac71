//!
//! RGBA pixel buffer.
//!
//! Pixels are stored row-major from the top row down, four bytes each, as
//! straight (not premultiplied) red, green, blue, alpha. All drawing is
//! clipped to the buffer, so shapes that fall partly or wholly outside are
//! silently cut.
//!

use std::io::{self, Write};

pub const BYTES_PER_PIXEL: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const BAR: Color = Color::rgb(70, 130, 180);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Color { r, g, b, a: 255 }
    }

    fn bytes(self) -> [u8; BYTES_PER_PIXEL] {
        [self.r, self.g, self.b, self.a]
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Bitmap {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Bitmap {
    /// Allocates a `width` x `height` bitmap filled with `background`.
    pub fn new(width: u32, height: u32, background: Color) -> Self {
        let count = width as usize * height as usize;
        let mut pixels = Vec::with_capacity(count * BYTES_PER_PIXEL);
        for _ in 0..count {
            pixels.extend_from_slice(&background.bytes());
        }
        Bitmap {
            width,
            height,
            pixels,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw RGBA bytes, `width * height * BYTES_PER_PIXEL` long.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Color> {
        let offset = self.offset(i64::from(x), i64::from(y))?;
        let px = &self.pixels[offset..offset + BYTES_PER_PIXEL];
        Some(Color {
            r: px[0],
            g: px[1],
            b: px[2],
            a: px[3],
        })
    }

    pub fn set_pixel(&mut self, x: i64, y: i64, color: Color) {
        if let Some(offset) = self.offset(x, y) {
            self.pixels[offset..offset + BYTES_PER_PIXEL].copy_from_slice(&color.bytes());
        }
    }

    /// Fills the half-open rectangle `[x, x + w) x [y, y + h)`.
    pub fn fill_rect(&mut self, x: i64, y: i64, w: i64, h: i64, color: Color) {
        let x0 = x.max(0);
        let y0 = y.max(0);
        let x1 = (x + w).min(i64::from(self.width));
        let y1 = (y + h).min(i64::from(self.height));
        for py in y0..y1 {
            for px in x0..x1 {
                self.set_pixel(px, py, color);
            }
        }
    }

    /// Outlines a rectangle with lines `thickness` pixels wide, drawn inside it.
    pub fn stroke_rect(&mut self, x: i64, y: i64, w: i64, h: i64, thickness: i64, color: Color) {
        let t = thickness.max(1).min(w).min(h);
        if t <= 0 {
            return;
        }
        self.fill_rect(x, y, w, t, color);
        self.fill_rect(x, y + h - t, w, t, color);
        self.fill_rect(x, y, t, h, color);
        self.fill_rect(x + w - t, y, t, h, color);
    }

    /// Writes the bitmap as a Netpbm PAM image with an alpha channel.
    pub fn write_pam<W: Write>(&self, mut out: W) -> io::Result<()> {
        write!(
            out,
            "P7\nWIDTH {}\nHEIGHT {}\nDEPTH {}\nMAXVAL 255\nTUPLTYPE RGB_ALPHA\nENDHDR\n",
            self.width, self.height, BYTES_PER_PIXEL
        )?;
        out.write_all(&self.pixels)?;
        out.flush()
    }

    fn offset(&self, x: i64, y: i64) -> Option<usize> {
        if x < 0 || y < 0 || x >= i64::from(self.width) || y >= i64::from(self.height) {
            return None;
        }
        let index = y as usize * self.width as usize + x as usize;
        Some(index * BYTES_PER_PIXEL)
    }
}

impl std::fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bitmap")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}
