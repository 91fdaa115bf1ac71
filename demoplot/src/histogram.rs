//!
//! Histogram rendering.
//!
//! Samples are counted into equal-width bins spanning their minimum to
//! maximum value. Bars are scaled so the fullest bin reaches the top of the
//! plot frame. Without samples the frame and labels are still drawn, over a
//! fixed 0..100 by 0..110 axis range.
//!

use tracing::debug;

use crate::bitmap::{Bitmap, Color};
use crate::font::{self, GLYPH_HEIGHT};

/// Longest side, in pixels, of any rendered bitmap. Bounds one frame to about 50 MB.
pub const MAX_SIDE_LENGTH: u32 = 3535;

pub const DEFAULT_BINS: usize = 10;

/// Most bins a histogram is counted into. A bar narrower than a pixel cannot
/// be drawn, so no frame holds more bars than the longest side has pixels.
pub const MAX_BINS: usize = MAX_SIDE_LENGTH as usize;

const EMPTY_X_RANGE: (f64, f64) = (0.0, 100.0);
const EMPTY_Y_MAX: f64 = 110.0;

/// Requested output size in (possibly fractional) pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlotSize {
    pub width: f64,
    pub height: f64,
}

impl PlotSize {
    pub fn new(width: f64, height: f64) -> Self {
        PlotSize { width, height }
    }

    /// Pixel dimensions actually rendered.
    pub fn clamped(self) -> (u32, u32) {
        (clamp_side(self.width), clamp_side(self.height))
    }
}

/// Rounds to the nearest pixel (ties to even) and clamps to `1..=MAX_SIDE_LENGTH`.
/// Non-finite sides take the maximum.
pub fn clamp_side(side: f64) -> u32 {
    if !side.is_finite() {
        return MAX_SIDE_LENGTH;
    }
    let rounded = side.round_ties_even();
    rounded.clamp(1.0, f64::from(MAX_SIDE_LENGTH)) as u32
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistogramOptions {
    pub x_label: String,
    pub y_label: String,
    pub title: String,
    pub bins: usize,
}

/// One labeled measurement. Labels travel with the value but are not drawn;
/// the histogram only plots the distribution of values.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub label: String,
    pub value: f64,
}

impl Sample {
    pub fn new(label: impl Into<String>, value: f64) -> Self {
        Sample {
            label: label.into(),
            value,
        }
    }
}

impl From<f64> for Sample {
    fn from(value: f64) -> Self {
        Sample::new(String::new(), value)
    }
}

impl Default for HistogramOptions {
    fn default() -> Self {
        HistogramOptions {
            x_label: String::new(),
            y_label: String::new(),
            title: String::new(),
            bins: DEFAULT_BINS,
        }
    }
}

/// Sample counts per bin over `[min, max]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Bins {
    pub min: f64,
    pub max: f64,
    pub counts: Vec<usize>,
}

impl Bins {
    /// Counts the finite `values` into `bins` equal-width bins, clamped to
    /// `1..=MAX_BINS`. Returns `None` when no finite value is present.
    pub fn count(values: &[f64], bins: usize) -> Option<Self> {
        let bins = bins.clamp(1, MAX_BINS);
        let finite = values.iter().copied().filter(|v| v.is_finite());
        let (min, max) = finite.clone().fold(None, |range, v| match range {
            None => Some((v, v)),
            Some((lo, hi)) => Some((f64::min(lo, v), f64::max(hi, v))),
        })?;

        let mut counts = vec![0; bins];
        let width = (max - min) / bins as f64;
        for value in finite {
            let idx = if width > 0.0 {
                (((value - min) / width).floor() as usize).min(bins - 1)
            } else {
                0
            };
            counts[idx] += 1;
        }
        Some(Bins { min, max, counts })
    }

    pub fn peak(&self) -> usize {
        self.counts.iter().copied().max().unwrap_or(0)
    }
}

/// Pixel layout of the plot area within the bitmap.
struct Frame {
    x: i64,
    y: i64,
    w: i64,
    h: i64,
}

/// Renders a histogram of the sample values into a new bitmap of the clamped
/// `size`. Never fails; empty or non-finite input yields a labeled, empty frame.
pub fn render_histogram(size: PlotSize, samples: &[Sample], options: &HistogramOptions) -> Bitmap {
    let (width, height) = size.clamped();
    let values: Vec<f64> = samples.iter().map(|sample| sample.value).collect();
    let mut bitmap = Bitmap::new(width, height, Color::WHITE);
    let scale = (i64::from(width.min(height)) / 160).max(1);
    let line = (GLYPH_HEIGHT + 2) * scale;

    let bins = Bins::count(&values, options.bins);
    let (x_range, y_max) = match &bins {
        Some(bins) => ((bins.min, bins.max), bins.peak() as f64),
        None => (EMPTY_X_RANGE, EMPTY_Y_MAX),
    };
    debug!(
        width,
        height,
        samples = values.len(),
        bins = options.bins,
        empty = bins.is_none(),
        "rendering histogram"
    );

    let y_tick = format_tick(y_max);
    let left = line * 2 + font::text_width(&y_tick, scale) + 2 * scale;
    let frame = Frame {
        x: left,
        y: line * 2,
        w: i64::from(width) - left - line,
        h: i64::from(height) - line * 5,
    };

    if frame.w > 2 * scale && frame.h > 2 * scale {
        if let Some(bins) = &bins {
            draw_bars(&mut bitmap, &frame, bins, scale);
        }
        bitmap.stroke_rect(frame.x, frame.y, frame.w, frame.h, scale, Color::BLACK);
        draw_ticks(&mut bitmap, &frame, x_range, &y_tick, scale, line);
    }
    draw_labels(&mut bitmap, options, scale, line);
    bitmap
}

fn draw_bars(bitmap: &mut Bitmap, frame: &Frame, bins: &Bins, scale: i64) {
    let peak = bins.peak();
    if peak == 0 {
        return;
    }
    let n = bins.counts.len() as i64;
    let bottom = frame.y + frame.h;
    for (i, &count) in bins.counts.iter().enumerate() {
        let i = i as i64;
        let x0 = frame.x + frame.w * i / n;
        let x1 = frame.x + frame.w * (i + 1) / n;
        let bar = frame.h * count as i64 / peak as i64;
        if bar == 0 {
            continue;
        }
        bitmap.fill_rect(x0, bottom - bar, x1 - x0, bar, Color::BAR);
        bitmap.stroke_rect(x0, bottom - bar, x1 - x0 + scale, bar, scale, Color::BLACK);
    }
}

fn draw_ticks(
    bitmap: &mut Bitmap,
    frame: &Frame,
    (x_min, x_max): (f64, f64),
    y_tick: &str,
    scale: i64,
    line: i64,
) {
    let below = frame.y + frame.h + scale * 2;
    let min_label = format_tick(x_min);
    let max_label = format_tick(x_max);
    font::draw_text(bitmap, frame.x, below, &min_label, scale, Color::BLACK);
    let max_x = frame.x + frame.w - font::text_width(&max_label, scale);
    font::draw_text(bitmap, max_x, below, &max_label, scale, Color::BLACK);

    let beside = frame.x - font::text_width(y_tick, scale) - scale * 2;
    font::draw_text(bitmap, beside, frame.y, y_tick, scale, Color::BLACK);
    let zero_y = frame.y + frame.h - line + scale * 2;
    let zero_x = frame.x - font::text_width("0", scale) - scale * 2;
    font::draw_text(bitmap, zero_x, zero_y, "0", scale, Color::BLACK);
}

fn draw_labels(bitmap: &mut Bitmap, options: &HistogramOptions, scale: i64, line: i64) {
    let width = i64::from(bitmap.width());
    let height = i64::from(bitmap.height());

    let title_x = (width - font::text_width(&options.title, scale)) / 2;
    font::draw_text(bitmap, title_x, line / 2, &options.title, scale, Color::BLACK);

    let x_label_x = (width - font::text_width(&options.x_label, scale)) / 2;
    let x_label_y = height - line - scale;
    font::draw_text(bitmap, x_label_x, x_label_y, &options.x_label, scale, Color::BLACK);

    let y_label_y = (height + font::text_width(&options.y_label, scale)) / 2;
    font::draw_text_up(bitmap, line / 2, y_label_y, &options.y_label, scale, Color::BLACK);
}

fn format_tick(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e9 {
        format!("{value:.0}")
    } else {
        format!("{value:.2}")
    }
}
