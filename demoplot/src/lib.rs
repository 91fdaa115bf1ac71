//!
//! demoplot - Histogram rasterizer
//!
//! Turns a sequence of labeled numeric samples into a labeled histogram drawn into
//! an RGBA bitmap. Everything is rendered in-process with a built-in bitmap
//! font; the only output format is the raw pixel buffer or a PAM file.
//!
//! ```rust,ignore
//! use demoplot::{render_histogram, HistogramOptions, PlotSize, Sample};
//!
//! let options = HistogramOptions {
//!     title: "Height".to_string(),
//!     ..HistogramOptions::default()
//! };
//! let samples = [Sample::new("Andrew", 193.0), Sample::new("Michael", 180.0)];
//! let bitmap = render_histogram(PlotSize::new(640.0, 480.0), &samples, &options);
//! bitmap.write_pam(std::fs::File::create("height.pam")?)?;
//! ```
//!

pub mod bitmap;
pub mod font;
pub mod histogram;

pub use bitmap::{Bitmap, Color, BYTES_PER_PIXEL};
pub use histogram::{
    clamp_side, render_histogram, Bins, HistogramOptions, PlotSize, Sample, DEFAULT_BINS,
    MAX_BINS, MAX_SIDE_LENGTH,
};
