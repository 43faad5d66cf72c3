//! Figures.
//!
//! Each figure is a plain data struct implementing [`Figure`]; drawing is
//! generic over the plotters backend so the same code writes SVG and PNG.
//! `ascii` is the terminal fallback.

pub mod ascii;
pub mod chains;
pub mod fit;
pub mod norm_spec;
pub mod stack;
pub mod style;

pub use ascii::*;
pub use chains::*;
pub use fit::*;
pub use norm_spec::*;
pub use stack::*;

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use plotters::coord::Shift;
use plotters::prelude::*;
use tracing::info;

use crate::domain::OutputFormat;
use crate::error::AppError;

/// Result of drawing on backend `DB`.
pub type DrawResult<DB> = Result<(), DrawingAreaErrorKind<<DB as DrawingBackend>::ErrorType>>;

/// Something that can draw itself on any plotters backend.
///
/// Series and bounds are computed when the figure is built; `draw` only draws.
pub trait Figure {
    /// Pixel size of the figure.
    fn size(&self) -> (u32, u32) {
        (1200, 900)
    }

    fn draw<DB: DrawingBackend>(&self, root: &DrawingArea<DB, Shift>) -> DrawResult<DB>;
}

/// `<stem>.<ext>` without touching dots already in the stem.
pub fn figure_path(stem: &Path, format: OutputFormat) -> PathBuf {
    let mut s: OsString = stem.as_os_str().to_owned();
    s.push(".");
    s.push(format.extension());
    PathBuf::from(s)
}

/// Render `figure` once per requested format. Returns the written paths.
pub fn render_figure<F: Figure>(figure: &F, stem: &Path, formats: &[OutputFormat]) -> Result<Vec<PathBuf>, AppError> {
    if let Some(dir) = stem.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .map_err(|e| AppError::new(2, format!("Failed to create figure directory '{}': {e}", dir.display())))?;
    }

    let mut written = Vec::with_capacity(formats.len());
    for &format in formats {
        let path = figure_path(stem, format);
        let render_err = |e: String| AppError::new(4, format!("Failed to render '{}': {e}", path.display()));
        match format {
            OutputFormat::Svg => {
                let root = SVGBackend::new(&path, figure.size()).into_drawing_area();
                figure.draw(&root).map_err(|e| render_err(e.to_string()))?;
                root.present().map_err(|e| render_err(e.to_string()))?;
            }
            OutputFormat::Png => {
                let root = BitMapBackend::new(&path, figure.size()).into_drawing_area();
                figure.draw(&root).map_err(|e| render_err(e.to_string()))?;
                root.present().map_err(|e| render_err(e.to_string()))?;
            }
        }
        info!(path = %path.display(), "wrote figure");
        written.push(path);
    }
    Ok(written)
}

/// `(min, max)` of the finite values, padded by `frac` of the span.
pub(crate) fn linear_range<I: IntoIterator<Item = f64>>(values: I, frac: f64) -> Option<(f64, f64)> {
    let (lo, hi) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !(lo.is_finite() && hi.is_finite()) {
        return None;
    }
    let pad = ((hi - lo) * frac).max(1e-12);
    Some((lo - pad, hi + pad))
}

/// Positive `(min, max)` of finite positive values, widened by `pad` dex on each side.
pub(crate) fn log_range<I: IntoIterator<Item = f64>>(values: I, pad: f64) -> Option<(f64, f64)> {
    let (lo, hi) = values
        .into_iter()
        .filter(|v| v.is_finite() && *v > 0.0)
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !(lo.is_finite() && hi.is_finite()) {
        return None;
    }
    let f = 10f64.powf(pad);
    if hi > lo { Some((lo / f, hi * f)) } else { Some((lo / (2.0 * f), hi * 2.0 * f)) }
}
