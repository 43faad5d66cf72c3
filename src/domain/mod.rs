//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - observed data containers (`Spectrum`, `StarData`)
//! - run configuration (`FitConfig`, `NormPlotConfig`, ...)
//! - saved outputs (`ParamRow`, `ExtCurveFile`)

pub mod types;

pub use types::*;
