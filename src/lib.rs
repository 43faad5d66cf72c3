//! `extfit` library crate.
//!
//! The binary (`extfit`) is a thin wrapper around this library so that:
//!
//! - the fitting pipeline is testable without spawning processes
//! - the SED synthesis and normalization code can be reused from other tools

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod params;
pub mod plot;
pub mod report;
