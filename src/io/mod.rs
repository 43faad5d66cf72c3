//! Input/output helpers.
//!
//! - star data files and spectrum CSVs (`ingest`)
//! - MCMC chain CSV (`export`)
//! - extinction curve computation and JSON read/write (`curve`)

pub mod curve;
pub mod export;
pub mod ingest;

pub use curve::*;
pub use export::*;
pub use ingest::*;
