//! Mathematical utilities: interpolation, statistics and covariance estimation.

pub mod covariance;
pub mod interp;
pub mod stats;

pub use covariance::*;
pub use interp::*;
pub use stats::*;
