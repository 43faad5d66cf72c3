//! Fitting: weights, normalization, the log-probability, the Nelder–Mead
//! minimizer and the ensemble sampler.

pub mod minimizer;
pub mod norm;
pub mod objective;
pub mod sampler;
pub mod weights;

pub use minimizer::*;
pub use norm::*;
pub use objective::*;
pub use sampler::*;
pub use weights::*;
