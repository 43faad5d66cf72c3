//! Parameter vectors: the fixed full/fit layouts and the named parameter set.

pub mod layout;
pub mod set;

pub use layout::{compress, expand};
pub use set::*;
