//! SED synthesis: stellar atmosphere, dust extinction, HI absorption and
//! IR wind emission.
//!
//! The physics lives in small pure functions (`extinction`, `hi`); `sed` chains
//! them over the channels of a model grid.

pub mod extinction;
pub mod hi;
pub mod sed;

pub use sed::*;
