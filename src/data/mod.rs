//! Model grids and synthetic stars.

pub mod grid;
pub mod sample;

pub use grid::{GridPoint, ModelGrid, ModelSpectrum, find_model_files, read_model_file};
pub use sample::*;
