//! Procedural helper geometry drawn by the viewer alongside the exhibit.

pub mod axes;
pub mod grid;

pub use axes::create_axes;
pub use grid::{GridOptions, create_grid};
