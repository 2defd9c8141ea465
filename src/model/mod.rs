//! Atmospheric columns and maps of columns.
//!
//! [`DepthModel`] stores one column as fourteen fields over a single buffer;
//! [`DepthModelGrid`] holds the `ny × nx` columns of a map together with the
//! top boundary value of every pixel.

mod depth_model;
mod grid;

pub use depth_model::{Columns, ColumnsMut, DepthModel, Field, NFIELDS};
pub use grid::DepthModelGrid;
