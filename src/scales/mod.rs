//! Depth-scale and density consistency for atmospheric columns.
//!
//! A column carries three depth coordinates (optical depth, height, column
//! mass) and three densities (gas pressure, mass density, electron density).
//! Only one of each is known at a time; [`ScaleSolver`] derives the rest with
//! the help of an [`EquationOfState`](crate::equations::EquationOfState).

mod enhance;
mod optimize;
mod solver;

use thiserror::Error;

use crate::types::CodeError;

pub use enhance::{ENHANCE_LTAU0, ENHANCE_WIDTH, enhance_weight, nne_enhance};
pub use optimize::{DepthOptimizer, TemperatureCut};
pub use solver::{DEFAULT_PGAS, REFERENCE_WAVELENGTH, SCALE_TOLERANCE, ScaleSolver};

/// Errors raised while resolving depth scales or densities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ScaleError {
    /// Optical depth, height and column mass are all zero.
    #[error("no depth scale: optical depth, height and column mass all sum to zero")]
    DegenerateScale,

    #[error("invalid boundary code {0}, expected 0..=4")]
    InvalidBoundary(i32),

    #[error(transparent)]
    InvalidCode(CodeError),

    #[error("column has {got} depth points, at least {needed} required")]
    TooFewPoints { needed: usize, got: usize },

    #[error("derived depth scale is not finite")]
    NonFiniteScale,

    /// Gas pressure, density and electron density are all zero.
    #[error("no density scale: gas pressure, density and electron density all sum to zero")]
    NoDensityScale,
}

impl From<CodeError> for ScaleError {
    fn from(err: CodeError) -> Self {
        match err {
            CodeError::InvalidBoundary(code) => ScaleError::InvalidBoundary(code),
            other => ScaleError::InvalidCode(other),
        }
    }
}
