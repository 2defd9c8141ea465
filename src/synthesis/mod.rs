//! Spectral synthesis around the external radiative-transfer engine.
//!
//! The engine itself is a collaborator behind [`SpectralSynthesizer`]; this
//! module owns what surrounds it: the [`Atmosphere`] that expands node
//! parameters, enforces hydrostatic equilibrium and computes response
//! functions, and the [`Instrument`]s that degrade the result.

mod atmosphere;
mod instrument;
mod traits;

pub use atmosphere::{AtmosKind, Atmosphere, NCHANNELS, ParameterRanges, ResponseChannel};
pub use instrument::{BoxedInstrument, Instrument, KernelInstrument, NoInstrument};
pub use traits::{BoxedFitter, BoxedSynthesizer, ModelFitter, SpectralSynthesizer};

use thiserror::Error;

use crate::nodes::NodeError;
use crate::scales::ScaleError;

/// Errors raised while preparing or differentiating a synthesis.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SynthesisError {
    #[error(transparent)]
    Scale(#[from] ScaleError),

    #[error(transparent)]
    Node(#[from] NodeError),

    #[error("parameter index {index} out of range for {npar} parameters")]
    ParameterIndex { index: usize, npar: usize },

    #[error("buffer holds {got} values, expected {expected}")]
    BufferSize { expected: usize, got: usize },

    #[error("finite-difference step {0} is zero or not finite")]
    InvalidStep(f64),
}
