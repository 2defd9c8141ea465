//! # atmos-rs
//!
//! Node-parameterized stellar atmosphere columns and per-pixel inversion
//! workers.
//!
//! This crate provides:
//! - Atmospheric columns with named depth profiles ([`DepthModel`])
//! - Node parameterization of the profiles: expansion and compression
//! - Depth-scale consistency (optical depth, height, column mass, pressure)
//! - Hydrostatic equilibrium through an equation-of-state collaborator
//! - Spectral synthesis, instrumental degradation and response functions
//!   around an external radiative-transfer engine
//! - Workers processing batches of pixels in one of four modes, and a
//!   thread pool connecting them
//! - NetCDF model cubes (feature `netcdf`)

pub mod equations;
pub mod io;
pub mod model;
pub mod nodes;
pub mod scales;
pub mod synthesis;
pub mod types;
pub mod worker;

// Re-export main types for convenience
pub use equations::{EquationOfState, IdealGasEos, KnownDensity, ThermoState};
pub use io::ModelIoError;
#[cfg(feature = "netcdf")]
pub use io::{ModelReader, ModelWriter};
pub use model::{DepthModel, DepthModelGrid, Field};
pub use nodes::{NodeError, NodeSet, Quantity, compress, expand_into};
pub use scales::{DepthOptimizer, ScaleError, ScaleSolver, TemperatureCut, nne_enhance};
pub use synthesis::{
    AtmosKind, Atmosphere, Instrument, KernelInstrument, ModelFitter, ParameterRanges,
    ResponseChannel, SpectralSynthesizer, SynthesisError,
};
pub use types::{BoundaryKind, DepthScale, DepthType, Interpolation, Mode, PixelIndex};
pub use worker::{
    Collaborators, InversionWorker, PixelStatus, Task, TaskResult, WorkerConfig, WorkerError,
    WorkerPool,
};
