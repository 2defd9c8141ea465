//! Worker configuration.

use thiserror::Error;

use crate::nodes::NodeSet;
use crate::scales::ScaleSolver;
use crate::synthesis::{AtmosKind, NCHANNELS, ParameterRanges, ResponseChannel};
use crate::types::{BoundaryKind, DepthType, Interpolation};

/// Invalid worker configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("unknown atmosphere type '{0}'")]
    UnknownAtmosphere(String),

    #[error("invalid processing mode {0}")]
    InvalidMode(i32),

    #[error("empty pixel grid {ny} x {nx}")]
    EmptyGrid { ny: usize, nx: usize },

    #[error("a column needs at least 2 depth points, got {0}")]
    TooFewDepthPoints(usize),

    #[error("finite-difference step must be positive and finite, got {0}")]
    InvalidStep(f64),

    #[error("temperature cut must be positive, got {0}")]
    InvalidTemperatureCut(f64),

    #[error("weights hold {got} values, spectra hold {expected}")]
    WeightsLength { expected: usize, got: usize },

    #[error("inversion requested but no fitter was provided")]
    MissingFitter,
}

/// Settings shared by every worker of a pool.
///
/// # Example
///
/// ```
/// use atmos_rs::synthesis::{AtmosKind, ResponseChannel};
/// use atmos_rs::worker::WorkerConfig;
///
/// let config = WorkerConfig::new(4, 4, 64)
///     .with_atmosphere("rh".parse::<AtmosKind>().unwrap())
///     .with_response_channel(ResponseChannel::Temp)
///     .with_temperature_cut(15000.0);
/// assert!(config.validate().is_ok());
/// assert_eq!(config.active_channels().count(), 1);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct WorkerConfig {
    pub ny: usize,
    pub nx: usize,
    pub ndep: usize,
    /// Known quantity at the top of the column.
    pub boundary: BoundaryKind,
    /// Solve hydrostatic equilibrium instead of filling densities.
    pub hydrostatic: bool,
    /// Resolve densities and scales before synthesizing a given column.
    pub use_eos: bool,
    /// Keep a given electron density when filling densities.
    pub keep_nne: bool,
    pub interpolation: Interpolation,
    pub depth_type: DepthType,
    /// Cut the column where the temperature first exceeds this value.
    pub tcut: Option<f64>,
    pub response_channels: [bool; NCHANNELS],
    pub centered_derivatives: bool,
    /// Relative finite-difference step.
    pub dpar: f64,
    pub atmos_kind: AtmosKind,
    /// Per-sample fit weights; empty means unit weights.
    pub weights: Vec<f64>,
    /// Engine-specific solver selector, forwarded to the synthesizer factory.
    pub solver: i32,
    pub nodes: NodeSet,
    pub ranges: ParameterRanges,
    pub scales: ScaleSolver,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            ny: 1,
            nx: 1,
            ndep: 54,
            boundary: BoundaryKind::GasPressure,
            hydrostatic: true,
            use_eos: true,
            keep_nne: false,
            interpolation: Interpolation::default(),
            depth_type: DepthType::default(),
            tcut: None,
            response_channels: [false; NCHANNELS],
            centered_derivatives: false,
            dpar: 1.0e-3,
            atmos_kind: AtmosKind::default(),
            weights: Vec::new(),
            solver: 0,
            nodes: NodeSet::new(),
            ranges: ParameterRanges::default(),
            scales: ScaleSolver::default(),
        }
    }
}

impl WorkerConfig {
    pub fn new(ny: usize, nx: usize, ndep: usize) -> Self {
        Self {
            ny,
            nx,
            ndep,
            ..Self::default()
        }
    }

    pub fn with_nodes(mut self, nodes: NodeSet) -> Self {
        self.nodes = nodes;
        self
    }

    pub fn with_ranges(mut self, ranges: ParameterRanges) -> Self {
        self.ranges = ranges;
        self
    }

    pub fn with_boundary(mut self, boundary: BoundaryKind) -> Self {
        self.boundary = boundary;
        self
    }

    pub fn with_hydrostatic(mut self, hydrostatic: bool) -> Self {
        self.hydrostatic = hydrostatic;
        self
    }

    pub fn with_eos(mut self, use_eos: bool) -> Self {
        self.use_eos = use_eos;
        self
    }

    pub fn with_keep_nne(mut self, keep_nne: bool) -> Self {
        self.keep_nne = keep_nne;
        self
    }

    pub fn with_interpolation(mut self, interpolation: Interpolation) -> Self {
        self.interpolation = interpolation;
        self
    }

    pub fn with_depth_type(mut self, depth_type: DepthType) -> Self {
        self.depth_type = depth_type;
        self
    }

    pub fn with_temperature_cut(mut self, tcut: f64) -> Self {
        self.tcut = Some(tcut);
        self
    }

    pub fn with_response_channel(mut self, channel: ResponseChannel) -> Self {
        self.response_channels[channel as usize] = true;
        self
    }

    pub fn with_centered_derivatives(mut self, centered: bool) -> Self {
        self.centered_derivatives = centered;
        self
    }

    pub fn with_dpar(mut self, dpar: f64) -> Self {
        self.dpar = dpar;
        self
    }

    pub fn with_atmosphere(mut self, kind: AtmosKind) -> Self {
        self.atmos_kind = kind;
        self
    }

    pub fn with_weights(mut self, weights: Vec<f64>) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_solver(mut self, solver: i32) -> Self {
        self.solver = solver;
        self
    }

    pub fn with_scale_solver(mut self, scales: ScaleSolver) -> Self {
        self.scales = scales;
        self
    }

    pub fn npix(&self) -> usize {
        self.ny * self.nx
    }

    /// Response channels flagged for output, in buffer order.
    pub fn active_channels(&self) -> impl Iterator<Item = ResponseChannel> + '_ {
        ResponseChannel::ALL
            .into_iter()
            .filter(|&c| self.response_channels[c as usize])
    }

    /// Check the settings that do not depend on the collaborators.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.npix() == 0 {
            return Err(ConfigError::EmptyGrid {
                ny: self.ny,
                nx: self.nx,
            });
        }
        if self.ndep < 2 {
            return Err(ConfigError::TooFewDepthPoints(self.ndep));
        }
        if !(self.dpar.is_finite() && self.dpar > 0.0) {
            return Err(ConfigError::InvalidStep(self.dpar));
        }
        if let Some(tcut) = self.tcut
            && !(tcut.is_finite() && tcut > 0.0)
        {
            return Err(ConfigError::InvalidTemperatureCut(tcut));
        }
        Ok(())
    }
}
