//! A 2-D map of columns sharing one depth grid size.

use tracing::{debug, info};

use super::{DepthModel, Field};
use crate::equations::EquationOfState;
use crate::nodes::{NodeError, NodeSet, compress_into};
use crate::types::{BoundaryKind, Interpolation, PixelIndex};

/// `ny × nx` columns with a per-pixel top boundary value.
///
/// Pixel `(y, x)` lives at flat index `y * nx + x`.
///
/// # Example
///
/// ```
/// use atmos_rs::model::DepthModelGrid;
///
/// let mut grid = DepthModelGrid::new(2, 3, 10);
/// grid.model_mut(1, 2).temp_mut().fill(6000.0);
/// assert_eq!(grid.npix(), 6);
/// assert_eq!(grid.models()[5].temp()[0], 6000.0);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct DepthModelGrid {
    ny: usize,
    nx: usize,
    ndep: usize,
    models: Vec<DepthModel>,
    boundary: Vec<f64>,
    boundary_kind: BoundaryKind,
}

impl DepthModelGrid {
    /// Zero-filled grid.
    pub fn new(ny: usize, nx: usize, ndep: usize) -> Self {
        let npix = ny * nx;
        Self {
            ny,
            nx,
            ndep,
            models: vec![DepthModel::new(ndep); npix],
            boundary: vec![0.0; npix],
            boundary_kind: BoundaryKind::default(),
        }
    }

    #[inline]
    pub fn ny(&self) -> usize {
        self.ny
    }

    #[inline]
    pub fn nx(&self) -> usize {
        self.nx
    }

    #[inline]
    pub fn ndep(&self) -> usize {
        self.ndep
    }

    #[inline]
    pub fn npix(&self) -> usize {
        self.models.len()
    }

    pub fn model(&self, y: usize, x: usize) -> &DepthModel {
        &self.models[y * self.nx + x]
    }

    pub fn model_mut(&mut self, y: usize, x: usize) -> &mut DepthModel {
        &mut self.models[y * self.nx + x]
    }

    pub fn pixel(&self, idx: PixelIndex) -> &DepthModel {
        &self.models[idx]
    }

    pub fn pixel_mut(&mut self, idx: PixelIndex) -> &mut DepthModel {
        &mut self.models[idx]
    }

    pub fn models(&self) -> &[DepthModel] {
        &self.models
    }

    pub fn models_mut(&mut self) -> &mut [DepthModel] {
        &mut self.models
    }

    /// Top boundary value of each pixel, row-major.
    pub fn boundary_values(&self) -> &[f64] {
        &self.boundary
    }

    pub fn boundary_values_mut(&mut self) -> &mut [f64] {
        &mut self.boundary
    }

    /// Which quantity the boundary values hold.
    pub fn boundary_kind(&self) -> BoundaryKind {
        self.boundary_kind
    }

    pub fn set_boundary_kind(&mut self, kind: BoundaryKind) {
        self.boundary_kind = kind;
    }

    /// Pick the boundary quantity from the top of pixel `(0, 0)` and copy
    /// that quantity's top value of every pixel into the boundary values.
    ///
    /// The first non-zero of gas pressure, density and electron density wins.
    /// Returns `None` (and leaves the grid unchanged) when all three are zero.
    pub fn detect_boundary(&mut self) -> Option<BoundaryKind> {
        let first = self.models.first()?;
        if first.ndep() == 0 {
            return None;
        }
        let (kind, field) = if first.pgas()[0] > 0.0 {
            (BoundaryKind::GasPressure, Field::Pgas)
        } else if first.rho()[0] > 0.0 {
            (BoundaryKind::Density, Field::Rho)
        } else if first.nne()[0] > 0.0 {
            (BoundaryKind::ElectronDensity, Field::Nne)
        } else {
            return None;
        };

        for (value, model) in self.boundary.iter_mut().zip(&self.models) {
            *value = model.field(field)[0];
        }
        self.boundary_kind = kind;
        info!(boundary = %kind, "top boundary detected");
        Some(kind)
    }

    /// Convert every pixel's boundary value to a gas pressure.
    ///
    /// Density and electron-density boundaries are converted with the
    /// equation of state at the top temperature of each pixel; a gas-pressure
    /// boundary is left as is.
    pub fn convert_boundary<E: EquationOfState + ?Sized>(&mut self, eos: &E) {
        let kind = self.boundary_kind;
        if kind == BoundaryKind::GasPressure || self.ndep == 0 {
            return;
        }
        for (value, model) in self.boundary.iter_mut().zip(&self.models) {
            let t = model.temp()[0];
            let state = match kind {
                BoundaryKind::GasPressure => continue,
                BoundaryKind::Density => eos.from_t_rho(t, *value),
                BoundaryKind::DensityAlt => eos.nne_from_t_rho(t, *value),
                BoundaryKind::ElectronDensity => eos.from_t_nne(t, *value),
                BoundaryKind::ElectronPressure => eos.from_t_pel(t, *value),
            };
            *value = state.pgas;
        }
        debug!(from = %kind, "boundary values converted to gas pressure");
        self.boundary_kind = BoundaryKind::GasPressure;
    }

    /// Expand every pixel from its node parameters.
    ///
    /// `params` holds `npix` consecutive vectors of `nodes.npar()` values.
    pub fn expand_all(
        &mut self,
        nodes: &NodeSet,
        params: &[f64],
        interpolation: Interpolation,
    ) -> Result<(), NodeError> {
        let npar = nodes.npar();
        self.check_param_map(npar, params)?;
        if npar == 0 {
            return Ok(());
        }
        for (model, p) in self.models.iter_mut().zip(params.chunks_exact(npar)) {
            model.expand(nodes, p, interpolation)?;
        }
        Ok(())
    }

    /// Parallel version of [`DepthModelGrid::expand_all`].
    #[cfg(feature = "parallel")]
    pub fn expand_all_parallel(
        &mut self,
        nodes: &NodeSet,
        params: &[f64],
        interpolation: Interpolation,
    ) -> Result<(), NodeError> {
        use rayon::prelude::*;

        let npar = nodes.npar();
        self.check_param_map(npar, params)?;
        if npar == 0 {
            return Ok(());
        }
        self.models
            .par_iter_mut()
            .zip(params.par_chunks_exact(npar))
            .try_for_each(|(model, p)| model.expand(nodes, p, interpolation))
    }

    fn check_param_map(&self, npar: usize, params: &[f64]) -> Result<(), NodeError> {
        let expected = npar * self.npix();
        if params.len() != expected {
            return Err(NodeError::ParameterLength {
                expected,
                got: params.len(),
            });
        }
        Ok(())
    }

    /// Compress every pixel back onto the node layout.
    ///
    /// Returns `npix` consecutive parameter vectors. The boundary multiplier,
    /// when inverted, is set to `1.0`.
    pub fn model_parameters(&self, nodes: &NodeSet) -> Vec<f64> {
        let npar = nodes.npar();
        let mut out = vec![0.0; npar * self.npix()];
        if npar == 0 {
            return out;
        }
        for (model, p) in self.models.iter().zip(out.chunks_exact_mut(npar)) {
            compress_model(model, nodes, p);
        }
        out
    }
}

fn compress_model(model: &DepthModel, nodes: &NodeSet, params: &mut [f64]) {
    for quantity in nodes.inverted() {
        let Some(slot) = nodes.param_slice_mut(quantity, params) else {
            continue;
        };
        match quantity.field() {
            Some(field) => {
                compress_into(model.ltau(), model.field(field), nodes.nodes(quantity), slot)
            }
            None => slot.fill(1.0),
        }
    }
}
