//! Scale solver: densities, depth scales, top boundary and pressure scale.

use tracing::{debug, trace};

use super::ScaleError;
use crate::equations::{BK, EquationOfState, KnownDensity};
use crate::model::DepthModel;
use crate::types::{BoundaryKind, DepthScale, DepthType};

/// Relative tolerance handed to the equation of state.
pub const SCALE_TOLERANCE: f64 = 1.0e-5;

/// Wavelength of the reference optical-depth scale (Å).
pub const REFERENCE_WAVELENGTH: f64 = 5000.0;

/// Top gas pressure used when no boundary value is known (dyn/cm²).
pub const DEFAULT_PGAS: f64 = 0.1;

/// Derives mutually consistent densities and depth scales of a column.
///
/// # Example
///
/// ```
/// use atmos_rs::equations::IdealGasEos;
/// use atmos_rs::model::DepthModel;
/// use atmos_rs::scales::ScaleSolver;
/// use atmos_rs::types::DepthScale;
///
/// let mut model = DepthModel::new(4);
/// model.temp_mut().fill(5500.0);
/// model.ltau_mut().copy_from_slice(&[-3.0, -2.0, -1.0, 0.0]);
/// model.pgas_mut().copy_from_slice(&[1.0e2, 1.0e3, 1.0e4, 1.0e5]);
///
/// let mut eos = IdealGasEos::new();
/// let scale = ScaleSolver::new().resolve_scales(&mut model, &mut eos, false).unwrap();
/// assert_eq!(scale, DepthScale::OpticalDepth);
/// assert!((model.tau()[0] - 1.0e-3).abs() < 1e-15);
/// assert!(model.z().windows(2).all(|w| w[1] < w[0]));
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScaleSolver {
    pub tolerance: f64,
    pub reference_wavelength: f64,
    pub default_pgas: f64,
}

impl Default for ScaleSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ScaleSolver {
    pub fn new() -> Self {
        Self {
            tolerance: SCALE_TOLERANCE,
            reference_wavelength: REFERENCE_WAVELENGTH,
            default_pgas: DEFAULT_PGAS,
        }
    }

    pub fn with_default_pgas(mut self, pgas: f64) -> Self {
        self.default_pgas = pgas;
        self
    }

    /// Pick the known density (pgas > rho > nne, first with a non-zero sum)
    /// and let the equation of state fill the others.
    pub fn fill_densities<E: EquationOfState + ?Sized>(
        &self,
        model: &mut DepthModel,
        eos: &mut E,
        keep_nne: bool,
    ) -> Result<KnownDensity, ScaleError> {
        let sum = |v: &[f64]| v.iter().sum::<f64>();
        let known = if sum(model.pgas()) > 0.0 {
            KnownDensity::Pgas
        } else if sum(model.rho()) > 0.0 {
            KnownDensity::Rho
        } else if sum(model.nne()) > 0.0 {
            KnownDensity::Nne
        } else {
            KnownDensity::None
        };
        trace!(?known, "filling densities");
        eos.fill_densities(model, known, keep_nne, self.tolerance)?;
        Ok(known)
    }

    /// The known depth scale: first non-zero of |ltau|, |z|, |cmass| sums.
    pub fn detect_scale(model: &DepthModel) -> Result<DepthScale, ScaleError> {
        let abs_sum = |v: &[f64]| v.iter().map(|x| x.abs()).sum::<f64>();
        if abs_sum(model.ltau()) > 0.0 {
            Ok(DepthScale::OpticalDepth)
        } else if abs_sum(model.z()) > 0.0 {
            Ok(DepthScale::Height)
        } else if abs_sum(model.cmass()) > 0.0 {
            Ok(DepthScale::ColumnMass)
        } else {
            Err(ScaleError::DegenerateScale)
        }
    }

    /// Derive the two unknown depth scales from the known one.
    ///
    /// Uses the partial pressures cached in `eos`, so densities must have been
    /// filled first.
    pub fn get_scales<E: EquationOfState + ?Sized>(
        &self,
        model: &mut DepthModel,
        eos: &E,
        scale: DepthScale,
    ) -> Result<(), ScaleError> {
        let ndep = model.ndep();
        let needed = match scale {
            DepthScale::ColumnMass => 3,
            DepthScale::OpticalDepth | DepthScale::Height => 2,
        };
        if ndep < needed {
            return Err(ScaleError::TooFewPoints { needed, got: ndep });
        }

        let kappa: Vec<f64> = model
            .temp()
            .iter()
            .enumerate()
            .map(|(k, &t)| eos.cont_opacity(t, self.reference_wavelength, eos.partial_pressures(k)))
            .collect();

        let cols = model.columns_mut();
        match scale {
            DepthScale::OpticalDepth => {
                cols.tau[0] = 10f64.powf(cols.ltau[0]);
                cols.cmass[0] = cols.tau[0] / kappa[0] * cols.rho[0];
                cols.z[0] = 0.0;
                for k in 1..ndep {
                    cols.tau[k] = 10f64.powf(cols.ltau[k]);
                    let dtau = cols.tau[k] - cols.tau[k - 1];
                    cols.z[k] = cols.z[k - 1] - 2.0 * dtau / (kappa[k] + kappa[k - 1]);
                    let dz = cols.z[k - 1] - cols.z[k];
                    cols.cmass[k] = cols.cmass[k - 1] + 0.5 * (cols.rho[k - 1] + cols.rho[k]) * dz;
                }
            }
            DepthScale::Height => {
                let top = eos.partial_pressures(0);
                cols.tau[0] = 0.5 * kappa[0] * (cols.z[0] - cols.z[1]);
                cols.cmass[0] = (top.na + top.ne) * BK * cols.temp[0] / eos.gravity();
                cols.ltau[0] = cols.tau[0].log10();
                for k in 1..ndep {
                    let dz = cols.z[k - 1] - cols.z[k];
                    cols.tau[k] = cols.tau[k - 1] + 0.5 * (kappa[k - 1] + kappa[k]) * dz;
                    cols.cmass[k] = cols.cmass[k - 1] + 0.5 * (cols.rho[k - 1] + cols.rho[k]) * dz;
                    cols.ltau[k] = cols.tau[k].log10();
                }
            }
            DepthScale::ColumnMass => {
                cols.z[0] = 0.0;
                cols.tau[0] = 0.0;
                for k in 1..ndep {
                    let dm = cols.cmass[k] - cols.cmass[k - 1];
                    cols.z[k] = cols.z[k - 1] - 2.0 * dm / (cols.rho[k - 1] + cols.rho[k]);
                    let dz = cols.z[k - 1] - cols.z[k];
                    cols.tau[k] = cols.tau[k - 1] + 0.5 * (kappa[k - 1] + kappa[k]) * dz;
                }

                // Log-linear extrapolation of the top optical depth.
                let offset = (2.0 * cols.tau[1].ln() - cols.tau[2].ln()).exp();
                if !(offset.is_finite() && offset > 0.0) {
                    return Err(ScaleError::NonFiniteScale);
                }
                for (tau, ltau) in cols.tau.iter_mut().zip(cols.ltau.iter_mut()) {
                    *tau += offset;
                    *ltau = tau.log10();
                }
            }
        }

        if cols.tau.iter().chain(cols.z.iter()).chain(cols.cmass.iter()).any(|v| !v.is_finite()) {
            return Err(ScaleError::NonFiniteScale);
        }
        Ok(())
    }

    /// Resolve the top gas pressure from whichever top quantity is known.
    pub fn fix_boundary<E: EquationOfState + ?Sized>(
        &self,
        model: &mut DepthModel,
        eos: &E,
        boundary: BoundaryKind,
    ) -> Result<(), ScaleError> {
        if model.ndep() == 0 {
            return Err(ScaleError::TooFewPoints { needed: 1, got: 0 });
        }
        let cols = model.columns_mut();
        let t = cols.temp[0];
        let state = match boundary {
            BoundaryKind::GasPressure => {
                cols.pgas[0] = self.default_pgas;
                return Ok(());
            }
            BoundaryKind::Density => eos.from_t_rho(t, cols.rho[0]),
            BoundaryKind::DensityAlt => eos.nne_from_t_rho(t, cols.rho[0]),
            BoundaryKind::ElectronDensity => eos.from_t_nne(t, cols.nne[0]),
            BoundaryKind::ElectronPressure => eos.from_t_pel(t, cols.pel[0]),
        };
        cols.pgas[0] = state.pgas;
        cols.rho[0] = state.rho;
        cols.nne[0] = state.nne;
        cols.pel[0] = state.pel;
        if !(state.pgas.is_finite() && state.pgas > 0.0) {
            return Err(ScaleError::NonFiniteScale);
        }
        Ok(())
    }

    /// [`ScaleSolver::fix_boundary`] for a raw boundary code.
    pub fn fix_boundary_code<E: EquationOfState + ?Sized>(
        &self,
        model: &mut DepthModel,
        eos: &E,
        code: i32,
    ) -> Result<(), ScaleError> {
        let boundary = BoundaryKind::try_from(code)?;
        self.fix_boundary(model, eos, boundary)
    }

    /// Fix the top boundary, then integrate hydrostatic equilibrium down the
    /// column.
    pub fn get_pressure_scale<E: EquationOfState + ?Sized>(
        &self,
        model: &mut DepthModel,
        eos: &mut E,
        depth_type: DepthType,
        boundary: BoundaryKind,
    ) -> Result<(), ScaleError> {
        self.fix_boundary(model, eos, boundary)?;
        let pgas_top = model.pgas()[0];
        debug!(%boundary, pgas_top, "hydrostatic equilibrium");
        eos.hydrostatic(model, depth_type, pgas_top, self.tolerance)
    }

    /// Fill densities, detect the known depth scale and derive the others.
    pub fn resolve_scales<E: EquationOfState + ?Sized>(
        &self,
        model: &mut DepthModel,
        eos: &mut E,
        keep_nne: bool,
    ) -> Result<DepthScale, ScaleError> {
        self.fill_densities(model, eos, keep_nne)?;
        let scale = Self::detect_scale(model)?;
        self.get_scales(model, eos, scale)?;
        Ok(scale)
    }
}
