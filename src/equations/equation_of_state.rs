//! Equation of state for a stellar atmosphere column.
//!
//! The [`EquationOfState`] trait is the contract the scale solver and the
//! worker need: closure relations between temperature and one known density,
//! a continuum opacity, a per-depth cache of partial pressures and a
//! hydrostatic-equilibrium integrator.
//!
//! [`IdealGasEos`] is a compact reference implementation: an ideal gas with
//! a temperature-dependent ionization fraction and an H⁻-like continuum
//! opacity. It is accurate enough to exercise every code path of the crate,
//! not to synthesize real spectra.
//!
//! # Units
//!
//! CGS throughout: K, dyn/cm², g/cm³, cm⁻³, cm.
//!
//! # State
//!
//! Implementations keep partial pressures per depth point between calls.
//! They are owned by one worker and are not re-entrant within one pixel.

use tracing::debug;

use crate::model::DepthModel;
use crate::scales::ScaleError;
use crate::types::DepthType;

/// Boltzmann constant (erg/K).
pub const BK: f64 = 1.380_649e-16;

/// Atomic mass unit (g).
pub const AMU: f64 = 1.660_539_066_6e-24;

/// Solar surface gravity (cm/s²).
pub const GRAVITY_SUN: f64 = 27_542.287;

/// Thomson scattering cross section (cm²).
const SIGMA_THOMSON: f64 = 6.652_458_7e-25;

/// Which density is known when filling a column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KnownDensity {
    Pgas,
    Rho,
    Nne,
    /// Nothing known; the implementation decides (or fails).
    None,
}

/// Partial pressures cached per depth point, as particle densities.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PartialPressures {
    /// Heavy-particle (atoms and ions) number density (cm⁻³).
    pub na: f64,
    /// Electron number density (cm⁻³).
    pub ne: f64,
}

/// Thermodynamic state at one depth point.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ThermoState {
    pub pgas: f64,
    pub rho: f64,
    pub nne: f64,
    pub pel: f64,
    pub partial: PartialPressures,
}

/// Closure relations required by the scale solver and the worker.
pub trait EquationOfState {
    /// Surface gravity used by hydrostatic equilibrium (cm/s²).
    fn gravity(&self) -> f64;

    /// State from temperature and gas pressure.
    fn from_t_pg(&self, t: f64, pgas: f64) -> ThermoState;

    /// State from temperature and mass density.
    fn from_t_rho(&self, t: f64, rho: f64) -> ThermoState;

    /// State from temperature and mass density, solving for the electron
    /// density first.
    ///
    /// Used by the alternate density boundary (code 2). The default forwards
    /// to [`EquationOfState::from_t_rho`], and [`IdealGasEos`] keeps it, so
    /// with the reference equation of state codes 1 and 2 give the same top
    /// pressure. Equations of state with a distinct electron-density
    /// iteration override it.
    fn nne_from_t_rho(&self, t: f64, rho: f64) -> ThermoState {
        self.from_t_rho(t, rho)
    }

    /// State from temperature and electron density.
    fn from_t_nne(&self, t: f64, nne: f64) -> ThermoState;

    /// State from temperature and electron pressure.
    fn from_t_pel(&self, t: f64, pel: f64) -> ThermoState;

    /// State from temperature, gas pressure and a fixed electron density.
    fn from_t_pg_nne(&self, t: f64, pgas: f64, nne: f64) -> ThermoState;

    /// Continuum opacity per unit length (cm⁻¹) at wavelength `wav` (Å).
    fn cont_opacity(&self, t: f64, wav: f64, partial: PartialPressures) -> f64;

    /// Cache the partial pressures of depth point `k` of an `ndep` column.
    fn store_partial_pressures(&mut self, ndep: usize, k: usize, partial: PartialPressures);

    /// Cached partial pressures of depth point `k`.
    fn partial_pressures(&self, k: usize) -> PartialPressures;

    /// Fill the two unknown densities and the electron pressure of `model`.
    ///
    /// With `keep_nne` a non-zero electron density already in the column is
    /// preserved. `tol` is the relative tolerance of iterative solves.
    fn fill_densities(
        &mut self,
        model: &mut DepthModel,
        known: KnownDensity,
        keep_nne: bool,
        tol: f64,
    ) -> Result<(), ScaleError>;

    /// Integrate hydrostatic equilibrium down the column starting from
    /// `pgas_top`, filling pressures, densities, height and column mass.
    ///
    /// For depth types other than [`DepthType::Ltau500`] the optical depth
    /// scale is derived as well.
    fn hydrostatic(
        &mut self,
        model: &mut DepthModel,
        depth_type: DepthType,
        pgas_top: f64,
        tol: f64,
    ) -> Result<(), ScaleError>;
}

/// Ideal gas with a temperature-dependent ionization fraction.
#[derive(Clone, Debug)]
pub struct IdealGasEos {
    /// Mean mass per heavy particle in AMU.
    pub mu: f64,
    /// Surface gravity (cm/s²).
    pub gravity: f64,
    /// Ionization floor from easily ionized metals.
    pub metal_fraction: f64,
    /// Temperature of half hydrogen ionization (K).
    pub t_ion: f64,
    /// Width of the hydrogen ionization transition (K).
    pub dt_ion: f64,
    /// Coefficient of the H⁻-like bound-free opacity (cm⁵).
    pub hminus_coeff: f64,
    /// Maximum Newton iterations per depth point.
    pub max_iter: usize,
    partial: Vec<PartialPressures>,
}

impl Default for IdealGasEos {
    fn default() -> Self {
        Self::new()
    }
}

impl IdealGasEos {
    /// Solar-like defaults.
    pub fn new() -> Self {
        Self {
            mu: 1.4,
            gravity: GRAVITY_SUN,
            metal_fraction: 1.0e-4,
            t_ion: 10_000.0,
            dt_ion: 700.0,
            hminus_coeff: 1.0e-37,
            max_iter: 50,
            partial: Vec::new(),
        }
    }

    /// Same gas with another surface gravity.
    pub fn with_gravity(mut self, gravity: f64) -> Self {
        self.gravity = gravity;
        self
    }

    /// Electrons per heavy particle at temperature `t`.
    pub fn ionization(&self, t: f64) -> f64 {
        let hydrogen = 1.0 / (1.0 + ((self.t_ion - t) / self.dt_ion).exp());
        self.metal_fraction + (1.0 - self.metal_fraction) * hydrogen
    }

    fn state_from_na(&self, t: f64, na: f64, nne: f64) -> ThermoState {
        ThermoState {
            pgas: (na + nne) * BK * t,
            rho: na * self.mu * AMU,
            nne,
            pel: nne * BK * t,
            partial: PartialPressures { na, ne: nne },
        }
    }

    /// `g·rho/kappa` at depth, the right-hand side of `dP/dtau`.
    fn pressure_gradient(&self, t: f64, pgas: f64) -> f64 {
        let state = self.from_t_pg(t, pgas);
        let kappa = self.cont_opacity(t, 5000.0, state.partial);
        if kappa > 0.0 {
            self.gravity * state.rho / kappa
        } else {
            0.0
        }
    }

    /// Solve `P = p_prev + 0.5·dtau·(f_prev + f(P))` by Newton iteration.
    fn tau_step(&self, t: f64, p_prev: f64, f_prev: f64, dtau: f64, tol: f64) -> f64 {
        let residual = |p: f64| p - p_prev - 0.5 * dtau * (f_prev + self.pressure_gradient(t, p));

        let mut p = (p_prev + dtau * f_prev).max(p_prev);
        if p <= 0.0 {
            p = f64::MIN_POSITIVE.max(p_prev);
        }
        for _ in 0..self.max_iter {
            let r = residual(p);
            let dp = 1.0e-6 * p;
            let slope = (residual(p + dp) - r) / dp;
            if slope == 0.0 || !slope.is_finite() {
                break;
            }
            let mut next = p - r / slope;
            if next <= 0.0 {
                next = 0.5 * p;
            }
            let converged = ((next - p) / p).abs() < tol;
            p = next;
            if converged {
                return p;
            }
        }
        debug!(pgas = p, "hydrostatic step did not reach tolerance");
        p
    }

    fn store_state(&mut self, model: &mut DepthModel, k: usize, state: ThermoState) {
        let ndep = model.ndep();
        let cols = model.columns_mut();
        cols.pgas[k] = state.pgas;
        cols.rho[k] = state.rho;
        cols.nne[k] = state.nne;
        cols.pel[k] = state.pel;
        self.store_partial_pressures(ndep, k, state.partial);
    }
}

impl EquationOfState for IdealGasEos {
    fn gravity(&self) -> f64 {
        self.gravity
    }

    fn from_t_pg(&self, t: f64, pgas: f64) -> ThermoState {
        let x = self.ionization(t);
        let na = pgas / ((1.0 + x) * BK * t);
        self.state_from_na(t, na, x * na)
    }

    fn from_t_rho(&self, t: f64, rho: f64) -> ThermoState {
        let na = rho / (self.mu * AMU);
        self.state_from_na(t, na, self.ionization(t) * na)
    }

    fn from_t_nne(&self, t: f64, nne: f64) -> ThermoState {
        let na = nne / self.ionization(t);
        self.state_from_na(t, na, nne)
    }

    fn from_t_pel(&self, t: f64, pel: f64) -> ThermoState {
        self.from_t_nne(t, pel / (BK * t))
    }

    fn from_t_pg_nne(&self, t: f64, pgas: f64, nne: f64) -> ThermoState {
        // Total particle density is fixed by the pressure.
        let ntot = pgas / (BK * t);
        let floor = 1.0e-3 * ntot;
        if ntot - nne >= floor {
            self.state_from_na(t, ntot - nne, nne)
        } else {
            self.state_from_na(t, floor, ntot - floor)
        }
    }

    fn cont_opacity(&self, t: f64, wav: f64, partial: PartialPressures) -> f64 {
        let theta = 5040.0 / t;
        let bound_free =
            self.hminus_coeff * partial.na * partial.ne * theta.powf(1.5) * (wav / 5000.0);
        bound_free + SIGMA_THOMSON * partial.ne
    }

    fn store_partial_pressures(&mut self, ndep: usize, k: usize, partial: PartialPressures) {
        if self.partial.len() != ndep {
            self.partial.resize(ndep, PartialPressures::default());
        }
        if let Some(slot) = self.partial.get_mut(k) {
            *slot = partial;
        }
    }

    fn partial_pressures(&self, k: usize) -> PartialPressures {
        self.partial.get(k).copied().unwrap_or_default()
    }

    fn fill_densities(
        &mut self,
        model: &mut DepthModel,
        known: KnownDensity,
        keep_nne: bool,
        _tol: f64,
    ) -> Result<(), ScaleError> {
        if known == KnownDensity::None {
            return Err(ScaleError::NoDensityScale);
        }
        for k in 0..model.ndep() {
            let cols = model.columns();
            let t = cols.temp[k];
            let nne = cols.nne[k];
            let state = match known {
                KnownDensity::Pgas if keep_nne && nne > 0.0 => {
                    self.from_t_pg_nne(t, cols.pgas[k], nne)
                }
                KnownDensity::Pgas => self.from_t_pg(t, cols.pgas[k]),
                KnownDensity::Rho if keep_nne && nne > 0.0 => {
                    let base = self.from_t_rho(t, cols.rho[k]);
                    self.from_t_pg_nne(t, base.pgas, nne)
                }
                KnownDensity::Rho => self.from_t_rho(t, cols.rho[k]),
                KnownDensity::Nne | KnownDensity::None => self.from_t_nne(t, nne),
            };
            self.store_state(model, k, state);
        }
        Ok(())
    }

    fn hydrostatic(
        &mut self,
        model: &mut DepthModel,
        depth_type: DepthType,
        pgas_top: f64,
        tol: f64,
    ) -> Result<(), ScaleError> {
        let ndep = model.ndep();
        if ndep == 0 {
            return Ok(());
        }
        if !(pgas_top.is_finite() && pgas_top > 0.0) {
            return Err(ScaleError::NonFiniteScale);
        }
        let g = self.gravity;

        match depth_type {
            DepthType::Ltau500 => {
                let t0 = model.temp()[0];
                let top = self.from_t_pg(t0, pgas_top);
                self.store_state(model, 0, top);
                let mut f_prev = self.pressure_gradient(t0, pgas_top);
                for k in 1..ndep {
                    let (t, dtau, p_prev) = {
                        let cols = model.columns();
                        (cols.temp[k], cols.tau[k] - cols.tau[k - 1], cols.pgas[k - 1])
                    };
                    let p = self.tau_step(t, p_prev, f_prev, dtau, tol);
                    let state = self.from_t_pg(t, p);
                    self.store_state(model, k, state);
                    f_prev = self.pressure_gradient(t, p);
                }
                let kappa: Vec<f64> = (0..ndep)
                    .map(|k| self.cont_opacity(model.temp()[k], 5000.0, self.partial_pressures(k)))
                    .collect();
                let cols = model.columns_mut();
                cols.z[0] = 0.0;
                cols.cmass[0] = cols.pgas[0] / g;
                for k in 1..ndep {
                    let dtau = cols.tau[k] - cols.tau[k - 1];
                    cols.z[k] = cols.z[k - 1] - 2.0 * dtau / (kappa[k] + kappa[k - 1]);
                    cols.cmass[k] = cols.pgas[k] / g;
                }
            }
            DepthType::Cmass => {
                for k in 0..ndep {
                    let (t, m) = (model.temp()[k], model.cmass()[k]);
                    let p = if k == 0 && m <= 0.0 { pgas_top } else { g * m };
                    let state = self.from_t_pg(t, p);
                    self.store_state(model, k, state);
                }
                let kappa = self.opacity_column(model);
                let cols = model.columns_mut();
                cols.cmass[0] = cols.pgas[0] / g;
                cols.z[0] = 0.0;
                cols.tau[0] = kappa[0] / cols.rho[0] * cols.cmass[0];
                for k in 1..ndep {
                    let dm = cols.cmass[k] - cols.cmass[k - 1];
                    cols.z[k] = cols.z[k - 1] - 2.0 * dm / (cols.rho[k - 1] + cols.rho[k]);
                    let dz = cols.z[k - 1] - cols.z[k];
                    cols.tau[k] = cols.tau[k - 1] + 0.5 * (kappa[k - 1] + kappa[k]) * dz;
                }
                for (ltau, &tau) in cols.ltau.iter_mut().zip(cols.tau.iter()) {
                    *ltau = tau.log10();
                }
            }
            DepthType::Z => {
                let t0 = model.temp()[0];
                let top = self.from_t_pg(t0, pgas_top);
                self.store_state(model, 0, top);
                for k in 1..ndep {
                    let (t, dz, p_prev, rho_prev) = {
                        let cols = model.columns();
                        (cols.temp[k], cols.z[k - 1] - cols.z[k], cols.pgas[k - 1], cols.rho[k - 1])
                    };
                    // rho is linear in P for an ideal gas at fixed T.
                    let c = self.from_t_pg(t, 1.0).rho;
                    let half = 0.5 * g * dz;
                    let denom = 1.0 - half * c;
                    let p = if denom > 0.0 {
                        (p_prev + half * rho_prev) / denom
                    } else {
                        p_prev + 2.0 * half * rho_prev
                    };
                    let state = self.from_t_pg(t, p);
                    self.store_state(model, k, state);
                }
                let kappa = self.opacity_column(model);
                let cols = model.columns_mut();
                for k in 0..ndep {
                    cols.cmass[k] = cols.pgas[k] / g;
                }
                cols.tau[0] = kappa[0] / cols.rho[0] * cols.cmass[0];
                for k in 1..ndep {
                    let dz = cols.z[k - 1] - cols.z[k];
                    cols.tau[k] = cols.tau[k - 1] + 0.5 * (kappa[k - 1] + kappa[k]) * dz;
                }
                for (ltau, &tau) in cols.ltau.iter_mut().zip(cols.tau.iter()) {
                    *ltau = tau.log10();
                }
            }
        }

        if model.pgas().iter().any(|p| !p.is_finite()) {
            return Err(ScaleError::NonFiniteScale);
        }
        Ok(())
    }
}

impl IdealGasEos {
    fn opacity_column(&self, model: &DepthModel) -> Vec<f64> {
        model
            .temp()
            .iter()
            .enumerate()
            .map(|(k, &t)| self.cont_opacity(t, 5000.0, self.partial_pressures(k)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rel(a: f64, b: f64) -> f64 {
        ((a - b) / b).abs()
    }

    #[test]
    fn test_closures_are_consistent() {
        let eos = IdealGasEos::new();
        let t = 5500.0;
        let from_pg = eos.from_t_pg(t, 1.0e5);

        let from_rho = eos.from_t_rho(t, from_pg.rho);
        assert!(rel(from_rho.pgas, 1.0e5) < 1e-12);

        let from_nne = eos.from_t_nne(t, from_pg.nne);
        assert!(rel(from_nne.rho, from_pg.rho) < 1e-12);

        let from_pel = eos.from_t_pel(t, from_pg.pel);
        assert!(rel(from_pel.pgas, 1.0e5) < 1e-12);
    }

    #[test]
    fn test_ionization_increases_with_temperature() {
        let eos = IdealGasEos::new();
        let x: Vec<f64> = [3000.0, 6000.0, 9000.0, 15000.0]
            .iter()
            .map(|&t| eos.ionization(t))
            .collect();
        assert!(x.windows(2).all(|w| w[1] > w[0]));
        assert!(x[0] >= eos.metal_fraction);
        assert!(x[3] < 1.0 + 1e-12);
    }

    #[test]
    fn test_fixed_nne_keeps_pressure() {
        let eos = IdealGasEos::new();
        let base = eos.from_t_pg(6000.0, 2.0e4);
        let enhanced = eos.from_t_pg_nne(6000.0, 2.0e4, 3.0 * base.nne);
        assert!(rel(enhanced.pgas, 2.0e4) < 1e-12);
        assert!(enhanced.rho < base.rho);
    }

    #[test]
    fn test_partial_pressure_cache() {
        let mut eos = IdealGasEos::new();
        let pp = PartialPressures { na: 1e17, ne: 1e13 };
        eos.store_partial_pressures(4, 2, pp);
        assert_eq!(eos.partial_pressures(2), pp);
        assert_eq!(eos.partial_pressures(0), PartialPressures::default());
        assert_eq!(eos.partial_pressures(9), PartialPressures::default());
    }

    #[test]
    fn test_fill_without_scale_fails() {
        let mut eos = IdealGasEos::new();
        let mut model = DepthModel::new(3);
        model.temp_mut().fill(5000.0);
        let err = eos
            .fill_densities(&mut model, KnownDensity::None, false, 1e-5)
            .unwrap_err();
        assert_eq!(err, ScaleError::NoDensityScale);
    }

    #[test]
    fn test_hydrostatic_tau_increases_pressure() {
        let mut eos = IdealGasEos::new();
        let mut model = DepthModel::new(6);
        model.temp_mut().copy_from_slice(&[4500.0, 4600.0, 4800.0, 5200.0, 6000.0, 7000.0]);
        model.ltau_mut().copy_from_slice(&[-4.0, -3.0, -2.0, -1.0, 0.0, 1.0]);
        model.ltau_to_tau();
        eos.hydrostatic(&mut model, DepthType::Ltau500, 0.1, 1e-5).unwrap();

        let pgas = model.pgas();
        assert!(rel(pgas[0], 0.1) < 1e-12);
        assert!(pgas.windows(2).all(|w| w[1] > w[0]));
        assert!(model.z().windows(2).all(|w| w[1] < w[0]));
        assert!(model.cmass().windows(2).all(|w| w[1] > w[0]));
        assert!(model.rho().iter().all(|&r| r > 0.0));
    }

    #[test]
    fn test_hydrostatic_height_scale() {
        let mut eos = IdealGasEos::new();
        let mut model = DepthModel::new(5);
        model.temp_mut().fill(5000.0);
        model.z_mut().copy_from_slice(&[4.0e7, 3.0e7, 2.0e7, 1.0e7, 0.0]);
        eos.hydrostatic(&mut model, DepthType::Z, 10.0, 1e-5).unwrap();

        assert!(model.pgas().windows(2).all(|w| w[1] > w[0]));
        assert!(model.tau().iter().all(|t| t.is_finite() && *t > 0.0));
        assert!(model.ltau().windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn test_hydrostatic_rejects_bad_top_pressure() {
        let mut eos = IdealGasEos::new();
        let mut model = DepthModel::new(3);
        assert_eq!(
            eos.hydrostatic(&mut model, DepthType::Ltau500, 0.0, 1e-5),
            Err(ScaleError::NonFiniteScale)
        );
    }
}
