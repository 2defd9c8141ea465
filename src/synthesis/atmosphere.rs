//! The atmosphere: synthesis, parameter checks and response functions.

use std::fmt;
use std::str::FromStr;

use tracing::trace;

use super::SynthesisError;
use super::instrument::BoxedInstrument;
use super::traits::BoxedSynthesizer;
use crate::equations::{EquationOfState, PartialPressures};
use crate::model::{DepthModel, Field};
use crate::nodes::{NQUANTITIES, NodeError, NodeSet, Quantity};
use crate::scales::{ScaleError, ScaleSolver, nne_enhance};
use crate::types::{BoundaryKind, DepthType, Interpolation};
use crate::worker::ConfigError;

/// Radiative-transfer regime, selected once from configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AtmosKind {
    /// Local thermodynamic equilibrium.
    #[default]
    Lte,
    /// Non-LTE with level populations kept between calls.
    NonLte,
}

impl FromStr for AtmosKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lte" => Ok(Self::Lte),
            "nlte" | "rh" => Ok(Self::NonLte),
            _ => Err(ConfigError::UnknownAtmosphere(s.to_string())),
        }
    }
}

impl fmt::Display for AtmosKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lte => f.write_str("lte"),
            Self::NonLte => f.write_str("nlte"),
        }
    }
}

/// Number of depth-resolved response channels.
pub const NCHANNELS: usize = 8;

/// Physical quantity of a depth-resolved response function.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResponseChannel {
    Temp = 0,
    Vlos = 1,
    Vturb = 2,
    B = 3,
    Inc = 4,
    Azi = 5,
    Pgas = 6,
    Rho = 7,
}

impl ResponseChannel {
    pub const ALL: [ResponseChannel; NCHANNELS] = [
        ResponseChannel::Temp,
        ResponseChannel::Vlos,
        ResponseChannel::Vturb,
        ResponseChannel::B,
        ResponseChannel::Inc,
        ResponseChannel::Azi,
        ResponseChannel::Pgas,
        ResponseChannel::Rho,
    ];

    pub const fn field(self) -> Field {
        match self {
            ResponseChannel::Temp => Field::Temp,
            ResponseChannel::Vlos => Field::Vlos,
            ResponseChannel::Vturb => Field::Vturb,
            ResponseChannel::B => Field::B,
            ResponseChannel::Inc => Field::Inc,
            ResponseChannel::Azi => Field::Azi,
            ResponseChannel::Pgas => Field::Pgas,
            ResponseChannel::Rho => Field::Rho,
        }
    }

    /// Pressure and density are perturbed relative to their value.
    const fn is_relative(self) -> bool {
        matches!(self, ResponseChannel::Pgas | ResponseChannel::Rho)
    }
}

/// Valid range and finite-difference scale of each node quantity.
#[derive(Clone, Debug, PartialEq)]
pub struct ParameterRanges {
    min: [f64; NQUANTITIES],
    max: [f64; NQUANTITIES],
    scale: [f64; NQUANTITIES],
}

impl Default for ParameterRanges {
    fn default() -> Self {
        use std::f64::consts::PI;
        Self {
            //    temp      vlos     vturb   B       inc  azi  pgas
            min: [2500.0, -1.5e6, 0.0, 0.0, 0.0, 0.0, 0.01],
            max: [80000.0, 1.5e6, 1.0e6, 5000.0, PI, PI, 100.0],
            scale: [2000.0, 2.0e5, 5.0e4, 500.0, 0.5, 0.5, 1.0],
        }
    }
}

impl ParameterRanges {
    pub fn with_range(mut self, quantity: Quantity, min: f64, max: f64) -> Self {
        self.min[quantity.index()] = min;
        self.max[quantity.index()] = max;
        self
    }

    pub fn with_scale(mut self, quantity: Quantity, scale: f64) -> Self {
        self.scale[quantity.index()] = scale;
        self
    }

    pub fn range(&self, quantity: Quantity) -> (f64, f64) {
        (self.min[quantity.index()], self.max[quantity.index()])
    }

    /// Typical magnitude used to size finite-difference steps.
    pub fn scale(&self, quantity: Quantity) -> f64 {
        self.scale[quantity.index()]
    }

    #[inline]
    pub fn clamp(&self, quantity: Quantity, value: f64) -> f64 {
        let (lo, hi) = self.range(quantity);
        value.max(lo).min(hi)
    }
}

struct InstrumentSlot {
    instrument: BoxedInstrument,
    psf: Vec<f64>,
}

/// An atmosphere bound to one synthesizer, equation of state and set of
/// instruments.
///
/// One atmosphere belongs to one worker. Its collaborators carry state
/// between calls (partial pressures, level populations), so the steps of
/// one pixel must not interleave with another pixel's.
pub struct Atmosphere {
    kind: AtmosKind,
    synthesizer: BoxedSynthesizer,
    eos: Box<dyn EquationOfState>,
    instruments: Vec<InstrumentSlot>,
    nodes: NodeSet,
    ranges: ParameterRanges,
    solver: ScaleSolver,
    interpolation: Interpolation,
    depth_type: DepthType,
    boundary: BoundaryKind,
    centered_derivatives: bool,
    dpar: f64,
}

impl fmt::Debug for Atmosphere {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Atmosphere")
            .field("kind", &self.kind)
            .field("npar", &self.nodes.npar())
            .field("instruments", &self.instruments.len())
            .field("interpolation", &self.interpolation)
            .field("depth_type", &self.depth_type)
            .field("boundary", &self.boundary)
            .finish_non_exhaustive()
    }
}

impl Atmosphere {
    pub fn new(
        kind: AtmosKind,
        synthesizer: BoxedSynthesizer,
        eos: Box<dyn EquationOfState>,
        nodes: NodeSet,
    ) -> Self {
        Self {
            kind,
            synthesizer,
            eos,
            instruments: Vec::new(),
            nodes,
            ranges: ParameterRanges::default(),
            solver: ScaleSolver::new(),
            interpolation: Interpolation::default(),
            depth_type: DepthType::default(),
            boundary: BoundaryKind::default(),
            centered_derivatives: false,
            dpar: 1.0e-3,
        }
    }

    /// Add an instrument with its initial profile.
    pub fn with_instrument(mut self, instrument: BoxedInstrument, psf: Vec<f64>) -> Self {
        self.instruments.push(InstrumentSlot { instrument, psf });
        self
    }

    pub fn with_ranges(mut self, ranges: ParameterRanges) -> Self {
        self.ranges = ranges;
        self
    }

    pub fn with_solver(mut self, solver: ScaleSolver) -> Self {
        self.solver = solver;
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

    pub fn with_boundary(mut self, boundary: BoundaryKind) -> Self {
        self.boundary = boundary;
        self
    }

    pub fn with_centered_derivatives(mut self, centered: bool) -> Self {
        self.centered_derivatives = centered;
        self
    }

    /// Relative finite-difference step.
    pub fn with_dpar(mut self, dpar: f64) -> Self {
        self.dpar = dpar;
        self
    }

    pub fn kind(&self) -> AtmosKind {
        self.kind
    }

    pub fn nodes(&self) -> &NodeSet {
        &self.nodes
    }

    pub fn ranges(&self) -> &ParameterRanges {
        &self.ranges
    }

    pub fn solver(&self) -> ScaleSolver {
        self.solver
    }

    pub fn depth_type(&self) -> DepthType {
        self.depth_type
    }

    pub fn boundary(&self) -> BoundaryKind {
        self.boundary
    }

    pub fn eos(&self) -> &dyn EquationOfState {
        &*self.eos
    }

    pub fn eos_mut(&mut self) -> &mut dyn EquationOfState {
        &mut *self.eos
    }

    pub fn n_wavelengths(&self) -> usize {
        self.synthesizer.n_wavelengths()
    }

    pub fn n_stokes(&self) -> usize {
        self.synthesizer.n_stokes()
    }

    /// Samples per synthetic spectrum.
    pub fn ndata(&self) -> usize {
        self.synthesizer.ndata()
    }

    /// Synthesize `model` into `out`; returns whether the engine converged.
    ///
    /// Population saving is only meaningful for non-LTE and is dropped for LTE.
    pub fn synth(&mut self, model: &DepthModel, out: &mut [f64], save_populations: bool) -> bool {
        let save = save_populations && self.kind == AtmosKind::NonLte;
        self.synthesizer.synth(model, &mut *self.eos, out, save)
    }

    /// Release non-LTE populations saved by previous syntheses.
    pub fn cleanup(&mut self) {
        match self.kind {
            AtmosKind::Lte => {}
            AtmosKind::NonLte => self.synthesizer.cleanup(),
        }
    }

    /// Apply every instrument to `spectrum`.
    pub fn spectral_degrade(&self, spectrum: &mut [f64]) {
        let ns = self.n_stokes();
        for slot in &self.instruments {
            slot.instrument.degrade(ns, spectrum);
        }
    }

    /// Push the current instrumental profiles into the instruments.
    pub fn update_instruments(&mut self) {
        for slot in &mut self.instruments {
            slot.instrument.update(&slot.psf);
        }
    }

    /// Replace the instrumental profile of instrument `i`.
    pub fn set_psf(&mut self, i: usize, psf: Vec<f64>) {
        if let Some(slot) = self.instruments.get_mut(i) {
            slot.psf = psf;
        }
    }

    /// Clamp parameter `index` of the flat vector to its valid range.
    ///
    /// Indices outside the node layout are returned unchanged.
    pub fn check_parameter(&self, value: f64, index: usize) -> f64 {
        match self.nodes.kind_of(index) {
            Some(quantity) => self.ranges.clamp(quantity, value),
            None => value,
        }
    }

    /// Clamp every parameter of `params` in place.
    pub fn clamp_parameters(&self, params: &mut [f64]) {
        for (i, p) in params.iter_mut().enumerate() {
            *p = self.check_parameter(*p, i);
        }
    }

    /// Clamp the depth profiles of the node quantities to their ranges.
    pub fn check_bounds(&self, model: &mut DepthModel) {
        for quantity in Quantity::ALL {
            let Some(field) = quantity.field() else {
                continue;
            };
            for v in model.field_mut(field) {
                *v = self.ranges.clamp(quantity, *v);
            }
        }
    }

    /// Expand `params` onto `model` with the configured interpolation.
    pub fn expand(&self, model: &mut DepthModel, params: &[f64]) -> Result<(), NodeError> {
        model.expand(&self.nodes, params, self.interpolation)
    }

    /// Hydrostatic equilibrium followed by the electron-density enhancement.
    pub fn hydrostatic(
        &mut self,
        model: &mut DepthModel,
        params: &[f64],
    ) -> Result<(), ScaleError> {
        self.solver
            .get_pressure_scale(model, &mut *self.eos, self.depth_type, self.boundary)?;
        nne_enhance(model, &self.nodes, params, &mut *self.eos);
        Ok(())
    }

    /// Clamp `params`, expand them, clamp the column, refresh the optical
    /// depth and solve hydrostatic equilibrium.
    pub fn prepare(
        &mut self,
        model: &mut DepthModel,
        params: &mut [f64],
    ) -> Result<(), SynthesisError> {
        self.clamp_parameters(params);
        self.expand(model, params)?;
        self.check_bounds(model);
        model.ltau_to_tau();
        self.hydrostatic(model, params)?;
        Ok(())
    }

    /// Synthesize with the current `params`, then restore the saved gas
    /// pressure.
    fn perturbed_synth(
        &mut self,
        model: &mut DepthModel,
        params: &[f64],
        rehydrate: bool,
        pgas_saved: &[f64],
        out: &mut [f64],
    ) -> Result<bool, SynthesisError> {
        self.expand(model, params)?;
        model.ltau_to_tau();
        if rehydrate {
            self.hydrostatic(model, params)?;
        }
        let converged = self.synth(model, out, false);
        model.pgas_mut().copy_from_slice(pgas_saved);
        Ok(converged)
    }

    #[allow(clippy::too_many_arguments)]
    fn difference(
        &mut self,
        model: &mut DepthModel,
        params: &mut [f64],
        index: usize,
        step: f64,
        rehydrate: bool,
        baseline: &[f64],
        pgas_saved: &[f64],
        out: &mut [f64],
    ) -> Result<bool, SynthesisError> {
        let value = params[index];
        if self.centered_derivatives {
            let mut upper = vec![0.0; out.len()];
            params[index] = value + 0.5 * step;
            let up = self.perturbed_synth(model, params, rehydrate, pgas_saved, &mut upper);
            params[index] = value - 0.5 * step;
            let down = self.perturbed_synth(model, params, rehydrate, pgas_saved, out);
            params[index] = value;
            let converged = up? & down?;
            for (o, u) in out.iter_mut().zip(&upper) {
                *o = (u - *o) / step;
            }
            Ok(converged)
        } else {
            params[index] = value + step;
            let result = self.perturbed_synth(model, params, rehydrate, pgas_saved, out);
            params[index] = value;
            let converged = result?;
            for (o, b) in out.iter_mut().zip(baseline) {
                *o = (*o - b) / step;
            }
            Ok(converged)
        }
    }

    /// Finite-difference response of the spectrum to flat parameter `index`.
    ///
    /// `model` must hold the baseline column for `params` (as left by
    /// [`Atmosphere::prepare`]), `baseline` its spectrum and `pgas_saved` its
    /// gas pressure. Temperature and boundary-multiplier perturbations re-solve
    /// hydrostatic equilibrium. After every synthesis the gas pressure is set
    /// back to `pgas_saved`; on return the parameter and the column are back
    /// at their baseline values.
    ///
    /// Returns whether every synthesis converged.
    #[allow(clippy::too_many_arguments)]
    pub fn response_function(
        &mut self,
        model: &mut DepthModel,
        params: &mut [f64],
        index: usize,
        baseline: &[f64],
        pgas_saved: &[f64],
        out: &mut [f64],
    ) -> Result<bool, SynthesisError> {
        let npar = self.nodes.npar();
        let quantity = self
            .nodes
            .kind_of(index)
            .ok_or(SynthesisError::ParameterIndex { index, npar })?;
        let ndata = self.ndata();
        check_len(ndata, baseline.len())?;
        check_len(ndata, out.len())?;
        check_len(model.ndep(), pgas_saved.len())?;

        let step = self.dpar * self.ranges.scale(quantity);
        if !(step.is_finite() && step != 0.0) {
            return Err(SynthesisError::InvalidStep(step));
        }
        let rehydrate = matches!(quantity, Quantity::Temp | Quantity::PgasBoundary);
        trace!(index, %quantity, step, "response function");

        let converged = self.difference(
            model, params, index, step, rehydrate, baseline, pgas_saved, out,
        )?;

        self.expand(model, params)?;
        model.ltau_to_tau();
        if rehydrate {
            self.hydrostatic(model, params)?;
        }
        model.pgas_mut().copy_from_slice(pgas_saved);
        Ok(converged)
    }

    /// Depth-resolved response of the spectrum to one physical quantity.
    ///
    /// Each depth point is perturbed in turn and `out` receives `ndep` rows of
    /// `ndata` derivatives. Temperature perturbations keep the gas pressure
    /// and re-derive the densities; pressure and density perturbations are
    /// relative and re-derive the other densities. The column and the cached
    /// partial pressures are restored after every depth point.
    ///
    /// Returns whether every synthesis converged. A perturbed point left
    /// without gas pressure or density fails with
    /// [`ScaleError::NonFiniteScale`], after the column has been restored.
    pub fn response_function_full(
        &mut self,
        model: &mut DepthModel,
        channel: ResponseChannel,
        baseline: &[f64],
        out: &mut [f64],
    ) -> Result<bool, SynthesisError> {
        let ndep = model.ndep();
        let ndata = self.ndata();
        check_len(ndata, baseline.len())?;
        check_len(ndep * ndata, out.len())?;
        if ndata == 0 {
            return Ok(true);
        }

        let saved = model.clone();
        let partials: Vec<_> = (0..ndep).map(|k| self.eos.partial_pressures(k)).collect();
        let field = channel.field();
        let quantity = Quantity::ALL.get(channel as usize).copied();
        let mut upper = vec![0.0; ndata];
        let mut converged = true;

        for (k, row) in out.chunks_exact_mut(ndata).enumerate() {
            let value = saved.field(field)[k];
            let step = match (channel.is_relative(), quantity) {
                (true, _) => self.dpar * value,
                (false, Some(q)) => self.dpar * self.ranges.scale(q),
                (false, None) => self.dpar,
            };
            if step == 0.0 || !step.is_finite() {
                row.fill(0.0);
                continue;
            }

            let at = (channel, k);
            if self.centered_derivatives {
                let (hi, lo) = (value + 0.5 * step, value - 0.5 * step);
                converged &= self.synth_at_depth(model, at, hi, &saved, &partials, &mut upper)?;
                converged &= self.synth_at_depth(model, at, lo, &saved, &partials, row)?;

                for (o, u) in row.iter_mut().zip(&upper) {
                    *o = (u - *o) / step;
                }
            } else {
                converged &=
                    self.synth_at_depth(model, at, value + step, &saved, &partials, row)?;

                for (o, b) in row.iter_mut().zip(baseline) {
                    *o = (*o - b) / step;
                }
            }
        }
        Ok(converged)
    }

    /// Synthesize with `channel` at depth `k` set to `value`, then restore
    /// that depth point.
    fn synth_at_depth(
        &mut self,
        model: &mut DepthModel,
        (channel, k): (ResponseChannel, usize),
        value: f64,
        saved: &DepthModel,
        saved_partial: &[PartialPressures],
        out: &mut [f64],
    ) -> Result<bool, SynthesisError> {
        let perturbed = self.perturb_depth(model, channel, k, value);
        let converged = perturbed.is_ok() && self.synth(model, out, false);
        self.restore_depth(model, saved, saved_partial, k);
        perturbed?;
        Ok(converged)
    }

    /// The perturbed point must keep a finite, positive gas pressure and
    /// density.
    fn perturb_depth(
        &mut self,
        model: &mut DepthModel,
        channel: ResponseChannel,
        k: usize,
        value: f64,
    ) -> Result<(), ScaleError> {
        let ndep = model.ndep();
        model.field_mut(channel.field())[k] = value;
        let cols = model.columns();
        let state = match channel {
            ResponseChannel::Temp | ResponseChannel::Pgas => {
                self.eos.from_t_pg(cols.temp[k], cols.pgas[k])
            }
            ResponseChannel::Rho => self.eos.from_t_rho(cols.temp[k], cols.rho[k]),
            _ => return Ok(()),
        };
        let physical = |v: f64| v.is_finite() && v > 0.0;
        if !(physical(state.pgas) && physical(state.rho)) {
            return Err(ScaleError::NonFiniteScale);
        }
        let cols = model.columns_mut();
        cols.pgas[k] = state.pgas;
        cols.rho[k] = state.rho;
        cols.nne[k] = state.nne;
        cols.pel[k] = state.pel;
        self.eos.store_partial_pressures(ndep, k, state.partial);
        Ok(())
    }

    fn restore_depth(
        &mut self,
        model: &mut DepthModel,
        saved: &DepthModel,
        saved_partial: &[PartialPressures],
        k: usize,
    ) {
        let ndep = model.ndep();
        for field in Field::ALL {
            model.field_mut(field)[k] = saved.field(field)[k];
        }
        self.eos.store_partial_pressures(ndep, k, saved_partial[k]);
    }
}

fn check_len(expected: usize, got: usize) -> Result<(), SynthesisError> {
    if expected != got {
        return Err(SynthesisError::BufferSize { expected, got });
    }
    Ok(())
}
