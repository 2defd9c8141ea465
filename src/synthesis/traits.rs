//! Contracts of the external radiative-transfer engine and optimizer.

use super::Atmosphere;
use crate::equations::EquationOfState;
use crate::model::DepthModel;

/// A radiative-transfer engine producing the emergent spectrum of a column.
///
/// Spectra are wavelength-major with `n_stokes` samples per wavelength.
pub trait SpectralSynthesizer {
    fn n_wavelengths(&self) -> usize;

    fn n_stokes(&self) -> usize;

    /// Samples per spectrum.
    fn ndata(&self) -> usize {
        self.n_wavelengths() * self.n_stokes()
    }

    /// Synthesize the spectrum of `model` into `out`.
    ///
    /// Returns `false` when the solution did not converge; `out` then holds
    /// the engine's last iterate. `save_populations` asks a non-LTE engine to
    /// keep its level populations as the starting point of the next call.
    fn synth(
        &mut self,
        model: &DepthModel,
        eos: &mut dyn EquationOfState,
        out: &mut [f64],
        save_populations: bool,
    ) -> bool;

    /// Release saved populations.
    fn cleanup(&mut self) {}
}

/// Boxed synthesizer, as held by an atmosphere.
pub type BoxedSynthesizer = Box<dyn SpectralSynthesizer>;

/// Nonlinear least-squares fit of one pixel.
pub trait ModelFitter {
    /// Fit `params` to `obs` and return the final fit quality (χ²).
    ///
    /// On return `model` holds the best-fit column and `obs` the best-fit
    /// synthetic spectrum.
    fn fit(
        &mut self,
        atmos: &mut Atmosphere,
        model: &mut DepthModel,
        params: &mut [f64],
        obs: &mut [f64],
        weights: &[f64],
    ) -> f64;
}

/// Boxed fitter, as held by a worker.
pub type BoxedFitter = Box<dyn ModelFitter>;
