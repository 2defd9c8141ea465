//! Smooth electron-density enhancement in the upper atmosphere.
//!
//! The correction vanishes deeper than `ENHANCE_LTAU0` so the derived opacities
//! stay continuous in the deep photosphere.

use std::f64::consts::PI;

use crate::equations::EquationOfState;
use crate::model::DepthModel;
use crate::nodes::{NodeSet, Quantity};

/// Log optical depth at the middle of the transition.
pub const ENHANCE_LTAU0: f64 = -4.8;

/// Half-width of the transition in dex.
pub const ENHANCE_WIDTH: f64 = 0.2;

/// Blending weight: 1 high in the atmosphere, 0 deeper than `ENHANCE_LTAU0`.
#[inline]
pub fn enhance_weight(ltau: f64) -> f64 {
    0.5 - 0.5 * ((ltau - ENHANCE_LTAU0) * PI / ENHANCE_WIDTH).tanh()
}

/// Scale the electron density by the boundary multiplier, blended with
/// depth, then let the equation of state re-derive the density at fixed gas
/// pressure and refresh its cached partial pressures.
///
/// Does nothing and returns `false` unless the boundary multiplier is a free
/// parameter.
pub fn nne_enhance<E: EquationOfState + ?Sized>(
    model: &mut DepthModel,
    nodes: &NodeSet,
    params: &[f64],
    eos: &mut E,
) -> bool {
    let Some(&mult) = nodes
        .param_slice(Quantity::PgasBoundary, params)
        .and_then(|s| s.first())
    else {
        return false;
    };

    let ndep = model.ndep();
    for k in 0..ndep {
        let cols = model.columns_mut();
        let w = enhance_weight(cols.ltau[k]);
        let nne = cols.nne[k] * (mult * w + (1.0 - w));
        let state = eos.from_t_pg_nne(cols.temp[k], cols.pgas[k], nne);
        cols.nne[k] = state.nne;
        cols.rho[k] = state.rho;
        cols.pel[k] = state.pel;
        eos.store_partial_pressures(ndep, k, state.partial);
    }
    true
}
