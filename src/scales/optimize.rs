//! Depth-grid optimisation before synthesis.

use tracing::debug;

use crate::equations::EquationOfState;
use crate::model::{DepthModel, Field};
use crate::nodes::compress_into;

/// Rewrites the depth grid of a column, keeping its length.
pub trait DepthOptimizer {
    /// Returns `true` when the grid was changed.
    fn optimize(&self, model: &mut DepthModel, eos: &mut dyn EquationOfState, tcut: f64) -> bool;
}

/// Cuts the column where the temperature first exceeds `tcut` and spreads
/// the points evenly in log optical depth above the cut.
///
/// Pressures, densities and column mass are resampled in log space.
#[derive(Clone, Copy, Debug, Default)]
pub struct TemperatureCut;

impl TemperatureCut {
    fn log_resampled(field: Field) -> bool {
        matches!(
            field,
            Field::Pgas | Field::Rho | Field::Nne | Field::Pel | Field::Cmass
        )
    }
}

impl DepthOptimizer for TemperatureCut {
    fn optimize(&self, model: &mut DepthModel, eos: &mut dyn EquationOfState, tcut: f64) -> bool {
        let ndep = model.ndep();
        if ndep < 3 {
            return false;
        }
        let Some(cut) = model.temp().iter().position(|&t| t > tcut) else {
            return false;
        };
        if cut < 2 {
            return false;
        }

        let old = model.clone();
        let top = old.ltau()[0];
        let step = (old.ltau()[cut] - top) / (ndep - 1) as f64;
        let grid: Vec<f64> = (0..ndep).map(|k| top + step * k as f64).collect();

        for field in Field::ALL {
            if matches!(field, Field::Ltau | Field::Tau) {
                continue;
            }
            let src = old.field(field);
            let dst = model.field_mut(field);
            if Self::log_resampled(field) && src.iter().all(|&v| v > 0.0) {
                let logs: Vec<f64> = src.iter().map(|v| v.log10()).collect();
                compress_into(old.ltau(), &logs, &grid, dst);
                dst.iter_mut().for_each(|v| *v = 10f64.powf(*v));
            } else {
                compress_into(old.ltau(), src, &grid, dst);
            }
        }
        model.ltau_mut().copy_from_slice(&grid);
        model.ltau_to_tau();

        let cols = model.columns();
        for k in 0..ndep {
            let state = eos.from_t_pg(cols.temp[k], cols.pgas[k]);
            eos.store_partial_pressures(ndep, k, state.partial);
        }
        debug!(cut, ltau_bottom = grid[ndep - 1], "depth grid cut at tcut");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equations::IdealGasEos;

    fn column() -> DepthModel {
        let mut model = DepthModel::new(6);
        model.ltau_mut().copy_from_slice(&[-5.0, -4.0, -3.0, -2.0, -1.0, 0.0]);
        model.temp_mut().copy_from_slice(&[4000.0, 4200.0, 4400.0, 4600.0, 9000.0, 12000.0]);
        model.pgas_mut().copy_from_slice(&[1e0, 1e1, 1e2, 1e3, 1e4, 1e5]);
        model.vlos_mut().copy_from_slice(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        model.ltau_to_tau();
        model
    }

    #[test]
    fn test_cut_keeps_length_and_range() {
        let mut model = column();
        let mut eos = IdealGasEos::new();
        assert!(TemperatureCut.optimize(&mut model, &mut eos, 8000.0));
        assert_eq!(model.ndep(), 6);
        let ltau = model.ltau();
        assert_eq!(ltau[0], -5.0);
        assert!((ltau[5] + 1.0).abs() < 1e-12);
        // vlos is linear in ltau, so it resamples exactly.
        for (&v, &lt) in model.vlos().iter().zip(ltau) {
            assert!((v - (lt + 5.0)).abs() < 1e-12);
        }
        // pgas is log-linear in ltau.
        for (&p, &lt) in model.pgas().iter().zip(ltau) {
            assert!((p.log10() - (lt + 5.0)).abs() < 1e-10);
        }
        assert!(eos.partial_pressures(5).na > 0.0);
    }

    #[test]
    fn test_no_cut_when_cool() {
        let mut model = column();
        let before = model.clone();
        let mut eos = IdealGasEos::new();
        assert!(!TemperatureCut.optimize(&mut model, &mut eos, 20000.0));
        assert_eq!(model, before);
    }
}
