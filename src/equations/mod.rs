//! Equation-of-state closure for atmospheric columns.
//!
//! The scale solver and the worker only see the [`EquationOfState`] trait.
//! [`IdealGasEos`] is the bundled reference implementation.

mod equation_of_state;

pub use equation_of_state::{
    AMU, BK, EquationOfState, GRAVITY_SUN, IdealGasEos, KnownDensity, PartialPressures,
    ThermoState,
};
