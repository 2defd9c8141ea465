//! Node parameterization of depth profiles.
//!
//! A [`NodeSet`] describes which physical quantities are free parameters and
//! where their nodes sit in log optical depth. [`expand_into`] turns node
//! values into full depth profiles; [`compress`] goes the other way for
//! diagnostics and model re-parameterization.

mod interpolation;
mod node_set;

use thiserror::Error;

pub use interpolation::{compress, compress_into, expand_into};
pub use node_set::{NQUANTITIES, NodeSet, Quantity, equidistant_nodes};

/// Errors raised while building a node layout or reading a parameter vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NodeError {
    #[error("parameter vector has length {got}, node layout expects {expected}")]
    ParameterLength { expected: usize, got: usize },

    #[error("node locations for {0} must be finite and strictly ascending")]
    UnorderedNodes(Quantity),

    #[error("{0} is not a depth profile and takes no node locations")]
    NotAProfile(Quantity),
}
