//! Node layout of the flat parameter vector.

use std::fmt;

use super::NodeError;
use crate::model::Field;

/// Number of node-parameterized quantities.
pub const NQUANTITIES: usize = 7;

/// A node-parameterized physical quantity, in parameter-vector order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Quantity {
    Temp = 0,
    Vlos = 1,
    Vturb = 2,
    B = 3,
    Inc = 4,
    Azi = 5,
    /// Multiplier on the top boundary value; one slot, not a depth profile.
    PgasBoundary = 6,
}

impl Quantity {
    pub const ALL: [Quantity; NQUANTITIES] = [
        Quantity::Temp,
        Quantity::Vlos,
        Quantity::Vturb,
        Quantity::B,
        Quantity::Inc,
        Quantity::Azi,
        Quantity::PgasBoundary,
    ];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Column field this quantity expands into, `None` for the boundary multiplier.
    pub const fn field(self) -> Option<Field> {
        match self {
            Quantity::Temp => Some(Field::Temp),
            Quantity::Vlos => Some(Field::Vlos),
            Quantity::Vturb => Some(Field::Vturb),
            Quantity::B => Some(Field::B),
            Quantity::Inc => Some(Field::Inc),
            Quantity::Azi => Some(Field::Azi),
            Quantity::PgasBoundary => None,
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Quantity::Temp => "temp",
            Quantity::Vlos => "vlos",
            Quantity::Vturb => "vturb",
            Quantity::B => "b",
            Quantity::Inc => "inc",
            Quantity::Azi => "azi",
            Quantity::PgasBoundary => "pgas",
        };
        f.write_str(name)
    }
}

/// Per-quantity node locations and their slots in the parameter vector.
///
/// Offsets are assigned contiguously in [`Quantity`] order over the inverted
/// quantities only, so they partition `0..npar` without overlap.
///
/// # Example
///
/// ```
/// use atmos_rs::nodes::{NodeSet, Quantity};
///
/// let nodes = NodeSet::new()
///     .with_nodes(Quantity::Temp, vec![-3.0, -1.0, 0.5])
///     .unwrap()
///     .with_nodes(Quantity::Vlos, vec![-1.0])
///     .unwrap()
///     .with_boundary_multiplier();
///
/// assert_eq!(nodes.npar(), 5);
/// assert_eq!(nodes.offset(Quantity::Vlos), Some(3));
/// assert_eq!(nodes.offset(Quantity::B), None);
/// assert_eq!(nodes.kind_of(4), Some(Quantity::PgasBoundary));
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodeSet {
    nodes: [Vec<f64>; NQUANTITIES],
    to_invert: [bool; NQUANTITIES],
    offsets: [usize; NQUANTITIES],
    npar: usize,
}

impl NodeSet {
    /// Empty layout: nothing inverted, `npar == 0`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the node locations (log optical depth) of a depth-profile quantity.
    ///
    /// An empty list disables the quantity. Locations must be strictly
    /// ascending and finite.
    pub fn with_nodes(mut self, quantity: Quantity, ltau: Vec<f64>) -> Result<Self, NodeError> {
        if quantity == Quantity::PgasBoundary {
            return Err(NodeError::NotAProfile(quantity));
        }
        if ltau.iter().any(|v| !v.is_finite()) || ltau.windows(2).any(|w| w[1] <= w[0]) {
            return Err(NodeError::UnorderedNodes(quantity));
        }
        let i = quantity.index();
        self.to_invert[i] = !ltau.is_empty();
        self.nodes[i] = ltau;
        self.assign_offsets();
        Ok(self)
    }

    /// Invert the boundary multiplier as one extra parameter.
    pub fn with_boundary_multiplier(mut self) -> Self {
        let i = Quantity::PgasBoundary.index();
        self.to_invert[i] = true;
        self.nodes[i] = vec![0.0];
        self.assign_offsets();
        self
    }

    fn assign_offsets(&mut self) {
        let mut next = 0;
        for q in Quantity::ALL {
            let i = q.index();
            self.offsets[i] = next;
            if self.to_invert[i] {
                next += self.nodes[i].len();
            }
        }
        self.npar = next;
    }

    /// Length of the flat parameter vector.
    #[inline]
    pub fn npar(&self) -> usize {
        self.npar
    }

    #[inline]
    pub fn is_inverted(&self, quantity: Quantity) -> bool {
        self.to_invert[quantity.index()]
    }

    /// Whether the boundary multiplier occupies a slot.
    #[inline]
    pub fn inverts_boundary(&self) -> bool {
        self.is_inverted(Quantity::PgasBoundary)
    }

    /// Node locations of a quantity (empty when not inverted).
    pub fn nodes(&self, quantity: Quantity) -> &[f64] {
        if self.is_inverted(quantity) {
            &self.nodes[quantity.index()]
        } else {
            &[]
        }
    }

    /// Number of parameters used by a quantity.
    pub fn count(&self, quantity: Quantity) -> usize {
        self.nodes(quantity).len()
    }

    /// Offset of a quantity in the flat vector, `None` when not inverted.
    pub fn offset(&self, quantity: Quantity) -> Option<usize> {
        self.is_inverted(quantity)
            .then(|| self.offsets[quantity.index()])
    }

    /// Inverted quantities in parameter-vector order.
    pub fn inverted(&self) -> impl Iterator<Item = Quantity> + '_ {
        Quantity::ALL.into_iter().filter(|&q| self.is_inverted(q))
    }

    /// Quantity owning flat parameter `index`.
    pub fn kind_of(&self, index: usize) -> Option<Quantity> {
        self.inverted().find(|&q| {
            let start = self.offsets[q.index()];
            (start..start + self.count(q)).contains(&index)
        })
    }

    /// The slice of `params` owned by `quantity`.
    pub fn param_slice<'a>(&self, quantity: Quantity, params: &'a [f64]) -> Option<&'a [f64]> {
        let start = self.offset(quantity)?;
        params.get(start..start + self.count(quantity))
    }

    pub fn param_slice_mut<'a>(
        &self,
        quantity: Quantity,
        params: &'a mut [f64],
    ) -> Option<&'a mut [f64]> {
        let start = self.offset(quantity)?;
        params.get_mut(start..start + self.count(quantity))
    }

    /// Reject parameter vectors of the wrong length.
    pub fn check_params(&self, params: &[f64]) -> Result<(), NodeError> {
        if params.len() != self.npar {
            return Err(NodeError::ParameterLength {
                expected: self.npar,
                got: params.len(),
            });
        }
        Ok(())
    }
}

/// `n` node locations equidistant in log optical depth between `min` and `max`.
///
/// A single node sits at the midpoint.
///
/// # Example
///
/// ```
/// use atmos_rs::nodes::equidistant_nodes;
///
/// assert_eq!(equidistant_nodes(-4.0, 0.0, 3), vec![-4.0, -2.0, 0.0]);
/// assert_eq!(equidistant_nodes(-4.0, 0.0, 1), vec![-2.0]);
/// ```
pub fn equidistant_nodes(min: f64, max: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![0.5 * (min + max)],
        _ => {
            let step = (max - min) / (n - 1) as f64;
            (0..n).map(|i| min + step * i as f64).collect()
        }
    }
}
