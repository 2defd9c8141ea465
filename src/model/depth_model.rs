//! One atmospheric column stored as fourteen fields over a single buffer.
//!
//! The field order is fixed and part of the bulk-copy contract: a column can
//! be serialized or copied with one slice copy of [`DepthModel::as_slice`].
//!
//! # Example
//!
//! ```
//! use atmos_rs::model::{DepthModel, Field};
//!
//! let mut model = DepthModel::new(3);
//! model.ltau_mut().copy_from_slice(&[-2.0, 0.0, 1.0]);
//! model.ltau_to_tau();
//! assert_eq!(model.tau()[1], 1.0);
//!
//! let cols = model.columns_mut();
//! cols.temp.fill(5000.0);
//! assert_eq!(model.field(Field::Temp), &[5000.0; 3]);
//! ```

use std::fmt;

use crate::nodes::{NodeError, NodeSet, expand_into};
use crate::types::Interpolation;

/// Number of fields in a column.
pub const NFIELDS: usize = 14;

/// A field of the column, in storage order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Field {
    Temp = 0,
    Vlos = 1,
    Vturb = 2,
    B = 3,
    Inc = 4,
    Azi = 5,
    Pgas = 6,
    Rho = 7,
    Nne = 8,
    Ltau = 9,
    Z = 10,
    Cmass = 11,
    Pel = 12,
    Tau = 13,
}

impl Field {
    /// All fields in storage order.
    pub const ALL: [Field; NFIELDS] = [
        Field::Temp,
        Field::Vlos,
        Field::Vturb,
        Field::B,
        Field::Inc,
        Field::Azi,
        Field::Pgas,
        Field::Rho,
        Field::Nne,
        Field::Ltau,
        Field::Z,
        Field::Cmass,
        Field::Pel,
        Field::Tau,
    ];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Short name used in model files and log messages.
    pub const fn name(self) -> &'static str {
        match self {
            Field::Temp => "temp",
            Field::Vlos => "vlos",
            Field::Vturb => "vturb",
            Field::B => "b",
            Field::Inc => "inc",
            Field::Azi => "azi",
            Field::Pgas => "pgas",
            Field::Rho => "rho",
            Field::Nne => "nne",
            Field::Ltau => "ltau500",
            Field::Z => "z",
            Field::Cmass => "cmass",
            Field::Pel => "pel",
            Field::Tau => "tau",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Read-only views of every field, borrowed from one column.
#[derive(Debug, Clone, Copy)]
pub struct Columns<'a> {
    pub temp: &'a [f64],
    pub vlos: &'a [f64],
    pub vturb: &'a [f64],
    pub b: &'a [f64],
    pub inc: &'a [f64],
    pub azi: &'a [f64],
    pub pgas: &'a [f64],
    pub rho: &'a [f64],
    pub nne: &'a [f64],
    pub ltau: &'a [f64],
    pub z: &'a [f64],
    pub cmass: &'a [f64],
    pub pel: &'a [f64],
    pub tau: &'a [f64],
}

/// Disjoint mutable views of every field, borrowed from one column.
///
/// The views borrow the column mutably, so no resize can happen while they
/// are alive.
#[derive(Debug)]
pub struct ColumnsMut<'a> {
    pub temp: &'a mut [f64],
    pub vlos: &'a mut [f64],
    pub vturb: &'a mut [f64],
    pub b: &'a mut [f64],
    pub inc: &'a mut [f64],
    pub azi: &'a mut [f64],
    pub pgas: &'a mut [f64],
    pub rho: &'a mut [f64],
    pub nne: &'a mut [f64],
    pub ltau: &'a mut [f64],
    pub z: &'a mut [f64],
    pub cmass: &'a mut [f64],
    pub pel: &'a mut [f64],
    pub tau: &'a mut [f64],
}

/// One depth-stratified atmospheric column.
///
/// `Clone` and [`DepthModel::copy_from`] perform a full buffer copy.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DepthModel {
    ndep: usize,
    buf: Vec<f64>,
}

macro_rules! field_accessors {
    ($($field:ident, $field_mut:ident => $variant:ident;)*) => {
        $(
            #[inline]
            pub fn $field(&self) -> &[f64] {
                self.field(Field::$variant)
            }

            #[inline]
            pub fn $field_mut(&mut self) -> &mut [f64] {
                self.field_mut(Field::$variant)
            }
        )*
    };
}

impl DepthModel {
    /// Allocate a zero-filled column of `ndep` points.
    pub fn new(ndep: usize) -> Self {
        Self {
            ndep,
            buf: vec![0.0; NFIELDS * ndep],
        }
    }

    /// Build a column from a buffer in storage order.
    ///
    /// Returns `None` if the buffer length is not a multiple of the field count.
    pub fn from_buffer(buf: Vec<f64>) -> Option<Self> {
        if buf.len() % NFIELDS != 0 {
            return None;
        }
        Some(Self {
            ndep: buf.len() / NFIELDS,
            buf,
        })
    }

    /// Number of depth points.
    #[inline]
    pub fn ndep(&self) -> usize {
        self.ndep
    }

    /// Reallocate to `ndep` points, zero-filled.
    pub fn set_size(&mut self, ndep: usize) {
        self.ndep = ndep;
        self.buf.clear();
        self.buf.resize(NFIELDS * ndep, 0.0);
    }

    /// Clear every field.
    pub fn zero(&mut self) {
        self.buf.fill(0.0);
    }

    /// Copy every field of `other`, resizing if needed.
    pub fn copy_from(&mut self, other: &DepthModel) {
        if self.ndep != other.ndep {
            self.set_size(other.ndep);
        }
        self.buf.copy_from_slice(&other.buf);
    }

    /// The whole buffer in storage order.
    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.buf
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.buf
    }

    #[inline]
    pub fn field(&self, field: Field) -> &[f64] {
        let start = field.index() * self.ndep;
        &self.buf[start..start + self.ndep]
    }

    #[inline]
    pub fn field_mut(&mut self, field: Field) -> &mut [f64] {
        let start = field.index() * self.ndep;
        &mut self.buf[start..start + self.ndep]
    }

    field_accessors! {
        temp, temp_mut => Temp;
        vlos, vlos_mut => Vlos;
        vturb, vturb_mut => Vturb;
        b, b_mut => B;
        inc, inc_mut => Inc;
        azi, azi_mut => Azi;
        pgas, pgas_mut => Pgas;
        rho, rho_mut => Rho;
        nne, nne_mut => Nne;
        ltau, ltau_mut => Ltau;
        z, z_mut => Z;
        cmass, cmass_mut => Cmass;
        pel, pel_mut => Pel;
        tau, tau_mut => Tau;
    }

    /// Borrow every field at once.
    pub fn columns(&self) -> Columns<'_> {
        let n = self.ndep;
        let f: [&[f64]; NFIELDS] = std::array::from_fn(|i| &self.buf[i * n..(i + 1) * n]);
        let [
            temp,
            vlos,
            vturb,
            b,
            inc,
            azi,
            pgas,
            rho,
            nne,
            ltau,
            z,
            cmass,
            pel,
            tau,
        ] = f;
        Columns {
            temp,
            vlos,
            vturb,
            b,
            inc,
            azi,
            pgas,
            rho,
            nne,
            ltau,
            z,
            cmass,
            pel,
            tau,
        }
    }

    /// Borrow every field mutably at once.
    pub fn columns_mut(&mut self) -> ColumnsMut<'_> {
        let n = self.ndep;
        let mut rest: &mut [f64] = &mut self.buf;
        let f: [&mut [f64]; NFIELDS] = std::array::from_fn(|_| {
            let (head, tail) = std::mem::take(&mut rest).split_at_mut(n);
            rest = tail;
            head
        });
        let [
            temp,
            vlos,
            vturb,
            b,
            inc,
            azi,
            pgas,
            rho,
            nne,
            ltau,
            z,
            cmass,
            pel,
            tau,
        ] = f;
        ColumnsMut {
            temp,
            vlos,
            vturb,
            b,
            inc,
            azi,
            pgas,
            rho,
            nne,
            ltau,
            z,
            cmass,
            pel,
            tau,
        }
    }

    /// `tau = 10^ltau` at every depth.
    pub fn ltau_to_tau(&mut self) {
        let cols = self.columns_mut();
        for (tau, &ltau) in cols.tau.iter_mut().zip(cols.ltau.iter()) {
            *tau = 10f64.powf(ltau);
        }
    }

    /// Expand node parameters onto this column's log-optical-depth grid.
    ///
    /// Quantities that are not inverted keep their current values.
    pub fn expand(
        &mut self,
        nodes: &NodeSet,
        params: &[f64],
        interpolation: Interpolation,
    ) -> Result<(), NodeError> {
        nodes.check_params(params)?;
        let cols = self.columns_mut();
        for quantity in nodes.inverted() {
            let Some(field) = quantity.field() else {
                continue;
            };
            let Some(values) = nodes.param_slice(quantity, params) else {
                continue;
            };
            let target: &mut [f64] = match field {
                Field::Temp => &mut *cols.temp,
                Field::Vlos => &mut *cols.vlos,
                Field::Vturb => &mut *cols.vturb,
                Field::B => &mut *cols.b,
                Field::Inc => &mut *cols.inc,
                Field::Azi => &mut *cols.azi,
                _ => continue,
            };
            expand_into(nodes.nodes(quantity), values, cols.ltau, target, interpolation);
        }
        Ok(())
    }
}
