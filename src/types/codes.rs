//! Closed enums for the integer codes that travel through configuration
//! and model files.

use std::fmt;

use thiserror::Error;

/// Error returned when an integer code has no meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CodeError {
    #[error("invalid boundary code {0}, expected 0..=4")]
    InvalidBoundary(i32),

    #[error("invalid depth-scale code {0}, expected 0..=2")]
    InvalidDepthScale(i32),

    #[error("invalid depth-type code {0}, expected 0..=2")]
    InvalidDepthType(i32),

    #[error("invalid worker mode {0}, expected 1..=4")]
    InvalidMode(i32),
}

// =============================================================================
// Boundary condition at the top of the column
// =============================================================================

/// Which quantity at the top of the column is taken as known.
///
/// The discriminants are the codes used in configuration and model files.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BoundaryKind {
    /// Gas pressure known, or the default top pressure when nothing is given.
    #[default]
    GasPressure = 0,
    /// Mass density known.
    Density = 1,
    /// Mass density known, electron density solved first.
    DensityAlt = 2,
    /// Electron density known.
    ElectronDensity = 3,
    /// Electron pressure known.
    ElectronPressure = 4,
}

impl BoundaryKind {
    /// Integer code of this boundary condition.
    #[inline]
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for BoundaryKind {
    type Error = CodeError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::GasPressure),
            1 => Ok(Self::Density),
            2 => Ok(Self::DensityAlt),
            3 => Ok(Self::ElectronDensity),
            4 => Ok(Self::ElectronPressure),
            other => Err(CodeError::InvalidBoundary(other)),
        }
    }
}

impl fmt::Display for BoundaryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::GasPressure => "pgas",
            Self::Density => "rho",
            Self::DensityAlt => "rho (alt)",
            Self::ElectronDensity => "nne",
            Self::ElectronPressure => "pel",
        };
        write!(f, "{name}")
    }
}

// =============================================================================
// Depth scales
// =============================================================================

/// The three mutually convertible depth coordinates of a column.
///
/// Exactly one of them is known at a time; the scale solver derives the
/// other two.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DepthScale {
    OpticalDepth = 0,
    Height = 1,
    ColumnMass = 2,
}

impl TryFrom<i32> for DepthScale {
    type Error = CodeError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::OpticalDepth),
            1 => Ok(Self::Height),
            2 => Ok(Self::ColumnMass),
            other => Err(CodeError::InvalidDepthScale(other)),
        }
    }
}

/// Depth coordinate in which node locations and hydrostatic integration
/// are expressed.
///
/// The codes of column mass and height are swapped with respect to
/// [`DepthScale`]; [`DepthType::scale`] performs the mapping.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DepthType {
    #[default]
    Ltau500 = 0,
    Cmass = 1,
    Z = 2,
}

impl DepthType {
    /// Scale branch used when this depth type is the known coordinate.
    #[inline]
    pub fn scale(self) -> DepthScale {
        match self {
            Self::Ltau500 => DepthScale::OpticalDepth,
            Self::Cmass => DepthScale::ColumnMass,
            Self::Z => DepthScale::Height,
        }
    }
}

impl TryFrom<i32> for DepthType {
    type Error = CodeError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Ltau500),
            1 => Ok(Self::Cmass),
            2 => Ok(Self::Z),
            other => Err(CodeError::InvalidDepthType(other)),
        }
    }
}

// =============================================================================
// Node interpolation
// =============================================================================

/// Interpolation scheme used to expand three or more nodes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Interpolation {
    Linear,
    Bezier,
    #[default]
    Hermite,
}

impl Interpolation {
    /// Map a configuration code: `0` linear, `1` Bezier, anything else Hermite.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Linear,
            1 => Self::Bezier,
            _ => Self::Hermite,
        }
    }
}

// =============================================================================
// Worker modes
// =============================================================================

/// Processing mode requested for a batch of pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Fit each pixel with the external optimizer.
    Invert = 1,
    /// Synthesize from pre-expanded columns.
    Synthesize = 2,
    /// Expand nodes, synthesize, optionally compute node response functions.
    ExpandSynthesize = 3,
    /// Synthesize and compute depth-resolved response functions.
    FullResponse = 4,
}

impl TryFrom<i32> for Mode {
    type Error = CodeError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Self::Invert),
            2 => Ok(Self::Synthesize),
            3 => Ok(Self::ExpandSynthesize),
            4 => Ok(Self::FullResponse),
            other => Err(CodeError::InvalidMode(other)),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Invert => "invert",
            Self::Synthesize => "synthesize",
            Self::ExpandSynthesize => "expand+synthesize",
            Self::FullResponse => "full-response",
        };
        write!(f, "{name}")
    }
}
