//! Strongly-typed codes and indices shared across the crate.
//!
//! The integer codes used by model files and configuration (boundary
//! conditions, depth scales, interpolation schemes, worker modes) are parsed
//! once into closed enums so the rest of the crate never matches on raw
//! integers.
//!
//! # Example
//!
//! ```
//! use atmos_rs::types::{BoundaryKind, DepthScale, DepthType, PixelIndex};
//!
//! let boundary = BoundaryKind::try_from(3).unwrap();
//! assert_eq!(boundary, BoundaryKind::ElectronDensity);
//! assert!(BoundaryKind::try_from(7).is_err());
//!
//! // Column mass nodes are integrated with the column-mass scale branch.
//! assert_eq!(DepthType::Cmass.scale(), DepthScale::ColumnMass);
//!
//! let pixel = PixelIndex::new(13);
//! assert_eq!(pixel.to_yx(5), (2, 3));
//! ```

mod codes;
mod indices;

pub use codes::{BoundaryKind, CodeError, DepthScale, DepthType, Interpolation, Mode};
pub use indices::PixelIndex;
