//! Persistence of model cubes.
//!
//! Reading and writing need the `netcdf` feature; the error type and the
//! variable table are always available.

mod netcdf_io;

pub use netcdf_io::{MANDATORY_VARIABLES, MODEL_VARIABLES, ModelIoError};
#[cfg(feature = "netcdf")]
pub use netcdf_io::{ModelReader, ModelWriter};
