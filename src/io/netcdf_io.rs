//! NetCDF model cubes.
//!
//! A model file holds one variable per persisted field with dimensions
//! `[time, y, x, ndep]` (the time dimension is optional when reading).
//! `ltau500` and `temp` must be present; every other field defaults to zero.
//! A one-dimensional `z` is copied to every pixel.
//!
//! # Example
//!
//! ```rust,ignore
//! use atmos_rs::io::{ModelReader, ModelWriter};
//!
//! let grid = ModelReader::open("falc.nc")?.read(0)?;
//! let mut writer = ModelWriter::create("out.nc", grid.ny(), grid.nx(), grid.ndep())?;
//! writer.write_timestep(&grid)?;
//! ```

#[cfg(feature = "netcdf")]
use std::path::Path;

#[cfg(feature = "netcdf")]
use chrono::Utc;
use thiserror::Error;
#[cfg(feature = "netcdf")]
use tracing::{debug, info};

use crate::model::Field;
#[cfg(feature = "netcdf")]
use crate::model::DepthModelGrid;

/// Error type for model file operations.
#[derive(Debug, Error)]
pub enum ModelIoError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "netcdf")]
    #[error("NetCDF error: {0}")]
    NetCDF(#[from] netcdf::Error),

    /// A mandatory variable is absent.
    #[error("model file has no '{0}' variable")]
    MissingVariable(&'static str),

    #[error("invalid dimensions: {0}")]
    InvalidDimensions(String),

    #[error("time step {tstep} out of range, file has {nt}")]
    TimestepOutOfRange { tstep: usize, nt: usize },
}

/// Persisted fields with their units, in file order.
pub const MODEL_VARIABLES: [(Field, &str); 12] = [
    (Field::Temp, "K"),
    (Field::Vlos, "cm s-1"),
    (Field::Vturb, "cm s-1"),
    (Field::B, "G"),
    (Field::Inc, "rad"),
    (Field::Azi, "rad"),
    (Field::Pgas, "dyn cm-2"),
    (Field::Rho, "g cm-3"),
    (Field::Nne, "cm-3"),
    (Field::Ltau, "1"),
    (Field::Z, "cm"),
    (Field::Cmass, "g cm-2"),
];

/// Fields without which a file cannot be used.
pub const MANDATORY_VARIABLES: [Field; 2] = [Field::Temp, Field::Ltau];

/// Reader for model cubes.
#[cfg(feature = "netcdf")]
pub struct ModelReader {
    file: netcdf::File,
    nt: Option<usize>,
    ny: usize,
    nx: usize,
    ndep: usize,
}

#[cfg(feature = "netcdf")]
impl ModelReader {
    /// Open `path` and take the grid size from the temperature variable.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ModelIoError> {
        let file = netcdf::open(path)?;
        let temp = file
            .variable(Field::Temp.name())
            .ok_or(ModelIoError::MissingVariable(Field::Temp.name()))?;
        let dims: Vec<usize> = temp.dimensions().iter().map(|d| d.len()).collect();
        let (nt, ny, nx, ndep) = match dims[..] {
            [nt, ny, nx, ndep] => (Some(nt), ny, nx, ndep),
            [ny, nx, ndep] => (None, ny, nx, ndep),
            _ => {
                return Err(ModelIoError::InvalidDimensions(format!(
                    "temp must be [(time), y, x, ndep], got {dims:?}"
                )));
            }
        };
        drop(temp);
        Ok(Self {
            file,
            nt,
            ny,
            nx,
            ndep,
        })
    }

    /// `(ny, nx, ndep)`.
    pub fn dims(&self) -> (usize, usize, usize) {
        (self.ny, self.nx, self.ndep)
    }

    /// Number of stored time steps; 1 for files without a time dimension.
    pub fn n_timesteps(&self) -> usize {
        self.nt.unwrap_or(1)
    }

    /// Read time step `tstep` and detect the top boundary.
    pub fn read(&self, tstep: usize) -> Result<DepthModelGrid, ModelIoError> {
        let nt = self.n_timesteps();
        if tstep >= nt {
            return Err(ModelIoError::TimestepOutOfRange { tstep, nt });
        }
        let mut grid = DepthModelGrid::new(self.ny, self.nx, self.ndep);

        for (field, _) in MODEL_VARIABLES {
            let Some(values) = self.read_field(field, tstep)? else {
                if MANDATORY_VARIABLES.contains(&field) {
                    return Err(ModelIoError::MissingVariable(field.name()));
                }
                continue;
            };
            let columns = values.chunks_exact(self.ndep);
            for (model, column) in grid.models_mut().iter_mut().zip(columns) {
                model.field_mut(field).copy_from_slice(column);
            }
        }

        match grid.detect_boundary() {
            Some(kind) => debug!(%kind, "boundary taken from model file"),
            None => info!("model file holds no pressure or density, using default boundary"),
        }
        Ok(grid)
    }

    /// `ny * nx * ndep` values of `field`, or `None` when absent.
    fn read_field(&self, field: Field, tstep: usize) -> Result<Option<Vec<f64>>, ModelIoError> {
        let Some(var) = self.file.variable(field.name()) else {
            return Ok(None);
        };
        let ncell = self.ny * self.nx * self.ndep;
        let values: Vec<f64> = match var.dimensions().len() {
            4 => var.get_values((tstep, .., .., ..))?,
            3 => var.get_values(..)?,
            1 => {
                let column: Vec<f64> = var.get_values(..)?;
                if column.len() != self.ndep {
                    return Err(ModelIoError::InvalidDimensions(format!(
                        "{} holds {} points, columns have {}",
                        field.name(),
                        column.len(),
                        self.ndep
                    )));
                }
                debug!(field = field.name(), "replicating 1-D column in all pixels");
                column.repeat(self.ny * self.nx)
            }
            n => {
                return Err(ModelIoError::InvalidDimensions(format!(
                    "{} has {n} dimensions",
                    field.name()
                )));
            }
        };
        if values.len() != ncell {
            return Err(ModelIoError::InvalidDimensions(format!(
                "{} holds {} values, expected {ncell}",
                field.name(),
                values.len()
            )));
        }
        Ok(Some(values))
    }
}

/// Writer for model cubes.
///
/// All dimensions and variables are declared by [`ModelWriter::create`];
/// every [`ModelWriter::write_timestep`] appends one time step to the same
/// file.
#[cfg(feature = "netcdf")]
pub struct ModelWriter {
    file: netcdf::FileMut,
    ny: usize,
    nx: usize,
    ndep: usize,
    time_index: usize,
}

#[cfg(feature = "netcdf")]
impl ModelWriter {
    pub fn create(
        path: impl AsRef<Path>,
        ny: usize,
        nx: usize,
        ndep: usize,
    ) -> Result<Self, ModelIoError> {
        let mut file = netcdf::create(path)?;

        file.add_unlimited_dimension("time")?;
        file.add_dimension("y", ny)?;
        file.add_dimension("x", nx)?;
        file.add_dimension("ndep", ndep)?;

        for (field, units) in MODEL_VARIABLES {
            let mut var = file.add_variable::<f32>(field.name(), &["time", "y", "x", "ndep"])?;
            var.put_attribute("units", units)?;
        }

        file.add_attribute("source", "atmos-rs")?;
        let now = Utc::now();
        file.add_attribute(
            "history",
            format!("{}: created by atmos-rs", now.format("%Y-%m-%d %H:%M:%S UTC")).as_str(),
        )?;

        Ok(Self {
            file,
            ny,
            nx,
            ndep,
            time_index: 0,
        })
    }

    /// Append `grid` as the next time step; returns its index.
    pub fn write_timestep(&mut self, grid: &DepthModelGrid) -> Result<usize, ModelIoError> {
        if (grid.ny(), grid.nx(), grid.ndep()) != (self.ny, self.nx, self.ndep) {
            return Err(ModelIoError::InvalidDimensions(format!(
                "grid is {}x{}x{}, file is {}x{}x{}",
                grid.ny(),
                grid.nx(),
                grid.ndep(),
                self.ny,
                self.nx,
                self.ndep
            )));
        }
        let t_idx = self.time_index;
        for (field, _) in MODEL_VARIABLES {
            let data: Vec<f32> = grid
                .models()
                .iter()
                .flat_map(|m| m.field(field).iter().map(|&v| v as f32))
                .collect();
            let mut var = self
                .file
                .variable_mut(field.name())
                .ok_or(ModelIoError::MissingVariable(field.name()))?;
            var.put_values(&data, (t_idx, .., .., ..))?;
        }
        self.time_index += 1;
        Ok(t_idx)
    }

    pub fn n_timesteps(&self) -> usize {
        self.time_index
    }
}
