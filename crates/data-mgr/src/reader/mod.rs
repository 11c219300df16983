//! Backend reader interface and implementations.
//!
//! A reader exposes a dataset's catalog and geometry and decodes blocks of
//! one open variable at a time. The data manager only talks to the
//! [`Reader`] trait.

mod descriptor;
mod memory;
mod zarr;

pub use descriptor::{DatasetDescriptor, VariableDescriptor, DEFAULT_ELEVATION_VARIABLE};
pub use memory::{MemoryReader, ReadCounters};
pub use zarr::{ZarrDatasetWriter, ZarrReader};

use grid_common::Result;

use crate::types::{CoordSystem, GridKind, VarType};

/// Capability interface of a block-oriented dataset backend.
pub trait Reader {
    // ---- catalog ----

    fn num_timesteps(&self) -> usize;

    /// Voxel dimensions at a refinement level.
    fn grid_dim(&self, reflevel: usize) -> Result<[usize; 3]>;

    /// Block size, identical at every level.
    fn block_size(&self) -> [usize; 3];

    /// Number of coarsening transforms; levels run `0..=num_transforms`.
    fn num_transforms(&self) -> usize;

    /// Number of compression tiers.
    fn num_lods(&self) -> usize;

    fn variables_3d(&self) -> Vec<String>;
    fn variables_2d_xy(&self) -> Vec<String>;
    fn variables_2d_xz(&self) -> Vec<String>;
    fn variables_2d_yz(&self) -> Vec<String>;

    fn variable_exists(&self, ts: usize, varname: &str, reflevel: usize, lod: usize) -> bool;

    // ---- session ----

    /// Open a variable for reading. Only one variable is open at a time.
    fn open_variable_read(
        &mut self,
        ts: usize,
        varname: &str,
        reflevel: usize,
        lod: usize,
    ) -> Result<()>;

    fn close_variable(&mut self) -> Result<()>;

    /// Decode the blocks `bmin..=bmax` of the open variable into `blocks`,
    /// block-major with x fastest.
    fn block_read_region(
        &mut self,
        bmin: [usize; 3],
        bmax: [usize; 3],
        blocks: &mut [Vec<f32>],
    ) -> Result<()>;

    /// Min and max of the open variable.
    fn data_range(&self) -> Result<[f32; 2]>;

    /// Voxel bounds of the open variable that hold data, at `reflevel`.
    fn valid_region(&self, reflevel: usize) -> Result<([usize; 3], [usize; 3])>;

    // ---- metadata ----

    fn ts_user_time(&self, ts: usize) -> Result<f64>;

    fn ts_user_time_stamp(&self, ts: usize) -> Result<Option<String>>;

    fn periodic_boundary(&self) -> [bool; 3];

    /// Storage axis to spherical axis map (0 = lon, 1 = lat, 2 = radius).
    fn grid_permutation(&self) -> [usize; 3];

    fn coord_system_type(&self) -> CoordSystem;

    fn grid_type(&self) -> GridKind;

    fn missing_value(&self, varname: &str) -> Option<f32>;

    /// Map a voxel coordinate at `reflevel` to user coordinates.
    fn map_vox_to_user(&self, ts: usize, vcoord: [usize; 3], reflevel: usize) -> Result<[f64; 3]>;

    /// Name of the variable that carries layer elevations.
    fn elevation_variable(&self) -> String {
        DEFAULT_ELEVATION_VARIABLE.to_string()
    }

    /// Short backend name for logging.
    fn backend_name(&self) -> &'static str;

    /// Dimensionality of a variable, if it is in the catalog.
    fn var_type(&self, varname: &str) -> Option<VarType> {
        let has = |names: Vec<String>| names.iter().any(|n| n == varname);
        if has(self.variables_3d()) {
            Some(VarType::Var3D)
        } else if has(self.variables_2d_xy()) {
            Some(VarType::Var2DXY)
        } else if has(self.variables_2d_xz()) {
            Some(VarType::Var2DXZ)
        } else if has(self.variables_2d_yz()) {
            Some(VarType::Var2DYZ)
        } else {
            None
        }
    }
}
