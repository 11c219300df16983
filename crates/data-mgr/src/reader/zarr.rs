//! Zarr V3 reader backend.
//!
//! Dataset layout on disk:
//!
//! ```text
//! <root>/dataset.json                              descriptor
//! <root>/<var>/ts<ts>/level<l>/lod<lod>.zarr/      one array per field
//! ```
//!
//! Each array is shaped `[nz, ny, nx]` at its level, chunked by the block
//! size, and carries a `data_range` attribute.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};
use zarrs::array::{Array, ArrayBuilder, DataType, FillValue};
use zarrs::array_subset::ArraySubset;
use zarrs_filesystem::FilesystemStore;

use grid_common::{GridError, Result};

use super::descriptor::DatasetDescriptor;
use super::Reader;
use crate::blocks::{decimate, fill_blocks, value_range, BlockGeometry};
use crate::types::{BlockRange, CoordSystem, GridKind, VarType};

const DESCRIPTOR_FILE: &str = "dataset.json";
const DATA_RANGE_ATTR: &str = "data_range";

fn field_path(root: &Path, varname: &str, ts: usize, reflevel: usize, lod: usize) -> PathBuf {
    root.join(varname)
        .join(format!("ts{}", ts))
        .join(format!("level{}", reflevel))
        .join(format!("lod{}.zarr", lod))
}

/// Zarr uses `[z, y, x]` ordering.
fn zyx(v: [usize; 3]) -> Vec<u64> {
    vec![v[2] as u64, v[1] as u64, v[0] as u64]
}

struct OpenArray {
    varname: String,
    array: Array<FilesystemStore>,
    geometry: BlockGeometry,
}

/// Reader over a Zarr dataset directory.
pub struct ZarrReader {
    root: PathBuf,
    desc: DatasetDescriptor,
    open: Option<OpenArray>,
    pool: rayon::ThreadPool,
}

impl ZarrReader {
    /// Open a dataset directory. `threads == 0` uses one thread per core.
    pub fn open(root: impl AsRef<Path>, threads: usize) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let desc = DatasetDescriptor::from_path(root.join(DESCRIPTOR_FILE))?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("zarr-reader-{}", i))
            .build()
            .map_err(|e| GridError::io(format!("failed to build reader pool: {}", e)))?;
        info!(
            root = %root.display(),
            variables = desc.variables.len(),
            timesteps = desc.timesteps.len(),
            "Opened Zarr dataset"
        );
        Ok(Self {
            root,
            desc,
            open: None,
            pool,
        })
    }

    pub fn descriptor(&self) -> &DatasetDescriptor {
        &self.desc
    }

    fn open_array(&self) -> Result<&OpenArray> {
        self.open
            .as_ref()
            .ok_or_else(|| GridError::invalid_argument("no variable is open"))
    }
}

impl Reader for ZarrReader {
    fn num_timesteps(&self) -> usize {
        self.desc.timesteps.len()
    }

    fn grid_dim(&self, reflevel: usize) -> Result<[usize; 3]> {
        self.desc.grid_dim(reflevel)
    }

    fn block_size(&self) -> [usize; 3] {
        self.desc.block_size
    }

    fn num_transforms(&self) -> usize {
        self.desc.num_transforms
    }

    fn num_lods(&self) -> usize {
        self.desc.num_lods
    }

    fn variables_3d(&self) -> Vec<String> {
        self.desc.names_of(VarType::Var3D)
    }

    fn variables_2d_xy(&self) -> Vec<String> {
        self.desc.names_of(VarType::Var2DXY)
    }

    fn variables_2d_xz(&self) -> Vec<String> {
        self.desc.names_of(VarType::Var2DXZ)
    }

    fn variables_2d_yz(&self) -> Vec<String> {
        self.desc.names_of(VarType::Var2DYZ)
    }

    fn variable_exists(&self, ts: usize, varname: &str, reflevel: usize, lod: usize) -> bool {
        self.desc.variable(varname).is_some()
            && field_path(&self.root, varname, ts, reflevel, lod)
                .join("zarr.json")
                .is_file()
    }

    fn open_variable_read(
        &mut self,
        ts: usize,
        varname: &str,
        reflevel: usize,
        lod: usize,
    ) -> Result<()> {
        self.desc.check_timestep(ts)?;
        let geometry = self.desc.geometry(varname, reflevel)?;
        if lod >= self.desc.num_lods {
            return Err(GridError::invalid_argument(format!("lod {} out of range", lod)));
        }

        let path = field_path(&self.root, varname, ts, reflevel, lod);
        let store = FilesystemStore::new(&path)
            .map_err(|e| GridError::io(format!("{}: {}", path.display(), e)))?;
        let array = Array::open(Arc::new(store), "/")
            .map_err(|e| GridError::io(format!("{}: {}", path.display(), e)))?;

        let expected = zyx(geometry.dims);
        if array.shape() != expected.as_slice() {
            return Err(GridError::format(format!(
                "{}: shape {:?}, expected {:?}",
                path.display(),
                array.shape(),
                expected
            )));
        }

        debug!(varname = %varname, ts = ts, reflevel = reflevel, lod = lod, "Opened Zarr field");
        self.open = Some(OpenArray {
            varname: varname.to_string(),
            array,
            geometry,
        });
        Ok(())
    }

    fn close_variable(&mut self) -> Result<()> {
        self.open = None;
        Ok(())
    }

    fn block_read_region(
        &mut self,
        bmin: [usize; 3],
        bmax: [usize; 3],
        blocks: &mut [Vec<f32>],
    ) -> Result<()> {
        let open = self.open_array()?;
        let range = BlockRange::new(bmin, bmax);
        let geometry = open.geometry;
        geometry.validate_range(&range)?;

        let (vmin, vmax) = geometry.voxel_range(&range);
        let shape = [
            vmax[0] - vmin[0] + 1,
            vmax[1] - vmin[1] + 1,
            vmax[2] - vmin[2] + 1,
        ];
        let subset = ArraySubset::new_with_start_shape(zyx(vmin), zyx(shape))
            .map_err(|e| GridError::invalid_argument(e.to_string()))?;
        let data: Vec<f32> = open
            .array
            .retrieve_array_subset_elements(&subset)
            .map_err(|e| GridError::io(format!("{}: {}", open.varname, e)))?;

        // the box is clamped to the level, so sampled coordinates never
        // exceed `vmax`
        self.pool.install(|| {
            fill_blocks(&range, geometry.bs, geometry.dims, blocks, |x, y, z| {
                let (x, y, z) = (x - vmin[0], y - vmin[1], z - vmin[2]);
                data[(z * shape[1] + y) * shape[0] + x]
            })
        })
    }

    fn data_range(&self) -> Result<[f32; 2]> {
        let open = self.open_array()?;
        let range = open
            .array
            .attributes()
            .get(DATA_RANGE_ATTR)
            .and_then(|v| v.as_array())
            .and_then(|a| Some([a.first()?.as_f64()? as f32, a.get(1)?.as_f64()? as f32]))
            .ok_or_else(|| {
                GridError::format(format!("{}: missing {} attribute", open.varname, DATA_RANGE_ATTR))
            })?;
        Ok(range)
    }

    fn valid_region(&self, reflevel: usize) -> Result<([usize; 3], [usize; 3])> {
        let open = self.open_array()?;
        let dims = self.desc.geometry(&open.varname, reflevel)?.dims;
        Ok(([0, 0, 0], [dims[0] - 1, dims[1] - 1, dims[2] - 1]))
    }

    fn ts_user_time(&self, ts: usize) -> Result<f64> {
        self.desc.check_timestep(ts)?;
        Ok(self.desc.timesteps[ts].user_time)
    }

    fn ts_user_time_stamp(&self, ts: usize) -> Result<Option<String>> {
        self.desc.check_timestep(ts)?;
        Ok(self.desc.timesteps[ts].time_stamp.clone())
    }

    fn periodic_boundary(&self) -> [bool; 3] {
        self.desc.periodic
    }

    fn grid_permutation(&self) -> [usize; 3] {
        self.desc.grid_permutation
    }

    fn coord_system_type(&self) -> CoordSystem {
        self.desc.coord_system
    }

    fn grid_type(&self) -> GridKind {
        self.desc.grid_type
    }

    fn missing_value(&self, varname: &str) -> Option<f32> {
        self.desc.variable(varname).and_then(|v| v.missing_value)
    }

    fn map_vox_to_user(&self, ts: usize, vcoord: [usize; 3], reflevel: usize) -> Result<[f64; 3]> {
        self.desc.map_vox_to_user(ts, vcoord, reflevel)
    }

    fn elevation_variable(&self) -> String {
        self.desc.elevation_variable.clone()
    }

    fn backend_name(&self) -> &'static str {
        "zarr"
    }
}

/// Writes a dataset directory readable by [`ZarrReader`].
pub struct ZarrDatasetWriter {
    root: PathBuf,
    desc: DatasetDescriptor,
}

impl ZarrDatasetWriter {
    /// Create the dataset directory and write its descriptor.
    pub fn create(root: impl AsRef<Path>, desc: DatasetDescriptor) -> Result<Self> {
        desc.validate()?;
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)
            .map_err(|e| GridError::io(format!("{}: {}", root.display(), e)))?;
        desc.write(root.join(DESCRIPTOR_FILE))?;
        Ok(Self { root, desc })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write one field at one level. `data` is x fastest at the level's
    /// voxel dimensions.
    pub fn write_field(
        &self,
        ts: usize,
        varname: &str,
        reflevel: usize,
        lod: usize,
        data: &[f32],
    ) -> Result<()> {
        self.desc.check_timestep(ts)?;
        if lod >= self.desc.num_lods {
            return Err(GridError::invalid_argument(format!("lod {} out of range", lod)));
        }
        let geometry = self.desc.geometry(varname, reflevel)?;
        let expected = geometry.dims.iter().product::<usize>();
        if data.len() != expected {
            return Err(GridError::invalid_argument(format!(
                "{} expects {} values at level {}, got {}",
                varname,
                expected,
                reflevel,
                data.len()
            )));
        }

        let missing = self.desc.variable(varname).and_then(|v| v.missing_value);
        let range = value_range(data, missing).unwrap_or([0.0, 0.0]);

        let path = field_path(&self.root, varname, ts, reflevel, lod);
        std::fs::create_dir_all(&path)
            .map_err(|e| GridError::io(format!("{}: {}", path.display(), e)))?;
        let store = Arc::new(
            FilesystemStore::new(&path)
                .map_err(|e| GridError::io(format!("{}: {}", path.display(), e)))?,
        );

        let mut attrs = serde_json::Map::new();
        attrs.insert("variable".to_string(), serde_json::json!(varname));
        attrs.insert(DATA_RANGE_ATTR.to_string(), serde_json::json!(range));

        let chunk_grid: zarrs::array::ChunkGrid = zyx(geometry.bs)
            .try_into()
            .map_err(|e| GridError::invalid_argument(format!("{:?}", e)))?;
        let array = ArrayBuilder::new(
            zyx(geometry.dims),
            DataType::Float32,
            chunk_grid,
            FillValue::from(f32::NAN),
        )
        .attributes(attrs)
        .build(store, "/")
        .map_err(|e| GridError::io(e.to_string()))?;

        array
            .store_metadata()
            .map_err(|e| GridError::io(e.to_string()))?;

        let subset = ArraySubset::new_with_start_shape(vec![0, 0, 0], zyx(geometry.dims))
            .map_err(|e| GridError::invalid_argument(e.to_string()))?;
        array
            .store_array_subset_elements(&subset, data)
            .map_err(|e| GridError::io(e.to_string()))?;

        debug!(varname = %varname, ts = ts, reflevel = reflevel, lod = lod, "Wrote Zarr field");
        Ok(())
    }

    /// Write a finest-level field for every lod and its subsampled coarser
    /// levels.
    pub fn write_field_all_levels(&self, ts: usize, varname: &str, data: &[f32]) -> Result<()> {
        let nt = self.desc.num_transforms;
        let fine = self.desc.geometry(varname, nt)?.dims;
        for level in 0..=nt {
            let coarse = self.desc.geometry(varname, level)?.dims;
            let level_data = if level == nt {
                data.to_vec()
            } else {
                decimate(data, fine, coarse, nt - level)
            };
            for lod in 0..self.desc.num_lods {
                self.write_field(ts, varname, level, lod, &level_data)?;
            }
        }
        Ok(())
    }
}
