//! In-memory reader backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::debug;

use grid_common::{GridError, Result};

use super::descriptor::DatasetDescriptor;
use super::Reader;
use crate::blocks::{decimate, fill_blocks, value_range, BlockGeometry};
use crate::types::{BlockRange, CoordSystem, GridKind, VarType};

/// Backend call counters. Clones share the same counts.
#[derive(Debug, Clone, Default)]
pub struct ReadCounters {
    opens: Arc<AtomicU64>,
    closes: Arc<AtomicU64>,
    block_reads: Arc<AtomicU64>,
}

impl ReadCounters {
    pub fn opens(&self) -> u64 {
        self.opens.load(Ordering::Relaxed)
    }

    pub fn closes(&self) -> u64 {
        self.closes.load(Ordering::Relaxed)
    }

    /// Number of `block_read_region` calls.
    pub fn block_reads(&self) -> u64 {
        self.block_reads.load(Ordering::Relaxed)
    }
}

type FieldKey = (usize, String, usize, usize);

struct Field {
    data: Vec<f32>,
    range: [f32; 2],
}

struct OpenField {
    key: FieldKey,
    geometry: BlockGeometry,
}

/// Reader over voxel arrays held in memory.
///
/// Fields are stored per (timestep, variable, level, lod), x fastest, at the
/// level's voxel dimensions. Blocks are decoded on a dedicated rayon pool.
pub struct MemoryReader {
    desc: DatasetDescriptor,
    fields: HashMap<FieldKey, Field>,
    open: Option<OpenField>,
    pool: rayon::ThreadPool,
    counters: ReadCounters,
}

impl MemoryReader {
    /// Create an empty reader. `threads == 0` uses one thread per core.
    pub fn new(desc: DatasetDescriptor, threads: usize) -> Result<Self> {
        desc.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("memory-reader-{}", i))
            .build()
            .map_err(|e| GridError::io(format!("failed to build reader pool: {}", e)))?;
        Ok(Self {
            desc,
            fields: HashMap::new(),
            open: None,
            pool,
            counters: ReadCounters::default(),
        })
    }

    pub fn descriptor(&self) -> &DatasetDescriptor {
        &self.desc
    }

    /// Shared handle on the call counters.
    pub fn counters(&self) -> ReadCounters {
        self.counters.clone()
    }

    /// Store a field at one level. `data` is x fastest at the level's voxel
    /// dimensions.
    pub fn set_field(
        &mut self,
        ts: usize,
        varname: &str,
        reflevel: usize,
        lod: usize,
        data: Vec<f32>,
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
        let range = value_range(&data, missing).unwrap_or([0.0, 0.0]);
        self.fields.insert(
            (ts, varname.to_string(), reflevel, lod),
            Field { data, range },
        );
        Ok(())
    }

    /// Store a finest-level field for every lod and derive the coarser
    /// levels by subsampling.
    pub fn set_field_all_levels(&mut self, ts: usize, varname: &str, data: Vec<f32>) -> Result<()> {
        let nt = self.desc.num_transforms;
        let fine = self.desc.geometry(varname, nt)?.dims;
        for level in 0..nt {
            let coarse = self.desc.geometry(varname, level)?.dims;
            let level_data = decimate(&data, fine, coarse, nt - level);
            for lod in 0..self.desc.num_lods {
                self.set_field(ts, varname, level, lod, level_data.clone())?;
            }
        }
        for lod in 0..self.desc.num_lods {
            self.set_field(ts, varname, nt, lod, data.clone())?;
        }
        Ok(())
    }

    /// Fill every timestep, level and lod of a variable from a function of
    /// finest-level voxel coordinates and timestep.
    pub fn set_field_fn<F>(&mut self, varname: &str, f: F) -> Result<()>
    where
        F: Fn(usize, usize, usize, usize) -> f32,
    {
        let dims = self.desc.geometry(varname, self.desc.num_transforms)?.dims;
        for ts in 0..self.desc.timesteps.len() {
            let mut data = Vec::with_capacity(dims.iter().product());
            for z in 0..dims[2] {
                for y in 0..dims[1] {
                    for x in 0..dims[0] {
                        data.push(f(ts, x, y, z));
                    }
                }
            }
            self.set_field_all_levels(ts, varname, data)?;
        }
        Ok(())
    }

    fn open_field(&self) -> Result<(&OpenField, &Field)> {
        let open = self
            .open
            .as_ref()
            .ok_or_else(|| GridError::invalid_argument("no variable is open"))?;
        let field = self
            .fields
            .get(&open.key)
            .ok_or_else(|| GridError::io(format!("field {} vanished", open.key.1)))?;
        Ok((open, field))
    }
}

impl Reader for MemoryReader {
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
        self.fields
            .contains_key(&(ts, varname.to_string(), reflevel, lod))
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
        let key = (ts, varname.to_string(), reflevel, lod);
        if !self.fields.contains_key(&key) {
            return Err(GridError::io(format!(
                "no data for {} at ts {}, level {}, lod {}",
                varname, ts, reflevel, lod
            )));
        }
        if let Some(prev) = self.open.take() {
            debug!(varname = %prev.key.1, "Replacing open variable");
        }
        self.counters.opens.fetch_add(1, Ordering::Relaxed);
        self.open = Some(OpenField { key, geometry });
        Ok(())
    }

    fn close_variable(&mut self) -> Result<()> {
        if self.open.take().is_some() {
            self.counters.closes.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    fn block_read_region(
        &mut self,
        bmin: [usize; 3],
        bmax: [usize; 3],
        blocks: &mut [Vec<f32>],
    ) -> Result<()> {
        self.counters.block_reads.fetch_add(1, Ordering::Relaxed);
        let (open, field) = self.open_field()?;
        let range = BlockRange::new(bmin, bmax);
        let geometry = open.geometry;
        geometry.validate_range(&range)?;

        let dims = geometry.dims;
        let data = &field.data;
        self.pool.install(|| {
            fill_blocks(&range, geometry.bs, dims, blocks, |x, y, z| {
                data[(z * dims[1] + y) * dims[0] + x]
            })
        })
    }

    fn data_range(&self) -> Result<[f32; 2]> {
        let (_, field) = self.open_field()?;
        Ok(field.range)
    }

    fn valid_region(&self, reflevel: usize) -> Result<([usize; 3], [usize; 3])> {
        let (open, _) = self.open_field()?;
        let dims = self.desc.geometry(&open.key.1, reflevel)?.dims;
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
        "memory"
    }
}
