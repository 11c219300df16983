//! The data manager: a region cache in front of a block reader.

use std::collections::HashMap;
use std::rc::Rc;

use grid_common::{GridError, Result};

use crate::blocks::BlockGeometry;
use crate::cache::{BlockPool, BlockSet, CachedRegion, RegionCache, Reservation};
use crate::config::DataMgrConfig;
use crate::grid::{Grid, LayeredGrid, RegularGrid, SphericalGrid};
use crate::quantize::{quantize_all, QuantizedValue};
use crate::reader::Reader;
use crate::types::{
    BlockRange, CacheStats, CoordSystem, GridKind, RegionKey, RegionKind, VarType, VariableKey,
};

/// Index of a variable in the manager's catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarId(usize);

#[derive(Debug, Clone)]
struct VarInfo {
    name: String,
    var_type: VarType,
}

type ValidRegion = ([usize; 3], [usize; 3]);

/// Serves grid regions of any variable, timestep, level and lod from a
/// [`Reader`], caching them under a byte budget.
///
/// Not thread safe: grids share their buffers with the cache through `Rc`.
pub struct DataMgr<R: Reader> {
    reader: R,
    config: DataMgrConfig,
    pool: BlockPool,
    cache: RegionCache,
    variables: Vec<VarInfo>,
    elevation: Option<VarId>,
    data_ranges: HashMap<(usize, VarId), [f32; 2]>,
    valid_regions: HashMap<(usize, VarId, usize), ValidRegion>,
    quantization_ranges: HashMap<VarId, [f32; 2]>,
}

impl<R: Reader> DataMgr<R> {
    /// Create a manager over `reader`.
    ///
    /// For layered datasets the elevation variable must be a 3-D variable of
    /// the catalog.
    pub fn new(reader: R, config: DataMgrConfig) -> Result<Self> {
        config.validate().map_err(GridError::invalid_argument)?;

        let mut variables = Vec::new();
        for (names, var_type) in [
            (reader.variables_3d(), VarType::Var3D),
            (reader.variables_2d_xy(), VarType::Var2DXY),
            (reader.variables_2d_xz(), VarType::Var2DXZ),
            (reader.variables_2d_yz(), VarType::Var2DYZ),
        ] {
            variables.extend(names.into_iter().map(|name| VarInfo { name, var_type }));
        }

        let elevation_name = reader.elevation_variable();
        let elevation = variables
            .iter()
            .position(|v| v.name == elevation_name && v.var_type == VarType::Var3D)
            .map(VarId);
        if reader.grid_type() == GridKind::Layered && elevation.is_none() {
            return Err(GridError::not_found(format!(
                "layered dataset has no 3-D elevation variable {}",
                elevation_name
            )));
        }

        tracing::info!(
            backend = reader.backend_name(),
            variables = variables.len(),
            timesteps = reader.num_timesteps(),
            budget_bytes = config.cache_size_bytes(),
            "Created data manager"
        );

        Ok(Self {
            pool: BlockPool::new(config.cache_size_bytes()),
            reader,
            config,
            cache: RegionCache::new(),
            variables,
            elevation,
            data_ranges: HashMap::new(),
            valid_regions: HashMap::new(),
            quantization_ranges: HashMap::new(),
        })
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    pub fn config(&self) -> &DataMgrConfig {
        &self.config
    }

    // ---- catalog ----

    pub fn num_timesteps(&self) -> usize {
        self.reader.num_timesteps()
    }

    pub fn num_transforms(&self) -> usize {
        self.reader.num_transforms()
    }

    pub fn num_lods(&self) -> usize {
        self.reader.num_lods()
    }

    /// All variable names: 3-D first, then XY, XZ and YZ.
    pub fn variable_names(&self) -> Vec<&str> {
        self.variables.iter().map(|v| v.name.as_str()).collect()
    }

    pub fn var_type(&self, varname: &str) -> Option<VarType> {
        self.resolve(varname).ok().map(|id| self.variables[id.0].var_type)
    }

    /// Name of the elevation variable, when the catalog has one.
    pub fn elevation_variable(&self) -> Option<&str> {
        self.elevation.map(|id| self.variables[id.0].name.as_str())
    }

    pub fn variable_exists(&self, ts: usize, varname: &str, reflevel: usize, lod: usize) -> bool {
        self.resolve(varname).is_ok() && self.reader.variable_exists(ts, varname, reflevel, lod)
    }

    pub fn ts_user_time(&self, ts: usize) -> Result<f64> {
        self.reader.ts_user_time(ts)
    }

    pub fn ts_user_time_stamp(&self, ts: usize) -> Result<Option<String>> {
        self.reader.ts_user_time_stamp(ts)
    }

    /// Number of blocks along each axis of a variable at a level.
    pub fn block_dims(&self, varname: &str, reflevel: usize) -> Result<[usize; 3]> {
        let var = self.resolve(varname)?;
        Ok(self.geometry(var, reflevel)?.bdims)
    }

    fn resolve(&self, varname: &str) -> Result<VarId> {
        self.variables
            .iter()
            .position(|v| v.name == varname)
            .map(VarId)
            .ok_or_else(|| GridError::not_found(format!("variable {}", varname)))
    }

    fn geometry(&self, var: VarId, reflevel: usize) -> Result<BlockGeometry> {
        if reflevel > self.reader.num_transforms() {
            return Err(GridError::invalid_argument(format!(
                "refinement level {} exceeds {}",
                reflevel,
                self.reader.num_transforms()
            )));
        }
        BlockGeometry::for_variable(
            self.variables[var.0].var_type,
            self.reader.grid_dim(reflevel)?,
            self.reader.block_size(),
        )
    }

    fn check_timestep(&self, ts: usize) -> Result<()> {
        if ts >= self.reader.num_timesteps() {
            return Err(GridError::not_found(format!(
                "timestep {} (dataset has {})",
                ts,
                self.reader.num_timesteps()
            )));
        }
        Ok(())
    }

    fn validate_request(
        &self,
        ts: usize,
        var: VarId,
        reflevel: usize,
        lod: usize,
        range: &BlockRange,
    ) -> Result<BlockGeometry> {
        self.check_timestep(ts)?;
        if lod >= self.reader.num_lods() {
            return Err(GridError::invalid_argument(format!(
                "lod {} exceeds {}",
                lod,
                self.reader.num_lods().saturating_sub(1)
            )));
        }
        let geometry = self.geometry(var, reflevel)?;
        geometry.validate_range(range)?;
        Ok(geometry)
    }

    fn region_key(
        &self,
        ts: usize,
        var: VarId,
        reflevel: usize,
        lod: usize,
        range: BlockRange,
        kind: RegionKind,
    ) -> RegionKey {
        RegionKey {
            var: VariableKey::new(ts, self.variables[var.0].name.clone(), reflevel, lod),
            range,
            kind,
        }
    }

    // ---- regions ----

    /// Grid over the blocks `bmin..=bmax` of a variable.
    ///
    /// Repeated requests are served from the cache. The returned grid pins
    /// its cache entry until it is dropped.
    pub fn get_grid(
        &mut self,
        ts: usize,
        varname: &str,
        reflevel: usize,
        lod: usize,
        bmin: [usize; 3],
        bmax: [usize; 3],
    ) -> Result<Grid> {
        let var = self.resolve(varname)?;
        self.fetch_grid(ts, var, reflevel, lod, BlockRange::new(bmin, bmax))
    }

    fn fetch_grid(
        &mut self,
        ts: usize,
        var: VarId,
        reflevel: usize,
        lod: usize,
        range: BlockRange,
    ) -> Result<Grid> {
        let geometry = self.validate_request(ts, var, reflevel, lod, &range)?;
        let key = self.region_key(ts, var, reflevel, lod, range, RegionKind::Float);

        if let Some(CachedRegion::Grid(grid)) = self.cache.get(&key) {
            tracing::debug!(
                varname = %key.var.varname,
                ts = ts,
                reflevel = reflevel,
                lod = lod,
                "Cache hit"
            );
            return Ok(grid.clone());
        }

        tracing::debug!(
            varname = %key.var.varname,
            ts = ts,
            reflevel = reflevel,
            lod = lod,
            bmin = ?range.bmin,
            bmax = ?range.bmax,
            "Cache miss"
        );

        let mut blocks = self.checkout(range.num_blocks(), geometry.block_len())?;
        let name = key.var.varname.clone();
        self.with_open_variable(ts, &name, reflevel, lod, |reader| {
            reader.block_read_region(range.bmin, range.bmax, blocks.blocks_mut())
        })?;

        let grid = self
            .make_grid(ts, var, reflevel, lod, &geometry, range, Rc::new(blocks))?
            .with_interpolation_order(self.config.interpolation);

        self.cache.insert(key, CachedRegion::Grid(grid.clone()));
        Ok(grid)
    }

    /// Build the grid variant the dataset calls for.
    #[allow(clippy::too_many_arguments)]
    fn make_grid(
        &mut self,
        ts: usize,
        var: VarId,
        reflevel: usize,
        lod: usize,
        geometry: &BlockGeometry,
        range: BlockRange,
        blocks: Rc<BlockSet>,
    ) -> Result<Grid> {
        let (vmin, vmax) = geometry.voxel_range(&range);
        let minu = self.reader.map_vox_to_user(ts, vmin, reflevel)?;
        let maxu = self.reader.map_vox_to_user(ts, vmax, reflevel)?;
        let periodic = geometry.periodic(&range, self.reader.periodic_boundary());
        let info = &self.variables[var.0];
        let missing = self.reader.missing_value(&info.name);

        let regular = RegularGrid::new(
            blocks,
            geometry.bs,
            vmin,
            vmax,
            minu,
            maxu,
            periodic,
            missing,
        )?;

        if self.reader.coord_system_type() == CoordSystem::Spherical {
            let grid = SphericalGrid::new(regular, self.reader.grid_permutation())?;
            return Ok(Grid::Spherical(grid));
        }

        let layered = self.reader.grid_type() == GridKind::Layered
            && info.var_type == VarType::Var3D
            && Some(var) != self.elevation;
        match (layered, self.elevation) {
            (true, Some(elevation)) => {
                let elev = match self.fetch_grid(ts, elevation, reflevel, lod, range)? {
                    Grid::Regular(g) => g,
                    other => {
                        return Err(GridError::invalid_argument(format!(
                            "elevation grid must be regular, got {}",
                            other.kind()
                        )))
                    }
                };
                Ok(Grid::Layered(LayeredGrid::new(regular, elev)?))
            }
            _ => Ok(Grid::Regular(regular)),
        }
    }

    /// Region voxels quantized to 8 bits over `range`, x fastest.
    #[allow(clippy::too_many_arguments)]
    pub fn get_region_u8(
        &mut self,
        ts: usize,
        varname: &str,
        reflevel: usize,
        lod: usize,
        bmin: [usize; 3],
        bmax: [usize; 3],
        range: [f32; 2],
    ) -> Result<Rc<Vec<u8>>> {
        self.get_region_quantized(ts, varname, reflevel, lod, BlockRange::new(bmin, bmax), range)
    }

    /// Region voxels quantized to 16 bits over `range`, x fastest.
    #[allow(clippy::too_many_arguments)]
    pub fn get_region_u16(
        &mut self,
        ts: usize,
        varname: &str,
        reflevel: usize,
        lod: usize,
        bmin: [usize; 3],
        bmax: [usize; 3],
        range: [f32; 2],
    ) -> Result<Rc<Vec<u16>>> {
        self.get_region_quantized(ts, varname, reflevel, lod, BlockRange::new(bmin, bmax), range)
    }

    fn get_region_quantized<T: QuantizedValue>(
        &mut self,
        ts: usize,
        varname: &str,
        reflevel: usize,
        lod: usize,
        blocks: BlockRange,
        range: [f32; 2],
    ) -> Result<Rc<Vec<T>>> {
        if !range[0].is_finite() || !range[1].is_finite() || range[0] > range[1] {
            return Err(GridError::invalid_argument(format!(
                "invalid quantization range {:?}",
                range
            )));
        }
        let var = self.resolve(varname)?;
        self.validate_request(ts, var, reflevel, lod, &blocks)?;

        if self.quantization_ranges.get(&var) != Some(&range) {
            let removed = self
                .cache
                .remove_where(|k| k.var.varname == varname && k.kind != RegionKind::Float);
            if removed > 0 {
                tracing::debug!(
                    varname = %varname,
                    removed = removed,
                    "Quantization range changed, purged quantized regions"
                );
            }
            self.quantization_ranges.insert(var, range);
        }

        let key = self.region_key(ts, var, reflevel, lod, blocks, T::KIND);
        // a miss here is counted once, by the float lookup in fetch_grid
        if let Some(CachedRegion::Quantized { data, .. }) = self.cache.get_derived(&key) {
            if let Some(data) = T::unwrap(data) {
                return Ok(data);
            }
        }

        let grid = self.fetch_grid(ts, var, reflevel, lod, blocks)?;
        let [nx, ny, nz] = grid.dimensions();
        let reservation = self.reserve(nx * ny * nz * std::mem::size_of::<T>())?;
        let data: Rc<Vec<T>> = Rc::new(quantize_all(grid.iter(), range));
        drop(grid);

        self.cache.insert(
            key,
            CachedRegion::Quantized {
                data: T::wrap(Rc::clone(&data)),
                reservation,
            },
        );
        Ok(data)
    }

    /// Global min and max of a variable at a timestep, read at the finest
    /// level and cached.
    pub fn get_data_range(&mut self, ts: usize, varname: &str) -> Result<[f32; 2]> {
        let var = self.resolve(varname)?;
        self.check_timestep(ts)?;
        if let Some(range) = self.data_ranges.get(&(ts, var)) {
            return Ok(*range);
        }
        let reflevel = self.reader.num_transforms();
        let range = self.with_open_variable(ts, varname, reflevel, 0, |reader| reader.data_range())?;
        self.data_ranges.insert((ts, var), range);
        Ok(range)
    }

    /// Voxel bounds of a variable guaranteed to hold data at `reflevel`.
    pub fn get_valid_region(
        &mut self,
        ts: usize,
        varname: &str,
        reflevel: usize,
    ) -> Result<ValidRegion> {
        let var = self.resolve(varname)?;
        self.check_timestep(ts)?;
        self.geometry(var, reflevel)?;
        if let Some(region) = self.valid_regions.get(&(ts, var, reflevel)) {
            return Ok(*region);
        }
        let region = self.with_open_variable(ts, varname, reflevel, 0, |reader| {
            reader.valid_region(reflevel)
        })?;
        self.valid_regions.insert((ts, var, reflevel), region);
        Ok(region)
    }

    // ---- maintenance ----

    /// Drop every cache entry. Buffers still held by grids return to the
    /// pool when those grids drop.
    pub fn clear(&mut self) {
        self.cache.clear();
        self.data_ranges.clear();
        self.valid_regions.clear();
        self.quantization_ranges.clear();
        tracing::debug!("Cleared data manager cache");
    }

    /// Drop every cached entry of one variable. Returns the number of
    /// regions removed.
    pub fn purge_variable(&mut self, varname: &str) -> Result<usize> {
        let var = self.resolve(varname)?;
        let removed = self.cache.remove_where(|k| k.var.varname == varname);
        self.data_ranges.retain(|(_, v), _| *v != var);
        self.valid_regions.retain(|(_, v, _), _| *v != var);
        self.quantization_ranges.remove(&var);
        tracing::debug!(varname = %varname, removed = removed, "Purged variable");
        Ok(removed)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Bytes currently charged to the budget, including buffers held only
    /// by live grids.
    pub fn memory_in_use(&self) -> usize {
        self.pool.in_use()
    }

    pub fn memory_budget(&self) -> usize {
        self.pool.capacity()
    }

    // ---- internals ----

    fn with_open_variable<T, F>(
        &mut self,
        ts: usize,
        varname: &str,
        reflevel: usize,
        lod: usize,
        f: F,
    ) -> Result<T>
    where
        F: FnOnce(&mut R) -> Result<T>,
    {
        self.reader.open_variable_read(ts, varname, reflevel, lod)?;
        let result = f(&mut self.reader);
        let closed = self.reader.close_variable();
        if let Err(e) = &result {
            tracing::warn!(
                varname = %varname,
                ts = ts,
                reflevel = reflevel,
                lod = lod,
                error = %e,
                "Backend read failed"
            );
        }
        let value = result?;
        closed?;
        Ok(value)
    }

    fn capacity_error(&self, requested: usize) -> GridError {
        let err = GridError::Capacity {
            requested,
            budget: self.pool.capacity(),
            pinned: self.pool.in_use(),
        };
        tracing::warn!(error = %err, "Region does not fit in cache budget");
        err
    }

    /// Check out block buffers, evicting unpinned entries as needed.
    fn checkout(&mut self, nblocks: usize, block_len: usize) -> Result<BlockSet> {
        let requested = nblocks
            .saturating_mul(block_len)
            .saturating_mul(std::mem::size_of::<f32>());
        if requested > self.pool.capacity() {
            return Err(self.capacity_error(requested));
        }
        loop {
            if let Some(set) = self.pool.checkout(nblocks, block_len) {
                return Ok(set);
            }
            self.evict_one(requested)?;
        }
    }

    /// Reserve budget for a quantized payload, evicting as needed.
    fn reserve(&mut self, bytes: usize) -> Result<Reservation> {
        if bytes > self.pool.capacity() {
            return Err(self.capacity_error(bytes));
        }
        loop {
            if let Some(r) = self.pool.reserve(bytes) {
                return Ok(r);
            }
            self.evict_one(bytes)?;
        }
    }

    fn evict_one(&mut self, requested: usize) -> Result<()> {
        match self.cache.evict_one() {
            Some(key) => {
                tracing::debug!(
                    varname = %key.var.varname,
                    ts = key.var.ts,
                    reflevel = key.var.reflevel,
                    lod = key.var.lod,
                    kind = ?key.kind,
                    "Evicted region"
                );
                Ok(())
            }
            None => Err(self.capacity_error(requested)),
        }
    }
}
