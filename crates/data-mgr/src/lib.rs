//! Cache-based data manager for multiresolution, block-oriented grid data.
//!
//! The manager sits between a backend [`Reader`] and the code that samples
//! grids. It turns block-range requests into typed, coordinate-aware grids
//! and keeps recently used regions in memory under a byte budget.
//!
//! # Architecture
//!
//! ```text
//! DataMgr::get_grid(ts, var, level, lod, bmin, bmax)
//!      │
//!      ├─► Validate request, build RegionKey
//!      │
//!      ├─► RegionCache lookup
//!      │         │
//!      │         ├─► Hit: return a Grid sharing the cached blocks
//!      │         │
//!      │         └─► Miss:
//!      │               ├─► BlockPool checkout (evict LRU unpinned entries)
//!      │               ├─► Reader open / block_read_region / close
//!      │               └─► make_grid
//!      │                     ├─► spherical ──► SphericalGrid
//!      │                     ├─► layered ────► get_grid(ELEVATION) ──► LayeredGrid
//!      │                     └─► otherwise ──► RegularGrid
//!      │
//!      └─► Insert into RegionCache, return Grid
//! ```
//!
//! # Example
//!
//! ```ignore
//! use data_mgr::{DataMgr, DataMgrConfig, ZarrReader};
//!
//! let config = DataMgrConfig::from_env();
//! let reader = ZarrReader::open("/data/run42", config.reader_threads)?;
//! let mut mgr = DataMgr::new(reader, config)?;
//!
//! let bdims = mgr.block_dims("TEMP", 2)?;
//! let grid = mgr.get_grid(0, "TEMP", 2, 0, [0, 0, 0], [bdims[0] - 1, bdims[1] - 1, 0])?;
//! let t = grid.value(1500.0, 2200.0, 10.0);
//! ```

pub mod blocks;
pub mod cache;
pub mod config;
pub mod grid;
pub mod manager;
pub mod quantize;
pub mod reader;
pub mod types;

pub use blocks::BlockGeometry;
pub use cache::{BlockPool, BlockSet};
pub use config::DataMgrConfig;
pub use grid::{Grid, LayeredGrid, RegularGrid, SphericalGrid};
pub use manager::{DataMgr, VarId};
pub use reader::{
    DatasetDescriptor, MemoryReader, ReadCounters, Reader, VariableDescriptor, ZarrDatasetWriter,
    ZarrReader,
};
pub use types::{
    BlockRange, CacheStats, CoordSystem, GridKind, InterpolationOrder, RegionKey, RegionKind,
    VarType, VariableKey,
};

pub use grid_common::{Extents, GridError, Result, TimeStep};
