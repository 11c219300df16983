//! Block pool and region cache.

mod block_pool;
mod region_cache;

pub use block_pool::{BlockPool, BlockSet, Reservation};
pub use region_cache::{CachedRegion, QuantizedData, RegionCache};
