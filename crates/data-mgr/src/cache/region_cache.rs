//! LRU cache of decoded regions.

use std::rc::Rc;

use lru::LruCache;

use super::block_pool::Reservation;
use crate::grid::Grid;
use crate::types::{CacheStats, RegionKey};

/// Quantized voxels of a region.
#[derive(Debug, Clone)]
pub enum QuantizedData {
    UInt8(Rc<Vec<u8>>),
    UInt16(Rc<Vec<u16>>),
}

impl QuantizedData {
    fn is_shared(&self) -> bool {
        match self {
            QuantizedData::UInt8(d) => Rc::strong_count(d) > 1,
            QuantizedData::UInt16(d) => Rc::strong_count(d) > 1,
        }
    }
}

/// Payload of a cache entry.
#[derive(Debug)]
pub enum CachedRegion {
    Grid(Grid),
    Quantized {
        data: QuantizedData,
        reservation: Reservation,
    },
}

impl CachedRegion {
    /// Bytes the entry accounts for.
    pub fn bytes(&self) -> usize {
        match self {
            CachedRegion::Grid(g) => g.memory_bytes(),
            CachedRegion::Quantized { reservation, .. } => reservation.bytes(),
        }
    }

    /// An entry is pinned while any handle outside the cache shares its
    /// buffers.
    pub fn is_pinned(&self) -> bool {
        match self {
            CachedRegion::Grid(g) => g.is_shared(),
            CachedRegion::Quantized { data, .. } => data.is_shared(),
        }
    }
}

/// LRU cache of regions with access-order eviction that skips pinned
/// entries.
///
/// The byte budget itself is enforced by the block pool; this type tracks
/// which entries can give bytes back.
pub struct RegionCache {
    cache: LruCache<RegionKey, CachedRegion>,
    current_memory: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl RegionCache {
    pub fn new() -> Self {
        Self {
            cache: LruCache::unbounded(),
            current_memory: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    /// Look up an entry, promoting it to most recently used.
    pub fn get(&mut self, key: &RegionKey) -> Option<&CachedRegion> {
        if let Some(entry) = self.cache.get(key) {
            self.hits += 1;
            Some(entry)
        } else {
            self.misses += 1;
            None
        }
    }

    /// Like [`get`](Self::get) but a miss is not counted. Used for
    /// derived regions whose miss falls through to a counted lookup of the
    /// region they are built from.
    pub fn get_derived(&mut self, key: &RegionKey) -> Option<&CachedRegion> {
        let entry = self.cache.get(key)?;
        self.hits += 1;
        Some(entry)
    }

    pub fn insert(&mut self, key: RegionKey, entry: CachedRegion) {
        self.current_memory += entry.bytes();
        if let Some(old) = self.cache.put(key, entry) {
            self.current_memory = self.current_memory.saturating_sub(old.bytes());
        }
    }

    /// Evict the least recently used unpinned entry.
    ///
    /// Returns the evicted key, or `None` when every entry is pinned.
    pub fn evict_one(&mut self) -> Option<RegionKey> {
        let victim = self
            .cache
            .iter()
            .rev()
            .find(|(_, entry)| !entry.is_pinned())
            .map(|(key, _)| key.clone())?;
        let entry = self.cache.pop(&victim)?;
        self.current_memory = self.current_memory.saturating_sub(entry.bytes());
        self.evictions += 1;
        Some(victim)
    }

    /// Remove every entry matching `pred`. Returns the number removed.
    pub fn remove_where<F>(&mut self, mut pred: F) -> usize
    where
        F: FnMut(&RegionKey) -> bool,
    {
        let keys: Vec<RegionKey> = self
            .cache
            .iter()
            .filter(|(key, _)| pred(key))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &keys {
            if let Some(entry) = self.cache.pop(key) {
                self.current_memory = self.current_memory.saturating_sub(entry.bytes());
            }
        }
        keys.len()
    }

    /// Bytes held by entries currently pinned.
    pub fn pinned_bytes(&self) -> usize {
        self.cache
            .iter()
            .filter(|(_, entry)| entry.is_pinned())
            .map(|(_, entry)| entry.bytes())
            .sum()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.cache.len(),
            memory_bytes: self.current_memory as u64,
            pinned_bytes: self.pinned_bytes() as u64,
            evictions: self.evictions,
        }
    }

    pub fn clear(&mut self) {
        self.cache.clear();
        self.current_memory = 0;
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

impl Default for RegionCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::BlockPool;
    use crate::types::{BlockRange, RegionKind, VariableKey};

    fn key(n: usize) -> RegionKey {
        RegionKey {
            var: VariableKey::new(0, "T", 0, 0),
            range: BlockRange::new([n, 0, 0], [n, 0, 0]),
            kind: RegionKind::UInt8,
        }
    }

    fn entry(pool: &BlockPool, bytes: usize) -> (CachedRegion, Rc<Vec<u8>>) {
        let data = Rc::new(vec![0u8; bytes]);
        let region = CachedRegion::Quantized {
            data: QuantizedData::UInt8(Rc::clone(&data)),
            reservation: pool.reserve(bytes).unwrap(),
        };
        (region, data)
    }

    #[test]
    fn test_insert_and_get() {
        let pool = BlockPool::new(1024);
        let mut cache = RegionCache::new();
        let (e, _) = entry(&pool, 100);
        cache.insert(key(0), e);

        assert!(cache.get(&key(0)).is_some());
        assert!(cache.get(&key(1)).is_none());
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.memory_bytes, 100);
    }

    #[test]
    fn test_derived_lookup_counts_hits_only() {
        let pool = BlockPool::new(1024);
        let mut cache = RegionCache::new();
        let (e, _) = entry(&pool, 100);
        cache.insert(key(0), e);

        assert!(cache.get_derived(&key(1)).is_none());
        assert!(cache.get_derived(&key(0)).is_some());
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let pool = BlockPool::new(1024);
        let mut cache = RegionCache::new();
        for n in 0..3 {
            let (e, _) = entry(&pool, 10);
            cache.insert(key(n), e);
        }
        cache.get(&key(0));

        assert_eq!(cache.evict_one(), Some(key(1)));
        assert_eq!(cache.evict_one(), Some(key(2)));
        assert_eq!(cache.evict_one(), Some(key(0)));
        assert_eq!(cache.evict_one(), None);
        assert_eq!(cache.stats().evictions, 3);
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn test_pinned_entries_skipped() {
        let pool = BlockPool::new(1024);
        let mut cache = RegionCache::new();
        let (e0, held) = entry(&pool, 10);
        cache.insert(key(0), e0);
        let (e1, _) = entry(&pool, 20);
        cache.insert(key(1), e1);

        assert_eq!(cache.pinned_bytes(), 10);
        assert_eq!(cache.stats().pinned_bytes, 10);
        assert_eq!(cache.evict_one(), Some(key(1)));
        assert_eq!(cache.evict_one(), None);

        drop(held);
        assert_eq!(cache.evict_one(), Some(key(0)));
    }

    #[test]
    fn test_remove_where() {
        let pool = BlockPool::new(1024);
        let mut cache = RegionCache::new();
        for n in 0..4 {
            let (e, _) = entry(&pool, 10);
            cache.insert(key(n), e);
        }
        assert_eq!(cache.remove_where(|k| k.range.bmin[0] % 2 == 0), 2);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().memory_bytes, 20);
    }
}
