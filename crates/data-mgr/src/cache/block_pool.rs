//! Budgeted pool of block buffers.
//!
//! Every byte a cache entry holds is checked out of the pool. Checked out
//! bytes are charged against the pool capacity until the last holder drops
//! them, so a region still referenced by a live grid keeps its bytes charged
//! even after the cache entry itself is gone.
//!
//! Returned buffers are kept on a free list keyed by length, as long as the
//! idle bytes fit in the unused part of the budget.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

const F32_SIZE: usize = std::mem::size_of::<f32>();

struct PoolShared {
    capacity: usize,
    in_use: Cell<usize>,
    idle_bytes: Cell<usize>,
    free: RefCell<HashMap<usize, Vec<Vec<f32>>>>,
}

impl PoolShared {
    fn release(&self, bytes: usize) {
        self.in_use.set(self.in_use.get().saturating_sub(bytes));
    }

    fn recycle(&self, buffers: Vec<Vec<f32>>) {
        let Ok(mut free) = self.free.try_borrow_mut() else {
            return;
        };
        for buf in buffers {
            let bytes = buf.len() * F32_SIZE;
            let room = self.capacity.saturating_sub(self.in_use.get());
            if bytes == 0 || self.idle_bytes.get() + bytes > room {
                continue;
            }
            self.idle_bytes.set(self.idle_bytes.get() + bytes);
            free.entry(buf.len()).or_default().push(buf);
        }
    }

    /// Drop idle buffers until they fit in the unused part of the budget.
    fn trim(&self) {
        let Ok(mut free) = self.free.try_borrow_mut() else {
            return;
        };
        let room = self.capacity.saturating_sub(self.in_use.get());
        for (len, bufs) in free.iter_mut() {
            while self.idle_bytes.get() > room && bufs.pop().is_some() {
                self.idle_bytes
                    .set(self.idle_bytes.get().saturating_sub(len * F32_SIZE));
            }
        }
        free.retain(|_, bufs| !bufs.is_empty());
    }
}

/// Pool of float block buffers bounded by a byte budget.
#[derive(Clone)]
pub struct BlockPool {
    shared: Rc<PoolShared>,
}

impl BlockPool {
    /// Create a pool with the given budget in bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            shared: Rc::new(PoolShared {
                capacity,
                in_use: Cell::new(0),
                idle_bytes: Cell::new(0),
                free: RefCell::new(HashMap::new()),
            }),
        }
    }

    /// Budget in bytes.
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Bytes currently checked out.
    pub fn in_use(&self) -> usize {
        self.shared.in_use.get()
    }

    /// Bytes that can still be checked out.
    pub fn available(&self) -> usize {
        self.shared.capacity.saturating_sub(self.in_use())
    }

    /// Bytes held on the free list.
    pub fn idle_bytes(&self) -> usize {
        self.shared.idle_bytes.get()
    }

    /// Check out `nblocks` zeroed buffers of `block_len` floats.
    ///
    /// Returns `None` when the request does not fit in the remaining budget.
    pub fn checkout(&self, nblocks: usize, block_len: usize) -> Option<BlockSet> {
        let bytes = nblocks.checked_mul(block_len)?.checked_mul(F32_SIZE)?;
        if !self.charge(bytes) {
            return None;
        }

        let mut blocks = Vec::with_capacity(nblocks);
        if let Ok(mut free) = self.shared.free.try_borrow_mut() {
            if let Some(bufs) = free.get_mut(&block_len) {
                while blocks.len() < nblocks {
                    let Some(mut buf) = bufs.pop() else { break };
                    self.shared
                        .idle_bytes
                        .set(self.shared.idle_bytes.get().saturating_sub(block_len * F32_SIZE));
                    buf.fill(0.0);
                    blocks.push(buf);
                }
            }
        }
        while blocks.len() < nblocks {
            blocks.push(vec![0.0; block_len]);
        }
        self.shared.trim();

        Some(BlockSet {
            blocks,
            block_len,
            bytes,
            pool: Rc::clone(&self.shared),
        })
    }

    /// Charge `bytes` of non-float payload against the budget.
    ///
    /// Returns `None` when it does not fit.
    pub fn reserve(&self, bytes: usize) -> Option<Reservation> {
        if !self.charge(bytes) {
            return None;
        }
        self.shared.trim();
        Some(Reservation {
            bytes,
            pool: Rc::clone(&self.shared),
        })
    }

    fn charge(&self, bytes: usize) -> bool {
        let in_use = self.shared.in_use.get();
        match in_use.checked_add(bytes) {
            Some(total) if total <= self.shared.capacity => {
                self.shared.in_use.set(total);
                true
            }
            _ => false,
        }
    }
}

impl fmt::Debug for BlockPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockPool")
            .field("capacity", &self.capacity())
            .field("in_use", &self.in_use())
            .field("idle_bytes", &self.idle_bytes())
            .finish()
    }
}

/// Block buffers of one region, checked out of a [`BlockPool`].
///
/// Blocks are in block-major order, x fastest, and each holds `block_len`
/// floats. Dropping the set returns its bytes to the pool.
pub struct BlockSet {
    blocks: Vec<Vec<f32>>,
    block_len: usize,
    bytes: usize,
    pool: Rc<PoolShared>,
}

impl BlockSet {
    pub fn blocks(&self) -> &[Vec<f32>] {
        &self.blocks
    }

    pub fn blocks_mut(&mut self) -> &mut [Vec<f32>] {
        &mut self.blocks
    }

    pub fn block(&self, n: usize) -> Option<&[f32]> {
        self.blocks.get(n).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn block_len(&self) -> usize {
        self.block_len
    }

    /// Bytes charged to the pool.
    pub fn bytes(&self) -> usize {
        self.bytes
    }
}

impl Drop for BlockSet {
    fn drop(&mut self) {
        self.pool.release(self.bytes);
        let block_len = self.block_len;
        // a reader may have resized a buffer; only recycle exact fits
        let blocks = std::mem::take(&mut self.blocks)
            .into_iter()
            .filter(|b| b.len() == block_len)
            .collect();
        self.pool.recycle(blocks);
    }
}

impl fmt::Debug for BlockSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockSet")
            .field("blocks", &self.blocks.len())
            .field("block_len", &self.block_len)
            .field("bytes", &self.bytes)
            .finish()
    }
}

/// Budget charge for a payload that is not made of float blocks.
pub struct Reservation {
    bytes: usize,
    pool: Rc<PoolShared>,
}

impl Reservation {
    pub fn bytes(&self) -> usize {
        self.bytes
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.pool.release(self.bytes);
    }
}

impl fmt::Debug for Reservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reservation").field("bytes", &self.bytes).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkout_charges_budget() {
        let pool = BlockPool::new(1024);
        let set = pool.checkout(2, 64).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.bytes(), 512);
        assert_eq!(pool.in_use(), 512);
        assert_eq!(pool.available(), 512);

        assert!(pool.checkout(3, 64).is_none());
        assert_eq!(pool.in_use(), 512);

        drop(set);
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn test_buffers_recycled_and_zeroed() {
        let pool = BlockPool::new(1024);
        let mut set = pool.checkout(1, 16).unwrap();
        set.blocks_mut()[0].fill(7.0);
        drop(set);
        assert_eq!(pool.idle_bytes(), 64);

        let set = pool.checkout(1, 16).unwrap();
        assert_eq!(pool.idle_bytes(), 0);
        assert!(set.blocks()[0].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_idle_trimmed_to_remaining_budget() {
        let pool = BlockPool::new(256);
        drop(pool.checkout(4, 16).unwrap());
        assert_eq!(pool.idle_bytes(), 256);

        // a different block length forces the idle buffers out
        let _set = pool.checkout(2, 32).unwrap();
        assert_eq!(pool.idle_bytes(), 0);
        assert_eq!(pool.in_use(), 256);
    }

    #[test]
    fn test_reservation() {
        let pool = BlockPool::new(100);
        let r = pool.reserve(60).unwrap();
        assert_eq!(r.bytes(), 60);
        assert!(pool.reserve(41).is_none());
        drop(r);
        assert!(pool.reserve(100).is_some());
    }

    #[test]
    fn test_zero_capacity_rejects_everything() {
        let pool = BlockPool::new(0);
        assert!(pool.checkout(1, 1).is_none());
        assert!(pool.checkout(0, 8).is_some());
    }
}
