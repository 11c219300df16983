//! Regular grid: uniform spacing along every axis.

use std::rc::Rc;

use grid_common::{GridError, Result};

use crate::cache::BlockSet;
use crate::types::InterpolationOrder;

/// Layout of a voxel box inside a set of block buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoxelLayout {
    /// Block size.
    pub bs: [usize; 3],
    /// Number of blocks along each axis.
    pub bdims: [usize; 3],
    /// Offset of the first voxel inside the first block.
    pub offset: [usize; 3],
    /// Voxel dimensions of the box.
    pub dims: [usize; 3],
}

impl VoxelLayout {
    /// Layout of the voxel box `vmin..=vmax` stored in blocks of size `bs`
    /// starting at block `vmin / bs`.
    pub fn new(bs: [usize; 3], vmin: [usize; 3], vmax: [usize; 3]) -> Result<Self> {
        let mut bdims = [0usize; 3];
        let mut offset = [0usize; 3];
        let mut dims = [0usize; 3];
        for i in 0..3 {
            if bs[i] == 0 || vmin[i] > vmax[i] {
                return Err(GridError::invalid_argument(format!(
                    "invalid voxel box {:?}..={:?} for block size {:?}",
                    vmin, vmax, bs
                )));
            }
            bdims[i] = vmax[i] / bs[i] - vmin[i] / bs[i] + 1;
            offset[i] = vmin[i] % bs[i];
            dims[i] = vmax[i] - vmin[i] + 1;
        }
        Ok(Self {
            bs,
            bdims,
            offset,
            dims,
        })
    }

    pub fn num_blocks(&self) -> usize {
        self.bdims[0] * self.bdims[1] * self.bdims[2]
    }

    pub fn block_len(&self) -> usize {
        self.bs[0] * self.bs[1] * self.bs[2]
    }

    /// Block number and position inside it of voxel `(i, j, k)`.
    #[inline]
    fn locate(&self, i: usize, j: usize, k: usize) -> Option<(usize, usize)> {
        if i >= self.dims[0] || j >= self.dims[1] || k >= self.dims[2] {
            return None;
        }
        let (x, y, z) = (i + self.offset[0], j + self.offset[1], k + self.offset[2]);
        let (xb, yb, zb) = (x / self.bs[0], y / self.bs[1], z / self.bs[2]);
        let (x, y, z) = (x % self.bs[0], y % self.bs[1], z % self.bs[2]);
        let blk = zb * self.bdims[0] * self.bdims[1] + yb * self.bdims[0] + xb;
        let pos = z * self.bs[0] * self.bs[1] + y * self.bs[0] + x;
        Some((blk, pos))
    }

    /// Value of voxel `(i, j, k)`, NaN when out of range.
    #[inline]
    pub fn get(&self, blocks: &BlockSet, i: usize, j: usize, k: usize) -> f32 {
        self.locate(i, j, k)
            .and_then(|(blk, pos)| blocks.block(blk).and_then(|b| b.get(pos).copied()))
            .unwrap_or(f32::NAN)
    }

    /// Check that `blocks` has the shape this layout expects.
    pub fn check(&self, blocks: &BlockSet) -> Result<()> {
        if blocks.len() != self.num_blocks() || blocks.block_len() != self.block_len() {
            return Err(GridError::invalid_argument(format!(
                "expected {} blocks of {} values, got {} of {}",
                self.num_blocks(),
                self.block_len(),
                blocks.len(),
                blocks.block_len()
            )));
        }
        Ok(())
    }
}

/// Fractional position along one axis: floor index and weight of the next
/// sample.
#[derive(Debug, Clone, Copy)]
pub(crate) struct AxisPos {
    pub index: usize,
    pub weight: f64,
}

/// A grid with uniformly spaced samples.
///
/// Cloning is cheap: the block buffers are shared.
#[derive(Debug, Clone)]
pub struct RegularGrid {
    blocks: Rc<BlockSet>,
    layout: VoxelLayout,
    minu: [f64; 3],
    maxu: [f64; 3],
    delta: [f64; 3],
    periodic: [bool; 3],
    missing: Option<f32>,
    interpolation: InterpolationOrder,
}

impl RegularGrid {
    /// Build a grid over the voxel box `vmin..=vmax` whose corners map to
    /// `minu` and `maxu`.
    ///
    /// Axes may be flipped (`maxu < minu`).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        blocks: Rc<BlockSet>,
        bs: [usize; 3],
        vmin: [usize; 3],
        vmax: [usize; 3],
        minu: [f64; 3],
        maxu: [f64; 3],
        periodic: [bool; 3],
        missing: Option<f32>,
    ) -> Result<Self> {
        let layout = VoxelLayout::new(bs, vmin, vmax)?;
        layout.check(&blocks)?;

        let mut delta = [0.0; 3];
        for i in 0..3 {
            if layout.dims[i] > 1 {
                delta[i] = (maxu[i] - minu[i]) / (layout.dims[i] - 1) as f64;
            }
        }

        Ok(Self {
            blocks,
            layout,
            minu,
            maxu,
            delta,
            periodic,
            missing,
            interpolation: InterpolationOrder::default(),
        })
    }

    pub fn with_interpolation_order(mut self, order: InterpolationOrder) -> Self {
        self.interpolation = order;
        self
    }

    pub fn interpolation_order(&self) -> InterpolationOrder {
        self.interpolation
    }

    pub fn blocks(&self) -> &Rc<BlockSet> {
        &self.blocks
    }

    pub fn layout(&self) -> &VoxelLayout {
        &self.layout
    }

    pub fn dimensions(&self) -> [usize; 3] {
        self.layout.dims
    }

    pub fn user_extents(&self) -> ([f64; 3], [f64; 3]) {
        (self.minu, self.maxu)
    }

    pub fn periodic(&self) -> [bool; 3] {
        self.periodic
    }

    /// Missing-value marker; `f32::INFINITY` when the variable has none.
    pub fn missing_value(&self) -> f32 {
        self.missing.unwrap_or(f32::INFINITY)
    }

    #[inline]
    pub(crate) fn is_missing(&self, v: f32) -> bool {
        v.is_nan() || self.missing.is_some_and(|m| v == m)
    }

    /// Bytes held by the block buffers.
    pub fn memory_bytes(&self) -> usize {
        self.blocks.bytes()
    }

    /// Voxel value relative to the grid origin; NaN when out of range.
    #[inline]
    pub fn access_ijk(&self, i: usize, j: usize, k: usize) -> f32 {
        self.layout.get(&self.blocks, i, j, k)
    }

    /// Voxel value read from another block set with this grid's layout.
    #[inline]
    pub(crate) fn access_in(&self, blocks: &BlockSet, i: usize, j: usize, k: usize) -> f32 {
        self.layout.get(blocks, i, j, k)
    }

    pub fn user_coordinates(&self, i: usize, j: usize, k: usize) -> [f64; 3] {
        let ijk = [i, j, k];
        let mut p = [0.0; 3];
        for a in 0..3 {
            let idx = ijk[a].min(self.layout.dims[a] - 1);
            p[a] = self.minu[a] + idx as f64 * self.delta[a];
        }
        p
    }

    /// Wrap periodic axes into the grid extents. Axes with a single sample
    /// are forced to the grid origin.
    pub fn clamp_coord(&self, p: [f64; 3]) -> [f64; 3] {
        let mut out = p;
        for a in 0..3 {
            if self.layout.dims[a] == 1 {
                out[a] = self.minu[a];
                continue;
            }
            if !self.periodic[a] {
                continue;
            }
            let lo = self.minu[a].min(self.maxu[a]);
            let hi = self.minu[a].max(self.maxu[a]);
            let period = hi - lo;
            if period > 0.0 && (out[a] < lo || out[a] > hi) {
                out[a] = lo + (out[a] - lo).rem_euclid(period);
            }
        }
        out
    }

    fn inside_axis(&self, a: usize, c: f64) -> bool {
        let lo = self.minu[a].min(self.maxu[a]);
        let hi = self.minu[a].max(self.maxu[a]);
        c >= lo && c <= hi
    }

    /// Whether the point, after periodic wrapping, lies inside the grid.
    pub fn inside_grid(&self, x: f64, y: f64, z: f64) -> bool {
        let p = self.clamp_coord([x, y, z]);
        (0..3).all(|a| self.inside_axis(a, p[a]))
    }

    /// Floor index and weight along one axis of an already clamped
    /// coordinate. `None` when outside.
    pub(crate) fn axis_pos(&self, a: usize, c: f64) -> Option<AxisPos> {
        if !self.inside_axis(a, c) {
            return None;
        }
        let n = self.layout.dims[a];
        if n == 1 || self.delta[a] == 0.0 {
            return Some(AxisPos {
                index: 0,
                weight: 0.0,
            });
        }
        let t = (c - self.minu[a]) / self.delta[a];
        let mut index = (t.floor().max(0.0) as usize).min(n - 1);
        let mut weight = t - index as f64;
        if index >= n - 1 {
            index = n - 1;
            weight = 0.0;
        }
        Some(AxisPos {
            index,
            weight: weight.clamp(0.0, 1.0),
        })
    }

    /// Index of the voxel at or below the point on every axis.
    pub fn ijk_index_floor(&self, x: f64, y: f64, z: f64) -> Option<[usize; 3]> {
        let p = self.clamp_coord([x, y, z]);
        let mut ijk = [0usize; 3];
        for a in 0..3 {
            ijk[a] = self.axis_pos(a, p[a])?.index;
        }
        Some(ijk)
    }

    /// Index of the voxel nearest the point.
    pub fn ijk_index(&self, x: f64, y: f64, z: f64) -> Option<[usize; 3]> {
        let p = self.clamp_coord([x, y, z]);
        let mut ijk = [0usize; 3];
        for a in 0..3 {
            let pos = self.axis_pos(a, p[a])?;
            ijk[a] = if pos.weight > 0.5 {
                pos.index + 1
            } else {
                pos.index
            };
        }
        Some(ijk)
    }

    /// Sample the grid at a user coordinate. Points outside the grid yield
    /// the missing value.
    pub fn value(&self, x: f64, y: f64, z: f64) -> f32 {
        let p = self.clamp_coord([x, y, z]);
        let (Some(px), Some(py), Some(pz)) =
            (self.axis_pos(0, p[0]), self.axis_pos(1, p[1]), self.axis_pos(2, p[2]))
        else {
            return self.missing_value();
        };

        match self.interpolation {
            InterpolationOrder::Nearest => {
                let round = |pos: AxisPos| {
                    if pos.weight > 0.5 {
                        pos.index + 1
                    } else {
                        pos.index
                    }
                };
                let v = self.access_ijk(round(px), round(py), round(pz));
                if self.is_missing(v) {
                    self.missing_value()
                } else {
                    v
                }
            }
            InterpolationOrder::Linear => self.trilinear(&self.blocks, px, py, pz),
        }
    }

    /// Trilinear interpolation over the cell at `(px, py, pz)`. Any missing
    /// corner with a non-zero weight yields the missing value.
    pub(crate) fn trilinear(&self, blocks: &BlockSet, px: AxisPos, py: AxisPos, pz: AxisPos) -> f32 {
        let mut acc = 0.0f64;
        for corner in 0..8 {
            let (dx, dy, dz) = (corner & 1, (corner >> 1) & 1, (corner >> 2) & 1);
            let wx = if dx == 1 { px.weight } else { 1.0 - px.weight };
            let wy = if dy == 1 { py.weight } else { 1.0 - py.weight };
            let wz = if dz == 1 { pz.weight } else { 1.0 - pz.weight };
            let w = wx * wy * wz;
            if w == 0.0 {
                continue;
            }
            let v = self.access_in(blocks, px.index + dx, py.index + dy, pz.index + dz);
            if self.is_missing(v) {
                return self.missing_value();
            }
            acc += w * v as f64;
        }
        acc as f32
    }

    /// Min and max over every valid voxel. `None` when every voxel is
    /// missing.
    pub fn range(&self) -> Option<[f32; 2]> {
        self.iter()
            .filter(|v| !self.is_missing(*v))
            .fold(None, |acc, v| match acc {
                None => Some([v, v]),
                Some([lo, hi]) => Some([lo.min(v), hi.max(v)]),
            })
    }

    /// Voxel values, x fastest.
    pub fn iter(&self) -> impl Iterator<Item = f32> + '_ {
        let [nx, ny, nz] = self.layout.dims;
        (0..nz).flat_map(move |k| {
            (0..ny).flat_map(move |j| (0..nx).map(move |i| self.access_ijk(i, j, k)))
        })
    }
}
