//! Block addressing and multiresolution geometry.
//!
//! Block size is fixed per dataset and does not change with the refinement
//! level; coarser levels simply have fewer blocks.

use rayon::prelude::*;

use grid_common::{GridError, Result};

use crate::types::{BlockRange, VarType};

/// Voxel dimensions at `reflevel` given the finest-level dimensions.
///
/// Each coarser level halves every axis, rounding up, down to a minimum of
/// one voxel. Fails when the coarsening factor does not fit in a `usize`.
pub fn dims_at_level(
    finest: [usize; 3],
    num_transforms: usize,
    reflevel: usize,
) -> Result<[usize; 3]> {
    let shift = num_transforms.saturating_sub(reflevel);
    let factor = u32::try_from(shift)
        .ok()
        .and_then(|s| 1usize.checked_shl(s))
        .ok_or_else(|| {
            GridError::invalid_argument(format!(
                "{} coarsening steps overflow the level factor",
                shift
            ))
        })?;
    Ok(finest.map(|d| d.div_ceil(factor).max(1)))
}

/// Block layout of one variable at one refinement level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockGeometry {
    /// Voxel dimensions.
    pub dims: [usize; 3],
    /// Block size in voxels.
    pub bs: [usize; 3],
    /// Number of blocks along each axis.
    pub bdims: [usize; 3],
    /// Axis a 2-D variable does not span.
    pub collapsed: Option<usize>,
}

impl BlockGeometry {
    pub fn new(dims: [usize; 3], bs: [usize; 3]) -> Result<Self> {
        if bs.iter().any(|&b| b == 0) || dims.iter().any(|&d| d == 0) {
            return Err(GridError::invalid_argument(format!(
                "invalid geometry: dims {:?}, block size {:?}",
                dims, bs
            )));
        }
        let bdims = [
            dims[0].div_ceil(bs[0]),
            dims[1].div_ceil(bs[1]),
            dims[2].div_ceil(bs[2]),
        ];
        Ok(Self {
            dims,
            bs,
            bdims,
            collapsed: None,
        })
    }

    /// Geometry for a variable; 2-D variables collapse the axis they do not
    /// span to one voxel and one block.
    pub fn for_variable(var_type: VarType, dims: [usize; 3], bs: [usize; 3]) -> Result<Self> {
        let mut dims = dims;
        let mut bs = bs;
        let collapsed = var_type.collapsed_axis();
        if let Some(axis) = collapsed {
            dims[axis] = 1;
            bs[axis] = 1;
        }
        Ok(Self {
            collapsed,
            ..Self::new(dims, bs)?
        })
    }

    /// Number of floats in one block.
    pub fn block_len(&self) -> usize {
        self.bs[0] * self.bs[1] * self.bs[2]
    }

    /// Range covering every block.
    pub fn full_range(&self) -> BlockRange {
        BlockRange::new(
            [0, 0, 0],
            [self.bdims[0] - 1, self.bdims[1] - 1, self.bdims[2] - 1],
        )
    }

    /// Check that `range` is well formed and inside this level.
    pub fn validate_range(&self, range: &BlockRange) -> Result<()> {
        range.validate()?;
        if (0..3).any(|i| range.bmax[i] >= self.bdims[i]) {
            return Err(GridError::invalid_argument(format!(
                "block range {:?}..={:?} exceeds block dimensions {:?}",
                range.bmin, range.bmax, self.bdims
            )));
        }
        Ok(())
    }

    /// Voxel bounds covered by `range`, clamped to the level's dimensions.
    pub fn voxel_range(&self, range: &BlockRange) -> ([usize; 3], [usize; 3]) {
        let mut vmin = [0usize; 3];
        let mut vmax = [0usize; 3];
        for i in 0..3 {
            vmin[i] = range.bmin[i] * self.bs[i];
            vmax[i] = (range.bmax[i] * self.bs[i] + self.bs[i] - 1).min(self.dims[i] - 1);
        }
        (vmin, vmax)
    }

    /// An axis is periodic for a request only when the dataset is periodic
    /// on it and the request spans every block along it. A collapsed axis
    /// is never periodic.
    pub fn periodic(&self, range: &BlockRange, dataset_periodic: [bool; 3]) -> [bool; 3] {
        let mut periodic = [false; 3];
        for i in 0..3 {
            periodic[i] = dataset_periodic[i]
                && self.collapsed != Some(i)
                && range.bmin[i] == 0
                && range.bmax[i] == self.bdims[i] - 1;
        }
        periodic
    }
}

/// Subsample an x-fastest voxel array from `fine` to `coarse` dimensions by
/// taking every `2^shift`-th voxel, clamped to the last voxel.
pub fn decimate(data: &[f32], fine: [usize; 3], coarse: [usize; 3], shift: usize) -> Vec<f32> {
    let step = u32::try_from(shift)
        .ok()
        .and_then(|s| 1usize.checked_shl(s))
        .unwrap_or(usize::MAX);
    let mut out = Vec::with_capacity(coarse[0] * coarse[1] * coarse[2]);
    for z in 0..coarse[2] {
        let fz = z.saturating_mul(step).min(fine[2] - 1);
        for y in 0..coarse[1] {
            let fy = y.saturating_mul(step).min(fine[1] - 1);
            for x in 0..coarse[0] {
                let fx = x.saturating_mul(step).min(fine[0] - 1);
                out.push(data[(fz * fine[1] + fy) * fine[0] + fx]);
            }
        }
    }
    out
}

/// Min and max of `data` ignoring NaN and the missing value.
pub fn value_range(data: &[f32], missing: Option<f32>) -> Option<[f32; 2]> {
    data.iter()
        .copied()
        .filter(|v| !v.is_nan() && missing != Some(*v))
        .fold(None, |acc, v| match acc {
            None => Some([v, v]),
            Some([lo, hi]) => Some([lo.min(v), hi.max(v)]),
        })
}

/// Fill the blocks of `range` from a voxel sampler, in parallel.
///
/// `blocks` is in block-major order (x fastest) and each block holds
/// `bs[0]*bs[1]*bs[2]` voxels, x fastest. Voxels past the end of `dims`
/// replicate the last valid voxel along that axis.
pub fn fill_blocks<F>(
    range: &BlockRange,
    bs: [usize; 3],
    dims: [usize; 3],
    blocks: &mut [Vec<f32>],
    sample: F,
) -> Result<()>
where
    F: Fn(usize, usize, usize) -> f32 + Sync,
{
    let bdims = range.dims();
    if blocks.len() != range.num_blocks() {
        return Err(GridError::invalid_argument(format!(
            "expected {} block buffers, got {}",
            range.num_blocks(),
            blocks.len()
        )));
    }
    let block_len = bs[0] * bs[1] * bs[2];

    blocks.par_iter_mut().enumerate().for_each(|(n, blk)| {
        blk.resize(block_len, 0.0);
        let xb = n % bdims[0];
        let yb = (n / bdims[0]) % bdims[1];
        let zb = n / (bdims[0] * bdims[1]);
        let ox = (range.bmin[0] + xb) * bs[0];
        let oy = (range.bmin[1] + yb) * bs[1];
        let oz = (range.bmin[2] + zb) * bs[2];
        for z in 0..bs[2] {
            let gz = (oz + z).min(dims[2] - 1);
            for y in 0..bs[1] {
                let gy = (oy + y).min(dims[1] - 1);
                let row = (z * bs[1] + y) * bs[0];
                for x in 0..bs[0] {
                    let gx = (ox + x).min(dims[0] - 1);
                    blk[row + x] = sample(gx, gy, gz);
                }
            }
        }
    });

    Ok(())
}
