//! Axis-aligned 3-D extents in user coordinates.

use serde::{Deserialize, Serialize};

use crate::error::{GridError, Result};

/// A box in user coordinates.
///
/// Grids may report an axis with `min > max` when the user coordinate
/// decreases with the voxel index; [`Extents::contains_point`] accepts
/// either orientation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extents {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

fn parse_corner(s: &str) -> Result<[f64; 3]> {
    let values = s
        .split_whitespace()
        .map(|p| {
            p.parse::<f64>()
                .map_err(|_| GridError::format(format!("invalid number in extents: {}", p)))
        })
        .collect::<Result<Vec<f64>>>()?;
    match values.as_slice() {
        &[x, y, z] => Ok([x, y, z]),
        _ => Err(GridError::format(format!(
            "expected 3 extents values, got {}",
            values.len()
        ))),
    }
}

impl Extents {
    /// Create new extents from corner coordinates.
    pub fn new(min: [f64; 3], max: [f64; 3]) -> Self {
        Self { min, max }
    }

    /// Parse the two corners from whitespace separated `x y z` lists.
    pub fn from_corner_lists(min: &str, max: &str) -> Result<Self> {
        Ok(Self::new(parse_corner(min)?, parse_corner(max)?))
    }

    /// Signed size along one axis.
    pub fn size(&self, axis: usize) -> f64 {
        self.max[axis] - self.min[axis]
    }

    /// Check if a point is inside, boundaries included.
    pub fn contains_point(&self, p: [f64; 3]) -> bool {
        (0..3).all(|i| {
            let (lo, hi) = if self.min[i] <= self.max[i] {
                (self.min[i], self.max[i])
            } else {
                (self.max[i], self.min[i])
            };
            p[i] >= lo && p[i] <= hi
        })
    }

    /// Sub-box of cell `index` when the box is divided into `dims` equal cells.
    pub fn subdivide(&self, dims: [u64; 3], index: [u64; 3]) -> Extents {
        let mut min = [0.0; 3];
        let mut max = [0.0; 3];
        for i in 0..3 {
            let delta = self.size(i) / dims[i] as f64;
            min[i] = self.min[i] + index[i] as f64 * delta;
            max[i] = if index[i] + 1 == dims[i] {
                self.max[i]
            } else {
                self.min[i] + (index[i] + 1) as f64 * delta
            };
        }
        Extents { min, max }
    }
}
