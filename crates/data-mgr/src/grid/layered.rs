//! Layered grid: regular in x and y, with the vertical coordinate of every
//! sample taken from a companion elevation field.

use grid_common::{GridError, Result};

use super::regular::{AxisPos, RegularGrid};
use crate::types::InterpolationOrder;

/// Terrain-following grid.
///
/// The data and the elevation field share one voxel box. Inside a column the
/// elevation is assumed to increase with k.
#[derive(Debug, Clone)]
pub struct LayeredGrid {
    data: RegularGrid,
    elevation: RegularGrid,
    minu: [f64; 3],
    maxu: [f64; 3],
}

impl LayeredGrid {
    pub fn new(data: RegularGrid, elevation: RegularGrid) -> Result<Self> {
        if data.dimensions() != elevation.dimensions() {
            return Err(GridError::invalid_argument(format!(
                "elevation dimensions {:?} do not match data dimensions {:?}",
                elevation.dimensions(),
                data.dimensions()
            )));
        }

        let (mut minu, mut maxu) = data.user_extents();
        let [nx, ny, nz] = data.dimensions();
        let plane_range = |k: usize| {
            let mut lo = f64::INFINITY;
            let mut hi = f64::NEG_INFINITY;
            for j in 0..ny {
                for i in 0..nx {
                    let v = elevation.access_ijk(i, j, k);
                    if !elevation.is_missing(v) {
                        lo = lo.min(v as f64);
                        hi = hi.max(v as f64);
                    }
                }
            }
            (lo, hi)
        };
        minu[2] = plane_range(0).0;
        maxu[2] = plane_range(nz - 1).1;
        if !minu[2].is_finite() || !maxu[2].is_finite() {
            return Err(GridError::invalid_argument(
                "elevation field has no valid samples on its bottom or top layer",
            ));
        }

        Ok(Self {
            data,
            elevation,
            minu,
            maxu,
        })
    }

    pub fn with_interpolation_order(mut self, order: InterpolationOrder) -> Self {
        self.data = self.data.with_interpolation_order(order);
        self
    }

    pub fn data(&self) -> &RegularGrid {
        &self.data
    }

    /// The companion elevation grid.
    pub fn elevation(&self) -> &RegularGrid {
        &self.elevation
    }

    pub fn dimensions(&self) -> [usize; 3] {
        self.data.dimensions()
    }

    /// Extents; z spans the lowest bottom-layer sample to the highest
    /// top-layer sample.
    pub fn user_extents(&self) -> ([f64; 3], [f64; 3]) {
        (self.minu, self.maxu)
    }

    /// The vertical axis is never periodic.
    pub fn periodic(&self) -> [bool; 3] {
        let p = self.data.periodic();
        [p[0], p[1], false]
    }

    pub fn access_ijk(&self, i: usize, j: usize, k: usize) -> f32 {
        self.data.access_ijk(i, j, k)
    }

    pub fn user_coordinates(&self, i: usize, j: usize, k: usize) -> [f64; 3] {
        let [x, y, _] = self.data.user_coordinates(i, j, k);
        let [nx, ny, nz] = self.dimensions();
        let z = self
            .elevation
            .access_ijk(i.min(nx - 1), j.min(ny - 1), k.min(nz - 1));
        [x, y, z as f64]
    }

    fn xy_pos(&self, x: f64, y: f64) -> Option<(AxisPos, AxisPos)> {
        let p = self.data.clamp_coord([x, y, self.minu[2]]);
        Some((self.data.axis_pos(0, p[0])?, self.data.axis_pos(1, p[1])?))
    }

    /// Elevation of layer `k` interpolated bilinearly inside the column.
    fn column_z(&self, px: AxisPos, py: AxisPos, k: usize) -> f64 {
        let mut z = 0.0;
        for corner in 0..4 {
            let (dx, dy) = (corner & 1, corner >> 1);
            let wx = if dx == 1 { px.weight } else { 1.0 - px.weight };
            let wy = if dy == 1 { py.weight } else { 1.0 - py.weight };
            let w = wx * wy;
            if w == 0.0 {
                continue;
            }
            z += w * self.elevation.access_ijk(px.index + dx, py.index + dy, k) as f64;
        }
        z
    }

    /// Layer at or below `z` inside the column, found by bisection.
    fn k_pos(&self, px: AxisPos, py: AxisPos, z: f64) -> Option<AxisPos> {
        let nz = self.dimensions()[2];
        if nz == 1 {
            return Some(AxisPos {
                index: 0,
                weight: 0.0,
            });
        }
        let bottom = self.column_z(px, py, 0);
        let top = self.column_z(px, py, nz - 1);
        if !(z >= bottom && z <= top) {
            return None;
        }

        let (mut lo, mut hi) = (0, nz - 1);
        while hi - lo > 1 {
            let mid = (lo + hi) / 2;
            if self.column_z(px, py, mid) <= z {
                lo = mid;
            } else {
                hi = mid;
            }
        }

        let z0 = self.column_z(px, py, lo);
        let z1 = self.column_z(px, py, lo + 1);
        let weight = if z1 != z0 {
            ((z - z0) / (z1 - z0)).clamp(0.0, 1.0)
        } else {
            0.0
        };
        if weight >= 1.0 {
            return Some(AxisPos {
                index: lo + 1,
                weight: 0.0,
            });
        }
        Some(AxisPos { index: lo, weight })
    }

    fn position(&self, x: f64, y: f64, z: f64) -> Option<(AxisPos, AxisPos, AxisPos)> {
        let (px, py) = self.xy_pos(x, y)?;
        let pz = self.k_pos(px, py, z)?;
        Some((px, py, pz))
    }

    pub fn inside_grid(&self, x: f64, y: f64, z: f64) -> bool {
        self.position(x, y, z).is_some()
    }

    pub fn ijk_index_floor(&self, x: f64, y: f64, z: f64) -> Option<[usize; 3]> {
        let (px, py, pz) = self.position(x, y, z)?;
        Some([px.index, py.index, pz.index])
    }

    /// Nearest voxel. Along k the comparison is between the two column
    /// elevations that bracket `z`.
    pub fn ijk_index(&self, x: f64, y: f64, z: f64) -> Option<[usize; 3]> {
        let (px, py, pz) = self.position(x, y, z)?;
        Some([round(px), round(py), round(pz)])
    }

    pub fn value(&self, x: f64, y: f64, z: f64) -> f32 {
        let Some((px, py, pz)) = self.position(x, y, z) else {
            return self.missing_value();
        };
        match self.data.interpolation_order() {
            InterpolationOrder::Nearest => {
                let v = self.access_ijk(round(px), round(py), round(pz));
                if self.data.is_missing(v) {
                    self.missing_value()
                } else {
                    v
                }
            }
            InterpolationOrder::Linear => self.data.trilinear(self.data.blocks(), px, py, pz),
        }
    }

    pub fn missing_value(&self) -> f32 {
        self.data.missing_value()
    }

    pub fn range(&self) -> Option<[f32; 2]> {
        self.data.range()
    }

    pub fn iter(&self) -> impl Iterator<Item = f32> + '_ {
        self.data.iter()
    }

    pub fn memory_bytes(&self) -> usize {
        self.data.memory_bytes()
    }
}

fn round(pos: AxisPos) -> usize {
    if pos.weight > 0.5 {
        pos.index + 1
    } else {
        pos.index
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::cache::BlockPool;

    /// 2x2x3 grid in one block, filled by `f(i, j, k)`.
    fn grid(pool: &BlockPool, f: impl Fn(usize, usize, usize) -> f32) -> RegularGrid {
        let mut set = pool.checkout(1, 12).unwrap();
        for k in 0..3 {
            for j in 0..2 {
                for i in 0..2 {
                    set.blocks_mut()[0][k * 4 + j * 2 + i] = f(i, j, k);
                }
            }
        }
        RegularGrid::new(
            Rc::new(set),
            [2, 2, 3],
            [0; 3],
            [1, 1, 2],
            [0.0; 3],
            [1.0, 1.0, 2.0],
            [false; 3],
            None,
        )
        .unwrap()
    }

    fn layered(pool: &BlockPool) -> LayeredGrid {
        // layers at 0, 10, 30 on the left column side, shifted up by 10 on the right
        let elev = grid(pool, |i, _, k| [0.0, 10.0, 30.0][k] + 10.0 * i as f32);
        let data = grid(pool, |_, _, k| k as f32);
        LayeredGrid::new(data, elev).unwrap()
    }

    #[test]
    fn test_extents_from_elevation() {
        let pool = BlockPool::new(1 << 20);
        let g = layered(&pool);
        let (min, max) = g.user_extents();
        assert_eq!(min, [0.0, 0.0, 0.0]);
        assert_eq!(max, [1.0, 1.0, 40.0]);
        assert_eq!(g.user_coordinates(1, 0, 2), [1.0, 0.0, 40.0]);
        assert_eq!(g.periodic(), [false; 3]);
    }

    #[test]
    fn test_k_search() {
        let pool = BlockPool::new(1 << 20);
        let g = layered(&pool);
        assert_eq!(g.ijk_index_floor(0.0, 0.0, 5.0), Some([0, 0, 0]));
        assert_eq!(g.ijk_index_floor(0.0, 0.0, 10.0), Some([0, 0, 1]));
        assert_eq!(g.ijk_index_floor(0.0, 0.0, 30.0), Some([0, 0, 2]));
        // right column is 10 higher
        assert_eq!(g.ijk_index_floor(1.0, 0.0, 15.0), Some([1, 0, 0]));
        assert_eq!(g.ijk_index(1.0, 0.0, 16.0), Some([1, 0, 1]));
        // below the bottom of the column
        assert_eq!(g.ijk_index(1.0, 0.0, 5.0), None);
    }

    #[test]
    fn test_value_interpolates_in_column() {
        let pool = BlockPool::new(1 << 20);
        let g = layered(&pool);
        assert!((g.value(0.0, 0.0, 20.0) - 1.5).abs() < 1e-6);
        // mid column: layers at 5, 15, 35
        assert!((g.value(0.5, 0.5, 10.0) - 0.5).abs() < 1e-6);
        assert!((g.value(0.5, 0.5, 25.0) - 1.5).abs() < 1e-6);
        assert!(g.inside_grid(0.5, 0.5, 35.0));
        assert!(!g.inside_grid(0.5, 0.5, 35.5));
        assert_eq!(g.value(0.5, 0.5, 36.0), f32::INFINITY);
    }

    #[test]
    fn test_mismatched_dims_rejected() {
        let pool = BlockPool::new(1 << 20);
        let data = grid(&pool, |_, _, _| 0.0);
        let set = pool.checkout(1, 8).unwrap();
        let elev = RegularGrid::new(
            Rc::new(set),
            [2, 2, 2],
            [0; 3],
            [1; 3],
            [0.0; 3],
            [1.0; 3],
            [false; 3],
            None,
        )
        .unwrap();
        assert!(LayeredGrid::new(data, elev).is_err());
    }
}
