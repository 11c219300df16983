//! Spherical grid: samples regular in longitude, latitude and radius,
//! addressed with Cartesian user coordinates.

use grid_common::{GridError, Result};

use super::regular::RegularGrid;
use crate::types::InterpolationOrder;

const LON: usize = 0;
const LAT: usize = 1;
const RADIUS: usize = 2;

/// Check that `p` is a permutation of `0..3`.
pub fn validate_permutation(p: [usize; 3]) -> Result<()> {
    let mut seen = [false; 3];
    for &a in &p {
        if a > 2 || seen[a] {
            return Err(GridError::invalid_argument(format!(
                "grid permutation {:?} is not a permutation of 0, 1, 2",
                p
            )));
        }
        seen[a] = true;
    }
    Ok(())
}

/// Convert (lon°, lat°, radius) to Cartesian.
pub fn to_cartesian(sph: [f64; 3]) -> [f64; 3] {
    let (lon, lat, r) = (sph[LON].to_radians(), sph[LAT].to_radians(), sph[RADIUS]);
    [r * lat.cos() * lon.cos(), r * lat.cos() * lon.sin(), r * lat.sin()]
}

/// Spherical-coordinate grid.
///
/// `permutation[i]` names the spherical axis (0 = longitude, 1 = latitude,
/// 2 = radius) that storage axis `i` holds.
#[derive(Debug, Clone)]
pub struct SphericalGrid {
    base: RegularGrid,
    permutation: [usize; 3],
    sph_min: [f64; 3],
    sph_max: [f64; 3],
    cart_min: [f64; 3],
    cart_max: [f64; 3],
}

impl SphericalGrid {
    /// Wrap a grid whose user extents are in storage order, in degrees and
    /// radius units.
    pub fn new(base: RegularGrid, permutation: [usize; 3]) -> Result<Self> {
        validate_permutation(permutation)?;

        let (smin, smax) = base.user_extents();
        let mut sph_min = [0.0; 3];
        let mut sph_max = [0.0; 3];
        let mut sph_dims = [0usize; 3];
        let dims = base.dimensions();
        for i in 0..3 {
            sph_min[permutation[i]] = smin[i];
            sph_max[permutation[i]] = smax[i];
            sph_dims[permutation[i]] = dims[i];
        }

        let sample = |axis: usize, n: usize| -> Vec<f64> {
            if n <= 1 {
                return vec![sph_min[axis]];
            }
            let step = (sph_max[axis] - sph_min[axis]) / (n - 1) as f64;
            (0..n).map(|s| sph_min[axis] + s as f64 * step).collect()
        };
        let lons = sample(LON, sph_dims[LON]);
        let lats = sample(LAT, sph_dims[LAT]);

        let mut cart_min = [f64::INFINITY; 3];
        let mut cart_max = [f64::NEG_INFINITY; 3];
        for &r in &[sph_min[RADIUS], sph_max[RADIUS]] {
            for &lat in &lats {
                for &lon in &lons {
                    let c = to_cartesian([lon, lat, r]);
                    for a in 0..3 {
                        cart_min[a] = cart_min[a].min(c[a]);
                        cart_max[a] = cart_max[a].max(c[a]);
                    }
                }
            }
        }

        Ok(Self {
            base,
            permutation,
            sph_min,
            sph_max,
            cart_min,
            cart_max,
        })
    }

    pub fn with_interpolation_order(mut self, order: InterpolationOrder) -> Self {
        self.base = self.base.with_interpolation_order(order);
        self
    }

    pub fn base(&self) -> &RegularGrid {
        &self.base
    }

    pub fn permutation(&self) -> [usize; 3] {
        self.permutation
    }

    /// Extents as (lon°, lat°, radius).
    pub fn spherical_extents(&self) -> ([f64; 3], [f64; 3]) {
        (self.sph_min, self.sph_max)
    }

    /// Cartesian bounding box of the shell section.
    pub fn user_extents(&self) -> ([f64; 3], [f64; 3]) {
        (self.cart_min, self.cart_max)
    }

    /// Convert a Cartesian point to (lon°, lat°, radius), with longitude in
    /// `[lon_min, lon_min + 360)`.
    pub fn to_spherical(&self, p: [f64; 3]) -> [f64; 3] {
        let r = (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt();
        let lat = if r > 0.0 {
            (p[2] / r).clamp(-1.0, 1.0).asin().to_degrees()
        } else {
            0.0
        };
        let lo = self.sph_min[LON].min(self.sph_max[LON]);
        let lon = p[1].atan2(p[0]).to_degrees();
        let lon = lo + (lon - lo).rem_euclid(360.0);
        [lon, lat, r]
    }

    fn to_storage(&self, x: f64, y: f64, z: f64) -> [f64; 3] {
        let sph = self.to_spherical([x, y, z]);
        let mut s = [0.0; 3];
        for i in 0..3 {
            s[i] = sph[self.permutation[i]];
        }
        s
    }

    pub fn user_coordinates(&self, i: usize, j: usize, k: usize) -> [f64; 3] {
        let s = self.base.user_coordinates(i, j, k);
        let mut sph = [0.0; 3];
        for a in 0..3 {
            sph[self.permutation[a]] = s[a];
        }
        to_cartesian(sph)
    }

    pub fn value(&self, x: f64, y: f64, z: f64) -> f32 {
        let s = self.to_storage(x, y, z);
        self.base.value(s[0], s[1], s[2])
    }

    pub fn inside_grid(&self, x: f64, y: f64, z: f64) -> bool {
        let s = self.to_storage(x, y, z);
        self.base.inside_grid(s[0], s[1], s[2])
    }

    pub fn ijk_index(&self, x: f64, y: f64, z: f64) -> Option<[usize; 3]> {
        let s = self.to_storage(x, y, z);
        self.base.ijk_index(s[0], s[1], s[2])
    }

    pub fn ijk_index_floor(&self, x: f64, y: f64, z: f64) -> Option<[usize; 3]> {
        let s = self.to_storage(x, y, z);
        self.base.ijk_index_floor(s[0], s[1], s[2])
    }

    pub fn access_ijk(&self, i: usize, j: usize, k: usize) -> f32 {
        self.base.access_ijk(i, j, k)
    }

    pub fn dimensions(&self) -> [usize; 3] {
        self.base.dimensions()
    }

    pub fn periodic(&self) -> [bool; 3] {
        self.base.periodic()
    }

    pub fn missing_value(&self) -> f32 {
        self.base.missing_value()
    }

    pub fn range(&self) -> Option<[f32; 2]> {
        self.base.range()
    }

    pub fn iter(&self) -> impl Iterator<Item = f32> + '_ {
        self.base.iter()
    }

    pub fn memory_bytes(&self) -> usize {
        self.base.memory_bytes()
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::cache::BlockPool;

    /// Storage order (radius, lat, lon): 2 radii x 3 lats x 5 lons.
    fn shell(pool: &BlockPool) -> SphericalGrid {
        let mut set = pool.checkout(1, 30).unwrap();
        for (n, v) in set.blocks_mut()[0].iter_mut().enumerate() {
            *v = n as f32;
        }
        let base = RegularGrid::new(
            Rc::new(set),
            [2, 3, 5],
            [0; 3],
            [1, 2, 4],
            [1.0, -90.0, 0.0],
            [2.0, 90.0, 360.0],
            [false; 3],
            None,
        )
        .unwrap();
        SphericalGrid::new(base, [2, 1, 0]).unwrap()
    }

    #[test]
    fn test_permutation_validation() {
        assert!(validate_permutation([0, 1, 2]).is_ok());
        assert!(validate_permutation([2, 0, 1]).is_ok());
        assert!(validate_permutation([0, 0, 1]).is_err());
        assert!(validate_permutation([0, 1, 3]).is_err());
    }

    #[test]
    fn test_spherical_extents_permuted() {
        let pool = BlockPool::new(1 << 20);
        let g = shell(&pool);
        let (min, max) = g.spherical_extents();
        assert_eq!(min, [0.0, -90.0, 1.0]);
        assert_eq!(max, [360.0, 90.0, 2.0]);
    }

    #[test]
    fn test_cartesian_extents() {
        let pool = BlockPool::new(1 << 20);
        let g = shell(&pool);
        let (min, max) = g.user_extents();
        for a in 0..3 {
            assert!((min[a] + 2.0).abs() < 1e-9, "{:?}", min);
            assert!((max[a] - 2.0).abs() < 1e-9, "{:?}", max);
        }
    }

    #[test]
    fn test_to_spherical() {
        let pool = BlockPool::new(1 << 20);
        let g = shell(&pool);
        let s = g.to_spherical([0.0, -1.5, 0.0]);
        assert!((s[0] - 270.0).abs() < 1e-9);
        assert!(s[1].abs() < 1e-9);
        assert!((s[2] - 1.5).abs() < 1e-9);
        let s = g.to_spherical([0.0, 0.0, 2.0]);
        assert!((s[1] - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_value_through_cartesian() {
        let pool = BlockPool::new(1 << 20);
        let g = shell(&pool);
        // lon 90 (k = 1), lat 0 (j = 1), radius 2 (i = 1)
        let expected = g.access_ijk(1, 1, 1);
        assert_eq!(g.ijk_index(0.0, 2.0, 0.0), Some([1, 1, 1]));
        assert!((g.value(0.0, 2.0, 0.0) - expected).abs() < 1e-4);
        assert!(!g.inside_grid(0.0, 0.5, 0.0));

        let c = g.user_coordinates(1, 1, 1);
        assert!(c[0].abs() < 1e-9 && (c[1] - 2.0).abs() < 1e-9 && c[2].abs() < 1e-9);
    }
}
