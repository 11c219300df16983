//! In-memory grids built from decoded block regions.
//!
//! A grid shares its block buffers with the cache entry it was served from.
//! While any grid handle is alive the entry cannot be evicted.

mod layered;
mod regular;
mod spherical;

use std::rc::Rc;

pub use layered::LayeredGrid;
pub use regular::{RegularGrid, VoxelLayout};
pub use spherical::{to_cartesian, validate_permutation, SphericalGrid};

use crate::cache::BlockSet;
use crate::types::InterpolationOrder;

/// One resolution-level region of one variable at one timestep.
#[derive(Debug, Clone)]
pub enum Grid {
    Regular(RegularGrid),
    Layered(LayeredGrid),
    Spherical(SphericalGrid),
}

macro_rules! dispatch {
    ($self:expr, $g:ident => $body:expr) => {
        match $self {
            Grid::Regular($g) => $body,
            Grid::Layered($g) => $body,
            Grid::Spherical($g) => $body,
        }
    };
}

impl Grid {
    /// Short name of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Grid::Regular(_) => "regular",
            Grid::Layered(_) => "layered",
            Grid::Spherical(_) => "spherical",
        }
    }

    pub fn as_regular(&self) -> Option<&RegularGrid> {
        match self {
            Grid::Regular(g) => Some(g),
            _ => None,
        }
    }

    pub fn as_layered(&self) -> Option<&LayeredGrid> {
        match self {
            Grid::Layered(g) => Some(g),
            _ => None,
        }
    }

    pub fn as_spherical(&self) -> Option<&SphericalGrid> {
        match self {
            Grid::Spherical(g) => Some(g),
            _ => None,
        }
    }

    pub fn with_interpolation_order(self, order: InterpolationOrder) -> Self {
        match self {
            Grid::Regular(g) => Grid::Regular(g.with_interpolation_order(order)),
            Grid::Layered(g) => Grid::Layered(g.with_interpolation_order(order)),
            Grid::Spherical(g) => Grid::Spherical(g.with_interpolation_order(order)),
        }
    }

    /// The data block buffers.
    pub fn blocks(&self) -> &Rc<BlockSet> {
        match self {
            Grid::Regular(g) => g.blocks(),
            Grid::Layered(g) => g.data().blocks(),
            Grid::Spherical(g) => g.base().blocks(),
        }
    }

    /// Whether another handle shares this grid's data buffers.
    pub fn is_shared(&self) -> bool {
        Rc::strong_count(self.blocks()) > 1
    }

    pub fn access_ijk(&self, i: usize, j: usize, k: usize) -> f32 {
        dispatch!(self, g => g.access_ijk(i, j, k))
    }

    /// Sample at a user coordinate; outside points yield the missing value.
    pub fn value(&self, x: f64, y: f64, z: f64) -> f32 {
        dispatch!(self, g => g.value(x, y, z))
    }

    pub fn user_coordinates(&self, i: usize, j: usize, k: usize) -> [f64; 3] {
        dispatch!(self, g => g.user_coordinates(i, j, k))
    }

    pub fn ijk_index(&self, x: f64, y: f64, z: f64) -> Option<[usize; 3]> {
        dispatch!(self, g => g.ijk_index(x, y, z))
    }

    pub fn ijk_index_floor(&self, x: f64, y: f64, z: f64) -> Option<[usize; 3]> {
        dispatch!(self, g => g.ijk_index_floor(x, y, z))
    }

    pub fn inside_grid(&self, x: f64, y: f64, z: f64) -> bool {
        dispatch!(self, g => g.inside_grid(x, y, z))
    }

    pub fn dimensions(&self) -> [usize; 3] {
        dispatch!(self, g => g.dimensions())
    }

    pub fn user_extents(&self) -> ([f64; 3], [f64; 3]) {
        dispatch!(self, g => g.user_extents())
    }

    pub fn periodic(&self) -> [bool; 3] {
        dispatch!(self, g => g.periodic())
    }

    pub fn missing_value(&self) -> f32 {
        dispatch!(self, g => g.missing_value())
    }

    /// Min and max ignoring missing values.
    pub fn range(&self) -> Option<[f32; 2]> {
        dispatch!(self, g => g.range())
    }

    /// Voxel values, x fastest.
    pub fn iter(&self) -> Box<dyn Iterator<Item = f32> + '_> {
        dispatch!(self, g => Box::new(g.iter()))
    }

    /// Bytes of the data buffers, excluding any elevation companion.
    pub fn memory_bytes(&self) -> usize {
        dispatch!(self, g => g.memory_bytes())
    }
}
