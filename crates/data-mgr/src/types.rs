//! Core types for the data manager.

use serde::{Deserialize, Serialize};

use grid_common::{GridError, Result};

/// Identifies one decoded field instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VariableKey {
    pub ts: usize,
    pub varname: String,
    pub reflevel: usize,
    pub lod: usize,
}

impl VariableKey {
    pub fn new(ts: usize, varname: impl Into<String>, reflevel: usize, lod: usize) -> Self {
        Self {
            ts,
            varname: varname.into(),
            reflevel,
            lod,
        }
    }
}

/// Inclusive block-index bounding box at one refinement level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockRange {
    pub bmin: [usize; 3],
    pub bmax: [usize; 3],
}

impl BlockRange {
    pub fn new(bmin: [usize; 3], bmax: [usize; 3]) -> Self {
        Self { bmin, bmax }
    }

    /// Check that `bmin <= bmax` on every axis.
    pub fn validate(&self) -> Result<()> {
        if (0..3).any(|i| self.bmin[i] > self.bmax[i]) {
            return Err(GridError::invalid_argument(format!(
                "malformed block range {:?}..={:?}",
                self.bmin, self.bmax
            )));
        }
        Ok(())
    }

    /// Number of blocks along each axis.
    pub fn dims(&self) -> [usize; 3] {
        [
            self.bmax[0] - self.bmin[0] + 1,
            self.bmax[1] - self.bmin[1] + 1,
            self.bmax[2] - self.bmin[2] + 1,
        ]
    }

    pub fn num_blocks(&self) -> usize {
        let d = self.dims();
        d[0] * d[1] * d[2]
    }
}

/// Kind of payload cached for a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionKind {
    Float,
    UInt8,
    UInt16,
}

/// Full cache key: field instance, block range and payload kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegionKey {
    pub var: VariableKey,
    pub range: BlockRange,
    pub kind: RegionKind,
}

/// Dimensionality of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VarType {
    #[serde(rename = "3d")]
    Var3D,
    #[serde(rename = "2dxy")]
    Var2DXY,
    #[serde(rename = "2dxz")]
    Var2DXZ,
    #[serde(rename = "2dyz")]
    Var2DYZ,
}

impl VarType {
    /// Axis a 2-D variable does not span.
    pub fn collapsed_axis(&self) -> Option<usize> {
        match self {
            VarType::Var3D => None,
            VarType::Var2DXY => Some(2),
            VarType::Var2DXZ => Some(1),
            VarType::Var2DYZ => Some(0),
        }
    }
}

/// Coordinate system declared by a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordSystem {
    #[default]
    Cartesian,
    Spherical,
}

impl CoordSystem {
    /// Parse from string (case-insensitive).
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "spherical" => Self::Spherical,
            _ => Self::Cartesian,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cartesian => "cartesian",
            Self::Spherical => "spherical",
        }
    }
}

/// Grid type declared by a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GridKind {
    #[default]
    Regular,
    Stretched,
    Layered,
    #[serde(rename = "block_amr")]
    BlockAmr,
}

impl GridKind {
    /// Parse from string (case-insensitive).
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "layered" => Self::Layered,
            "stretched" => Self::Stretched,
            "block_amr" => Self::BlockAmr,
            _ => Self::Regular,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Regular => "regular",
            Self::Stretched => "stretched",
            Self::Layered => "layered",
            Self::BlockAmr => "block_amr",
        }
    }
}

/// Interpolation used when sampling a grid at a user coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterpolationOrder {
    Nearest,
    #[default]
    Linear,
}

impl InterpolationOrder {
    /// Parse from string (case-insensitive).
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "nearest" | "0" => Self::Nearest,
            _ => Self::Linear,
        }
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub memory_bytes: u64,
    /// Bytes of entries still referenced by live grids or quantized
    /// buffers.
    pub pinned_bytes: u64,
    pub evictions: u64,
}

impl CacheStats {
    /// Fraction of lookups served from the cache.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
