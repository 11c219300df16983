//! Dataset descriptor: catalog and geometry shared by the reader backends.

use std::path::Path;

use serde::{Deserialize, Serialize};

use grid_common::{Extents, GridError, Result, TimeStep};

use crate::blocks::{dims_at_level, BlockGeometry};
use crate::grid::validate_permutation;
use crate::types::{CoordSystem, GridKind, VarType};

pub const DEFAULT_ELEVATION_VARIABLE: &str = "ELEVATION";

fn default_num_lods() -> usize {
    1
}

fn default_permutation() -> [usize; 3] {
    [0, 1, 2]
}

fn default_elevation() -> String {
    DEFAULT_ELEVATION_VARIABLE.to_string()
}

/// One variable of the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDescriptor {
    pub name: String,
    pub var_type: VarType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_value: Option<f32>,
}

impl VariableDescriptor {
    pub fn new(name: impl Into<String>, var_type: VarType) -> Self {
        Self {
            name: name.into(),
            var_type,
            missing_value: None,
        }
    }

    pub fn with_missing_value(mut self, value: f32) -> Self {
        self.missing_value = Some(value);
        self
    }
}

/// Catalog and geometry of a multiresolution dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    /// Voxel dimensions at the finest level.
    pub dims: [usize; 3],
    pub block_size: [usize; 3],
    #[serde(default)]
    pub num_transforms: usize,
    #[serde(default = "default_num_lods")]
    pub num_lods: usize,
    #[serde(default)]
    pub periodic: [bool; 3],
    #[serde(default)]
    pub coord_system: CoordSystem,
    #[serde(default)]
    pub grid_type: GridKind,
    #[serde(default = "default_permutation")]
    pub grid_permutation: [usize; 3],
    /// Domain extents; for spherical datasets in (storage order) degrees and
    /// radius units.
    pub extents: Extents,
    /// Per-timestep extents for moving domains. Empty means `extents` holds
    /// for every timestep.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub timestep_extents: Vec<Extents>,
    pub timesteps: Vec<TimeStep>,
    pub variables: Vec<VariableDescriptor>,
    #[serde(default = "default_elevation")]
    pub elevation_variable: String,
}

impl DatasetDescriptor {
    /// A single-level, single-timestep dataset with no variables.
    pub fn new(dims: [usize; 3], block_size: [usize; 3], extents: Extents) -> Self {
        Self {
            dims,
            block_size,
            num_transforms: 0,
            num_lods: 1,
            periodic: [false; 3],
            coord_system: CoordSystem::Cartesian,
            grid_type: GridKind::Regular,
            grid_permutation: default_permutation(),
            extents,
            timestep_extents: Vec::new(),
            timesteps: vec![TimeStep::new(0.0)],
            variables: Vec::new(),
            elevation_variable: default_elevation(),
        }
    }

    pub fn with_variable(mut self, var: VariableDescriptor) -> Self {
        self.variables.push(var);
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let desc: Self = serde_json::from_str(json)?;
        desc.validate()?;
        Ok(desc)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| GridError::io(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_json()?)
            .map_err(|e| GridError::io(format!("{}: {}", path.display(), e)))
    }

    pub fn validate(&self) -> Result<()> {
        if self.dims.iter().any(|&d| d == 0) {
            return Err(GridError::format(format!("invalid dimensions {:?}", self.dims)));
        }
        if self.block_size.iter().any(|&b| b == 0) {
            return Err(GridError::format(format!(
                "invalid block size {:?}",
                self.block_size
            )));
        }
        if self.num_lods == 0 {
            return Err(GridError::format("num_lods must be >= 1"));
        }
        if self.num_transforms >= usize::BITS as usize {
            return Err(GridError::format(format!(
                "too many transforms: {}",
                self.num_transforms
            )));
        }
        if self.timesteps.is_empty() {
            return Err(GridError::format("dataset has no timesteps"));
        }
        if !self.timestep_extents.is_empty() && self.timestep_extents.len() != self.timesteps.len()
        {
            return Err(GridError::format(format!(
                "{} timestep extents for {} timesteps",
                self.timestep_extents.len(),
                self.timesteps.len()
            )));
        }
        for (ts, step) in self.timesteps.iter().enumerate() {
            step.datetime()
                .map_err(|e| GridError::format(format!("timestep {}: {}", ts, e)))?;
        }
        validate_permutation(self.grid_permutation)
            .map_err(|e| GridError::format(e.to_string()))?;
        for (i, var) in self.variables.iter().enumerate() {
            if var.name.is_empty() {
                return Err(GridError::format("empty variable name"));
            }
            if self.variables[..i].iter().any(|v| v.name == var.name) {
                return Err(GridError::format(format!("duplicate variable {}", var.name)));
            }
        }
        Ok(())
    }

    pub fn variable(&self, name: &str) -> Option<&VariableDescriptor> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn names_of(&self, var_type: VarType) -> Vec<String> {
        self.variables
            .iter()
            .filter(|v| v.var_type == var_type)
            .map(|v| v.name.clone())
            .collect()
    }

    pub fn check_timestep(&self, ts: usize) -> Result<()> {
        if ts >= self.timesteps.len() {
            return Err(GridError::not_found(format!(
                "timestep {} (dataset has {})",
                ts,
                self.timesteps.len()
            )));
        }
        Ok(())
    }

    pub fn check_level(&self, reflevel: usize) -> Result<()> {
        if reflevel > self.num_transforms {
            return Err(GridError::invalid_argument(format!(
                "refinement level {} exceeds {}",
                reflevel, self.num_transforms
            )));
        }
        Ok(())
    }

    /// Voxel dimensions at a refinement level.
    pub fn grid_dim(&self, reflevel: usize) -> Result<[usize; 3]> {
        self.check_level(reflevel)?;
        dims_at_level(self.dims, self.num_transforms, reflevel)
    }

    /// Block geometry of a variable at a refinement level.
    pub fn geometry(&self, varname: &str, reflevel: usize) -> Result<BlockGeometry> {
        let var = self
            .variable(varname)
            .ok_or_else(|| GridError::not_found(format!("variable {}", varname)))?;
        BlockGeometry::for_variable(var.var_type, self.grid_dim(reflevel)?, self.block_size)
    }

    pub fn extents_at(&self, ts: usize) -> Result<Extents> {
        self.check_timestep(ts)?;
        Ok(self
            .timestep_extents
            .get(ts)
            .copied()
            .unwrap_or(self.extents))
    }

    /// Linear voxel to user mapping over the timestep's extents.
    pub fn map_vox_to_user(&self, ts: usize, vcoord: [usize; 3], reflevel: usize) -> Result<[f64; 3]> {
        let ext = self.extents_at(ts)?;
        let dims = self.grid_dim(reflevel)?;
        let mut user = [0.0; 3];
        for i in 0..3 {
            user[i] = if dims[i] > 1 {
                ext.min[i] + vcoord[i] as f64 * (ext.max[i] - ext.min[i]) / (dims[i] - 1) as f64
            } else {
                ext.min[i]
            };
        }
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> DatasetDescriptor {
        DatasetDescriptor::new([64, 32, 16], [16, 16, 16], Extents::new([0.0; 3], [63.0, 31.0, 15.0]))
            .with_variable(VariableDescriptor::new("TEMP", VarType::Var3D))
            .with_variable(VariableDescriptor::new("PSFC", VarType::Var2DXY).with_missing_value(-1.0))
    }

    #[test]
    fn test_json_round_trip_with_defaults() {
        let json = r#"{
            "dims": [8, 8, 8],
            "block_size": [4, 4, 4],
            "extents": {"min": [0, 0, 0], "max": [1, 1, 1]},
            "timesteps": [{"user_time": 0.0, "time_stamp": "2024-01-01T00:00:00Z"}],
            "variables": [{"name": "U", "var_type": "3d"}]
        }"#;
        let desc = DatasetDescriptor::from_json(json).unwrap();
        assert_eq!(desc.num_lods, 1);
        assert_eq!(desc.grid_permutation, [0, 1, 2]);
        assert_eq!(desc.elevation_variable, "ELEVATION");
        assert_eq!(desc.coord_system, CoordSystem::Cartesian);

        let again = DatasetDescriptor::from_json(&desc.to_json().unwrap()).unwrap();
        assert_eq!(again, desc);
    }

    #[test]
    fn test_validation() {
        let mut desc = descriptor();
        assert!(desc.validate().is_ok());

        desc.variables.push(VariableDescriptor::new("TEMP", VarType::Var3D));
        assert!(matches!(desc.validate(), Err(GridError::Format(_))));

        let mut desc = descriptor();
        desc.grid_permutation = [0, 2, 2];
        assert!(desc.validate().is_err());

        let mut desc = descriptor();
        desc.timestep_extents = vec![desc.extents; 2];
        assert!(desc.validate().is_err());
    }

    #[test]
    fn test_time_stamps_validated() {
        let mut desc = descriptor();
        desc.timesteps = vec![
            TimeStep::with_stamp(0.0, "2024-06-01T00:00:00Z"),
            TimeStep::with_stamp(1.0, "2024-06-01_06:00:00"),
            TimeStep::new(2.0),
        ];
        assert!(desc.validate().is_ok());

        desc.timesteps.push(TimeStep::with_stamp(3.0, "yesterday noon"));
        assert!(matches!(desc.validate(), Err(GridError::Format(_))));

        let json = desc.to_json().unwrap();
        assert!(matches!(
            DatasetDescriptor::from_json(&json),
            Err(GridError::Format(_))
        ));
    }

    #[test]
    fn test_geometry_and_levels() {
        let mut desc = descriptor();
        desc.num_transforms = 2;
        assert_eq!(desc.grid_dim(0).unwrap(), [16, 8, 4]);
        assert!(desc.grid_dim(3).is_err());

        let geom = desc.geometry("PSFC", 2).unwrap();
        assert_eq!(geom.bdims, [4, 2, 1]);
        assert!(matches!(desc.geometry("NOPE", 0), Err(GridError::NotFound(_))));
    }

    #[test]
    fn test_map_vox_to_user() {
        let mut desc = descriptor();
        desc.num_transforms = 1;
        assert_eq!(desc.map_vox_to_user(0, [63, 0, 15], 1).unwrap(), [63.0, 0.0, 15.0]);
        // coarser level spans the same extents with half the voxels
        assert_eq!(desc.map_vox_to_user(0, [31, 15, 7], 0).unwrap(), [63.0, 31.0, 15.0]);
        assert!(desc.map_vox_to_user(1, [0; 3], 0).is_err());
    }
}
