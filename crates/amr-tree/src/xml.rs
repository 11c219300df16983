//! XML persistence for [`AmrTree`].
//!
//! ```text
//! <AMRTree BaseDimension="2 1 1" MinExtents="0 0 0" MaxExtents="2 1 1" FileVersion="1">
//!   <AMRTreeBranch Location="0 0 0" MinExtents="0 0 0" MaxExtents="1 1 1" RefinementLevel="1">
//!     <ParentTable>0 2</ParentTable>
//!   </AMRTreeBranch>
//!   <AMRTreeBranch Location="1 0 0" MinExtents="1 0 0" MaxExtents="2 1 1" RefinementLevel="0"/>
//! </AMRTree>
//! ```
//!
//! `ParentTable` holds `parent first_child` pairs. Loading replays the
//! refinements in ascending `first_child` order, which is the order in
//! which they were originally made.

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use grid_common::{Extents, GridError, Result};

use crate::tree::{AmrTree, CellId};

/// Current file version written by [`AmrTree::write`].
pub const FILE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename = "AMRTree")]
struct TreeDoc {
    #[serde(rename = "@BaseDimension")]
    base_dimension: String,
    #[serde(rename = "@MinExtents")]
    min_extents: String,
    #[serde(rename = "@MaxExtents")]
    max_extents: String,
    #[serde(rename = "@FileVersion")]
    file_version: u32,
    #[serde(rename = "AMRTreeBranch", default)]
    branches: Vec<BranchDoc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct BranchDoc {
    #[serde(rename = "@Location")]
    location: String,
    #[serde(rename = "@MinExtents")]
    min_extents: String,
    #[serde(rename = "@MaxExtents")]
    max_extents: String,
    #[serde(rename = "@RefinementLevel")]
    refinement_level: u32,
    #[serde(rename = "ParentTable", default, skip_serializing_if = "Option::is_none")]
    parent_table: Option<String>,
}

fn join<T: ToString>(values: &[T]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_list<T: FromStr>(s: &str, what: &str) -> Result<Vec<T>> {
    s.split_whitespace()
        .map(|p| {
            p.parse::<T>()
                .map_err(|_| GridError::format(format!("invalid value '{}' in {}", p, what)))
        })
        .collect()
}

fn parse_triplet<T: FromStr + Copy>(s: &str, what: &str) -> Result<[T; 3]> {
    let v = parse_list::<T>(s, what)?;
    if v.len() != 3 {
        return Err(GridError::format(format!(
            "{} needs 3 values, got {}",
            what,
            v.len()
        )));
    }
    Ok([v[0], v[1], v[2]])
}

impl AmrTree {
    /// Serialize the tree to an XML string.
    pub fn to_xml(&self) -> Result<String> {
        let branches = self
            .refinements_by_branch()
            .into_iter()
            .enumerate()
            .map(|(base_id, pairs)| {
                let (location, _) = self.get_cell_location(base_id)?;
                let bounds = self.get_cell_bounds(base_id)?;
                let flat: Vec<CellId> = pairs.iter().flat_map(|&(p, c)| [p, c]).collect();
                Ok(BranchDoc {
                    location: join(&location),
                    min_extents: join(&bounds.min),
                    max_extents: join(&bounds.max),
                    refinement_level: self.branch_level(base_id),
                    parent_table: (!flat.is_empty()).then(|| join(&flat)),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let extents = self.extents();
        let doc = TreeDoc {
            base_dimension: join(&self.base_dims()),
            min_extents: join(&extents.min),
            max_extents: join(&extents.max),
            file_version: FILE_VERSION,
            branches,
        };

        quick_xml::se::to_string(&doc)
            .map_err(|e| GridError::format(format!("failed to serialize AMR tree: {}", e)))
    }

    /// Rebuild a tree from its XML form.
    pub fn from_xml(xml: &str) -> Result<Self> {
        let doc: TreeDoc = quick_xml::de::from_str(xml)
            .map_err(|e| GridError::format(format!("failed to parse AMR tree: {}", e)))?;

        if doc.file_version != FILE_VERSION {
            return Err(GridError::format(format!(
                "unsupported AMR tree file version {}",
                doc.file_version
            )));
        }

        let base_dims = parse_triplet::<u64>(&doc.base_dimension, "BaseDimension")?;
        let extents = Extents::from_corner_lists(&doc.min_extents, &doc.max_extents)?;
        let mut tree =
            AmrTree::new(base_dims, extents).map_err(|e| GridError::format(e.to_string()))?;

        if doc.branches.len() != tree.num_base_cells() {
            return Err(GridError::format(format!(
                "expected {} AMRTreeBranch elements, found {}",
                tree.num_base_cells(),
                doc.branches.len()
            )));
        }

        let mut pairs = Vec::new();
        for (base_id, branch) in doc.branches.iter().enumerate() {
            let location = parse_triplet::<u64>(&branch.location, "Location")?;
            if tree.get_cell_id(location, 0) != Some(base_id) {
                return Err(GridError::format(format!(
                    "branch {} has location {:?} out of order",
                    base_id, location
                )));
            }
            let table = match &branch.parent_table {
                Some(t) => parse_list::<CellId>(t, "ParentTable")?,
                None => Vec::new(),
            };
            if table.len() % 2 != 0 {
                return Err(GridError::format(format!(
                    "ParentTable of branch {} has an odd number of entries",
                    base_id
                )));
            }
            pairs.extend(table.chunks(2).map(|c| (c[0], c[1])));
        }

        pairs.sort_by_key(|&(_, first_child)| first_child);
        for (parent, first_child) in pairs {
            let got = tree
                .refine_cell(parent)
                .map_err(|e| GridError::format(format!("invalid ParentTable entry: {}", e)))?;
            if got != first_child {
                return Err(GridError::format(format!(
                    "refining cell {} produced first child {}, file records {}",
                    parent, got, first_child
                )));
            }
        }

        for (base_id, branch) in doc.branches.iter().enumerate() {
            let level = tree.branch_level(base_id);
            if level != branch.refinement_level {
                return Err(GridError::format(format!(
                    "branch {} declares refinement level {}, tree has {}",
                    base_id, branch.refinement_level, level
                )));
            }
        }

        Ok(tree)
    }

    /// Write the tree to `path`.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let xml = self.to_xml()?;
        std::fs::write(path, xml)?;
        tracing::info!(
            path = %path.display(),
            cells = self.get_num_cells(),
            "Wrote AMR tree"
        );
        Ok(())
    }

    /// Load a tree previously written with [`AmrTree::write`].
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let xml = std::fs::read_to_string(path)?;
        let tree = Self::from_xml(&xml)?;
        tracing::info!(
            path = %path.display(),
            cells = tree.get_num_cells(),
            "Loaded AMR tree"
        );
        Ok(tree)
    }
}
