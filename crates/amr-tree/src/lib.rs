//! Adaptive Mesh Refinement tree.
//!
//! A spatial index over an adaptively refined octree domain. AMR-backed
//! readers use it to locate the leaf cell containing a point and to turn a
//! spatial query into the block ranges they need to read.
//!
//! # Cell addressing
//!
//! ```text
//! base dims [2,1,1]          after refine_cell(1)
//!
//!   +-----+-----+            +-----+--+--+
//!   |  0  |  1  |            |  0  | 2| 3|   ids 2..=9 are the
//!   |     |     |            |     +--+--+   children of cell 1
//!   +-----+-----+            +-----+--+--+
//! ```
//!
//! Cells live in an append-only arena: ids are never reused or renumbered,
//! and refining a leaf always appends exactly eight contiguous children.
//!
//! # Example
//!
//! ```ignore
//! use amr_tree::AmrTree;
//! use grid_common::Extents;
//!
//! let mut tree = AmrTree::new([1, 1, 1], Extents::new([0.0; 3], [1.0; 3]))?;
//! let first = tree.refine_cell(0)?;
//! let leaf = tree.find_cell([0.75, 0.25, 0.25])?;
//! assert_eq!(leaf, first + 1);
//! tree.write("tree.xml")?;
//! ```

pub mod tree;
pub mod xml;

pub use grid_common::{Extents, GridError, Result};
pub use tree::{AmrTree, CellId, NUM_CHILDREN};
pub use xml::FILE_VERSION;
