//! Arena-backed AMR octree.

use grid_common::{Extents, GridError, Result};

/// Integer address of a cell in an [`AmrTree`].
pub type CellId = usize;

/// Sentinel stored in the arena for "no cell".
pub(crate) const NO_CELL: CellId = CellId::MAX;

/// Number of children created by one refinement.
pub const NUM_CHILDREN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Cell {
    pub parent: CellId,
    pub first_child: CellId,
    pub level: u32,
    /// xyz index among all cells of `level` across the whole domain.
    pub location: [u64; 3],
}

impl Cell {
    fn base(location: [u64; 3]) -> Self {
        Self {
            parent: NO_CELL,
            first_child: NO_CELL,
            level: 0,
            location,
        }
    }

    fn is_refined(&self) -> bool {
        self.first_child != NO_CELL
    }
}

/// Adaptive refinement octree over a rectangular domain.
///
/// The domain is split into `base_dims` base cells with ids `0..nbase` in
/// x-fastest order; cell 0 is the root. Refining a leaf appends its eight
/// children to the arena, so ids are never reused or renumbered. Child
/// `first_child + o` covers octant `o`, where bit 0 of `o` selects the upper
/// half along x, bit 1 along y and bit 2 along z.
#[derive(Debug, Clone)]
pub struct AmrTree {
    base_dims: [u64; 3],
    extents: Extents,
    cells: Vec<Cell>,
}

impl AmrTree {
    /// Create a tree of unrefined base cells.
    pub fn new(base_dims: [u64; 3], extents: Extents) -> Result<Self> {
        if base_dims.iter().any(|&d| d == 0) {
            return Err(GridError::invalid_argument(format!(
                "base dimensions must be non-zero: {:?}",
                base_dims
            )));
        }
        if (0..3).any(|i| !(extents.min[i] < extents.max[i])) {
            return Err(GridError::invalid_argument(format!(
                "degenerate domain extents: {:?}",
                extents
            )));
        }

        let nbase = (base_dims[0] * base_dims[1] * base_dims[2]) as usize;
        let mut cells = Vec::with_capacity(nbase);
        for z in 0..base_dims[2] {
            for y in 0..base_dims[1] {
                for x in 0..base_dims[0] {
                    cells.push(Cell::base([x, y, z]));
                }
            }
        }

        Ok(Self {
            base_dims,
            extents,
            cells,
        })
    }

    pub fn base_dims(&self) -> [u64; 3] {
        self.base_dims
    }

    /// Domain bounds in user coordinates.
    pub fn extents(&self) -> Extents {
        self.extents
    }

    /// Number of base cells.
    pub fn num_base_cells(&self) -> usize {
        (self.base_dims[0] * self.base_dims[1] * self.base_dims[2]) as usize
    }

    pub fn get_num_cells(&self) -> usize {
        self.cells.len()
    }

    /// Number of cells at one refinement level.
    pub fn get_num_cells_at(&self, level: u32) -> usize {
        self.cells.iter().filter(|c| c.level == level).count()
    }

    fn cell(&self, id: CellId) -> Result<&Cell> {
        self.cells
            .get(id)
            .ok_or_else(|| GridError::not_found(format!("cell id {} (tree has {} cells)", id, self.cells.len())))
    }

    /// Refine a leaf, returning the id of its first child.
    pub fn refine_cell(&mut self, id: CellId) -> Result<CellId> {
        let cell = *self.cell(id)?;
        if cell.is_refined() {
            return Err(GridError::invalid_argument(format!(
                "cell {} is already refined",
                id
            )));
        }

        let first = self.cells.len();
        let level = cell.level + 1;
        for octant in 0..NUM_CHILDREN {
            let mut location = [0u64; 3];
            for (i, loc) in location.iter_mut().enumerate() {
                *loc = cell.location[i] * 2 + ((octant >> i) & 1) as u64;
            }
            self.cells.push(Cell {
                parent: id,
                first_child: NO_CELL,
                level,
                location,
            });
        }
        self.cells[id].first_child = first;

        tracing::trace!(cell = id, first_child = first, level, "Refined cell");
        Ok(first)
    }

    /// First child of `id`, or `None` for a leaf.
    pub fn get_cell_children(&self, id: CellId) -> Result<Option<CellId>> {
        let cell = self.cell(id)?;
        Ok(cell.is_refined().then_some(cell.first_child))
    }

    /// Parent of `id`, or `None` for a base cell.
    pub fn get_cell_parent(&self, id: CellId) -> Result<Option<CellId>> {
        let cell = self.cell(id)?;
        Ok((cell.parent != NO_CELL).then_some(cell.parent))
    }

    /// Refinement level of `id`; base cells are level 0.
    pub fn get_cell_level(&self, id: CellId) -> Result<u32> {
        Ok(self.cell(id)?.level)
    }

    /// xyz index of `id` among all cells at its level, and the level.
    pub fn get_cell_location(&self, id: CellId) -> Result<([u64; 3], u32)> {
        let cell = self.cell(id)?;
        Ok((cell.location, cell.level))
    }

    /// User-coordinate bounds of `id`.
    pub fn get_cell_bounds(&self, id: CellId) -> Result<Extents> {
        let cell = self.cell(id)?;
        Ok(self.bounds_at(cell.location, cell.level))
    }

    fn bounds_at(&self, location: [u64; 3], level: u32) -> Extents {
        let scale = 1u64 << level;
        let dims = [
            self.base_dims[0] * scale,
            self.base_dims[1] * scale,
            self.base_dims[2] * scale,
        ];
        self.extents.subdivide(dims, location)
    }

    fn base_cell_id(&self, base: [u64; 3]) -> CellId {
        (base[2] * self.base_dims[0] * self.base_dims[1] + base[1] * self.base_dims[0] + base[0])
            as CellId
    }

    /// Id of the cell at `location` on `level`, if that cell exists.
    pub fn get_cell_id(&self, location: [u64; 3], level: u32) -> Option<CellId> {
        let base = [
            location[0] >> level,
            location[1] >> level,
            location[2] >> level,
        ];
        if (0..3).any(|i| base[i] >= self.base_dims[i]) {
            return None;
        }

        let mut id = self.base_cell_id(base);
        for l in (0..level).rev() {
            let cell = &self.cells[id];
            if !cell.is_refined() {
                return None;
            }
            let octant = (0..3).fold(0usize, |acc, i| acc | ((((location[i] >> l) & 1) as usize) << i));
            id = cell.first_child + octant;
        }
        Some(id)
    }

    /// Deepest refinement level present in the tree.
    pub fn get_refinement_level(&self) -> u32 {
        self.cells.iter().map(|c| c.level).max().unwrap_or(0)
    }

    /// Deepest refinement level among the base cells in `[min, max]`.
    pub fn get_refinement_level_in(&self, min: [u64; 3], max: [u64; 3]) -> Result<u32> {
        if (0..3).any(|i| min[i] > max[i] || max[i] >= self.base_dims[i]) {
            return Err(GridError::invalid_argument(format!(
                "base cell range {:?}..={:?} outside base dimensions {:?}",
                min, max, self.base_dims
            )));
        }

        Ok(self
            .cells
            .iter()
            .filter(|c| {
                (0..3).all(|i| {
                    let b = c.location[i] >> c.level;
                    b >= min[i] && b <= max[i]
                })
            })
            .map(|c| c.level)
            .max()
            .unwrap_or(0))
    }

    /// Leaf cell containing `coord`.
    ///
    /// A point on the boundary between two cells belongs to the lower one.
    pub fn find_cell(&self, coord: [f64; 3]) -> Result<CellId> {
        self.find_cell_at_level(coord, u32::MAX)
    }

    /// Like [`AmrTree::find_cell`] but stops descending at `max_level`.
    pub fn find_cell_at_level(&self, coord: [f64; 3], max_level: u32) -> Result<CellId> {
        if !self.extents.contains_point(coord) {
            return Err(GridError::invalid_argument(format!(
                "point {:?} is outside the tree domain {:?}",
                coord, self.extents
            )));
        }

        let mut base = [0u64; 3];
        for (i, b) in base.iter_mut().enumerate() {
            let n = self.base_dims[i];
            let guess = ((coord[i] - self.extents.min[i]) / (self.extents.size(i) / n as f64)).floor();
            let mut idx = (guess.max(0.0) as u64).min(n - 1);
            // lower cell owns a shared boundary
            while idx > 0 && coord[i] <= self.boundary(i, n, idx) {
                idx -= 1;
            }
            while idx + 1 < n && coord[i] > self.boundary(i, n, idx + 1) {
                idx += 1;
            }
            *b = idx;
        }

        let mut id = self.base_cell_id(base);
        loop {
            let cell = &self.cells[id];
            if !cell.is_refined() || cell.level >= max_level {
                return Ok(id);
            }
            let octant = (0..3).fold(0usize, |acc, i| {
                let n = self.base_dims[i] << (cell.level + 1);
                let mid = self.boundary(i, n, 2 * cell.location[i] + 1);
                if coord[i] > mid {
                    acc | (1 << i)
                } else {
                    acc
                }
            });
            id = cell.first_child + octant;
        }
    }

    /// Position of boundary `index` along `axis` when the domain is split
    /// into `n` equal cells. Uses the same arithmetic as
    /// [`Extents::subdivide`], so descent agrees with [`AmrTree::get_cell_bounds`].
    fn boundary(&self, axis: usize, n: u64, index: u64) -> f64 {
        if index >= n {
            self.extents.max[axis]
        } else {
            self.extents.min[axis] + index as f64 * (self.extents.size(axis) / n as f64)
        }
    }

    /// All cells as `(id, level)` in creation order.
    pub fn cells(&self) -> impl Iterator<Item = (CellId, u32)> + '_ {
        self.cells.iter().enumerate().map(|(id, c)| (id, c.level))
    }

    /// `(parent, first_child)` for every refined cell, grouped by base cell.
    pub(crate) fn refinements_by_branch(&self) -> Vec<Vec<(CellId, CellId)>> {
        let mut branches = vec![Vec::new(); self.num_base_cells()];
        for (id, cell) in self.cells.iter().enumerate() {
            if cell.is_refined() {
                let base = [
                    cell.location[0] >> cell.level,
                    cell.location[1] >> cell.level,
                    cell.location[2] >> cell.level,
                ];
                branches[self.base_cell_id(base)].push((id, cell.first_child));
            }
        }
        branches
    }

    /// Deepest level inside the branch rooted at base cell `base_id`.
    pub(crate) fn branch_level(&self, base_id: CellId) -> u32 {
        let loc = self.cells[base_id].location;
        self.get_refinement_level_in(loc, loc).unwrap_or(0)
    }
}
