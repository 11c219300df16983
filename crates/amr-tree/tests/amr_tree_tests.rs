//! Refinement, navigation and search tests for AmrTree.

use amr_tree::{AmrTree, Extents, GridError};
use test_utils::assert_approx_eq;

fn unit_tree() -> AmrTree {
    AmrTree::new([1, 1, 1], Extents::new([0.0; 3], [1.0; 3])).unwrap()
}

// ============================================================================
// Refinement
// ============================================================================

#[test]
fn test_refine_root_yields_nine_cells() {
    let mut tree = unit_tree();
    assert_eq!(tree.get_num_cells(), 1);

    let first = tree.refine_cell(0).unwrap();
    assert_eq!(first, 1);
    assert_eq!(tree.get_num_cells(), 9);
    assert_eq!(tree.get_cell_children(0).unwrap(), Some(1));
}

#[test]
fn test_leaf_has_no_children() {
    let mut tree = unit_tree();
    assert_eq!(tree.get_cell_children(0).unwrap(), None);
    tree.refine_cell(0).unwrap();
    for child in 1..9 {
        assert_eq!(tree.get_cell_children(child).unwrap(), None);
        assert_eq!(tree.get_cell_parent(child).unwrap(), Some(0));
        assert_eq!(tree.get_cell_level(child).unwrap(), 1);
    }
    assert_eq!(tree.get_cell_parent(0).unwrap(), None);
}

#[test]
fn test_refine_twice_fails_and_leaves_tree_unchanged() {
    let mut tree = unit_tree();
    tree.refine_cell(0).unwrap();
    let before = tree.get_num_cells();

    let err = tree.refine_cell(0).unwrap_err();
    assert!(matches!(err, GridError::InvalidArgument(_)));
    assert_eq!(tree.get_num_cells(), before);
    assert_eq!(tree.get_cell_children(0).unwrap(), Some(1));
}

#[test]
fn test_refine_out_of_range() {
    let mut tree = unit_tree();
    let err = tree.refine_cell(1).unwrap_err();
    assert!(matches!(err, GridError::NotFound(_)));
    assert_eq!(tree.get_num_cells(), 1);
}

#[test]
fn test_children_are_contiguous_and_appended() {
    let mut tree = AmrTree::new([2, 2, 1], Extents::new([0.0; 3], [2.0, 2.0, 1.0])).unwrap();
    let mut expected_first = 4;
    for id in [3, 0, 4, 12] {
        let first = tree.refine_cell(id).unwrap();
        assert_eq!(first, expected_first);
        expected_first += 8;
        assert_eq!(tree.get_num_cells(), expected_first);
    }
    assert_eq!(tree.get_refinement_level(), 2);
    assert_eq!(tree.get_num_cells_at(0), 4);
    assert_eq!(tree.get_num_cells_at(1), 16);
    assert_eq!(tree.get_num_cells_at(2), 16);
}

#[test]
fn test_refinement_level_in_base_range() {
    let mut tree = AmrTree::new([2, 1, 1], Extents::new([0.0; 3], [2.0, 1.0, 1.0])).unwrap();
    let first = tree.refine_cell(1).unwrap();
    tree.refine_cell(first).unwrap();
    assert_eq!(tree.get_refinement_level_in([0, 0, 0], [0, 0, 0]).unwrap(), 0);
    assert_eq!(tree.get_refinement_level_in([1, 0, 0], [1, 0, 0]).unwrap(), 2);
    assert_eq!(tree.get_refinement_level_in([0, 0, 0], [1, 0, 0]).unwrap(), 2);
    assert!(tree.get_refinement_level_in([0, 0, 0], [2, 0, 0]).is_err());
}

// ============================================================================
// Geometry
// ============================================================================

#[test]
fn test_cell_bounds() {
    let mut tree = AmrTree::new([1, 1, 1], Extents::new([-1.0, 0.0, 10.0], [1.0, 4.0, 20.0])).unwrap();
    let first = tree.refine_cell(0).unwrap();
    let b = tree.get_cell_bounds(first + 7).unwrap();
    assert_eq!(b.min, [0.0, 2.0, 15.0]);
    assert_eq!(b.max, [1.0, 4.0, 20.0]);

    let g = tree.refine_cell(first + 7).unwrap();
    let b = tree.get_cell_bounds(g).unwrap();
    assert_approx_eq!(b.min[0], 0.0, 1e-12);
    assert_approx_eq!(b.max[0], 0.5, 1e-12);
    assert_approx_eq!(b.min[2], 15.0, 1e-12);
    assert_approx_eq!(b.max[2], 17.5, 1e-12);
}

#[test]
fn test_cells_iterator() {
    let mut tree = unit_tree();
    let first = tree.refine_cell(0).unwrap();
    tree.refine_cell(first + 3).unwrap();
    let levels: Vec<u32> = tree.cells().map(|(_, level)| level).collect();
    assert_eq!(levels.len(), 17);
    assert_eq!(levels[0], 0);
    assert!(levels[1..9].iter().all(|&l| l == 1));
    assert!(levels[9..].iter().all(|&l| l == 2));
}

// ============================================================================
// FindCell
// ============================================================================

#[test]
fn test_find_cell_unrefined_root() {
    let tree = unit_tree();
    assert_eq!(tree.find_cell([0.5, 0.5, 0.5]).unwrap(), 0);
    assert_eq!(tree.find_cell([0.0, 0.0, 0.0]).unwrap(), 0);
    assert_eq!(tree.find_cell([1.0, 1.0, 1.0]).unwrap(), 0);
}

#[test]
fn test_find_cell_octants() {
    let mut tree = unit_tree();
    let first = tree.refine_cell(0).unwrap();
    assert_eq!(tree.find_cell([0.25, 0.25, 0.25]).unwrap(), first);
    assert_eq!(tree.find_cell([0.75, 0.25, 0.25]).unwrap(), first + 1);
    assert_eq!(tree.find_cell([0.25, 0.75, 0.25]).unwrap(), first + 2);
    assert_eq!(tree.find_cell([0.25, 0.25, 0.75]).unwrap(), first + 4);
    assert_eq!(tree.find_cell([0.75, 0.75, 0.75]).unwrap(), first + 7);
}

#[test]
fn test_find_cell_boundary_goes_to_lower_octant() {
    let mut tree = unit_tree();
    let first = tree.refine_cell(0).unwrap();
    // exactly on the midpoint plane of every axis
    assert_eq!(tree.find_cell([0.5, 0.5, 0.5]).unwrap(), first);
    assert_eq!(tree.find_cell([0.5, 0.75, 0.5]).unwrap(), first + 2);
    // repeated queries are deterministic
    for _ in 0..3 {
        assert_eq!(tree.find_cell([0.5, 0.5, 0.75]).unwrap(), first + 4);
    }
}

#[test]
fn test_find_cell_base_boundary_goes_to_lower_cell() {
    let tree = AmrTree::new([2, 1, 1], Extents::new([0.0; 3], [2.0, 1.0, 1.0])).unwrap();
    assert_eq!(tree.find_cell([1.0, 0.5, 0.5]).unwrap(), 0);
    assert_eq!(tree.find_cell([1.000001, 0.5, 0.5]).unwrap(), 1);
    assert_eq!(tree.find_cell([2.0, 1.0, 1.0]).unwrap(), 1);
}

#[test]
fn test_find_cell_outside_domain() {
    let mut tree = unit_tree();
    tree.refine_cell(0).unwrap();
    for p in [[-0.1, 0.5, 0.5], [0.5, 1.1, 0.5], [0.5, 0.5, 2.0]] {
        let err = tree.find_cell(p).unwrap_err();
        assert!(matches!(err, GridError::InvalidArgument(_)));
    }
}

#[test]
fn test_find_cell_returns_containing_leaf() {
    let mut tree = AmrTree::new([3, 2, 1], Extents::new([0.0; 3], [3.0, 2.0, 1.0])).unwrap();
    let a = tree.refine_cell(4).unwrap();
    let b = tree.refine_cell(a + 6).unwrap();
    tree.refine_cell(b + 1).unwrap();
    tree.refine_cell(0).unwrap();

    let steps = 23;
    for i in 0..=steps {
        for j in 0..=steps {
            for k in 0..=steps {
                let p = [
                    3.0 * i as f64 / steps as f64,
                    2.0 * j as f64 / steps as f64,
                    k as f64 / steps as f64,
                ];
                let id = tree.find_cell(p).unwrap();
                assert_eq!(tree.get_cell_children(id).unwrap(), None, "{:?}", p);
                assert!(tree.get_cell_bounds(id).unwrap().contains_point(p), "{:?}", p);
            }
        }
    }
}

/// Refine every cell down to `depth`, then look up the corners and center of
/// every cell and check the returned leaf's bounds contain the point.
fn assert_leaves_contain_cell_points(base_dims: [u64; 3], extents: Extents, depth: u32) {
    let mut tree = AmrTree::new(base_dims, extents).unwrap();
    let mut id = 0;
    while id < tree.get_num_cells() {
        if tree.get_cell_level(id).unwrap() < depth {
            tree.refine_cell(id).unwrap();
        }
        id += 1;
    }
    assert_eq!(tree.get_refinement_level(), depth);

    for (id, _) in tree.cells() {
        let b = tree.get_cell_bounds(id).unwrap();
        let center = [
            (b.min[0] + b.max[0]) / 2.0,
            (b.min[1] + b.max[1]) / 2.0,
            (b.min[2] + b.max[2]) / 2.0,
        ];
        for p in [b.min, b.max, center] {
            let leaf = tree.find_cell(p).unwrap();
            assert_eq!(tree.get_cell_children(leaf).unwrap(), None);
            let leaf_bounds = tree.get_cell_bounds(leaf).unwrap();
            assert!(
                leaf_bounds.contains_point(p),
                "{:?} resolved to leaf {} with bounds {:?}",
                p,
                leaf,
                leaf_bounds
            );
        }
    }
}

#[test]
fn test_find_cell_containment_on_uneven_domain() {
    assert_leaves_contain_cell_points(
        [3, 3, 3],
        Extents::new([0.1, 0.1, 0.1], [0.7, 0.7, 0.7]),
        3,
    );
}

#[test]
fn test_find_cell_containment_mixed_base_dims() {
    assert_leaves_contain_cell_points(
        [3, 5, 1],
        Extents::new([-1.3, 0.2, 7.0], [2.9, 0.9, 7.3]),
        3,
    );
}

#[test]
fn test_find_cell_at_level_limit() {
    let mut tree = unit_tree();
    let first = tree.refine_cell(0).unwrap();
    let second = tree.refine_cell(first + 7).unwrap();
    let p = [0.9, 0.9, 0.9];
    assert_eq!(tree.find_cell_at_level(p, 0).unwrap(), 0);
    assert_eq!(tree.find_cell_at_level(p, 1).unwrap(), first + 7);
    assert_eq!(tree.find_cell(p).unwrap(), second + 7);
}
