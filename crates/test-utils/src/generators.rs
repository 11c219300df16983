//! Test data generators for synthetic volumes.
//!
//! Every volume is returned x fastest, then y, then z, which is the layout
//! the readers expect for a level's voxel array.

/// Creates a test volume with predictable values.
///
/// Each voxel value is `x + 100 * y + 10000 * z`, which makes it easy to
/// check that a voxel came from the right place.
///
/// # Example
///
/// ```
/// use test_utils::create_test_volume;
///
/// let vol = create_test_volume([10, 5, 2]);
/// assert_eq!(vol.len(), 100);
/// assert_eq!(vol[1], 1.0);       // x=1
/// assert_eq!(vol[10], 100.0);    // y=1
/// assert_eq!(vol[50], 10000.0);  // z=1
/// ```
pub fn create_test_volume(dims: [usize; 3]) -> Vec<f32> {
    volume_from_fn(dims, |x, y, z| (x + 100 * y + 10000 * z) as f32)
}

/// Build a volume from a function of voxel coordinates.
pub fn volume_from_fn<F>(dims: [usize; 3], f: F) -> Vec<f32>
where
    F: Fn(usize, usize, usize) -> f32,
{
    let mut data = Vec::with_capacity(dims[0] * dims[1] * dims[2]);
    for z in 0..dims[2] {
        for y in 0..dims[1] {
            for x in 0..dims[0] {
                data.push(f(x, y, z));
            }
        }
    }
    data
}

/// Creates a terrain-following elevation field.
///
/// Layer `z` sits `layer_depth * z` above a terrain that rises linearly
/// from 0 at x = 0 to `relief` at the last x, so elevation always increases
/// with z inside a column.
pub fn create_layered_elevation(dims: [usize; 3], layer_depth: f32, relief: f32) -> Vec<f32> {
    let span = (dims[0].max(2) - 1) as f32;
    volume_from_fn(dims, |x, _, z| relief * x as f32 / span + layer_depth * z as f32)
}
