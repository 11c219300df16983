//! Fixtures shared by the data manager integration tests.

#![allow(dead_code)]

use data_mgr::{
    CoordSystem, DataMgr, DataMgrConfig, DatasetDescriptor, Extents, GridKind, MemoryReader,
    TimeStep, VarType, VariableDescriptor,
};
use test_utils::{create_layered_elevation, create_test_volume, volume_from_fn};

pub const MISSING: f32 = -999.0;

/// Bytes of one 4x4x4 float block.
pub const BLOCK_BYTES: usize = 4 * 4 * 4 * 4;

/// 16x16x8 cartesian dataset in 4x4x4 blocks, one coarsening level, two
/// lods and two timesteps.
///
/// Variables: `TEMP` (3-D) and `PSFC` (2-D XY with a missing value).
pub fn regular_descriptor() -> DatasetDescriptor {
    let mut desc = DatasetDescriptor::new(
        [16, 16, 8],
        [4, 4, 4],
        Extents::new([0.0, 0.0, 0.0], [15.0, 15.0, 7.0]),
    )
    .with_variable(VariableDescriptor::new("TEMP", VarType::Var3D))
    .with_variable(VariableDescriptor::new("PSFC", VarType::Var2DXY).with_missing_value(MISSING));
    desc.num_transforms = 1;
    desc.num_lods = 2;
    desc.timesteps = vec![
        TimeStep::with_stamp(0.0, "2024-06-01T00:00:00Z"),
        TimeStep::with_stamp(3600.0, "2024-06-01T01:00:00Z"),
    ];
    desc
}

/// TEMP follows `create_test_volume` plus `ts * 0.5`; PSFC is
/// `1000 + x - y` with every seventh voxel missing.
pub fn fill_regular(reader: &mut MemoryReader) {
    reader
        .set_field_fn("TEMP", |ts, x, y, z| {
            (x + 100 * y + 10000 * z) as f32 + ts as f32 * 0.5
        })
        .unwrap();
    reader
        .set_field_fn("PSFC", |_, x, y, _| {
            if (y * 16 + x) % 7 == 0 {
                MISSING
            } else {
                1000.0 + x as f32 - y as f32
            }
        })
        .unwrap();
}

pub fn regular_reader() -> MemoryReader {
    let mut reader = MemoryReader::new(regular_descriptor(), 2).unwrap();
    fill_regular(&mut reader);
    reader
}

pub fn config(budget_bytes: usize) -> DataMgrConfig {
    DataMgrConfig::default().with_cache_size_bytes(budget_bytes)
}

pub fn regular_manager(budget_bytes: usize) -> DataMgr<MemoryReader> {
    DataMgr::new(regular_reader(), config(budget_bytes)).unwrap()
}

/// 8x8x4 terrain-following dataset in 4x4x4 blocks with `TEMP` and
/// `ELEVATION`. Layers are 100 apart over terrain rising 40 across x.
pub fn layered_descriptor() -> DatasetDescriptor {
    let mut desc = DatasetDescriptor::new(
        [8, 8, 4],
        [4, 4, 4],
        Extents::new([0.0, 0.0, 0.0], [7000.0, 7000.0, 340.0]),
    )
    .with_variable(VariableDescriptor::new("TEMP", VarType::Var3D))
    .with_variable(VariableDescriptor::new("ELEVATION", VarType::Var3D))
    .with_variable(VariableDescriptor::new("HGT", VarType::Var2DXY));
    desc.grid_type = GridKind::Layered;
    desc
}

pub fn layered_reader(with_elevation_data: bool) -> MemoryReader {
    let desc = layered_descriptor();
    let dims = desc.dims;
    let mut reader = MemoryReader::new(desc, 1).unwrap();
    reader
        .set_field_all_levels(0, "TEMP", create_test_volume(dims))
        .unwrap();
    reader
        .set_field_all_levels(0, "HGT", volume_from_fn([8, 8, 1], |x, _, _| x as f32))
        .unwrap();
    if with_elevation_data {
        reader
            .set_field_all_levels(0, "ELEVATION", create_layered_elevation(dims, 100.0, 40.0))
            .unwrap();
    }
    reader
}

/// Shell section: lon 0..360 in 45° steps, lat -90..90 in 45° steps,
/// radius 1..2, stored (lon, lat, radius).
pub fn spherical_descriptor() -> DatasetDescriptor {
    let mut desc = DatasetDescriptor::new(
        [9, 5, 2],
        [9, 5, 2],
        Extents::new([0.0, -90.0, 1.0], [360.0, 90.0, 2.0]),
    )
    .with_variable(VariableDescriptor::new("DENSITY", VarType::Var3D));
    desc.coord_system = CoordSystem::Spherical;
    desc.periodic = [true, false, false];
    desc
}

pub fn spherical_reader() -> MemoryReader {
    let desc = spherical_descriptor();
    let dims = desc.dims;
    let mut reader = MemoryReader::new(desc, 1).unwrap();
    reader
        .set_field_all_levels(0, "DENSITY", create_test_volume(dims))
        .unwrap();
    reader
}
