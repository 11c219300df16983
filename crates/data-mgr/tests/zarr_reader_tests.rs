//! Round trips through the Zarr dataset writer and reader.

mod common;

use common::*;
use data_mgr::{DataMgr, GridError, Reader, ZarrDatasetWriter, ZarrReader};
use tempfile::TempDir;
use test_utils::{init_tracing, volume_from_fn};

/// Write the regular test dataset to a temp directory.
fn write_regular_dataset() -> TempDir {
    let dir = TempDir::new().unwrap();
    let writer = ZarrDatasetWriter::create(dir.path(), regular_descriptor()).unwrap();
    for ts in 0..2 {
        let temp = volume_from_fn([16, 16, 8], |x, y, z| {
            (x + 100 * y + 10000 * z) as f32 + ts as f32 * 0.5
        });
        writer.write_field_all_levels(ts, "TEMP", &temp).unwrap();
    }
    let psfc = volume_from_fn([16, 16, 1], |x, y, _| {
        if (y * 16 + x) % 7 == 0 {
            MISSING
        } else {
            1000.0 + x as f32 - y as f32
        }
    });
    writer.write_field_all_levels(0, "PSFC", &psfc).unwrap();
    dir
}

#[test]
fn test_catalog_round_trip() {
    init_tracing();
    let dir = write_regular_dataset();
    let reader = ZarrReader::open(dir.path(), 1).unwrap();

    assert_eq!(reader.backend_name(), "zarr");
    assert_eq!(reader.num_timesteps(), 2);
    assert_eq!(reader.num_transforms(), 1);
    assert_eq!(reader.num_lods(), 2);
    assert_eq!(reader.grid_dim(0).unwrap(), [8, 8, 4]);
    assert_eq!(reader.grid_dim(1).unwrap(), [16, 16, 8]);
    assert_eq!(reader.variables_3d(), vec!["TEMP"]);
    assert_eq!(reader.variables_2d_xy(), vec!["PSFC"]);
    assert_eq!(reader.missing_value("PSFC"), Some(MISSING));
    assert_eq!(reader.ts_user_time(1).unwrap(), 3600.0);

    assert!(reader.variable_exists(1, "TEMP", 0, 1));
    assert!(reader.variable_exists(0, "PSFC", 1, 0));
    // PSFC was only written for the first timestep
    assert!(!reader.variable_exists(1, "PSFC", 1, 0));
    assert!(!reader.variable_exists(0, "NOPE", 0, 0));
}

#[test]
fn test_blocks_match_memory_reader() {
    let dir = write_regular_dataset();
    let mut zarr = ZarrReader::open(dir.path(), 2).unwrap();
    let mut memory = regular_reader();

    for (reflevel, bmin, bmax) in [(1, [1, 0, 0], [2, 3, 1]), (0, [0, 0, 0], [1, 1, 0])] {
        let nblocks = (bmax[0] - bmin[0] + 1) * (bmax[1] - bmin[1] + 1) * (bmax[2] - bmin[2] + 1);
        let mut from_zarr = vec![Vec::new(); nblocks];
        let mut from_memory = vec![Vec::new(); nblocks];

        zarr.open_variable_read(1, "TEMP", reflevel, 0).unwrap();
        zarr.block_read_region(bmin, bmax, &mut from_zarr).unwrap();
        zarr.close_variable().unwrap();

        memory.open_variable_read(1, "TEMP", reflevel, 0).unwrap();
        memory.block_read_region(bmin, bmax, &mut from_memory).unwrap();
        memory.close_variable().unwrap();

        assert_eq!(from_zarr, from_memory);
        assert_eq!(from_zarr[0].len(), 64);
    }
}

#[test]
fn test_data_range_attribute() {
    let dir = write_regular_dataset();
    let mut reader = ZarrReader::open(dir.path(), 1).unwrap();

    reader.open_variable_read(0, "TEMP", 1, 0).unwrap();
    assert_eq!(reader.data_range().unwrap(), [0.0, 71515.0]);
    reader.close_variable().unwrap();

    reader.open_variable_read(0, "PSFC", 1, 0).unwrap();
    assert_eq!(reader.data_range().unwrap(), [985.0, 1015.0]);
    reader.close_variable().unwrap();
}

#[test]
fn test_manager_over_zarr() {
    let dir = write_regular_dataset();
    let reader = ZarrReader::open(dir.path(), 0).unwrap();
    let mut mgr = DataMgr::new(reader, config(1 << 20)).unwrap();

    let grid = mgr.get_grid(1, "TEMP", 1, 0, [1, 1, 0], [2, 1, 1]).unwrap();
    assert_eq!(grid.dimensions(), [8, 4, 8]);
    assert_eq!(grid.access_ijk(0, 0, 0), 404.5);
    assert_eq!(grid.access_ijk(7, 3, 7), 70711.5);

    let psfc = mgr.get_grid(0, "PSFC", 1, 0, [0, 0, 0], [3, 3, 0]).unwrap();
    assert_eq!(psfc.missing_value(), MISSING);
    assert_eq!(psfc.access_ijk(0, 0, 0), MISSING);
    assert_eq!(psfc.access_ijk(1, 0, 0), 1001.0);

    assert_eq!(mgr.get_data_range(1, "TEMP").unwrap(), [0.5, 71515.5]);
    assert_eq!(mgr.get_valid_region(0, "TEMP", 0).unwrap(), ([0; 3], [7, 7, 3]));

    let q = mgr
        .get_region_u8(0, "TEMP", 1, 0, [0; 3], [0; 3], [0.0, 30303.0])
        .unwrap();
    assert_eq!(q[63], 255);
}

#[test]
fn test_missing_descriptor() {
    let dir = TempDir::new().unwrap();
    assert!(matches!(
        ZarrReader::open(dir.path(), 1),
        Err(GridError::Io(_))
    ));
}

#[test]
fn test_missing_field() {
    let dir = write_regular_dataset();
    let mut reader = ZarrReader::open(dir.path(), 1).unwrap();

    assert!(matches!(
        reader.open_variable_read(1, "PSFC", 1, 0),
        Err(GridError::Io(_))
    ));
    assert!(matches!(
        reader.open_variable_read(0, "NOPE", 1, 0),
        Err(GridError::NotFound(_))
    ));

    let mut mgr = DataMgr::new(reader, config(1 << 20)).unwrap();
    assert!(matches!(
        mgr.get_grid(1, "PSFC", 1, 0, [0; 3], [0; 3]),
        Err(GridError::Io(_))
    ));
    assert_eq!(mgr.memory_in_use(), 0);
}

#[test]
fn test_writer_rejects_wrong_length() {
    let dir = TempDir::new().unwrap();
    let writer = ZarrDatasetWriter::create(dir.path().join("ds"), regular_descriptor()).unwrap();
    assert!(writer.root().join("dataset.json").is_file());
    assert!(matches!(
        writer.write_field(0, "TEMP", 1, 0, &[0.0; 10]),
        Err(GridError::InvalidArgument(_))
    ));
}
