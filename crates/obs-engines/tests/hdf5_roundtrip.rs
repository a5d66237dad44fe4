//! Round-trip tests for the HDF5 engines (file and memory image).

use chrono::{TimeZone, Utc};
use obs_engines::{
    default_compat_range, Backend, CreateMode, Hdf5Backend, Hdf5Compat, OpenMode,
};
use obs_store::{ObsDtype, ValueCell};

fn fill_backend(be: &mut Hdf5Backend) {
    be.define_dimension("nlocs", 3).unwrap();
    be.create_var("air_temperature@ObsValue", ObsDtype::Float, &["nlocs"])
        .unwrap();
    be.write_var(
        "air_temperature@ObsValue",
        &ValueCell::Float(vec![250.0, 251.5, 252.0]),
    )
    .unwrap();

    be.create_var("record_number@MetaData", ObsDtype::Int, &["nlocs"])
        .unwrap();
    be.write_var("record_number@MetaData", &ValueCell::Int(vec![7, 8, 9]))
        .unwrap();

    be.create_var("station_id@MetaData", ObsDtype::String, &["nlocs"])
        .unwrap();
    be.write_var(
        "station_id@MetaData",
        &ValueCell::Str(vec!["a".into(), "b".into(), "c".into()]),
    )
    .unwrap();

    be.create_var("datetime@MetaData", ObsDtype::DateTime, &["nlocs"])
        .unwrap();
    let times: Vec<_> = (0..3)
        .map(|h| Utc.with_ymd_and_hms(2018, 4, 15, h, 30, 0).unwrap())
        .collect();
    be.write_var("datetime@MetaData", &ValueCell::DateTime(times))
        .unwrap();

    be.write_attr("date_time", &ValueCell::Int(vec![2018041500]))
        .unwrap();
}

fn check_backend(be: &Hdf5Backend) {
    assert_eq!(
        be.read_var("air_temperature@ObsValue").unwrap(),
        ValueCell::Float(vec![250.0, 251.5, 252.0])
    );
    assert_eq!(
        be.read_var("record_number@MetaData").unwrap(),
        ValueCell::Int(vec![7, 8, 9])
    );
    assert_eq!(
        be.read_var("station_id@MetaData").unwrap(),
        ValueCell::Str(vec!["a".into(), "b".into(), "c".into()])
    );

    let info = be.var_info("datetime@MetaData").unwrap();
    assert_eq!(info.dtype, ObsDtype::DateTime);
    assert_eq!(info.dims, vec!["nlocs".to_string()]);
    match be.read_var("datetime@MetaData").unwrap() {
        ValueCell::DateTime(times) => {
            assert_eq!(times[2], Utc.with_ymd_and_hms(2018, 4, 15, 2, 30, 0).unwrap());
        }
        other => panic!("expected datetime cell, got {:?}", other.dtype()),
    }

    assert_eq!(
        be.read_attr("date_time").unwrap(),
        ValueCell::Int(vec![2018041500])
    );
    assert!(be.dimensions().unwrap().contains(&("nlocs".to_string(), 3)));
    // Internal dimension bookkeeping stays out of the attribute listing.
    assert!(!be.attr_names().unwrap().iter().any(|n| n.starts_with("_dim_")));
}

#[test]
fn test_file_roundtrip_all_types() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("obs.h5");

    {
        let mut be =
            Hdf5Backend::create_file(&path, CreateMode::Truncate, default_compat_range()).unwrap();
        fill_backend(&mut be);
    }

    let be = Hdf5Backend::open_file(&path, OpenMode::ReadOnly, default_compat_range()).unwrap();
    check_backend(&be);
}

#[test]
fn test_compat_range_v18() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("obs_v18.h5");
    let compat = (Hdf5Compat::V18, Hdf5Compat::V18);
    {
        let mut be = Hdf5Backend::create_file(&path, CreateMode::Truncate, compat).unwrap();
        fill_backend(&mut be);
    }
    let be = Hdf5Backend::open_file(&path, OpenMode::ReadOnly, compat).unwrap();
    check_backend(&be);
}

#[test]
fn test_memory_image_discarded_without_flush() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("image.h5");

    {
        let mut be = Hdf5Backend::create_memory(
            &path,
            CreateMode::Truncate,
            1 << 16,
            false,
            default_compat_range(),
        )
        .unwrap();
        fill_backend(&mut be);
        assert!(be.is_in_memory());
    }

    // Never flushed, so nothing reaches the disk.
    assert!(!path.exists());
}

#[test]
fn test_memory_image_flushed_on_close() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("image_flush.h5");

    {
        let mut be = Hdf5Backend::create_memory(
            &path,
            CreateMode::Truncate,
            1 << 16,
            true,
            default_compat_range(),
        )
        .unwrap();
        fill_backend(&mut be);
    }

    assert!(path.exists());
    let be = Hdf5Backend::open_file(&path, OpenMode::ReadOnly, default_compat_range()).unwrap();
    check_backend(&be);
}

#[test]
fn test_ranged_write() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ranged.h5");
    let mut be =
        Hdf5Backend::create_file(&path, CreateMode::Truncate, default_compat_range()).unwrap();
    be.define_dimension("nlocs", 4).unwrap();
    be.create_var("v", ObsDtype::Int, &["nlocs"]).unwrap();
    be.write_var("v", &ValueCell::Int(vec![1, 2, 3, 4])).unwrap();
    be.write_var_range("v", 1, &ValueCell::Int(vec![8, 9])).unwrap();

    assert_eq!(be.read_var("v").unwrap(), ValueCell::Int(vec![1, 8, 9, 4]));
    assert_eq!(be.read_var_range("v", 2, 2).unwrap(), ValueCell::Int(vec![9, 4]));
}
