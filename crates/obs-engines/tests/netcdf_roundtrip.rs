//! Round-trip tests for the NetCDF engine.

use obs_engines::{Backend, CreateMode, NetcdfBackend, OpenMode};
use obs_store::{ObsDtype, ValueCell};

#[test]
fn test_write_then_read_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("obs.nc");

    {
        let mut be = NetcdfBackend::create(&path, CreateMode::Truncate).unwrap();
        be.define_dimension("nlocs", 4).unwrap();
        be.create_var("sensor_zenith_angle@MetaData", ObsDtype::Float, &["nlocs"])
            .unwrap();
        be.write_var(
            "sensor_zenith_angle@MetaData",
            &ValueCell::Float(vec![10.0, 20.0, 30.0, 40.0]),
        )
        .unwrap();
        be.create_var("scan_position@MetaData", ObsDtype::Int, &["nlocs"])
            .unwrap();
        be.write_var("scan_position@MetaData", &ValueCell::Int(vec![1, 2, 3, 4]))
            .unwrap();
        be.write_attr("date_time", &ValueCell::Int(vec![2018041500]))
            .unwrap();
    }

    let be = NetcdfBackend::open(&path, OpenMode::ReadOnly).unwrap();
    assert!(be.dimensions().unwrap().contains(&("nlocs".to_string(), 4)));

    let info = be.var_info("sensor_zenith_angle@MetaData").unwrap();
    assert_eq!(info.dtype, ObsDtype::Float);
    assert_eq!(info.shape, vec![4]);
    assert_eq!(info.dims, vec!["nlocs".to_string()]);

    assert_eq!(
        be.read_var("sensor_zenith_angle@MetaData").unwrap(),
        ValueCell::Float(vec![10.0, 20.0, 30.0, 40.0])
    );
    assert_eq!(
        be.read_var_range("scan_position@MetaData", 1, 2).unwrap(),
        ValueCell::Int(vec![2, 3])
    );
    assert_eq!(
        be.read_attr("date_time").unwrap(),
        ValueCell::Int(vec![2018041500])
    );
    assert!(be.has_attr("date_time"));
    assert!(!be.has_attr("missing_attr"));
}

#[test]
fn test_fail_if_exists() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("obs.nc");
    {
        NetcdfBackend::create(&path, CreateMode::Truncate).unwrap();
    }
    assert!(NetcdfBackend::create(&path, CreateMode::FailIfExists).is_err());
    assert!(NetcdfBackend::create(&path, CreateMode::Truncate).is_ok());
}

#[test]
fn test_string_variables_unsupported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("obs.nc");
    let mut be = NetcdfBackend::create(&path, CreateMode::Truncate).unwrap();
    be.define_dimension("nlocs", 2).unwrap();
    assert!(be
        .create_var("station_id@MetaData", ObsDtype::String, &["nlocs"])
        .is_err());
}

#[test]
fn test_read_only_mode_rejects_writes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("obs.nc");
    {
        let mut be = NetcdfBackend::create(&path, CreateMode::Truncate).unwrap();
        be.define_dimension("nlocs", 1).unwrap();
    }
    let mut be = NetcdfBackend::open(&path, OpenMode::ReadOnly).unwrap();
    assert!(be.define_dimension("extra", 1).is_err());
}
