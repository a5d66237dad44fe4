//! Storage engines behind the observation store.
//!
//! Every engine exposes the same group/variable/attribute/dimension surface
//! through the [`Backend`] trait; concrete variants are:
//! - NetCDF file (legacy observation files)
//! - HDF5 file with a selectable compatibility range
//! - HDF5 in-process memory image, optionally flushed to disk on close
//! - Pure in-memory (the ObsSpace's working store)
//!
//! The factory functions return the opened root as a `Box<dyn Backend>`,
//! keyed either by format name or by file extension.

pub mod error;
pub mod hdf5_io;
pub mod memory;
pub mod netcdf_io;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use obs_store::{ObsDtype, ValueCell};

pub use error::{EngineError, EngineResult};
pub use hdf5_io::Hdf5Backend;
pub use memory::MemoryBackend;
pub use netcdf_io::NetcdfBackend;

/// What a backend can do. Callers consult this before relying on
/// optional behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub partial_io: bool,
    pub attribute_rename: bool,
    pub grouping: bool,
    pub concurrent_readers: bool,
}

/// Creation modes for new files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateMode {
    FailIfExists,
    Truncate,
}

/// Open modes for existing files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    ReadOnly,
    ReadWrite,
}

/// HDF5 on-disk format compatibility levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hdf5Compat {
    Earliest,
    V18,
    V110,
    V112,
    Latest,
}

/// A `(low, high)` pair of format compatibility bounds.
pub type Hdf5CompatRange = (Hdf5Compat, Hdf5Compat);

/// Default compatibility range for newly written HDF5 files.
pub fn default_compat_range() -> Hdf5CompatRange {
    (Hdf5Compat::V18, Hdf5Compat::Latest)
}

/// Metadata of one backend variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarInfo {
    pub dtype: ObsDtype,
    pub shape: Vec<usize>,
    /// Dimension names, one per rank; may be empty when the format does
    /// not record them.
    pub dims: Vec<String>,
}

/// Uniform surface over the concrete storage engines.
///
/// Variables are addressed by their flattened `variable@group` names, the
/// convention the on-disk observation layout uses. Ranged I/O runs along
/// the leading axis; whether it is supported is part of [`Capabilities`].
pub trait Backend {
    fn name(&self) -> &'static str;
    fn capabilities(&self) -> Capabilities;

    // --- dimensions ---
    fn dimensions(&self) -> EngineResult<Vec<(String, usize)>>;
    fn define_dimension(&mut self, name: &str, len: usize) -> EngineResult<()>;

    // --- variables ---
    fn var_names(&self) -> EngineResult<Vec<String>>;
    fn var_exists(&self, name: &str) -> bool;
    fn var_info(&self, name: &str) -> EngineResult<VarInfo>;
    fn create_var(&mut self, name: &str, dtype: ObsDtype, dims: &[&str]) -> EngineResult<()>;
    fn read_var(&self, name: &str) -> EngineResult<ValueCell>;
    fn read_var_range(&self, name: &str, start: usize, count: usize) -> EngineResult<ValueCell>;
    fn write_var(&mut self, name: &str, data: &ValueCell) -> EngineResult<()>;
    fn write_var_range(&mut self, name: &str, start: usize, data: &ValueCell) -> EngineResult<()>;

    // --- attributes of the root group ---
    fn attr_names(&self) -> EngineResult<Vec<String>>;
    fn has_attr(&self, name: &str) -> bool;
    fn read_attr(&self, name: &str) -> EngineResult<ValueCell>;
    fn write_attr(&mut self, name: &str, data: &ValueCell) -> EngineResult<()>;

    // --- groups ---
    fn create_group(&mut self, path: &str) -> EngineResult<()>;
    fn list_groups(&self) -> EngineResult<Vec<String>>;
}

/// Which engine to use for a path, plus engine-specific options.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendSpec {
    Netcdf {
        path: PathBuf,
    },
    Hdf5File {
        path: PathBuf,
        compat: Hdf5CompatRange,
    },
    Hdf5Memory {
        path: PathBuf,
        initial_bytes: usize,
        flush_on_close: bool,
        compat: Hdf5CompatRange,
    },
    Memory,
}

impl BackendSpec {
    /// Pick an engine from a file extension: `.h5`/`.hdf5`/`.hdf` map to the
    /// HDF5 file engine, everything else to NetCDF.
    pub fn for_path(path: &Path) -> BackendSpec {
        match path.extension().and_then(|e| e.to_str()) {
            Some("h5") | Some("hdf5") | Some("hdf") => BackendSpec::Hdf5File {
                path: path.to_path_buf(),
                compat: default_compat_range(),
            },
            _ => BackendSpec::Netcdf {
                path: path.to_path_buf(),
            },
        }
    }

    /// Pick an engine by format name.
    pub fn for_format(format: &str, path: &Path) -> EngineResult<BackendSpec> {
        match format {
            "netcdf" => Ok(BackendSpec::Netcdf {
                path: path.to_path_buf(),
            }),
            "hdf5" => Ok(BackendSpec::Hdf5File {
                path: path.to_path_buf(),
                compat: default_compat_range(),
            }),
            "hdf5-memory" => Ok(BackendSpec::Hdf5Memory {
                path: path.to_path_buf(),
                initial_bytes: hdf5_io::DEFAULT_IMAGE_INCREMENT,
                flush_on_close: false,
                compat: default_compat_range(),
            }),
            "memory" => Ok(BackendSpec::Memory),
            other => Err(EngineError::UnknownFormat(other.to_string())),
        }
    }
}

/// Open an existing store through the engine named by `spec`.
pub fn open_backend(spec: &BackendSpec, mode: OpenMode) -> EngineResult<Box<dyn Backend>> {
    match spec {
        BackendSpec::Netcdf { path } => Ok(Box::new(NetcdfBackend::open(path, mode)?)),
        BackendSpec::Hdf5File { path, compat } => {
            Ok(Box::new(Hdf5Backend::open_file(path, mode, *compat)?))
        }
        BackendSpec::Hdf5Memory {
            path,
            initial_bytes,
            flush_on_close,
            compat,
        } => Ok(Box::new(Hdf5Backend::open_memory(
            path,
            mode,
            *initial_bytes,
            *flush_on_close,
            *compat,
        )?)),
        BackendSpec::Memory => Ok(Box::new(MemoryBackend::new())),
    }
}

/// Create a new store through the engine named by `spec`.
pub fn create_backend(spec: &BackendSpec, mode: CreateMode) -> EngineResult<Box<dyn Backend>> {
    match spec {
        BackendSpec::Netcdf { path } => Ok(Box::new(NetcdfBackend::create(path, mode)?)),
        BackendSpec::Hdf5File { path, compat } => {
            Ok(Box::new(Hdf5Backend::create_file(path, mode, *compat)?))
        }
        BackendSpec::Hdf5Memory {
            path,
            initial_bytes,
            flush_on_close,
            compat,
        } => Ok(Box::new(Hdf5Backend::create_memory(
            path,
            mode,
            *initial_bytes,
            *flush_on_close,
            *compat,
        )?)),
        BackendSpec::Memory => Ok(Box::new(MemoryBackend::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_for_path_sniffs_extension() {
        assert!(matches!(
            BackendSpec::for_path(Path::new("obs.h5")),
            BackendSpec::Hdf5File { .. }
        ));
        assert!(matches!(
            BackendSpec::for_path(Path::new("obs.nc")),
            BackendSpec::Netcdf { .. }
        ));
        assert!(matches!(
            BackendSpec::for_path(Path::new("obs.nc4")),
            BackendSpec::Netcdf { .. }
        ));
    }

    #[test]
    fn test_spec_for_format_rejects_unknown() {
        let err = BackendSpec::for_format("zarr", Path::new("x")).unwrap_err();
        assert!(matches!(err, EngineError::UnknownFormat(_)));
    }
}
