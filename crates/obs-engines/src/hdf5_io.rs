//! HDF5 engines: file-backed and in-process memory image.
//!
//! Both variants share one backend type; the memory image maps the file
//! into the core driver with a configurable initial allocation and growth
//! increment, optionally flushing the image to disk on close.
//!
//! The high-level HDF5 API does not expose netCDF-style dimension scales,
//! so axis extents are recorded as `_dim_*` attributes on the root group
//! and each dataset carries its dimension names in a `dimension_names`
//! attribute. Datetimes and strings are stored as variable-length UTF-8;
//! datetime datasets are tagged with an `obs_dtype` attribute.

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use hdf5::plist::file_access::LibraryVersion;
use hdf5::types::{FloatSize, TypeDescriptor, VarLenUnicode};
use hdf5::H5Type;
use tracing::trace;

use obs_store::{ObsDtype, ValueCell};

use crate::error::{EngineError, EngineResult};
use crate::{Backend, Capabilities, CreateMode, Hdf5Compat, Hdf5CompatRange, OpenMode, VarInfo};

/// Default growth increment for the memory image, in bytes.
pub const DEFAULT_IMAGE_INCREMENT: usize = 1_000_000;

const DIM_ATTR_PREFIX: &str = "_dim_";
const DIMS_OF_VAR_ATTR: &str = "dimension_names";
const DTYPE_TAG_ATTR: &str = "obs_dtype";
const DATETIME_TAG: &str = "datetime";

/// Backend over an HDF5 file or memory image.
pub struct Hdf5Backend {
    file: hdf5::File,
    path: PathBuf,
    writable: bool,
    in_memory: bool,
    compat: Hdf5CompatRange,
}

fn to_libver(compat: Hdf5Compat) -> LibraryVersion {
    match compat {
        Hdf5Compat::Earliest => LibraryVersion::Earliest,
        Hdf5Compat::V18 => LibraryVersion::V18,
        Hdf5Compat::V110 => LibraryVersion::V110,
        Hdf5Compat::V112 => LibraryVersion::V112,
        Hdf5Compat::Latest => LibraryVersion::V112,
    }
}

fn builder(compat: Hdf5CompatRange, core: Option<(usize, bool)>) -> hdf5::FileBuilder {
    let (lo, hi) = (to_libver(compat.0), to_libver(compat.1));
    let mut b = hdf5::FileBuilder::new();
    b.with_fapl(move |p| {
        let p = p.libver_bounds(lo, hi);
        match core {
            Some((increment, filebacked)) => p.core_options(increment, filebacked),
            None => p,
        }
    });
    b
}

fn to_vlu(strings: &[String]) -> EngineResult<Vec<VarLenUnicode>> {
    strings
        .iter()
        .map(|s| {
            s.parse::<VarLenUnicode>().map_err(|e| EngineError::Backend {
                backend: "hdf5",
                message: format!("string not storable: {}", e),
            })
        })
        .collect()
}

fn parse_datetimes(raw: Vec<VarLenUnicode>, name: &str) -> EngineResult<Vec<DateTime<Utc>>> {
    raw.iter()
        .map(|s| {
            DateTime::parse_from_rfc3339(s.as_str())
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| EngineError::Backend {
                    backend: "hdf5",
                    message: format!("bad datetime in '{}': {}", name, e),
                })
        })
        .collect()
}

impl Hdf5Backend {
    /// Open an existing HDF5 file.
    pub fn open_file(path: &Path, mode: OpenMode, compat: Hdf5CompatRange) -> EngineResult<Self> {
        trace!(path = %path.display(), ?mode, "opening hdf5 file");
        let b = builder(compat, None);
        let file = match mode {
            OpenMode::ReadOnly => b.open(path)?,
            OpenMode::ReadWrite => b.open_rw(path)?,
        };
        Ok(Hdf5Backend {
            file,
            path: path.to_path_buf(),
            writable: mode == OpenMode::ReadWrite,
            in_memory: false,
            compat,
        })
    }

    /// Create a new HDF5 file.
    pub fn create_file(path: &Path, mode: CreateMode, compat: Hdf5CompatRange) -> EngineResult<Self> {
        trace!(path = %path.display(), ?mode, "creating hdf5 file");
        let b = builder(compat, None);
        let file = match mode {
            CreateMode::Truncate => b.create(path)?,
            CreateMode::FailIfExists => b.create_excl(path)?,
        };
        Ok(Hdf5Backend {
            file,
            path: path.to_path_buf(),
            writable: true,
            in_memory: false,
            compat,
        })
    }

    /// Map an existing file into an in-process memory image.
    ///
    /// With `flush_on_close` false, changes die with the image; the on-disk
    /// file is never touched.
    pub fn open_memory(
        path: &Path,
        mode: OpenMode,
        increment_bytes: usize,
        flush_on_close: bool,
        compat: Hdf5CompatRange,
    ) -> EngineResult<Self> {
        trace!(path = %path.display(), ?mode, flush_on_close, "opening hdf5 memory image");
        let b = builder(compat, Some((increment_bytes, flush_on_close)));
        let file = match mode {
            OpenMode::ReadOnly => b.open(path)?,
            OpenMode::ReadWrite => b.open_rw(path)?,
        };
        Ok(Hdf5Backend {
            file,
            path: path.to_path_buf(),
            writable: mode == OpenMode::ReadWrite,
            in_memory: true,
            compat,
        })
    }

    /// Create a fresh in-process memory image.
    ///
    /// `path` names the file the image is flushed to when `flush_on_close`
    /// is set; otherwise it only identifies the image.
    pub fn create_memory(
        path: &Path,
        mode: CreateMode,
        increment_bytes: usize,
        flush_on_close: bool,
        compat: Hdf5CompatRange,
    ) -> EngineResult<Self> {
        trace!(path = %path.display(), flush_on_close, "creating hdf5 memory image");
        let b = builder(compat, Some((increment_bytes, flush_on_close)));
        let file = match mode {
            CreateMode::Truncate => b.create(path)?,
            CreateMode::FailIfExists => b.create_excl(path)?,
        };
        Ok(Hdf5Backend {
            file,
            path: path.to_path_buf(),
            writable: true,
            in_memory: true,
            compat,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_in_memory(&self) -> bool {
        self.in_memory
    }

    /// The `(low, high)` format compatibility bounds this backend was
    /// opened with.
    pub fn compatibility_range(&self) -> Hdf5CompatRange {
        self.compat
    }

    fn check_writable(&self) -> EngineResult<()> {
        if self.writable {
            Ok(())
        } else {
            Err(EngineError::ReadOnlyBackend)
        }
    }

    fn dataset(&self, name: &str) -> EngineResult<hdf5::Dataset> {
        self.file
            .dataset(name)
            .map_err(|_| EngineError::VarNotFound(name.to_string()))
    }

    fn dim_len(&self, name: &str) -> EngineResult<usize> {
        let attr_name = format!("{}{}", DIM_ATTR_PREFIX, name);
        let attr = self.file.attr(&attr_name).map_err(|_| EngineError::Backend {
            backend: "hdf5",
            message: format!("dimension '{}' is not defined", name),
        })?;
        Ok(attr.read_scalar::<i64>()? as usize)
    }

    fn write_string_attr(&self, obj: &hdf5::Dataset, name: &str, value: &str) -> EngineResult<()> {
        let vlu: VarLenUnicode = value.parse().map_err(|e| EngineError::Backend {
            backend: "hdf5",
            message: format!("string not storable: {}", e),
        })?;
        obj.new_attr::<VarLenUnicode>().create(name)?.write_scalar(&vlu)?;
        Ok(())
    }

    fn write_root_attr_vals<T: H5Type + Clone>(&self, name: &str, vals: &[T]) -> EngineResult<()> {
        let attr = if self.file.attr(name).is_ok() {
            self.file.attr(name)?
        } else if vals.len() == 1 {
            self.file.new_attr::<T>().create(name)?
        } else {
            self.file.new_attr::<T>().shape(vals.len()).create(name)?
        };
        if vals.len() == 1 {
            attr.write_scalar(&vals[0])?;
        } else {
            attr.write_raw(vals)?;
        }
        Ok(())
    }
}

impl Backend for Hdf5Backend {
    fn name(&self) -> &'static str {
        if self.in_memory {
            "hdf5-memory"
        } else {
            "hdf5"
        }
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            partial_io: true,
            attribute_rename: false,
            grouping: true,
            concurrent_readers: false,
        }
    }

    fn dimensions(&self) -> EngineResult<Vec<(String, usize)>> {
        let mut dims = Vec::new();
        for name in self.file.attr_names()? {
            if let Some(dim) = name.strip_prefix(DIM_ATTR_PREFIX) {
                let len = self.file.attr(&name)?.read_scalar::<i64>()? as usize;
                dims.push((dim.to_string(), len));
            }
        }
        Ok(dims)
    }

    fn define_dimension(&mut self, name: &str, len: usize) -> EngineResult<()> {
        self.check_writable()?;
        self.write_root_attr_vals(&format!("{}{}", DIM_ATTR_PREFIX, name), &[len as i64])
    }

    fn var_names(&self) -> EngineResult<Vec<String>> {
        let mut names = Vec::new();
        for name in self.file.member_names()? {
            if self.file.dataset(&name).is_ok() {
                names.push(name);
            }
        }
        Ok(names)
    }

    fn var_exists(&self, name: &str) -> bool {
        self.file.dataset(name).is_ok()
    }

    fn var_info(&self, name: &str) -> EngineResult<VarInfo> {
        let ds = self.dataset(name)?;
        let desc = ds.dtype()?.to_descriptor()?;
        let dtype = match desc {
            TypeDescriptor::Integer(_) | TypeDescriptor::Unsigned(_) => ObsDtype::Int,
            TypeDescriptor::Float(_) => ObsDtype::Float,
            TypeDescriptor::VarLenUnicode | TypeDescriptor::VarLenAscii => {
                let tagged = ds
                    .attr(DTYPE_TAG_ATTR)
                    .ok()
                    .and_then(|a| a.read_scalar::<VarLenUnicode>().ok())
                    .map(|v| v.as_str() == DATETIME_TAG)
                    .unwrap_or(false);
                if tagged {
                    ObsDtype::DateTime
                } else {
                    ObsDtype::String
                }
            }
            _ => {
                return Err(EngineError::UnsupportedSourceType {
                    backend: "hdf5",
                    name: name.to_string(),
                })
            }
        };
        let dims = match ds.attr(DIMS_OF_VAR_ATTR) {
            Ok(attr) => attr
                .read_scalar::<VarLenUnicode>()?
                .as_str()
                .split_whitespace()
                .map(|s| s.to_string())
                .collect(),
            Err(_) => Vec::new(),
        };
        Ok(VarInfo {
            dtype,
            shape: ds.shape(),
            dims,
        })
    }

    fn create_var(&mut self, name: &str, dtype: ObsDtype, dims: &[&str]) -> EngineResult<()> {
        self.check_writable()?;
        let mut shape = Vec::with_capacity(dims.len());
        for dim in dims {
            shape.push(self.dim_len(dim)?);
        }
        match dtype {
            ObsDtype::Int => {
                self.file.new_dataset::<i32>().shape(shape).create(name)?;
            }
            ObsDtype::Float => {
                self.file.new_dataset::<f32>().shape(shape).create(name)?;
            }
            ObsDtype::String | ObsDtype::DateTime => {
                self.file
                    .new_dataset::<VarLenUnicode>()
                    .shape(shape)
                    .create(name)?;
            }
        }
        let ds = self.dataset(name)?;
        self.write_string_attr(&ds, DIMS_OF_VAR_ATTR, &dims.join(" "))?;
        if dtype == ObsDtype::DateTime {
            self.write_string_attr(&ds, DTYPE_TAG_ATTR, DATETIME_TAG)?;
        }
        Ok(())
    }

    fn read_var(&self, name: &str) -> EngineResult<ValueCell> {
        let ds = self.dataset(name)?;
        let desc = ds.dtype()?.to_descriptor()?;
        match desc {
            TypeDescriptor::Integer(_) | TypeDescriptor::Unsigned(_) => {
                Ok(ValueCell::Int(ds.read_raw::<i32>()?))
            }
            TypeDescriptor::Float(FloatSize::U4) => Ok(ValueCell::Float(ds.read_raw::<f32>()?)),
            TypeDescriptor::Float(_) => {
                let values = ds.read_raw::<f64>()?;
                Ok(ValueCell::Float(values.into_iter().map(|v| v as f32).collect()))
            }
            TypeDescriptor::VarLenUnicode | TypeDescriptor::VarLenAscii => {
                let raw = ds.read_raw::<VarLenUnicode>()?;
                let tagged = ds
                    .attr(DTYPE_TAG_ATTR)
                    .ok()
                    .and_then(|a| a.read_scalar::<VarLenUnicode>().ok())
                    .map(|v| v.as_str() == DATETIME_TAG)
                    .unwrap_or(false);
                if tagged {
                    Ok(ValueCell::DateTime(parse_datetimes(raw, name)?))
                } else {
                    Ok(ValueCell::Str(
                        raw.into_iter().map(|s| s.as_str().to_string()).collect(),
                    ))
                }
            }
            _ => Err(EngineError::UnsupportedSourceType {
                backend: "hdf5",
                name: name.to_string(),
            }),
        }
    }

    fn read_var_range(&self, name: &str, start: usize, count: usize) -> EngineResult<ValueCell> {
        let ds = self.dataset(name)?;
        let shape = ds.shape();
        let row_len: usize = shape[1..].iter().product::<usize>().max(1);
        let cell = self.read_var(name)?;
        Ok(cell.extract(start * row_len, count * row_len))
    }

    fn write_var(&mut self, name: &str, data: &ValueCell) -> EngineResult<()> {
        self.check_writable()?;
        let ds = self.dataset(name)?;
        match data {
            ValueCell::Int(v) => ds.write_raw(v)?,
            ValueCell::Float(v) => ds.write_raw(v)?,
            ValueCell::Str(v) => ds.write_raw(&to_vlu(v)?)?,
            ValueCell::DateTime(v) => {
                let strings: Vec<String> = v
                    .iter()
                    .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
                    .collect();
                ds.write_raw(&to_vlu(&strings)?)?;
            }
        }
        Ok(())
    }

    fn write_var_range(&mut self, name: &str, start: usize, data: &ValueCell) -> EngineResult<()> {
        self.check_writable()?;
        let ds = self.dataset(name)?;
        let shape = ds.shape();
        let row_len: usize = shape[1..].iter().product::<usize>().max(1);
        if data.len() % row_len != 0 {
            return Err(EngineError::Backend {
                backend: "hdf5",
                message: format!(
                    "ranged write of {} elements is not a whole number of rows of {}",
                    data.len(),
                    row_len
                ),
            });
        }
        // Read-modify-write of the full extent; dataset sizes here are
        // per-rank observation columns.
        let mut cell = self.read_var(name)?;
        if !cell.copy_in(start * row_len, data, 0, data.len()) {
            return Err(EngineError::UnsupportedDtype {
                backend: "hdf5",
                name: name.to_string(),
                dtype: data.dtype(),
            });
        }
        self.write_var(name, &cell)
    }

    fn attr_names(&self) -> EngineResult<Vec<String>> {
        Ok(self
            .file
            .attr_names()?
            .into_iter()
            .filter(|n| !n.starts_with(DIM_ATTR_PREFIX))
            .collect())
    }

    fn has_attr(&self, name: &str) -> bool {
        self.file.attr(name).is_ok()
    }

    fn read_attr(&self, name: &str) -> EngineResult<ValueCell> {
        let attr = self
            .file
            .attr(name)
            .map_err(|_| EngineError::AttrNotFound(name.to_string()))?;
        let desc = attr.dtype()?.to_descriptor()?;
        match desc {
            TypeDescriptor::Integer(_) | TypeDescriptor::Unsigned(_) => {
                Ok(ValueCell::Int(attr.read_raw::<i32>()?))
            }
            TypeDescriptor::Float(FloatSize::U4) => Ok(ValueCell::Float(attr.read_raw::<f32>()?)),
            TypeDescriptor::Float(_) => {
                let values = attr.read_raw::<f64>()?;
                Ok(ValueCell::Float(values.into_iter().map(|v| v as f32).collect()))
            }
            TypeDescriptor::VarLenUnicode | TypeDescriptor::VarLenAscii => {
                let raw = attr.read_raw::<VarLenUnicode>()?;
                Ok(ValueCell::Str(
                    raw.into_iter().map(|s| s.as_str().to_string()).collect(),
                ))
            }
            _ => Err(EngineError::UnsupportedSourceType {
                backend: "hdf5",
                name: name.to_string(),
            }),
        }
    }

    fn write_attr(&mut self, name: &str, data: &ValueCell) -> EngineResult<()> {
        self.check_writable()?;
        match data {
            ValueCell::Int(v) => self.write_root_attr_vals(name, v),
            ValueCell::Float(v) => self.write_root_attr_vals(name, v),
            ValueCell::Str(v) => self.write_root_attr_vals(name, &to_vlu(v)?),
            ValueCell::DateTime(v) => {
                let strings: Vec<String> = v
                    .iter()
                    .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
                    .collect();
                self.write_root_attr_vals(name, &to_vlu(&strings)?)
            }
        }
    }

    fn create_group(&mut self, path: &str) -> EngineResult<()> {
        self.check_writable()?;
        self.file.create_group(path)?;
        Ok(())
    }

    fn list_groups(&self) -> EngineResult<Vec<String>> {
        let mut names = Vec::new();
        for name in self.file.member_names()? {
            if self.file.group(&name).is_ok() {
                names.push(name);
            }
        }
        Ok(names)
    }
}
