//! NetCDF file engine.
//!
//! Opens the legacy observation files. The type registry on this path is
//! int/float/double; doubles are downcast to single precision on read,
//! and variables of any other type are reported as unsupported so the
//! caller can skip them.

use std::path::{Path, PathBuf};

use netcdf::types::{BasicType, VariableType};
use netcdf::AttributeValue;
use tracing::{trace, warn};

use obs_store::{ObsDtype, ValueCell};

use crate::error::{EngineError, EngineResult};
use crate::{Backend, Capabilities, CreateMode, OpenMode, VarInfo};

enum NcHandle {
    Read(netcdf::File),
    Write(netcdf::FileMut),
}

/// Backend over a NetCDF-4 file.
pub struct NetcdfBackend {
    handle: NcHandle,
    path: PathBuf,
}

impl NetcdfBackend {
    /// Open an existing file.
    pub fn open(path: &Path, mode: OpenMode) -> EngineResult<Self> {
        trace!(path = %path.display(), ?mode, "opening netcdf file");
        let handle = match mode {
            OpenMode::ReadOnly => NcHandle::Read(netcdf::open(path)?),
            OpenMode::ReadWrite => NcHandle::Write(netcdf::append(path)?),
        };
        Ok(NetcdfBackend {
            handle,
            path: path.to_path_buf(),
        })
    }

    /// Create a new file.
    pub fn create(path: &Path, mode: CreateMode) -> EngineResult<Self> {
        trace!(path = %path.display(), ?mode, "creating netcdf file");
        if mode == CreateMode::FailIfExists && path.exists() {
            return Err(EngineError::Backend {
                backend: "netcdf",
                message: format!("file already exists: {}", path.display()),
            });
        }
        Ok(NetcdfBackend {
            handle: NcHandle::Write(netcdf::create(path)?),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file(&self) -> &netcdf::File {
        match &self.handle {
            NcHandle::Read(f) => f,
            NcHandle::Write(f) => f,
        }
    }

    fn file_mut(&mut self) -> EngineResult<&mut netcdf::FileMut> {
        match &mut self.handle {
            NcHandle::Write(f) => Ok(f),
            NcHandle::Read(_) => Err(EngineError::ReadOnlyBackend),
        }
    }

    fn variable(&self, name: &str) -> EngineResult<netcdf::Variable<'_>> {
        self.file()
            .variable(name)
            .ok_or_else(|| EngineError::VarNotFound(name.to_string()))
    }

    fn dtype_of(var: &netcdf::Variable<'_>, name: &str) -> EngineResult<ObsDtype> {
        match var.vartype() {
            VariableType::Basic(BasicType::Int) => Ok(ObsDtype::Int),
            VariableType::Basic(BasicType::Float) => Ok(ObsDtype::Float),
            // Doubles are forced to single precision on this path.
            VariableType::Basic(BasicType::Double) => Ok(ObsDtype::Float),
            _ => Err(EngineError::UnsupportedSourceType {
                backend: "netcdf",
                name: name.to_string(),
            }),
        }
    }
}

impl Backend for NetcdfBackend {
    fn name(&self) -> &'static str {
        "netcdf"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            partial_io: true,
            attribute_rename: false,
            grouping: false,
            concurrent_readers: true,
        }
    }

    fn dimensions(&self) -> EngineResult<Vec<(String, usize)>> {
        Ok(self
            .file()
            .dimensions()
            .map(|d| (d.name().to_string(), d.len()))
            .collect())
    }

    fn define_dimension(&mut self, name: &str, len: usize) -> EngineResult<()> {
        self.file_mut()?.add_dimension(name, len)?;
        Ok(())
    }

    fn var_names(&self) -> EngineResult<Vec<String>> {
        Ok(self.file().variables().map(|v| v.name().to_string()).collect())
    }

    fn var_exists(&self, name: &str) -> bool {
        self.file().variable(name).is_some()
    }

    fn var_info(&self, name: &str) -> EngineResult<VarInfo> {
        let var = self.variable(name)?;
        let dtype = Self::dtype_of(&var, name)?;
        Ok(VarInfo {
            dtype,
            shape: var.dimensions().iter().map(|d| d.len()).collect(),
            dims: var
                .dimensions()
                .iter()
                .map(|d| d.name().to_string())
                .collect(),
        })
    }

    fn create_var(&mut self, name: &str, dtype: ObsDtype, dims: &[&str]) -> EngineResult<()> {
        let file = self.file_mut()?;
        match dtype {
            ObsDtype::Int => {
                file.add_variable::<i32>(name, dims)?;
            }
            ObsDtype::Float => {
                file.add_variable::<f32>(name, dims)?;
            }
            other => {
                return Err(EngineError::UnsupportedDtype {
                    backend: "netcdf",
                    name: name.to_string(),
                    dtype: other,
                })
            }
        }
        Ok(())
    }

    fn read_var(&self, name: &str) -> EngineResult<ValueCell> {
        let var = self.variable(name)?;
        match var.vartype() {
            VariableType::Basic(BasicType::Int) => {
                Ok(ValueCell::Int(var.get_values::<i32, _>(..)?))
            }
            VariableType::Basic(BasicType::Float) => {
                Ok(ValueCell::Float(var.get_values::<f32, _>(..)?))
            }
            VariableType::Basic(BasicType::Double) => {
                let values = var.get_values::<f64, _>(..)?;
                Ok(ValueCell::Float(values.into_iter().map(|v| v as f32).collect()))
            }
            other => {
                warn!(variable = name, ?other, "unable to read netcdf dataset of this type");
                Err(EngineError::UnsupportedSourceType {
                    backend: "netcdf",
                    name: name.to_string(),
                })
            }
        }
    }

    fn read_var_range(&self, name: &str, start: usize, count: usize) -> EngineResult<ValueCell> {
        let var = self.variable(name)?;
        let rank = var.dimensions().len();
        if rank == 1 {
            match var.vartype() {
                VariableType::Basic(BasicType::Int) => {
                    Ok(ValueCell::Int(var.get_values::<i32, _>(start..start + count)?))
                }
                VariableType::Basic(BasicType::Float) => Ok(ValueCell::Float(
                    var.get_values::<f32, _>(start..start + count)?,
                )),
                VariableType::Basic(BasicType::Double) => {
                    let values = var.get_values::<f64, _>(start..start + count)?;
                    Ok(ValueCell::Float(values.into_iter().map(|v| v as f32).collect()))
                }
                _ => Err(EngineError::UnsupportedSourceType {
                    backend: "netcdf",
                    name: name.to_string(),
                }),
            }
        } else {
            // Whole-variable read, then row extraction.
            let shape: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();
            let row_len: usize = shape[1..].iter().product();
            let cell = self.read_var(name)?;
            Ok(cell.extract(start * row_len, count * row_len))
        }
    }

    fn write_var(&mut self, name: &str, data: &ValueCell) -> EngineResult<()> {
        let mut var = self
            .file_mut()?
            .variable_mut(name)
            .ok_or_else(|| EngineError::VarNotFound(name.to_string()))?;
        match data {
            ValueCell::Int(v) => var.put_values(v, ..)?,
            ValueCell::Float(v) => var.put_values(v, ..)?,
            other => {
                return Err(EngineError::UnsupportedDtype {
                    backend: "netcdf",
                    name: name.to_string(),
                    dtype: other.dtype(),
                })
            }
        }
        Ok(())
    }

    fn write_var_range(&mut self, name: &str, start: usize, data: &ValueCell) -> EngineResult<()> {
        let mut var = self
            .file_mut()?
            .variable_mut(name)
            .ok_or_else(|| EngineError::VarNotFound(name.to_string()))?;
        if var.dimensions().len() != 1 {
            return Err(EngineError::Unsupported {
                backend: "netcdf",
                op: "ranged write on multi-dimensional variables",
            });
        }
        match data {
            ValueCell::Int(v) => var.put_values(v, start..start + v.len())?,
            ValueCell::Float(v) => var.put_values(v, start..start + v.len())?,
            other => {
                return Err(EngineError::UnsupportedDtype {
                    backend: "netcdf",
                    name: name.to_string(),
                    dtype: other.dtype(),
                })
            }
        }
        Ok(())
    }

    fn attr_names(&self) -> EngineResult<Vec<String>> {
        Ok(self
            .file()
            .attributes()
            .map(|a| a.name().to_string())
            .collect())
    }

    fn has_attr(&self, name: &str) -> bool {
        self.file().attribute(name).is_some()
    }

    fn read_attr(&self, name: &str) -> EngineResult<ValueCell> {
        let attr = self
            .file()
            .attribute(name)
            .ok_or_else(|| EngineError::AttrNotFound(name.to_string()))?;
        match attr.value()? {
            AttributeValue::Int(v) => Ok(ValueCell::Int(vec![v])),
            AttributeValue::Ints(v) => Ok(ValueCell::Int(v)),
            AttributeValue::Float(v) => Ok(ValueCell::Float(vec![v])),
            AttributeValue::Floats(v) => Ok(ValueCell::Float(v)),
            AttributeValue::Double(v) => Ok(ValueCell::Float(vec![v as f32])),
            AttributeValue::Doubles(v) => Ok(ValueCell::Float(
                v.into_iter().map(|x| x as f32).collect(),
            )),
            AttributeValue::Str(v) => Ok(ValueCell::Str(vec![v])),
            AttributeValue::Strs(v) => Ok(ValueCell::Str(v)),
            _ => Err(EngineError::UnsupportedSourceType {
                backend: "netcdf",
                name: name.to_string(),
            }),
        }
    }

    fn write_attr(&mut self, name: &str, data: &ValueCell) -> EngineResult<()> {
        let file = self.file_mut()?;
        match data {
            ValueCell::Int(v) if v.len() == 1 => {
                file.add_attribute(name, v[0])?;
            }
            ValueCell::Int(v) => {
                file.add_attribute(name, v.clone())?;
            }
            ValueCell::Float(v) if v.len() == 1 => {
                file.add_attribute(name, v[0])?;
            }
            ValueCell::Float(v) => {
                file.add_attribute(name, v.clone())?;
            }
            ValueCell::Str(v) if v.len() == 1 => {
                file.add_attribute(name, v[0].as_str())?;
            }
            ValueCell::Str(v) => {
                file.add_attribute(name, v.clone())?;
            }
            ValueCell::DateTime(_) => {
                return Err(EngineError::UnsupportedDtype {
                    backend: "netcdf",
                    name: name.to_string(),
                    dtype: ObsDtype::DateTime,
                })
            }
        }
        Ok(())
    }

    fn create_group(&mut self, _path: &str) -> EngineResult<()> {
        Err(EngineError::Unsupported {
            backend: "netcdf",
            op: "group creation (legacy files are flat)",
        })
    }

    fn list_groups(&self) -> EngineResult<Vec<String>> {
        Ok(Vec::new())
    }
}
