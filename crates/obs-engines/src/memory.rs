//! Pure in-memory engine.
//!
//! No file behind it; variables live in an [`obs_store::ObsGroup`] under
//! their flattened names. This is the engine the ObsSpace uses as its
//! primary working store, and the reference implementation the file
//! engines are tested against.

use std::collections::BTreeMap;

use obs_store::{ObsDtype, ObsGroup, Selection, StoreError, ValueCell};

use crate::error::{EngineError, EngineResult};
use crate::{Backend, Capabilities, VarInfo};

/// In-memory backend over the store's group tree.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    root: ObsGroup,
    dims: BTreeMap<String, usize>,
    var_dims: BTreeMap<String, Vec<String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        MemoryBackend {
            root: ObsGroup::root(),
            dims: BTreeMap::new(),
            var_dims: BTreeMap::new(),
        }
    }

    /// Borrow the underlying group tree.
    pub fn root(&self) -> &ObsGroup {
        &self.root
    }

    fn dim_len(&self, name: &str) -> EngineResult<usize> {
        self.dims
            .get(name)
            .copied()
            .ok_or_else(|| EngineError::Store(StoreError::NotFound {
                name: name.to_string(),
            }))
    }
}

impl Backend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            partial_io: true,
            attribute_rename: true,
            grouping: true,
            concurrent_readers: true,
        }
    }

    fn dimensions(&self) -> EngineResult<Vec<(String, usize)>> {
        Ok(self.dims.iter().map(|(k, &v)| (k.clone(), v)).collect())
    }

    fn define_dimension(&mut self, name: &str, len: usize) -> EngineResult<()> {
        self.dims.insert(name.to_string(), len);
        Ok(())
    }

    fn var_names(&self) -> EngineResult<Vec<String>> {
        Ok(self.root.vars().list())
    }

    fn var_exists(&self, name: &str) -> bool {
        self.root.vars().exists(name)
    }

    fn var_info(&self, name: &str) -> EngineResult<VarInfo> {
        let var = self
            .root
            .vars()
            .open(name)
            .map_err(|_| EngineError::VarNotFound(name.to_string()))?;
        Ok(VarInfo {
            dtype: var.dtype(),
            shape: var.shape().to_vec(),
            dims: self.var_dims.get(name).cloned().unwrap_or_default(),
        })
    }

    fn create_var(&mut self, name: &str, dtype: ObsDtype, dims: &[&str]) -> EngineResult<()> {
        let mut shape = Vec::with_capacity(dims.len());
        for dim in dims {
            shape.push(self.dim_len(dim)?);
        }
        self.root.vars_mut().create(name, dtype, &shape, None)?;
        self.var_dims
            .insert(name.to_string(), dims.iter().map(|d| d.to_string()).collect());
        Ok(())
    }

    fn read_var(&self, name: &str) -> EngineResult<ValueCell> {
        let var = self
            .root
            .vars()
            .open(name)
            .map_err(|_| EngineError::VarNotFound(name.to_string()))?;
        Ok(var.cell().clone())
    }

    fn read_var_range(&self, name: &str, start: usize, count: usize) -> EngineResult<ValueCell> {
        let var = self
            .root
            .vars()
            .open(name)
            .map_err(|_| EngineError::VarNotFound(name.to_string()))?;
        let sel = Selection::leading(start, count, var.shape());
        sel.validate(name, var.shape())?;
        let row_len: usize = var.shape()[1..].iter().product();
        Ok(var.cell().extract(start * row_len, count * row_len))
    }

    fn write_var(&mut self, name: &str, data: &ValueCell) -> EngineResult<()> {
        let var = self
            .root
            .vars_mut()
            .open_mut(name)
            .map_err(|_| EngineError::VarNotFound(name.to_string()))?;
        if var.dtype() != data.dtype() {
            return Err(EngineError::Store(StoreError::TypeMismatch {
                name: name.to_string(),
                requested: data.dtype(),
                stored: var.dtype(),
            }));
        }
        if var.len() != data.len() {
            return Err(EngineError::Store(StoreError::LengthMismatch {
                name: name.to_string(),
                expected: var.len(),
                actual: data.len(),
            }));
        }
        let shape = var.shape().to_vec();
        match data {
            ValueCell::Int(v) => var.write_range(&Selection::whole(&shape), v)?,
            ValueCell::Float(v) => var.write_range(&Selection::whole(&shape), v)?,
            ValueCell::Str(v) => var.write_range(&Selection::whole(&shape), v)?,
            ValueCell::DateTime(v) => var.write_range(&Selection::whole(&shape), v)?,
        }
        Ok(())
    }

    fn write_var_range(&mut self, name: &str, start: usize, data: &ValueCell) -> EngineResult<()> {
        let var = self
            .root
            .vars_mut()
            .open_mut(name)
            .map_err(|_| EngineError::VarNotFound(name.to_string()))?;
        let shape = var.shape().to_vec();
        let row_len: usize = shape[1..].iter().product();
        if row_len == 0 || data.len() % row_len != 0 {
            return Err(EngineError::Store(StoreError::LengthMismatch {
                name: name.to_string(),
                expected: row_len,
                actual: data.len(),
            }));
        }
        let sel = Selection::leading(start, data.len() / row_len, &shape);
        match data {
            ValueCell::Int(v) => var.write_range(&sel, v)?,
            ValueCell::Float(v) => var.write_range(&sel, v)?,
            ValueCell::Str(v) => var.write_range(&sel, v)?,
            ValueCell::DateTime(v) => var.write_range(&sel, v)?,
        }
        Ok(())
    }

    fn attr_names(&self) -> EngineResult<Vec<String>> {
        Ok(self.root.attrs().list())
    }

    fn has_attr(&self, name: &str) -> bool {
        self.root.attrs().exists(name)
    }

    fn read_attr(&self, name: &str) -> EngineResult<ValueCell> {
        let attr = self
            .root
            .attrs()
            .open(name)
            .map_err(|_| EngineError::AttrNotFound(name.to_string()))?;
        Ok(attr.cell().clone())
    }

    fn write_attr(&mut self, name: &str, data: &ValueCell) -> EngineResult<()> {
        let attrs = self.root.attrs_mut();
        if attrs.exists(name) {
            attrs.remove(name)?;
        }
        attrs.create_from_cell(name, &[data.len()], data.clone())?;
        Ok(())
    }

    fn create_group(&mut self, path: &str) -> EngineResult<()> {
        self.root.create(path)?;
        Ok(())
    }

    fn list_groups(&self) -> EngineResult<Vec<String>> {
        Ok(self.root.list())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_write_read() {
        let mut be = MemoryBackend::new();
        be.define_dimension("nlocs", 3).unwrap();
        be.create_var("t@ObsValue", ObsDtype::Float, &["nlocs"]).unwrap();
        be.write_var("t@ObsValue", &ValueCell::Float(vec![1.0, 2.0, 3.0]))
            .unwrap();

        let cell = be.read_var("t@ObsValue").unwrap();
        assert_eq!(cell, ValueCell::Float(vec![1.0, 2.0, 3.0]));

        let part = be.read_var_range("t@ObsValue", 1, 2).unwrap();
        assert_eq!(part, ValueCell::Float(vec![2.0, 3.0]));
    }

    #[test]
    fn test_var_info_records_dims() {
        let mut be = MemoryBackend::new();
        be.define_dimension("nlocs", 4).unwrap();
        be.define_dimension("nvars", 2).unwrap();
        be.create_var("r@ObsValue", ObsDtype::Float, &["nlocs", "nvars"])
            .unwrap();

        let info = be.var_info("r@ObsValue").unwrap();
        assert_eq!(info.shape, vec![4, 2]);
        assert_eq!(info.dims, vec!["nlocs".to_string(), "nvars".to_string()]);
    }

    #[test]
    fn test_create_var_with_unknown_dim() {
        let mut be = MemoryBackend::new();
        assert!(be.create_var("x", ObsDtype::Int, &["nlocs"]).is_err());
    }

    #[test]
    fn test_attr_overwrite() {
        let mut be = MemoryBackend::new();
        be.write_attr("date_time", &ValueCell::Int(vec![2018041500]))
            .unwrap();
        be.write_attr("date_time", &ValueCell::Int(vec![2018041600]))
            .unwrap();
        assert_eq!(
            be.read_attr("date_time").unwrap(),
            ValueCell::Int(vec![2018041600])
        );
    }

    #[test]
    fn test_ranged_write() {
        let mut be = MemoryBackend::new();
        be.define_dimension("nlocs", 4).unwrap();
        be.create_var("v", ObsDtype::Int, &["nlocs"]).unwrap();
        be.write_var_range("v", 2, &ValueCell::Int(vec![8, 9])).unwrap();

        let cell = be.read_var("v").unwrap();
        assert_eq!(cell, ValueCell::Int(vec![0, 0, 8, 9]));
    }
}
