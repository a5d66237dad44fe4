//! Attributes and the attribute store.
//!
//! Attributes are small named metadata attached to groups and variables.
//! They are always fully resident; there is no partial I/O.

use std::collections::BTreeMap;

use crate::dtype::ObsDtype;
use crate::error::{StoreError, StoreResult};
use crate::value::{ObsScalar, ValueCell};

/// One named piece of metadata: a shape and a typed value cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    shape: Vec<usize>,
    cell: ValueCell,
}

impl Attribute {
    /// Create a zero-filled attribute.
    pub fn new(dtype: ObsDtype, shape: &[usize]) -> Self {
        let len = shape.iter().product();
        Attribute {
            shape: shape.to_vec(),
            cell: ValueCell::new(dtype, len),
        }
    }

    /// Wrap an existing cell; the cell length must match the shape.
    pub fn from_cell(shape: &[usize], cell: ValueCell) -> StoreResult<Self> {
        let expected: usize = shape.iter().product();
        if cell.len() != expected {
            return Err(StoreError::LengthMismatch {
                name: String::new(),
                expected,
                actual: cell.len(),
            });
        }
        Ok(Attribute {
            shape: shape.to_vec(),
            cell,
        })
    }

    pub fn dtype(&self) -> ObsDtype {
        self.cell.dtype()
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn len(&self) -> usize {
        self.cell.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cell.is_empty()
    }

    pub fn cell(&self) -> &ValueCell {
        &self.cell
    }

    /// Replace the full contents.
    pub fn write<T: ObsScalar>(&mut self, data: &[T]) -> StoreResult<()> {
        if T::DTYPE != self.cell.dtype() {
            return Err(StoreError::TypeMismatch {
                name: String::new(),
                requested: T::DTYPE,
                stored: self.cell.dtype(),
            });
        }
        if data.len() != self.cell.len() {
            return Err(StoreError::LengthMismatch {
                name: String::new(),
                expected: self.cell.len(),
                actual: data.len(),
            });
        }
        let dst = T::from_cell_mut(&mut self.cell).expect("tag checked above");
        dst.clone_from_slice(data);
        Ok(())
    }

    /// Read the full contents into `out`.
    pub fn read<T: ObsScalar>(&self, out: &mut [T]) -> StoreResult<()> {
        if T::DTYPE != self.cell.dtype() {
            return Err(StoreError::TypeMismatch {
                name: String::new(),
                requested: T::DTYPE,
                stored: self.cell.dtype(),
            });
        }
        if out.len() != self.cell.len() {
            return Err(StoreError::LengthMismatch {
                name: String::new(),
                expected: self.cell.len(),
                actual: out.len(),
            });
        }
        let src = T::from_cell(&self.cell).expect("tag checked above");
        out.clone_from_slice(src);
        Ok(())
    }
}

/// Named attribute container attached to a group or variable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeStore {
    attrs: BTreeMap<String, Attribute>,
}

impl AttributeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new zero-filled attribute.
    pub fn create(
        &mut self,
        name: &str,
        dtype: ObsDtype,
        shape: &[usize],
    ) -> StoreResult<&mut Attribute> {
        if self.attrs.contains_key(name) {
            return Err(StoreError::AlreadyExists {
                name: name.to_string(),
            });
        }
        self.attrs.insert(name.to_string(), Attribute::new(dtype, shape));
        Ok(self.attrs.get_mut(name).expect("just inserted"))
    }

    /// Create an attribute holding the given cell.
    pub fn create_from_cell(
        &mut self,
        name: &str,
        shape: &[usize],
        cell: ValueCell,
    ) -> StoreResult<()> {
        if self.attrs.contains_key(name) {
            return Err(StoreError::AlreadyExists {
                name: name.to_string(),
            });
        }
        let attr = Attribute::from_cell(shape, cell).map_err(|e| match e {
            StoreError::LengthMismatch {
                expected, actual, ..
            } => StoreError::LengthMismatch {
                name: name.to_string(),
                expected,
                actual,
            },
            other => other,
        })?;
        self.attrs.insert(name.to_string(), attr);
        Ok(())
    }

    pub fn open(&self, name: &str) -> StoreResult<&Attribute> {
        self.attrs.get(name).ok_or_else(|| StoreError::NotFound {
            name: name.to_string(),
        })
    }

    pub fn open_mut(&mut self, name: &str) -> StoreResult<&mut Attribute> {
        self.attrs.get_mut(name).ok_or_else(|| StoreError::NotFound {
            name: name.to_string(),
        })
    }

    pub fn exists(&self, name: &str) -> bool {
        self.attrs.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> StoreResult<()> {
        self.attrs.remove(name).map(|_| ()).ok_or_else(|| StoreError::NotFound {
            name: name.to_string(),
        })
    }

    pub fn rename(&mut self, old: &str, new: &str) -> StoreResult<()> {
        if self.attrs.contains_key(new) {
            return Err(StoreError::AlreadyExists {
                name: new.to_string(),
            });
        }
        let attr = self.attrs.remove(old).ok_or_else(|| StoreError::NotFound {
            name: old.to_string(),
        })?;
        self.attrs.insert(new.to_string(), attr);
        Ok(())
    }

    /// Attribute names in sorted order.
    pub fn list(&self) -> Vec<String> {
        self.attrs.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_read_back() {
        let mut store = AttributeStore::new();
        let attr = store.create("units", ObsDtype::String, &[1]).unwrap();
        attr.write(&["K".to_string()]).unwrap();

        let mut out = vec![String::new()];
        store.open("units").unwrap().read(&mut out).unwrap();
        assert_eq!(out, vec!["K".to_string()]);
    }

    #[test]
    fn test_create_collision() {
        let mut store = AttributeStore::new();
        store.create("a", ObsDtype::Int, &[1]).unwrap();
        assert!(matches!(
            store.create("a", ObsDtype::Int, &[1]),
            Err(StoreError::AlreadyExists { .. })
        ));
    }

    #[test]
    fn test_open_missing() {
        let store = AttributeStore::new();
        assert!(matches!(
            store.open("nope"),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn test_rename_rules() {
        let mut store = AttributeStore::new();
        store.create("a", ObsDtype::Int, &[1]).unwrap();
        store.create("b", ObsDtype::Int, &[1]).unwrap();

        assert!(matches!(
            store.rename("a", "b"),
            Err(StoreError::AlreadyExists { .. })
        ));
        assert!(matches!(
            store.rename("missing", "c"),
            Err(StoreError::NotFound { .. })
        ));

        store.rename("a", "c").unwrap();
        assert!(store.exists("c"));
        assert!(!store.exists("a"));
    }

    #[test]
    fn test_list_is_sorted() {
        let mut store = AttributeStore::new();
        store.create("zebra", ObsDtype::Int, &[1]).unwrap();
        store.create("alpha", ObsDtype::Int, &[1]).unwrap();
        assert_eq!(store.list(), vec!["alpha".to_string(), "zebra".to_string()]);
    }

    #[test]
    fn test_type_mismatch_on_write() {
        let mut store = AttributeStore::new();
        store.create("a", ObsDtype::Float, &[2]).unwrap();
        let err = store.open_mut("a").unwrap().write(&[1i32, 2]).unwrap_err();
        assert!(matches!(err, StoreError::TypeMismatch { .. }));
    }
}
