//! Variables and the variable store.
//!
//! A [`Variable`] is a typed, shaped array with whole and ranged I/O.
//! Selections address contiguous hyperslabs; concurrent reads are safe,
//! concurrent writes are not coordinated.

use std::collections::BTreeMap;

use crate::dtype::ObsDtype;
use crate::error::{StoreError, StoreResult};
use crate::selection::Selection;
use crate::value::{ObsScalar, ValueCell};

/// A typed, shaped array.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    shape: Vec<usize>,
    chunking: Option<Vec<usize>>,
    cell: ValueCell,
}

impl Variable {
    /// Create a zero-filled variable.
    pub fn new(dtype: ObsDtype, shape: &[usize], chunking: Option<Vec<usize>>) -> Self {
        let len = shape.iter().product();
        Variable {
            shape: shape.to_vec(),
            chunking,
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
        Ok(Variable {
            shape: shape.to_vec(),
            chunking: None,
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

    pub fn chunking(&self) -> Option<&[usize]> {
        self.chunking.as_deref()
    }

    pub fn cell(&self) -> &ValueCell {
        &self.cell
    }

    /// Write a hyperslab. `data` is row-major over the selection.
    pub fn write_range<T: ObsScalar>(&mut self, sel: &Selection, data: &[T]) -> StoreResult<()> {
        sel.validate("", &self.shape)?;
        if T::DTYPE != self.cell.dtype() {
            return Err(StoreError::TypeMismatch {
                name: String::new(),
                requested: T::DTYPE,
                stored: self.cell.dtype(),
            });
        }
        if data.len() != sel.element_count() {
            return Err(StoreError::LengthMismatch {
                name: String::new(),
                expected: sel.element_count(),
                actual: data.len(),
            });
        }
        let dst = T::from_cell_mut(&mut self.cell).expect("tag checked above");
        let mut src = 0;
        for (offset, run) in sel.runs(&self.shape) {
            dst[offset..offset + run].clone_from_slice(&data[src..src + run]);
            src += run;
        }
        Ok(())
    }

    /// Read a hyperslab. `out` receives the selection in row-major order.
    pub fn read_range<T: ObsScalar>(&self, sel: &Selection, out: &mut [T]) -> StoreResult<()> {
        sel.validate("", &self.shape)?;
        if T::DTYPE != self.cell.dtype() {
            return Err(StoreError::TypeMismatch {
                name: String::new(),
                requested: T::DTYPE,
                stored: self.cell.dtype(),
            });
        }
        if out.len() != sel.element_count() {
            return Err(StoreError::LengthMismatch {
                name: String::new(),
                expected: sel.element_count(),
                actual: out.len(),
            });
        }
        let src = T::from_cell(&self.cell).expect("tag checked above");
        let mut dst = 0;
        for (offset, run) in sel.runs(&self.shape) {
            out[dst..dst + run].clone_from_slice(&src[offset..offset + run]);
            dst += run;
        }
        Ok(())
    }

    /// Replace the whole contents.
    pub fn write_all<T: ObsScalar>(&mut self, data: &[T]) -> StoreResult<()> {
        let sel = Selection::whole(&self.shape);
        self.write_range(&sel, data)
    }

    /// Read the whole contents.
    pub fn read_all<T: ObsScalar>(&self, out: &mut [T]) -> StoreResult<()> {
        self.read_range(&Selection::whole(&self.shape), out)
    }
}

/// Named variable container attached to a group.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableStore {
    vars: BTreeMap<String, Variable>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(
        &mut self,
        name: &str,
        dtype: ObsDtype,
        shape: &[usize],
        chunking: Option<Vec<usize>>,
    ) -> StoreResult<&mut Variable> {
        if self.vars.contains_key(name) {
            return Err(StoreError::AlreadyExists {
                name: name.to_string(),
            });
        }
        self.vars
            .insert(name.to_string(), Variable::new(dtype, shape, chunking));
        Ok(self.vars.get_mut(name).expect("just inserted"))
    }

    /// Create a variable holding the given cell.
    pub fn create_from_cell(
        &mut self,
        name: &str,
        shape: &[usize],
        cell: ValueCell,
    ) -> StoreResult<()> {
        if self.vars.contains_key(name) {
            return Err(StoreError::AlreadyExists {
                name: name.to_string(),
            });
        }
        let var = Variable::from_cell(shape, cell).map_err(|e| match e {
            StoreError::LengthMismatch {
                expected, actual, ..
            } => StoreError::LengthMismatch {
                name: name.to_string(),
                expected,
                actual,
            },
            other => other,
        })?;
        self.vars.insert(name.to_string(), var);
        Ok(())
    }

    pub fn open(&self, name: &str) -> StoreResult<&Variable> {
        self.vars.get(name).ok_or_else(|| StoreError::NotFound {
            name: name.to_string(),
        })
    }

    pub fn open_mut(&mut self, name: &str) -> StoreResult<&mut Variable> {
        self.vars.get_mut(name).ok_or_else(|| StoreError::NotFound {
            name: name.to_string(),
        })
    }

    pub fn exists(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> StoreResult<()> {
        self.vars.remove(name).map(|_| ()).ok_or_else(|| StoreError::NotFound {
            name: name.to_string(),
        })
    }

    pub fn rename(&mut self, old: &str, new: &str) -> StoreResult<()> {
        if self.vars.contains_key(new) {
            return Err(StoreError::AlreadyExists {
                name: new.to_string(),
            });
        }
        let var = self.vars.remove(old).ok_or_else(|| StoreError::NotFound {
            name: old.to_string(),
        })?;
        self.vars.insert(new.to_string(), var);
        Ok(())
    }

    /// Variable names in sorted order.
    pub fn list(&self) -> Vec<String> {
        self.vars.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whole_write_read() {
        let mut var = Variable::new(ObsDtype::Int, &[4], None);
        var.write_all(&[1, 2, 3, 4]).unwrap();
        let mut out = vec![0i32; 4];
        var.read_all(&mut out).unwrap();
        assert_eq!(out, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_ranged_write_matches_whole_write() {
        // Segmented writes in arbitrary order equal one whole-range write.
        let mut whole = Variable::new(ObsDtype::Float, &[5], None);
        whole.write_all(&[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();

        let mut pieces = Variable::new(ObsDtype::Float, &[5], None);
        pieces
            .write_range(&Selection::new(&[(3, 2)]), &[4.0, 5.0])
            .unwrap();
        pieces
            .write_range(&Selection::new(&[(0, 2)]), &[1.0, 2.0])
            .unwrap();
        pieces
            .write_range(&Selection::new(&[(2, 1)]), &[3.0])
            .unwrap();

        assert_eq!(whole.cell(), pieces.cell());
    }

    #[test]
    fn test_rank2_hyperslab() {
        let mut var = Variable::new(ObsDtype::Int, &[3, 4], None);
        let all: Vec<i32> = (0..12).collect();
        var.write_all(&all).unwrap();

        // rows 1..3, cols 1..3
        let mut out = vec![0i32; 4];
        var.read_range(&Selection::new(&[(1, 2), (1, 2)]), &mut out)
            .unwrap();
        assert_eq!(out, vec![5, 6, 9, 10]);
    }

    #[test]
    fn test_out_of_range_selection() {
        let var = Variable::new(ObsDtype::Int, &[3], None);
        let mut out = vec![0i32; 2];
        assert!(matches!(
            var.read_range(&Selection::new(&[(2, 2)]), &mut out),
            Err(StoreError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_store_management() {
        let mut store = VariableStore::new();
        store.create("b", ObsDtype::Int, &[2], None).unwrap();
        store.create("a", ObsDtype::Float, &[3], None).unwrap();

        assert_eq!(store.list(), vec!["a".to_string(), "b".to_string()]);
        assert!(store.exists("a"));

        store.rename("a", "c").unwrap();
        assert!(!store.exists("a"));
        store.remove("b").unwrap();
        assert!(matches!(
            store.remove("b"),
            Err(StoreError::NotFound { .. })
        ));
    }
}
