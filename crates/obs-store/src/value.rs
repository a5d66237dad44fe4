//! Tagged value cells.
//!
//! A [`ValueCell`] holds one typed, contiguous array. The tag is fixed at
//! construction; typed access goes through the sealed [`ObsScalar`] trait so
//! callers get compile-time dispatch and the cell keeps runtime tag checks.

use chrono::{DateTime, Utc};

use crate::dtype::ObsDtype;

/// A contiguous array of one of the four primitive types.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueCell {
    Int(Vec<i32>),
    Float(Vec<f32>),
    Str(Vec<String>),
    DateTime(Vec<DateTime<Utc>>),
}

impl ValueCell {
    /// Create a zero-filled cell of the given type and length.
    pub fn new(dtype: ObsDtype, len: usize) -> Self {
        match dtype {
            ObsDtype::Int => ValueCell::Int(vec![0; len]),
            ObsDtype::Float => ValueCell::Float(vec![0.0; len]),
            ObsDtype::String => ValueCell::Str(vec![String::new(); len]),
            ObsDtype::DateTime => ValueCell::DateTime(vec![DateTime::<Utc>::UNIX_EPOCH; len]),
        }
    }

    pub fn dtype(&self) -> ObsDtype {
        match self {
            ValueCell::Int(_) => ObsDtype::Int,
            ValueCell::Float(_) => ObsDtype::Float,
            ValueCell::Str(_) => ObsDtype::String,
            ValueCell::DateTime(_) => ObsDtype::DateTime,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ValueCell::Int(v) => v.len(),
            ValueCell::Float(v) => v.len(),
            ValueCell::Str(v) => v.len(),
            ValueCell::DateTime(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append the contents of `other`. Returns false when the tags differ.
    pub fn append_cell(&mut self, other: &ValueCell) -> bool {
        match (self, other) {
            (ValueCell::Int(dst), ValueCell::Int(src)) => dst.extend_from_slice(src),
            (ValueCell::Float(dst), ValueCell::Float(src)) => dst.extend_from_slice(src),
            (ValueCell::Str(dst), ValueCell::Str(src)) => dst.extend_from_slice(src),
            (ValueCell::DateTime(dst), ValueCell::DateTime(src)) => dst.extend_from_slice(src),
            _ => return false,
        }
        true
    }

    /// Copy `count` elements from `src` starting at `src_start` into this
    /// cell starting at `dst_start`. Returns false when the tags differ;
    /// bounds must have been checked by the caller.
    pub fn copy_in(
        &mut self,
        dst_start: usize,
        src: &ValueCell,
        src_start: usize,
        count: usize,
    ) -> bool {
        match (self, src) {
            (ValueCell::Int(dst), ValueCell::Int(s)) => {
                dst[dst_start..dst_start + count].copy_from_slice(&s[src_start..src_start + count]);
            }
            (ValueCell::Float(dst), ValueCell::Float(s)) => {
                dst[dst_start..dst_start + count].copy_from_slice(&s[src_start..src_start + count]);
            }
            (ValueCell::Str(dst), ValueCell::Str(s)) => {
                dst[dst_start..dst_start + count].clone_from_slice(&s[src_start..src_start + count]);
            }
            (ValueCell::DateTime(dst), ValueCell::DateTime(s)) => {
                dst[dst_start..dst_start + count].copy_from_slice(&s[src_start..src_start + count]);
            }
            _ => return false,
        }
        true
    }

    /// Clone out `count` elements starting at `start`.
    pub fn extract(&self, start: usize, count: usize) -> ValueCell {
        match self {
            ValueCell::Int(v) => ValueCell::Int(v[start..start + count].to_vec()),
            ValueCell::Float(v) => ValueCell::Float(v[start..start + count].to_vec()),
            ValueCell::Str(v) => ValueCell::Str(v[start..start + count].to_vec()),
            ValueCell::DateTime(v) => ValueCell::DateTime(v[start..start + count].to_vec()),
        }
    }

    /// Clone out the elements at the given positions, in order.
    pub fn project(&self, indices: &[usize]) -> ValueCell {
        match self {
            ValueCell::Int(v) => ValueCell::Int(indices.iter().map(|&i| v[i]).collect()),
            ValueCell::Float(v) => ValueCell::Float(indices.iter().map(|&i| v[i]).collect()),
            ValueCell::Str(v) => {
                ValueCell::Str(indices.iter().map(|&i| v[i].clone()).collect())
            }
            ValueCell::DateTime(v) => {
                ValueCell::DateTime(indices.iter().map(|&i| v[i]).collect())
            }
        }
    }
}

mod sealed {
    use chrono::{DateTime, Utc};

    pub trait Sealed {}
    impl Sealed for i32 {}
    impl Sealed for f32 {}
    impl Sealed for String {}
    impl Sealed for DateTime<Utc> {}
}

/// The four scalar types a cell can hold, with typed cell access.
pub trait ObsScalar: sealed::Sealed + Clone + 'static {
    const DTYPE: ObsDtype;

    fn from_cell(cell: &ValueCell) -> Option<&[Self]>;
    fn from_cell_mut(cell: &mut ValueCell) -> Option<&mut Vec<Self>>;
    fn into_cell(data: Vec<Self>) -> ValueCell;
}

impl ObsScalar for i32 {
    const DTYPE: ObsDtype = ObsDtype::Int;

    fn from_cell(cell: &ValueCell) -> Option<&[Self]> {
        match cell {
            ValueCell::Int(v) => Some(v),
            _ => None,
        }
    }

    fn from_cell_mut(cell: &mut ValueCell) -> Option<&mut Vec<Self>> {
        match cell {
            ValueCell::Int(v) => Some(v),
            _ => None,
        }
    }

    fn into_cell(data: Vec<Self>) -> ValueCell {
        ValueCell::Int(data)
    }
}

impl ObsScalar for f32 {
    const DTYPE: ObsDtype = ObsDtype::Float;

    fn from_cell(cell: &ValueCell) -> Option<&[Self]> {
        match cell {
            ValueCell::Float(v) => Some(v),
            _ => None,
        }
    }

    fn from_cell_mut(cell: &mut ValueCell) -> Option<&mut Vec<Self>> {
        match cell {
            ValueCell::Float(v) => Some(v),
            _ => None,
        }
    }

    fn into_cell(data: Vec<Self>) -> ValueCell {
        ValueCell::Float(data)
    }
}

impl ObsScalar for String {
    const DTYPE: ObsDtype = ObsDtype::String;

    fn from_cell(cell: &ValueCell) -> Option<&[Self]> {
        match cell {
            ValueCell::Str(v) => Some(v),
            _ => None,
        }
    }

    fn from_cell_mut(cell: &mut ValueCell) -> Option<&mut Vec<Self>> {
        match cell {
            ValueCell::Str(v) => Some(v),
            _ => None,
        }
    }

    fn into_cell(data: Vec<Self>) -> ValueCell {
        ValueCell::Str(data)
    }
}

impl ObsScalar for DateTime<Utc> {
    const DTYPE: ObsDtype = ObsDtype::DateTime;

    fn from_cell(cell: &ValueCell) -> Option<&[Self]> {
        match cell {
            ValueCell::DateTime(v) => Some(v),
            _ => None,
        }
    }

    fn from_cell_mut(cell: &mut ValueCell) -> Option<&mut Vec<Self>> {
        match cell {
            ValueCell::DateTime(v) => Some(v),
            _ => None,
        }
    }

    fn into_cell(data: Vec<Self>) -> ValueCell {
        ValueCell::DateTime(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_cell_is_zero_filled() {
        let cell = ValueCell::new(ObsDtype::Float, 3);
        assert_eq!(cell.dtype(), ObsDtype::Float);
        assert_eq!(cell.len(), 3);
        assert_eq!(f32::from_cell(&cell).unwrap(), &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_typed_access_rejects_wrong_tag() {
        let cell = ValueCell::Int(vec![1, 2, 3]);
        assert!(f32::from_cell(&cell).is_none());
        assert!(i32::from_cell(&cell).is_some());
    }

    #[test]
    fn test_append_cell_same_tag() {
        let mut cell = ValueCell::Int(vec![1, 2]);
        assert!(cell.append_cell(&ValueCell::Int(vec![3])));
        assert_eq!(i32::from_cell(&cell).unwrap(), &[1, 2, 3]);
    }

    #[test]
    fn test_append_cell_tag_mismatch() {
        let mut cell = ValueCell::Int(vec![1]);
        assert!(!cell.append_cell(&ValueCell::Float(vec![1.0])));
        assert_eq!(cell.len(), 1);
    }

    #[test]
    fn test_project() {
        let cell = ValueCell::Float(vec![10.0, 11.0, 12.0, 13.0]);
        let picked = cell.project(&[3, 1]);
        assert_eq!(f32::from_cell(&picked).unwrap(), &[13.0, 11.0]);
    }
}
