//! The multi-indexed observation container.
//!
//! Holds heterogeneous variable records keyed by `(group, variable)` and
//! keeps three coexisting projections over them: insertion order, by group
//! and by variable name. Records live in an arena; the indices hold stable
//! arena ids, so inserting into one index never invalidates another.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use tracing::trace;

use crate::dtype::ObsDtype;
use crate::error::{StoreError, StoreResult};
use crate::value::{ObsScalar, ValueCell};

/// Whether a record may be overwritten after creation.
///
/// Records loaded from a file are read-only; records created through the
/// put/store API are read-write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    #[default]
    ReadWrite,
}

/// Creation options for [`ObsSpaceContainer::store_with`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreOptions {
    /// Grow the leading extent instead of overwriting.
    pub append: bool,
    /// Access mode frozen at record creation.
    pub mode: AccessMode,
    /// Whether the leading axis is the locations axis; frozen at creation.
    pub locations_dimensioned: bool,
}

#[derive(Debug)]
struct VarRecord {
    group: String,
    name: String,
    shape: Vec<usize>,
    mode: AccessMode,
    locations_dimensioned: bool,
    cell: ValueCell,
}

impl VarRecord {
    fn label(&self) -> String {
        format!("{} @ {}", self.name, self.group)
    }

    fn row_len(&self) -> usize {
        self.shape[1..].iter().product()
    }
}

/// Read-only view of one record's metadata.
#[derive(Debug, Clone, Copy)]
pub struct RecordView<'a> {
    pub group: &'a str,
    pub variable: &'a str,
    pub shape: &'a [usize],
    pub dtype: ObsDtype,
    pub mode: AccessMode,
    pub locations_dimensioned: bool,
}

/// Insertion-ordered, multi-indexed store of variable records.
#[derive(Debug, Default)]
pub struct ObsSpaceContainer {
    records: Vec<Option<VarRecord>>,
    order: Vec<usize>,
    by_key: HashMap<(String, String), usize>,
    by_group: BTreeMap<String, Vec<usize>>,
    by_variable: BTreeMap<String, Vec<usize>>,
}

impl ObsSpaceContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn has(&self, group: &str, variable: &str) -> bool {
        self.by_key
            .contains_key(&(group.to_string(), variable.to_string()))
    }

    fn record(&self, group: &str, variable: &str) -> StoreResult<&VarRecord> {
        let id = self
            .by_key
            .get(&(group.to_string(), variable.to_string()))
            .ok_or_else(|| StoreError::NotFound {
                name: format!("{} @ {}", variable, group),
            })?;
        Ok(self.records[*id].as_ref().expect("live id in by_key"))
    }

    pub fn dtype_of(&self, group: &str, variable: &str) -> StoreResult<ObsDtype> {
        Ok(self.record(group, variable)?.cell.dtype())
    }

    pub fn shape_of(&self, group: &str, variable: &str) -> StoreResult<Vec<usize>> {
        Ok(self.record(group, variable)?.shape.clone())
    }

    pub fn mode_of(&self, group: &str, variable: &str) -> StoreResult<AccessMode> {
        Ok(self.record(group, variable)?.mode)
    }

    /// Borrow the raw cell of a record. Used by persistence.
    pub fn cell_of(&self, group: &str, variable: &str) -> StoreResult<&ValueCell> {
        Ok(&self.record(group, variable)?.cell)
    }

    /// Store data under `(group, variable)` with read-write access.
    ///
    /// Creates the record on first call. On later calls the tag and the
    /// trailing extents must match; with `append` the leading extent grows,
    /// otherwise the declared shape must equal the stored shape and the
    /// contents are overwritten. The failing call leaves the container
    /// unchanged.
    pub fn store<T: ObsScalar>(
        &mut self,
        group: &str,
        variable: &str,
        shape: &[usize],
        data: &[T],
        append: bool,
    ) -> StoreResult<()> {
        self.store_with(
            group,
            variable,
            shape,
            data,
            StoreOptions {
                append,
                ..Default::default()
            },
        )
    }

    /// Store with full control over creation options.
    pub fn store_with<T: ObsScalar>(
        &mut self,
        group: &str,
        variable: &str,
        shape: &[usize],
        data: &[T],
        opts: StoreOptions,
    ) -> StoreResult<()> {
        let label = format!("{} @ {}", variable, group);
        if shape.is_empty() {
            return Err(StoreError::ShapeMismatch {
                name: label,
                expected: vec![data.len()],
                actual: vec![],
            });
        }
        let row_len: usize = shape[1..].iter().product();
        if row_len == 0 {
            return Err(StoreError::ShapeMismatch {
                name: label,
                expected: vec![],
                actual: shape.to_vec(),
            });
        }

        let key = (group.to_string(), variable.to_string());
        match self.by_key.get(&key).copied() {
            Some(id) => {
                let rec = self.records[id].as_mut().expect("live id in by_key");
                if rec.mode == AccessMode::ReadOnly {
                    return Err(StoreError::ReadOnly { name: label });
                }
                if rec.cell.dtype() != T::DTYPE {
                    return Err(StoreError::TypeMismatch {
                        name: label,
                        requested: T::DTYPE,
                        stored: rec.cell.dtype(),
                    });
                }
                if rec.shape[1..] != shape[1..] {
                    return Err(StoreError::ShapeMismatch {
                        name: label,
                        expected: rec.shape.clone(),
                        actual: shape.to_vec(),
                    });
                }
                if opts.append {
                    if data.len() % row_len != 0 {
                        return Err(StoreError::LengthMismatch {
                            name: label,
                            expected: row_len,
                            actual: data.len(),
                        });
                    }
                    let added = T::into_cell(data.to_vec());
                    rec.cell.append_cell(&added);
                    rec.shape[0] += data.len() / row_len;
                } else {
                    if rec.shape != shape {
                        return Err(StoreError::ShapeMismatch {
                            name: label,
                            expected: rec.shape.clone(),
                            actual: shape.to_vec(),
                        });
                    }
                    let expected: usize = shape.iter().product();
                    if data.len() != expected {
                        return Err(StoreError::LengthMismatch {
                            name: label,
                            expected,
                            actual: data.len(),
                        });
                    }
                    let dst = T::from_cell_mut(&mut rec.cell).expect("tag checked above");
                    dst.clear();
                    dst.extend_from_slice(data);
                }
            }
            None => {
                let stored_shape = if opts.append {
                    if data.len() % row_len != 0 {
                        return Err(StoreError::LengthMismatch {
                            name: label,
                            expected: row_len,
                            actual: data.len(),
                        });
                    }
                    let mut s = shape.to_vec();
                    s[0] = data.len() / row_len;
                    s
                } else {
                    let expected: usize = shape.iter().product();
                    if data.len() != expected {
                        return Err(StoreError::LengthMismatch {
                            name: label,
                            expected,
                            actual: data.len(),
                        });
                    }
                    shape.to_vec()
                };

                let rec = VarRecord {
                    group: group.to_string(),
                    name: variable.to_string(),
                    shape: stored_shape,
                    mode: opts.mode,
                    locations_dimensioned: opts.locations_dimensioned,
                    cell: T::into_cell(data.to_vec()),
                };
                trace!(variable = %rec.label(), dtype = %rec.cell.dtype(), "inserting record");

                let id = self.records.len();
                self.records.push(Some(rec));
                self.order.push(id);
                self.by_key.insert(key, id);
                self.by_group
                    .entry(group.to_string())
                    .or_default()
                    .push(id);
                self.by_variable
                    .entry(variable.to_string())
                    .or_default()
                    .push(id);
            }
        }
        Ok(())
    }

    /// Insert a pre-built cell as a record. Used by ingest.
    pub fn insert_cell(
        &mut self,
        group: &str,
        variable: &str,
        shape: &[usize],
        cell: ValueCell,
        opts: StoreOptions,
    ) -> StoreResult<()> {
        match cell {
            ValueCell::Int(v) => self.store_with(group, variable, shape, &v, opts),
            ValueCell::Float(v) => self.store_with(group, variable, shape, &v, opts),
            ValueCell::Str(v) => self.store_with(group, variable, shape, &v, opts),
            ValueCell::DateTime(v) => self.store_with(group, variable, shape, &v, opts),
        }
    }

    /// Load data from `(group, variable)` along the leading axis.
    ///
    /// `shape` is the declared full shape of the variable and must match the
    /// stored shape. `start`/`count` select rows of the leading axis; a
    /// `count` of `None` reads to the end.
    pub fn load<T: ObsScalar>(
        &self,
        group: &str,
        variable: &str,
        shape: &[usize],
        out: &mut [T],
        start: usize,
        count: Option<usize>,
    ) -> StoreResult<()> {
        let rec = self.record(group, variable)?;
        let label = rec.label();
        if rec.cell.dtype() != T::DTYPE {
            return Err(StoreError::TypeMismatch {
                name: label,
                requested: T::DTYPE,
                stored: rec.cell.dtype(),
            });
        }
        if rec.shape != shape {
            return Err(StoreError::ShapeMismatch {
                name: label,
                expected: rec.shape.clone(),
                actual: shape.to_vec(),
            });
        }
        let rows = rec.shape[0];
        let count = count.unwrap_or_else(|| rows.saturating_sub(start));
        if start + count > rows {
            return Err(StoreError::OutOfRange {
                name: label,
                detail: format!("rows {}..{} exceed extent {}", start, start + count, rows),
            });
        }
        let row_len = rec.row_len();
        if out.len() != count * row_len {
            return Err(StoreError::LengthMismatch {
                name: label,
                expected: count * row_len,
                actual: out.len(),
            });
        }
        let src = T::from_cell(&rec.cell).expect("tag checked above");
        out.clone_from_slice(&src[start * row_len..(start + count) * row_len]);
        Ok(())
    }

    /// Read the whole record as a flat buffer, regardless of rank.
    pub fn load_all<T: ObsScalar>(
        &self,
        group: &str,
        variable: &str,
        out: &mut [T],
    ) -> StoreResult<()> {
        let rec = self.record(group, variable)?;
        if rec.cell.dtype() != T::DTYPE {
            return Err(StoreError::TypeMismatch {
                name: rec.label(),
                requested: T::DTYPE,
                stored: rec.cell.dtype(),
            });
        }
        if out.len() != rec.cell.len() {
            return Err(StoreError::LengthMismatch {
                name: rec.label(),
                expected: rec.cell.len(),
                actual: out.len(),
            });
        }
        let src = T::from_cell(&rec.cell).expect("tag checked above");
        out.clone_from_slice(src);
        Ok(())
    }

    /// Remove a record. The surviving records keep their iteration order.
    pub fn remove(&mut self, group: &str, variable: &str) -> StoreResult<()> {
        let key = (group.to_string(), variable.to_string());
        let id = self.by_key.remove(&key).ok_or_else(|| StoreError::NotFound {
            name: format!("{} @ {}", variable, group),
        })?;
        self.records[id] = None;
        self.order.retain(|&x| x != id);
        if let Some(ids) = self.by_group.get_mut(group) {
            ids.retain(|&x| x != id);
            if ids.is_empty() {
                self.by_group.remove(group);
            }
        }
        if let Some(ids) = self.by_variable.get_mut(variable) {
            ids.retain(|&x| x != id);
            if ids.is_empty() {
                self.by_variable.remove(variable);
            }
        }
        Ok(())
    }

    fn view(&self, id: usize) -> RecordView<'_> {
        let rec = self.records[id].as_ref().expect("live id in index");
        RecordView {
            group: &rec.group,
            variable: &rec.name,
            shape: &rec.shape,
            dtype: rec.cell.dtype(),
            mode: rec.mode,
            locations_dimensioned: rec.locations_dimensioned,
        }
    }

    /// Records in the order they were first inserted.
    pub fn by_insertion(&self) -> impl Iterator<Item = RecordView<'_>> + '_ {
        self.order.iter().map(|&id| self.view(id))
    }

    /// Records ordered by group name, insertion order within each group.
    pub fn by_group(&self) -> impl Iterator<Item = RecordView<'_>> + '_ {
        self.by_group
            .values()
            .flat_map(|ids| ids.iter())
            .map(|&id| self.view(id))
    }

    /// Records ordered by variable name alphabetically.
    pub fn by_variable(&self) -> impl Iterator<Item = RecordView<'_>> + '_ {
        self.by_variable
            .values()
            .flat_map(|ids| ids.iter())
            .map(|&id| self.view(id))
    }
}

impl fmt::Display for ObsSpaceContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ObsSpace multi-index container")?;
        for view in self.by_variable() {
            writeln!(f, "{} @ {}", view.variable, view.group)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_and_load_roundtrip() {
        let mut c = ObsSpaceContainer::new();
        c.store("ObsValue", "t", &[3], &[1.0f32, 2.0, 3.0], false)
            .unwrap();

        let mut out = vec![0.0f32; 3];
        c.load("ObsValue", "t", &[3], &mut out, 0, None).unwrap();
        assert_eq!(out, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_type_immutable_after_first_store() {
        let mut c = ObsSpaceContainer::new();
        c.store("MetaData", "n", &[2], &[1i32, 2], false).unwrap();

        let err = c
            .store("MetaData", "n", &[2], &[1.0f32, 2.0], false)
            .unwrap_err();
        assert!(matches!(err, StoreError::TypeMismatch { .. }));

        // Failed store leaves the record untouched.
        let mut out = vec![0i32; 2];
        c.load("MetaData", "n", &[2], &mut out, 0, None).unwrap();
        assert_eq!(out, vec![1, 2]);
    }

    #[test]
    fn test_append_grows_leading_extent() {
        let mut c = ObsSpaceContainer::new();
        c.store("ObsValue", "q", &[5], &[1.0f32, 2.0], true).unwrap();
        c.store("ObsValue", "q", &[5], &[3.0f32], true).unwrap();
        c.store("ObsValue", "q", &[5], &[4.0f32, 5.0], true).unwrap();

        assert_eq!(c.shape_of("ObsValue", "q").unwrap(), vec![5]);
        let mut out = vec![0.0f32; 5];
        c.load("ObsValue", "q", &[5], &mut out, 0, None).unwrap();
        assert_eq!(out, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_partial_load_along_leading_axis() {
        let mut c = ObsSpaceContainer::new();
        c.store("g", "v", &[5], &[10i32, 11, 12, 13, 14], false)
            .unwrap();

        let mut out = vec![0i32; 2];
        c.load("g", "v", &[5], &mut out, 3, Some(2)).unwrap();
        assert_eq!(out, vec![13, 14]);

        let mut out = vec![0i32; 2];
        assert!(matches!(
            c.load("g", "v", &[5], &mut out, 4, Some(2)),
            Err(StoreError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_insertion_order_stable_across_updates() {
        let mut c = ObsSpaceContainer::new();
        c.store("g", "b", &[1], &[1i32], false).unwrap();
        c.store("g", "a", &[1], &[1i32], false).unwrap();
        c.store("h", "c", &[1], &[1i32], false).unwrap();

        // Updating and appending must not re-insert.
        c.store("g", "b", &[1], &[2i32], false).unwrap();
        c.store("g", "a", &[1], &[9i32], true).unwrap();

        let names: Vec<_> = c.by_insertion().map(|v| v.variable.to_string()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_by_group_and_by_variable_orders() {
        let mut c = ObsSpaceContainer::new();
        c.store("ObsValue", "zz", &[1], &[1i32], false).unwrap();
        c.store("MetaData", "mm", &[1], &[1i32], false).unwrap();
        c.store("ObsValue", "aa", &[1], &[1i32], false).unwrap();

        let by_group: Vec<_> = c
            .by_group()
            .map(|v| format!("{}/{}", v.group, v.variable))
            .collect();
        assert_eq!(by_group, vec!["MetaData/mm", "ObsValue/zz", "ObsValue/aa"]);

        let by_var: Vec<_> = c.by_variable().map(|v| v.variable.to_string()).collect();
        assert_eq!(by_var, vec!["aa", "mm", "zz"]);
    }

    #[test]
    fn test_remove_preserves_other_indices() {
        let mut c = ObsSpaceContainer::new();
        c.store("g", "a", &[1], &[1i32], false).unwrap();
        c.store("g", "b", &[1], &[1i32], false).unwrap();
        c.store("g", "c", &[1], &[1i32], false).unwrap();

        c.remove("g", "b").unwrap();
        assert!(!c.has("g", "b"));
        assert_eq!(c.len(), 2);

        let names: Vec<_> = c.by_insertion().map(|v| v.variable.to_string()).collect();
        assert_eq!(names, vec!["a", "c"]);
    }

    #[test]
    fn test_read_only_record_rejects_store() {
        let mut c = ObsSpaceContainer::new();
        c.store_with(
            "ObsValue",
            "t",
            &[2],
            &[1.0f32, 2.0],
            StoreOptions {
                mode: AccessMode::ReadOnly,
                ..Default::default()
            },
        )
        .unwrap();

        let err = c
            .store("ObsValue", "t", &[2], &[9.0f32, 9.0], false)
            .unwrap_err();
        assert!(matches!(err, StoreError::ReadOnly { .. }));
    }

    #[test]
    fn test_shape_mismatch_on_overwrite() {
        let mut c = ObsSpaceContainer::new();
        c.store("g", "v", &[4], &[1i32, 2, 3, 4], false).unwrap();
        let err = c.store("g", "v", &[3], &[1i32, 2, 3], false).unwrap_err();
        assert!(matches!(err, StoreError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_display_lists_by_variable() {
        let mut c = ObsSpaceContainer::new();
        c.store("ObsValue", "b", &[1], &[1i32], false).unwrap();
        c.store("MetaData", "a", &[1], &[1i32], false).unwrap();
        let text = c.to_string();
        let a = text.find("a @ MetaData").unwrap();
        let b = text.find("b @ ObsValue").unwrap();
        assert!(a < b);
    }
}
