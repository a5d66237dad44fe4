//! Hierarchical group tree.
//!
//! Groups form a tree rooted at `/`. Each node owns its child groups, its
//! variables and its attributes. Paths are relative, `/`-separated; empty
//! segments and `.`/`..` are rejected.

use std::collections::BTreeMap;

use crate::attribute::AttributeStore;
use crate::error::{StoreError, StoreResult};
use crate::variable::VariableStore;

/// One node of the group tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObsGroup {
    name: String,
    children: BTreeMap<String, ObsGroup>,
    vars: VariableStore,
    attrs: AttributeStore,
}

impl ObsGroup {
    /// The root group.
    pub fn root() -> Self {
        ObsGroup {
            name: "/".to_string(),
            ..Default::default()
        }
    }

    fn child(name: &str) -> Self {
        ObsGroup {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Open an existing descendant group.
    pub fn open(&self, path: &str) -> StoreResult<&ObsGroup> {
        let mut node = self;
        for segment in split_path(path)? {
            node = node.children.get(segment).ok_or_else(|| StoreError::NotFound {
                name: path.to_string(),
            })?;
        }
        Ok(node)
    }

    pub fn open_mut(&mut self, path: &str) -> StoreResult<&mut ObsGroup> {
        let mut node = self;
        for segment in split_path(path)? {
            node = node
                .children
                .get_mut(segment)
                .ok_or_else(|| StoreError::NotFound {
                    name: path.to_string(),
                })?;
        }
        Ok(node)
    }

    /// Create a descendant group, creating intermediate groups as needed.
    /// Opening an already-existing path is not an error.
    pub fn create(&mut self, path: &str) -> StoreResult<&mut ObsGroup> {
        let mut node = self;
        for segment in split_path(path)? {
            node = node
                .children
                .entry(segment.to_string())
                .or_insert_with(|| ObsGroup::child(segment));
        }
        Ok(node)
    }

    pub fn exists(&self, path: &str) -> bool {
        self.open(path).is_ok()
    }

    /// Names of the immediate child groups, sorted.
    pub fn list(&self) -> Vec<String> {
        self.children.keys().cloned().collect()
    }

    pub fn vars(&self) -> &VariableStore {
        &self.vars
    }

    pub fn vars_mut(&mut self) -> &mut VariableStore {
        &mut self.vars
    }

    pub fn attrs(&self) -> &AttributeStore {
        &self.attrs
    }

    pub fn attrs_mut(&mut self) -> &mut AttributeStore {
        &mut self.attrs
    }
}

/// Split a relative path into validated segments.
fn split_path(path: &str) -> StoreResult<Vec<&str>> {
    if path.is_empty() {
        return Err(StoreError::InvalidName {
            name: path.to_string(),
        });
    }
    let mut segments = Vec::new();
    for segment in path.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(StoreError::InvalidName {
                name: path.to_string(),
            });
        }
        segments.push(segment);
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::ObsDtype;

    #[test]
    fn test_create_and_open_nested() {
        let mut root = ObsGroup::root();
        root.create("MetaData/station").unwrap();
        assert!(root.exists("MetaData"));
        assert!(root.exists("MetaData/station"));
        assert_eq!(root.open("MetaData").unwrap().list(), vec!["station"]);
    }

    #[test]
    fn test_open_missing_group() {
        let root = ObsGroup::root();
        assert!(matches!(
            root.open("ObsValue"),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn test_rejects_bad_segments() {
        let mut root = ObsGroup::root();
        assert!(root.create("").is_err());
        assert!(root.create("a//b").is_err());
        assert!(root.create("a/./b").is_err());
        assert!(root.create("../b").is_err());
    }

    #[test]
    fn test_group_owns_vars_and_attrs() {
        let mut root = ObsGroup::root();
        let grp = root.create("ObsValue").unwrap();
        grp.vars_mut()
            .create("air_temperature", ObsDtype::Float, &[4], None)
            .unwrap();
        grp.attrs_mut()
            .create("units", ObsDtype::String, &[1])
            .unwrap();

        let grp = root.open("ObsValue").unwrap();
        assert!(grp.vars().exists("air_temperature"));
        assert!(grp.attrs().exists("units"));
    }
}
