//! In-memory typed observation store.
//!
//! Provides the building blocks of the observational-data access layer:
//! - Tagged value cells holding one typed array each
//! - Attribute and variable stores with create/open/rename management
//! - A hierarchical group tree
//! - The multi-indexed container that backs an ObsSpace

pub mod attribute;
pub mod container;
pub mod dtype;
pub mod error;
pub mod group;
pub mod selection;
pub mod value;
pub mod variable;

pub use attribute::{Attribute, AttributeStore};
pub use container::{AccessMode, ObsSpaceContainer, RecordView, StoreOptions};
pub use dtype::{ObsDtype, MISSING_FLOAT};
pub use error::{StoreError, StoreResult};
pub use group::ObsGroup;
pub use selection::{DimRange, Selection};
pub use value::{ObsScalar, ValueCell};
pub use variable::{Variable, VariableStore};
