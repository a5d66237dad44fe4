//! Primitive type tags for observation data.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The four primitive types an observation store can hold.
///
/// All other numeric widths encountered on disk are coerced to these on
/// ingest; in particular, doubles are downcast to single precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObsDtype {
    /// Signed 32-bit integer
    Int,
    /// 32-bit float
    Float,
    /// Variable-length string
    String,
    /// Broken-down UTC timestamp
    DateTime,
}

impl ObsDtype {
    pub fn name(&self) -> &'static str {
        match self {
            ObsDtype::Int => "int",
            ObsDtype::Float => "float",
            ObsDtype::String => "string",
            ObsDtype::DateTime => "datetime",
        }
    }
}

impl fmt::Display for ObsDtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Sentinel substituted for float values flagged as missing on ingest.
pub const MISSING_FLOAT: f32 = f32::MIN * 0.99;
