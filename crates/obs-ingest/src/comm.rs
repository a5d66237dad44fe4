//! Handle onto the process group running the ingest.
//!
//! The message-passing transport itself lives outside this crate; the core
//! only needs to know its own rank and the total number of ranks, and every
//! rank must construct distributions from the same values.

use crate::error::{IngestError, IngestResult};

/// Rank and size of the communicator this process belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Comm {
    rank: usize,
    size: usize,
}

impl Comm {
    pub fn new(rank: usize, size: usize) -> IngestResult<Self> {
        if size == 0 || rank >= size {
            return Err(IngestError::InvalidConfig(format!(
                "invalid communicator: rank {} of {}",
                rank, size
            )));
        }
        Ok(Comm { rank, size })
    }

    /// A single-process communicator.
    pub fn single() -> Self {
        Comm { rank: 0, size: 1 }
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn size(&self) -> usize {
        self.size
    }
}
