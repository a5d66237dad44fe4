//! Distribution policies: which global location indices each rank owns.
//!
//! Every policy yields a deterministic partition of `0..nlocs` given the
//! same communicator and inputs, so cooperating ranks agree on ownership
//! without talking to each other. Erasure preserves the order of the
//! surviving indices.

use tracing::trace;

use crate::comm::Comm;
use crate::error::{IngestError, IngestResult};

/// Contract every distribution policy satisfies.
///
/// The owned index sets of all ranks partition `0..nlocs`. Whether indices
/// of one record are kept on a single rank is policy-dependent and declared
/// through [`Distribution::is_record_atomic`].
pub trait Distribution {
    fn name(&self) -> &'static str;

    /// True when all indices of one record land on the same rank.
    fn is_record_atomic(&self) -> bool;

    /// Owned global indices, ascending at construction, order preserved
    /// across erasure.
    fn index(&self) -> &[usize];

    fn size(&self) -> usize {
        self.index().len()
    }

    /// Drop one global index from the owned set.
    fn erase(&mut self, global_index: usize);
}

/// Round-robin distribution.
///
/// Assigns record `k` to rank `k mod size`; when no record grouping is
/// given each index is its own record. Ties within a rank keep ascending
/// global index order.
#[derive(Debug)]
pub struct RoundRobin {
    indices: Vec<usize>,
    record_atomic: bool,
}

impl RoundRobin {
    pub fn new(comm: Comm, nlocs: usize) -> Self {
        let indices = (0..nlocs).filter(|i| i % comm.size() == comm.rank()).collect();
        RoundRobin {
            indices,
            record_atomic: false,
        }
    }

    /// Distribute whole records: `records[i]` is the record id of global
    /// index `i`, and every index of one record goes to the same rank.
    pub fn with_records(comm: Comm, nlocs: usize, records: &[usize]) -> IngestResult<Self> {
        if records.len() != nlocs {
            return Err(IngestError::InvalidConfig(format!(
                "record grouping vector has length {} but there are {} locations",
                records.len(),
                nlocs
            )));
        }
        let indices = (0..nlocs)
            .filter(|&i| records[i] % comm.size() == comm.rank())
            .collect();
        Ok(RoundRobin {
            indices,
            record_atomic: true,
        })
    }
}

impl Distribution for RoundRobin {
    fn name(&self) -> &'static str {
        "roundrobin"
    }

    fn is_record_atomic(&self) -> bool {
        self.record_atomic
    }

    fn index(&self) -> &[usize] {
        &self.indices
    }

    fn erase(&mut self, global_index: usize) {
        self.indices.retain(|&i| i != global_index);
    }
}

/// Contiguous equal-sized blocks per rank.
///
/// The first `nlocs mod size` ranks get one extra index. Does not honor
/// record atomicity.
#[derive(Debug)]
pub struct EvenChunk {
    indices: Vec<usize>,
}

impl EvenChunk {
    pub fn new(comm: Comm, nlocs: usize) -> Self {
        let base = nlocs / comm.size();
        let extra = nlocs % comm.size();
        let start = comm.rank() * base + comm.rank().min(extra);
        let count = base + usize::from(comm.rank() < extra);
        EvenChunk {
            indices: (start..start + count).collect(),
        }
    }
}

impl Distribution for EvenChunk {
    fn name(&self) -> &'static str {
        "evenchunk"
    }

    fn is_record_atomic(&self) -> bool {
        false
    }

    fn index(&self) -> &[usize] {
        &self.indices
    }

    fn erase(&mut self, global_index: usize) {
        self.indices.retain(|&i| i != global_index);
    }
}

pub fn is_known_distribution(name: &str) -> bool {
    matches!(name, "roundrobin" | "evenchunk")
}

/// Build the distribution selected by name.
pub fn create_distribution(
    name: &str,
    comm: Comm,
    nlocs: usize,
    records: Option<&[usize]>,
) -> IngestResult<Box<dyn Distribution>> {
    trace!(distribution = name, nlocs, rank = comm.rank(), size = comm.size(), "creating distribution");
    match name {
        "roundrobin" => match records {
            Some(groups) => Ok(Box::new(RoundRobin::with_records(comm, nlocs, groups)?)),
            None => Ok(Box::new(RoundRobin::new(comm, nlocs))),
        },
        "evenchunk" => Ok(Box::new(EvenChunk::new(comm, nlocs))),
        other => Err(IngestError::InvalidConfig(format!(
            "unknown distribution: '{}'",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owned(name: &str, rank: usize, size: usize, nlocs: usize) -> Vec<usize> {
        let comm = Comm::new(rank, size).unwrap();
        create_distribution(name, comm, nlocs, None)
            .unwrap()
            .index()
            .to_vec()
    }

    #[test]
    fn test_round_robin_three_ranks() {
        // 9 locations over 3 ranks, no record grouping.
        assert_eq!(owned("roundrobin", 0, 3, 9), vec![0, 3, 6]);
        assert_eq!(owned("roundrobin", 1, 3, 9), vec![1, 4, 7]);
        assert_eq!(owned("roundrobin", 2, 3, 9), vec![2, 5, 8]);
    }

    #[test]
    fn test_round_robin_partitions() {
        let nlocs = 13;
        let size = 4;
        let mut seen = vec![false; nlocs];
        for rank in 0..size {
            for i in owned("roundrobin", rank, size, nlocs) {
                assert!(!seen[i], "index {} owned twice", i);
                seen[i] = true;
            }
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn test_round_robin_record_atomicity() {
        // 10 locations, records [0,0,0,1,1,2,2,2,2,3], 2 ranks.
        let groups = [0, 0, 0, 1, 1, 2, 2, 2, 2, 3];
        let d0 = RoundRobin::with_records(Comm::new(0, 2).unwrap(), 10, &groups).unwrap();
        let d1 = RoundRobin::with_records(Comm::new(1, 2).unwrap(), 10, &groups).unwrap();

        assert_eq!(d0.index(), &[0, 1, 2, 5, 6, 7, 8]);
        assert_eq!(d1.index(), &[3, 4, 9]);
        assert!(d0.is_record_atomic());
    }

    #[test]
    fn test_record_vector_length_checked() {
        let comm = Comm::single();
        assert!(RoundRobin::with_records(comm, 5, &[0, 1]).is_err());
    }

    #[test]
    fn test_erase_preserves_order() {
        let mut dist = RoundRobin::new(Comm::new(1, 3).unwrap(), 10);
        assert_eq!(dist.index(), &[1, 4, 7]);
        dist.erase(4);
        assert_eq!(dist.index(), &[1, 7]);
        // Erasing an index this rank does not own is a no-op.
        dist.erase(2);
        assert_eq!(dist.index(), &[1, 7]);
    }

    #[test]
    fn test_even_chunk_blocks() {
        assert_eq!(owned("evenchunk", 0, 3, 10), vec![0, 1, 2, 3]);
        assert_eq!(owned("evenchunk", 1, 3, 10), vec![4, 5, 6]);
        assert_eq!(owned("evenchunk", 2, 3, 10), vec![7, 8, 9]);
    }

    #[test]
    fn test_even_chunk_partitions() {
        let nlocs = 11;
        let size = 4;
        let mut all = Vec::new();
        for rank in 0..size {
            all.extend(owned("evenchunk", rank, size, nlocs));
        }
        all.sort_unstable();
        assert_eq!(all, (0..nlocs).collect::<Vec<_>>());
    }

    #[test]
    fn test_unknown_policy() {
        let err = create_distribution("scatter", Comm::single(), 4, None).unwrap_err();
        assert!(matches!(err, IngestError::InvalidConfig(_)));
    }
}
