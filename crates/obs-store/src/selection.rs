//! Hyperslab selections for partial variable I/O.

use crate::error::{StoreError, StoreResult};

/// A `(start, count)` pair along one dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DimRange {
    pub start: usize,
    pub count: usize,
}

/// An ordered list of per-dimension ranges describing a hyperslab.
///
/// The rank of the selection must equal the rank of the variable it is
/// applied to. Elements are addressed in row-major order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    ranges: Vec<DimRange>,
}

impl Selection {
    pub fn new(ranges: &[(usize, usize)]) -> Self {
        Selection {
            ranges: ranges
                .iter()
                .map(|&(start, count)| DimRange { start, count })
                .collect(),
        }
    }

    /// Selection covering an entire shape.
    pub fn whole(shape: &[usize]) -> Self {
        Selection {
            ranges: shape.iter().map(|&n| DimRange { start: 0, count: n }).collect(),
        }
    }

    /// Partial leading dimension, full trailing dimensions.
    pub fn leading(start: usize, count: usize, shape: &[usize]) -> Self {
        let mut ranges = vec![DimRange { start, count }];
        ranges.extend(shape[1..].iter().map(|&n| DimRange { start: 0, count: n }));
        Selection { ranges }
    }

    pub fn rank(&self) -> usize {
        self.ranges.len()
    }

    pub fn ranges(&self) -> &[DimRange] {
        &self.ranges
    }

    /// Number of elements the selection addresses.
    pub fn element_count(&self) -> usize {
        self.ranges.iter().map(|r| r.count).product()
    }

    /// Check the selection against a variable shape.
    pub fn validate(&self, name: &str, shape: &[usize]) -> StoreResult<()> {
        if self.ranges.len() != shape.len() {
            return Err(StoreError::OutOfRange {
                name: name.to_string(),
                detail: format!(
                    "selection rank {} does not match variable rank {}",
                    self.ranges.len(),
                    shape.len()
                ),
            });
        }
        for (dim, (range, &extent)) in self.ranges.iter().zip(shape).enumerate() {
            if range.start + range.count > extent {
                return Err(StoreError::OutOfRange {
                    name: name.to_string(),
                    detail: format!(
                        "dimension {}: {}..{} exceeds extent {}",
                        dim,
                        range.start,
                        range.start + range.count,
                        extent
                    ),
                });
            }
        }
        Ok(())
    }

    /// Decompose the selection into row-major contiguous runs.
    ///
    /// Each `(offset, len)` pair addresses `len` consecutive elements of the
    /// flat variable buffer starting at `offset`. Runs are yielded in the
    /// order the selection's elements are laid out.
    pub fn runs(&self, shape: &[usize]) -> Vec<(usize, usize)> {
        if self.ranges.is_empty() {
            return vec![(0, 1)];
        }

        let mut strides = vec![1usize; shape.len()];
        for dim in (0..shape.len().saturating_sub(1)).rev() {
            strides[dim] = strides[dim + 1] * shape[dim + 1];
        }

        let last = self.ranges.len() - 1;
        let run_len = self.ranges[last].count;
        let outer = &self.ranges[..last];

        let mut runs = Vec::new();
        let mut idx: Vec<usize> = outer.iter().map(|r| r.start).collect();
        loop {
            let base: usize = idx
                .iter()
                .zip(&strides[..last])
                .map(|(&i, &s)| i * s)
                .sum::<usize>()
                + self.ranges[last].start;
            runs.push((base, run_len));

            let mut dim = outer.len();
            loop {
                if dim == 0 {
                    return runs;
                }
                dim -= 1;
                idx[dim] += 1;
                if idx[dim] < outer[dim].start + outer[dim].count {
                    break;
                }
                idx[dim] = outer[dim].start;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whole_selection() {
        let sel = Selection::whole(&[4, 3]);
        assert_eq!(sel.element_count(), 12);
        assert_eq!(sel.runs(&[4, 3]), vec![(0, 3), (3, 3), (6, 3), (9, 3)]);
    }

    #[test]
    fn test_leading_selection_rank1() {
        let sel = Selection::leading(2, 3, &[10]);
        assert!(sel.validate("v", &[10]).is_ok());
        assert_eq!(sel.runs(&[10]), vec![(2, 3)]);
    }

    #[test]
    fn test_inner_hyperslab_runs() {
        // 4x5 variable, rows 1..3, cols 2..4
        let sel = Selection::new(&[(1, 2), (2, 2)]);
        assert_eq!(sel.runs(&[4, 5]), vec![(7, 2), (12, 2)]);
    }

    #[test]
    fn test_validate_out_of_range() {
        let sel = Selection::new(&[(8, 3)]);
        assert!(matches!(
            sel.validate("v", &[10]),
            Err(StoreError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_validate_rank_mismatch() {
        let sel = Selection::new(&[(0, 2)]);
        assert!(sel.validate("v", &[4, 3]).is_err());
    }
}
