//! Region model: partition cells paired with their probability columns.

use crate::matrix::TransitionMatrices;
use mart_core::{MartError, ProbBound, Result, PROB_TOLERANCE};
use mart_geom::Hyperrectangle;

/// One sparse probability column of logical length N+1; index N is the
/// unsafe tail. Entries absent from `indices` are the zero bound.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseColumn {
    len: usize,
    indices: Vec<usize>,
    lower: Vec<f64>,
    upper: Vec<f64>,
}

impl SparseColumn {
    /// Build from sorted (index, bound) pairs.
    pub fn from_entries(len: usize, entries: &[(usize, ProbBound)]) -> Result<Self> {
        let mut indices = Vec::with_capacity(entries.len());
        let mut lower = Vec::with_capacity(entries.len());
        let mut upper = Vec::with_capacity(entries.len());
        let mut prev: Option<usize> = None;
        for &(idx, bound) in entries {
            if idx >= len {
                return Err(MartError::shape_mismatch(vec![len], vec![idx + 1]));
            }
            if let Some(p) = prev {
                if idx <= p {
                    return Err(MartError::InvalidRegion(format!(
                        "unsorted probability column: index {idx} after {p}"
                    )));
                }
            }
            prev = Some(idx);
            indices.push(idx);
            lower.push(bound.lower);
            upper.push(bound.upper);
        }
        Ok(Self {
            len,
            indices,
            lower,
            upper,
        })
    }

    /// Logical length (number of regions + 1).
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    /// Bound at a logical index; absent entries are zero.
    pub fn get(&self, idx: usize) -> ProbBound {
        debug_assert!(idx < self.len);
        match self.indices.binary_search(&idx) {
            Ok(pos) => ProbBound::new(self.lower[pos].min(self.upper[pos]), self.upper[pos]),
            Err(_) => ProbBound::zero(),
        }
    }

    /// Bound of the unsafe tail (logical index N).
    pub fn tail(&self) -> ProbBound {
        self.get(self.len - 1)
    }

    /// Iterate stored entries as (index, bound).
    pub fn iter(&self) -> impl Iterator<Item = (usize, ProbBound)> + '_ {
        self.indices
            .iter()
            .zip(self.lower.iter().zip(self.upper.iter()))
            .map(|(&i, (&l, &u))| (i, ProbBound::new(l.min(u), u)))
    }

    pub fn sum_lower(&self) -> f64 {
        self.lower.iter().sum()
    }

    pub fn sum_upper(&self) -> f64 {
        self.upper.iter().sum()
    }

    /// Check the probability-column invariants within `tol`.
    pub fn validate(&self, tol: f64) -> Result<()> {
        for (pos, &idx) in self.indices.iter().enumerate() {
            let (l, u) = (self.lower[pos], self.upper[pos]);
            if l < -tol || u > 1.0 + tol || l > u + tol {
                return Err(MartError::InvariantViolation(format!(
                    "entry {idx}: bound [{l}, {u}] is not a probability interval"
                )));
            }
        }
        let sl = self.sum_lower();
        if sl > 1.0 + tol {
            return Err(MartError::InvariantViolation(format!(
                "joint lower bound {sl} exceeds 1"
            )));
        }
        let su = self.sum_upper();
        if su < 1.0 - tol {
            return Err(MartError::InvariantViolation(format!(
                "joint upper bound {su} below 1"
            )));
        }
        Ok(())
    }
}

/// A partition cell together with its outgoing probability bounds.
///
/// Owns its region and both probability vectors; synthesis backends borrow
/// it read-only and reconstruct (never mutate) when sharpening interiors.
#[derive(Debug, Clone)]
pub struct RegionWithProbabilities {
    region: Hyperrectangle,
    column: SparseColumn,
}

impl RegionWithProbabilities {
    pub fn new(region: Hyperrectangle, column: SparseColumn) -> Result<Self> {
        column.validate(PROB_TOLERANCE)?;
        Ok(Self { region, column })
    }

    #[inline]
    pub fn region(&self) -> &Hyperrectangle {
        &self.region
    }

    #[inline]
    pub fn probabilities(&self) -> &SparseColumn {
        &self.column
    }

    /// Indices of regions reachable with positive upper probability.
    /// Neighbor lookup is recovered from the sparse column; no
    /// back-references are stored.
    pub fn neighbors(&self) -> impl Iterator<Item = usize> + '_ {
        let tail = self.column.len() - 1;
        self.column
            .iter()
            .filter(move |&(i, b)| i != tail && b.upper > 0.0)
            .map(|(i, _)| i)
    }
}

/// Pair partition cells with the columns of computed transition matrices.
pub fn attach_probabilities(
    partitions: &[Hyperrectangle],
    matrices: &TransitionMatrices,
) -> Result<Vec<RegionWithProbabilities>> {
    let n = partitions.len();
    if matrices.num_regions() != n {
        return Err(MartError::shape_mismatch(vec![n], vec![matrices.num_regions()]));
    }
    let len = n + 1;
    partitions
        .iter()
        .enumerate()
        .map(|(j, cell)| {
            let mut entries: Vec<(usize, ProbBound)> = Vec::new();
            // Merge lower and upper storage; upper == 0 implies lower == 0,
            // so the upper pattern covers every stored entry.
            for (row, upper) in matrices.upper.column(j) {
                let lower = matrices.lower.get(row, j);
                entries.push((row, ProbBound::new(lower.min(upper), upper)));
            }
            let column = SparseColumn::from_entries(len, &entries)?;
            RegionWithProbabilities::new(cell.clone(), column)
        })
        .collect()
}

/// Reconstruct regions with sharpened probability interiors.
///
/// Each new column must refine the old one; intervals are intersected so a
/// sloppy caller cannot widen a certified bound.
pub fn update_regions(
    regions: &[RegionWithProbabilities],
    sharpened: &[SparseColumn],
) -> Result<Vec<RegionWithProbabilities>> {
    if regions.len() != sharpened.len() {
        return Err(MartError::shape_mismatch(
            vec![regions.len()],
            vec![sharpened.len()],
        ));
    }
    regions
        .iter()
        .zip(sharpened.iter())
        .map(|(r, new_col)| {
            if new_col.len() != r.column.len() {
                return Err(MartError::shape_mismatch(
                    vec![r.column.len()],
                    vec![new_col.len()],
                ));
            }
            let entries: Vec<(usize, ProbBound)> = r
                .column
                .iter()
                .map(|(idx, old)| {
                    let refined = new_col
                        .get(idx)
                        .intersect(&old)
                        .unwrap_or(old);
                    (idx, refined)
                })
                .collect();
            let column = SparseColumn::from_entries(new_col.len(), &entries)?;
            RegionWithProbabilities::new(r.region.clone(), column)
        })
        .collect()
}
