//! Sparse column-compressed probability matrices.
//!
//! Shape is (N+1) × N: column j holds the bounds out of source region j,
//! rows 0..N are target regions and row N is the unsafe tail. Columns are
//! built independently (one per worker) and assembled once.

use mart_core::{MartError, ProbBound, Result};

/// Minimal column-compressed sparse matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct CscMatrix {
    nrows: usize,
    ncols: usize,
    col_ptr: Vec<usize>,
    row_idx: Vec<usize>,
    values: Vec<f64>,
}

impl CscMatrix {
    /// Assemble from per-column (row, value) lists. Rows within a column
    /// must be strictly increasing.
    pub fn from_columns(nrows: usize, columns: &[Vec<(usize, f64)>]) -> Result<Self> {
        let ncols = columns.len();
        let nnz = columns.iter().map(Vec::len).sum();
        let mut col_ptr = Vec::with_capacity(ncols + 1);
        let mut row_idx = Vec::with_capacity(nnz);
        let mut values = Vec::with_capacity(nnz);
        col_ptr.push(0);
        for column in columns {
            let mut prev: Option<usize> = None;
            for &(row, value) in column {
                if row >= nrows {
                    return Err(MartError::shape_mismatch(vec![nrows], vec![row + 1]));
                }
                if let Some(p) = prev {
                    if row <= p {
                        return Err(MartError::InvalidRegion(format!(
                            "unsorted sparse column: row {row} after {p}"
                        )));
                    }
                }
                prev = Some(row);
                row_idx.push(row);
                values.push(value);
            }
            col_ptr.push(row_idx.len());
        }
        Ok(Self {
            nrows,
            ncols,
            col_ptr,
            row_idx,
            values,
        })
    }

    #[inline]
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    #[inline]
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    #[inline]
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Stored-entry fraction of the full matrix.
    pub fn density(&self) -> f64 {
        if self.nrows == 0 || self.ncols == 0 {
            return 0.0;
        }
        self.nnz() as f64 / (self.nrows * self.ncols) as f64
    }

    /// Entry lookup; absent entries are 0.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        debug_assert!(row < self.nrows && col < self.ncols);
        let lo = self.col_ptr[col];
        let hi = self.col_ptr[col + 1];
        match self.row_idx[lo..hi].binary_search(&row) {
            Ok(pos) => self.values[lo + pos],
            Err(_) => 0.0,
        }
    }

    /// Iterate the stored entries of one column as (row, value).
    pub fn column(&self, col: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let lo = self.col_ptr[col];
        let hi = self.col_ptr[col + 1];
        self.row_idx[lo..hi]
            .iter()
            .copied()
            .zip(self.values[lo..hi].iter().copied())
    }

    /// Sum of one column's stored entries.
    pub fn column_sum(&self, col: usize) -> f64 {
        self.column(col).map(|(_, v)| v).sum()
    }
}

/// Paired lower/upper transition-probability matrices, (N+1) × N.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionMatrices {
    pub lower: CscMatrix,
    pub upper: CscMatrix,
}

impl TransitionMatrices {
    /// Assemble from per-source-region bound columns.
    pub fn from_bound_columns(
        num_regions: usize,
        columns: &[Vec<(usize, ProbBound)>],
    ) -> Result<Self> {
        if columns.len() != num_regions {
            return Err(MartError::shape_mismatch(
                vec![num_regions],
                vec![columns.len()],
            ));
        }
        let nrows = num_regions + 1;
        let lower_cols: Vec<Vec<(usize, f64)>> = columns
            .iter()
            .map(|col| {
                col.iter()
                    .filter(|(_, b)| b.lower > 0.0)
                    .map(|&(row, b)| (row, b.lower))
                    .collect()
            })
            .collect();
        let upper_cols: Vec<Vec<(usize, f64)>> = columns
            .iter()
            .map(|col| {
                col.iter()
                    .filter(|(_, b)| b.upper > 0.0)
                    .map(|&(row, b)| (row, b.upper))
                    .collect()
            })
            .collect();
        Ok(Self {
            lower: CscMatrix::from_columns(nrows, &lower_cols)?,
            upper: CscMatrix::from_columns(nrows, &upper_cols)?,
        })
    }

    #[inline]
    pub fn num_regions(&self) -> usize {
        self.upper.ncols()
    }

    /// Logical row index of the unsafe tail.
    #[inline]
    pub fn unsafe_row(&self) -> usize {
        self.upper.nrows() - 1
    }

    /// Interval bound for a (target, source) pair.
    pub fn bound(&self, row: usize, col: usize) -> ProbBound {
        let lower = self.lower.get(row, col);
        let upper = self.upper.get(row, col);
        ProbBound::new(lower.min(upper), upper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_csc_lookup_and_sums() {
        let columns = vec![vec![(0, 0.5), (2, 0.25)], vec![(1, 1.0)]];
        let m = CscMatrix::from_columns(3, &columns).unwrap();
        assert_eq!(m.nnz(), 3);
        assert_relative_eq!(m.get(0, 0), 0.5);
        assert_relative_eq!(m.get(1, 0), 0.0);
        assert_relative_eq!(m.get(2, 0), 0.25);
        assert_relative_eq!(m.get(1, 1), 1.0);
        assert_relative_eq!(m.column_sum(0), 0.75);
        assert_relative_eq!(m.density(), 0.5);
    }

    #[test]
    fn test_csc_rejects_unsorted_and_oversized_rows() {
        assert!(CscMatrix::from_columns(3, &[vec![(2, 0.1), (0, 0.1)]]).is_err());
        assert!(CscMatrix::from_columns(3, &[vec![(3, 0.1)]]).is_err());
    }

    #[test]
    fn test_transition_matrices_assembly() {
        // Two regions, columns of logical length 3 (tail row 2).
        let columns = vec![
            vec![
                (0, ProbBound::new(0.4, 0.6)),
                (1, ProbBound::new(0.2, 0.4)),
                (2, ProbBound::new(0.0, 0.2)),
            ],
            vec![(1, ProbBound::new(0.9, 1.0)), (2, ProbBound::new(0.0, 0.1))],
        ];
        let t = TransitionMatrices::from_bound_columns(2, &columns).unwrap();
        assert_eq!(t.num_regions(), 2);
        assert_eq!(t.unsafe_row(), 2);
        let b = t.bound(1, 0);
        assert_relative_eq!(b.lower, 0.2);
        assert_relative_eq!(b.upper, 0.4);
        // Zero-lower entries are stored only on the upper side.
        assert_eq!(t.lower.get(2, 0), 0.0);
        assert_relative_eq!(t.upper.get(2, 0), 0.2);
    }
}
