//! Small dense linear algebra helpers.

use ndarray::{Array1, Array2};

/// Pivot magnitude below which a system is treated as singular.
const SINGULAR_TOL: f64 = 1e-12;

/// Solve the square system `a · x = b` by Gaussian elimination with
/// partial pivoting. Returns `None` when `a` is (numerically) singular.
pub fn solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    if a.ncols() != n || b.len() != n {
        return None;
    }

    let mut m = a.clone();
    let mut rhs = b.clone();

    for col in 0..n {
        // Partial pivot.
        let mut pivot_row = col;
        let mut pivot_mag = m[[col, col]].abs();
        for row in (col + 1)..n {
            let mag = m[[row, col]].abs();
            if mag > pivot_mag {
                pivot_row = row;
                pivot_mag = mag;
            }
        }
        if pivot_mag < SINGULAR_TOL {
            return None;
        }
        if pivot_row != col {
            for k in 0..n {
                let tmp = m[[col, k]];
                m[[col, k]] = m[[pivot_row, k]];
                m[[pivot_row, k]] = tmp;
            }
            rhs.swap(col, pivot_row);
        }

        for row in (col + 1)..n {
            let factor = m[[row, col]] / m[[col, col]];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                m[[row, k]] -= factor * m[[col, k]];
            }
            rhs[row] -= factor * rhs[col];
        }
    }

    // Back substitution.
    let mut x = Array1::<f64>::zeros(n);
    for row in (0..n).rev() {
        let mut acc = rhs[row];
        for k in (row + 1)..n {
            acc -= m[[row, k]] * x[k];
        }
        x[row] = acc / m[[row, row]];
    }
    Some(x)
}

/// A nonzero vector spanning the nullspace of an (n−1) × n matrix of
/// rank n−1, or `None` when the rows are rank-deficient.
///
/// Used to recover the normal of the hyperplane through n points.
pub fn nullspace_vector(rows: &[Array1<f64>]) -> Option<Array1<f64>> {
    let n = rows.first()?.len();
    if rows.len() + 1 != n {
        return None;
    }
    if n == 1 {
        return Some(Array1::from_elem(1, 1.0));
    }

    let mut m = Array2::<f64>::zeros((rows.len(), n));
    for (i, r) in rows.iter().enumerate() {
        m.row_mut(i).assign(r);
    }

    // Forward elimination with column pivoting bookkeeping: track which
    // column ends up free, then back-substitute with that column at 1.
    let mut pivot_cols = Vec::with_capacity(rows.len());
    let mut row = 0;
    for col in 0..n {
        let mut best = row;
        let mut best_mag = 0.0;
        for r in row..rows.len() {
            let mag = m[[r, col]].abs();
            if mag > best_mag {
                best = r;
                best_mag = mag;
            }
        }
        if best_mag < SINGULAR_TOL {
            continue;
        }
        if best != row {
            for k in 0..n {
                let tmp = m[[row, k]];
                m[[row, k]] = m[[best, k]];
                m[[best, k]] = tmp;
            }
        }
        for r in (row + 1)..rows.len() {
            let factor = m[[r, col]] / m[[row, col]];
            if factor != 0.0 {
                for k in col..n {
                    m[[r, k]] -= factor * m[[row, k]];
                }
            }
        }
        pivot_cols.push(col);
        row += 1;
        if row == rows.len() {
            break;
        }
    }

    if pivot_cols.len() != rows.len() {
        // Rank-deficient: points were affinely dependent.
        return None;
    }

    let free_col = (0..n).find(|c| !pivot_cols.contains(c))?;
    let mut v = Array1::<f64>::zeros(n);
    v[free_col] = 1.0;
    for (r, &pc) in pivot_cols.iter().enumerate().rev() {
        let mut acc = 0.0;
        for k in (pc + 1)..n {
            acc += m[[r, k]] * v[k];
        }
        v[pc] = -acc / m[[r, pc]];
    }
    Some(v)
}

/// Infinity norm of a square matrix (max absolute row sum).
pub fn inf_norm(m: &Array2<f64>) -> f64 {
    let mut best = 0.0f64;
    for row in m.rows() {
        let sum: f64 = row.iter().map(|v| v.abs()).sum();
        best = best.max(sum);
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{arr1, arr2};

    #[test]
    fn test_solve_identity() {
        let a = arr2(&[[1.0, 0.0], [0.0, 1.0]]);
        let b = arr1(&[3.0, -2.0]);
        let x = solve(&a, &b).unwrap();
        assert_relative_eq!(x[0], 3.0);
        assert_relative_eq!(x[1], -2.0);
    }

    #[test]
    fn test_solve_general() {
        // [2 1; 1 3] x = [5; 10] -> x = [1; 3]
        let a = arr2(&[[2.0, 1.0], [1.0, 3.0]]);
        let b = arr1(&[5.0, 10.0]);
        let x = solve(&a, &b).unwrap();
        assert_relative_eq!(x[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(x[1], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_solve_needs_pivoting() {
        // Leading zero forces a row swap.
        let a = arr2(&[[0.0, 1.0], [1.0, 0.0]]);
        let b = arr1(&[2.0, 7.0]);
        let x = solve(&a, &b).unwrap();
        assert_relative_eq!(x[0], 7.0);
        assert_relative_eq!(x[1], 2.0);
    }

    #[test]
    fn test_solve_singular() {
        let a = arr2(&[[1.0, 2.0], [2.0, 4.0]]);
        let b = arr1(&[1.0, 2.0]);
        assert!(solve(&a, &b).is_none());
    }

    #[test]
    fn test_nullspace_vector_2d() {
        // Row (1, 1): nullspace spanned by (1, -1).
        let rows = vec![arr1(&[1.0, 1.0])];
        let v = nullspace_vector(&rows).unwrap();
        assert_relative_eq!(v[0] + v[1], 0.0, epsilon = 1e-12);
        assert!(v.iter().any(|&c| c.abs() > 0.5));
    }

    #[test]
    fn test_nullspace_vector_3d() {
        let rows = vec![arr1(&[1.0, 0.0, 0.0]), arr1(&[0.0, 1.0, 0.0])];
        let v = nullspace_vector(&rows).unwrap();
        assert_relative_eq!(v[0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(v[1], 0.0, epsilon = 1e-12);
        assert!(v[2].abs() > 0.5);
    }

    #[test]
    fn test_nullspace_vector_deficient() {
        let rows = vec![arr1(&[1.0, 1.0, 0.0]), arr1(&[2.0, 2.0, 0.0])];
        assert!(nullspace_vector(&rows).is_none());
    }

    #[test]
    fn test_inf_norm() {
        let m = arr2(&[[1.0, -2.0], [3.0, 0.5]]);
        assert_relative_eq!(inf_norm(&m), 3.5);
    }
}
