//! Dense two-phase simplex over ndarray tableaus.
//!
//! Small by design: the barrier programs have a few hundred variables at
//! most, every coefficient is dense-representable, and determinism
//! matters more than speed. Bland's rule everywhere (no cycling, fixed
//! pivot order), explicit variable bounds via shifting, and dual prices
//! read off the initial identity columns of the final tableau.

use mart_core::{MartError, Result};
use ndarray::Array2;
use tracing::trace;

/// Entering-column threshold on reduced costs.
const REDUCED_COST_TOL: f64 = 1e-9;

/// Pivot-element threshold for the ratio test.
const PIVOT_TOL: f64 = 1e-9;

/// Residual phase-1 objective above which the program is infeasible.
const PHASE1_TOL: f64 = 1e-7;

/// Hard cap on simplex pivots per phase.
const MAX_PIVOTS: usize = 50_000;

/// Constraint sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cmp {
    Le,
    Ge,
    Eq,
}

#[derive(Debug, Clone)]
struct Row {
    coeffs: Vec<(usize, f64)>,
    cmp: Cmp,
    rhs: f64,
}

/// A linear program `min c·x` subject to constraint rows and per-variable
/// bounds `lower <= x <= upper` (lower bounds must be finite).
#[derive(Debug, Clone)]
pub struct LinearProgram {
    num_vars: usize,
    objective: Vec<f64>,
    lower: Vec<f64>,
    upper: Vec<f64>,
    rows: Vec<Row>,
}

/// Solution of a linear program.
#[derive(Debug, Clone)]
pub struct LpSolution {
    pub objective: f64,
    pub x: Vec<f64>,
    /// One dual price per added constraint row, in insertion order and in
    /// the row's original orientation.
    pub row_duals: Vec<f64>,
}

/// The program in canonical form `min c·x̂  s.t.  G·x̂ >= h,  x̂ >= 0`
/// with `x = shift + x̂`; `const_term` is `c·shift`.
#[derive(Debug, Clone)]
pub struct CanonicalForm {
    pub num_vars: usize,
    pub c: Vec<f64>,
    pub g_rows: Vec<Vec<(usize, f64)>>,
    pub h: Vec<f64>,
    pub shift: Vec<f64>,
    pub const_term: f64,
}

impl LinearProgram {
    /// A program over `num_vars` variables, all initially in `[0, ∞)`
    /// with zero objective.
    pub fn new(num_vars: usize) -> Self {
        Self {
            num_vars,
            objective: vec![0.0; num_vars],
            lower: vec![0.0; num_vars],
            upper: vec![f64::INFINITY; num_vars],
            rows: Vec::new(),
        }
    }

    #[inline]
    pub fn num_vars(&self) -> usize {
        self.num_vars
    }

    pub fn set_objective(&mut self, var: usize, coeff: f64) {
        self.objective[var] = coeff;
    }

    pub fn set_bounds(&mut self, var: usize, lower: f64, upper: f64) {
        debug_assert!(lower.is_finite(), "lower bounds must be finite");
        debug_assert!(lower <= upper);
        self.lower[var] = lower;
        self.upper[var] = upper;
    }

    pub fn add_row(&mut self, coeffs: Vec<(usize, f64)>, cmp: Cmp, rhs: f64) {
        debug_assert!(coeffs.iter().all(|&(j, _)| j < self.num_vars));
        self.rows.push(Row { coeffs, cmp, rhs });
    }

    /// Canonicalize to `min c·x̂, G·x̂ >= h, x̂ >= 0`.
    ///
    /// Variables are shifted by their lower bounds; finite upper bounds
    /// become `-x̂_j >= -(ub - lb)` rows; `<=` rows flip sign; `=` rows
    /// split into a `>=` pair.
    pub fn to_canonical(&self) -> CanonicalForm {
        let shift = self.lower.clone();
        let mut g_rows: Vec<Vec<(usize, f64)>> = Vec::new();
        let mut h: Vec<f64> = Vec::new();

        for row in &self.rows {
            let shifted_rhs =
                row.rhs - row.coeffs.iter().map(|&(j, c)| c * shift[j]).sum::<f64>();
            match row.cmp {
                Cmp::Ge => {
                    g_rows.push(row.coeffs.clone());
                    h.push(shifted_rhs);
                }
                Cmp::Le => {
                    g_rows.push(row.coeffs.iter().map(|&(j, c)| (j, -c)).collect());
                    h.push(-shifted_rhs);
                }
                Cmp::Eq => {
                    g_rows.push(row.coeffs.clone());
                    h.push(shifted_rhs);
                    g_rows.push(row.coeffs.iter().map(|&(j, c)| (j, -c)).collect());
                    h.push(-shifted_rhs);
                }
            }
        }
        for j in 0..self.num_vars {
            if self.upper[j].is_finite() {
                g_rows.push(vec![(j, -1.0)]);
                h.push(-(self.upper[j] - self.lower[j]));
            }
        }

        let const_term = self
            .objective
            .iter()
            .zip(shift.iter())
            .map(|(&c, &s)| c * s)
            .sum();
        CanonicalForm {
            num_vars: self.num_vars,
            c: self.objective.clone(),
            g_rows,
            h,
            shift,
            const_term,
        }
    }

    /// Solve with the two-phase simplex.
    pub fn solve(&self) -> Result<LpSolution> {
        let n = self.num_vars;
        let num_user_rows = self.rows.len();

        // Shift variables to x̂ = x − lower >= 0; finite upper bounds
        // become extra rows.
        let mut rows: Vec<Row> = self.rows.clone();
        for row in rows.iter_mut() {
            row.rhs -= row
                .coeffs
                .iter()
                .map(|&(j, c)| c * self.lower[j])
                .sum::<f64>();
        }
        for j in 0..n {
            if self.upper[j].is_finite() {
                rows.push(Row {
                    coeffs: vec![(j, 1.0)],
                    cmp: Cmp::Le,
                    rhs: self.upper[j] - self.lower[j],
                });
            }
        }

        let m = rows.len();

        // Normalize rhs >= 0, then attach slack/surplus and artificials.
        let mut flipped = vec![false; m];
        for (i, row) in rows.iter_mut().enumerate() {
            if row.rhs < 0.0 {
                row.rhs = -row.rhs;
                for c in row.coeffs.iter_mut() {
                    c.1 = -c.1;
                }
                row.cmp = match row.cmp {
                    Cmp::Le => Cmp::Ge,
                    Cmp::Ge => Cmp::Le,
                    Cmp::Eq => Cmp::Eq,
                };
                flipped[i] = true;
            }
        }

        let mut num_cols = n;
        let mut slack_col: Vec<Option<(usize, f64)>> = vec![None; m];
        let mut artificial_col: Vec<Option<usize>> = vec![None; m];
        for (i, row) in rows.iter().enumerate() {
            match row.cmp {
                Cmp::Le => {
                    slack_col[i] = Some((num_cols, 1.0));
                    num_cols += 1;
                }
                Cmp::Ge => {
                    slack_col[i] = Some((num_cols, -1.0));
                    num_cols += 1;
                }
                Cmp::Eq => {}
            }
        }
        let first_artificial = num_cols;
        for (i, row) in rows.iter().enumerate() {
            if !matches!(row.cmp, Cmp::Le) {
                artificial_col[i] = Some(num_cols);
                num_cols += 1;
            }
        }

        let mut tableau = Array2::<f64>::zeros((m, num_cols + 1));
        let mut basis = vec![0usize; m];
        let mut init_basis_col = vec![0usize; m];
        for (i, row) in rows.iter().enumerate() {
            for &(j, c) in &row.coeffs {
                tableau[[i, j]] += c;
            }
            if let Some((col, sign)) = slack_col[i] {
                tableau[[i, col]] = sign;
            }
            if let Some(col) = artificial_col[i] {
                tableau[[i, col]] = 1.0;
            }
            tableau[[i, num_cols]] = row.rhs;

            let id_col = match (artificial_col[i], slack_col[i]) {
                (Some(a), _) => a,
                (None, Some((s, _))) => s,
                (None, None) => unreachable!("every row has an identity column"),
            };
            basis[i] = id_col;
            init_basis_col[i] = id_col;
        }

        // Phase 1: drive the artificials to zero.
        if first_artificial < num_cols {
            let mut phase1_cost = vec![0.0; num_cols];
            for c in phase1_cost.iter_mut().skip(first_artificial) {
                *c = 1.0;
            }
            let obj = simplex_core(&mut tableau, &mut basis, &phase1_cost, num_cols)?;
            if obj > PHASE1_TOL {
                return Err(MartError::SolverInfeasible(format!(
                    "phase-1 residual {obj:.3e}"
                )));
            }
            drive_out_artificials(&mut tableau, &mut basis, first_artificial, num_cols);
        }

        // Phase 2: original objective; artificials banned from entering.
        let mut phase2_cost = vec![0.0; num_cols];
        phase2_cost[..n].copy_from_slice(&self.objective);
        simplex_core(&mut tableau, &mut basis, &phase2_cost, first_artificial)?;

        // Read the solution.
        let mut x_shifted = vec![0.0; n];
        for (i, &b) in basis.iter().enumerate() {
            if b < n {
                x_shifted[b] = tableau[[i, num_cols]];
            }
        }
        let x: Vec<f64> = x_shifted
            .iter()
            .zip(self.lower.iter())
            .map(|(&xs, &lo)| xs + lo)
            .collect();
        let objective = self
            .objective
            .iter()
            .zip(x.iter())
            .map(|(&c, &xv)| c * xv)
            .sum();

        // Dual prices: y = c_B·B⁻¹, read from the initial identity
        // columns. A flipped row's price flips back with it.
        let mut row_duals = vec![0.0; num_user_rows];
        for (i, dual) in row_duals.iter_mut().enumerate() {
            let col = init_basis_col[i];
            let mut y: f64 = basis
                .iter()
                .enumerate()
                .map(|(k, &b)| phase2_cost[b] * tableau[[k, col]])
                .sum();
            // A Ge row's identity column is its artificial; a Le row's is
            // its (+1) slack. Both carry B⁻¹e_i directly.
            if flipped[i] {
                y = -y;
            }
            *dual = y;
        }

        Ok(LpSolution {
            objective,
            x,
            row_duals,
        })
    }
}

/// Run simplex pivots until optimal. Columns at `banned_from` and beyond
/// may not enter the basis. Returns the final objective value.
fn simplex_core(
    tableau: &mut Array2<f64>,
    basis: &mut [usize],
    cost: &[f64],
    banned_from: usize,
) -> Result<f64> {
    let m = tableau.nrows();
    let num_cols = tableau.ncols() - 1;

    for pivot_count in 0..MAX_PIVOTS {
        // Reduced costs r_j = c_j − c_B·(B⁻¹A_j); Bland: first negative.
        let mut entering = None;
        for j in 0..banned_from {
            if basis.contains(&j) {
                continue;
            }
            let mut r = cost[j];
            for i in 0..m {
                let t = tableau[[i, j]];
                if t != 0.0 {
                    r -= cost[basis[i]] * t;
                }
            }
            if r < -REDUCED_COST_TOL {
                entering = Some(j);
                break;
            }
        }

        let Some(enter) = entering else {
            let obj = (0..m)
                .map(|i| cost[basis[i]] * tableau[[i, num_cols]])
                .sum();
            trace!(pivots = pivot_count, "simplex optimal");
            return Ok(obj);
        };

        // Ratio test; Bland tie-break on the smallest basis index.
        let mut leave: Option<usize> = None;
        let mut best_ratio = f64::INFINITY;
        for i in 0..m {
            let t = tableau[[i, enter]];
            if t > PIVOT_TOL {
                let ratio = tableau[[i, num_cols]] / t;
                let better = match leave {
                    None => true,
                    Some(l) => {
                        ratio < best_ratio - 1e-12
                            || (ratio < best_ratio + 1e-12 && basis[i] < basis[l])
                    }
                };
                if better {
                    leave = Some(i);
                    best_ratio = ratio;
                }
            }
        }
        let Some(leave) = leave else {
            return Err(MartError::SolverUnbounded(
                "no blocking row in ratio test".to_string(),
            ));
        };

        pivot(tableau, leave, enter);
        basis[leave] = enter;
    }

    Err(MartError::NonConvergence {
        context: format!("simplex exceeded {MAX_PIVOTS} pivots"),
    })
}

/// Pivot the tableau on (row, col).
fn pivot(tableau: &mut Array2<f64>, row: usize, col: usize) {
    let cols = tableau.ncols();
    let p = tableau[[row, col]];
    for j in 0..cols {
        tableau[[row, j]] /= p;
    }
    for i in 0..tableau.nrows() {
        if i == row {
            continue;
        }
        let factor = tableau[[i, col]];
        if factor == 0.0 {
            continue;
        }
        for j in 0..cols {
            tableau[[i, j]] -= factor * tableau[[row, j]];
        }
    }
}

/// Swap basic artificials for structural columns where a pivot exists.
/// Rows whose non-artificial entries are all zero are redundant and keep
/// their zero-valued artificial, which can never re-enter.
fn drive_out_artificials(
    tableau: &mut Array2<f64>,
    basis: &mut [usize],
    first_artificial: usize,
    num_cols: usize,
) {
    for i in 0..tableau.nrows() {
        if basis[i] < first_artificial {
            continue;
        }
        let mut replacement = None;
        for j in 0..first_artificial {
            if basis.contains(&j) {
                continue;
            }
            if tableau[[i, j]].abs() > PIVOT_TOL {
                replacement = Some(j);
                break;
            }
        }
        if let Some(j) = replacement {
            pivot(tableau, i, j);
            basis[i] = j;
        } else {
            debug_assert!(
                tableau[[i, num_cols]].abs() < PHASE1_TOL,
                "redundant row with nonzero rhs survived phase 1"
            );
        }
    }
}

/// Build the explicit dual `max h·y  s.t.  Gᵀ·y <= c,  y >= 0` of a
/// canonical form, expressed as a minimization for [`LinearProgram`].
pub fn dual_of_canonical(canonical: &CanonicalForm) -> LinearProgram {
    let num_duals = canonical.g_rows.len();
    let mut dual = LinearProgram::new(num_duals);
    for (i, &hi) in canonical.h.iter().enumerate() {
        // max h·y == min (−h)·y
        dual.set_objective(i, -hi);
    }
    // One row per primal variable: Σ_i G[i][j]·y_i <= c_j.
    let mut cols: Vec<Vec<(usize, f64)>> = vec![Vec::new(); canonical.num_vars];
    for (i, row) in canonical.g_rows.iter().enumerate() {
        for &(j, coeff) in row {
            cols[j].push((i, coeff));
        }
    }
    for (j, col) in cols.into_iter().enumerate() {
        dual.add_row(col, Cmp::Le, canonical.c[j]);
    }
    dual
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_basic_min_le() {
        // min -x - 2y  s.t.  x + y <= 4, x <= 2, y <= 3, x,y >= 0.
        let mut lp = LinearProgram::new(2);
        lp.set_objective(0, -1.0);
        lp.set_objective(1, -2.0);
        lp.add_row(vec![(0, 1.0), (1, 1.0)], Cmp::Le, 4.0);
        lp.set_bounds(0, 0.0, 2.0);
        lp.set_bounds(1, 0.0, 3.0);
        let sol = lp.solve().unwrap();
        // Optimum at (1, 3): objective -7.
        assert_relative_eq!(sol.objective, -7.0, epsilon = 1e-8);
        assert_relative_eq!(sol.x[0], 1.0, epsilon = 1e-8);
        assert_relative_eq!(sol.x[1], 3.0, epsilon = 1e-8);
    }

    #[test]
    fn test_ge_rows_and_shifted_bounds() {
        // min x + y  s.t.  x + y >= 3, x >= 1, y in [0.5, 10].
        let mut lp = LinearProgram::new(2);
        lp.set_objective(0, 1.0);
        lp.set_objective(1, 1.0);
        lp.add_row(vec![(0, 1.0), (1, 1.0)], Cmp::Ge, 3.0);
        lp.set_bounds(0, 1.0, f64::INFINITY);
        lp.set_bounds(1, 0.5, 10.0);
        let sol = lp.solve().unwrap();
        assert_relative_eq!(sol.objective, 3.0, epsilon = 1e-8);
        assert!(sol.x[0] >= 1.0 - 1e-9);
        assert!(sol.x[1] >= 0.5 - 1e-9);
    }

    #[test]
    fn test_equality_row() {
        // min 2x + 3y  s.t.  x + y = 5, x,y >= 0.
        let mut lp = LinearProgram::new(2);
        lp.set_objective(0, 2.0);
        lp.set_objective(1, 3.0);
        lp.add_row(vec![(0, 1.0), (1, 1.0)], Cmp::Eq, 5.0);
        let sol = lp.solve().unwrap();
        assert_relative_eq!(sol.objective, 10.0, epsilon = 1e-8);
        assert_relative_eq!(sol.x[0], 5.0, epsilon = 1e-8);
    }

    #[test]
    fn test_infeasible() {
        // x <= 1 and x >= 2.
        let mut lp = LinearProgram::new(1);
        lp.add_row(vec![(0, 1.0)], Cmp::Le, 1.0);
        lp.add_row(vec![(0, 1.0)], Cmp::Ge, 2.0);
        match lp.solve() {
            Err(MartError::SolverInfeasible(_)) => {}
            other => panic!("expected infeasible, got {other:?}"),
        }
    }

    #[test]
    fn test_unbounded() {
        // min -x, x >= 0, no upper bound.
        let mut lp = LinearProgram::new(1);
        lp.set_objective(0, -1.0);
        match lp.solve() {
            Err(MartError::SolverUnbounded(_)) => {}
            other => panic!("expected unbounded, got {other:?}"),
        }
    }

    #[test]
    fn test_degenerate_program_terminates() {
        // Multiple redundant rows through the same vertex; Bland's rule
        // must not cycle.
        let mut lp = LinearProgram::new(2);
        lp.set_objective(0, -1.0);
        lp.set_objective(1, -1.0);
        lp.add_row(vec![(0, 1.0), (1, 1.0)], Cmp::Le, 1.0);
        lp.add_row(vec![(0, 2.0), (1, 2.0)], Cmp::Le, 2.0);
        lp.add_row(vec![(0, 1.0)], Cmp::Le, 1.0);
        lp.add_row(vec![(1, 1.0)], Cmp::Le, 1.0);
        let sol = lp.solve().unwrap();
        assert_relative_eq!(sol.objective, -1.0, epsilon = 1e-8);
    }

    #[test]
    fn test_duals_of_le_program() {
        // min -3x - 5y  s.t.  x <= 4, 2y <= 12, 3x + 2y <= 18.
        // Classic: optimum (2, 6), objective -36, duals (0, -3/2, -1).
        let mut lp = LinearProgram::new(2);
        lp.set_objective(0, -3.0);
        lp.set_objective(1, -5.0);
        lp.add_row(vec![(0, 1.0)], Cmp::Le, 4.0);
        lp.add_row(vec![(1, 2.0)], Cmp::Le, 12.0);
        lp.add_row(vec![(0, 3.0), (1, 2.0)], Cmp::Le, 18.0);
        let sol = lp.solve().unwrap();
        assert_relative_eq!(sol.objective, -36.0, epsilon = 1e-8);
        assert_relative_eq!(sol.x[0], 2.0, epsilon = 1e-8);
        assert_relative_eq!(sol.x[1], 6.0, epsilon = 1e-8);
        assert_relative_eq!(sol.row_duals[0], 0.0, epsilon = 1e-8);
        assert_relative_eq!(sol.row_duals[1], -1.5, epsilon = 1e-8);
        assert_relative_eq!(sol.row_duals[2], -1.0, epsilon = 1e-8);
    }

    #[test]
    fn test_strong_duality_via_explicit_dual() {
        // Solve a primal, then its mechanically built dual; objectives
        // must coincide and the dual's duals must reproduce the primal x.
        let mut lp = LinearProgram::new(2);
        lp.set_objective(0, 2.0);
        lp.set_objective(1, 1.0);
        lp.add_row(vec![(0, 1.0), (1, 1.0)], Cmp::Ge, 4.0);
        lp.add_row(vec![(0, 1.0), (1, 3.0)], Cmp::Ge, 6.0);
        let primal_sol = lp.solve().unwrap();

        let canonical = lp.to_canonical();
        let dual = dual_of_canonical(&canonical);
        let dual_sol = dual.solve().unwrap();
        let dual_objective = -dual_sol.objective + canonical.const_term;
        assert_relative_eq!(dual_objective, primal_sol.objective, epsilon = 1e-7);

        // x̂ = −(duals of the dual), one per primal variable.
        for j in 0..2 {
            let xj = canonical.shift[j] - dual_sol.row_duals[j];
            assert_relative_eq!(xj, primal_sol.x[j], epsilon = 1e-7);
        }
    }

    #[test]
    fn test_canonical_const_term_and_shift() {
        let mut lp = LinearProgram::new(1);
        lp.set_objective(0, 3.0);
        lp.set_bounds(0, 2.0, 5.0);
        lp.add_row(vec![(0, 1.0)], Cmp::Ge, 2.5);
        let canonical = lp.to_canonical();
        assert_relative_eq!(canonical.const_term, 6.0);
        // One user row plus one upper-bound row.
        assert_eq!(canonical.g_rows.len(), 2);
        assert_relative_eq!(canonical.h[0], 0.5);
        assert_relative_eq!(canonical.h[1], -3.0);

        let sol = lp.solve().unwrap();
        assert_relative_eq!(sol.objective, 7.5, epsilon = 1e-8);
    }

    #[test]
    fn test_fixed_variable_via_bounds() {
        // Pinning by lower == upper.
        let mut lp = LinearProgram::new(2);
        lp.set_objective(1, 1.0);
        lp.set_bounds(0, 1.0, 1.0);
        lp.add_row(vec![(0, 1.0), (1, -1.0)], Cmp::Le, 0.0);
        let sol = lp.solve().unwrap();
        assert_relative_eq!(sol.x[0], 1.0, epsilon = 1e-9);
        // y >= x = 1, minimized at 1.
        assert_relative_eq!(sol.x[1], 1.0, epsilon = 1e-8);
    }
}
