//! The synthesized barrier certificate.

use mart_core::{MartError, Result};
use mart_prob::RegionWithProbabilities;
use ndarray::Array1;

/// A piecewise-constant stochastic barrier certificate.
///
/// `values[j]` is the barrier level of region j, `eta` bounds the barrier
/// over the initial set, and `beta` is the martingale slack: the
/// probability of reaching the unsafe set from the initial set within N
/// steps is at most `eta + N·beta`.
#[derive(Debug, Clone)]
pub struct BarrierCertificate {
    pub values: Array1<f64>,
    pub eta: f64,
    pub beta: f64,
    pub beta_per_region: Array1<f64>,
}

impl BarrierCertificate {
    /// The certified reach-probability bound η + N·β for horizon N,
    /// clipped into [0, 1].
    pub fn certified_bound(&self, horizon: usize) -> f64 {
        (self.eta + horizon as f64 * self.beta).clamp(0.0, 1.0)
    }

    /// Martingale residuals against the raw upper probability bounds:
    /// residual_j = Σ_i P̅_ij·b_i + P̅_uj − b_j. A valid certificate has
    /// residual_j ≤ β_j for every region.
    pub fn martingale_residuals(
        &self,
        regions: &[RegionWithProbabilities],
    ) -> Result<Array1<f64>> {
        let n = regions.len();
        if self.values.len() != n {
            return Err(MartError::shape_mismatch(vec![self.values.len()], vec![n]));
        }
        let tail = n;
        let mut residuals = Array1::<f64>::zeros(n);
        for (j, region) in regions.iter().enumerate() {
            let mut expectation = 0.0;
            for (i, bound) in region.probabilities().iter() {
                let value = if i == tail { 1.0 } else { self.values[i] };
                expectation += bound.upper * value;
            }
            residuals[j] = expectation - self.values[j];
        }
        Ok(residuals)
    }

    /// Check the certificate invariants: floor, obstacle pinning, and the
    /// martingale condition within `tol` (obstacle regions are exempt from
    /// the martingale condition).
    pub fn validate(
        &self,
        regions: &[RegionWithProbabilities],
        obstacle_cells: &[usize],
        floor: f64,
        tol: f64,
    ) -> Result<()> {
        for (j, &b) in self.values.iter().enumerate() {
            if b < floor - tol {
                return Err(MartError::InvariantViolation(format!(
                    "barrier value {b} of region {j} below the floor {floor}"
                )));
            }
        }
        for &k in obstacle_cells {
            if (self.values[k] - 1.0).abs() > tol {
                return Err(MartError::InvariantViolation(format!(
                    "obstacle region {k} has barrier {} instead of 1",
                    self.values[k]
                )));
            }
        }
        let residuals = self.martingale_residuals(regions)?;
        for (j, &r) in residuals.iter().enumerate() {
            if obstacle_cells.contains(&j) {
                continue;
            }
            if r > self.beta_per_region[j] + tol {
                return Err(MartError::InvariantViolation(format!(
                    "martingale violated at region {j}: residual {r} exceeds beta {}",
                    self.beta_per_region[j]
                )));
            }
        }
        Ok(())
    }
}
