//! Axis-aligned hyperrectangles.

use crate::polytope::HPolytope;
use mart_core::{MartError, Result};
use ndarray::{Array1, Array2};

/// An axis-aligned hyperrectangle `{ x : low <= x <= high }`.
#[derive(Debug, Clone, PartialEq)]
pub struct Hyperrectangle {
    low: Array1<f64>,
    high: Array1<f64>,
}

impl Hyperrectangle {
    /// Create a hyperrectangle, validating `low <= high` componentwise.
    pub fn new(low: Array1<f64>, high: Array1<f64>) -> Result<Self> {
        if low.len() != high.len() {
            return Err(MartError::shape_mismatch(
                vec![low.len()],
                vec![high.len()],
            ));
        }
        for (i, (&l, &h)) in low.iter().zip(high.iter()).enumerate() {
            if !(l.is_finite() && h.is_finite()) {
                return Err(MartError::InvalidRegion(format!(
                    "non-finite bound in coordinate {i}: [{l}, {h}]"
                )));
            }
            if l > h {
                return Err(MartError::InvalidRegion(format!(
                    "inverted bounds in coordinate {i}: {l} > {h}"
                )));
            }
        }
        Ok(Self { low, high })
    }

    /// Smallest hyperrectangle containing all given points.
    ///
    /// Exact box approximation for a V-polytope: per-coordinate min/max.
    pub fn from_points<'a, I>(points: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a Array1<f64>>,
    {
        let mut iter = points.into_iter();
        let first = iter
            .next()
            .ok_or_else(|| MartError::InvalidRegion("empty point set".to_string()))?;
        let mut low = first.clone();
        let mut high = first.clone();
        for p in iter {
            if p.len() != low.len() {
                return Err(MartError::shape_mismatch(vec![low.len()], vec![p.len()]));
            }
            for i in 0..low.len() {
                low[i] = low[i].min(p[i]);
                high[i] = high[i].max(p[i]);
            }
        }
        Self::new(low, high)
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.low.len()
    }

    #[inline]
    pub fn low(&self) -> &Array1<f64> {
        &self.low
    }

    #[inline]
    pub fn high(&self) -> &Array1<f64> {
        &self.high
    }

    /// Geometric center.
    pub fn center(&self) -> Array1<f64> {
        Array1::from_iter(
            self.low
                .iter()
                .zip(self.high.iter())
                .map(|(&l, &h)| 0.5 * (l + h)),
        )
    }

    /// Per-coordinate half-widths.
    pub fn radius(&self) -> Array1<f64> {
        Array1::from_iter(
            self.low
                .iter()
                .zip(self.high.iter())
                .map(|(&l, &h)| 0.5 * (h - l)),
        )
    }

    /// All 2^m corner vertices, in a fixed (bit-order) enumeration.
    pub fn vertices(&self) -> Vec<Array1<f64>> {
        let m = self.dim();
        let count = 1usize << m;
        let mut out = Vec::with_capacity(count);
        for mask in 0..count {
            let v = Array1::from_iter((0..m).map(|i| {
                if mask & (1 << i) != 0 {
                    self.high[i]
                } else {
                    self.low[i]
                }
            }));
            out.push(v);
        }
        out
    }

    /// Membership with slack `tol`.
    pub fn contains(&self, point: &Array1<f64>, tol: f64) -> bool {
        point.len() == self.dim()
            && point
                .iter()
                .enumerate()
                .all(|(i, &x)| x >= self.low[i] - tol && x <= self.high[i] + tol)
    }

    /// Exact interval disjointness test.
    pub fn is_disjoint(&self, other: &Hyperrectangle) -> bool {
        debug_assert_eq!(self.dim(), other.dim());
        self.low
            .iter()
            .zip(self.high.iter())
            .zip(other.low.iter().zip(other.high.iter()))
            .any(|((&l, &h), (&ol, &oh))| h < ol || oh < l)
    }

    /// Intersection, or `None` when disjoint.
    pub fn intersect(&self, other: &Hyperrectangle) -> Option<Hyperrectangle> {
        let mut low = self.low.clone();
        let mut high = self.high.clone();
        for i in 0..self.dim() {
            low[i] = low[i].max(other.low[i]);
            high[i] = high[i].min(other.high[i]);
            if low[i] > high[i] {
                return None;
            }
        }
        Some(Hyperrectangle { low, high })
    }

    /// Componentwise clamp of a point onto this box.
    pub fn clamp(&self, point: &Array1<f64>) -> Array1<f64> {
        Array1::from_iter(
            point
                .iter()
                .enumerate()
                .map(|(i, &x)| x.clamp(self.low[i], self.high[i])),
        )
    }

    /// Minkowski sum with the centered box `[-pad, pad]` per coordinate.
    pub fn minkowski_pad(&self, pad: &Array1<f64>) -> Hyperrectangle {
        debug_assert_eq!(pad.len(), self.dim());
        debug_assert!(pad.iter().all(|&p| p >= 0.0));
        Hyperrectangle {
            low: &self.low - pad,
            high: &self.high + pad,
        }
    }

    /// Halfspace form: 2m rows `x_i <= high_i`, `-x_i <= -low_i`.
    pub fn to_hpolytope(&self) -> HPolytope {
        let m = self.dim();
        let mut a = Array2::<f64>::zeros((2 * m, m));
        let mut b = Array1::<f64>::zeros(2 * m);
        for i in 0..m {
            a[[2 * i, i]] = 1.0;
            b[2 * i] = self.high[i];
            a[[2 * i + 1, i]] = -1.0;
            b[2 * i + 1] = -self.low[i];
        }
        HPolytope::new_unchecked(a, b)
    }
}
