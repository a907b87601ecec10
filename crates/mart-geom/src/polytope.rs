//! Convex polytopes in vertex (V) and halfspace (H) representation.

use crate::hyperrect::Hyperrectangle;
use crate::linalg;
use crate::qp;
use crate::{DEDUP_TOL, FEASIBILITY_TOL};
use mart_core::{MartError, Result};
use ndarray::{Array1, Array2};

/// A polytope given by its vertex list.
#[derive(Debug, Clone, PartialEq)]
pub struct VPolytope {
    vertices: Vec<Array1<f64>>,
}

impl VPolytope {
    /// Create from a nonempty vertex list of common dimension.
    pub fn new(vertices: Vec<Array1<f64>>) -> Result<Self> {
        let first = vertices
            .first()
            .ok_or_else(|| MartError::InvalidRegion("empty vertex list".to_string()))?;
        let dim = first.len();
        if dim == 0 {
            return Err(MartError::InvalidRegion("zero-dimensional vertex".to_string()));
        }
        for v in &vertices {
            if v.len() != dim {
                return Err(MartError::shape_mismatch(vec![dim], vec![v.len()]));
            }
        }
        Ok(Self { vertices })
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.vertices[0].len()
    }

    #[inline]
    pub fn vertices(&self) -> &[Array1<f64>] {
        &self.vertices
    }

    /// Drop vertices within `tol` of an earlier vertex.
    pub fn dedup(mut self, tol: f64) -> Self {
        let mut kept: Vec<Array1<f64>> = Vec::with_capacity(self.vertices.len());
        for v in self.vertices.drain(..) {
            let dup = kept.iter().any(|k| {
                k.iter()
                    .zip(v.iter())
                    .map(|(&a, &b)| (a - b) * (a - b))
                    .sum::<f64>()
                    .sqrt()
                    < tol
            });
            if !dup {
                kept.push(v);
            }
        }
        Self { vertices: kept }
    }

    /// Merge another vertex set into this one (convex hull of the union).
    pub fn extend(&mut self, other: &VPolytope) {
        self.vertices.extend(other.vertices.iter().cloned());
    }

    /// Image under the affine map `x ↦ a·x + b`, mapping every vertex.
    ///
    /// A singular `a` preserves the vertex count but may collapse the
    /// interior; callers must not require full-dimensional output.
    pub fn affine_image(&self, a: &Array2<f64>, b: &Array1<f64>) -> Result<VPolytope> {
        if a.ncols() != self.dim() {
            return Err(MartError::shape_mismatch(vec![self.dim()], vec![a.ncols()]));
        }
        if a.nrows() != b.len() {
            return Err(MartError::shape_mismatch(vec![a.nrows()], vec![b.len()]));
        }
        let vertices = self.vertices.iter().map(|v| a.dot(v) + b).collect();
        Ok(VPolytope { vertices })
    }

    /// Smallest enclosing axis-aligned box (exact for vertex sets).
    pub fn bounding_box(&self) -> Hyperrectangle {
        Hyperrectangle::from_points(self.vertices.iter())
            .expect("nonempty vertex list has a bounding box")
    }

    /// Halfspace form of the convex hull.
    ///
    /// Candidate facets come from hyperplanes through m-subsets of vertices
    /// with every vertex on one side. The bounding-box halfspaces are always
    /// included, which caps directions a degenerate (flat) hull leaves
    /// unbounded; the result is a superset of the hull in that case, which
    /// is what the membership and projection callers need.
    pub fn to_hrep(&self) -> HPolytope {
        let m = self.dim();
        let mut rows: Vec<(Array1<f64>, f64)> = Vec::new();

        let push_dedup = |rows: &mut Vec<(Array1<f64>, f64)>, n: Array1<f64>, c: f64| {
            let norm = n.iter().map(|&x| x * x).sum::<f64>().sqrt();
            if norm < DEDUP_TOL {
                return;
            }
            let n = n.mapv(|x| x / norm);
            let c = c / norm;
            let dup = rows.iter().any(|(rn, rc)| {
                (rc - c).abs() < DEDUP_TOL
                    && rn
                        .iter()
                        .zip(n.iter())
                        .all(|(&a, &b)| (a - b).abs() < DEDUP_TOL)
            });
            if !dup {
                rows.push((n, c));
            }
        };

        // Box halfspaces first.
        let bb = self.bounding_box();
        for i in 0..m {
            let mut n = Array1::<f64>::zeros(m);
            n[i] = 1.0;
            push_dedup(&mut rows, n.clone(), bb.high()[i]);
            n[i] = -1.0;
            push_dedup(&mut rows, n, -bb.low()[i]);
        }

        if m >= 2 && self.vertices.len() >= m {
            let idx: Vec<usize> = (0..self.vertices.len()).collect();
            let mut subset = vec![0usize; m];
            enumerate_subsets(&idx, m, &mut subset, 0, 0, &mut |chosen| {
                let base = &self.vertices[chosen[0]];
                let dirs: Vec<Array1<f64>> = chosen[1..]
                    .iter()
                    .map(|&i| &self.vertices[i] - base)
                    .collect();
                let Some(normal) = linalg::nullspace_vector(&dirs) else {
                    return;
                };
                let c = normal.dot(base);
                let mut all_below = true;
                let mut all_above = true;
                for v in &self.vertices {
                    let s = normal.dot(v);
                    if s > c + FEASIBILITY_TOL {
                        all_below = false;
                    }
                    if s < c - FEASIBILITY_TOL {
                        all_above = false;
                    }
                    if !all_below && !all_above {
                        return;
                    }
                }
                if all_below {
                    push_dedup(&mut rows, normal.clone(), c);
                }
                if all_above {
                    push_dedup(&mut rows, normal.mapv(|x| -x), -c);
                }
            });
        }

        let mut a = Array2::<f64>::zeros((rows.len(), m));
        let mut b = Array1::<f64>::zeros(rows.len());
        for (i, (n, c)) in rows.into_iter().enumerate() {
            a.row_mut(i).assign(&n);
            b[i] = c;
        }
        HPolytope::new_unchecked(a, b)
    }
}

/// Fixed-order enumeration of k-subsets of `idx`, calling `f` per subset.
fn enumerate_subsets(
    idx: &[usize],
    k: usize,
    scratch: &mut [usize],
    depth: usize,
    start: usize,
    f: &mut impl FnMut(&[usize]),
) {
    if depth == k {
        f(scratch);
        return;
    }
    for i in start..idx.len() {
        scratch[depth] = idx[i];
        enumerate_subsets(idx, k, scratch, depth + 1, i + 1, f);
    }
}

/// A polytope given by halfspaces `a·x <= b` row-wise.
#[derive(Debug, Clone, PartialEq)]
pub struct HPolytope {
    a: Array2<f64>,
    b: Array1<f64>,
}

impl HPolytope {
    /// Create from constraint rows, validating shapes.
    pub fn new(a: Array2<f64>, b: Array1<f64>) -> Result<Self> {
        if a.nrows() != b.len() {
            return Err(MartError::shape_mismatch(vec![a.nrows()], vec![b.len()]));
        }
        if a.ncols() == 0 {
            return Err(MartError::InvalidRegion(
                "halfspace polytope over zero dimensions".to_string(),
            ));
        }
        Ok(Self { a, b })
    }

    pub(crate) fn new_unchecked(a: Array2<f64>, b: Array1<f64>) -> Self {
        debug_assert_eq!(a.nrows(), b.len());
        Self { a, b }
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.a.ncols()
    }

    #[inline]
    pub fn num_constraints(&self) -> usize {
        self.a.nrows()
    }

    #[inline]
    pub fn a(&self) -> &Array2<f64> {
        &self.a
    }

    #[inline]
    pub fn b(&self) -> &Array1<f64> {
        &self.b
    }

    /// Membership with slack `tol`.
    pub fn contains(&self, point: &Array1<f64>, tol: f64) -> bool {
        if point.len() != self.dim() {
            return false;
        }
        let vals = self.a.dot(point);
        vals.iter().zip(self.b.iter()).all(|(&v, &b)| v <= b + tol)
    }

    /// Vertex enumeration: solve every m-subset of active constraints and
    /// keep the feasible solutions. Standard double-description-style
    /// enumeration; correctness over numerical robustness.
    pub fn vertices_list(&self) -> Result<Vec<Array1<f64>>> {
        let m = self.dim();
        let rows = self.num_constraints();
        if rows < m {
            return Err(MartError::InvalidRegion(format!(
                "vertex enumeration needs at least {m} constraints, got {rows}"
            )));
        }

        let mut vertices: Vec<Array1<f64>> = Vec::new();
        let idx: Vec<usize> = (0..rows).collect();
        let mut subset = vec![0usize; m];
        let mut failed = false;
        enumerate_subsets(&idx, m, &mut subset, 0, 0, &mut |chosen| {
            if failed {
                return;
            }
            let mut sub_a = Array2::<f64>::zeros((m, m));
            let mut sub_b = Array1::<f64>::zeros(m);
            for (r, &i) in chosen.iter().enumerate() {
                sub_a.row_mut(r).assign(&self.a.row(i));
                sub_b[r] = self.b[i];
            }
            let Some(x) = linalg::solve(&sub_a, &sub_b) else {
                return;
            };
            if !x.iter().all(|v| v.is_finite()) {
                failed = true;
                return;
            }
            if self.contains(&x, FEASIBILITY_TOL) {
                let dup = vertices.iter().any(|v| {
                    v.iter()
                        .zip(x.iter())
                        .map(|(&a, &b)| (a - b) * (a - b))
                        .sum::<f64>()
                        .sqrt()
                        < DEDUP_TOL
                });
                if !dup {
                    vertices.push(x);
                }
            }
        });
        if failed {
            return Err(MartError::NumericalInstability(
                "non-finite basic solution during vertex enumeration".to_string(),
            ));
        }
        Ok(vertices)
    }

    /// Whether no feasible basic solution exists. Correct for bounded
    /// polytopes (a bounded nonempty polyhedron has a vertex).
    pub fn is_empty(&self) -> bool {
        match self.vertices_list() {
            Ok(vs) => vs.is_empty(),
            Err(_) => true,
        }
    }

    /// Sufficient disjointness filter against a box: reports `false` only
    /// when the box provably misses this polytope (support-function test
    /// per halfspace). A `true` answer means "may intersect".
    pub fn may_intersect(&self, rect: &Hyperrectangle) -> bool {
        debug_assert_eq!(self.dim(), rect.dim());
        for (row, &bound) in self.a.rows().into_iter().zip(self.b.iter()) {
            // Minimum of a·x over the box.
            let mut min_val = 0.0;
            for (i, &coeff) in row.iter().enumerate() {
                min_val += if coeff >= 0.0 {
                    coeff * rect.low()[i]
                } else {
                    coeff * rect.high()[i]
                };
            }
            if min_val > bound + FEASIBILITY_TOL {
                return false;
            }
        }
        true
    }

    /// L2-closest point of the polytope to `p`: min ‖x − p‖² s.t. Ax ≤ b.
    pub fn l2_closest_point(&self, p: &Array1<f64>) -> Array1<f64> {
        qp::l2_closest_point(&self.a, &self.b, p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{arr1, arr2};

    fn triangle() -> VPolytope {
        VPolytope::new(vec![arr1(&[0.0, 0.0]), arr1(&[1.0, 0.0]), arr1(&[0.0, 1.0])]).unwrap()
    }

    #[test]
    fn test_vpolytope_rejects_empty_and_mixed_dims() {
        assert!(VPolytope::new(vec![]).is_err());
        assert!(VPolytope::new(vec![arr1(&[0.0]), arr1(&[0.0, 1.0])]).is_err());
    }

    #[test]
    fn test_affine_image_rotation() {
        // 90° rotation of the unit triangle.
        let a = arr2(&[[0.0, -1.0], [1.0, 0.0]]);
        let b = arr1(&[0.0, 0.0]);
        let img = triangle().affine_image(&a, &b).unwrap();
        assert_eq!(img.vertices().len(), 3);
        assert!(img
            .vertices()
            .iter()
            .any(|v| (v[0] + 1.0).abs() < 1e-12 && v[1].abs() < 1e-12));
    }

    #[test]
    fn test_affine_image_singular_collapses() {
        // Rank-1 map: image vertices are collinear, no error.
        let a = arr2(&[[1.0, 0.0], [0.0, 0.0]]);
        let b = arr1(&[0.0, 0.0]);
        let img = triangle().affine_image(&a, &b).unwrap();
        assert!(img.vertices().iter().all(|v| v[1].abs() < 1e-12));
    }

    #[test]
    fn test_bounding_box() {
        let bb = triangle().bounding_box();
        assert_relative_eq!(bb.low()[0], 0.0);
        assert_relative_eq!(bb.high()[0], 1.0);
        assert_relative_eq!(bb.high()[1], 1.0);
    }

    #[test]
    fn test_dedup() {
        let p = VPolytope::new(vec![
            arr1(&[0.0, 0.0]),
            arr1(&[0.0, 1e-12]),
            arr1(&[1.0, 0.0]),
        ])
        .unwrap()
        .dedup(1e-9);
        assert_eq!(p.vertices().len(), 2);
    }

    #[test]
    fn test_to_hrep_contains_hull_only() {
        let h = triangle().to_hrep();
        // Inside and vertices are members.
        assert!(h.contains(&arr1(&[0.2, 0.2]), 1e-9));
        assert!(h.contains(&arr1(&[0.0, 0.0]), 1e-9));
        // Inside the bounding box but outside the hull: cut by the
        // hypotenuse facet x + y <= 1.
        assert!(!h.contains(&arr1(&[0.9, 0.9]), 1e-9));
        assert!(!h.contains(&arr1(&[-0.1, 0.5]), 1e-9));
    }

    #[test]
    fn test_to_hrep_degenerate_segment() {
        // Flat hull: result must still contain the segment.
        let seg = VPolytope::new(vec![arr1(&[0.0, 0.5]), arr1(&[1.0, 0.5])]).unwrap();
        let h = seg.to_hrep();
        assert!(h.contains(&arr1(&[0.5, 0.5]), 1e-9));
        assert!(!h.contains(&arr1(&[0.5, 0.8]), 1e-6));
    }

    #[test]
    fn test_hpolytope_vertices_of_box() {
        let rect =
            Hyperrectangle::new(arr1(&[0.0, -1.0]), arr1(&[2.0, 1.0])).unwrap();
        let vs = rect.to_hpolytope().vertices_list().unwrap();
        assert_eq!(vs.len(), 4);
        assert!(vs
            .iter()
            .any(|v| (v[0] - 2.0).abs() < 1e-9 && (v[1] - 1.0).abs() < 1e-9));
    }

    #[test]
    fn test_hpolytope_vertices_of_triangle() {
        // x >= 0, y >= 0, x + y <= 1.
        let a = arr2(&[[-1.0, 0.0], [0.0, -1.0], [1.0, 1.0]]);
        let b = arr1(&[0.0, 0.0, 1.0]);
        let vs = HPolytope::new(a, b).unwrap().vertices_list().unwrap();
        assert_eq!(vs.len(), 3);
    }

    #[test]
    fn test_hpolytope_empty() {
        // x <= 0 and x >= 1.
        let a = arr2(&[[1.0], [-1.0]]);
        let b = arr1(&[0.0, -1.0]);
        assert!(HPolytope::new(a, b).unwrap().is_empty());
    }

    #[test]
    fn test_may_intersect_filter() {
        let h = triangle().to_hrep();
        let far = Hyperrectangle::new(arr1(&[5.0, 5.0]), arr1(&[6.0, 6.0])).unwrap();
        assert!(!h.may_intersect(&far));
        let near = Hyperrectangle::new(arr1(&[0.4, 0.4]), arr1(&[0.6, 0.6])).unwrap();
        assert!(h.may_intersect(&near));
    }

    #[test]
    fn test_may_intersect_never_false_negative() {
        // Box overlapping the hull must never be reported disjoint.
        let h = triangle().to_hrep();
        let overlapping =
            Hyperrectangle::new(arr1(&[0.0, 0.0]), arr1(&[0.1, 0.1])).unwrap();
        assert!(h.may_intersect(&overlapping));
    }

    #[test]
    fn test_round_trip_box_hrep_vrep() {
        let rect = Hyperrectangle::new(arr1(&[-1.0, 2.0]), arr1(&[1.0, 3.0])).unwrap();
        let vs = rect.to_hpolytope().vertices_list().unwrap();
        let back = VPolytope::new(vs).unwrap().bounding_box();
        assert_relative_eq!(back.low()[0], -1.0, epsilon = 1e-9);
        assert_relative_eq!(back.high()[1], 3.0, epsilon = 1e-9);
    }
}
