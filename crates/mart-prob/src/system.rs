//! System model: affine and uncertain piecewise-affine Gaussian dynamics.

use mart_core::{MartError, Result};
use mart_geom::{Hyperrectangle, HPolytope, VPolytope, DEDUP_TOL};
use ndarray::{Array1, Array2};

/// A single affine map `x ↦ A·x + b`.
#[derive(Debug, Clone, PartialEq)]
pub struct AffineMap {
    pub a: Array2<f64>,
    pub b: Array1<f64>,
}

impl AffineMap {
    /// Create a square affine map over `R^m`.
    pub fn new(a: Array2<f64>, b: Array1<f64>) -> Result<Self> {
        if a.nrows() != a.ncols() {
            return Err(MartError::InvalidSystem(format!(
                "dynamics matrix must be square, got {}x{}",
                a.nrows(),
                a.ncols()
            )));
        }
        if a.nrows() != b.len() {
            return Err(MartError::shape_mismatch(vec![a.nrows()], vec![b.len()]));
        }
        Ok(Self { a, b })
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.b.len()
    }

    pub fn apply(&self, x: &Array1<f64>) -> Array1<f64> {
        self.a.dot(x) + &self.b
    }
}

/// Linear dynamics `f(x) = A·x + b` with Gaussian noise and a safe set.
#[derive(Debug, Clone)]
pub struct LinearGaussian {
    map: AffineMap,
    sigma: Array1<f64>,
    safe_set: Hyperrectangle,
}

impl LinearGaussian {
    pub fn new(
        a: Array2<f64>,
        b: Array1<f64>,
        sigma: Array1<f64>,
        safe_set: Hyperrectangle,
    ) -> Result<Self> {
        let map = AffineMap::new(a, b)?;
        validate_sigma(&sigma, map.dim())?;
        if safe_set.dim() != map.dim() {
            return Err(MartError::shape_mismatch(
                vec![map.dim()],
                vec![safe_set.dim()],
            ));
        }
        Ok(Self {
            map,
            sigma,
            safe_set,
        })
    }
}

/// One partition cell of an uncertain PWA system: the cell itself plus the
/// vertices of its uncertain affine map.
#[derive(Debug, Clone)]
pub struct PwaPiece {
    pub region: Hyperrectangle,
    pub maps: Vec<AffineMap>,
}

impl PwaPiece {
    pub fn new(region: Hyperrectangle, maps: Vec<AffineMap>) -> Result<Self> {
        if maps.is_empty() {
            return Err(MartError::InvalidSystem(
                "PWA piece with no dynamics vertices".to_string(),
            ));
        }
        for m in &maps {
            if m.dim() != region.dim() {
                return Err(MartError::shape_mismatch(vec![region.dim()], vec![m.dim()]));
            }
        }
        Ok(Self { region, maps })
    }
}

/// Uncertain piecewise-affine dynamics: one uncertain affine map per cell.
#[derive(Debug, Clone)]
pub struct UncertainPwa {
    pieces: Vec<PwaPiece>,
    sigma: Array1<f64>,
    safe_set: Hyperrectangle,
}

impl UncertainPwa {
    pub fn new(
        pieces: Vec<PwaPiece>,
        sigma: Array1<f64>,
        safe_set: Hyperrectangle,
    ) -> Result<Self> {
        let dim = safe_set.dim();
        validate_sigma(&sigma, dim)?;
        if pieces.is_empty() {
            return Err(MartError::InvalidSystem("PWA system with no pieces".to_string()));
        }
        for p in &pieces {
            if p.region.dim() != dim {
                return Err(MartError::shape_mismatch(vec![dim], vec![p.region.dim()]));
            }
        }
        Ok(Self {
            pieces,
            sigma,
            safe_set,
        })
    }

    #[inline]
    pub fn num_pieces(&self) -> usize {
        self.pieces.len()
    }
}

fn validate_sigma(sigma: &Array1<f64>, dim: usize) -> Result<()> {
    if sigma.len() != dim {
        return Err(MartError::shape_mismatch(vec![dim], vec![sigma.len()]));
    }
    for (i, &s) in sigma.iter().enumerate() {
        if !(s.is_finite() && s > 0.0) {
            return Err(MartError::InvalidSystem(format!(
                "noise sigma must be positive, got sigma[{i}] = {s}"
            )));
        }
    }
    Ok(())
}

/// Post-image of a source set: the same polytope in vertex form, halfspace
/// form, and as its enclosing box.
#[derive(Debug, Clone)]
pub struct PostImage {
    pub vertices: VPolytope,
    pub halfspaces: HPolytope,
    pub bounding_box: Hyperrectangle,
}

impl PostImage {
    fn from_vertices(vertices: VPolytope) -> Self {
        let vertices = vertices.dedup(DEDUP_TOL);
        let halfspaces = vertices.to_hrep();
        let bounding_box = vertices.bounding_box();
        Self {
            vertices,
            halfspaces,
            bounding_box,
        }
    }
}

/// A discrete-time stochastic system, dispatched by dynamics kind.
#[derive(Debug, Clone)]
pub enum StochasticSystem {
    Linear(LinearGaussian),
    Pwa(UncertainPwa),
}

impl StochasticSystem {
    pub fn dimensionality(&self) -> usize {
        match self {
            StochasticSystem::Linear(s) => s.map.dim(),
            StochasticSystem::Pwa(s) => s.safe_set.dim(),
        }
    }

    pub fn noise_sigma(&self) -> &Array1<f64> {
        match self {
            StochasticSystem::Linear(s) => &s.sigma,
            StochasticSystem::Pwa(s) => &s.sigma,
        }
    }

    pub fn safe_set(&self) -> &Hyperrectangle {
        match self {
            StochasticSystem::Linear(s) => &s.safe_set,
            StochasticSystem::Pwa(s) => &s.safe_set,
        }
    }

    /// Number of pieces a region list must match, if the dynamics are
    /// region-indexed.
    pub fn expected_region_count(&self) -> Option<usize> {
        match self {
            StochasticSystem::Linear(_) => None,
            StochasticSystem::Pwa(s) => Some(s.num_pieces()),
        }
    }

    /// Post-image `{ f(x) : x ∈ X }` of a source set under the dynamics of
    /// region `region_index`.
    ///
    /// For linear dynamics the index is ignored. For uncertain PWA
    /// dynamics the image is the convex hull of the images of `X`'s
    /// vertices under every vertex of the region's uncertain map.
    pub fn post(&self, region_index: usize, x: &Hyperrectangle) -> Result<PostImage> {
        let source = VPolytope::new(x.vertices())?;
        match self {
            StochasticSystem::Linear(s) => {
                let image = source.affine_image(&s.map.a, &s.map.b)?;
                Ok(PostImage::from_vertices(image))
            }
            StochasticSystem::Pwa(s) => {
                let piece = s.pieces.get(region_index).ok_or_else(|| {
                    MartError::InvalidRegion(format!(
                        "region index {region_index} out of range for {} PWA pieces",
                        s.pieces.len()
                    ))
                })?;
                let mut image: Option<VPolytope> = None;
                for map in &piece.maps {
                    let mapped = source.affine_image(&map.a, &map.b)?;
                    match image.as_mut() {
                        Some(acc) => acc.extend(&mapped),
                        None => image = Some(mapped),
                    }
                }
                let image = image.expect("piece has at least one map");
                Ok(PostImage::from_vertices(image))
            }
        }
    }
}
