//! Distance metrics.
//!
//! Every algorithm takes a `Box<dyn DistanceMetric>` and hands each worker
//! partition its own clone, so an implementation may keep scratch state
//! behind interior mutability without synchronizing across workers.

use std::fmt;

use crate::error::{Error, Result};

/// A symmetric, non-negative distance between two equal-length tuples.
pub trait DistanceMetric: Send + Sync + fmt::Debug {
    /// Distance between `a` and `b`.
    fn distance(&self, a: &[f64], b: &[f64]) -> f64;

    /// Independent copy for use by another worker.
    fn boxed_clone(&self) -> Box<dyn DistanceMetric>;

    /// Short name, used in log output.
    fn name(&self) -> &'static str;

    /// Whether `distance(q, clamp(q, lo, hi))` is a lower bound on the distance
    /// from `q` to every point of the box `[lo, hi]`.
    ///
    /// The spatial index only prunes sub-trees for metrics where this holds.
    fn bounded_by_box(&self) -> bool {
        true
    }
}

impl Clone for Box<dyn DistanceMetric> {
    fn clone(&self) -> Self {
        self.boxed_clone()
    }
}

impl Default for Box<dyn DistanceMetric> {
    fn default() -> Self {
        Box::new(Euclidean)
    }
}

/// Euclidean (L2) distance.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Euclidean;

impl DistanceMetric for Euclidean {
    #[inline]
    fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        squared_euclidean(a, b).sqrt()
    }

    fn boxed_clone(&self) -> Box<dyn DistanceMetric> {
        Box::new(*self)
    }

    fn name(&self) -> &'static str {
        "euclidean"
    }
}

/// Squared Euclidean distance. Not a metric: the triangle inequality fails.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SquaredEuclidean;

impl DistanceMetric for SquaredEuclidean {
    #[inline]
    fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        squared_euclidean(a, b)
    }

    fn boxed_clone(&self) -> Box<dyn DistanceMetric> {
        Box::new(*self)
    }

    fn name(&self) -> &'static str {
        "squared-euclidean"
    }
}

/// Manhattan (L1) distance.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Manhattan;

impl DistanceMetric for Manhattan {
    fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        debug_assert_eq!(a.len(), b.len());
        a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum()
    }

    fn boxed_clone(&self) -> Box<dyn DistanceMetric> {
        Box::new(*self)
    }

    fn name(&self) -> &'static str {
        "manhattan"
    }
}

/// Chebyshev (L∞) distance.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Chebyshev;

impl DistanceMetric for Chebyshev {
    fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        debug_assert_eq!(a.len(), b.len());
        a.iter()
            .zip(b)
            .map(|(x, y)| (x - y).abs())
            .fold(0.0, f64::max)
    }

    fn boxed_clone(&self) -> Box<dyn DistanceMetric> {
        Box::new(*self)
    }

    fn name(&self) -> &'static str {
        "chebyshev"
    }
}

/// Minkowski distance of order `p >= 1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Minkowski {
    p: f64,
}

impl Minkowski {
    /// Create a Minkowski metric; `p` must be finite and at least 1.
    pub fn new(p: f64) -> Result<Self> {
        if !p.is_finite() || p < 1.0 {
            return Err(Error::invalid("p", "must be finite and >= 1"));
        }
        Ok(Self { p })
    }

    /// The order of the metric.
    pub fn p(&self) -> f64 {
        self.p
    }
}

impl DistanceMetric for Minkowski {
    fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        debug_assert_eq!(a.len(), b.len());
        a.iter()
            .zip(b)
            .map(|(x, y)| (x - y).abs().powf(self.p))
            .sum::<f64>()
            .powf(self.p.recip())
    }

    fn boxed_clone(&self) -> Box<dyn DistanceMetric> {
        Box::new(*self)
    }

    fn name(&self) -> &'static str {
        "minkowski"
    }
}

/// Cosine distance, `1 - cos(a, b)`, clamped to `[0, 2]`.
///
/// Zero vectors are at distance 0 from each other and 1 from everything else.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Cosine;

impl DistanceMetric for Cosine {
    fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        debug_assert_eq!(a.len(), b.len());
        let (mut dot, mut na, mut nb) = (0.0, 0.0, 0.0);
        for (x, y) in a.iter().zip(b) {
            dot += x * y;
            na += x * x;
            nb += y * y;
        }
        if na == 0.0 && nb == 0.0 {
            return 0.0;
        }
        if na == 0.0 || nb == 0.0 {
            return 1.0;
        }
        let similarity = (dot / (na * nb).sqrt()).clamp(-1.0, 1.0);
        // Rounding can leave a tiny residue for parallel vectors.
        let d = 1.0 - similarity;
        if d < 1e-15 {
            0.0
        } else {
            d
        }
    }

    fn boxed_clone(&self) -> Box<dyn DistanceMetric> {
        Box::new(*self)
    }

    fn name(&self) -> &'static str {
        "cosine"
    }

    fn bounded_by_box(&self) -> bool {
        false
    }
}

#[inline]
pub(crate) fn squared_euclidean(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}
