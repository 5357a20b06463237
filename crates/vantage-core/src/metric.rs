//! Distance functions
//!
//! Pruning in the query engine is only sound when the metric is symmetric and
//! satisfies the triangle inequality. Nothing here checks that.

/// Distance between two series. Must be symmetric and non-negative.
pub trait Metric<S: ?Sized>: Send + Sync {
    fn distance(&self, a: &S, b: &S) -> f64;
}

impl<S: ?Sized, F> Metric<S> for F
where
    F: Fn(&S, &S) -> f64 + Send + Sync,
{
    #[inline]
    fn distance(&self, a: &S, b: &S) -> f64 {
        self(a, b)
    }
}

/// L2 distance over equal-length real vectors
#[derive(Debug, Clone, Copy, Default)]
pub struct Euclidean;

impl Metric<[f64]> for Euclidean {
    #[inline]
    fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        l2_distance(a, b)
    }
}

impl Metric<Vec<f64>> for Euclidean {
    #[inline]
    fn distance(&self, a: &Vec<f64>, b: &Vec<f64>) -> f64 {
        l2_distance(a, b)
    }
}

/// Absolute difference on the real line
#[derive(Debug, Clone, Copy, Default)]
pub struct Absolute;

impl Metric<f64> for Absolute {
    #[inline]
    fn distance(&self, a: &f64, b: &f64) -> f64 {
        (a - b).abs()
    }
}

/// Compute L2² distance
///
/// # Panics
/// Debug-asserts that both slices have the same length.
#[inline]
pub fn l2_distance_squared(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len(), "Vector dimensions must match");
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Compute L2 distance
#[inline]
pub fn l2_distance(a: &[f64], b: &[f64]) -> f64 {
    l2_distance_squared(a, b).sqrt()
}
