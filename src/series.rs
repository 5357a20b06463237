//! Time series container, synthetic generator and standardized distance
//!
//! Only what the search pipeline needs: ordered `(time, value)` samples,
//! summary statistics, linear interpolation and z-normalization.

use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use vantage_core::metric::{l2_distance, Metric};

/// Sample spacing of generated series
pub const SYNTHETIC_STEP: f64 = 0.01;

/// Samples per generated series (t = 0.00 ..= 0.99)
pub const SYNTHETIC_LEN: usize = 100;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SeriesError {
    #[error("Length mismatch: {times} times, {values} values")]
    LengthMismatch { times: usize, values: usize },

    #[error("Times must be strictly increasing (position {position})")]
    UnsortedTimes { position: usize },

    #[error("Non-finite sample at position {position}")]
    NonFinite { position: usize },

    #[error("Invalid generator parameter: {0}")]
    InvalidParameter(String),
}

#[derive(Deserialize)]
struct SeriesRepr {
    times: Vec<f64>,
    values: Vec<f64>,
}

impl TryFrom<SeriesRepr> for TimeSeries {
    type Error = SeriesError;

    fn try_from(repr: SeriesRepr) -> Result<Self, Self::Error> {
        TimeSeries::new(repr.times, repr.values)
    }
}

/// Values sampled at strictly increasing times
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SeriesRepr")]
pub struct TimeSeries {
    times: Vec<f64>,
    values: Vec<f64>,
}

impl TimeSeries {
    pub fn new(times: Vec<f64>, values: Vec<f64>) -> Result<Self, SeriesError> {
        if times.len() != values.len() {
            return Err(SeriesError::LengthMismatch {
                times: times.len(),
                values: values.len(),
            });
        }
        if let Some(position) = times
            .iter()
            .zip(values.iter())
            .position(|(t, v)| !t.is_finite() || !v.is_finite())
        {
            return Err(SeriesError::NonFinite { position });
        }
        if let Some(position) = times.windows(2).position(|w| w[1] <= w[0]) {
            return Err(SeriesError::UnsortedTimes {
                position: position + 1,
            });
        }
        Ok(Self { times, values })
    }

    /// Values at times 0, 1, 2, ...
    pub fn from_values(values: Vec<f64>) -> Result<Self, SeriesError> {
        let times = (0..values.len()).map(|i| i as f64).collect();
        Self::new(times, values)
    }

    /// Gaussian bump plus white noise on the standard synthetic grid:
    /// `pdf(t; mean, std) + jitter · N(0, 1)`.
    pub fn synthetic<R: Rng + ?Sized>(
        mean: f64,
        std: f64,
        jitter: f64,
        rng: &mut R,
    ) -> Result<Self, SeriesError> {
        if !jitter.is_finite() || jitter < 0.0 {
            return Err(SeriesError::InvalidParameter(format!("jitter {jitter}")));
        }
        let noise = Normal::new(0.0, jitter)
            .map_err(|e| SeriesError::InvalidParameter(format!("jitter {jitter}: {e}")))?;
        if std.is_nan() || std <= 0.0 {
            return Err(SeriesError::InvalidParameter(format!("std {std}")));
        }

        let norm = 1.0 / (std * (2.0 * std::f64::consts::PI).sqrt());
        let times: Vec<f64> = (0..SYNTHETIC_LEN)
            .map(|i| i as f64 * SYNTHETIC_STEP)
            .collect();
        let values = times
            .iter()
            .map(|&t| {
                let z = (t - mean) / std;
                norm * (-0.5 * z * z).exp() + noise.sample(rng)
            })
            .collect();
        Self::new(times, values)
    }

    /// Synthetic series with randomly drawn parameters: mean in [0, 100),
    /// std in [0.1, 10), integer jitter in 1..=10
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Result<Self, SeriesError> {
        let mean = rng.gen_range(0.0..100.0);
        let std = rng.gen_range(0.1..10.0);
        let jitter = rng.gen_range(1..=10) as f64;
        Self::synthetic(mean, std, jitter, rng)
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }

    /// Population standard deviation
    pub fn std(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let mean = self.mean();
        let var = self
            .values
            .iter()
            .map(|v| (v - mean) * (v - mean))
            .sum::<f64>()
            / self.values.len() as f64;
        var.sqrt()
    }

    /// Zero mean, unit variance. A constant series is only centered.
    pub fn standardized(&self) -> Self {
        let mean = self.mean();
        let std = self.std();
        let scale = if std > f64::EPSILON { std } else { 1.0 };
        Self {
            times: self.times.clone(),
            values: self.values.iter().map(|v| (v - mean) / scale).collect(),
        }
    }

    /// Linear interpolation at `at`, clamped to the end values outside the
    /// sampled range
    pub fn interpolate(&self, at: &[f64]) -> Vec<f64> {
        let (Some(&first), Some(&last)) = (self.times.first(), self.times.last()) else {
            return vec![0.0; at.len()];
        };

        at.iter()
            .map(|&t| {
                if t <= first {
                    return self.values[0];
                }
                if t >= last {
                    return self.values[self.values.len() - 1];
                }
                let right = self.times.partition_point(|&x| x < t);
                if self.times[right] == t {
                    return self.values[right];
                }
                let left = right - 1;
                let slope = (self.values[right] - self.values[left])
                    / (self.times[right] - self.times[left]);
                self.values[left] + (t - self.times[left]) * slope
            })
            .collect()
    }
}

/// L2 distance between z-normalized series.
///
/// Series on different time axes are both resampled onto the union of the two
/// axes first, so the distance stays symmetric.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardizedEuclidean;

impl Metric<TimeSeries> for StandardizedEuclidean {
    fn distance(&self, a: &TimeSeries, b: &TimeSeries) -> f64 {
        let a = a.standardized();
        let b = b.standardized();

        if a.times == b.times {
            return l2_distance(&a.values, &b.values);
        }

        let grid = union_grid(&a.times, &b.times);
        l2_distance(&a.interpolate(&grid), &b.interpolate(&grid))
    }
}

fn union_grid(a: &[f64], b: &[f64]) -> Vec<f64> {
    let mut grid: Vec<f64> = a.iter().chain(b.iter()).copied().collect();
    grid.sort_by(f64::total_cmp);
    grid.dedup();
    grid
}
