//! Utility functions for common numeric operations

use crate::types::MetricSample;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Min/max scaling parameters for one feature or target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinMaxScale {
    pub min: f64,
    pub max: f64,
}

impl MinMaxScale {
    pub fn fit(values: impl Iterator<Item = f64>) -> Self {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for v in values {
            min = min.min(v);
            max = max.max(v);
        }
        Self { min, max }
    }

    /// Scale into [0, 1]; a degenerate (constant) range pins to 0.5
    pub fn scale(&self, value: f64) -> f64 {
        let span = self.max - self.min;
        if span.abs() < f64::EPSILON {
            0.5
        } else {
            (value - self.min) / span
        }
    }

    pub fn unscale(&self, value: f64) -> f64 {
        let span = self.max - self.min;
        if span.abs() < f64::EPSILON {
            self.min
        } else {
            self.min + value * span
        }
    }

    pub fn span(&self) -> f64 {
        (self.max - self.min).max(0.0)
    }
}

/// Create a sample stamped with the current time
pub fn sample_now(metric: &str, value: f64) -> MetricSample {
    MetricSample::new(metric, value, Utc::now())
}

/// Create an evenly spaced series ending at `end`, one sample per
/// `step_minutes`, oldest first
pub fn series(
    metric: &str,
    values: &[f64],
    end: DateTime<Utc>,
    step_minutes: i64,
) -> Vec<MetricSample> {
    values
        .iter()
        .enumerate()
        .map(|(i, &value)| {
            let offset = Duration::minutes(step_minutes * (values.len() - 1 - i) as i64);
            MetricSample::new(metric, value, end - offset)
        })
        .collect()
}

/// Clamp to the unit interval
pub fn clamp01(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// Clamp to a percentage score
pub fn clamp_score(value: f64) -> f64 {
    value.clamp(0.0, 100.0)
}

/// Population mean; zero for an empty slice
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation; zero for fewer than two values
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Percentile by nearest-rank on a copy of the values (p in [0, 100])
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let rank = ((p / 100.0) * (sorted.len() - 1) as f64).round() as usize;
    sorted[rank.min(sorted.len() - 1)]
}

/// Ordinary least squares slope over index positions; zero when degenerate
pub fn ols_slope(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let n_f = n as f64;
    let sum_x: f64 = (0..n).map(|i| i as f64).sum();
    let sum_y: f64 = values.iter().sum();
    let sum_xy: f64 = values.iter().enumerate().map(|(i, v)| i as f64 * v).sum();
    let sum_x2: f64 = (0..n).map(|i| (i as f64).powi(2)).sum();

    let denominator = n_f * sum_x2 - sum_x.powi(2);
    if denominator.abs() < f64::EPSILON {
        return 0.0;
    }
    (n_f * sum_xy - sum_x * sum_y) / denominator
}
