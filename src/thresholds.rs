// src/thresholds.rs

//! Statistical threshold detection
//!
//! Maintains a per-metric mean/stddev envelope computed from a historical
//! window. Values outside `mean ± multiplier * std_dev` become alert
//! candidates, with severity tiered by how many standard deviations the
//! value sits from the mean.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::callbacks::MetricSource;
use crate::ensemble::Detector;
use crate::error::{FoghornError, FoghornResult};
use crate::types::{
    AlertCandidate, DetectionConfig, DetectorKind, MetricName, Severity, StatisticalThreshold,
};
use crate::utils::{clamp01, mean, std_dev};

/// Rolling statistical envelope detector
///
/// Thresholds are recomputed on demand and stored behind `Arc`, replaced
/// wholesale so concurrent readers never observe a half-updated envelope.
pub struct StatisticalThresholdModel {
    source: Arc<dyn MetricSource>,
    config: Arc<RwLock<DetectionConfig>>,
    thresholds: RwLock<HashMap<MetricName, Arc<StatisticalThreshold>>>,
}

impl StatisticalThresholdModel {
    pub fn new(source: Arc<dyn MetricSource>, config: Arc<RwLock<DetectionConfig>>) -> Self {
        Self {
            source,
            config,
            thresholds: RwLock::new(HashMap::new()),
        }
    }

    /// Recompute the envelope for one metric from the trailing window.
    ///
    /// Fails with `InsufficientData` (recording nothing) when the window
    /// holds fewer than `min_samples` points.
    pub async fn update(
        &self,
        metric: &str,
        window_days: u32,
    ) -> FoghornResult<Arc<StatisticalThreshold>> {
        let now = Utc::now();
        let start = now - Duration::days(window_days as i64);
        let samples = self.source.query(metric, start, now).await?;

        let (min_samples, multiplier) = {
            let config = self.config.read().await;
            (
                config.min_samples,
                config.sensitivity.confidence_multiplier(),
            )
        };

        if samples.len() < min_samples {
            return Err(FoghornError::insufficient_data(
                metric,
                min_samples,
                samples.len(),
            ));
        }

        let values: Vec<f64> = samples.iter().map(|s| s.value).collect();
        let mean = mean(&values);
        let std_dev = std_dev(&values);

        let threshold = Arc::new(StatisticalThreshold {
            metric: metric.to_string(),
            mean,
            std_dev,
            upper_bound: mean + multiplier * std_dev,
            lower_bound: mean - multiplier * std_dev,
            confidence_multiplier: multiplier,
            sample_size: values.len(),
            last_updated: now,
        });

        debug!(
            metric = metric,
            mean = mean,
            std_dev = std_dev,
            samples = values.len(),
            "Updated statistical threshold"
        );

        self.thresholds
            .write()
            .await
            .insert(metric.to_string(), Arc::clone(&threshold));
        Ok(threshold)
    }

    /// Recompute envelopes only for metrics that do not have one yet
    pub async fn ensure(&self, metrics: &[MetricName], window_days: u32) {
        for metric in metrics {
            if self.threshold(metric).await.is_some() {
                continue;
            }
            if let Err(e) = self.update(metric, window_days).await {
                debug!(metric = %metric, error = %e, "Threshold not yet computable");
            }
        }
    }

    /// Recompute envelopes for all given metrics, logging per-metric failures
    pub async fn refresh_all(&self, metrics: &[MetricName], window_days: u32) {
        for metric in metrics {
            if let Err(e) = self.update(metric, window_days).await {
                debug!(metric = %metric, error = %e, "Threshold refresh skipped");
            }
        }
    }

    /// Current envelope for a metric, if one has been computed
    pub async fn threshold(&self, metric: &str) -> Option<Arc<StatisticalThreshold>> {
        self.thresholds.read().await.get(metric).cloned()
    }

    /// Copy of every stored envelope, for export
    pub async fn snapshot(&self) -> Vec<StatisticalThreshold> {
        self.thresholds
            .read()
            .await
            .values()
            .map(|t| t.as_ref().clone())
            .collect()
    }

    /// Restore envelopes from an exported snapshot
    pub async fn restore(&self, thresholds: Vec<StatisticalThreshold>) {
        let mut registry = self.thresholds.write().await;
        for threshold in thresholds {
            registry.insert(threshold.metric.clone(), Arc::new(threshold));
        }
    }

    /// Evaluate one observation against its envelope
    pub async fn evaluate(&self, metric: &str, value: f64) -> Option<AlertCandidate> {
        let threshold = self.threshold(metric).await?;
        candidate_for(&threshold, value)
    }
}

/// Build an alert candidate when a value violates an envelope
fn candidate_for(threshold: &StatisticalThreshold, value: f64) -> Option<AlertCandidate> {
    if !threshold.is_violated(value) {
        return None;
    }

    let ratio = threshold.deviation_ratio(value);
    let severity = if ratio.is_infinite() {
        Severity::Critical
    } else {
        Severity::from_deviation_ratio(ratio)
    };
    // Confidence grows toward 1.0 as the deviation ratio grows
    let confidence = if ratio.is_infinite() {
        1.0
    } else {
        clamp01(1.0 - 1.0 / ratio.powi(2))
    };

    let direction = if value > threshold.upper_bound {
        "above_expected"
    } else {
        "below_expected"
    };

    let mut context = HashMap::new();
    context.insert("mean".to_string(), format!("{:.3}", threshold.mean));
    context.insert("std_dev".to_string(), format!("{:.3}", threshold.std_dev));
    context.insert(
        "deviation_ratio".to_string(),
        if ratio.is_infinite() {
            "inf".to_string()
        } else {
            format!("{:.2}", ratio)
        },
    );

    Some(AlertCandidate {
        metric: threshold.metric.clone(),
        value,
        expected_range: (threshold.lower_bound, threshold.upper_bound),
        severity,
        confidence,
        patterns: vec!["threshold_violation".to_string(), direction.to_string()],
        context,
        detector: DetectorKind::Statistical,
    })
}

#[async_trait]
impl Detector for StatisticalThresholdModel {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Statistical
    }

    async fn detect(
        &self,
        observations: &HashMap<MetricName, f64>,
        _now: DateTime<Utc>,
    ) -> FoghornResult<Vec<AlertCandidate>> {
        let thresholds = self.thresholds.read().await;
        let mut candidates = Vec::new();
        for (metric, value) in observations {
            if let Some(threshold) = thresholds.get(metric) {
                if let Some(candidate) = candidate_for(threshold, *value) {
                    candidates.push(candidate);
                }
            }
        }
        Ok(candidates)
    }
}
