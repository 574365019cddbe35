// src/ensemble.rs

//! Ensemble aggregation
//!
//! Runs every enabled detector independently and merges their candidates
//! per metric. Agreement between detectors produces a single alert with
//! boosted confidence; a failing detector is logged and excluded from the
//! cycle without affecting the others.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::FoghornResult;
use crate::types::{
    AlertCandidate, AnomalyAlert, DetectionConfig, DetectorKind, MetricName, Severity,
};

/// Seam between the aggregator and the individual detection algorithms
#[async_trait]
pub trait Detector: Send + Sync {
    /// Which algorithm this detector implements
    fn kind(&self) -> DetectorKind;

    /// Evaluate the current observations and return zero or more candidates
    async fn detect(
        &self,
        observations: &HashMap<MetricName, f64>,
        now: DateTime<Utc>,
    ) -> FoghornResult<Vec<AlertCandidate>>;
}

/// Runs the enabled detectors and resolves multi-detector agreement
pub struct EnsembleAggregator {
    detectors: Vec<Arc<dyn Detector>>,
    config: Arc<RwLock<DetectionConfig>>,
}

impl EnsembleAggregator {
    pub fn new(detectors: Vec<Arc<dyn Detector>>, config: Arc<RwLock<DetectionConfig>>) -> Self {
        Self { detectors, config }
    }

    /// Run one detection pass over the current observations.
    ///
    /// Returned alerts are fully formed (fresh ids, recommendations
    /// attached) but not yet lifecycle-managed.
    pub async fn detect_all(
        &self,
        observations: &HashMap<MetricName, f64>,
        now: DateTime<Utc>,
    ) -> Vec<AnomalyAlert> {
        let (enabled, alert_threshold) = {
            let config = self.config.read().await;
            (config.enabled_algorithms.clone(), config.alert_threshold)
        };

        let mut by_metric: HashMap<MetricName, Vec<AlertCandidate>> = HashMap::new();
        for detector in &self.detectors {
            if !enabled.contains(&detector.kind()) {
                continue;
            }
            match detector.detect(observations, now).await {
                Ok(candidates) => {
                    for candidate in candidates {
                        by_metric
                            .entry(candidate.metric.clone())
                            .or_default()
                            .push(candidate);
                    }
                }
                Err(e) => {
                    // One failing detector never aborts the others
                    warn!(
                        detector = detector.kind().as_str(),
                        error = %e,
                        "Detector failed, excluding from this cycle"
                    );
                }
            }
        }

        let mut alerts = Vec::new();
        for (metric, candidates) in by_metric {
            let Some(merged) = resolve(candidates) else {
                continue;
            };
            if merged.confidence < alert_threshold {
                debug!(
                    metric = %metric,
                    confidence = merged.confidence,
                    "Candidate below alert threshold, discarded"
                );
                continue;
            }
            alerts.push(into_alert(merged, now));
        }
        alerts
    }
}

/// Combined confidence for agreeing detectors: boosted mean, capped at 1.0
pub(crate) fn merge_confidence(confidences: &[f64]) -> f64 {
    if confidences.is_empty() {
        return 0.0;
    }
    let average = confidences.iter().sum::<f64>() / confidences.len() as f64;
    (average * 1.2).min(1.0)
}

/// Collapse a metric's candidates into one.
///
/// One detector kind: highest-confidence candidate passes through
/// unchanged. Two or more kinds: merged ensemble candidate with boosted
/// confidence, max severity, and the union of pattern tags.
fn resolve(mut candidates: Vec<AlertCandidate>) -> Option<AlertCandidate> {
    let mut kinds: Vec<DetectorKind> = candidates.iter().map(|c| c.detector).collect();
    kinds.sort_by_key(|k| k.as_str());
    kinds.dedup();

    if kinds.len() < 2 {
        candidates.sort_by(|a, b| {
            a.confidence
                .partial_cmp(&b.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        return candidates.pop();
    }

    let confidences: Vec<f64> = candidates.iter().map(|c| c.confidence).collect();
    let confidence = merge_confidence(&confidences);
    let severity = candidates
        .iter()
        .map(|c| c.severity)
        .max()
        .unwrap_or(Severity::Low);

    // The highest-severity candidate (confidence as tie-break) anchors
    // the merged value and expected range
    let anchor = candidates
        .iter()
        .max_by(|a, b| {
            a.severity.cmp(&b.severity).then(
                a.confidence
                    .partial_cmp(&b.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
        })
        .cloned()?;

    let mut patterns: Vec<String> = Vec::new();
    let mut context: HashMap<String, String> = HashMap::new();
    for candidate in &candidates {
        for pattern in &candidate.patterns {
            if !patterns.contains(pattern) {
                patterns.push(pattern.clone());
            }
        }
        context.extend(candidate.context.clone());
    }
    patterns.push("ensemble_detection".to_string());
    context.insert(
        "detectors".to_string(),
        kinds
            .iter()
            .map(|k| k.as_str())
            .collect::<Vec<_>>()
            .join(","),
    );

    Some(AlertCandidate {
        metric: anchor.metric,
        value: anchor.value,
        expected_range: anchor.expected_range,
        severity,
        confidence,
        patterns,
        context,
        detector: DetectorKind::Ensemble,
    })
}

/// Promote a resolved candidate to a managed alert
fn into_alert(candidate: AlertCandidate, now: DateTime<Utc>) -> AnomalyAlert {
    let recommendations = recommendations_for(&candidate);
    AnomalyAlert {
        id: Uuid::new_v4(),
        timestamp: now,
        metric: candidate.metric,
        value: candidate.value,
        expected_range: candidate.expected_range,
        severity: candidate.severity,
        confidence: candidate.confidence,
        patterns: candidate.patterns,
        context: candidate.context,
        recommendations,
        acknowledged: false,
        resolved: false,
        resolved_at: None,
    }
}

fn recommendations_for(candidate: &AlertCandidate) -> Vec<String> {
    let mut recommendations = Vec::new();
    match candidate.severity {
        Severity::Critical => {
            recommendations.push(format!(
                "Investigate '{}' immediately; value {:.2} is far outside the expected range",
                candidate.metric, candidate.value
            ));
            recommendations.push("Check recent deployments and upstream dependencies".to_string());
        }
        Severity::High => {
            recommendations.push(format!(
                "Review '{}' within the hour; sustained deviation detected",
                candidate.metric
            ));
        }
        Severity::Medium => {
            recommendations.push(format!(
                "Watch '{}' over the next few evaluation cycles",
                candidate.metric
            ));
        }
        Severity::Low => {
            recommendations.push(format!(
                "No action needed for '{}' unless the deviation persists",
                candidate.metric
            ));
        }
    }
    if candidate.patterns.iter().any(|p| p == "ensemble_detection") {
        recommendations.push("Multiple detectors agree; treat as high signal".to_string());
    }
    recommendations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FoghornError;

    struct FixedDetector {
        kind: DetectorKind,
        candidates: Vec<AlertCandidate>,
    }

    #[async_trait]
    impl Detector for FixedDetector {
        fn kind(&self) -> DetectorKind {
            self.kind
        }

        async fn detect(
            &self,
            _observations: &HashMap<MetricName, f64>,
            _now: DateTime<Utc>,
        ) -> FoghornResult<Vec<AlertCandidate>> {
            Ok(self.candidates.clone())
        }
    }

    struct FailingDetector;

    #[async_trait]
    impl Detector for FailingDetector {
        fn kind(&self) -> DetectorKind {
            DetectorKind::Autoencoder
        }

        async fn detect(
            &self,
            _observations: &HashMap<MetricName, f64>,
            _now: DateTime<Utc>,
        ) -> FoghornResult<Vec<AlertCandidate>> {
            Err(FoghornError::model_not_found("cpu_usage"))
        }
    }

    fn candidate(
        metric: &str,
        kind: DetectorKind,
        severity: Severity,
        confidence: f64,
    ) -> AlertCandidate {
        AlertCandidate {
            metric: metric.to_string(),
            value: 99.0,
            expected_range: (10.0, 80.0),
            severity,
            confidence,
            patterns: vec![format!("{}_pattern", kind.as_str())],
            context: HashMap::new(),
            detector: kind,
        }
    }

    fn aggregator(detectors: Vec<Arc<dyn Detector>>) -> EnsembleAggregator {
        let config = Arc::new(RwLock::new(DetectionConfig::default()));
        EnsembleAggregator::new(detectors, config)
    }

    #[test]
    fn merged_confidence_is_boosted_mean_capped_at_one() {
        assert!((merge_confidence(&[0.6, 0.8]) - 0.84).abs() < 1e-9);
        assert!((merge_confidence(&[0.95, 0.95]) - 1.0).abs() < 1e-9);
        assert!((0.0..=1.0).contains(&merge_confidence(&[0.1, 0.2, 0.3])));
    }

    #[tokio::test]
    async fn agreement_merges_into_single_ensemble_alert() {
        let stat = FixedDetector {
            kind: DetectorKind::Statistical,
            candidates: vec![candidate(
                "cpu_usage",
                DetectorKind::Statistical,
                Severity::High,
                0.6,
            )],
        };
        let auto = FixedDetector {
            kind: DetectorKind::Autoencoder,
            candidates: vec![candidate(
                "cpu_usage",
                DetectorKind::Autoencoder,
                Severity::Medium,
                0.8,
            )],
        };
        let agg = aggregator(vec![Arc::new(stat), Arc::new(auto)]);

        let alerts = agg.detect_all(&HashMap::new(), Utc::now()).await;
        assert_eq!(alerts.len(), 1);

        let alert = &alerts[0];
        assert_eq!(alert.severity, Severity::High);
        assert!((alert.confidence - 0.84).abs() < 1e-9);
        assert!(alert.patterns.iter().any(|p| p == "ensemble_detection"));
        assert!(alert.patterns.iter().any(|p| p == "statistical_pattern"));
        assert!(alert.patterns.iter().any(|p| p == "autoencoder_pattern"));
        assert!(!alert.acknowledged);
        assert!(!alert.resolved);
    }

    #[tokio::test]
    async fn single_detector_result_passes_through_unchanged() {
        let stat = FixedDetector {
            kind: DetectorKind::Statistical,
            candidates: vec![candidate(
                "error_rate",
                DetectorKind::Statistical,
                Severity::Critical,
                0.9,
            )],
        };
        let agg = aggregator(vec![Arc::new(stat)]);

        let alerts = agg.detect_all(&HashMap::new(), Utc::now()).await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::Critical);
        assert!((alerts[0].confidence - 0.9).abs() < 1e-9);
        assert!(!alerts[0].patterns.iter().any(|p| p == "ensemble_detection"));
    }

    #[tokio::test]
    async fn failing_detector_does_not_abort_the_cycle() {
        let stat = FixedDetector {
            kind: DetectorKind::Statistical,
            candidates: vec![candidate(
                "memory_usage",
                DetectorKind::Statistical,
                Severity::High,
                0.7,
            )],
        };
        let agg = aggregator(vec![Arc::new(FailingDetector), Arc::new(stat)]);

        let alerts = agg.detect_all(&HashMap::new(), Utc::now()).await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].metric, "memory_usage");
    }

    #[tokio::test]
    async fn disabled_detector_is_not_run() {
        let auto = FixedDetector {
            kind: DetectorKind::Autoencoder,
            candidates: vec![candidate(
                "cpu_usage",
                DetectorKind::Autoencoder,
                Severity::High,
                0.9,
            )],
        };
        let config = Arc::new(RwLock::new(
            DetectionConfig::builder()
                .enabled_algorithms(vec![DetectorKind::Statistical])
                .build(),
        ));
        let agg = EnsembleAggregator::new(vec![Arc::new(auto)], config);

        let alerts = agg.detect_all(&HashMap::new(), Utc::now()).await;
        assert!(alerts.is_empty());
    }

    #[tokio::test]
    async fn low_confidence_candidates_are_discarded() {
        let stat = FixedDetector {
            kind: DetectorKind::Statistical,
            candidates: vec![candidate(
                "queue_depth",
                DetectorKind::Statistical,
                Severity::Low,
                0.2,
            )],
        };
        let agg = aggregator(vec![Arc::new(stat)]);

        let alerts = agg.detect_all(&HashMap::new(), Utc::now()).await;
        assert!(alerts.is_empty());
    }
}
