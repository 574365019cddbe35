// src/callbacks.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::error::FoghornResult;
use crate::types::{
    AnomalyAlert, DetectionConfig, MetricName, MetricSample, ScalingRecommendation,
    SystemHealthScore,
};

/// Trait for supplying historical and current metric data
///
/// Implement this to connect the foghorn engine to your metrics store.
/// How metrics are collected from hosts is entirely up to the implementer.
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Fetch time-ordered samples for one metric over a window
    ///
    /// # Arguments
    /// * `metric` - The metric to query
    /// * `start` - Inclusive window start
    /// * `end` - Inclusive window end
    ///
    /// # Returns
    /// * `Ok(samples)` - Samples ordered by timestamp (may be empty)
    /// * `Err(error)` - The store could not be queried
    async fn query(
        &self,
        metric: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> FoghornResult<Vec<MetricSample>>;

    /// Fetch the current value of each requested metric
    ///
    /// Metrics with no current value may be omitted from the map.
    async fn latest(&self, metrics: &[MetricName]) -> FoghornResult<HashMap<MetricName, f64>> {
        // Default implementation: newest sample from a short query window
        let end = Utc::now();
        let start = end - chrono::Duration::minutes(5);
        let mut values = HashMap::new();
        for metric in metrics {
            let samples = self.query(metric, start, end).await?;
            if let Some(sample) = samples.last() {
                values.insert(metric.clone(), sample.value);
            }
        }
        Ok(values)
    }
}

/// Trait for receiving monitoring events
///
/// Implement this to get notified about alerts and health changes.
/// Delivery is fire-and-forget with at-least-once semantics; observer
/// errors are logged and never propagate back into the engine.
#[async_trait]
pub trait MonitorObserver: Send + Sync {
    /// Called when an anomaly alert is raised
    async fn on_anomaly_detected(&self, _alert: &AnomalyAlert) -> FoghornResult<()> {
        // Default implementation: do nothing
        Ok(())
    }

    /// Called when an alert is acknowledged (explicitly or automatically)
    async fn on_alert_acknowledged(&self, _alert: &AnomalyAlert) -> FoghornResult<()> {
        // Default implementation: do nothing
        Ok(())
    }

    /// Called when an alert is resolved
    async fn on_alert_resolved(&self, _alert: &AnomalyAlert) -> FoghornResult<()> {
        // Default implementation: do nothing
        Ok(())
    }

    /// Called after each health evaluation
    async fn on_health_update(&self, _score: &SystemHealthScore) -> FoghornResult<()> {
        // Default implementation: do nothing
        Ok(())
    }

    /// Called when system risk transitions into critical
    async fn on_critical_health(&self, _score: &SystemHealthScore) -> FoghornResult<()> {
        // Default implementation: do nothing
        Ok(())
    }

    /// Called when a new scaling recommendation is produced
    async fn on_scaling_recommendation(
        &self,
        _recommendation: &ScalingRecommendation,
    ) -> FoghornResult<()> {
        // Default implementation: do nothing
        Ok(())
    }

    /// Called when the detection configuration is replaced at runtime
    async fn on_config_updated(&self, _config: &DetectionConfig) -> FoghornResult<()> {
        // Default implementation: do nothing
        Ok(())
    }
}

/// Combine the source and observers into a single struct for easier management
#[derive(Clone)]
pub struct FoghornCallbacks {
    pub source: std::sync::Arc<dyn MetricSource>,
    pub observers: Vec<std::sync::Arc<dyn MonitorObserver>>,
}

impl FoghornCallbacks {
    /// Create a new callback configuration
    pub fn new(source: std::sync::Arc<dyn MetricSource>) -> Self {
        Self {
            source,
            observers: Vec::new(),
        }
    }

    /// Add an observer to receive monitoring events
    pub fn add_observer(mut self, observer: std::sync::Arc<dyn MonitorObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Add multiple observers at once
    pub fn add_observers(mut self, observers: Vec<std::sync::Arc<dyn MonitorObserver>>) -> Self {
        self.observers.extend(observers);
        self
    }
}
