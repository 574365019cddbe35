//! Convenience constructors for common monitoring configurations

use crate::types::{
    CapacityThresholds, DetectionConfig, DetectorKind, FoghornConfig, Sensitivity,
};

/// Detection tuned for a user-facing web service: the five standard
/// metrics, balanced sensitivity, both detectors on
pub fn web_service_detection() -> DetectionConfig {
    DetectionConfig::builder()
        .metrics(&[
            "cpu_usage",
            "memory_usage",
            "response_time",
            "error_rate",
            "queue_depth",
        ])
        .metric_weight("error_rate", 2.0)
        .metric_weight("response_time", 1.5)
        .sensitivity(Sensitivity::Medium)
        .enabled_algorithms(vec![DetectorKind::Statistical, DetectorKind::Autoencoder])
        .build()
}

/// Detection tuned for a queue-driven batch worker: depth and throughput
/// dominate, wide envelopes so bursty backlogs do not page anyone
pub fn batch_worker_detection() -> DetectionConfig {
    DetectionConfig::builder()
        .metrics(&["queue_depth", "cpu_usage", "memory_usage", "error_rate"])
        .metric_weight("queue_depth", 2.0)
        .sensitivity(Sensitivity::Low)
        .cooldown_minutes(30)
        .build()
}

/// Tight envelopes and a short cooldown for latency-critical services
pub fn high_sensitivity_detection() -> DetectionConfig {
    DetectionConfig::builder()
        .sensitivity(Sensitivity::High)
        .cooldown_minutes(5)
        .alert_threshold(0.3)
        .build()
}

/// Capacity thresholds for a percent-scaled resource
pub fn percent_thresholds(warning: f64, critical: f64) -> CapacityThresholds {
    CapacityThresholds {
        warning,
        critical,
        maximum: 100.0,
    }
}

/// A complete engine configuration for a web service: standard detection,
/// percent thresholds on the compute resources
pub fn web_service_config() -> FoghornConfig {
    FoghornConfig::builder()
        .detection(web_service_detection())
        .resource("cpu_usage", percent_thresholds(75.0, 90.0))
        .resource("memory_usage", percent_thresholds(80.0, 95.0))
        .build()
}
