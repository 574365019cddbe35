// src/types.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

/// Name of a watched metric (e.g., "cpu_usage", "response_time")
pub type MetricName = String;

/// Unique identifier for an anomaly alert
pub type AlertId = Uuid;

/// Unique identifier for a trained model
pub type ModelId = Uuid;

/// A single time-stamped observation of one metric
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSample {
    /// Which metric this sample belongs to
    pub metric: MetricName,
    /// Observed value
    pub value: f64,
    /// When the sample was taken
    pub timestamp: DateTime<Utc>,
}

impl MetricSample {
    pub fn new<S: Into<MetricName>>(metric: S, value: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            metric: metric.into(),
            value,
            timestamp,
        }
    }
}

/// How aggressively detectors flag deviations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sensitivity {
    /// Wide envelope, fewer alerts
    Low,
    /// Balanced envelope
    Medium,
    /// Tight envelope, more alerts
    High,
}

impl Sensitivity {
    /// Multiplier applied to the standard deviation when computing
    /// threshold bounds
    pub fn confidence_multiplier(&self) -> f64 {
        match self {
            Sensitivity::Low => 2.0,
            Sensitivity::Medium => 2.5,
            Sensitivity::High => 3.0,
        }
    }
}

/// Alert severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Severity from the ratio of a value's deviation to the metric's
    /// standard deviation
    pub fn from_deviation_ratio(ratio: f64) -> Self {
        if ratio > 3.0 {
            Severity::Critical
        } else if ratio > 2.0 {
            Severity::High
        } else if ratio > 1.5 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

/// Which detection algorithm produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorKind {
    /// Mean/stddev envelope detector
    Statistical,
    /// Reconstruction-error detector
    Autoencoder,
    /// Merged multi-detector result
    Ensemble,
}

impl DetectorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectorKind::Statistical => "statistical",
            DetectorKind::Autoencoder => "autoencoder",
            DetectorKind::Ensemble => "ensemble",
        }
    }
}

/// Per-metric statistical envelope computed from a historical window.
/// Stored behind `Arc` and replaced wholesale on recompute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticalThreshold {
    pub metric: MetricName,
    pub mean: f64,
    pub std_dev: f64,
    pub upper_bound: f64,
    pub lower_bound: f64,
    /// Multiplier that produced the bounds (sensitivity-derived)
    pub confidence_multiplier: f64,
    /// Number of samples the envelope was computed from
    pub sample_size: usize,
    pub last_updated: DateTime<Utc>,
}

impl StatisticalThreshold {
    /// Whether a value falls outside the envelope
    pub fn is_violated(&self, value: f64) -> bool {
        value < self.lower_bound || value > self.upper_bound
    }

    /// Deviation of a value from the mean, in standard deviations.
    /// A zero-stddev envelope saturates the ratio for any off-mean value.
    pub fn deviation_ratio(&self, value: f64) -> f64 {
        let deviation = (value - self.mean).abs();
        if self.std_dev > f64::EPSILON {
            deviation / self.std_dev
        } else if deviation > f64::EPSILON {
            f64::INFINITY
        } else {
            0.0
        }
    }
}

/// Descriptor for a trained model (weights live with the owning detector)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: ModelId,
    pub kind: DetectorKind,
    pub trained_at: DateTime<Utc>,
    /// Fit quality in [0, 1]
    pub accuracy: f64,
    /// Metrics the model was trained over
    pub features: Vec<MetricName>,
    /// False once superseded by a retrained instance
    pub is_active: bool,
}

/// A detection result before lifecycle management (dedup, cooldown)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertCandidate {
    pub metric: MetricName,
    pub value: f64,
    /// (lower, upper) band the value was expected to stay inside
    pub expected_range: (f64, f64),
    pub severity: Severity,
    /// Detector confidence in [0, 1]
    pub confidence: f64,
    /// Pattern tags (e.g., "threshold_violation", "high_reconstruction_error")
    pub patterns: Vec<String>,
    /// Freeform detector context (e.g., contribution percentages)
    pub context: HashMap<String, String>,
    pub detector: DetectorKind,
}

/// An anomaly alert under lifecycle management
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyAlert {
    pub id: AlertId,
    pub timestamp: DateTime<Utc>,
    pub metric: MetricName,
    pub value: f64,
    pub expected_range: (f64, f64),
    pub severity: Severity,
    pub confidence: f64,
    pub patterns: Vec<String>,
    pub context: HashMap<String, String>,
    /// Human-readable remediation suggestions
    pub recommendations: Vec<String>,
    pub acknowledged: bool,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Forecast horizon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "6h")]
    SixHours,
    #[serde(rename = "24h")]
    OneDay,
    #[serde(rename = "7d")]
    SevenDays,
    #[serde(rename = "30d")]
    ThirtyDays,
}

impl Timeframe {
    pub fn hours(&self) -> u64 {
        match self {
            Timeframe::OneHour => 1,
            Timeframe::SixHours => 6,
            Timeframe::OneDay => 24,
            Timeframe::SevenDays => 168,
            Timeframe::ThirtyDays => 720,
        }
    }

    /// Horizons long enough to require day-by-day iterative projection
    pub fn is_long_horizon(&self) -> bool {
        self.hours() > 24
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::OneHour => "1h",
            Timeframe::SixHours => "6h",
            Timeframe::OneDay => "24h",
            Timeframe::SevenDays => "7d",
            Timeframe::ThirtyDays => "30d",
        }
    }

    pub fn all() -> [Timeframe; 5] {
        [
            Timeframe::OneHour,
            Timeframe::SixHours,
            Timeframe::OneDay,
            Timeframe::SevenDays,
            Timeframe::ThirtyDays,
        ]
    }
}

/// A point forecast for one metric over one horizon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub metric: MetricName,
    pub timeframe: Timeframe,
    pub predicted_value: f64,
    /// Model accuracy scaled by data quality, in [0, 1]
    pub confidence: f64,
    /// Whether the forecast crosses the resource's warning threshold
    pub will_exceed_threshold: bool,
    /// Estimated hours until the threshold is crossed, when it is
    pub time_to_threshold_hours: Option<f64>,
    pub generated_at: DateTime<Utc>,
}

/// One entry in a resource's utilization history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UtilizationPoint {
    pub timestamp: DateTime<Utc>,
    pub utilization: f64,
    /// Highest utilization seen over the trailing hour
    pub peak: f64,
    /// Mean utilization over the trailing hour
    pub average: f64,
}

/// Compound growth derived from the retained utilization history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrowthTrend {
    /// Per-day compound growth rate
    pub rate: f64,
    pub confidence: f64,
    /// Daily seasonality strength when one is detected
    pub seasonality: Option<f64>,
}

impl Default for GrowthTrend {
    fn default() -> Self {
        Self {
            rate: 0.0,
            confidence: 0.0,
            seasonality: None,
        }
    }
}

/// Utilization thresholds for one resource
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CapacityThresholds {
    /// Utilization at which a resource is considered under pressure
    pub warning: f64,
    /// Utilization at which a resource is considered at risk
    pub critical: f64,
    /// Hard ceiling for the resource
    pub maximum: f64,
}

impl Default for CapacityThresholds {
    fn default() -> Self {
        Self {
            warning: 75.0,
            critical: 90.0,
            maximum: 100.0,
        }
    }
}

/// Per-resource capacity state tracked by the forecaster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapacityModel {
    pub resource: MetricName,
    pub current_capacity: f64,
    /// Append-only, bounded to the most recent 1000 points (FIFO)
    pub utilization_history: VecDeque<UtilizationPoint>,
    pub growth_trend: GrowthTrend,
    pub thresholds: CapacityThresholds,
    /// Latest forecasts, superseded wholesale each analysis pass
    pub forecasts: Vec<Prediction>,
}

/// Scaling actions a recommendation can carry. A "maintain" outcome
/// produces no recommendation object at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingAction {
    ScaleUp,
    ScaleDown,
    Optimize,
}

/// Recommendation urgency
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

/// Risk attached to an action or the system as a whole, ordered
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// The next more severe level (saturating at Critical)
    pub fn elevated(&self) -> Self {
        match self {
            RiskLevel::Low => RiskLevel::Medium,
            RiskLevel::Medium => RiskLevel::High,
            RiskLevel::High | RiskLevel::Critical => RiskLevel::Critical,
        }
    }
}

/// Observed capacity/utilization at recommendation time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentState {
    pub capacity: f64,
    pub utilization: f64,
}

/// How and when to carry out a recommendation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImplementationPlan {
    pub timeframe: Timeframe,
    pub steps: Vec<String>,
}

/// A scaling recommendation produced from forecasts and current state.
/// Read-only snapshot, superseded (never merged) by the next pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalingRecommendation {
    pub resource: MetricName,
    pub current_state: CurrentState,
    pub action: ScalingAction,
    pub target_capacity: f64,
    pub priority: Priority,
    /// Capacity delta times the configured per-unit cost rate
    pub estimated_cost: f64,
    pub risk: RiskLevel,
    pub reasoning: Vec<String>,
    pub implementation: ImplementationPlan,
    pub generated_at: DateTime<Utc>,
}

/// Direction a health component is moving between consecutive scores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Improving,
    Stable,
    Degrading,
}

/// Weighted subsystem scores, each clamped to [0, 100]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentScores {
    pub performance: f64,
    pub capacity: f64,
    pub anomalies: f64,
    pub predictions: f64,
}

/// Single system-health figure recomputed each health tick
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemHealthScore {
    /// Weighted overall score, rounded, in [0, 100]
    pub overall: u32,
    pub components: ComponentScores,
    pub trends: HashMap<String, TrendDirection>,
    pub risk_level: RiskLevel,
    pub recommendations: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

/// Counters maintained by the alert lifecycle manager
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertStats {
    pub raised: u64,
    pub deduplicated: u64,
    pub suppressed: u64,
    pub auto_acknowledged: u64,
    pub resolved: u64,
    /// Alerts resolved within five minutes without acknowledgment
    pub false_positives: u64,
}

impl AlertStats {
    pub fn false_positive_rate(&self) -> f64 {
        self.false_positives as f64 / (self.raised.max(1)) as f64
    }
}

/// Detection behavior configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    pub sensitivity: Sensitivity,
    /// Recent-window length used for evaluation and data-quality checks
    pub window_size_minutes: u32,
    /// Minimum samples required to train or compute a threshold
    pub min_samples: usize,
    /// Candidates below this confidence are discarded
    pub alert_threshold: f64,
    /// Repeat-alert suppression window per metric
    pub cooldown_minutes: u32,
    pub enabled_algorithms: Vec<DetectorKind>,
    /// Relative weight of each watched metric in scoring
    pub metric_weights: HashMap<MetricName, f64>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        let mut metric_weights = HashMap::new();
        for metric in [
            "cpu_usage",
            "memory_usage",
            "response_time",
            "error_rate",
            "queue_depth",
        ] {
            metric_weights.insert(metric.to_string(), 1.0);
        }
        Self {
            sensitivity: Sensitivity::Medium,
            window_size_minutes: 60,
            min_samples: 30,
            alert_threshold: 0.5,
            cooldown_minutes: 15,
            enabled_algorithms: vec![DetectorKind::Statistical, DetectorKind::Autoencoder],
            metric_weights,
        }
    }
}

impl DetectionConfig {
    pub fn builder() -> DetectionConfigBuilder {
        DetectionConfigBuilder::new()
    }

    /// Metrics the detectors watch, in stable order
    pub fn watched_metrics(&self) -> Vec<MetricName> {
        let mut metrics: Vec<MetricName> = self.metric_weights.keys().cloned().collect();
        metrics.sort();
        metrics
    }

    pub fn is_enabled(&self, kind: DetectorKind) -> bool {
        self.enabled_algorithms.contains(&kind)
    }
}

/// Builder for detection configurations
#[derive(Debug)]
pub struct DetectionConfigBuilder {
    config: DetectionConfig,
}

impl DetectionConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: DetectionConfig::default(),
        }
    }

    pub fn sensitivity(mut self, sensitivity: Sensitivity) -> Self {
        self.config.sensitivity = sensitivity;
        self
    }

    pub fn window_size_minutes(mut self, minutes: u32) -> Self {
        self.config.window_size_minutes = minutes;
        self
    }

    pub fn min_samples(mut self, count: usize) -> Self {
        self.config.min_samples = count;
        self
    }

    pub fn alert_threshold(mut self, threshold: f64) -> Self {
        self.config.alert_threshold = threshold;
        self
    }

    pub fn cooldown_minutes(mut self, minutes: u32) -> Self {
        self.config.cooldown_minutes = minutes;
        self
    }

    pub fn enabled_algorithms(mut self, algorithms: Vec<DetectorKind>) -> Self {
        self.config.enabled_algorithms = algorithms;
        self
    }

    pub fn metric_weight(mut self, metric: &str, weight: f64) -> Self {
        self.config
            .metric_weights
            .insert(metric.to_string(), weight);
        self
    }

    /// Replace the default watched-metric set entirely
    pub fn metrics(mut self, metrics: &[&str]) -> Self {
        self.config.metric_weights = metrics
            .iter()
            .map(|m| (m.to_string(), 1.0))
            .collect();
        self
    }

    pub fn build(self) -> DetectionConfig {
        self.config
    }
}

impl Default for DetectionConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Main configuration for the foghorn engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoghornConfig {
    /// How often the detection loop runs (seconds)
    pub detection_interval_seconds: u64,
    /// How often the capacity loop runs (seconds)
    pub capacity_interval_seconds: u64,
    /// How often the health loop runs (seconds)
    pub health_interval_seconds: u64,
    /// How often models are automatically retrained (seconds)
    pub retrain_interval_seconds: u64,
    /// Historical window used when training models (days)
    pub training_window_days: u32,
    /// Historical window used when recomputing thresholds (days)
    pub threshold_window_days: u32,
    pub detection: DetectionConfig,
    /// Capacity thresholds per watched resource
    pub resources: HashMap<MetricName, CapacityThresholds>,
    /// Cost rate used for recommendation estimates (per capacity unit)
    pub cost_per_unit: f64,
    /// Whether to log engine decisions
    pub enable_logging: bool,
}

impl Default for FoghornConfig {
    fn default() -> Self {
        Self {
            detection_interval_seconds: 30,
            capacity_interval_seconds: 300,
            health_interval_seconds: 60,
            retrain_interval_seconds: 86_400,
            training_window_days: 30,
            threshold_window_days: 7,
            detection: DetectionConfig::default(),
            resources: HashMap::new(),
            cost_per_unit: 1.0,
            enable_logging: true,
        }
    }
}

impl FoghornConfig {
    pub fn builder() -> FoghornConfigBuilder {
        FoghornConfigBuilder::new()
    }

    /// Thresholds for a resource, falling back to defaults
    pub fn thresholds_for(&self, resource: &str) -> CapacityThresholds {
        self.resources
            .get(resource)
            .copied()
            .unwrap_or_default()
    }
}

/// Builder for creating engine configurations easily
#[derive(Debug)]
pub struct FoghornConfigBuilder {
    config: FoghornConfig,
}

impl FoghornConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: FoghornConfig::default(),
        }
    }

    pub fn detection_interval(mut self, seconds: u64) -> Self {
        self.config.detection_interval_seconds = seconds;
        self
    }

    pub fn capacity_interval(mut self, seconds: u64) -> Self {
        self.config.capacity_interval_seconds = seconds;
        self
    }

    pub fn health_interval(mut self, seconds: u64) -> Self {
        self.config.health_interval_seconds = seconds;
        self
    }

    pub fn retrain_interval(mut self, seconds: u64) -> Self {
        self.config.retrain_interval_seconds = seconds;
        self
    }

    pub fn training_window_days(mut self, days: u32) -> Self {
        self.config.training_window_days = days;
        self
    }

    pub fn threshold_window_days(mut self, days: u32) -> Self {
        self.config.threshold_window_days = days;
        self
    }

    pub fn detection(mut self, detection: DetectionConfig) -> Self {
        self.config.detection = detection;
        self
    }

    pub fn resource(mut self, resource: &str, thresholds: CapacityThresholds) -> Self {
        self.config
            .resources
            .insert(resource.to_string(), thresholds);
        self
    }

    pub fn cost_per_unit(mut self, cost: f64) -> Self {
        self.config.cost_per_unit = cost;
        self
    }

    pub fn enable_logging(mut self, enabled: bool) -> Self {
        self.config.enable_logging = enabled;
        self
    }

    pub fn build(self) -> FoghornConfig {
        self.config
    }
}

impl Default for FoghornConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
