// src/forecast.rs

//! Capacity forecasting
//!
//! Trains per-metric linear models over calendar and trend features
//! (hour of day, day of week, recent average/trend/volatility, daily
//! seasonality) and produces point forecasts across five horizons.
//! Long horizons re-derive a feature vector for each future day and
//! re-invoke the model rather than extrapolating in closed form.
//! A crossing is flagged when the forecast itself exceeds the warning
//! threshold; the time-to-crossing estimate comes from linear
//! extrapolation of the recent sample slope.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc, Weekday};
use std::collections::{HashMap, VecDeque};
use std::f64::consts::PI;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::callbacks::MetricSource;
use crate::error::{FoghornError, FoghornResult};
use crate::types::{
    CapacityModel, CapacityThresholds, DetectionConfig, GrowthTrend, MetricName, ModelId,
    Prediction, Timeframe, UtilizationPoint,
};
use crate::utils::{clamp01, mean, ols_slope, std_dev, MinMaxScale};

/// Ordered names of the engineered features
pub const FEATURE_NAMES: [&str; 8] = [
    "hour_of_day",
    "day_of_week",
    "month_of_year",
    "is_weekend",
    "recent_avg",
    "recent_trend",
    "recent_volatility",
    "seasonal",
];

const FEATURE_COUNT: usize = FEATURE_NAMES.len();
/// Trailing samples feeding the recent-context features
const RECENT_WINDOW: usize = 12;
/// Utilization points retained per resource (oldest evicted first)
const HISTORY_CAP: usize = 1000;
/// Seasonality strength below which no seasonality is reported
const SEASONALITY_FLOOR: f64 = 0.3;

const EPOCHS: usize = 500;
const LEARNING_RATE: f64 = 0.1;

/// Descriptor for a trained forecast model (weights stay internal)
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ForecastModelInfo {
    pub id: ModelId,
    pub target: MetricName,
    /// Target metric plus the engineered feature names
    pub features: Vec<String>,
    /// R-squared over the training window, clamped to [0, 1]
    pub accuracy: f64,
    pub trained_at: DateTime<Utc>,
}

/// A trained linear model plus its target scaling
#[derive(Debug, Clone)]
struct PredictionModel {
    info: ForecastModelInfo,
    weights: [f64; FEATURE_COUNT],
    bias: f64,
    target_scale: MinMaxScale,
}

impl PredictionModel {
    fn infer(&self, features: &[f64; FEATURE_COUNT]) -> f64 {
        let scaled: f64 = self
            .weights
            .iter()
            .zip(features)
            .map(|(w, f)| w * f)
            .sum::<f64>()
            + self.bias;
        self.target_scale.unscale(scaled).max(0.0)
    }
}

/// Rolling statistics over the trailing sample window
#[derive(Debug, Clone)]
struct RecentContext {
    average: f64,
    trend: f64,
    volatility: f64,
}

impl RecentContext {
    fn from_values(values: &[f64]) -> Self {
        Self {
            average: mean(values),
            trend: ols_slope(values),
            volatility: std_dev(values),
        }
    }
}

/// Engineered feature vector for a point in time
fn feature_vector(
    at: DateTime<Utc>,
    context: &RecentContext,
    target_scale: &MinMaxScale,
) -> [f64; FEATURE_COUNT] {
    let hour = at.hour() as f64;
    let weekday = at.weekday();
    let is_weekend = matches!(weekday, Weekday::Sat | Weekday::Sun);
    let span = target_scale.span().max(f64::EPSILON);
    [
        hour / 23.0,
        weekday.num_days_from_sunday() as f64 / 6.0,
        at.month0() as f64 / 11.0,
        if is_weekend { 1.0 } else { 0.0 },
        target_scale.scale(context.average),
        context.trend / span,
        context.volatility / span,
        (2.0 * PI * hour / 24.0).sin(),
    ]
}

/// Per-resource capacity forecaster
///
/// Model and capacity registries live behind `RwLock` with wholesale
/// `Arc` replacement; training never mutates an installed model.
pub struct CapacityForecaster {
    source: Arc<dyn MetricSource>,
    config: Arc<RwLock<DetectionConfig>>,
    models: RwLock<HashMap<MetricName, Arc<PredictionModel>>>,
    capacity: RwLock<HashMap<MetricName, CapacityModel>>,
}

impl CapacityForecaster {
    pub fn new(source: Arc<dyn MetricSource>, config: Arc<RwLock<DetectionConfig>>) -> Self {
        Self {
            source,
            config,
            models: RwLock::new(HashMap::new()),
            capacity: RwLock::new(HashMap::new()),
        }
    }

    /// Train a fresh model for one metric and install it.
    ///
    /// Fails with `InsufficientData` below `min_samples`. Cancellation is
    /// checked at epoch boundaries; an interrupted fit installs nothing.
    pub async fn train(
        &self,
        metric: &str,
        training_days: u32,
        cancel: Option<&watch::Receiver<bool>>,
    ) -> FoghornResult<ForecastModelInfo> {
        let now = Utc::now();
        let start = now - Duration::days(training_days as i64);
        let samples = self.source.query(metric, start, now).await?;

        let min_samples = self.config.read().await.min_samples;
        if samples.len() < min_samples {
            return Err(FoghornError::insufficient_data(
                metric,
                min_samples,
                samples.len(),
            ));
        }

        let values: Vec<f64> = samples.iter().map(|s| s.value).collect();
        let target_scale = MinMaxScale::fit(values.iter().copied());

        // Each row pairs the features visible just before a sample with
        // that sample's value; the first window seeds the context
        let mut rows: Vec<([f64; FEATURE_COUNT], f64)> = Vec::new();
        for i in RECENT_WINDOW..samples.len() {
            let context = RecentContext::from_values(&values[i - RECENT_WINDOW..i]);
            let features = feature_vector(samples[i].timestamp, &context, &target_scale);
            rows.push((features, target_scale.scale(values[i])));
        }
        if rows.len() < min_samples.saturating_sub(RECENT_WINDOW).max(2) {
            return Err(FoghornError::insufficient_data(
                metric,
                min_samples,
                rows.len(),
            ));
        }

        let mut weights = [0.0; FEATURE_COUNT];
        let mut bias = 0.0;
        for epoch in 0..EPOCHS {
            if let Some(cancel) = cancel {
                if *cancel.borrow() {
                    debug!(metric = metric, epoch = epoch, "Forecast training cancelled");
                    return Err(FoghornError::engine_not_running(
                        "training interrupted by shutdown",
                    ));
                }
            }
            let mut grad_w = [0.0; FEATURE_COUNT];
            let mut grad_b = 0.0;
            for (features, target) in &rows {
                let predicted: f64 =
                    weights.iter().zip(features).map(|(w, f)| w * f).sum::<f64>() + bias;
                let error = predicted - target;
                for (g, f) in grad_w.iter_mut().zip(features) {
                    *g += error * f;
                }
                grad_b += error;
            }
            let step = LEARNING_RATE / rows.len() as f64;
            for (w, g) in weights.iter_mut().zip(&grad_w) {
                *w -= step * g;
            }
            bias -= step * grad_b;
        }

        let accuracy = clamp01(r_squared(&rows, &weights, bias));
        let mut features = vec![metric.to_string()];
        features.extend(FEATURE_NAMES.iter().map(|n| n.to_string()));
        let model_info = ForecastModelInfo {
            id: Uuid::new_v4(),
            target: metric.to_string(),
            features,
            accuracy,
            trained_at: Utc::now(),
        };

        info!(
            metric = metric,
            samples = samples.len(),
            accuracy = accuracy,
            "Forecast model trained"
        );

        self.models.write().await.insert(
            metric.to_string(),
            Arc::new(PredictionModel {
                info: model_info.clone(),
                weights,
                bias,
                target_scale,
            }),
        );
        Ok(model_info)
    }

    /// Train models for several metrics, isolating per-metric failures
    pub async fn train_all(
        &self,
        metrics: &[MetricName],
        training_days: u32,
        cancel: Option<&watch::Receiver<bool>>,
    ) -> Vec<ForecastModelInfo> {
        let mut trained = Vec::new();
        for metric in metrics {
            match self.train(metric, training_days, cancel).await {
                Ok(model_info) => trained.push(model_info),
                Err(FoghornError::EngineNotRunning { .. }) => break,
                Err(e) => {
                    debug!(metric = %metric, error = %e, "Forecast training skipped");
                }
            }
        }
        trained
    }

    /// Forecast one metric over one horizon.
    ///
    /// Model selection picks the highest-accuracy model trained for the
    /// metric or whose feature set includes it; `ModelNotFound` when none
    /// qualifies, `NoRecentData` when the source has nothing recent.
    pub async fn predict(&self, metric: &str, timeframe: Timeframe) -> FoghornResult<Prediction> {
        let model = self.select_model(metric).await?;
        let window_minutes = self.config.read().await.window_size_minutes;

        let now = Utc::now();
        let start = now - Duration::minutes(window_minutes as i64);
        let recent = self.source.query(metric, start, now).await?;
        if recent.is_empty() {
            return Err(FoghornError::no_recent_data(metric));
        }

        let values: Vec<f64> = recent.iter().map(|s| s.value).collect();
        let current = *values.last().unwrap_or(&0.0);
        let context = RecentContext::from_values(&values);

        let predicted_value = if timeframe.is_long_horizon() {
            self.project_days(&model, &values, now, timeframe)
        } else {
            let at = now + Duration::hours(timeframe.hours() as i64);
            model.infer(&feature_vector(at, &context, &model.target_scale))
        };

        let thresholds = self
            .capacity
            .read()
            .await
            .get(metric)
            .map(|c| c.thresholds)
            .unwrap_or_default();

        // The model's forecast decides whether a crossing is coming; the
        // observed slope only estimates when it happens
        let will_exceed_threshold = predicted_value > thresholds.warning;
        let slope_per_hour = slope_per_hour(&recent);
        let time_to_threshold_hours = if !will_exceed_threshold {
            None
        } else if current >= thresholds.warning {
            Some(0.0)
        } else if slope_per_hour > f64::EPSILON {
            Some((thresholds.warning - current) / slope_per_hour)
        } else {
            None
        };

        let confidence = clamp01(model.info.accuracy * data_quality(&recent, window_minutes, now));

        Ok(Prediction {
            metric: metric.to_string(),
            timeframe,
            predicted_value,
            confidence,
            will_exceed_threshold,
            time_to_threshold_hours,
            generated_at: now,
        })
    }

    /// Forecast every horizon for a metric, storing the results on its
    /// capacity model when one exists
    pub async fn forecast_resource(&self, metric: &str) -> FoghornResult<Vec<Prediction>> {
        let mut predictions = Vec::new();
        for timeframe in Timeframe::all() {
            predictions.push(self.predict(metric, timeframe).await?);
        }
        if let Some(model) = self.capacity.write().await.get_mut(metric) {
            model.forecasts = predictions.clone();
        }
        Ok(predictions)
    }

    /// Day-by-day projection for long horizons: each future day gets its
    /// own feature vector, and predictions feed back into the simulated
    /// recent window
    fn project_days(
        &self,
        model: &PredictionModel,
        recent_values: &[f64],
        now: DateTime<Utc>,
        timeframe: Timeframe,
    ) -> f64 {
        let days = (timeframe.hours() / 24).max(1);
        let mut window: VecDeque<f64> = recent_values
            .iter()
            .rev()
            .take(RECENT_WINDOW)
            .rev()
            .copied()
            .collect();
        let mut projections = Vec::with_capacity(days as usize);

        for day in 1..=days {
            let at = now + Duration::days(day as i64);
            let values: Vec<f64> = window.iter().copied().collect();
            let context = RecentContext::from_values(&values);
            let predicted = model.infer(&feature_vector(at, &context, &model.target_scale));
            projections.push(predicted);
            window.push_back(predicted);
            while window.len() > RECENT_WINDOW {
                window.pop_front();
            }
        }

        if let (Some(first), Some(last)) = (projections.first(), projections.last()) {
            if *first > f64::EPSILON && days > 1 {
                let rate = (last / first).powf(1.0 / days as f64) - 1.0;
                debug!(
                    metric = %model.info.target,
                    days = days,
                    growth_rate = rate,
                    "Long-horizon projection"
                );
            }
        }
        projections.last().copied().unwrap_or(0.0)
    }

    /// Record an observed utilization point and refresh the growth trend
    pub async fn observe_utilization(
        &self,
        resource: &str,
        utilization: f64,
        thresholds: CapacityThresholds,
        now: DateTime<Utc>,
    ) {
        let mut registry = self.capacity.write().await;
        let model = registry
            .entry(resource.to_string())
            .or_insert_with(|| CapacityModel {
                resource: resource.to_string(),
                current_capacity: thresholds.maximum,
                utilization_history: VecDeque::new(),
                growth_trend: GrowthTrend::default(),
                thresholds,
                forecasts: Vec::new(),
            });
        model.thresholds = thresholds;

        let hour_ago = now - Duration::hours(1);
        let mut trailing: Vec<f64> = model
            .utilization_history
            .iter()
            .filter(|p| p.timestamp >= hour_ago)
            .map(|p| p.utilization)
            .collect();
        trailing.push(utilization);

        model.utilization_history.push_back(UtilizationPoint {
            timestamp: now,
            utilization,
            peak: trailing.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            average: mean(&trailing),
        });
        while model.utilization_history.len() > HISTORY_CAP {
            model.utilization_history.pop_front();
        }

        model.growth_trend = growth_trend(&model.utilization_history);
    }

    /// Capacity state for one resource
    pub async fn capacity_for(&self, resource: &str) -> Option<CapacityModel> {
        self.capacity.read().await.get(resource).cloned()
    }

    /// Copy of every tracked capacity model
    pub async fn capacity_snapshot(&self) -> Vec<CapacityModel> {
        self.capacity.read().await.values().cloned().collect()
    }

    /// Descriptors for the installed forecast models
    pub async fn model_infos(&self) -> Vec<ForecastModelInfo> {
        self.models
            .read()
            .await
            .values()
            .map(|m| m.info.clone())
            .collect()
    }

    pub async fn has_model(&self, metric: &str) -> bool {
        self.models.read().await.contains_key(metric)
    }

    async fn select_model(&self, metric: &str) -> FoghornResult<Arc<PredictionModel>> {
        let models = self.models.read().await;
        models
            .values()
            .filter(|m| m.info.target == metric || m.info.features.iter().any(|f| f == metric))
            .max_by(|a, b| {
                a.info
                    .accuracy
                    .partial_cmp(&b.info.accuracy)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .cloned()
            .ok_or_else(|| FoghornError::model_not_found(metric))
    }
}

/// R-squared of the fitted line over the training rows (scaled space)
fn r_squared(rows: &[([f64; FEATURE_COUNT], f64)], weights: &[f64; FEATURE_COUNT], bias: f64) -> f64 {
    let targets: Vec<f64> = rows.iter().map(|(_, t)| *t).collect();
    let target_mean = mean(&targets);
    let ss_tot: f64 = targets.iter().map(|t| (t - target_mean).powi(2)).sum();
    let ss_res: f64 = rows
        .iter()
        .map(|(features, target)| {
            let predicted: f64 =
                weights.iter().zip(features).map(|(w, f)| w * f).sum::<f64>() + bias;
            (predicted - target).powi(2)
        })
        .sum();
    if ss_tot < 1e-9 {
        if ss_res < 1e-9 {
            1.0
        } else {
            0.0
        }
    } else {
        1.0 - ss_res / ss_tot
    }
}

/// Observed slope in value units per hour over a sample window
fn slope_per_hour(samples: &[crate::types::MetricSample]) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }
    let t0 = samples[0].timestamp;
    let xs: Vec<f64> = samples
        .iter()
        .map(|s| (s.timestamp - t0).num_seconds() as f64 / 3600.0)
        .collect();
    let ys: Vec<f64> = samples.iter().map(|s| s.value).collect();

    let n = xs.len() as f64;
    let sum_x: f64 = xs.iter().sum();
    let sum_y: f64 = ys.iter().sum();
    let sum_xy: f64 = xs.iter().zip(&ys).map(|(x, y)| x * y).sum();
    let sum_x2: f64 = xs.iter().map(|x| x * x).sum();
    let denominator = n * sum_x2 - sum_x * sum_x;
    if denominator.abs() < f64::EPSILON {
        return 0.0;
    }
    (n * sum_xy - sum_x * sum_y) / denominator
}

/// Recency and stability discount applied to model accuracy
fn data_quality(samples: &[crate::types::MetricSample], window_minutes: u32, now: DateTime<Utc>) -> f64 {
    let newest = match samples.last() {
        Some(sample) => sample.timestamp,
        None => return 0.0,
    };
    let age_minutes = (now - newest).num_minutes().max(0) as f64;
    let window = window_minutes.max(1) as f64;
    let recency = clamp01(window / window.max(age_minutes));

    let values: Vec<f64> = samples.iter().map(|s| s.value).collect();
    let average = mean(&values);
    let volatility = std_dev(&values);
    let variation = volatility / average.abs().max(1.0);
    let stability = 1.0 / (1.0 + variation);

    clamp01(recency * stability)
}

/// Compound daily growth plus seasonality strength from retained history
fn growth_trend(history: &VecDeque<UtilizationPoint>) -> GrowthTrend {
    let (first, last) = match (history.front(), history.back()) {
        (Some(first), Some(last)) => (first, last),
        _ => return GrowthTrend::default(),
    };
    let elapsed_days = (last.timestamp - first.timestamp).num_seconds() as f64 / 86_400.0;
    if elapsed_days < 1.0 || first.utilization <= f64::EPSILON {
        return GrowthTrend {
            rate: 0.0,
            confidence: clamp01(history.len() as f64 / 100.0) * 0.5,
            seasonality: None,
        };
    }

    let rate = (last.utilization / first.utilization).powf(1.0 / elapsed_days) - 1.0;
    let confidence = clamp01(history.len() as f64 / 100.0);
    GrowthTrend {
        rate,
        confidence,
        seasonality: seasonality_strength(history),
    }
}

/// Daily seasonality: spread of hour-of-day means relative to the overall
/// spread. Reported only when the history spans at least two days.
fn seasonality_strength(history: &VecDeque<UtilizationPoint>) -> Option<f64> {
    let (first, last) = (history.front()?, history.back()?);
    if (last.timestamp - first.timestamp) < Duration::hours(48) {
        return None;
    }

    let mut by_hour: HashMap<u32, Vec<f64>> = HashMap::new();
    for point in history {
        by_hour
            .entry(point.timestamp.hour())
            .or_default()
            .push(point.utilization);
    }
    if by_hour.len() < 2 {
        return None;
    }

    let hourly_means: Vec<f64> = by_hour.values().map(|v| mean(v)).collect();
    let all: Vec<f64> = history.iter().map(|p| p.utilization).collect();
    let overall_spread = std_dev(&all);
    if overall_spread < f64::EPSILON {
        return None;
    }
    let strength = clamp01(std_dev(&hourly_means) / overall_spread);
    (strength > SEASONALITY_FLOOR).then_some(strength)
}
