// src/autoencoder.rs

//! Autoencoder anomaly detection
//!
//! Trains a symmetric encoder-decoder over a fixed feature vector of
//! watched metrics and flags observations whose reconstruction error
//! exceeds the 95th percentile of validation errors. Per-feature
//! contribution attribution turns a vector-level anomaly back into
//! per-metric alert candidates.
//!
//! The trained network is immutable; retraining builds a new instance
//! and swaps it in wholesale.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::callbacks::MetricSource;
use crate::ensemble::Detector;
use crate::error::{FoghornError, FoghornResult};
use crate::types::{
    AlertCandidate, DetectionConfig, DetectorKind, MetricName, ModelInfo, Severity,
};
use crate::utils::{clamp01, percentile, MinMaxScale};

/// Width of the alignment bucket when combining metric streams
const ALIGN_BUCKET_SECONDS: i64 = 60;
/// Fraction of aligned vectors used for training (rest validates)
const TRAIN_SPLIT: f64 = 0.8;
/// Validation percentile that becomes the anomaly threshold
const THRESHOLD_PERCENTILE: f64 = 95.0;
/// Contribution share above which a feature is surfaced individually
const CONTRIBUTION_CUTOFF: f64 = 0.30;

const EPOCHS: usize = 300;
const LEARNING_RATE: f64 = 0.5;

/// One dense layer with sigmoid activation
#[derive(Debug, Clone)]
struct Layer {
    /// weights[output][input]
    weights: Vec<Vec<f64>>,
    bias: Vec<f64>,
}

impl Layer {
    fn random(outputs: usize, inputs: usize) -> Self {
        let mut rng = rand::thread_rng();
        Self {
            weights: (0..outputs)
                .map(|_| (0..inputs).map(|_| rng.gen_range(-0.5..0.5)).collect())
                .collect(),
            bias: vec![0.0; outputs],
        }
    }

    fn forward(&self, input: &[f64]) -> Vec<f64> {
        self.weights
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| {
                let sum: f64 = row.iter().zip(input).map(|(w, x)| w * x).sum();
                sigmoid(sum + b)
            })
            .collect()
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// An immutable trained network plus everything needed for inference
#[derive(Debug, Clone)]
pub struct TrainedAutoencoder {
    info: ModelInfo,
    features: Vec<MetricName>,
    scaling: Vec<MinMaxScale>,
    encoder: Layer,
    decoder: Layer,
    /// 95th-percentile validation reconstruction error
    threshold: f64,
}

impl TrainedAutoencoder {
    fn reconstruct(&self, scaled: &[f64]) -> Vec<f64> {
        let hidden = self.encoder.forward(scaled);
        self.decoder.forward(&hidden)
    }

    /// Mean squared per-vector reconstruction error
    fn reconstruction_error(scaled: &[f64], reconstructed: &[f64]) -> f64 {
        if scaled.is_empty() {
            return 0.0;
        }
        scaled
            .iter()
            .zip(reconstructed)
            .map(|(x, y)| (x - y).powi(2))
            .sum::<f64>()
            / scaled.len() as f64
    }

    pub fn info(&self) -> &ModelInfo {
        &self.info
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

/// Reconstruction-error detector over the watched metric vector
pub struct AutoencoderAnomalyModel {
    source: Arc<dyn MetricSource>,
    config: Arc<RwLock<DetectionConfig>>,
    model: RwLock<Option<Arc<TrainedAutoencoder>>>,
}

impl AutoencoderAnomalyModel {
    pub fn new(source: Arc<dyn MetricSource>, config: Arc<RwLock<DetectionConfig>>) -> Self {
        Self {
            source,
            config,
            model: RwLock::new(None),
        }
    }

    /// Train a fresh network over the given metrics and install it.
    ///
    /// Fails with `InsufficientData` when fewer than `min_samples` aligned
    /// feature vectors exist in the window. Checks the cancel flag at each
    /// epoch boundary and abandons the half-trained network when set.
    pub async fn train(
        &self,
        metrics: &[MetricName],
        training_days: u32,
        cancel: Option<&watch::Receiver<bool>>,
    ) -> FoghornResult<ModelInfo> {
        let now = Utc::now();
        let start = now - Duration::days(training_days as i64);

        let mut streams = Vec::with_capacity(metrics.len());
        for metric in metrics {
            streams.push(self.source.query(metric, start, now).await?);
        }
        let vectors = align_series(&streams);

        let min_samples = self.config.read().await.min_samples;
        if vectors.len() < min_samples {
            return Err(FoghornError::insufficient_data(
                metrics.join(","),
                min_samples,
                vectors.len(),
            ));
        }

        let scaling: Vec<MinMaxScale> = (0..metrics.len())
            .map(|i| MinMaxScale::fit(vectors.iter().map(|v| v[i])))
            .collect();
        let scaled: Vec<Vec<f64>> = vectors
            .iter()
            .map(|v| v.iter().zip(&scaling).map(|(x, s)| s.scale(*x)).collect())
            .collect();

        // Time-ordered split so validation reflects the most recent behavior
        let split = ((scaled.len() as f64) * TRAIN_SPLIT).floor() as usize;
        let split = split.clamp(1, scaled.len() - 1);
        let (train_set, validation_set) = scaled.split_at(split);

        let inputs = metrics.len();
        let hidden = ((inputs + 1) / 2).max(1);
        let mut encoder = Layer::random(hidden, inputs);
        let mut decoder = Layer::random(inputs, hidden);

        for epoch in 0..EPOCHS {
            if let Some(cancel) = cancel {
                if *cancel.borrow() {
                    debug!(epoch = epoch, "Autoencoder training cancelled");
                    return Err(FoghornError::engine_not_running(
                        "training interrupted by shutdown",
                    ));
                }
            }
            train_epoch(&mut encoder, &mut decoder, train_set);
        }

        let trained_at = Utc::now();
        let measure = |set: &[Vec<f64>]| -> Vec<f64> {
            set.iter()
                .map(|x| {
                    let h = encoder.forward(x);
                    let y = decoder.forward(&h);
                    TrainedAutoencoder::reconstruction_error(x, &y)
                })
                .collect()
        };
        let validation_errors = measure(validation_set);
        let threshold = percentile(&validation_errors, THRESHOLD_PERCENTILE);
        let under = validation_errors.iter().filter(|e| **e <= threshold).count();
        let accuracy = clamp01(under as f64 / validation_errors.len().max(1) as f64);

        let model_info = ModelInfo {
            id: Uuid::new_v4(),
            kind: DetectorKind::Autoencoder,
            trained_at,
            accuracy,
            features: metrics.to_vec(),
            is_active: true,
        };
        let trained = Arc::new(TrainedAutoencoder {
            info: model_info.clone(),
            features: metrics.to_vec(),
            scaling,
            encoder,
            decoder,
            threshold,
        });

        info!(
            features = %metrics.join(","),
            vectors = vectors.len(),
            threshold = threshold,
            accuracy = accuracy,
            "Autoencoder trained"
        );

        *self.model.write().await = Some(trained);
        Ok(model_info)
    }

    /// Descriptor for the installed model
    pub async fn model_info(&self) -> FoghornResult<ModelInfo> {
        self.model
            .read()
            .await
            .as_ref()
            .map(|m| m.info.clone())
            .ok_or_else(|| FoghornError::model_not_found("autoencoder"))
    }

    pub async fn has_model(&self) -> bool {
        self.model.read().await.is_some()
    }

    /// Evaluate one observation set against the installed model
    pub async fn evaluate(
        &self,
        observations: &HashMap<MetricName, f64>,
    ) -> Vec<AlertCandidate> {
        let model = match self.model.read().await.as_ref() {
            Some(model) => Arc::clone(model),
            None => return Vec::new(),
        };
        evaluate_with(&model, observations)
    }
}

/// Run the installed model over an observation set
fn evaluate_with(
    model: &TrainedAutoencoder,
    observations: &HashMap<MetricName, f64>,
) -> Vec<AlertCandidate> {
    let mut raw = Vec::with_capacity(model.features.len());
    for feature in &model.features {
        match observations.get(feature) {
            Some(value) => raw.push(*value),
            None => {
                debug!(feature = %feature, "Observation missing, skipping autoencoder pass");
                return Vec::new();
            }
        }
    }

    let scaled: Vec<f64> = raw
        .iter()
        .zip(&model.scaling)
        .map(|(x, s)| s.scale(*x))
        .collect();
    let reconstructed = model.reconstruct(&scaled);
    let error = TrainedAutoencoder::reconstruction_error(&scaled, &reconstructed);
    if error <= model.threshold {
        return Vec::new();
    }

    let ratio = if model.threshold > f64::EPSILON {
        error / model.threshold
    } else {
        f64::INFINITY
    };
    let severity = if ratio.is_infinite() {
        Severity::Critical
    } else {
        Severity::from_deviation_ratio(ratio)
    };
    let confidence = if ratio.is_infinite() {
        1.0
    } else {
        clamp01(0.5 + 0.5 * (1.0 - 1.0 / ratio))
    };

    let shares = contributions(&scaled, &reconstructed);
    let mut flagged: Vec<usize> = (0..model.features.len())
        .filter(|i| shares[*i] > CONTRIBUTION_CUTOFF)
        .collect();
    let distributed = flagged.is_empty();
    if distributed {
        // No single feature dominates; anchor the alert at the strongest one
        if let Some(top) = (0..shares.len()).max_by(|a, b| {
            shares[*a]
                .partial_cmp(&shares[*b])
                .unwrap_or(std::cmp::Ordering::Equal)
        }) {
            flagged.push(top);
        }
    }

    flagged
        .into_iter()
        .map(|i| {
            let scale = &model.scaling[i];
            let expected = scale.unscale(reconstructed[i]);
            // Tolerance band in raw units derived from the error threshold
            let tolerance = model.threshold.sqrt() * scale.span().max(1.0);
            let mut patterns = vec!["high_reconstruction_error".to_string()];
            if distributed {
                patterns.push("distributed_reconstruction_error".to_string());
            }
            let mut context = HashMap::new();
            context.insert("reconstruction_error".to_string(), format!("{:.6}", error));
            context.insert(
                "error_threshold".to_string(),
                format!("{:.6}", model.threshold),
            );
            context.insert(
                "contribution_percent".to_string(),
                format!("{:.1}", shares[i] * 100.0),
            );
            AlertCandidate {
                metric: model.features[i].clone(),
                value: raw[i],
                expected_range: (expected - tolerance, expected + tolerance),
                severity,
                confidence,
                patterns,
                context,
                detector: DetectorKind::Autoencoder,
            }
        })
        .collect()
}

/// One full-batch gradient-descent epoch (MSE loss, sigmoid layers)
fn train_epoch(encoder: &mut Layer, decoder: &mut Layer, samples: &[Vec<f64>]) {
    if samples.is_empty() {
        return;
    }
    let inputs = encoder.weights[0].len();
    let hidden = encoder.weights.len();

    let mut grad_enc_w = vec![vec![0.0; inputs]; hidden];
    let mut grad_enc_b = vec![0.0; hidden];
    let mut grad_dec_w = vec![vec![0.0; hidden]; inputs];
    let mut grad_dec_b = vec![0.0; inputs];

    for x in samples {
        let h = encoder.forward(x);
        let y = decoder.forward(&h);

        // Output deltas through the sigmoid derivative
        let delta_out: Vec<f64> = y
            .iter()
            .zip(x)
            .map(|(yi, xi)| (yi - xi) * yi * (1.0 - yi))
            .collect();
        for i in 0..inputs {
            for j in 0..hidden {
                grad_dec_w[i][j] += delta_out[i] * h[j];
            }
            grad_dec_b[i] += delta_out[i];
        }

        let delta_hidden: Vec<f64> = (0..hidden)
            .map(|j| {
                let back: f64 = (0..inputs).map(|i| delta_out[i] * decoder.weights[i][j]).sum();
                back * h[j] * (1.0 - h[j])
            })
            .collect();
        for j in 0..hidden {
            for k in 0..inputs {
                grad_enc_w[j][k] += delta_hidden[j] * x[k];
            }
            grad_enc_b[j] += delta_hidden[j];
        }
    }

    let step = LEARNING_RATE / samples.len() as f64;
    for j in 0..hidden {
        for k in 0..inputs {
            encoder.weights[j][k] -= step * grad_enc_w[j][k];
        }
        encoder.bias[j] -= step * grad_enc_b[j];
    }
    for i in 0..inputs {
        for j in 0..hidden {
            decoder.weights[i][j] -= step * grad_dec_w[i][j];
        }
        decoder.bias[i] -= step * grad_dec_b[i];
    }
}

/// Each feature's share of the total reconstruction deviation
pub(crate) fn contributions(original: &[f64], reconstructed: &[f64]) -> Vec<f64> {
    let deviations: Vec<f64> = original
        .iter()
        .zip(reconstructed)
        .map(|(x, y)| (x - y).abs())
        .collect();
    let total: f64 = deviations.iter().sum();
    if total < f64::EPSILON {
        return vec![0.0; deviations.len()];
    }
    deviations.into_iter().map(|d| d / total).collect()
}

/// Align per-metric sample streams into feature vectors on fixed time
/// buckets. Values within a bucket are averaged; only buckets where every
/// stream is present produce a vector. Output is time-ordered.
pub(crate) fn align_series(streams: &[Vec<crate::types::MetricSample>]) -> Vec<Vec<f64>> {
    if streams.is_empty() {
        return Vec::new();
    }

    let mut buckets: BTreeMap<i64, Vec<(f64, usize)>> = BTreeMap::new();
    for (feature_idx, samples) in streams.iter().enumerate() {
        for sample in samples {
            let bucket = sample.timestamp.timestamp().div_euclid(ALIGN_BUCKET_SECONDS);
            let entry = buckets
                .entry(bucket)
                .or_insert_with(|| vec![(0.0, 0); streams.len()]);
            entry[feature_idx].0 += sample.value;
            entry[feature_idx].1 += 1;
        }
    }

    buckets
        .into_values()
        .filter(|entry| entry.iter().all(|(_, count)| *count > 0))
        .map(|entry| {
            entry
                .into_iter()
                .map(|(sum, count)| sum / count as f64)
                .collect()
        })
        .collect()
}

#[async_trait]
impl Detector for AutoencoderAnomalyModel {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Autoencoder
    }

    async fn detect(
        &self,
        observations: &HashMap<MetricName, f64>,
        _now: DateTime<Utc>,
    ) -> FoghornResult<Vec<AlertCandidate>> {
        Ok(self.evaluate(observations).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MetricSample;
    use crate::utils::series;

    struct StaticSource {
        samples: Vec<MetricSample>,
    }

    #[async_trait]
    impl MetricSource for StaticSource {
        async fn query(
            &self,
            metric: &str,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> FoghornResult<Vec<MetricSample>> {
            Ok(self
                .samples
                .iter()
                .filter(|s| s.metric == metric && s.timestamp >= start && s.timestamp <= end)
                .cloned()
                .collect())
        }
    }

    fn model_with(samples: Vec<MetricSample>) -> AutoencoderAnomalyModel {
        let source = Arc::new(StaticSource { samples });
        let config = Arc::new(RwLock::new(DetectionConfig::default()));
        AutoencoderAnomalyModel::new(source, config)
    }

    fn metrics() -> Vec<MetricName> {
        vec!["cpu_usage".to_string(), "memory_usage".to_string()]
    }

    /// Correlated, mildly varying pair of series on aligned minutes
    fn correlated_samples(n: usize) -> Vec<MetricSample> {
        let end = Utc::now();
        let cpu: Vec<f64> = (0..n).map(|i| 45.0 + (i % 11) as f64).collect();
        let mem: Vec<f64> = (0..n).map(|i| 25.0 + (i % 11) as f64).collect();
        let mut samples = series("cpu_usage", &cpu, end, 1);
        samples.extend(series("memory_usage", &mem, end, 1));
        samples
    }

    #[tokio::test]
    async fn training_without_enough_aligned_vectors_fails() {
        let model = model_with(correlated_samples(10));
        let result = model.train(&metrics(), 7, None).await;
        assert!(matches!(result, Err(FoghornError::InsufficientData { .. })));
        assert!(!model.has_model().await);
    }

    #[tokio::test]
    async fn training_installs_a_model_with_bounded_accuracy() {
        let model = model_with(correlated_samples(300));
        let info = model.train(&metrics(), 7, None).await.unwrap();

        assert_eq!(info.kind, DetectorKind::Autoencoder);
        assert_eq!(info.features, metrics());
        assert!((0.0..=1.0).contains(&info.accuracy));
        assert!(info.is_active);
        assert!(model.has_model().await);
    }

    #[tokio::test]
    async fn extreme_outlier_is_flagged_with_contribution() {
        let model = model_with(correlated_samples(300));
        model.train(&metrics(), 7, None).await.unwrap();

        // cpu far outside anything seen in training
        let mut observations = HashMap::new();
        observations.insert("cpu_usage".to_string(), 500.0);
        observations.insert("memory_usage".to_string(), 30.0);

        let candidates = model.evaluate(&observations).await;
        assert!(!candidates.is_empty());
        let cpu = candidates.iter().find(|c| c.metric == "cpu_usage").unwrap();
        assert_eq!(cpu.severity, Severity::Critical);
        assert!(cpu.patterns.iter().any(|p| p == "high_reconstruction_error"));
        assert!(cpu.context.contains_key("contribution_percent"));
        assert!(cpu.confidence > 0.5);
    }

    #[tokio::test]
    async fn error_at_threshold_does_not_flag() {
        // Constant series: every aligned vector is identical, so every
        // validation error equals the threshold exactly
        let end = Utc::now();
        let cpu = vec![50.0; 100];
        let mem = vec![30.0; 100];
        let mut samples = series("cpu_usage", &cpu, end, 1);
        samples.extend(series("memory_usage", &mem, end, 1));
        let model = model_with(samples);
        model.train(&metrics(), 7, None).await.unwrap();

        let mut observations = HashMap::new();
        observations.insert("cpu_usage".to_string(), 50.0);
        observations.insert("memory_usage".to_string(), 30.0);
        assert!(model.evaluate(&observations).await.is_empty());
    }

    #[tokio::test]
    async fn missing_observation_skips_the_pass() {
        let model = model_with(correlated_samples(300));
        model.train(&metrics(), 7, None).await.unwrap();

        let mut observations = HashMap::new();
        observations.insert("cpu_usage".to_string(), 500.0);
        assert!(model.evaluate(&observations).await.is_empty());
    }

    #[tokio::test]
    async fn cancelled_training_installs_nothing() {
        let model = model_with(correlated_samples(300));
        let (tx, rx) = watch::channel(true);
        let result = model.train(&metrics(), 7, Some(&rx)).await;
        drop(tx);
        assert!(result.is_err());
        assert!(!model.has_model().await);
    }

    #[tokio::test]
    async fn model_info_before_training_is_model_not_found() {
        let model = model_with(Vec::new());
        assert!(matches!(
            model.model_info().await,
            Err(FoghornError::ModelNotFound { .. })
        ));
    }

    #[test]
    fn contribution_shares_sum_to_one() {
        let shares = contributions(&[1.0, 0.5, 0.5], &[0.0, 0.5, 0.5]);
        assert!((shares[0] - 1.0).abs() < 1e-9);
        assert!(shares[1].abs() < 1e-9);

        let shares = contributions(&[1.0, 1.0], &[0.0, 0.5]);
        assert!((shares.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(shares[0] > shares[1]);
    }

    #[test]
    fn alignment_keeps_only_complete_buckets() {
        let end = Utc::now();
        let cpu = series("cpu_usage", &[1.0, 2.0, 3.0, 4.0], end, 1);
        // Memory missing the two oldest minutes
        let mem = series("memory_usage", &[10.0, 20.0], end, 1);

        let vectors = align_series(&[cpu, mem]);
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0], vec![3.0, 10.0]);
        assert_eq!(vectors[1], vec![4.0, 20.0]);
    }
}
