// src/engine.rs

//! The foghorn engine
//!
//! Owns every subsystem (detectors, ensemble, alert lifecycle, forecaster,
//! recommender) and runs them on independent schedules: a detection loop,
//! a capacity loop, a health loop, and a long-interval retrain tick. All
//! writes to shared state happen inside the engine's select! loop; callers
//! interact through a cloneable [`FoghornHandle`] over a command channel.
//!
//! Model training runs in a spawned task so it never blocks scheduling; at
//! most one training job is in flight, guarded by an atomic flag, and
//! shutdown interrupts it cooperatively at the next epoch checkpoint.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch, RwLock};
use tokio::time::{interval, Duration as TokioDuration};
use tracing::{debug, error, info, warn};

use crate::alerts::AlertLifecycleManager;
use crate::autoencoder::AutoencoderAnomalyModel;
use crate::callbacks::FoghornCallbacks;
use crate::ensemble::{Detector, EnsembleAggregator};
use crate::error::{FoghornError, FoghornResult};
use crate::forecast::CapacityForecaster;
use crate::scaling::ScalingRecommender;
use crate::snapshot::MonitorSnapshot;
use crate::thresholds::StatisticalThresholdModel;
use crate::types::{
    AlertId, AnomalyAlert, CapacityModel, CapacityThresholds, ComponentScores, DetectionConfig,
    FoghornConfig, MetricName, Prediction, RiskLevel, ScalingRecommendation, StatisticalThreshold,
    SystemHealthScore, TrendDirection,
};
use crate::utils::clamp_score;

/// Weight of each component in the overall health score
const WEIGHT_PERFORMANCE: f64 = 0.30;
const WEIGHT_CAPACITY: f64 = 0.30;
const WEIGHT_ANOMALIES: f64 = 0.20;
const WEIGHT_PREDICTIONS: f64 = 0.20;

/// Component movement smaller than this counts as stable
const TREND_EPSILON: f64 = 2.0;

/// Commands that can be sent to the foghorn engine
#[derive(Debug)]
pub enum EngineCommand {
    /// Replace the detection configuration at runtime
    UpdateDetectionConfig(DetectionConfig),
    /// Acknowledge an alert by id
    AcknowledgeAlert {
        id: AlertId,
        response: oneshot::Sender<FoghornResult<()>>,
    },
    /// Resolve an alert by id
    ResolveAlert {
        id: AlertId,
        response: oneshot::Sender<FoghornResult<()>>,
    },
    /// Get the unresolved alerts, newest first
    GetActiveAlerts {
        response: oneshot::Sender<Vec<AnomalyAlert>>,
    },
    /// Get the most recent system health score
    GetHealthScore {
        response: oneshot::Sender<Option<SystemHealthScore>>,
    },
    /// Get the latest scaling recommendations
    GetRecommendations {
        response: oneshot::Sender<Vec<ScalingRecommendation>>,
    },
    /// Start a training pass now; fails fast when one is in flight
    Retrain {
        response: oneshot::Sender<FoghornResult<()>>,
    },
    /// Internal: a spawned training task finished
    TrainingComplete { models_trained: usize },
    /// Export the current state as an inspection document
    ExportSnapshot {
        response: oneshot::Sender<FoghornResult<MonitorSnapshot>>,
    },
    /// Restore alert history, thresholds, and stats from a snapshot
    ImportSnapshot {
        snapshot: Box<MonitorSnapshot>,
        response: oneshot::Sender<FoghornResult<()>>,
    },
    /// Get current engine status
    GetStatus {
        response: oneshot::Sender<EngineStatus>,
    },
    /// Shutdown the engine
    Shutdown,
}

/// Status information about the foghorn engine
#[derive(Debug, Clone)]
pub struct EngineStatus {
    pub is_running: bool,
    pub is_training: bool,
    pub active_alerts: usize,
    pub alerts_raised: u64,
    pub models_trained: usize,
    pub last_detection: Option<chrono::DateTime<chrono::Utc>>,
    pub last_health: Option<chrono::DateTime<chrono::Utc>>,
}

/// The main foghorn monitoring engine
pub struct FoghornEngine {
    config: FoghornConfig,
    detection: Arc<RwLock<DetectionConfig>>,
    callbacks: FoghornCallbacks,
    thresholds: Arc<StatisticalThresholdModel>,
    autoencoder: Arc<AutoencoderAnomalyModel>,
    ensemble: EnsembleAggregator,
    forecaster: Arc<CapacityForecaster>,
    recommender: ScalingRecommender,
    alerts: AlertLifecycleManager,
    /// Latest recommendation per resource, superseded each capacity pass
    recommendations: HashMap<MetricName, ScalingRecommendation>,
    /// Latest observed values, refreshed each detection pass
    observations: HashMap<MetricName, f64>,
    last_health: Option<SystemHealthScore>,
    is_training: Arc<AtomicBool>,
    models_trained: usize,
    cancel_tx: watch::Sender<bool>,
    cancel_rx: watch::Receiver<bool>,
    status: Arc<RwLock<EngineStatus>>,
    command_tx: mpsc::UnboundedSender<EngineCommand>,
    command_rx: Option<mpsc::UnboundedReceiver<EngineCommand>>,
}

impl FoghornEngine {
    /// Create a new foghorn engine owning all subsystems
    pub fn new(config: FoghornConfig, callbacks: FoghornCallbacks) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let detection = Arc::new(RwLock::new(config.detection.clone()));

        let thresholds = Arc::new(StatisticalThresholdModel::new(
            Arc::clone(&callbacks.source),
            Arc::clone(&detection),
        ));
        let autoencoder = Arc::new(AutoencoderAnomalyModel::new(
            Arc::clone(&callbacks.source),
            Arc::clone(&detection),
        ));
        let detectors: Vec<Arc<dyn Detector>> = vec![
            Arc::clone(&thresholds) as Arc<dyn Detector>,
            Arc::clone(&autoencoder) as Arc<dyn Detector>,
        ];
        let ensemble = EnsembleAggregator::new(detectors, Arc::clone(&detection));
        let forecaster = Arc::new(CapacityForecaster::new(
            Arc::clone(&callbacks.source),
            Arc::clone(&detection),
        ));
        let recommender = ScalingRecommender::new(config.cost_per_unit);

        Self {
            config,
            detection,
            callbacks,
            thresholds,
            autoencoder,
            ensemble,
            forecaster,
            recommender,
            alerts: AlertLifecycleManager::new(),
            recommendations: HashMap::new(),
            observations: HashMap::new(),
            last_health: None,
            is_training: Arc::new(AtomicBool::new(false)),
            models_trained: 0,
            cancel_tx,
            cancel_rx,
            status: Arc::new(RwLock::new(EngineStatus {
                is_running: false,
                is_training: false,
                active_alerts: 0,
                alerts_raised: 0,
                models_trained: 0,
                last_detection: None,
                last_health: None,
            })),
            command_tx,
            command_rx: Some(command_rx),
        }
    }

    /// Get a handle to send commands to the engine
    pub fn handle(&self) -> FoghornHandle {
        FoghornHandle {
            command_tx: self.command_tx.clone(),
        }
    }

    /// Start the foghorn engine (consumes self)
    pub async fn start(mut self) -> FoghornResult<()> {
        let mut command_rx = self
            .command_rx
            .take()
            .ok_or_else(|| FoghornError::engine_not_running("Engine already started"))?;

        {
            let mut status = self.status.write().await;
            status.is_running = true;
        }

        info!("Foghorn engine starting");

        let mut detection_timer = interval(TokioDuration::from_secs(
            self.config.detection_interval_seconds.max(1),
        ));
        let mut capacity_timer = interval(TokioDuration::from_secs(
            self.config.capacity_interval_seconds.max(1),
        ));
        let mut health_timer = interval(TokioDuration::from_secs(
            self.config.health_interval_seconds.max(1),
        ));
        let mut retrain_timer = interval(TokioDuration::from_secs(
            self.config.retrain_interval_seconds.max(1),
        ));

        loop {
            tokio::select! {
                command = command_rx.recv() => {
                    match command {
                        Some(EngineCommand::Shutdown) => {
                            info!("Shutdown command received");
                            break;
                        }
                        Some(cmd) => self.handle_command(cmd).await,
                        None => {
                            info!("Command channel closed, shutting down engine");
                            break;
                        }
                    }
                }

                _ = detection_timer.tick() => {
                    if let Err(e) = self.detection_cycle().await {
                        error!(error = %e, "Detection cycle failed");
                    }
                }

                _ = capacity_timer.tick() => {
                    if let Err(e) = self.capacity_cycle().await {
                        error!(error = %e, "Capacity cycle failed");
                    }
                }

                _ = health_timer.tick() => {
                    self.health_cycle().await;
                }

                _ = retrain_timer.tick() => {
                    if let Err(e) = self.spawn_training() {
                        debug!(error = %e, "Scheduled retrain skipped");
                    }
                }
            }
        }

        // Interrupt any in-flight training at its next checkpoint
        let _ = self.cancel_tx.send(true);

        {
            let mut status = self.status.write().await;
            status.is_running = false;
        }

        info!("Foghorn engine stopped");
        Ok(())
    }

    /// Handle one incoming command (Shutdown is handled by the loop)
    async fn handle_command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::UpdateDetectionConfig(new_config) => {
                *self.detection.write().await = new_config.clone();
                info!("Detection configuration updated");
                self.notify(|o| {
                    let config = new_config.clone();
                    async move { o.on_config_updated(&config).await }
                })
                .await;
            }
            EngineCommand::AcknowledgeAlert { id, response } => {
                let result = self.alerts.acknowledge(id);
                if let Ok(Some(alert)) = &result {
                    let alert = alert.clone();
                    self.notify(|o| {
                        let alert = alert.clone();
                        async move { o.on_alert_acknowledged(&alert).await }
                    })
                    .await;
                }
                let _ = response.send(result.map(|_| ()));
            }
            EngineCommand::ResolveAlert { id, response } => {
                let result = self.alerts.resolve(id, chrono::Utc::now());
                if let Ok(Some(alert)) = &result {
                    let alert = alert.clone();
                    self.notify(|o| {
                        let alert = alert.clone();
                        async move { o.on_alert_resolved(&alert).await }
                    })
                    .await;
                }
                self.sync_status().await;
                let _ = response.send(result.map(|_| ()));
            }
            EngineCommand::GetActiveAlerts { response } => {
                let _ = response.send(self.alerts.active_alerts());
            }
            EngineCommand::GetHealthScore { response } => {
                let _ = response.send(self.last_health.clone());
            }
            EngineCommand::GetRecommendations { response } => {
                let mut recommendations: Vec<ScalingRecommendation> =
                    self.recommendations.values().cloned().collect();
                recommendations.sort_by(|a, b| a.resource.cmp(&b.resource));
                let _ = response.send(recommendations);
            }
            EngineCommand::Retrain { response } => {
                let _ = response.send(self.spawn_training());
            }
            EngineCommand::TrainingComplete { models_trained } => {
                self.is_training.store(false, Ordering::SeqCst);
                self.models_trained = models_trained;
                info!(models = models_trained, "Training pass complete");
                self.sync_status().await;
            }
            EngineCommand::ExportSnapshot { response } => {
                let snapshot = self.export_snapshot().await;
                let _ = response.send(Ok(snapshot));
            }
            EngineCommand::ImportSnapshot { snapshot, response } => {
                self.alerts =
                    AlertLifecycleManager::restore(snapshot.alert_history, snapshot.stats);
                self.thresholds.restore(snapshot.thresholds).await;
                *self.detection.write().await = snapshot.config;
                self.sync_status().await;
                info!("Snapshot imported");
                let _ = response.send(Ok(()));
            }
            EngineCommand::GetStatus { response } => {
                self.sync_status().await;
                let _ = response.send(self.status.read().await.clone());
            }
            EngineCommand::Shutdown => unreachable!("Shutdown handled by the engine loop"),
        }
    }

    /// One detection pass: observe, detect, lifecycle, notify
    async fn detection_cycle(&mut self) -> FoghornResult<()> {
        let now = chrono::Utc::now();
        let (metrics, cooldown_minutes) = {
            let detection = self.detection.read().await;
            (detection.watched_metrics(), detection.cooldown_minutes)
        };
        if metrics.is_empty() {
            return Ok(());
        }

        // Envelopes for metrics that do not have one yet; full refreshes
        // happen on training passes
        self.thresholds
            .ensure(&metrics, self.config.threshold_window_days)
            .await;

        self.observations = self.callbacks.source.latest(&metrics).await?;
        let detected = self.ensemble.detect_all(&self.observations, now).await;
        let cooldown = chrono::Duration::minutes(cooldown_minutes as i64);
        let raised = self.alerts.ingest(now, detected, cooldown);

        for alert in &raised {
            info!(
                metric = %alert.metric,
                severity = alert.severity.as_str(),
                confidence = alert.confidence,
                "Anomaly alert raised"
            );
            let alert = alert.clone();
            self.notify(|o| {
                let alert = alert.clone();
                async move { o.on_anomaly_detected(&alert).await }
            })
            .await;
        }

        let maintenance = self.alerts.maintain(now);
        for alert in &maintenance.auto_acknowledged {
            let alert = alert.clone();
            self.notify(|o| {
                let alert = alert.clone();
                async move { o.on_alert_acknowledged(&alert).await }
            })
            .await;
        }

        {
            let mut status = self.status.write().await;
            status.last_detection = Some(now);
        }
        self.sync_status().await;
        Ok(())
    }

    /// One capacity pass: record utilization, forecast, recommend
    async fn capacity_cycle(&mut self) -> FoghornResult<()> {
        let now = chrono::Utc::now();
        let resources = self.tracked_resources().await;
        if resources.is_empty() {
            return Ok(());
        }

        let names: Vec<MetricName> = resources.keys().cloned().collect();
        let utilizations = self.callbacks.source.latest(&names).await?;

        for (resource, thresholds) in &resources {
            let Some(utilization) = utilizations.get(resource).copied() else {
                debug!(resource = %resource, "No current utilization, skipping");
                continue;
            };
            self.forecaster
                .observe_utilization(resource, utilization, *thresholds, now)
                .await;

            let predictions: Vec<Prediction> = if self.forecaster.has_model(resource).await {
                match self.forecaster.forecast_resource(resource).await {
                    Ok(predictions) => predictions,
                    Err(e) => {
                        debug!(resource = %resource, error = %e, "Forecast skipped");
                        Vec::new()
                    }
                }
            } else {
                Vec::new()
            };

            let Some(model) = self.forecaster.capacity_for(resource).await else {
                continue;
            };
            match self
                .recommender
                .decide(resource, utilization, &predictions, &model)
            {
                Some(recommendation) => {
                    info!(
                        resource = %resource,
                        action = ?recommendation.action,
                        target = recommendation.target_capacity,
                        "Scaling recommendation produced"
                    );
                    self.recommendations
                        .insert(resource.clone(), recommendation.clone());
                    self.notify(|o| {
                        let recommendation = recommendation.clone();
                        async move { o.on_scaling_recommendation(&recommendation).await }
                    })
                    .await;
                }
                None => {
                    self.recommendations.remove(resource);
                }
            }
        }
        Ok(())
    }

    /// One health pass: score, risk, trends, notify
    async fn health_cycle(&mut self) {
        let now = chrono::Utc::now();
        let thresholds = self.thresholds.snapshot().await;
        let capacity = self.forecaster.capacity_snapshot().await;
        let weights = self.detection.read().await.metric_weights.clone();

        // Only detection model accuracy scales the anomaly subscore;
        // forecast fit quality already shows up in the predictions subscore
        let detection_accuracy = match self.autoencoder.model_info().await {
            Ok(info) => info.accuracy,
            Err(_) => 1.0,
        };

        let active_alerts = self.alerts.unresolved_count();
        let components = ComponentScores {
            performance: performance_subscore(&self.observations, &weights, &thresholds),
            capacity: capacity_subscore(&capacity),
            anomalies: anomaly_subscore(
                active_alerts,
                detection_accuracy,
                self.alerts.stats().false_positive_rate(),
            ),
            predictions: predictions_subscore(&capacity),
        };
        let overall = overall_score(&components);
        let any_critical_capacity = components.capacity <= 20.0;
        let risk_level = risk_for(overall, any_critical_capacity, active_alerts);

        let trends = match &self.last_health {
            Some(previous) => component_trends(&previous.components, &components),
            None => HashMap::new(),
        };
        let recommendations = health_recommendations(&components, &self.recommendations);

        let score = SystemHealthScore {
            overall,
            components,
            trends,
            risk_level,
            recommendations,
            generated_at: now,
        };

        debug!(
            overall = score.overall,
            risk = ?score.risk_level,
            active_alerts = active_alerts,
            "Health evaluated"
        );

        let became_critical = risk_level == RiskLevel::Critical
            && self
                .last_health
                .as_ref()
                .map(|previous| previous.risk_level != RiskLevel::Critical)
                .unwrap_or(true);

        self.last_health = Some(score.clone());
        {
            let mut status = self.status.write().await;
            status.last_health = Some(now);
        }

        self.notify(|o| {
            let score = score.clone();
            async move { o.on_health_update(&score).await }
        })
        .await;
        if became_critical {
            warn!(overall = score.overall, "System health became critical");
            self.notify(|o| {
                let score = score.clone();
                async move { o.on_critical_health(&score).await }
            })
            .await;
        }
    }

    /// Kick off a training pass in a spawned task.
    ///
    /// Fails fast with `TrainingInProgress` when one is already in flight;
    /// the flag clears when the task reports back through the channel.
    fn spawn_training(&self) -> FoghornResult<()> {
        if self
            .is_training
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(FoghornError::training_in_progress(
                "a training pass is already running",
            ));
        }

        let autoencoder = Arc::clone(&self.autoencoder);
        let forecaster = Arc::clone(&self.forecaster);
        let thresholds = Arc::clone(&self.thresholds);
        let detection = Arc::clone(&self.detection);
        let command_tx = self.command_tx.clone();
        let cancel = self.cancel_rx.clone();
        let training_days = self.config.training_window_days;
        let threshold_days = self.config.threshold_window_days;

        tokio::spawn(async move {
            let metrics = detection.read().await.watched_metrics();
            let mut trained = 0;

            thresholds.refresh_all(&metrics, threshold_days).await;

            match autoencoder
                .train(&metrics, training_days, Some(&cancel))
                .await
            {
                Ok(info) => {
                    trained += 1;
                    debug!(accuracy = info.accuracy, "Autoencoder retrained");
                }
                Err(FoghornError::EngineNotRunning { .. }) => {
                    debug!("Training interrupted by shutdown");
                    let _ = command_tx.send(EngineCommand::TrainingComplete {
                        models_trained: trained,
                    });
                    return;
                }
                Err(e) => debug!(error = %e, "Autoencoder training skipped"),
            }

            trained += forecaster
                .train_all(&metrics, training_days, Some(&cancel))
                .await
                .len();

            let _ = command_tx.send(EngineCommand::TrainingComplete {
                models_trained: trained,
            });
        });
        Ok(())
    }

    /// Resources the capacity loop tracks: configured ones, or every
    /// watched metric under default thresholds when none are configured
    async fn tracked_resources(&self) -> HashMap<MetricName, CapacityThresholds> {
        if !self.config.resources.is_empty() {
            return self.config.resources.clone();
        }
        self.detection
            .read()
            .await
            .watched_metrics()
            .into_iter()
            .map(|m| (m, CapacityThresholds::default()))
            .collect()
    }

    /// Build the inspection document (model weights stay internal)
    async fn export_snapshot(&self) -> MonitorSnapshot {
        let mut models = Vec::new();
        if let Ok(info) = self.autoencoder.model_info().await {
            models.push(info);
        }
        MonitorSnapshot {
            exported_at: chrono::Utc::now(),
            config: self.detection.read().await.clone(),
            models,
            forecast_models: self.forecaster.model_infos().await,
            alert_history: self.alerts.history().iter().cloned().collect(),
            thresholds: self.thresholds.snapshot().await,
            stats: self.alerts.stats().clone(),
        }
    }

    /// Fan an event out to every observer; observer errors are logged,
    /// never propagated
    async fn notify<F, Fut>(&self, event: F)
    where
        F: Fn(Arc<dyn crate::callbacks::MonitorObserver>) -> Fut,
        Fut: std::future::Future<Output = FoghornResult<()>>,
    {
        let deliveries = self
            .callbacks
            .observers
            .iter()
            .map(|observer| event(Arc::clone(observer)));
        for result in futures::future::join_all(deliveries).await {
            if let Err(e) = result {
                warn!(error = %e, "Observer notification failed");
            }
        }
    }

    async fn sync_status(&self) {
        let mut status = self.status.write().await;
        status.is_training = self.is_training.load(Ordering::SeqCst);
        status.active_alerts = self.alerts.unresolved_count();
        status.alerts_raised = self.alerts.stats().raised;
        status.models_trained = self.models_trained;
    }
}

/// Handle for interacting with a running foghorn engine
#[derive(Clone)]
pub struct FoghornHandle {
    command_tx: mpsc::UnboundedSender<EngineCommand>,
}

impl FoghornHandle {
    /// Replace the detection configuration at runtime
    pub async fn update_detection_config(&self, config: DetectionConfig) -> FoghornResult<()> {
        self.command_tx
            .send(EngineCommand::UpdateDetectionConfig(config))?;
        Ok(())
    }

    /// Acknowledge an alert by id
    pub async fn acknowledge_alert(&self, id: AlertId) -> FoghornResult<()> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx.send(EngineCommand::AcknowledgeAlert {
            id,
            response: response_tx,
        })?;
        response_rx.await?
    }

    /// Resolve an alert by id
    pub async fn resolve_alert(&self, id: AlertId) -> FoghornResult<()> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx.send(EngineCommand::ResolveAlert {
            id,
            response: response_tx,
        })?;
        response_rx.await?
    }

    /// Unresolved alerts, newest first
    pub async fn active_alerts(&self) -> FoghornResult<Vec<AnomalyAlert>> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx.send(EngineCommand::GetActiveAlerts {
            response: response_tx,
        })?;
        Ok(response_rx.await?)
    }

    /// Most recent system health score, if one has been computed
    pub async fn health_score(&self) -> FoghornResult<Option<SystemHealthScore>> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx.send(EngineCommand::GetHealthScore {
            response: response_tx,
        })?;
        Ok(response_rx.await?)
    }

    /// Latest scaling recommendations, one per resource
    pub async fn recommendations(&self) -> FoghornResult<Vec<ScalingRecommendation>> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx.send(EngineCommand::GetRecommendations {
            response: response_tx,
        })?;
        Ok(response_rx.await?)
    }

    /// Start a training pass; `TrainingInProgress` when one is running
    pub async fn retrain(&self) -> FoghornResult<()> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx.send(EngineCommand::Retrain {
            response: response_tx,
        })?;
        response_rx.await?
    }

    /// Export the engine state as an inspection document
    pub async fn export_snapshot(&self) -> FoghornResult<MonitorSnapshot> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx.send(EngineCommand::ExportSnapshot {
            response: response_tx,
        })?;
        response_rx.await?
    }

    /// Restore alert history, thresholds, and config from a snapshot
    pub async fn import_snapshot(&self, snapshot: MonitorSnapshot) -> FoghornResult<()> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx.send(EngineCommand::ImportSnapshot {
            snapshot: Box::new(snapshot),
            response: response_tx,
        })?;
        response_rx.await?
    }

    /// Get current engine status
    pub async fn status(&self) -> FoghornResult<EngineStatus> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx.send(EngineCommand::GetStatus {
            response: response_tx,
        })?;
        Ok(response_rx.await?)
    }

    /// Shutdown the engine
    pub async fn shutdown(&self) -> FoghornResult<()> {
        self.command_tx.send(EngineCommand::Shutdown)?;
        Ok(())
    }
}

/// Anomaly subscore: 90 baseline, minus 10 per active alert (capped at
/// 50), scaled by detection model accuracy, minus 20x the false-positive
/// rate
pub(crate) fn anomaly_subscore(
    active_alerts: usize,
    detection_accuracy: f64,
    false_positive_rate: f64,
) -> f64 {
    let base = 90.0 - (active_alerts as f64 * 10.0).min(50.0);
    clamp_score(base * detection_accuracy.clamp(0.0, 1.0) - false_positive_rate * 20.0)
}

/// Capacity subscore from current utilization against per-resource bands
pub(crate) fn capacity_subscore(models: &[CapacityModel]) -> f64 {
    let mut warnings = 0usize;
    let mut critical = false;
    for model in models {
        let Some(point) = model.utilization_history.back() else {
            continue;
        };
        if point.utilization >= model.thresholds.critical {
            critical = true;
        }
        if point.utilization >= model.thresholds.warning {
            warnings += 1;
        }
    }
    if critical {
        20.0
    } else if warnings > 2 {
        50.0
    } else if warnings > 0 {
        70.0
    } else {
        90.0
    }
}

/// Performance subscore: weighted mean of per-metric scores.
///
/// Percent-like metrics score the headroom left under 100; other metrics
/// score against their statistical envelope when one exists (inside the
/// band is perfect, outside decays with the deviation ratio). 90 when no
/// metric is scorable.
pub(crate) fn performance_subscore(
    observations: &HashMap<MetricName, f64>,
    weights: &HashMap<MetricName, f64>,
    thresholds: &[StatisticalThreshold],
) -> f64 {
    let envelope: HashMap<&str, &StatisticalThreshold> =
        thresholds.iter().map(|t| (t.metric.as_str(), t)).collect();

    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    for (metric, value) in observations {
        let score = if is_percent_like(metric) {
            100.0 - value.clamp(0.0, 100.0)
        } else if let Some(threshold) = envelope.get(metric.as_str()) {
            if threshold.is_violated(*value) {
                let ratio = threshold.deviation_ratio(*value);
                if ratio.is_infinite() {
                    0.0
                } else {
                    clamp_score(100.0 * (1.0 - ratio / 4.0))
                }
            } else {
                100.0
            }
        } else {
            continue;
        };
        let weight = weights.get(metric).copied().unwrap_or(1.0).max(0.0);
        weighted_sum += score * weight;
        weight_total += weight;
    }

    if weight_total <= f64::EPSILON {
        90.0
    } else {
        clamp_score(weighted_sum / weight_total)
    }
}

fn is_percent_like(metric: &str) -> bool {
    metric.ends_with("_usage") || metric.ends_with("_percent") || metric.ends_with("_utilization")
}

/// Predictions subscore: 90 baseline, 60 when a threshold crossing is
/// forecast beyond 24h, 30 when one is forecast within 24h, all scaled by
/// mean forecast confidence
pub(crate) fn predictions_subscore(models: &[CapacityModel]) -> f64 {
    let forecasts: Vec<&Prediction> = models.iter().flat_map(|m| m.forecasts.iter()).collect();
    if forecasts.is_empty() {
        return 90.0;
    }

    let mut crossing_soon = false;
    let mut crossing_later = false;
    for prediction in &forecasts {
        if !prediction.will_exceed_threshold {
            continue;
        }
        let within_day = prediction
            .time_to_threshold_hours
            .map(|h| h <= 24.0)
            .unwrap_or(prediction.timeframe.hours() <= 24);
        if within_day {
            crossing_soon = true;
        } else {
            crossing_later = true;
        }
    }

    let base = if crossing_soon {
        30.0
    } else if crossing_later {
        60.0
    } else {
        90.0
    };
    let mean_confidence =
        forecasts.iter().map(|p| p.confidence).sum::<f64>() / forecasts.len() as f64;
    clamp_score(base * mean_confidence.clamp(0.0, 1.0))
}

/// Weighted overall score, rounded to the nearest integer in [0, 100]
pub(crate) fn overall_score(components: &ComponentScores) -> u32 {
    let overall = WEIGHT_PERFORMANCE * clamp_score(components.performance)
        + WEIGHT_CAPACITY * clamp_score(components.capacity)
        + WEIGHT_ANOMALIES * clamp_score(components.anomalies)
        + WEIGHT_PREDICTIONS * clamp_score(components.predictions);
    clamp_score(overall).round() as u32
}

/// Risk ladder over the overall score and alert pressure
pub(crate) fn risk_for(
    overall: u32,
    any_critical_capacity: bool,
    active_alerts: usize,
) -> RiskLevel {
    if overall < 30 || any_critical_capacity {
        RiskLevel::Critical
    } else if overall < 50 || active_alerts > 3 {
        RiskLevel::High
    } else if overall < 70 || active_alerts > 1 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// Per-component movement between consecutive health scores
pub(crate) fn component_trends(
    previous: &ComponentScores,
    current: &ComponentScores,
) -> HashMap<String, TrendDirection> {
    let pairs = [
        ("performance", previous.performance, current.performance),
        ("capacity", previous.capacity, current.capacity),
        ("anomalies", previous.anomalies, current.anomalies),
        ("predictions", previous.predictions, current.predictions),
    ];
    pairs
        .into_iter()
        .map(|(name, before, after)| {
            let direction = if after - before > TREND_EPSILON {
                TrendDirection::Improving
            } else if before - after > TREND_EPSILON {
                TrendDirection::Degrading
            } else {
                TrendDirection::Stable
            };
            (name.to_string(), direction)
        })
        .collect()
}

/// Actionable summary strings for the health report
fn health_recommendations(
    components: &ComponentScores,
    scaling: &HashMap<MetricName, ScalingRecommendation>,
) -> Vec<String> {
    let mut recommendations = Vec::new();
    if components.anomalies < 60.0 {
        recommendations.push("Investigate and resolve active anomaly alerts".to_string());
    }
    if components.capacity <= 20.0 {
        recommendations.push("A resource is past its critical utilization threshold".to_string());
    } else if components.capacity <= 70.0 {
        recommendations.push("One or more resources are under capacity pressure".to_string());
    }
    if components.predictions <= 30.0 {
        recommendations.push("A threshold crossing is forecast within 24 hours".to_string());
    }
    if components.performance < 70.0 {
        recommendations.push("Key metrics are running hot; review performance".to_string());
    }
    for recommendation in scaling.values() {
        recommendations.push(format!(
            "{}: {:?} toward {:.0} units",
            recommendation.resource, recommendation.action, recommendation.target_capacity
        ));
    }
    recommendations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GrowthTrend, Timeframe, UtilizationPoint};
    use chrono::Utc;
    use std::collections::VecDeque;

    fn capacity_model(utilization: f64, thresholds: CapacityThresholds) -> CapacityModel {
        let mut history = VecDeque::new();
        history.push_back(UtilizationPoint {
            timestamp: Utc::now(),
            utilization,
            peak: utilization,
            average: utilization,
        });
        CapacityModel {
            resource: "web".to_string(),
            current_capacity: 100.0,
            utilization_history: history,
            growth_trend: GrowthTrend::default(),
            thresholds,
            forecasts: Vec::new(),
        }
    }

    fn prediction(exceeds: bool, hours: Option<f64>, confidence: f64) -> Prediction {
        Prediction {
            metric: "web".to_string(),
            timeframe: Timeframe::OneDay,
            predicted_value: 80.0,
            confidence,
            will_exceed_threshold: exceeds,
            time_to_threshold_hours: hours,
            generated_at: Utc::now(),
        }
    }

    #[test]
    fn overall_is_the_weighted_rounded_mean() {
        let components = ComponentScores {
            performance: 80.0,
            capacity: 90.0,
            anomalies: 70.0,
            predictions: 60.0,
        };
        // 0.3*80 + 0.3*90 + 0.2*70 + 0.2*60 = 77
        assert_eq!(overall_score(&components), 77);
    }

    #[test]
    fn overall_is_clamped_for_any_component_input() {
        let components = ComponentScores {
            performance: 500.0,
            capacity: -50.0,
            anomalies: 100.0,
            predictions: 100.0,
        };
        let overall = overall_score(&components);
        assert!(overall <= 100);

        let zeros = ComponentScores {
            performance: 0.0,
            capacity: 0.0,
            anomalies: 0.0,
            predictions: 0.0,
        };
        assert_eq!(overall_score(&zeros), 0);
    }

    #[test]
    fn anomaly_subscore_ladder() {
        // No alerts, perfect models
        assert!((anomaly_subscore(0, 1.0, 0.0) - 90.0).abs() < 1e-9);
        // Two alerts take 20 off the base
        assert!((anomaly_subscore(2, 1.0, 0.0) - 70.0).abs() < 1e-9);
        // Alert penalty caps at 50
        assert!((anomaly_subscore(20, 1.0, 0.0) - 40.0).abs() < 1e-9);
        // Accuracy scales, false positives subtract
        assert!((anomaly_subscore(0, 0.5, 0.5) - 35.0).abs() < 1e-9);
        // Never below zero
        assert_eq!(anomaly_subscore(20, 0.1, 1.0), 0.0);
    }

    #[test]
    fn capacity_subscore_ladder() {
        let thresholds = CapacityThresholds {
            warning: 75.0,
            critical: 90.0,
            maximum: 100.0,
        };
        assert_eq!(capacity_subscore(&[capacity_model(50.0, thresholds)]), 90.0);
        assert_eq!(capacity_subscore(&[capacity_model(80.0, thresholds)]), 70.0);
        assert_eq!(
            capacity_subscore(&[
                capacity_model(80.0, thresholds),
                capacity_model(78.0, thresholds),
                capacity_model(76.0, thresholds),
            ]),
            50.0
        );
        assert_eq!(capacity_subscore(&[capacity_model(95.0, thresholds)]), 20.0);
        // Critical wins over the warning count
        assert_eq!(
            capacity_subscore(&[
                capacity_model(95.0, thresholds),
                capacity_model(50.0, thresholds),
            ]),
            20.0
        );
        assert_eq!(capacity_subscore(&[]), 90.0);
    }

    #[test]
    fn performance_subscore_blends_percent_and_envelope() {
        let mut observations = HashMap::new();
        observations.insert("cpu_usage".to_string(), 40.0);
        let weights = HashMap::new();
        // Percent-like: 100 - 40
        assert!((performance_subscore(&observations, &weights, &[]) - 60.0).abs() < 1e-9);

        // Non-percent metric with an envelope, inside the band
        let threshold = StatisticalThreshold {
            metric: "response_time".to_string(),
            mean: 100.0,
            std_dev: 10.0,
            upper_bound: 125.0,
            lower_bound: 75.0,
            confidence_multiplier: 2.5,
            sample_size: 40,
            last_updated: Utc::now(),
        };
        let mut observations = HashMap::new();
        observations.insert("response_time".to_string(), 100.0);
        let score = performance_subscore(&observations, &weights, &[threshold.clone()]);
        assert!((score - 100.0).abs() < 1e-9);

        // Outside the band the score decays with the ratio
        let mut observations = HashMap::new();
        observations.insert("response_time".to_string(), 130.0);
        let score = performance_subscore(&observations, &weights, &[threshold]);
        assert!(score < 100.0);
        assert!(score >= 0.0);

        // Nothing scorable falls back to 90
        let empty = HashMap::new();
        assert!((performance_subscore(&empty, &weights, &[]) - 90.0).abs() < 1e-9);
    }

    #[test]
    fn performance_subscore_respects_metric_weights() {
        let mut observations = HashMap::new();
        observations.insert("cpu_usage".to_string(), 0.0); // score 100
        observations.insert("memory_usage".to_string(), 100.0); // score 0
        let mut weights = HashMap::new();
        weights.insert("cpu_usage".to_string(), 3.0);
        weights.insert("memory_usage".to_string(), 1.0);
        let score = performance_subscore(&observations, &weights, &[]);
        assert!((score - 75.0).abs() < 1e-9);
    }

    #[test]
    fn predictions_subscore_ladder() {
        let thresholds = CapacityThresholds::default();
        // Quiet forecast at full confidence
        let mut model = capacity_model(50.0, thresholds);
        model.forecasts = vec![prediction(false, None, 1.0)];
        assert!((predictions_subscore(&[model.clone()]) - 90.0).abs() < 1e-9);

        // Crossing beyond a day
        model.forecasts = vec![prediction(true, Some(48.0), 1.0)];
        assert!((predictions_subscore(&[model.clone()]) - 60.0).abs() < 1e-9);

        // Crossing within a day, scaled by confidence
        model.forecasts = vec![prediction(true, Some(3.0), 0.5)];
        assert!((predictions_subscore(&[model.clone()]) - 15.0).abs() < 1e-9);

        // No forecasts at all
        model.forecasts = Vec::new();
        assert!((predictions_subscore(&[model]) - 90.0).abs() < 1e-9);
    }

    #[test]
    fn risk_ladder() {
        assert_eq!(risk_for(90, false, 0), RiskLevel::Low);
        assert_eq!(risk_for(65, false, 0), RiskLevel::Medium);
        assert_eq!(risk_for(90, false, 2), RiskLevel::Medium);
        assert_eq!(risk_for(45, false, 0), RiskLevel::High);
        assert_eq!(risk_for(90, false, 4), RiskLevel::High);
        assert_eq!(risk_for(25, false, 0), RiskLevel::Critical);
        assert_eq!(risk_for(90, true, 0), RiskLevel::Critical);
    }

    #[test]
    fn trends_compare_against_the_previous_score() {
        let previous = ComponentScores {
            performance: 80.0,
            capacity: 90.0,
            anomalies: 70.0,
            predictions: 60.0,
        };
        let current = ComponentScores {
            performance: 85.0,
            capacity: 90.5,
            anomalies: 60.0,
            predictions: 60.0,
        };
        let trends = component_trends(&previous, &current);
        assert_eq!(trends["performance"], TrendDirection::Improving);
        assert_eq!(trends["capacity"], TrendDirection::Stable);
        assert_eq!(trends["anomalies"], TrendDirection::Degrading);
        assert_eq!(trends["predictions"], TrendDirection::Stable);
    }
}
