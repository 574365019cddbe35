//! # Foghorn - Service Health Monitoring Library
//!
//! Foghorn is a flexible service-health monitoring library for Rust. It watches
//! operational metrics (CPU, memory, response time, error rate, queue depth),
//! detects abnormal values in near-real time with an ensemble of detectors,
//! forecasts future resource utilization to recommend scaling actions, and rolls
//! everything into a single 0-100 system-health score.
//!
//! ## 📊 Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                            Foghorn Engine                                │
//! ├──────────────────┬──────────────────┬──────────────────┬─────────────────┤
//! │    Detection     │ Alert Lifecycle  │    Forecasting   │  Health Scoring │
//! │                  │                  │                  │                 │
//! │ • Statistical    │ • Deduplication  │ • Calendar/trend │ • Weighted      │
//! │   envelopes      │ • Cooldown       │   features       │   components    │
//! │ • Autoencoder    │ • Ack / resolve  │ • 1h-30d horizons│ • Risk ladder   │
//! │ • Ensemble merge │ • Auto-retire    │ • Scaling advice │ • Trends        │
//! └──────────────────┴──────────────────┴──────────────────┴─────────────────┘
//!                                     │
//!                          ┌──────────▼──────────┐
//!                          │   Your Callbacks    │
//!                          │                     │
//!                          │ • MetricSource      │
//!                          │ • MonitorObserver   │
//!                          └──────────┬──────────┘
//!                                     │
//!                   ┌─────────────────▼─────────────────┐
//!                   │        Your Infrastructure        │
//!                   │                                   │
//!                   │ Metrics store • Dashboards        │
//!                   │ Paging • Autoscalers • More       │
//!                   └───────────────────────────────────┘
//! ```
//!
//! ## 🎛️ Quick Start
//!
//! ```rust,no_run
//! use foghorn::{
//!     FoghornEngine, FoghornConfig, FoghornCallbacks, MetricSource,
//!     MetricSample, FoghornResult,
//! };
//! use chrono::{DateTime, Utc};
//! use std::sync::Arc;
//!
//! // Connect foghorn to your metrics store
//! struct MyMetricSource;
//! #[async_trait::async_trait]
//! impl MetricSource for MyMetricSource {
//!     async fn query(
//!         &self,
//!         _metric: &str,
//!         _start: DateTime<Utc>,
//!         _end: DateTime<Utc>,
//!     ) -> FoghornResult<Vec<MetricSample>> {
//!         Ok(Vec::new())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     // 1. Configure: tick intervals, watched metrics, resource thresholds
//!     let config = FoghornConfig::builder()
//!         .detection_interval(30)
//!         .health_interval(60)
//!         .detection(foghorn::policies::web_service_detection())
//!         .resource("cpu_usage", foghorn::policies::percent_thresholds(75.0, 90.0))
//!         .build();
//!
//!     // 2. Wire up your metrics store (and any observers)
//!     let callbacks = FoghornCallbacks::new(Arc::new(MyMetricSource));
//!
//!     // 3. Start the engine
//!     let engine = FoghornEngine::new(config, callbacks);
//!     let handle = engine.handle();
//!     tokio::spawn(async move {
//!         engine.start().await.unwrap();
//!     });
//!
//!     // 4. Interact through the handle
//!     let alerts = handle.active_alerts().await.unwrap();
//!     let health = handle.health_score().await.unwrap();
//!     println!("{} active alerts, health: {:?}", alerts.len(), health);
//! }
//! ```
//!
//! ## Features
//!
//! - **Ensemble detection**: statistical envelopes and a trained autoencoder,
//!   merged per metric with boosted confidence when they agree
//! - **Alert lifecycle**: deduplication buckets, cooldown suppression,
//!   acknowledgment/resolution, auto-retirement of stale alerts
//! - **Capacity forecasting**: per-resource models over calendar and trend
//!   features, five horizons from one hour to thirty days
//! - **Scaling recommendations**: scale-up/scale-down/optimize decisions with
//!   cost and risk reasoning
//! - **Health scoring**: one weighted 0-100 figure with component trends and
//!   a risk ladder
//! - **Async**: three independent scheduling loops, training off-thread,
//!   cooperative cancellation

pub mod alerts;
pub mod autoencoder;
pub mod callbacks;
pub mod engine;
pub mod ensemble;
pub mod error;
pub mod forecast;
pub mod policies;
pub mod scaling;
pub mod snapshot;
pub mod thresholds;
pub mod types;
pub mod utils;

// Re-export common types for convenience
pub use types::{
    AlertCandidate, AlertId, AlertStats, AnomalyAlert, CapacityModel, CapacityThresholds,
    ComponentScores, CurrentState, DetectionConfig, DetectionConfigBuilder, DetectorKind,
    FoghornConfig, FoghornConfigBuilder, GrowthTrend, ImplementationPlan, MetricName,
    MetricSample, ModelId, ModelInfo, Prediction, Priority, RiskLevel, ScalingAction,
    ScalingRecommendation, Sensitivity, Severity, StatisticalThreshold, SystemHealthScore,
    Timeframe, TrendDirection, UtilizationPoint,
};

pub use error::{FoghornError, FoghornResult};

pub use callbacks::{FoghornCallbacks, MetricSource, MonitorObserver};

pub use engine::{EngineStatus, FoghornEngine, FoghornHandle};

pub use alerts::AlertLifecycleManager;
pub use autoencoder::AutoencoderAnomalyModel;
pub use ensemble::{Detector, EnsembleAggregator};
pub use forecast::{CapacityForecaster, ForecastModelInfo};
pub use scaling::ScalingRecommender;
pub use snapshot::MonitorSnapshot;
pub use thresholds::StatisticalThresholdModel;
