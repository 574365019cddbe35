// src/snapshot.rs

//! Export/import document
//!
//! A [`MonitorSnapshot`] is the engine's state rendered for inspection:
//! configuration, model descriptors (weights deliberately excluded —
//! export is for inspection, not training), the alert history, thresholds,
//! and lifecycle stats. Importing restores alert history, thresholds, and
//! configuration; models must be retrained.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FoghornResult;
use crate::forecast::ForecastModelInfo;
use crate::types::{AlertStats, AnomalyAlert, DetectionConfig, ModelInfo, StatisticalThreshold};

/// Structured inspection document for the engine's state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSnapshot {
    pub exported_at: DateTime<Utc>,
    pub config: DetectionConfig,
    /// Detector model descriptors, weights excluded
    pub models: Vec<ModelInfo>,
    /// Forecast model descriptors, weights excluded
    pub forecast_models: Vec<ForecastModelInfo>,
    pub alert_history: Vec<AnomalyAlert>,
    pub thresholds: Vec<StatisticalThreshold>,
    pub stats: AlertStats,
}

impl MonitorSnapshot {
    /// Serialize to a pretty-printed JSON document
    pub fn to_json(&self) -> FoghornResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a snapshot back from JSON
    pub fn from_json(json: &str) -> FoghornResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
