// src/error.rs

use crate::types::MetricName;

/// Result type used throughout the foghorn library
pub type FoghornResult<T> = Result<T, FoghornError>;

/// All possible errors that can occur in the foghorn library
#[derive(thiserror::Error, Debug)]
pub enum FoghornError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Not enough historical samples to train or compute a threshold.
    /// Recoverable: retry once more data has accumulated.
    #[error("Insufficient data for '{metric}': need {required} samples, have {available}")]
    InsufficientData {
        metric: MetricName,
        required: usize,
        available: usize,
    },

    /// A training job is already in flight
    #[error("Training already in progress: {message}")]
    TrainingInProgress { message: String },

    /// No trained model covers the requested target
    #[error("No trained model found for '{target}'")]
    ModelNotFound { target: String },

    /// No recent samples available for inference
    #[error("No recent data for metric '{metric}'")]
    NoRecentData { metric: MetricName },

    /// Alert id does not exist in the active index
    #[error("Unknown alert id '{id}'")]
    UnknownAlert { id: String },

    /// Metric source collaborator failed
    #[error("Metric source failed during '{operation}': {message}")]
    SourceFailed { operation: String, message: String },

    /// Engine is not running or has stopped
    #[error("Foghorn engine is not running: {message}")]
    EngineNotRunning { message: String },

    /// Channel communication error (internal)
    #[error("Internal channel error: {message}")]
    ChannelError { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },

    /// IO-related errors
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

/// Helper methods for creating common errors
impl FoghornError {
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn insufficient_data<S: Into<String>>(metric: S, required: usize, available: usize) -> Self {
        Self::InsufficientData {
            metric: metric.into(),
            required,
            available,
        }
    }

    pub fn training_in_progress<S: Into<String>>(message: S) -> Self {
        Self::TrainingInProgress {
            message: message.into(),
        }
    }

    pub fn model_not_found<S: Into<String>>(target: S) -> Self {
        Self::ModelNotFound {
            target: target.into(),
        }
    }

    pub fn no_recent_data<S: Into<String>>(metric: S) -> Self {
        Self::NoRecentData {
            metric: metric.into(),
        }
    }

    pub fn unknown_alert<S: Into<String>>(id: S) -> Self {
        Self::UnknownAlert { id: id.into() }
    }

    pub fn source_failed<S: Into<String>>(operation: S, message: S) -> Self {
        Self::SourceFailed {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn engine_not_running<S: Into<String>>(message: S) -> Self {
        Self::EngineNotRunning {
            message: message.into(),
        }
    }

    /// Whether a caller can reasonably retry the failed operation later
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InsufficientData { .. }
                | Self::TrainingInProgress { .. }
                | Self::ModelNotFound { .. }
                | Self::NoRecentData { .. }
                | Self::SourceFailed { .. }
        )
    }
}

/// Convert from channel send errors
impl<T> From<tokio::sync::mpsc::error::SendError<T>> for FoghornError {
    fn from(error: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Self::ChannelError {
            message: format!("Failed to send on channel: {}", error),
        }
    }
}

/// Convert from channel receive errors
impl From<tokio::sync::oneshot::error::RecvError> for FoghornError {
    fn from(error: tokio::sync::oneshot::error::RecvError) -> Self {
        Self::ChannelError {
            message: format!("Failed to receive on channel: {}", error),
        }
    }
}
