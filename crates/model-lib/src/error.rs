//! Error taxonomy for training and estimation

use std::path::PathBuf;
use thiserror::Error;

/// Library result alias
pub type Result<T> = std::result::Result<T, PowerModelError>;

/// Errors raised by the training pipeline and model estimators
#[derive(Debug, Error)]
pub enum PowerModelError {
    /// A query required by a feature group is absent from the input
    #[error("feature group {feature_group} unavailable: missing query {query}")]
    FeatureUnavailable { feature_group: String, query: String },

    #[error("unknown isolator {name}, supported isolators: {supported:?}")]
    UnknownIsolator { name: String, supported: Vec<String> },

    #[error("unknown energy source {name}, supported sources: {supported:?}")]
    UnknownEnergySource { name: String, supported: Vec<String> },

    #[error("unknown trainer {name}, supported trainers: {supported:?}")]
    UnknownTrainer { name: String, supported: Vec<String> },

    #[error("unknown feature group {name}, supported groups: {supported:?}")]
    UnknownFeatureGroup { name: String, supported: Vec<String> },

    /// Profile and trainer isolators need an idle run
    #[error("isolator {isolator} requires idle telemetry (--profile)")]
    MissingIdleData { isolator: String },

    #[error("no model for node type {node_type} component {component}")]
    NoModel { node_type: u32, component: String },

    #[error("insufficient samples: {samples}, need {required}")]
    InsufficientSamples { samples: usize, required: usize },

    #[error("feature transform failed: {0}")]
    Transform(String),

    #[error("regression failed: {0}")]
    Regression(String),

    #[error("feature mismatch: {0}")]
    FeatureMismatch(String),

    #[error("invalid model artifact at {path:?}: {reason}")]
    Artifact { path: PathBuf, reason: String },

    #[error("checksum mismatch for {path:?}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A background fit task panicked or was aborted
    #[error("training task failed: {0}")]
    Task(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl PowerModelError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn artifact(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Artifact {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Returns true for errors local to one feature group, node type or request.
    ///
    /// Configuration errors are fatal at startup and return false.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::FeatureUnavailable { .. }
                | Self::NoModel { .. }
                | Self::InsufficientSamples { .. }
                | Self::Transform(_)
                | Self::Regression(_)
                | Self::FeatureMismatch(_)
        )
    }
}
