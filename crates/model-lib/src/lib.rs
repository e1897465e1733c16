//! Power model training library
//!
//! This crate provides the core functionality for:
//! - Converting exporter telemetry into aligned feature/label tables
//! - Idle profiling and background power isolation
//! - Fitting per-node-type regression models behind one trainer contract
//! - Persisting models and loading them back as power estimators
//! - Benchmark metadata and per-scenario telemetry validation
//! - Metrics and structured logging for training runs

pub mod benchmark;
pub mod config;
pub mod error;
pub mod estimator;
pub mod extractor;
pub mod isolator;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod profiler;
pub mod registry;
pub mod telemetry;
pub mod trainer;

pub use benchmark::BenchmarkMetadata;
pub use config::PipelineConfig;
pub use error::{PowerModelError, Result};
pub use estimator::{
    CompositeEstimator, LeafEstimator, ModelEstimator, PowerEstimator, PowerRequest,
    PowerResponse, PowerValues,
};
pub use extractor::{Extraction, Extractor};
pub use isolator::{Isolation, IsolationContext, Isolator, IsolatorKind};
pub use models::*;
pub use observability::{StructuredLogger, TrainingMetrics};
pub use pipeline::{FitReport, Pipeline, PipelineOutput};
pub use profiler::{IdleProfile, ProfileEntry, Profiler};
pub use registry::{FeatureGroup, ModelOutputType};
pub use trainer::{FitSummary, Trainer, TrainerIdentity, TrainerRegistry, TrainerSettings};
