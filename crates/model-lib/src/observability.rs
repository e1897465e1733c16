//! Observability for training runs
//!
//! Provides:
//! - Prometheus metrics (feature groups processed, node-type models, clamped labels, fit latency)
//! - Structured JSON logging with tracing

use prometheus::{register_histogram, register_int_counter, Histogram, IntCounter};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for fit latency (in seconds)
const FIT_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<TrainingMetricsInner> = OnceLock::new();

struct TrainingMetricsInner {
    feature_groups_processed: IntCounter,
    feature_groups_skipped: IntCounter,
    node_types_fitted: IntCounter,
    node_types_skipped: IntCounter,
    isolation_clamped: IntCounter,
    fit_failures: IntCounter,
    fit_latency_seconds: Histogram,
}

impl TrainingMetricsInner {
    fn new() -> Self {
        Self {
            feature_groups_processed: register_int_counter!(
                "power_model_feature_groups_processed_total",
                "Feature groups extracted, isolated and trained"
            )
            .expect("Failed to register feature_groups_processed"),

            feature_groups_skipped: register_int_counter!(
                "power_model_feature_groups_skipped_total",
                "Feature groups skipped because a required query was missing"
            )
            .expect("Failed to register feature_groups_skipped"),

            node_types_fitted: register_int_counter!(
                "power_model_node_types_fitted_total",
                "Node-type models fitted across all trainers"
            )
            .expect("Failed to register node_types_fitted"),

            node_types_skipped: register_int_counter!(
                "power_model_node_types_skipped_total",
                "Node types left without a model"
            )
            .expect("Failed to register node_types_skipped"),

            isolation_clamped: register_int_counter!(
                "power_model_isolation_clamped_total",
                "Isolated labels clamped to zero"
            )
            .expect("Failed to register isolation_clamped"),

            fit_failures: register_int_counter!(
                "power_model_fit_failures_total",
                "Trainer fits that returned an error"
            )
            .expect("Failed to register fit_failures"),

            fit_latency_seconds: register_histogram!(
                "power_model_fit_latency_seconds",
                "Time spent fitting one trainer",
                FIT_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register fit_latency_seconds"),
        }
    }
}

/// Training metrics for Prometheus exposition
///
/// Clones share the same process-wide collectors.
#[derive(Clone)]
pub struct TrainingMetrics {
    _private: (),
}

impl Default for TrainingMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl TrainingMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(TrainingMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &TrainingMetricsInner {
        GLOBAL_METRICS.get_or_init(TrainingMetricsInner::new)
    }

    pub fn inc_feature_groups_processed(&self) {
        self.inner().feature_groups_processed.inc();
    }

    pub fn inc_feature_groups_skipped(&self) {
        self.inner().feature_groups_skipped.inc();
    }

    pub fn add_node_types(&self, fitted: usize, skipped: usize) {
        self.inner().node_types_fitted.inc_by(fitted as u64);
        self.inner().node_types_skipped.inc_by(skipped as u64);
    }

    pub fn add_isolation_clamped(&self, count: usize) {
        self.inner().isolation_clamped.inc_by(count as u64);
    }

    pub fn inc_fit_failures(&self) {
        self.inner().fit_failures.inc();
    }

    pub fn observe_fit_latency(&self, duration_secs: f64) {
        self.inner().fit_latency_seconds.observe(duration_secs);
    }

    /// Text exposition of every registered collector
    pub fn render(&self) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
            warn!(error = %e, "Failed to encode metrics");
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

/// Structured logger for training events
///
/// Every event carries the pipeline name so runs can be told apart in
/// aggregated JSON logs.
#[derive(Clone)]
pub struct StructuredLogger {
    pipeline: String,
}

impl StructuredLogger {
    pub fn new(pipeline: impl Into<String>) -> Self {
        Self {
            pipeline: pipeline.into(),
        }
    }

    pub fn log_pipeline_started(&self, energy_source: &str, isolator: &str, trainers: usize) {
        info!(
            event = "pipeline_started",
            pipeline = %self.pipeline,
            energy_source = %energy_source,
            isolator = %isolator,
            trainers = trainers,
            "Training pipeline started"
        );
    }

    pub fn log_feature_group_skipped(&self, feature_group: &str, missing: &[String]) {
        warn!(
            event = "feature_group_skipped",
            pipeline = %self.pipeline,
            feature_group = %feature_group,
            missing = ?missing,
            "Feature group skipped, required queries missing"
        );
    }

    pub fn log_feature_group_processed(&self, feature_group: &str, abs_rows: usize, dyn_rows: usize) {
        info!(
            event = "feature_group_processed",
            pipeline = %self.pipeline,
            feature_group = %feature_group,
            abs_rows = abs_rows,
            dyn_rows = dyn_rows,
            "Feature group processed"
        );
    }

    pub fn log_trainer_fitted(&self, trainer: &str, feature_group: &str, node_types: &[u32], duration_secs: f64) {
        info!(
            event = "trainer_fitted",
            pipeline = %self.pipeline,
            trainer = %trainer,
            feature_group = %feature_group,
            node_types = ?node_types,
            duration_secs = duration_secs,
            "Trainer fitted"
        );
    }

    pub fn log_trainer_failed(&self, trainer: &str, feature_group: &str, error: &str) {
        warn!(
            event = "trainer_failed",
            pipeline = %self.pipeline,
            trainer = %trainer,
            feature_group = %feature_group,
            error = %error,
            "Trainer fit failed"
        );
    }

    pub fn log_node_type_skipped(&self, trainer: &str, node_type: u32, reason: &str) {
        warn!(
            event = "node_type_skipped",
            pipeline = %self.pipeline,
            trainer = %trainer,
            node_type = node_type,
            reason = %reason,
            "Node type left without a model"
        );
    }

    pub fn log_isolation_clamped(&self, feature_group: &str, isolator: &str, clamped: usize) {
        warn!(
            event = "isolation_clamped",
            pipeline = %self.pipeline,
            feature_group = %feature_group,
            isolator = %isolator,
            clamped = clamped,
            "Negative isolated power clamped to zero"
        );
    }

    pub fn log_artifact_saved(&self, trainer: &str, path: &str) {
        info!(
            event = "artifact_saved",
            pipeline = %self.pipeline,
            trainer = %trainer,
            path = %path,
            "Model artifact saved"
        );
    }

    pub fn log_estimator_loaded(&self, path: &str, components: &[String]) {
        info!(
            event = "estimator_loaded",
            pipeline = %self.pipeline,
            path = %path,
            components = ?components,
            "Model estimator loaded"
        );
    }
}
