//! Training pipeline
//!
//! A pipeline owns one trainer per configured algorithm, output type and
//! feature group, all bound to a single energy source. `process` runs one
//! feature group end to end: extraction, isolation, then fitting every
//! matching trainer. Feature groups are independent; one that cannot be
//! extracted is reported as unsuccessful and leaves trainers untouched.

#[cfg(test)]
mod tests;

use crate::config::PipelineConfig;
use crate::error::{PowerModelError, Result};
use crate::extractor::Extractor;
use crate::isolator::{IsolationContext, Isolator};
use crate::models::{QueryResults, TrainingTable};
use crate::observability::{StructuredLogger, TrainingMetrics};
use crate::registry::{energy_components, FeatureGroup};
use crate::trainer::{FitSummary, Trainer, TrainerIdentity, TrainerRegistry};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::debug;

/// Outcome of fitting one trainer
#[derive(Debug, Clone, PartialEq)]
pub struct FitReport {
    pub trainer: String,
    pub node_level: bool,
    /// Fit summary, or the error message of a failed fit
    pub result: std::result::Result<FitSummary, String>,
}

/// Result of processing one feature group
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineOutput {
    pub feature_group: Option<FeatureGroup>,
    pub success: bool,
    pub abs: TrainingTable,
    pub dyn_table: TrainingTable,
    /// Queries whose absence made the feature group unusable
    pub missing: Vec<String>,
    pub clamped: usize,
    /// One report per matching trainer, in registry order
    pub fits: Vec<FitReport>,
}

/// Tables ready for fitting
struct Prepared {
    abs: Arc<TrainingTable>,
    dyn_table: Arc<TrainingTable>,
    clamped: usize,
}

pub struct Pipeline {
    config: PipelineConfig,
    extractor: Extractor,
    isolator: Box<dyn Isolator>,
    trainers: Vec<Box<dyn Trainer>>,
    /// Recreates a trainer lost to a panicked fit
    registry: TrainerRegistry,
    metrics: TrainingMetrics,
    logger: StructuredLogger,
}

impl Pipeline {
    /// Build a pipeline, failing fast on configuration errors
    ///
    /// `idle` is the idle benchmark run required by the profile and trainer
    /// isolators.
    pub fn new(
        config: PipelineConfig,
        registry: &TrainerRegistry,
        idle: Option<&QueryResults>,
    ) -> Result<Self> {
        config.validate(registry)?;
        let isolator = config.isolator.build(idle, config.min_samples)?;

        let mut trainers = Vec::new();
        for feature_group in config.effective_feature_groups() {
            for (names, node_level) in [(&config.abs_trainers, true), (&config.dyn_trainers, false)] {
                for name in names {
                    let identity = TrainerIdentity::new(
                        name.clone(),
                        feature_group,
                        config.energy_source.clone(),
                        node_level,
                    );
                    trainers.push(registry.create(identity, config.trainer_settings())?);
                }
            }
        }

        let logger = StructuredLogger::new(config.pipeline_name.clone());
        logger.log_pipeline_started(&config.energy_source, config.isolator.name(), trainers.len());

        Ok(Self {
            config,
            extractor: Extractor::new(),
            isolator,
            trainers,
            registry: registry.clone(),
            metrics: TrainingMetrics::new(),
            logger,
        })
    }

    pub fn from_config(config: PipelineConfig, idle: Option<&QueryResults>) -> Result<Self> {
        Self::new(config, &TrainerRegistry::with_defaults(), idle)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn trainers(&self) -> &[Box<dyn Trainer>] {
        &self.trainers
    }

    pub fn trainer(&self, name: &str, feature_group: FeatureGroup, node_level: bool) -> Option<&dyn Trainer> {
        self.trainers
            .iter()
            .find(|t| {
                let id = t.identity();
                id.name == name && id.feature_group == feature_group && id.node_level == node_level
            })
            .map(|t| t.as_ref())
    }

    /// Extract, isolate and fit one feature group
    pub fn process(
        &mut self,
        results: &QueryResults,
        components: &[String],
        energy_source: &str,
        feature_group: FeatureGroup,
    ) -> Result<PipelineOutput> {
        let mut output = PipelineOutput {
            feature_group: Some(feature_group),
            ..Default::default()
        };
        let Some(prepared) = self.prepare(results, components, energy_source, feature_group, &mut output)? else {
            return Ok(output);
        };

        let Self {
            trainers,
            metrics,
            logger,
            ..
        } = self;
        for trainer in trainers.iter_mut() {
            if !matches(trainer.identity(), feature_group, energy_source) {
                continue;
            }
            let table = if trainer.identity().node_level {
                &prepared.abs
            } else {
                &prepared.dyn_table
            };
            let started = Instant::now();
            let result = trainer.fit(table);
            let elapsed = started.elapsed().as_secs_f64();
            output
                .fits
                .push(fit_report(metrics, logger, trainer.identity(), result, elapsed));
        }

        self.finish(&prepared, &mut output);
        Ok(output)
    }

    /// Same as [`Pipeline::process`], fitting trainers on the blocking pool
    ///
    /// At most `max_concurrent_fits` fits run at once. A failed fit does not
    /// cancel its siblings and reports come back in registry order. A fit
    /// task that panics is reported as failed and its trainer is replaced
    /// by an unfitted one.
    pub async fn process_concurrent(
        &mut self,
        results: &QueryResults,
        components: &[String],
        energy_source: &str,
        feature_group: FeatureGroup,
    ) -> Result<PipelineOutput> {
        let mut output = PipelineOutput {
            feature_group: Some(feature_group),
            ..Default::default()
        };
        let Some(prepared) = self.prepare(results, components, energy_source, feature_group, &mut output)? else {
            return Ok(output);
        };

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_fits.max(1)));
        let mut pending = Vec::new();
        let mut idle_trainers = Vec::new();

        for (index, mut trainer) in std::mem::take(&mut self.trainers).into_iter().enumerate() {
            if !matches(trainer.identity(), feature_group, energy_source) {
                idle_trainers.push((index, trainer));
                continue;
            }
            let table = if trainer.identity().node_level {
                Arc::clone(&prepared.abs)
            } else {
                Arc::clone(&prepared.dyn_table)
            };
            let semaphore = Arc::clone(&semaphore);
            let identity = trainer.identity().clone();
            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                tokio::task::spawn_blocking(move || {
                    let started = Instant::now();
                    let result = trainer.fit(&table);
                    (trainer, result, started.elapsed().as_secs_f64())
                })
                .await
            });
            pending.push((index, identity, handle));
        }

        let mut restored = idle_trainers;
        let mut lost = None;
        for (index, identity, handle) in pending {
            match handle.await {
                Ok(Ok((trainer, result, elapsed))) => {
                    output.fits.push(fit_report(
                        &self.metrics,
                        &self.logger,
                        &identity,
                        result,
                        elapsed,
                    ));
                    restored.push((index, trainer));
                }
                Ok(Err(e)) | Err(e) => {
                    output.fits.push(fit_report(
                        &self.metrics,
                        &self.logger,
                        &identity,
                        Err(PowerModelError::Task(e.to_string())),
                        0.0,
                    ));
                    // the trainer moved into the failed task; an unfitted one takes its slot
                    match self.registry.create(identity, self.config.trainer_settings()) {
                        Ok(replacement) => restored.push((index, replacement)),
                        Err(err) => {
                            lost.get_or_insert(err);
                        }
                    }
                }
            }
        }

        restored.sort_by_key(|(index, _)| *index);
        self.trainers = restored.into_iter().map(|(_, trainer)| trainer).collect();
        if let Some(err) = lost {
            return Err(err);
        }

        self.finish(&prepared, &mut output);
        Ok(output)
    }

    /// Process every configured feature group, skipping unusable ones
    pub fn process_all(&mut self, results: &QueryResults) -> Result<Vec<PipelineOutput>> {
        let energy_source = self.config.energy_source.clone();
        let components = energy_components(&energy_source)?;
        self.config
            .effective_feature_groups()
            .into_iter()
            .map(|group| self.process(results, &components, &energy_source, group))
            .collect()
    }

    /// Write every fitted trainer under the model root; returns the artifact directories
    pub fn save(&self) -> Result<Vec<PathBuf>> {
        let mut saved = Vec::new();
        for trainer in self.trainers.iter().filter(|t| t.is_fitted()) {
            let dir = trainer
                .identity()
                .artifact_dir(&self.config.model_root, &self.config.pipeline_name);
            trainer.save(&dir)?;
            self.logger
                .log_artifact_saved(&trainer.identity().name, &dir.display().to_string());
            saved.push(dir);
        }
        Ok(saved)
    }

    /// Predict every fitted node type over its own training rows
    ///
    /// Returns one message per (trainer, node type, component) whose
    /// prediction failed or did not return one value per row.
    pub fn verify(&self, output: &PipelineOutput) -> Vec<String> {
        let Some(feature_group) = output.feature_group else {
            return Vec::new();
        };
        let mut problems = Vec::new();
        for trainer in &self.trainers {
            let identity = trainer.identity();
            if identity.feature_group != feature_group || !trainer.is_fitted() {
                continue;
            }
            let table = if identity.node_level {
                &output.abs
            } else {
                &output.dyn_table
            };
            for node_type in trainer.fitted_node_types() {
                for component in trainer.components(node_type) {
                    let (x, _) = table.training_set(node_type, &component);
                    if x.is_empty() {
                        continue;
                    }
                    match trainer.predict(node_type, &component, &x) {
                        Ok(values) if values.len() == x.len() => {}
                        Ok(values) => problems.push(format!(
                            "{} node type {} {}: {} predictions for {} rows",
                            identity.name,
                            node_type,
                            component,
                            values.len(),
                            x.len()
                        )),
                        Err(e) => problems.push(format!(
                            "{} node type {} {}: {}",
                            identity.name, node_type, component, e
                        )),
                    }
                }
            }
        }
        problems
    }

    /// Extract and isolate; `None` means the feature group is unusable for this input
    fn prepare(
        &self,
        results: &QueryResults,
        components: &[String],
        energy_source: &str,
        feature_group: FeatureGroup,
        output: &mut PipelineOutput,
    ) -> Result<Option<Prepared>> {
        let extraction = self
            .extractor
            .extract(results, feature_group, energy_source, components)?;
        if !extraction.success() {
            self.skip(feature_group, extraction.missing, output);
            return Ok(None);
        }

        let context = IsolationContext {
            feature_group,
            energy_source: energy_source.to_string(),
        };
        let isolation = match self.isolator.isolate(&extraction.per_entity, &context) {
            Ok(isolation) => isolation,
            Err(PowerModelError::FeatureUnavailable { query, .. }) => {
                self.skip(feature_group, vec![query], output);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        if isolation.clamped > 0 {
            self.metrics.add_isolation_clamped(isolation.clamped);
            self.logger.log_isolation_clamped(
                feature_group.name(),
                self.isolator.kind().name(),
                isolation.clamped,
            );
        }

        Ok(Some(Prepared {
            abs: Arc::new(extraction.abs),
            dyn_table: Arc::new(isolation.table),
            clamped: isolation.clamped,
        }))
    }

    fn skip(&self, feature_group: FeatureGroup, missing: Vec<String>, output: &mut PipelineOutput) {
        self.metrics.inc_feature_groups_skipped();
        self.logger.log_feature_group_skipped(feature_group.name(), &missing);
        output.success = false;
        output.missing = missing;
    }

    fn finish(&self, prepared: &Prepared, output: &mut PipelineOutput) {
        output.success = true;
        output.abs = prepared.abs.as_ref().clone();
        output.dyn_table = prepared.dyn_table.as_ref().clone();
        output.clamped = prepared.clamped;

        let group = output.feature_group.map(|g| g.name()).unwrap_or_default();
        self.metrics.inc_feature_groups_processed();
        self.logger
            .log_feature_group_processed(group, output.abs.len(), output.dyn_table.len());
        debug!(feature_group = group, fits = output.fits.len(), "Feature group done");
    }
}

fn matches(identity: &TrainerIdentity, feature_group: FeatureGroup, energy_source: &str) -> bool {
    identity.feature_group == feature_group && identity.energy_source == energy_source
}

fn fit_report(
    metrics: &TrainingMetrics,
    logger: &StructuredLogger,
    identity: &TrainerIdentity,
    result: Result<FitSummary>,
    elapsed_secs: f64,
) -> FitReport {
    let group = identity.feature_group.name();
    metrics.observe_fit_latency(elapsed_secs);
    let result = match result {
        Ok(summary) => {
            metrics.add_node_types(summary.fitted.len(), summary.skipped.len());
            for (node_type, reason) in &summary.skipped {
                logger.log_node_type_skipped(&identity.name, *node_type, reason);
            }
            logger.log_trainer_fitted(&identity.name, group, &summary.fitted, elapsed_secs);
            Ok(summary)
        }
        Err(e) => {
            metrics.inc_fit_failures();
            logger.log_trainer_failed(&identity.name, group, &e.to_string());
            Err(e.to_string())
        }
    };
    FitReport {
        trainer: identity.name.clone(),
        node_level: identity.node_level,
        result,
    }
}
