//! Pipeline configuration

use crate::error::{PowerModelError, Result};
use crate::isolator::IsolatorKind;
use crate::registry::{energy_components, FeatureGroup};
use crate::trainer::{Algorithm, TrainerRegistry, TrainerSettings, MIN_SAMPLES};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration passed explicitly to a training pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Directory under which pipeline artifacts are written
    #[serde(default = "default_model_root")]
    pub model_root: PathBuf,

    #[serde(default = "default_pipeline_name")]
    pub pipeline_name: String,

    #[serde(default = "default_energy_source")]
    pub energy_source: String,

    #[serde(default)]
    pub isolator: IsolatorKind,

    /// Trainers fitted on node-level (abs) data
    #[serde(default = "default_trainers")]
    pub abs_trainers: Vec<String>,

    /// Trainers fitted on container-level (dyn) data
    #[serde(default = "default_trainers")]
    pub dyn_trainers: Vec<String>,

    /// Feature groups to train; empty means every known group
    #[serde(default)]
    pub feature_groups: Vec<FeatureGroup>,

    /// Minimum labelled samples for a node type to get a model
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,

    /// Upper bound on trainer fits running at once
    #[serde(default = "default_max_concurrent_fits")]
    pub max_concurrent_fits: usize,
}

fn default_model_root() -> PathBuf {
    PathBuf::from("models")
}

fn default_pipeline_name() -> String {
    "std_v0.1".to_string()
}

fn default_energy_source() -> String {
    "rapl".to_string()
}

fn default_trainers() -> Vec<String> {
    Algorithm::ALL
        .iter()
        .map(|a| a.trainer_name().to_string())
        .collect()
}

fn default_min_samples() -> usize {
    MIN_SAMPLES
}

fn default_max_concurrent_fits() -> usize {
    4
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model_root: default_model_root(),
            pipeline_name: default_pipeline_name(),
            energy_source: default_energy_source(),
            isolator: IsolatorKind::default(),
            abs_trainers: default_trainers(),
            dyn_trainers: default_trainers(),
            feature_groups: Vec::new(),
            min_samples: default_min_samples(),
            max_concurrent_fits: default_max_concurrent_fits(),
        }
    }
}

impl PipelineConfig {
    /// Feature groups the pipeline builds trainers for
    pub fn effective_feature_groups(&self) -> Vec<FeatureGroup> {
        if self.feature_groups.is_empty() {
            FeatureGroup::ALL.to_vec()
        } else {
            self.feature_groups.clone()
        }
    }

    pub fn trainer_settings(&self) -> TrainerSettings {
        TrainerSettings {
            min_samples: self.min_samples,
        }
    }

    /// Reject configuration errors before any telemetry is read
    pub fn validate(&self, registry: &TrainerRegistry) -> Result<()> {
        energy_components(&self.energy_source)?;
        for name in self.abs_trainers.iter().chain(&self.dyn_trainers) {
            if !registry.contains(name) {
                return Err(PowerModelError::UnknownTrainer {
                    name: name.clone(),
                    supported: registry.names(),
                });
            }
        }
        Ok(())
    }
}
