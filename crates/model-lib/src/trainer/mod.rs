//! Power model trainers
//!
//! Every algorithm sits behind the [`Trainer`] contract so the pipeline can
//! drive an open set of them identically. Trainers are created by name from
//! a [`TrainerRegistry`].

mod algorithm;
mod artifact;
mod regressor;
mod transform;

pub use algorithm::{Algorithm, FittedModel};
pub use artifact::{
    compute_checksum, read_leaf, read_manifest, CompositeManifest, LeafArtifact, LeafManifest,
    ModelManifest, MANIFEST_FILE, MODEL_FILE,
};
pub use regressor::{ComponentModel, RegressorTrainer, TRAINER_FILE};
pub use transform::{apply_chain, fit_chain, FeatureTransform, TransformSpec};

use crate::error::{PowerModelError, Result};
use crate::models::TrainingTable;
use crate::registry::{FeatureGroup, ModelOutputType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub(crate) use artifact::{child_path, read_json};

/// Minimum labelled samples for a node type to get a model
pub const MIN_SAMPLES: usize = 10;

/// Identity of a trainer within a pipeline
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrainerIdentity {
    pub name: String,
    pub feature_group: FeatureGroup,
    pub energy_source: String,
    /// Node-level trainers fit the abs table, the others the dyn table
    pub node_level: bool,
}

impl TrainerIdentity {
    pub fn new(
        name: impl Into<String>,
        feature_group: FeatureGroup,
        energy_source: impl Into<String>,
        node_level: bool,
    ) -> Self {
        Self {
            name: name.into(),
            feature_group,
            energy_source: energy_source.into(),
            node_level,
        }
    }

    pub fn output_type(&self) -> ModelOutputType {
        ModelOutputType::for_node_level(self.node_level)
    }

    /// `<root>/<pipeline>/<energy_source>/<output_type>/<feature_group>/<name>`
    pub fn artifact_dir(&self, model_root: &Path, pipeline_name: &str) -> PathBuf {
        model_root
            .join(pipeline_name)
            .join(&self.energy_source)
            .join(self.output_type().name())
            .join(self.feature_group.name())
            .join(&self.name)
    }
}

/// Settings shared by every trainer of a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrainerSettings {
    pub min_samples: usize,
}

impl Default for TrainerSettings {
    fn default() -> Self {
        Self {
            min_samples: MIN_SAMPLES,
        }
    }
}

/// Node types that got a model, and why the others did not
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FitSummary {
    pub fitted: Vec<u32>,
    pub skipped: BTreeMap<u32, String>,
}

/// Uniform contract over regression algorithms
pub trait Trainer: Send {
    fn identity(&self) -> &TrainerIdentity;

    /// Fit one model per node type and component of `table`
    ///
    /// Node types with too few samples are skipped and reported in the
    /// summary; they are not an error.
    fn fit(&mut self, table: &TrainingTable) -> Result<FitSummary>;

    /// Predict one value per row of raw (untransformed) features
    fn predict(&self, node_type: u32, component: &str, x: &[Vec<f64>]) -> Result<Vec<f64>>;

    /// Node types with a usable model, ascending
    fn fitted_node_types(&self) -> Vec<u32>;

    /// Components modelled for a node type
    fn components(&self, node_type: u32) -> Vec<String>;

    /// Write the artifact tree into `dir`
    fn save(&self, dir: &Path) -> Result<()>;

    fn is_fitted(&self) -> bool {
        !self.fitted_node_types().is_empty()
    }
}

/// Creates a trainer for an identity
pub type TrainerConstructor = fn(TrainerIdentity, TrainerSettings) -> Result<Box<dyn Trainer>>;

/// Restores a trainer saved in a directory
pub type TrainerLoader = fn(&Path) -> Result<Box<dyn Trainer>>;

#[derive(Clone, Copy)]
struct TrainerFactory {
    create: TrainerConstructor,
    load: TrainerLoader,
}

/// Name to factory map of available trainers
#[derive(Clone)]
pub struct TrainerRegistry {
    factories: BTreeMap<String, TrainerFactory>,
}

impl Default for TrainerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl TrainerRegistry {
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Registry holding one trainer per built-in algorithm
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        for algorithm in Algorithm::ALL {
            registry.register(
                algorithm.trainer_name(),
                RegressorTrainer::construct,
                RegressorTrainer::load_boxed,
            );
        }
        registry
    }

    pub fn register(&mut self, name: &str, create: TrainerConstructor, load: TrainerLoader) {
        self.factories
            .insert(name.to_string(), TrainerFactory { create, load });
    }

    pub fn names(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn create(
        &self,
        identity: TrainerIdentity,
        settings: TrainerSettings,
    ) -> Result<Box<dyn Trainer>> {
        let factory = self.factory(&identity.name)?;
        (factory.create)(identity, settings)
    }

    /// Load a trainer from its artifact directory
    pub fn load(&self, dir: &Path) -> Result<Box<dyn Trainer>> {
        let saved: SavedTrainer = read_json(&dir.join(TRAINER_FILE))?;
        let factory = self.factory(&saved.identity.name)?;
        (factory.load)(dir)
    }

    fn factory(&self, name: &str) -> Result<TrainerFactory> {
        self.factories
            .get(name)
            .copied()
            .ok_or_else(|| PowerModelError::UnknownTrainer {
                name: name.to_string(),
                supported: self.names(),
            })
    }
}

/// Trainer-level record written next to the per-node-type artifacts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct SavedTrainer {
    pub identity: TrainerIdentity,
    pub features: Vec<String>,
    pub min_samples: usize,
    pub fitted: Vec<u32>,
    pub skipped: BTreeMap<u32, String>,
}
