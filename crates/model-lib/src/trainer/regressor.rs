//! Trainer over the built-in regression algorithms
//!
//! One model is fitted per (node type, component). Each node type is saved as
//! a composite artifact whose children are the per-component leaves.

use super::algorithm::{Algorithm, FittedModel};
use super::artifact::{self, CompositeManifest, ModelManifest};
use super::transform::{apply_chain, fit_chain, FeatureTransform};
use super::{FitSummary, SavedTrainer, Trainer, TrainerIdentity, TrainerSettings};
use crate::error::{PowerModelError, Result};
use crate::models::TrainingTable;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Trainer-level metadata file inside the artifact directory
pub const TRAINER_FILE: &str = "trainer.json";

/// Fitted transform chain and regressor of one component
#[derive(Debug)]
pub struct ComponentModel {
    pub transforms: Vec<FeatureTransform>,
    pub model: FittedModel,
    pub samples: usize,
}

impl ComponentModel {
    pub fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<f64>> {
        let transformed = apply_chain(&self.transforms, x)?;
        self.model.predict(&transformed)
    }
}

pub struct RegressorTrainer {
    identity: TrainerIdentity,
    algorithm: Algorithm,
    settings: TrainerSettings,
    features: Vec<String>,
    models: BTreeMap<u32, BTreeMap<String, ComponentModel>>,
    skipped: BTreeMap<u32, String>,
}

impl RegressorTrainer {
    pub fn new(identity: TrainerIdentity, algorithm: Algorithm, settings: TrainerSettings) -> Self {
        Self {
            identity,
            algorithm,
            settings,
            features: Vec::new(),
            models: BTreeMap::new(),
            skipped: BTreeMap::new(),
        }
    }

    /// Registry constructor; the algorithm follows the trainer name
    pub fn construct(
        identity: TrainerIdentity,
        settings: TrainerSettings,
    ) -> Result<Box<dyn Trainer>> {
        let algorithm = algorithm_for(&identity.name)?;
        Ok(Box::new(Self::new(identity, algorithm, settings)))
    }

    pub fn load_boxed(dir: &Path) -> Result<Box<dyn Trainer>> {
        Ok(Box::new(Self::load(dir)?))
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn features(&self) -> &[String] {
        &self.features
    }

    pub fn skipped(&self) -> &BTreeMap<u32, String> {
        &self.skipped
    }

    pub fn model(&self, node_type: u32, component: &str) -> Option<&ComponentModel> {
        self.models.get(&node_type).and_then(|m| m.get(component))
    }

    fn fit_component(&self, x: &[Vec<f64>], y: &[f64]) -> Result<ComponentModel> {
        let (transforms, transformed) = fit_chain(&self.algorithm.feature_engineering(), x)?;
        let model = self.algorithm.fit(&transformed, y)?;
        Ok(ComponentModel {
            transforms,
            model,
            samples: y.len(),
        })
    }

    /// Restore a trainer written by [`Trainer::save`]
    pub fn load(dir: &Path) -> Result<Self> {
        let saved: SavedTrainer = artifact::read_json(&dir.join(TRAINER_FILE))?;
        let algorithm = algorithm_for(&saved.identity.name)?;
        let mut trainer = Self::new(
            saved.identity,
            algorithm,
            TrainerSettings {
                min_samples: saved.min_samples,
            },
        );
        trainer.features = saved.features;
        trainer.skipped = saved.skipped;

        for node_type in saved.fitted {
            let node_dir = dir.join(node_type.to_string());
            let ModelManifest::Composite(composite) = artifact::read_manifest(&node_dir)? else {
                return Err(PowerModelError::artifact(
                    &node_dir,
                    "expected a composite manifest per node type",
                ));
            };
            let mut components = BTreeMap::new();
            for (component, relative) in composite.components {
                let leaf_dir = artifact::child_path(&node_dir, &relative)?;
                let ModelManifest::Leaf(manifest) = artifact::read_manifest(&leaf_dir)? else {
                    return Err(PowerModelError::artifact(&leaf_dir, "expected a leaf manifest"));
                };
                if manifest.features != trainer.features {
                    return Err(PowerModelError::artifact(
                        &leaf_dir,
                        format!(
                            "leaf features {:?} differ from trainer features {:?}",
                            manifest.features, trainer.features
                        ),
                    ));
                }
                let leaf = artifact::read_leaf(&leaf_dir, manifest)?;
                components.insert(
                    component,
                    ComponentModel {
                        transforms: leaf.transforms,
                        model: leaf.model,
                        samples: leaf.manifest.samples,
                    },
                );
            }
            trainer.models.insert(node_type, components);
        }
        Ok(trainer)
    }
}

impl Trainer for RegressorTrainer {
    fn identity(&self) -> &TrainerIdentity {
        &self.identity
    }

    fn fit(&mut self, table: &TrainingTable) -> Result<FitSummary> {
        self.models.clear();
        self.skipped.clear();
        self.features = table.features.clone();

        for node_type in table.node_types() {
            let mut fitted = BTreeMap::new();
            let mut reasons = Vec::new();
            for component in &table.components {
                let (x, y) = table.training_set(node_type, component);
                if y.len() < self.settings.min_samples {
                    reasons.push(format!(
                        "{}: {}",
                        component,
                        PowerModelError::InsufficientSamples {
                            samples: y.len(),
                            required: self.settings.min_samples,
                        }
                    ));
                    continue;
                }
                match self.fit_component(&x, &y) {
                    Ok(model) => {
                        fitted.insert(component.clone(), model);
                    }
                    Err(e) if e.is_recoverable() => {
                        warn!(
                            trainer = %self.identity.name,
                            node_type = node_type,
                            component = %component,
                            error = %e,
                            "Component fit failed"
                        );
                        reasons.push(format!("{}: {}", component, e));
                    }
                    Err(e) => return Err(e),
                }
            }

            if fitted.is_empty() {
                let reason = if reasons.is_empty() {
                    "no labelled components".to_string()
                } else {
                    reasons.join("; ")
                };
                debug!(trainer = %self.identity.name, node_type = node_type, reason = %reason, "Node type skipped");
                self.skipped.insert(node_type, reason);
            } else {
                self.models.insert(node_type, fitted);
            }
        }

        Ok(FitSummary {
            fitted: self.fitted_node_types(),
            skipped: self.skipped.clone(),
        })
    }

    fn predict(&self, node_type: u32, component: &str, x: &[Vec<f64>]) -> Result<Vec<f64>> {
        let model = self
            .model(node_type, component)
            .ok_or_else(|| PowerModelError::NoModel {
                node_type,
                component: component.to_string(),
            })?;
        if let Some(row) = x.iter().find(|r| r.len() != self.features.len()) {
            return Err(PowerModelError::FeatureMismatch(format!(
                "expected {} features {:?}, got {}",
                self.features.len(),
                self.features,
                row.len()
            )));
        }
        model.predict(x)
    }

    fn fitted_node_types(&self) -> Vec<u32> {
        self.models.keys().copied().collect()
    }

    fn components(&self, node_type: u32) -> Vec<String> {
        self.models
            .get(&node_type)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir).map_err(|e| PowerModelError::io(dir, e))?;
        let output_type = self.identity.output_type();

        for (node_type, components) in &self.models {
            let node_dir = dir.join(node_type.to_string());
            let mut children = BTreeMap::new();
            for (component, model) in components {
                artifact::write_leaf(
                    &node_dir.join(component),
                    &self.identity.name,
                    output_type,
                    &self.features,
                    &model.transforms,
                    &model.model,
                    model.samples,
                )?;
                children.insert(component.clone(), component.clone());
            }
            artifact::write_composite(
                &node_dir,
                &CompositeManifest {
                    model_name: self.identity.name.clone(),
                    output_type,
                    components: children,
                },
            )?;
        }

        let saved = SavedTrainer {
            identity: self.identity.clone(),
            features: self.features.clone(),
            min_samples: self.settings.min_samples,
            fitted: self.fitted_node_types(),
            skipped: self.skipped.clone(),
        };
        artifact::write_json(&dir.join(TRAINER_FILE), &saved)
    }
}

fn algorithm_for(name: &str) -> Result<Algorithm> {
    Algorithm::from_trainer_name(name).ok_or_else(|| PowerModelError::UnknownTrainer {
        name: name.to_string(),
        supported: Algorithm::ALL
            .iter()
            .map(|a| a.trainer_name().to_string())
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TableRow;
    use crate::registry::FeatureGroup;
    use tempfile::TempDir;

    fn table() -> TrainingTable {
        let mut table = TrainingTable::new(
            vec!["cpu_cycles".to_string(), "bpf_cpu_time_us".to_string()],
            vec!["package".to_string(), "dram".to_string()],
        );
        for i in 0..20 {
            let x0 = i as f64;
            let x1 = ((i * 3) % 7) as f64;
            table.rows.push(TableRow {
                timestamp: i * 3,
                entity: "node-1".to_string(),
                node_type: 1,
                features: vec![x0, x1],
                labels: BTreeMap::from([
                    ("package".to_string(), 2.0 * x0 + x1 + 10.0),
                    ("dram".to_string(), 0.5 * x0 + 1.0),
                ]),
            });
        }
        // node type 2 only has three samples
        for i in 0..3 {
            table.rows.push(TableRow {
                timestamp: i * 3,
                entity: "node-2".to_string(),
                node_type: 2,
                features: vec![i as f64, 1.0],
                labels: BTreeMap::from([("package".to_string(), 5.0)]),
            });
        }
        table
    }

    fn trainer(name: &str) -> RegressorTrainer {
        let identity = TrainerIdentity::new(name, FeatureGroup::Basic, "rapl", true);
        let algorithm = Algorithm::from_trainer_name(name).unwrap();
        RegressorTrainer::new(identity, algorithm, TrainerSettings::default())
    }

    #[test]
    fn test_fit_skips_small_node_types() {
        let mut trainer = trainer("LinearRegressionTrainer");
        assert!(!trainer.is_fitted());

        let summary = trainer.fit(&table()).unwrap();
        assert_eq!(summary.fitted, vec![1]);
        assert!(summary.skipped[&2].contains("insufficient samples"));
        assert_eq!(trainer.components(1), vec!["dram", "package"]);

        let err = trainer.predict(2, "package", &[vec![1.0, 1.0]]).unwrap_err();
        assert!(matches!(err, PowerModelError::NoModel { node_type: 2, .. }));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_predict_checks_feature_width() {
        let mut trainer = trainer("LinearRegressionTrainer");
        trainer.fit(&table()).unwrap();
        let predicted = trainer.predict(1, "package", &[vec![25.0, 2.0]]).unwrap();
        assert!((predicted[0] - 62.0).abs() < 1e-6, "got {}", predicted[0]);

        let err = trainer.predict(1, "package", &[vec![25.0]]).unwrap_err();
        assert!(matches!(err, PowerModelError::FeatureMismatch(_)));
    }

    #[test]
    fn test_refit_replaces_previous_state() {
        let mut trainer = trainer("RidgeRegressionTrainer");
        trainer.fit(&table()).unwrap();
        assert!(trainer.is_fitted());

        let empty = TrainingTable::new(vec!["cpu_cycles".to_string()], vec!["package".to_string()]);
        let summary = trainer.fit(&empty).unwrap();
        assert!(summary.fitted.is_empty());
        assert!(!trainer.is_fitted());
    }

    #[test]
    fn test_save_load_preserves_predictions() {
        let dir = TempDir::new().unwrap();
        let rows: Vec<Vec<f64>> = (0..6).map(|i| vec![i as f64 * 1.5, 3.0]).collect();

        for algorithm in Algorithm::ALL {
            let name = algorithm.trainer_name();
            let mut trainer = trainer(name);
            trainer.fit(&table()).unwrap();
            let path = dir.path().join(name);
            trainer.save(&path).unwrap();

            assert!(path.join("1").join("package").join("fe_0.json").exists());
            let loaded = RegressorTrainer::load(&path).unwrap();
            assert_eq!(loaded.fitted_node_types(), vec![1]);
            assert_eq!(loaded.skipped(), trainer.skipped());
            for component in ["package", "dram"] {
                assert_eq!(
                    trainer.predict(1, component, &rows).unwrap(),
                    loaded.predict(1, component, &rows).unwrap(),
                    "{} {}",
                    name,
                    component
                );
            }
        }
    }
}
