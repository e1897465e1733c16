use super::{clamp_labels, Isolation, IsolationContext, Isolator, IsolatorKind};
use crate::error::{PowerModelError, Result};
use crate::extractor::Extractor;
use crate::models::{QueryResults, TrainingTable};
use crate::registry::energy_components;
use crate::trainer::{Algorithm, RegressorTrainer, Trainer, TrainerIdentity, TrainerSettings};
use std::collections::BTreeMap;
use tracing::debug;

/// Subtracts a background level predicted from the same features on idle telemetry
///
/// A linear model is fitted per call on the idle run's per-entity table for
/// the feature group being isolated, so background drift that correlates
/// with the features is removed row by row.
#[derive(Debug, Clone)]
pub struct TrainIsolator {
    idle: QueryResults,
    min_samples: usize,
}

impl TrainIsolator {
    pub fn new(idle: QueryResults, min_samples: usize) -> Self {
        Self { idle, min_samples }
    }

    /// Fit the background model for one feature group
    pub fn background_model(&self, context: &IsolationContext) -> Result<RegressorTrainer> {
        let components = energy_components(&context.energy_source)?;
        let extraction = Extractor::new().extract(
            &self.idle,
            context.feature_group,
            &context.energy_source,
            &components,
        )?;
        if let Some(query) = extraction.missing.first() {
            return Err(PowerModelError::FeatureUnavailable {
                feature_group: context.feature_group.to_string(),
                query: query.clone(),
            });
        }

        let identity = TrainerIdentity::new(
            Algorithm::LinearRegression.trainer_name(),
            context.feature_group,
            context.energy_source.clone(),
            false,
        );
        let mut model = RegressorTrainer::new(
            identity,
            Algorithm::LinearRegression,
            TrainerSettings {
                min_samples: self.min_samples,
            },
        );
        model.fit(&extraction.per_entity)?;
        Ok(model)
    }
}

impl Isolator for TrainIsolator {
    fn kind(&self) -> IsolatorKind {
        IsolatorKind::Trainer
    }

    fn isolate(&self, per_entity: &TrainingTable, context: &IsolationContext) -> Result<Isolation> {
        let model = self.background_model(context)?;
        let mut table = per_entity.clone();
        let components = table.components.clone();

        let mut rows_by_type: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
        for (i, row) in table.rows.iter().enumerate() {
            rows_by_type.entry(row.node_type).or_default().push(i);
        }

        for (node_type, indices) in rows_by_type {
            let x: Vec<Vec<f64>> = indices.iter().map(|&i| table.rows[i].features.clone()).collect();
            for component in &components {
                let background = match model.predict(node_type, component, &x) {
                    Ok(values) => Some(values),
                    Err(PowerModelError::NoModel { .. }) => None,
                    Err(e) => return Err(e),
                };
                if background.is_none() {
                    debug!(
                        node_type = node_type,
                        component = %component,
                        "No background model, labels excluded"
                    );
                }
                for (pos, &i) in indices.iter().enumerate() {
                    let labels = &mut table.rows[i].labels;
                    match &background {
                        Some(values) => {
                            if let Some(value) = labels.get_mut(component) {
                                *value -= values[pos];
                            }
                        }
                        None => {
                            labels.remove(component);
                        }
                    }
                }
            }
        }
        Ok(clamp_labels(table))
    }
}
