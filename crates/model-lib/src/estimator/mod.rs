//! Inference-side model hierarchy
//!
//! An artifact directory is either a leaf (one model plus its feature
//! transforms) or a composite mapping component names to child artifacts.
//! [`ModelEstimator::load`] follows composites recursively. Estimators are
//! immutable once loaded, so `get_power` can be called from many threads.

mod composite;
mod leaf;

#[cfg(test)]
mod tests;

pub use composite::CompositeEstimator;
pub use leaf::LeafEstimator;

use crate::error::{PowerModelError, Result};
use crate::trainer::{child_path, read_manifest, ModelManifest};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Raw feature columns keyed by feature name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PowerRequest {
    pub columns: BTreeMap<String, Vec<f64>>,
}

impl PowerRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_column(mut self, feature: impl Into<String>, values: Vec<f64>) -> Self {
        self.columns.insert(feature.into(), values);
        self
    }

    /// Assemble rows in `features` order
    pub fn rows(&self, features: &[String]) -> Result<Vec<Vec<f64>>> {
        let mut columns = Vec::with_capacity(features.len());
        for feature in features {
            let column = self.columns.get(feature).ok_or_else(|| {
                PowerModelError::FeatureMismatch(format!("request has no column {}", feature))
            })?;
            columns.push(column);
        }
        let Some(len) = columns.first().map(|c| c.len()) else {
            return Err(PowerModelError::FeatureMismatch(
                "model declares no features".to_string(),
            ));
        };
        if let Some((feature, column)) = features
            .iter()
            .zip(&columns)
            .find(|(_, c)| c.len() != len)
        {
            return Err(PowerModelError::FeatureMismatch(format!(
                "column {} has {} values, expected {}",
                feature,
                column.len(),
                len
            )));
        }
        Ok((0..len)
            .map(|i| columns.iter().map(|c| c[i]).collect())
            .collect())
    }
}

/// Power values returned by an estimator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PowerValues {
    Scalar(f64),
    Series(Vec<f64>),
    Components(BTreeMap<String, Vec<f64>>),
}

impl PowerValues {
    pub fn empty() -> Self {
        PowerValues::Series(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            PowerValues::Scalar(_) => false,
            PowerValues::Series(values) => values.is_empty(),
            PowerValues::Components(map) => map.is_empty(),
        }
    }
}

/// Result of `get_power`: values, or empty values and a non-empty message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerResponse {
    pub powers: PowerValues,
    pub msg: String,
}

impl PowerResponse {
    pub fn ok(powers: PowerValues) -> Self {
        Self {
            powers,
            msg: String::new(),
        }
    }

    pub fn failed(msg: impl Into<String>) -> Self {
        Self {
            powers: PowerValues::empty(),
            msg: msg.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.msg.is_empty()
    }
}

/// Anything that turns a feature request into power values
pub trait PowerEstimator: Send + Sync {
    fn get_power(&self, request: &PowerRequest) -> PowerResponse;
}

/// Estimator loaded from an artifact directory
#[derive(Debug)]
pub enum ModelEstimator {
    Leaf(LeafEstimator),
    Composite(CompositeEstimator),
}

impl ModelEstimator {
    /// Load the artifact at `dir`, recursing into composite children
    ///
    /// A failure leaves nothing behind; previously loaded estimators are
    /// unaffected.
    pub fn load(dir: &Path) -> Result<Self> {
        match read_manifest(dir)? {
            ModelManifest::Leaf(manifest) => Ok(ModelEstimator::Leaf(LeafEstimator::load(dir, manifest)?)),
            ModelManifest::Composite(manifest) => {
                let mut children: BTreeMap<String, Box<dyn PowerEstimator>> = BTreeMap::new();
                for (component, relative) in &manifest.components {
                    let child = ModelEstimator::load(&child_path(dir, relative)?)?;
                    children.insert(component.clone(), Box::new(child));
                }
                Ok(ModelEstimator::Composite(CompositeEstimator::new(
                    manifest.model_name,
                    children,
                )))
            }
        }
    }

    pub fn model_name(&self) -> &str {
        match self {
            ModelEstimator::Leaf(leaf) => leaf.model_name(),
            ModelEstimator::Composite(composite) => composite.model_name(),
        }
    }

    /// Component names of a composite; empty for a leaf
    pub fn components(&self) -> Vec<String> {
        match self {
            ModelEstimator::Leaf(_) => Vec::new(),
            ModelEstimator::Composite(composite) => composite.components(),
        }
    }
}

impl PowerEstimator for ModelEstimator {
    fn get_power(&self, request: &PowerRequest) -> PowerResponse {
        match self {
            ModelEstimator::Leaf(leaf) => leaf.get_power(request),
            ModelEstimator::Composite(composite) => composite.get_power(request),
        }
    }
}
