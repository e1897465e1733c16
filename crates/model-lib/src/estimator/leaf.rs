use super::{PowerEstimator, PowerRequest, PowerResponse, PowerValues};
use crate::error::Result;
use crate::trainer::{apply_chain, read_leaf, FeatureTransform, FittedModel, LeafManifest};
use std::path::Path;

/// One model and the transforms replayed before it
#[derive(Debug)]
pub struct LeafEstimator {
    manifest: LeafManifest,
    transforms: Vec<FeatureTransform>,
    model: FittedModel,
}

impl LeafEstimator {
    pub fn load(dir: &Path, manifest: LeafManifest) -> Result<Self> {
        let leaf = read_leaf(dir, manifest)?;
        Ok(Self {
            manifest: leaf.manifest,
            transforms: leaf.transforms,
            model: leaf.model,
        })
    }

    pub fn model_name(&self) -> &str {
        &self.manifest.model_name
    }

    pub fn features(&self) -> &[String] {
        &self.manifest.features
    }

    pub fn manifest(&self) -> &LeafManifest {
        &self.manifest
    }

    fn predict(&self, request: &PowerRequest) -> Result<Vec<f64>> {
        let rows = request.rows(&self.manifest.features)?;
        let transformed = apply_chain(&self.transforms, &rows)?;
        self.model.predict(&transformed)
    }
}

impl PowerEstimator for LeafEstimator {
    fn get_power(&self, request: &PowerRequest) -> PowerResponse {
        match self.predict(request) {
            Ok(values) => PowerResponse::ok(PowerValues::Series(values)),
            Err(e) => PowerResponse::failed(e.to_string()),
        }
    }
}
