//! On-disk model artifacts
//!
//! A leaf artifact directory holds `manifest.json`, `model.json` and one
//! `fe_<i>.json` per feature transform. A composite directory holds a
//! manifest mapping each energy component to a child directory.

use super::algorithm::FittedModel;
use super::transform::FeatureTransform;
use crate::error::{PowerModelError, Result};
use crate::registry::ModelOutputType;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const MODEL_FILE: &str = "model.json";

/// Manifest declaring whether a directory is a leaf or a composite
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelManifest {
    Leaf(LeafManifest),
    Composite(CompositeManifest),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafManifest {
    pub model_name: String,
    pub output_type: ModelOutputType,
    pub features: Vec<String>,
    pub model_file: String,
    /// Feature transform files in replay order
    pub fe_files: Vec<String>,
    /// SHA-256 of the model file
    pub checksum: String,
    pub samples: usize,
    pub trained_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeManifest {
    pub model_name: String,
    pub output_type: ModelOutputType,
    /// Component name to child directory, relative to this manifest
    pub components: BTreeMap<String, String>,
}

/// A leaf artifact read back from disk
#[derive(Debug)]
pub struct LeafArtifact {
    pub manifest: LeafManifest,
    pub transforms: Vec<FeatureTransform>,
    pub model: FittedModel,
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_vec_pretty(value)?;
    fs::write(path, content).map_err(|e| PowerModelError::io(path, e))
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read(path).map_err(|e| PowerModelError::io(path, e))?;
    serde_json::from_slice(&content)
        .map_err(|e| PowerModelError::artifact(path, format!("malformed JSON: {e}")))
}

pub fn read_manifest(dir: &Path) -> Result<ModelManifest> {
    read_json(&dir.join(MANIFEST_FILE))
}

/// Compute SHA256 checksum of data
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Persist a leaf: transforms first, then the model, then the manifest
pub fn write_leaf(
    dir: &Path,
    model_name: &str,
    output_type: ModelOutputType,
    features: &[String],
    transforms: &[FeatureTransform],
    model: &FittedModel,
    samples: usize,
) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| PowerModelError::io(dir, e))?;

    let mut fe_files = Vec::with_capacity(transforms.len());
    for (i, transform) in transforms.iter().enumerate() {
        let name = format!("fe_{}.json", i);
        write_json(&dir.join(&name), transform)?;
        fe_files.push(name);
    }

    let model_bytes = serde_json::to_vec(model)?;
    let model_path = dir.join(MODEL_FILE);
    fs::write(&model_path, &model_bytes).map_err(|e| PowerModelError::io(&model_path, e))?;

    let manifest = ModelManifest::Leaf(LeafManifest {
        model_name: model_name.to_string(),
        output_type,
        features: features.to_vec(),
        model_file: MODEL_FILE.to_string(),
        fe_files,
        checksum: compute_checksum(&model_bytes),
        samples,
        trained_at: chrono::Utc::now().to_rfc3339(),
    });
    write_json(&dir.join(MANIFEST_FILE), &manifest)
}

pub fn write_composite(dir: &Path, manifest: &CompositeManifest) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| PowerModelError::io(dir, e))?;
    write_json(&dir.join(MANIFEST_FILE), &ModelManifest::Composite(manifest.clone()))
}

/// Read a leaf directory, verifying the model checksum
pub fn read_leaf(dir: &Path, manifest: LeafManifest) -> Result<LeafArtifact> {
    let model_path = child_path(dir, &manifest.model_file)?;
    let model_bytes = fs::read(&model_path).map_err(|e| PowerModelError::io(&model_path, e))?;
    let actual = compute_checksum(&model_bytes);
    if actual != manifest.checksum {
        return Err(PowerModelError::ChecksumMismatch {
            path: model_path,
            expected: manifest.checksum.clone(),
            actual,
        });
    }
    let model: FittedModel = serde_json::from_slice(&model_bytes)
        .map_err(|e| PowerModelError::artifact(&model_path, format!("malformed model: {e}")))?;

    let transforms = manifest
        .fe_files
        .iter()
        .map(|file| read_json(&child_path(dir, file)?))
        .collect::<Result<Vec<FeatureTransform>>>()?;

    Ok(LeafArtifact {
        manifest,
        transforms,
        model,
    })
}

/// Resolve a manifest reference, refusing anything outside `dir`
pub fn child_path(dir: &Path, relative: &str) -> Result<PathBuf> {
    let rel = Path::new(relative);
    let escapes = rel.components().any(|c| !matches!(c, Component::Normal(_)));
    if relative.is_empty() || escapes {
        return Err(PowerModelError::artifact(
            dir,
            format!("reference {:?} must be a relative path inside the artifact", relative),
        ));
    }
    Ok(dir.join(rel))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trainer::algorithm::Algorithm;
    use tempfile::TempDir;

    fn fitted() -> FittedModel {
        let x: Vec<Vec<f64>> = (0..12).map(|i| vec![i as f64]).collect();
        let y: Vec<f64> = (0..12).map(|i| 2.0 * i as f64 + 1.0).collect();
        Algorithm::LinearRegression.fit(&x, &y).unwrap()
    }

    #[test]
    fn test_checksum() {
        assert_eq!(
            compute_checksum(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_leaf_round_trip() {
        let dir = TempDir::new().unwrap();
        let transforms = vec![FeatureTransform::MinMaxScaler {
            min: vec![0.0],
            max: vec![11.0],
        }];
        write_leaf(
            dir.path(),
            "LinearRegressionTrainer",
            ModelOutputType::AbsPower,
            &["bpf_cpu_time_us".to_string()],
            &transforms,
            &fitted(),
            12,
        )
        .unwrap();

        let ModelManifest::Leaf(manifest) = read_manifest(dir.path()).unwrap() else {
            panic!("expected leaf manifest");
        };
        assert_eq!(manifest.fe_files, vec!["fe_0.json"]);
        let leaf = read_leaf(dir.path(), manifest).unwrap();
        assert_eq!(leaf.transforms, transforms);
        assert_eq!(leaf.model.kind(), "Linear");
    }

    #[test]
    fn test_tampered_model_rejected() {
        let dir = TempDir::new().unwrap();
        write_leaf(
            dir.path(),
            "LinearRegressionTrainer",
            ModelOutputType::DynPower,
            &["x".to_string()],
            &[],
            &fitted(),
            12,
        )
        .unwrap();
        fs::write(dir.path().join(MODEL_FILE), b"{}").unwrap();

        let ModelManifest::Leaf(manifest) = read_manifest(dir.path()).unwrap() else {
            panic!("expected leaf manifest");
        };
        let err = read_leaf(dir.path(), manifest).unwrap_err();
        assert!(matches!(err, PowerModelError::ChecksumMismatch { .. }));
    }

    #[test]
    fn test_child_path_stays_inside() {
        let dir = Path::new("/models/x");
        assert!(child_path(dir, "package").is_ok());
        assert!(child_path(dir, "../other").is_err());
        assert!(child_path(dir, "/etc/passwd").is_err());
        assert!(child_path(dir, "").is_err());
    }
}
