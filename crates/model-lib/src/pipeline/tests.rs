use super::*;
use crate::isolator::IsolatorKind;
use crate::models::{RawSeries, Sample};
use crate::registry::{feature_query, node_energy_query};
use tempfile::TempDir;

const LINEAR: &str = "LinearRegressionTrainer";
const POLYNOMIAL: &str = "PolynomialRegressionTrainer";

fn counter(entity: &str, node: &str, rates: &[f64]) -> Vec<Sample> {
    let mut total = 0.0;
    let mut samples = vec![Sample {
        entity: entity.to_string(),
        node: node.to_string(),
        container: String::new(),
        timestamp: 0,
        value: 0.0,
    }];
    for (i, rate) in rates.iter().enumerate() {
        total += rate * 3.0;
        samples.push(Sample {
            entity: entity.to_string(),
            node: node.to_string(),
            container: String::new(),
            timestamp: (i as i64 + 1) * 3,
            value: total,
        });
    }
    samples
}

/// Two pods on one node; package power is 5W plus 2W per unit of BPF CPU time
fn workload() -> QueryResults {
    let pod_a: Vec<f64> = (0..15).map(|i| 1.0 + (i % 4) as f64).collect();
    let pod_b: Vec<f64> = (0..15).map(|i| 2.0 + (i % 3) as f64).collect();
    let watts: Vec<f64> = pod_a
        .iter()
        .zip(&pod_b)
        .map(|(a, b)| 5.0 + 2.0 * (a + b))
        .collect();

    let mut bpf = counter("pod-a", "node-1", &pod_a);
    bpf.extend(counter("pod-b", "node-1", &pod_b));
    let mut results = QueryResults::new();
    results.insert(RawSeries::new(feature_query("bpf_cpu_time_us"), bpf));
    results.insert(RawSeries::new(
        node_energy_query("package"),
        counter("node-1", "node-1", &watts),
    ));
    results
}

fn config(model_root: &std::path::Path) -> PipelineConfig {
    PipelineConfig {
        model_root: model_root.to_path_buf(),
        abs_trainers: vec![LINEAR.to_string(), POLYNOMIAL.to_string()],
        dyn_trainers: vec![LINEAR.to_string()],
        feature_groups: vec![FeatureGroup::BpfOnly, FeatureGroup::CgroupOnly],
        ..Default::default()
    }
}

fn components() -> Vec<String> {
    energy_components("rapl").unwrap()
}

#[test]
fn test_missing_feature_group_leaves_trainers_untouched() {
    let dir = TempDir::new().unwrap();
    let mut pipeline = Pipeline::from_config(config(dir.path()), None).unwrap();
    assert_eq!(pipeline.trainers().len(), 6);

    let output = pipeline
        .process(&workload(), &components(), "rapl", FeatureGroup::CgroupOnly)
        .unwrap();
    assert!(!output.success);
    assert!(output.abs.is_empty());
    assert!(output.fits.is_empty());
    assert!(output
        .missing
        .contains(&feature_query("cgroupfs_cpu_usage_us")));
    assert!(pipeline.trainers().iter().all(|t| !t.is_fitted()));
}

#[test]
fn test_process_fits_matching_trainers() {
    let dir = TempDir::new().unwrap();
    let mut pipeline = Pipeline::from_config(config(dir.path()), None).unwrap();

    let output = pipeline
        .process(&workload(), &components(), "rapl", FeatureGroup::BpfOnly)
        .unwrap();
    assert!(output.success);
    assert_eq!(output.abs.len(), 15);
    assert_eq!(output.dyn_table.len(), 30);
    assert_eq!(output.fits.len(), 3);
    assert!(output.fits.iter().all(|f| f.result.is_ok()));

    let abs = pipeline.trainer(LINEAR, FeatureGroup::BpfOnly, true).unwrap();
    assert_eq!(abs.fitted_node_types(), vec![1]);
    // only package has a node energy series in the input
    assert_eq!(abs.components(1), vec!["package"]);
    let predicted = abs.predict(1, "package", &[vec![6.0]]).unwrap();
    assert!((predicted[0] - 17.0).abs() < 1e-6, "got {}", predicted[0]);

    let untouched = pipeline.trainer(LINEAR, FeatureGroup::CgroupOnly, true).unwrap();
    assert!(!untouched.is_fitted());

    assert!(pipeline.verify(&output).is_empty());
}

#[test]
fn test_dyn_labels_are_isolated() {
    let dir = TempDir::new().unwrap();
    let config = PipelineConfig {
        isolator: IsolatorKind::Min,
        ..config(dir.path())
    };
    let mut pipeline = Pipeline::from_config(config, None).unwrap();
    let output = pipeline
        .process(&workload(), &components(), "rapl", FeatureGroup::BpfOnly)
        .unwrap();

    let labels: Vec<f64> = output.dyn_table.label_values("package").collect();
    assert!(labels.iter().all(|v| *v >= 0.0));
    assert_eq!(labels.iter().cloned().fold(f64::INFINITY, f64::min), 0.0);
    // the abs table keeps absolute power
    assert!(output.abs.label_values("package").all(|v| v >= 11.0));
}

#[test]
fn test_save_writes_artifact_tree() {
    let dir = TempDir::new().unwrap();
    let mut pipeline = Pipeline::from_config(config(dir.path()), None).unwrap();
    pipeline
        .process(&workload(), &components(), "rapl", FeatureGroup::BpfOnly)
        .unwrap();

    let saved = pipeline.save().unwrap();
    assert_eq!(saved.len(), 3);
    let linear_abs = dir
        .path()
        .join("std_v0.1/rapl/AbsPower/BPFOnly/LinearRegressionTrainer");
    assert!(saved.contains(&linear_abs));
    assert!(linear_abs.join("1/manifest.json").exists());
    assert!(linear_abs.join("1/package/model.json").exists());
    assert!(!dir.path().join("std_v0.1/rapl/AbsPower/CgroupOnly").exists());
}

#[test]
fn test_process_all_skips_unusable_groups() {
    let dir = TempDir::new().unwrap();
    let mut pipeline = Pipeline::from_config(config(dir.path()), None).unwrap();
    let outputs = pipeline.process_all(&workload()).unwrap();

    let succeeded: Vec<_> = outputs
        .iter()
        .filter(|o| o.success)
        .filter_map(|o| o.feature_group)
        .collect();
    assert_eq!(succeeded, vec![FeatureGroup::BpfOnly]);
}

#[test]
fn test_configuration_errors_fail_fast() {
    let dir = TempDir::new().unwrap();
    let config = PipelineConfig {
        isolator: IsolatorKind::Profile,
        ..config(dir.path())
    };
    let err = Pipeline::from_config(config, None).err().unwrap();
    assert!(matches!(err, PowerModelError::MissingIdleData { .. }));

    let config = PipelineConfig {
        dyn_trainers: vec!["SVRRegressorTrainer".to_string()],
        ..PipelineConfig::default()
    };
    let err = Pipeline::from_config(config, None).err().unwrap();
    assert!(matches!(err, PowerModelError::UnknownTrainer { .. }));
}

#[tokio::test]
async fn test_concurrent_process_matches_sequential() {
    let dir = TempDir::new().unwrap();
    let mut sequential = Pipeline::from_config(config(dir.path()), None).unwrap();
    let mut concurrent = Pipeline::from_config(
        PipelineConfig {
            max_concurrent_fits: 2,
            ..config(dir.path())
        },
        None,
    )
    .unwrap();

    let expected = sequential
        .process(&workload(), &components(), "rapl", FeatureGroup::BpfOnly)
        .unwrap();
    let output = concurrent
        .process_concurrent(&workload(), &components(), "rapl", FeatureGroup::BpfOnly)
        .await
        .unwrap();

    assert_eq!(output, expected);
    let names: Vec<_> = concurrent
        .trainers()
        .iter()
        .map(|t| (t.identity().feature_group, t.identity().node_level, t.identity().name.clone()))
        .collect();
    let expected_names: Vec<_> = sequential
        .trainers()
        .iter()
        .map(|t| (t.identity().feature_group, t.identity().node_level, t.identity().name.clone()))
        .collect();
    assert_eq!(names, expected_names);

    let rows = vec![vec![3.0], vec![5.5]];
    let a = sequential.trainer(POLYNOMIAL, FeatureGroup::BpfOnly, true).unwrap();
    let b = concurrent.trainer(POLYNOMIAL, FeatureGroup::BpfOnly, true).unwrap();
    assert_eq!(
        a.predict(1, "package", &rows).unwrap(),
        b.predict(1, "package", &rows).unwrap()
    );
}

#[tokio::test]
async fn test_concurrent_missing_group_is_not_an_error() {
    let dir = TempDir::new().unwrap();
    let mut pipeline = Pipeline::from_config(config(dir.path()), None).unwrap();
    let output = pipeline
        .process_concurrent(&workload(), &components(), "rapl", FeatureGroup::CgroupOnly)
        .await
        .unwrap();
    assert!(!output.success);
    assert_eq!(pipeline.trainers().len(), 6);
}

const PANICKING: &str = "PanickingTrainer";

/// Trainer whose fit always panics
struct PanickingTrainer {
    identity: TrainerIdentity,
}

impl PanickingTrainer {
    fn create(identity: TrainerIdentity, _: crate::trainer::TrainerSettings) -> Result<Box<dyn Trainer>> {
        Ok(Box::new(Self { identity }))
    }

    fn load(dir: &std::path::Path) -> Result<Box<dyn Trainer>> {
        Err(PowerModelError::artifact(dir, "not persisted"))
    }
}

impl Trainer for PanickingTrainer {
    fn identity(&self) -> &TrainerIdentity {
        &self.identity
    }

    fn fit(&mut self, _: &TrainingTable) -> Result<FitSummary> {
        panic!("fit exploded");
    }

    fn predict(&self, node_type: u32, component: &str, _: &[Vec<f64>]) -> Result<Vec<f64>> {
        Err(PowerModelError::NoModel {
            node_type,
            component: component.to_string(),
        })
    }

    fn fitted_node_types(&self) -> Vec<u32> {
        Vec::new()
    }

    fn components(&self, _: u32) -> Vec<String> {
        Vec::new()
    }

    fn save(&self, _: &std::path::Path) -> Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_concurrent_panicking_fit_spares_siblings() {
    let dir = TempDir::new().unwrap();
    let mut registry = TrainerRegistry::with_defaults();
    registry.register(PANICKING, PanickingTrainer::create, PanickingTrainer::load);
    let pipeline_config = PipelineConfig {
        abs_trainers: vec![LINEAR.to_string(), PANICKING.to_string()],
        dyn_trainers: vec![LINEAR.to_string()],
        feature_groups: vec![FeatureGroup::BpfOnly],
        ..config(dir.path())
    };
    let mut pipeline = Pipeline::new(pipeline_config, &registry, None).unwrap();
    assert_eq!(pipeline.trainers().len(), 3);

    let output = pipeline
        .process_concurrent(&workload(), &components(), "rapl", FeatureGroup::BpfOnly)
        .await
        .unwrap();

    assert!(output.success);
    let outcomes: Vec<_> = output
        .fits
        .iter()
        .map(|f| (f.trainer.as_str(), f.node_level, f.result.is_ok()))
        .collect();
    assert_eq!(
        outcomes,
        vec![(LINEAR, true, true), (PANICKING, true, false), (LINEAR, false, true)]
    );
    assert!(output.fits[1]
        .result
        .as_ref()
        .unwrap_err()
        .contains("training task failed"));

    let names: Vec<_> = pipeline
        .trainers()
        .iter()
        .map(|t| t.identity().name.as_str())
        .collect();
    assert_eq!(names, vec![LINEAR, PANICKING, LINEAR]);
    assert!(pipeline.trainer(LINEAR, FeatureGroup::BpfOnly, true).unwrap().is_fitted());
    assert!(!pipeline.trainer(PANICKING, FeatureGroup::BpfOnly, true).unwrap().is_fitted());
}
