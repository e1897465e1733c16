use super::*;
use crate::models::{TableRow, TrainingTable};
use crate::registry::FeatureGroup;
use crate::trainer::{
    Algorithm, RegressorTrainer, Trainer, TrainerIdentity, TrainerSettings, MODEL_FILE,
};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

struct FixedEstimator(PowerValues);

impl PowerEstimator for FixedEstimator {
    fn get_power(&self, _request: &PowerRequest) -> PowerResponse {
        PowerResponse::ok(self.0.clone())
    }
}

struct FailingEstimator(&'static str);

impl PowerEstimator for FailingEstimator {
    fn get_power(&self, _request: &PowerRequest) -> PowerResponse {
        PowerResponse::failed(self.0)
    }
}

fn boxed(estimator: impl PowerEstimator + 'static) -> Box<dyn PowerEstimator> {
    Box::new(estimator)
}

fn composite(children: Vec<(&str, Box<dyn PowerEstimator>)>) -> CompositeEstimator {
    CompositeEstimator::new(
        "LinearRegressionTrainer",
        children
            .into_iter()
            .map(|(name, child)| (name.to_string(), child))
            .collect(),
    )
}

fn request() -> PowerRequest {
    PowerRequest::new()
        .with_column("cpu_cycles", vec![3.0, 8.0, 12.5])
        .with_column("bpf_cpu_time_us", vec![1.0, 4.0, 2.0])
}

#[test]
fn test_composite_collects_child_results() {
    let estimator = composite(vec![
        ("package", boxed(FixedEstimator(PowerValues::Series(vec![10.0, 12.0])))),
        ("dram", boxed(FixedEstimator(PowerValues::Scalar(2.5)))),
    ]);
    let response = estimator.get_power(&request());
    assert!(response.is_ok());
    assert_eq!(
        response.powers,
        PowerValues::Components(BTreeMap::from([
            ("dram".to_string(), vec![2.5]),
            ("package".to_string(), vec![10.0, 12.0]),
        ]))
    );
}

#[test]
fn test_composite_fails_when_any_child_fails() {
    let estimator = composite(vec![
        ("package", boxed(FixedEstimator(PowerValues::Series(vec![10.0])))),
        ("dram", boxed(FailingEstimator("dram model rejected request"))),
    ]);
    let response = estimator.get_power(&request());
    assert!(!response.is_ok());
    assert_eq!(response.msg, "dram model rejected request");
    assert!(response.powers.is_empty());
}

#[test]
fn test_nested_composites_are_flattened() {
    let inner = composite(vec![("core", boxed(FixedEstimator(PowerValues::Scalar(1.0))))]);
    let outer = composite(vec![("package", boxed(inner))]);
    let response = outer.get_power(&request());
    assert_eq!(
        response.powers,
        PowerValues::Components(BTreeMap::from([("package/core".to_string(), vec![1.0])]))
    );
}

#[test]
fn test_request_rows_follow_feature_order() {
    let features = vec!["bpf_cpu_time_us".to_string(), "cpu_cycles".to_string()];
    let rows = request().rows(&features).unwrap();
    assert_eq!(rows[0], vec![1.0, 3.0]);
    assert_eq!(rows.len(), 3);

    let ragged = request().with_column("cpu_cycles", vec![1.0]);
    assert!(ragged.rows(&features).is_err());
    assert!(request().rows(&["cache_miss".to_string()]).is_err());
}

fn fitted_trainer(name: &str) -> RegressorTrainer {
    let mut table = TrainingTable::new(
        vec!["cpu_cycles".to_string(), "bpf_cpu_time_us".to_string()],
        vec!["package".to_string(), "dram".to_string()],
    );
    for i in 0..24 {
        let x0 = i as f64;
        let x1 = ((i * 5) % 7) as f64;
        table.rows.push(TableRow {
            timestamp: i * 3,
            entity: "node-1".to_string(),
            node_type: 1,
            features: vec![x0, x1],
            labels: BTreeMap::from([
                ("package".to_string(), 1.5 * x0 + 3.0 * x1 + 20.0),
                ("dram".to_string(), 0.2 * x0 + 2.0),
            ]),
        });
    }
    let identity = TrainerIdentity::new(name, FeatureGroup::Basic, "rapl", true);
    let algorithm = Algorithm::from_trainer_name(name).unwrap();
    let mut trainer = RegressorTrainer::new(identity, algorithm, TrainerSettings::default());
    trainer.fit(&table).unwrap();
    trainer
}

#[test]
fn test_loaded_composite_matches_trainer() {
    let dir = TempDir::new().unwrap();
    let trainer = fitted_trainer("PolynomialRegressionTrainer");
    trainer.save(dir.path()).unwrap();

    let estimator = ModelEstimator::load(&dir.path().join("1")).unwrap();
    assert!(matches!(estimator, ModelEstimator::Composite(_)));
    assert_eq!(estimator.components(), vec!["dram", "package"]);
    assert_eq!(estimator.model_name(), "PolynomialRegressionTrainer");

    let response = estimator.get_power(&request());
    assert!(response.is_ok(), "{}", response.msg);
    let rows = request()
        .rows(&["cpu_cycles".to_string(), "bpf_cpu_time_us".to_string()])
        .unwrap();
    let PowerValues::Components(powers) = response.powers else {
        panic!("expected a component breakdown");
    };
    for component in ["package", "dram"] {
        assert_eq!(powers[component], trainer.predict(1, component, &rows).unwrap());
    }
}

#[test]
fn test_leaf_reports_malformed_request() {
    let dir = TempDir::new().unwrap();
    fitted_trainer("LinearRegressionTrainer").save(dir.path()).unwrap();

    let leaf = ModelEstimator::load(&dir.path().join("1").join("package")).unwrap();
    assert!(matches!(leaf, ModelEstimator::Leaf(_)));

    let missing = PowerRequest::new().with_column("cpu_cycles", vec![1.0]);
    let response = leaf.get_power(&missing);
    assert!(!response.is_ok());
    assert!(response.msg.contains("bpf_cpu_time_us"));
    assert!(response.powers.is_empty());

    let non_finite = request().with_column("cpu_cycles", vec![f64::NAN, 1.0, 2.0]);
    assert!(!leaf.get_power(&non_finite).is_ok());
}

#[test]
fn test_corrupt_child_fails_load() {
    let dir = TempDir::new().unwrap();
    fitted_trainer("LinearRegressionTrainer").save(dir.path()).unwrap();
    let good = ModelEstimator::load(&dir.path().join("1")).unwrap();

    fs::write(dir.path().join("1").join("dram").join(MODEL_FILE), b"{}").unwrap();
    let err = ModelEstimator::load(&dir.path().join("1")).unwrap_err();
    assert!(matches!(err, PowerModelError::ChecksumMismatch { .. }));

    // the estimator loaded earlier is unaffected
    assert!(good.get_power(&request()).is_ok());
}

#[test]
fn test_concurrent_get_power() {
    let dir = TempDir::new().unwrap();
    fitted_trainer("RandomForestRegressorTrainer")
        .save(dir.path())
        .unwrap();
    let estimator = Arc::new(ModelEstimator::load(&dir.path().join("1")).unwrap());
    let expected = estimator.get_power(&request());

    std::thread::scope(|scope| {
        for _ in 0..4 {
            let estimator = Arc::clone(&estimator);
            let expected = expected.clone();
            scope.spawn(move || assert_eq!(estimator.get_power(&request()), expected));
        }
    });
}
