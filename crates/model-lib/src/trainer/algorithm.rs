//! Regression algorithm adapters over smartcore

use super::transform::TransformSpec;
use crate::error::{PowerModelError, Result};
use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::linear::lasso::{Lasso, LassoParameters};
use smartcore::linear::linear_regression::{LinearRegression, LinearRegressionParameters};
use smartcore::linear::ridge_regression::{RidgeRegression, RidgeRegressionParameters};
use smartcore::metrics::distance::euclidian::Euclidian;
use smartcore::neighbors::knn_regressor::{KNNRegressor, KNNRegressorParameters};
use smartcore::tree::decision_tree_regressor::{
    DecisionTreeRegressor, DecisionTreeRegressorParameters,
};
use std::fmt;

type Matrix = DenseMatrix<f64>;

/// Neighbours used by the k-nearest-neighbours regressor
const KNN_NEIGHBORS: usize = 5;

/// Regularisation strength for ridge and lasso. Inputs arrive min-max
/// scaled, so neither rescales again; rescaling rejects constant columns.
const RIDGE_ALPHA: f64 = 1.0;
const LASSO_ALPHA: f64 = 0.1;

/// Regression algorithms backing the built-in trainers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    LinearRegression,
    PolynomialRegression,
    RidgeRegression,
    LassoRegression,
    KNeighborsRegressor,
    DecisionTreeRegressor,
    RandomForestRegressor,
}

impl Algorithm {
    pub const ALL: [Algorithm; 7] = [
        Algorithm::LinearRegression,
        Algorithm::PolynomialRegression,
        Algorithm::RidgeRegression,
        Algorithm::LassoRegression,
        Algorithm::KNeighborsRegressor,
        Algorithm::DecisionTreeRegressor,
        Algorithm::RandomForestRegressor,
    ];

    /// Registry name of the trainer using this algorithm
    pub fn trainer_name(&self) -> &'static str {
        match self {
            Algorithm::LinearRegression => "LinearRegressionTrainer",
            Algorithm::PolynomialRegression => "PolynomialRegressionTrainer",
            Algorithm::RidgeRegression => "RidgeRegressionTrainer",
            Algorithm::LassoRegression => "LassoRegressionTrainer",
            Algorithm::KNeighborsRegressor => "KNeighborsRegressorTrainer",
            Algorithm::DecisionTreeRegressor => "DecisionTreeRegressorTrainer",
            Algorithm::RandomForestRegressor => "RandomForestRegressorTrainer",
        }
    }

    pub fn from_trainer_name(name: &str) -> Option<Self> {
        Algorithm::ALL.iter().find(|a| a.trainer_name() == name).copied()
    }

    /// Transforms fitted before the regressor, in replay order
    pub fn feature_engineering(&self) -> Vec<TransformSpec> {
        match self {
            Algorithm::PolynomialRegression => vec![
                TransformSpec::MinMaxScaler,
                TransformSpec::PolynomialFeatures { degree: 2 },
            ],
            _ => vec![TransformSpec::MinMaxScaler],
        }
    }

    pub fn fit(&self, x: &[Vec<f64>], y: &[f64]) -> Result<FittedModel> {
        if x.len() != y.len() {
            return Err(PowerModelError::Regression(format!(
                "{} feature rows but {} labels",
                x.len(),
                y.len()
            )));
        }
        let matrix = to_matrix(x)?;
        let y = y.to_vec();
        let model = match self {
            Algorithm::LinearRegression | Algorithm::PolynomialRegression => FittedModel::Linear(
                LinearRegression::fit(&matrix, &y, LinearRegressionParameters::default())
                    .map_err(regression_error)?,
            ),
            Algorithm::RidgeRegression => FittedModel::Ridge(
                RidgeRegression::fit(
                    &matrix,
                    &y,
                    RidgeRegressionParameters::default()
                        .with_alpha(RIDGE_ALPHA)
                        .with_normalize(false),
                )
                .map_err(regression_error)?,
            ),
            Algorithm::LassoRegression => FittedModel::Lasso(
                Lasso::fit(
                    &matrix,
                    &y,
                    LassoParameters::default()
                        .with_alpha(LASSO_ALPHA)
                        .with_normalize(false),
                )
                .map_err(regression_error)?,
            ),
            Algorithm::KNeighborsRegressor => FittedModel::KNeighbors(
                KNNRegressor::fit(
                    &matrix,
                    &y,
                    KNNRegressorParameters::default().with_k(KNN_NEIGHBORS.min(x.len())),
                )
                .map_err(regression_error)?,
            ),
            Algorithm::DecisionTreeRegressor => FittedModel::DecisionTree(
                DecisionTreeRegressor::fit(&matrix, &y, DecisionTreeRegressorParameters::default())
                    .map_err(regression_error)?,
            ),
            Algorithm::RandomForestRegressor => FittedModel::RandomForest(
                RandomForestRegressor::fit(&matrix, &y, RandomForestRegressorParameters::default())
                    .map_err(regression_error)?,
            ),
        };
        Ok(model)
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.trainer_name())
    }
}

/// A fitted regressor, serialised as the model file of a leaf artifact
#[derive(Serialize, Deserialize)]
#[serde(tag = "algorithm", content = "model")]
pub enum FittedModel {
    Linear(LinearRegression<f64, f64, Matrix, Vec<f64>>),
    Ridge(RidgeRegression<f64, f64, Matrix, Vec<f64>>),
    Lasso(Lasso<f64, f64, Matrix, Vec<f64>>),
    KNeighbors(KNNRegressor<f64, f64, Matrix, Vec<f64>, Euclidian<f64>>),
    DecisionTree(DecisionTreeRegressor<f64, f64, Matrix, Vec<f64>>),
    RandomForest(RandomForestRegressor<f64, f64, Matrix, Vec<f64>>),
}

impl FittedModel {
    pub fn kind(&self) -> &'static str {
        match self {
            FittedModel::Linear(_) => "Linear",
            FittedModel::Ridge(_) => "Ridge",
            FittedModel::Lasso(_) => "Lasso",
            FittedModel::KNeighbors(_) => "KNeighbors",
            FittedModel::DecisionTree(_) => "DecisionTree",
            FittedModel::RandomForest(_) => "RandomForest",
        }
    }

    /// Predict one value per row of already-transformed features
    pub fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<f64>> {
        let matrix = to_matrix(x)?;
        let predicted = match self {
            FittedModel::Linear(m) => m.predict(&matrix),
            FittedModel::Ridge(m) => m.predict(&matrix),
            FittedModel::Lasso(m) => m.predict(&matrix),
            FittedModel::KNeighbors(m) => m.predict(&matrix),
            FittedModel::DecisionTree(m) => m.predict(&matrix),
            FittedModel::RandomForest(m) => m.predict(&matrix),
        }
        .map_err(regression_error)?;

        if predicted.len() != x.len() {
            return Err(PowerModelError::Regression(format!(
                "{} model returned {} values for {} rows",
                self.kind(),
                predicted.len(),
                x.len()
            )));
        }
        Ok(predicted)
    }
}

impl fmt::Debug for FittedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FittedModel").field(&self.kind()).finish()
    }
}

fn to_matrix(x: &[Vec<f64>]) -> Result<Matrix> {
    if x.is_empty() {
        return Err(PowerModelError::Regression("no rows to process".to_string()));
    }
    DenseMatrix::from_2d_vec(&x.to_vec())
        .map_err(|e| PowerModelError::Regression(format!("failed to build feature matrix: {e}")))
}

fn regression_error(e: smartcore::error::Failed) -> PowerModelError {
    PowerModelError::Regression(e.to_string())
}
