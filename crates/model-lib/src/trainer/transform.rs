//! Feature-engineering chain
//!
//! Transforms are fitted on training features in chain order and replayed
//! in the same order before every prediction.

use crate::error::{PowerModelError, Result};
use serde::{Deserialize, Serialize};

/// Unfitted transform declared by an algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransformSpec {
    MinMaxScaler,
    PolynomialFeatures { degree: u32 },
}

/// Fitted transform, persisted as one file of the chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeatureTransform {
    /// Scales each column to [0, 1] using the training range; constant columns map to 0
    MinMaxScaler { min: Vec<f64>, max: Vec<f64> },
    /// Monomials of degree 1..=degree without bias term
    PolynomialFeatures { degree: u32, n_input: usize },
}

impl TransformSpec {
    pub fn fit(&self, x: &[Vec<f64>]) -> Result<FeatureTransform> {
        let width = check_matrix(x, None)?;
        match self {
            TransformSpec::MinMaxScaler => {
                let mut min = vec![f64::INFINITY; width];
                let mut max = vec![f64::NEG_INFINITY; width];
                for row in x {
                    for (j, v) in row.iter().enumerate() {
                        min[j] = min[j].min(*v);
                        max[j] = max[j].max(*v);
                    }
                }
                Ok(FeatureTransform::MinMaxScaler { min, max })
            }
            TransformSpec::PolynomialFeatures { degree } => {
                if *degree == 0 {
                    return Err(PowerModelError::Transform(
                        "polynomial degree must be at least 1".to_string(),
                    ));
                }
                Ok(FeatureTransform::PolynomialFeatures {
                    degree: *degree,
                    n_input: width,
                })
            }
        }
    }
}

impl FeatureTransform {
    pub fn name(&self) -> &'static str {
        match self {
            FeatureTransform::MinMaxScaler { .. } => "min_max_scaler",
            FeatureTransform::PolynomialFeatures { .. } => "polynomial_features",
        }
    }

    pub fn input_width(&self) -> usize {
        match self {
            FeatureTransform::MinMaxScaler { min, .. } => min.len(),
            FeatureTransform::PolynomialFeatures { n_input, .. } => *n_input,
        }
    }

    pub fn transform(&self, x: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        check_matrix(x, Some(self.input_width()))?;
        match self {
            FeatureTransform::MinMaxScaler { min, max } => Ok(x
                .iter()
                .map(|row| {
                    row.iter()
                        .enumerate()
                        .map(|(j, v)| {
                            let range = max[j] - min[j];
                            if range > 0.0 {
                                (v - min[j]) / range
                            } else {
                                0.0
                            }
                        })
                        .collect()
                })
                .collect()),
            FeatureTransform::PolynomialFeatures { degree, n_input } => {
                let terms = monomials(*n_input, *degree);
                Ok(x
                    .iter()
                    .map(|row| {
                        terms
                            .iter()
                            .map(|term| term.iter().map(|&j| row[j]).product())
                            .collect()
                    })
                    .collect())
            }
        }
    }
}

/// Fit every transform in order, feeding each the previous output
pub fn fit_chain(
    specs: &[TransformSpec],
    x: &[Vec<f64>],
) -> Result<(Vec<FeatureTransform>, Vec<Vec<f64>>)> {
    let mut chain = Vec::with_capacity(specs.len());
    let mut current = x.to_vec();
    for spec in specs {
        let transform = spec.fit(&current)?;
        current = transform.transform(&current)?;
        chain.push(transform);
    }
    Ok((chain, current))
}

/// Replay a fitted chain in persisted order
pub fn apply_chain(chain: &[FeatureTransform], x: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
    let mut current = x.to_vec();
    for transform in chain {
        current = transform.transform(&current)?;
    }
    Ok(current)
}

/// Index tuples of every monomial, ordered by degree then lexicographically
fn monomials(n_input: usize, degree: u32) -> Vec<Vec<usize>> {
    let mut terms = Vec::new();
    let mut current: Vec<Vec<usize>> = (0..n_input).map(|j| vec![j]).collect();
    for _ in 0..degree {
        let next = current
            .iter()
            .flat_map(|term| {
                let last = term.last().copied().unwrap_or(0);
                (last..n_input).map(move |j| {
                    let mut extended = term.clone();
                    extended.push(j);
                    extended
                })
            })
            .collect();
        terms.append(&mut current);
        current = next;
    }
    terms
}

/// Rejects empty, ragged or non-finite input; returns the column count
fn check_matrix(x: &[Vec<f64>], expected_width: Option<usize>) -> Result<usize> {
    let Some(first) = x.first() else {
        return Err(PowerModelError::Transform("empty input".to_string()));
    };
    let width = expected_width.unwrap_or(first.len());
    for (i, row) in x.iter().enumerate() {
        if row.len() != width {
            return Err(PowerModelError::Transform(format!(
                "row {} has {} columns, expected {}",
                i,
                row.len(),
                width
            )));
        }
        if row.iter().any(|v| !v.is_finite()) {
            return Err(PowerModelError::Transform(format!(
                "row {} contains a non-finite value",
                i
            )));
        }
    }
    Ok(width)
}
