//! Power estimation from a saved model

use anyhow::{bail, Context, Result};
use colored::Colorize;
use model_lib::{ModelEstimator, PowerEstimator, PowerRequest, PowerValues, StructuredLogger};
use serde::Serialize;
use std::path::Path;
use tabled::Tabled;

use crate::output::{format_watts, print_json, print_table, OutputFormat};

/// Row for the power table
#[derive(Tabled, Serialize)]
struct PowerRow {
    #[tabled(rename = "Component")]
    component: String,
    #[tabled(rename = "Power")]
    values: String,
}

pub fn run(pipeline_name: &str, model: &Path, request: &Path, format: OutputFormat) -> Result<()> {
    let estimator = ModelEstimator::load(model)
        .with_context(|| format!("Failed to load model from {}", model.display()))?;
    StructuredLogger::new(pipeline_name)
        .log_estimator_loaded(&model.display().to_string(), &estimator.components());

    let content = std::fs::read_to_string(request)
        .with_context(|| format!("Failed to read {}", request.display()))?;
    let request: PowerRequest =
        serde_json::from_str(&content).context("Failed to parse power request")?;

    let response = estimator.get_power(&request);
    if let OutputFormat::Json = format {
        print_json(&response);
    } else if response.is_ok() {
        println!("{} {}", "Model".bold(), estimator.model_name().cyan());
        print_table(&power_rows(&response.powers), format);
    }
    if !response.is_ok() {
        bail!("estimation failed: {}", response.msg);
    }
    Ok(())
}

fn power_rows(powers: &PowerValues) -> Vec<PowerRow> {
    match powers {
        PowerValues::Scalar(value) => vec![PowerRow {
            component: "total".to_string(),
            values: format_watts(*value),
        }],
        PowerValues::Series(values) => vec![PowerRow {
            component: "total".to_string(),
            values: join_watts(values),
        }],
        PowerValues::Components(map) => map
            .iter()
            .map(|(component, values)| PowerRow {
                component: component.clone(),
                values: join_watts(values),
            })
            .collect(),
    }
}

fn join_watts(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| format_watts(*v))
        .collect::<Vec<_>>()
        .join(", ")
}
