//! Model training command

use anyhow::{Context, Result};
use colored::Colorize;
use model_lib::registry::energy_components;
use model_lib::{IsolatorKind, Pipeline, PipelineConfig, PipelineOutput};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tabled::Tabled;
use tracing::info;

use super::load_query_results;
use crate::output::{color_status, print_info, print_json, print_success, print_table, print_warning, OutputFormat};

/// Command-line overrides applied on top of the loaded configuration
#[derive(Debug, Default)]
pub struct TrainOverrides {
    pub isolator: Option<String>,
    pub energy_source: Option<String>,
    pub abs_trainers: Option<Vec<String>>,
    pub dyn_trainers: Option<Vec<String>>,
    pub model_root: Option<PathBuf>,
    pub pipeline_name: Option<String>,
}

impl TrainOverrides {
    pub fn apply(self, mut config: PipelineConfig) -> Result<PipelineConfig> {
        if let Some(isolator) = self.isolator {
            config.isolator = isolator.parse::<IsolatorKind>()?;
        }
        if let Some(energy_source) = self.energy_source {
            config.energy_source = energy_source;
        }
        if let Some(trainers) = self.abs_trainers {
            config.abs_trainers = trainers;
        }
        if let Some(trainers) = self.dyn_trainers {
            config.dyn_trainers = trainers;
        }
        if let Some(model_root) = self.model_root {
            config.model_root = model_root;
        }
        if let Some(pipeline_name) = self.pipeline_name {
            config.pipeline_name = pipeline_name;
        }
        Ok(config)
    }
}

/// Row for the training summary table
#[derive(Tabled, Serialize)]
struct GroupRow {
    #[tabled(rename = "Feature Group")]
    feature_group: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Abs Rows")]
    abs_rows: usize,
    #[tabled(rename = "Dyn Rows")]
    dyn_rows: usize,
    #[tabled(rename = "Clamped")]
    clamped: usize,
    #[tabled(rename = "Trainers")]
    trainers: String,
}

#[derive(Serialize)]
struct TrainSummary {
    pipeline: String,
    energy_source: String,
    isolator: String,
    feature_groups: Vec<GroupRow>,
    artifacts: Vec<PathBuf>,
    problems: Vec<String>,
}

pub async fn run(
    config: PipelineConfig,
    input: &Path,
    profile: Option<&Path>,
    concurrent: bool,
    format: OutputFormat,
) -> Result<()> {
    let results = load_query_results(input)?;
    let idle = profile.map(load_query_results).transpose()?;

    let mut pipeline =
        Pipeline::from_config(config.clone(), idle.as_ref()).context("Invalid pipeline configuration")?;
    let components = energy_components(&config.energy_source)?;

    let mut outputs = Vec::new();
    for group in config.effective_feature_groups() {
        let output = if concurrent {
            pipeline
                .process_concurrent(&results, &components, &config.energy_source, group)
                .await?
        } else {
            pipeline.process(&results, &components, &config.energy_source, group)?
        };
        outputs.push(output);
    }

    let problems: Vec<String> = outputs
        .iter()
        .filter(|o| o.success)
        .flat_map(|o| pipeline.verify(o))
        .collect();
    let artifacts = pipeline.save().context("Failed to save model artifacts")?;
    info!(artifacts = artifacts.len(), problems = problems.len(), "Training finished");

    let rows: Vec<GroupRow> = outputs.iter().map(|o| group_row(o, format)).collect();
    match format {
        OutputFormat::Json => print_json(&TrainSummary {
            pipeline: config.pipeline_name.clone(),
            energy_source: config.energy_source.clone(),
            isolator: config.isolator.to_string(),
            feature_groups: rows,
            artifacts,
            problems,
        }),
        OutputFormat::Table => {
            println!(
                "{} {} ({}, isolator {})",
                "Pipeline".bold(),
                config.pipeline_name.cyan(),
                config.energy_source,
                config.isolator
            );
            print_table(&rows, format);
            for problem in &problems {
                print_warning(problem);
            }
            if artifacts.is_empty() {
                print_warning("No trainer produced a model");
            } else {
                print_success(&format!(
                    "Saved {} trainer artifacts under {}",
                    artifacts.len(),
                    config.model_root.display()
                ));
                for dir in &artifacts {
                    print_info(&dir.display().to_string());
                }
            }
        }
    }
    Ok(())
}

fn group_row(output: &PipelineOutput, format: OutputFormat) -> GroupRow {
    let fitted = output
        .fits
        .iter()
        .filter(|f| f.result.as_ref().map(|s| !s.fitted.is_empty()).unwrap_or(false))
        .count();
    let status = if !output.success {
        "skipped"
    } else if fitted == output.fits.len() {
        "trained"
    } else if fitted > 0 {
        "partial"
    } else {
        "failed"
    };
    GroupRow {
        feature_group: output
            .feature_group
            .map(|g| g.name().to_string())
            .unwrap_or_default(),
        status: match format {
            OutputFormat::Table => color_status(status),
            OutputFormat::Json => status.to_string(),
        },
        abs_rows: output.abs.len(),
        dyn_rows: output.dyn_table.len(),
        clamped: output.clamped,
        trainers: format!("{}/{}", fitted, output.fits.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_replace_config_values() {
        let overrides = TrainOverrides {
            isolator: Some("profile".to_string()),
            dyn_trainers: Some(vec!["LinearRegressionTrainer".to_string()]),
            ..Default::default()
        };
        let config = overrides.apply(PipelineConfig::default()).unwrap();
        assert_eq!(config.isolator, IsolatorKind::Profile);
        assert_eq!(config.dyn_trainers, vec!["LinearRegressionTrainer"]);
        assert_eq!(config.energy_source, "rapl");
    }

    #[test]
    fn test_unknown_isolator_lists_options() {
        let overrides = TrainOverrides {
            isolator: Some("median".to_string()),
            ..Default::default()
        };
        let err = overrides.apply(PipelineConfig::default()).unwrap_err();
        assert!(err.to_string().contains("trainer"));
    }

    #[test]
    fn test_skipped_group_row() {
        let output = PipelineOutput {
            feature_group: Some(model_lib::FeatureGroup::CgroupOnly),
            ..Default::default()
        };
        let row = group_row(&output, OutputFormat::Json);
        assert_eq!(row.status, "skipped");
        assert_eq!(row.trainers, "0/0");
    }
}
