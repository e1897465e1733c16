//! Telemetry validation against a benchmark run

use anyhow::{Context, Result};
use colored::Colorize;
use model_lib::benchmark::{self, ValidationItem};
use model_lib::BenchmarkMetadata;
use serde::Serialize;
use std::path::Path;
use tabled::Tabled;

use super::load_query_results;
use crate::output::{color_status, print_json, print_table, OutputFormat};

/// Row for the validation table
#[derive(Tabled, Serialize)]
struct ValidationRow {
    #[tabled(rename = "Scenario")]
    scenario: String,
    #[tabled(rename = "Pod")]
    pod: String,
    #[tabled(rename = "Query")]
    query: String,
    #[tabled(rename = "Samples")]
    count: usize,
    #[tabled(rename = ">0")]
    positive: usize,
    #[tabled(rename = "Status")]
    status: String,
}

#[derive(Serialize)]
struct ValidationReport {
    items: Vec<ValidationItem>,
    summary: Vec<benchmark::UsageSummary>,
}

pub fn run(input: &Path, benchmark: Option<&Path>, format: OutputFormat) -> Result<()> {
    let results = load_query_results(input)?;
    let metadata = benchmark
        .map(|path| -> Result<BenchmarkMetadata> {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            BenchmarkMetadata::from_json(&content)
                .with_context(|| format!("Failed to parse benchmark {}", path.display()))
        })
        .transpose()?;

    let items = benchmark::validate(&results, metadata.as_ref());
    let summary = benchmark::summarize(&items);

    match format {
        OutputFormat::Json => print_json(&ValidationReport { items, summary }),
        OutputFormat::Table => {
            if let Some(metadata) = &metadata {
                println!(
                    "{} created {} ({} scenarios)",
                    "Benchmark".bold(),
                    metadata.created_at.to_rfc3339().cyan(),
                    metadata.results.len()
                );
            }
            let rows: Vec<ValidationRow> = items.iter().map(validation_row).collect();
            print_table(&rows, format);
            for usage in &summary {
                println!(
                    "{}: availability {:.0}%, {} valid datapoints",
                    usage.query,
                    usage.availability * 100.0,
                    usage.valid_datapoints
                );
            }
        }
    }
    Ok(())
}

fn validation_row(item: &ValidationItem) -> ValidationRow {
    let status = if item.count == 0 {
        "missing"
    } else if item.positive == 0 {
        "zero"
    } else {
        "ok"
    };
    ValidationRow {
        scenario: item.scenario_id.clone(),
        pod: item.pod.clone(),
        query: item.query.clone(),
        count: item.count,
        positive: item.positive,
        status: color_status(status),
    }
}
