//! Input inspection

use anyhow::Result;
use colored::Colorize;
use model_lib::registry::valid_feature_groups;
use model_lib::{FeatureGroup, NodeTypeAssignment, QueryResults};
use serde::Serialize;
use std::path::Path;
use tabled::Tabled;

use super::load_query_results;
use crate::output::{color_status, print_table, OutputFormat};

/// Row for the feature group table
#[derive(Tabled, Serialize)]
struct FeatureGroupRow {
    #[tabled(rename = "Feature Group")]
    feature_group: String,
    #[tabled(rename = "Features")]
    features: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(skip)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    missing: Vec<String>,
}

pub fn run(input: &Path, format: OutputFormat) -> Result<()> {
    let results = load_query_results(input)?;
    let rows = feature_group_rows(&results, format);

    if let OutputFormat::Table = format {
        println!("{}", "Feature Groups".bold());
        println!("Queries in input: {}", results.len().to_string().cyan());
        let node_types = NodeTypeAssignment::from_query_results(&results);
        if let Some(series) = results.get(model_lib::registry::NODE_INFO_QUERY) {
            let mut nodes: Vec<_> = series.samples.iter().map(|s| s.node.as_str()).collect();
            nodes.sort_unstable();
            nodes.dedup();
            for node in nodes {
                println!("  node {} -> type {}", node, node_types.node_type(node));
            }
        }
        println!();
    }
    print_table(&rows, format);
    Ok(())
}

fn feature_group_rows(results: &QueryResults, format: OutputFormat) -> Vec<FeatureGroupRow> {
    let valid = valid_feature_groups(results.queries());
    FeatureGroup::ALL
        .iter()
        .map(|group| {
            let available = valid.contains(group);
            let status = if available { "available" } else { "missing" };
            FeatureGroupRow {
                feature_group: group.name().to_string(),
                features: group.features().join(", "),
                status: match format {
                    OutputFormat::Table => color_status(status),
                    OutputFormat::Json => status.to_string(),
                },
                missing: group
                    .queries()
                    .into_iter()
                    .filter(|q| !results.contains(q))
                    .collect(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use model_lib::registry::feature_query;
    use model_lib::RawSeries;

    #[test]
    fn test_rows_mark_available_groups() {
        let mut results = QueryResults::new();
        results.insert(RawSeries::new(feature_query("bpf_cpu_time_us"), vec![]));
        let rows = feature_group_rows(&results, OutputFormat::Json);

        let bpf = rows.iter().find(|r| r.feature_group == "BPFOnly").unwrap();
        assert_eq!(bpf.status, "available");
        assert!(bpf.missing.is_empty());
        let basic = rows.iter().find(|r| r.feature_group == "Basic").unwrap();
        assert_eq!(basic.status, "missing");
        assert_eq!(basic.missing, vec![feature_query("cpu_cycles")]);
    }
}
