//! Command handlers

pub mod estimate;
pub mod inspect;
pub mod train;
pub mod validate;

use anyhow::{Context, Result};
use model_lib::telemetry::PromResponse;
use model_lib::QueryResults;
use std::path::Path;

/// Read query results saved either in sample form or as a Prometheus response
pub fn load_query_results(path: &Path) -> Result<QueryResults> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    if let Ok(results) = serde_json::from_str::<QueryResults>(&content) {
        return Ok(results);
    }
    let response: PromResponse = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse query results in {}", path.display()))?;
    Ok(QueryResults::from_prometheus(&response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_sample_form() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"kepler_node_package_joules_total": [{{"entity": "n1", "node": "n1", "timestamp": 3, "value": 30.0}}]}}"#
        )
        .unwrap();
        let results = load_query_results(file.path()).unwrap();
        assert_eq!(results.get("kepler_node_package_joules_total").unwrap().samples.len(), 1);
    }

    #[test]
    fn test_load_prometheus_form() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"kepler_container_bpf_cpu_time_us_total": [{{"metric": {{"pod_name": "pod-a", "instance": "n1"}}, "values": [[0, "1"], [3, "4"]]}}]}}"#
        )
        .unwrap();
        let results = load_query_results(file.path()).unwrap();
        let series = results.get("kepler_container_bpf_cpu_time_us_total").unwrap();
        assert_eq!(series.samples.len(), 2);
        assert_eq!(series.samples[0].entity, "pod-a");
        assert_eq!(series.samples[1].node, "n1");
    }
}
