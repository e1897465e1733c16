//! Telemetry conversion
//!
//! Turns saved Prometheus range-query responses into [`QueryResults`] and
//! cumulative counters into per-second rates.

use crate::models::{QueryResults, RawSeries, Sample};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Labels checked, in order, for the entity a sample belongs to
const ENTITY_LABELS: &[&str] = &["pod_name", "container_name", "node", "instance"];

/// Labels checked, in order, for the node hosting the entity
const NODE_LABELS: &[&str] = &["node", "instance"];

/// Labels distinguishing series of the same entity
const CONTAINER_LABELS: &[&str] = &["container_name", "container_id"];

/// Labels that never tell two series of one entity apart
const SHARED_LABELS: &[&str] = &["__name__", "job", "pod_name", "node", "instance"];

/// One series of a Prometheus matrix result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromMatrixSeries {
    #[serde(default)]
    pub metric: BTreeMap<String, String>,
    #[serde(default)]
    pub values: Vec<(f64, String)>,
}

/// Saved range-query response: query name to matrix series
pub type PromResponse = BTreeMap<String, Vec<PromMatrixSeries>>;

/// Convert a Prometheus response into query results
///
/// Values that do not parse as finite numbers are dropped.
pub fn from_prometheus(response: &PromResponse) -> QueryResults {
    let mut results = QueryResults::new();
    for (query, matrix) in response {
        let mut samples = Vec::new();
        for series in matrix {
            let entity = first_label(&series.metric, ENTITY_LABELS);
            let node = first_label(&series.metric, NODE_LABELS);
            let container = series_key(&series.metric);
            for (ts, raw) in &series.values {
                match raw.parse::<f64>() {
                    Ok(value) if value.is_finite() => samples.push(Sample {
                        entity: entity.clone(),
                        node: node.clone(),
                        container: container.clone(),
                        timestamp: *ts as i64,
                        value,
                    }),
                    _ => debug!(query = %query, value = %raw, "Dropping non-numeric sample"),
                }
            }
        }
        results.insert(RawSeries::new(query.clone(), samples));
    }
    results
}

impl QueryResults {
    pub fn from_prometheus(response: &PromResponse) -> Self {
        from_prometheus(response)
    }
}

/// Key separating series of one entity: the container label, else the remaining labels
fn series_key(labels: &BTreeMap<String, String>) -> String {
    let container = first_label(labels, CONTAINER_LABELS);
    if !container.is_empty() {
        return container;
    }
    labels
        .iter()
        .filter(|(k, _)| !SHARED_LABELS.contains(&k.as_str()))
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

fn first_label(labels: &BTreeMap<String, String>, keys: &[&str]) -> String {
    keys.iter()
        .find_map(|k| labels.get(*k).filter(|v| !v.is_empty()))
        .cloned()
        .unwrap_or_default()
}

/// Values of a series ready for alignment: rates for counters, raw values otherwise
pub fn series_values(series: &RawSeries) -> Vec<Sample> {
    if series.is_counter() {
        to_rates(&series.samples)
    } else {
        series.samples.clone()
    }
}

/// Per-second rate between consecutive samples of each source series
///
/// A series is one (entity, node, container); containers of one pod keep
/// separate counters. The rate is stamped with the later timestamp. Counter
/// resets (negative deltas) and repeated timestamps produce no sample.
pub fn to_rates(samples: &[Sample]) -> Vec<Sample> {
    let mut by_series: BTreeMap<(&str, &str, &str), Vec<&Sample>> = BTreeMap::new();
    for sample in samples {
        by_series
            .entry((sample.entity.as_str(), sample.node.as_str(), sample.container.as_str()))
            .or_default()
            .push(sample);
    }

    let mut rates = Vec::new();
    for (_, mut series_samples) in by_series {
        series_samples.sort_by_key(|s| s.timestamp);
        for pair in series_samples.windows(2) {
            let (prev, cur) = (pair[0], pair[1]);
            let dt = cur.timestamp - prev.timestamp;
            let dv = cur.value - prev.value;
            if dt <= 0 || dv < 0.0 {
                continue;
            }
            rates.push(Sample {
                entity: cur.entity.clone(),
                node: cur.node.clone(),
                container: cur.container.clone(),
                timestamp: cur.timestamp,
                value: dv / dt as f64,
            });
        }
    }
    rates
}
