//! Benchmark metadata and telemetry validation
//!
//! A benchmark run records which pod executed each repetition of each
//! scenario. Validation counts, per pod and query, how many usable samples
//! the telemetry holds so that missing exporters show up per scenario
//! before anything is trained.

use crate::error::Result;
use crate::models::QueryResults;
use crate::telemetry::series_values;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Benchmark run description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkMetadata {
    pub created_at: DateTime<Utc>,
    pub results: Vec<ScenarioResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioResult {
    #[serde(rename = "scenarioID")]
    pub scenario_id: String,
    #[serde(default)]
    pub configurations: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub repetitions: Vec<Repetition>,
}

/// One execution of a scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repetition {
    pub pod: String,
}

/// Benchmark status document as written by the benchmark operator
#[derive(Deserialize)]
struct BenchmarkDocument {
    metadata: DocumentMetadata,
    status: DocumentStatus,
}

#[derive(Deserialize)]
struct DocumentMetadata {
    #[serde(rename = "creationTimestamp")]
    creation_timestamp: DateTime<Utc>,
}

#[derive(Deserialize)]
struct DocumentStatus {
    #[serde(default)]
    results: Vec<ScenarioResult>,
}

impl BenchmarkMetadata {
    /// Parse either the operator's status document or the flat form
    pub fn from_json(content: &str) -> Result<Self> {
        if let Ok(doc) = serde_json::from_str::<BenchmarkDocument>(content) {
            return Ok(Self {
                created_at: doc.metadata.creation_timestamp,
                results: doc.status.results,
            });
        }
        Ok(serde_json::from_str(content)?)
    }

    /// Scenario whose repetitions include `pod`
    pub fn scenario_of(&self, pod: &str) -> Option<&str> {
        self.results
            .iter()
            .find(|r| r.repetitions.iter().any(|rep| rep.pod == pod))
            .map(|r| r.scenario_id.as_str())
    }

    /// (scenario, pod) pairs in benchmark order
    pub fn pods(&self) -> impl Iterator<Item = (&str, &str)> {
        self.results.iter().flat_map(|r| {
            r.repetitions
                .iter()
                .map(move |rep| (r.scenario_id.as_str(), rep.pod.as_str()))
        })
    }
}

/// Sample counts of one query for one pod
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationItem {
    /// Empty for node-scope energy queries
    pub pod: String,
    pub scenario_id: String,
    pub query: String,
    pub count: usize,
    pub positive: usize,
    pub max: Option<f64>,
}

impl ValidationItem {
    fn from_values(pod: &str, scenario_id: &str, query: &str, values: &[f64]) -> Self {
        Self {
            pod: pod.to_string(),
            scenario_id: scenario_id.to_string(),
            query: query.to_string(),
            count: values.len(),
            positive: values.iter().filter(|v| **v > 0.0).count(),
            max: values.iter().copied().reduce(f64::max),
        }
    }
}

/// Availability of one usage query across pods
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageSummary {
    pub query: String,
    /// Share of pods with at least one positive sample
    pub availability: f64,
    pub valid_datapoints: usize,
}

/// Count usable samples per pod for every container query, plus every energy query
///
/// Without metadata every entity of a container query is reported with an
/// empty scenario.
pub fn validate(results: &QueryResults, metadata: Option<&BenchmarkMetadata>) -> Vec<ValidationItem> {
    let mut items = Vec::new();
    for query in results.queries().filter(|q| q.contains("container")) {
        let Some(series) = results.get(query) else {
            continue;
        };
        let mut by_pod: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for sample in series_values(series) {
            by_pod.entry(sample.entity).or_default().push(sample.value);
        }
        match metadata {
            Some(metadata) => {
                for (scenario, pod) in metadata.pods() {
                    let values = by_pod.get(pod).map(Vec::as_slice).unwrap_or_default();
                    items.push(ValidationItem::from_values(pod, scenario, query, values));
                }
            }
            None => {
                for (pod, values) in &by_pod {
                    items.push(ValidationItem::from_values(pod, "", query, values));
                }
            }
        }
    }
    for query in results.queries().filter(|q| q.contains("_joules")) {
        if let Some(series) = results.get(query) {
            let values: Vec<f64> = series_values(series).into_iter().map(|s| s.value).collect();
            items.push(ValidationItem::from_values("", "", query, &values));
        }
    }
    items
}

/// Per-query availability over the pod-level items; queries with no valid pod are omitted
pub fn summarize(items: &[ValidationItem]) -> Vec<UsageSummary> {
    let mut by_query: BTreeMap<&str, Vec<&ValidationItem>> = BTreeMap::new();
    for item in items.iter().filter(|i| !i.pod.is_empty()) {
        by_query.entry(item.query.as_str()).or_default().push(item);
    }
    by_query
        .into_iter()
        .filter_map(|(query, items)| {
            let valid: Vec<_> = items.iter().filter(|i| i.positive > 0).collect();
            if valid.is_empty() {
                return None;
            }
            Some(UsageSummary {
                query: query.to_string(),
                availability: valid.len() as f64 / items.len() as f64,
                valid_datapoints: valid.iter().map(|i| i.positive).sum(),
            })
        })
        .collect()
}
