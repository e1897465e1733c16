//! Core data models for the training pipeline

use crate::registry::{DEFAULT_NODE_TYPE, NODE_INFO_QUERY};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One observation of a query for one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Pod name, or node name for node-scope queries
    pub entity: String,
    /// Node hosting the entity
    pub node: String,
    /// Source series within the entity, e.g. one container of a pod
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub container: String,
    pub timestamp: i64,
    pub value: f64,
}

/// Time-indexed values of one query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSeries {
    pub query: String,
    pub samples: Vec<Sample>,
}

impl RawSeries {
    pub fn new(query: impl Into<String>, samples: Vec<Sample>) -> Self {
        Self {
            query: query.into(),
            samples,
        }
    }

    /// Cumulative counters are converted to rates before use
    pub fn is_counter(&self) -> bool {
        self.query.ends_with("_total")
    }
}

/// Query responses keyed by query name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, Vec<Sample>>", into = "BTreeMap<String, Vec<Sample>>")]
pub struct QueryResults {
    series: BTreeMap<String, RawSeries>,
}

impl QueryResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, series: RawSeries) {
        self.series.insert(series.query.clone(), series);
    }

    pub fn get(&self, query: &str) -> Option<&RawSeries> {
        self.series.get(query)
    }

    pub fn contains(&self, query: &str) -> bool {
        self.series.contains_key(query)
    }

    pub fn queries(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(|q| q.as_str())
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

impl From<BTreeMap<String, Vec<Sample>>> for QueryResults {
    fn from(map: BTreeMap<String, Vec<Sample>>) -> Self {
        let series = map
            .into_iter()
            .map(|(query, samples)| (query.clone(), RawSeries::new(query, samples)))
            .collect();
        Self { series }
    }
}

impl From<QueryResults> for BTreeMap<String, Vec<Sample>> {
    fn from(results: QueryResults) -> Self {
        results
            .series
            .into_iter()
            .map(|(query, series)| (query, series.samples))
            .collect()
    }
}

/// Node name to node type code
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeTypeAssignment {
    types: BTreeMap<String, u32>,
}

impl NodeTypeAssignment {
    pub fn new(types: BTreeMap<String, u32>) -> Self {
        Self { types }
    }

    /// Read node types from the node info query; the latest sample per node wins
    pub fn from_query_results(results: &QueryResults) -> Self {
        let mut latest: BTreeMap<String, (i64, u32)> = BTreeMap::new();
        if let Some(series) = results.get(NODE_INFO_QUERY) {
            for sample in &series.samples {
                if !sample.value.is_finite() || sample.value < 0.0 {
                    continue;
                }
                let entry = latest
                    .entry(sample.node.clone())
                    .or_insert((sample.timestamp, sample.value as u32));
                if sample.timestamp >= entry.0 {
                    *entry = (sample.timestamp, sample.value as u32);
                }
            }
        }
        Self {
            types: latest.into_iter().map(|(node, (_, t))| (node, t)).collect(),
        }
    }

    pub fn node_type(&self, node: &str) -> u32 {
        self.types.get(node).copied().unwrap_or(DEFAULT_NODE_TYPE)
    }
}

/// One training sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    pub timestamp: i64,
    /// Node name for node-scope rows, pod name for per-entity rows
    pub entity: String,
    pub node_type: u32,
    /// Values in the table's feature order
    pub features: Vec<f64>,
    /// Component label; an absent component is excluded from training
    pub labels: BTreeMap<String, f64>,
}

/// Feature/label table for one feature group and energy source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingTable {
    pub features: Vec<String>,
    pub components: Vec<String>,
    pub rows: Vec<TableRow>,
}

impl TrainingTable {
    pub fn new(features: Vec<String>, components: Vec<String>) -> Self {
        Self {
            features,
            components,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct node types, ascending
    pub fn node_types(&self) -> Vec<u32> {
        self.rows
            .iter()
            .map(|r| r.node_type)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Feature rows of one node type
    pub fn feature_matrix(&self, node_type: u32) -> Vec<Vec<f64>> {
        self.rows
            .iter()
            .filter(|r| r.node_type == node_type)
            .map(|r| r.features.clone())
            .collect()
    }

    /// Rows of one node type that carry a label for `component`
    pub fn training_set(&self, node_type: u32, component: &str) -> (Vec<Vec<f64>>, Vec<f64>) {
        self.rows
            .iter()
            .filter(|r| r.node_type == node_type)
            .filter_map(|r| r.labels.get(component).map(|y| (r.features.clone(), *y)))
            .unzip()
    }

    /// Label values of one component across all rows
    pub fn label_values<'a>(&'a self, component: &'a str) -> impl Iterator<Item = f64> + 'a {
        self.rows.iter().filter_map(move |r| r.labels.get(component).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(node: &str, timestamp: i64, value: f64) -> Sample {
        Sample {
            entity: node.to_string(),
            node: node.to_string(),
            container: String::new(),
            timestamp,
            value,
        }
    }

    fn row(node_type: u32, x: f64, label: Option<f64>) -> TableRow {
        TableRow {
            timestamp: 0,
            entity: "pod".to_string(),
            node_type,
            features: vec![x],
            labels: label
                .map(|y| BTreeMap::from([("package".to_string(), y)]))
                .unwrap_or_default(),
        }
    }

    #[test]
    fn test_node_type_assignment_defaults() {
        let mut results = QueryResults::new();
        results.insert(RawSeries::new(
            NODE_INFO_QUERY,
            vec![sample("node-a", 10, 2.0), sample("node-a", 20, 3.0)],
        ));
        let types = NodeTypeAssignment::from_query_results(&results);
        assert_eq!(types.node_type("node-a"), 3);
        assert_eq!(types.node_type("node-b"), DEFAULT_NODE_TYPE);
    }

    #[test]
    fn test_query_results_json_shape() {
        let mut results = QueryResults::new();
        results.insert(RawSeries::new("q", vec![sample("n", 1, 1.5)]));
        let json = serde_json::to_string(&results).unwrap();
        assert!(json.starts_with("{\"q\":["));
        let back: QueryResults = serde_json::from_str(&json).unwrap();
        assert_eq!(back, results);
        assert_eq!(back.get("q").unwrap().query, "q");
    }

    #[test]
    fn test_training_set_skips_unlabelled_rows() {
        let mut table = TrainingTable::new(vec!["x".to_string()], vec!["package".to_string()]);
        table.rows.push(row(1, 1.0, Some(10.0)));
        table.rows.push(row(1, 2.0, None));
        table.rows.push(row(2, 3.0, Some(30.0)));

        let (x, y) = table.training_set(1, "package");
        assert_eq!(x, vec![vec![1.0]]);
        assert_eq!(y, vec![10.0]);
        assert_eq!(table.node_types(), vec![1, 2]);
        assert_eq!(table.feature_matrix(1).len(), 2);
    }
}
