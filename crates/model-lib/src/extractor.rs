//! Feature and label extraction
//!
//! Aligns workload feature series with energy series on a common
//! (entity, timestamp) index and produces the node-scope `abs` table and
//! the per-entity table the isolator consumes. Samples missing any feature
//! of the group are dropped, never imputed.

use crate::error::Result;
use crate::models::{NodeTypeAssignment, QueryResults, Sample, TableRow, TrainingTable};
use crate::registry::{
    container_energy_query, energy_components, feature_query, node_energy_query, FeatureGroup,
};
use crate::telemetry::series_values;
use std::collections::BTreeMap;
use tracing::debug;

/// Output of one extraction
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    /// One row per (node, timestamp)
    pub abs: TrainingTable,
    /// One row per (entity, timestamp)
    pub per_entity: TrainingTable,
    /// Required queries absent from the input
    pub missing: Vec<String>,
}

impl Extraction {
    pub fn success(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Summed feature values of an entity at one timestamp
struct EntityPoint {
    node: String,
    values: Vec<Option<f64>>,
}

/// Builds aligned training tables from query results
#[derive(Debug, Clone, Default)]
pub struct Extractor;

impl Extractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract tables for one feature group and energy source
    ///
    /// A missing query is not an error: the returned extraction reports it
    /// in `missing` with empty tables so the caller can move on to the next
    /// feature group. An unknown energy source is a configuration error.
    pub fn extract(
        &self,
        results: &QueryResults,
        feature_group: FeatureGroup,
        energy_source: &str,
        components: &[String],
    ) -> Result<Extraction> {
        energy_components(energy_source)?;

        let features: Vec<String> = feature_group
            .features()
            .into_iter()
            .map(str::to_string)
            .collect();
        let mut extraction = Extraction {
            abs: TrainingTable::new(features.clone(), components.to_vec()),
            per_entity: TrainingTable::new(features.clone(), components.to_vec()),
            missing: Vec::new(),
        };

        extraction.missing = feature_group
            .queries()
            .into_iter()
            .filter(|q| !results.contains(q))
            .collect();
        let power_queries: Vec<String> = components.iter().map(|c| node_energy_query(c)).collect();
        if !power_queries.iter().any(|q| results.contains(q)) {
            extraction.missing.extend(power_queries);
        }
        if !extraction.missing.is_empty() {
            debug!(
                feature_group = %feature_group,
                missing = ?extraction.missing,
                "Feature group unavailable for this input"
            );
            return Ok(extraction);
        }

        let points = self.entity_points(results, &features);
        let node_power = self.node_power(results, components);
        let node_types = NodeTypeAssignment::from_query_results(results);

        extraction.abs.rows = self.abs_rows(&points, &node_power, &node_types, components, features.len());
        extraction.per_entity.rows =
            self.per_entity_rows(results, &points, &node_power, &node_types, components);

        debug!(
            feature_group = %feature_group,
            energy_source = %energy_source,
            abs_rows = extraction.abs.len(),
            per_entity_rows = extraction.per_entity.len(),
            "Extraction complete"
        );
        Ok(extraction)
    }

    /// Entity feature values keyed by (entity, timestamp), complete rows only
    fn entity_points(
        &self,
        results: &QueryResults,
        features: &[String],
    ) -> BTreeMap<(String, i64), EntityPoint> {
        let mut points: BTreeMap<(String, i64), EntityPoint> = BTreeMap::new();
        for (idx, feature) in features.iter().enumerate() {
            let Some(series) = results.get(&feature_query(feature)) else {
                continue;
            };
            for sample in series_values(series) {
                let point = points
                    .entry((sample.entity.clone(), sample.timestamp))
                    .or_insert_with(|| EntityPoint {
                        node: node_of(&sample).to_string(),
                        values: vec![None; features.len()],
                    });
                let slot = &mut point.values[idx];
                *slot = Some(slot.unwrap_or(0.0) + sample.value);
            }
        }
        points.retain(|_, p| p.values.iter().all(Option::is_some));
        points
    }

    /// Node power per component keyed by (node, timestamp)
    fn node_power(
        &self,
        results: &QueryResults,
        components: &[String],
    ) -> BTreeMap<String, BTreeMap<(String, i64), f64>> {
        components
            .iter()
            .map(|component| {
                let values = results
                    .get(&node_energy_query(component))
                    .map(|series| index_by(series_values(series), |s| node_of(s).to_string()))
                    .unwrap_or_default();
                (component.clone(), values)
            })
            .collect()
    }

    fn abs_rows(
        &self,
        points: &BTreeMap<(String, i64), EntityPoint>,
        node_power: &BTreeMap<String, BTreeMap<(String, i64), f64>>,
        node_types: &NodeTypeAssignment,
        components: &[String],
        width: usize,
    ) -> Vec<TableRow> {
        let mut aggregated: BTreeMap<(String, i64), Vec<f64>> = BTreeMap::new();
        for ((_, ts), point) in points {
            let sums = aggregated
                .entry((point.node.clone(), *ts))
                .or_insert_with(|| vec![0.0; width]);
            for (sum, value) in sums.iter_mut().zip(&point.values) {
                *sum += value.unwrap_or(0.0);
            }
        }

        aggregated
            .into_iter()
            .filter_map(|((node, ts), features)| {
                let key = (node.clone(), ts);
                let labels = label_map(components, |c| {
                    node_power.get(c).and_then(|p| p.get(&key)).copied()
                });
                (!labels.is_empty()).then(|| TableRow {
                    timestamp: ts,
                    node_type: node_types.node_type(&node),
                    entity: node,
                    features,
                    labels,
                })
            })
            .collect()
    }

    /// Container energy is used where exported, otherwise the hosting node's power
    fn per_entity_rows(
        &self,
        results: &QueryResults,
        points: &BTreeMap<(String, i64), EntityPoint>,
        node_power: &BTreeMap<String, BTreeMap<(String, i64), f64>>,
        node_types: &NodeTypeAssignment,
        components: &[String],
    ) -> Vec<TableRow> {
        let container_power: BTreeMap<String, BTreeMap<(String, i64), f64>> = components
            .iter()
            .filter_map(|c| {
                results.get(&container_energy_query(c)).map(|series| {
                    (c.clone(), index_by(series_values(series), |s| s.entity.clone()))
                })
            })
            .collect();

        points
            .iter()
            .filter_map(|((entity, ts), point)| {
                let labels = label_map(components, |c| match container_power.get(c) {
                    Some(per_entity) => per_entity.get(&(entity.clone(), *ts)).copied(),
                    None => node_power
                        .get(c)
                        .and_then(|p| p.get(&(point.node.clone(), *ts)))
                        .copied(),
                });
                (!labels.is_empty()).then(|| TableRow {
                    timestamp: *ts,
                    entity: entity.clone(),
                    node_type: node_types.node_type(&point.node),
                    features: point.values.iter().map(|v| v.unwrap_or(0.0)).collect(),
                    labels,
                })
            })
            .collect()
    }
}

fn node_of(sample: &Sample) -> &str {
    if sample.node.is_empty() {
        &sample.entity
    } else {
        &sample.node
    }
}

fn index_by<F>(samples: Vec<Sample>, key: F) -> BTreeMap<(String, i64), f64>
where
    F: Fn(&Sample) -> String,
{
    let mut index = BTreeMap::new();
    for sample in samples {
        *index.entry((key(&sample), sample.timestamp)).or_insert(0.0) += sample.value;
    }
    index
}

fn label_map<F>(components: &[String], lookup: F) -> BTreeMap<String, f64>
where
    F: Fn(&str) -> Option<f64>,
{
    components
        .iter()
        .filter_map(|c| lookup(c.as_str()).map(|v| (c.clone(), v)))
        .collect()
}
