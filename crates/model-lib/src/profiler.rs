//! Idle power profiling
//!
//! Derives the background power level of every (node type, component) pair
//! from an idle-only benchmark run.

use crate::models::{NodeTypeAssignment, QueryResults};
use crate::registry::{node_energy_query, POWER_SOURCE_MAP};
use crate::telemetry::series_values;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Background power statistics of one (node type, component) pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProfileEntry {
    /// Median idle power in watts, the level subtracted during isolation
    pub background_power: f64,
    pub min_power: f64,
    pub max_power: f64,
    pub samples: usize,
}

/// Background power keyed by node type, then component
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdleProfile {
    entries: BTreeMap<u32, BTreeMap<String, ProfileEntry>>,
}

impl IdleProfile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, node_type: u32, component: impl Into<String>, entry: ProfileEntry) {
        self.entries
            .entry(node_type)
            .or_default()
            .insert(component.into(), entry);
    }

    pub fn get(&self, node_type: u32, component: &str) -> Option<&ProfileEntry> {
        self.entries.get(&node_type).and_then(|c| c.get(component))
    }

    /// Background power to subtract, if profiled
    pub fn background_power(&self, node_type: u32, component: &str) -> Option<f64> {
        self.get(node_type, component).map(|e| e.background_power)
    }

    pub fn node_types(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Builds an [`IdleProfile`] from idle telemetry
#[derive(Debug, Clone, Default)]
pub struct Profiler;

impl Profiler {
    pub fn new() -> Self {
        Self
    }

    /// Profile every known energy component present in the idle run
    ///
    /// Components whose query is absent leave no entry; isolators that rely
    /// on the profile exclude those pairs.
    pub fn process(&self, idle: &QueryResults) -> IdleProfile {
        let node_types = NodeTypeAssignment::from_query_results(idle);
        let mut profile = IdleProfile::new();

        for (source, components) in POWER_SOURCE_MAP {
            for component in components.iter() {
                let Some(series) = idle.get(&node_energy_query(component)) else {
                    debug!(energy_source = source, component = component, "No idle data for component");
                    continue;
                };

                let mut by_node_type: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
                for sample in series_values(series) {
                    let node = if sample.node.is_empty() {
                        &sample.entity
                    } else {
                        &sample.node
                    };
                    by_node_type
                        .entry(node_types.node_type(node))
                        .or_default()
                        .push(sample.value);
                }

                if by_node_type.is_empty() {
                    warn!(component = component, "Idle series present but yielded no power samples");
                }
                for (node_type, values) in by_node_type {
                    if let Some(entry) = profile_entry(values) {
                        profile.insert(node_type, *component, entry);
                    }
                }
            }
        }
        profile
    }
}

fn profile_entry(mut values: Vec<f64>) -> Option<ProfileEntry> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = values.len();
    let median = if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    };
    Some(ProfileEntry {
        background_power: median,
        min_power: values[0],
        max_power: values[n - 1],
        samples: n,
    })
}
