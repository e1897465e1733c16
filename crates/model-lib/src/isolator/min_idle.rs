use super::{clamp_labels, Isolation, IsolationContext, Isolator, IsolatorKind};
use crate::error::Result;
use crate::models::TrainingTable;
use std::collections::BTreeMap;

/// Subtracts the minimum label seen per (node type, component) in the input window
#[derive(Debug, Clone, Default)]
pub struct MinIdleIsolator;

impl MinIdleIsolator {
    pub fn new() -> Self {
        Self
    }

    fn minimums(table: &TrainingTable) -> BTreeMap<(u32, String), f64> {
        let mut minimums: BTreeMap<(u32, String), f64> = BTreeMap::new();
        for row in &table.rows {
            for (component, value) in &row.labels {
                minimums
                    .entry((row.node_type, component.clone()))
                    .and_modify(|m| *m = m.min(*value))
                    .or_insert(*value);
            }
        }
        minimums
    }
}

impl Isolator for MinIdleIsolator {
    fn kind(&self) -> IsolatorKind {
        IsolatorKind::Min
    }

    fn isolate(&self, per_entity: &TrainingTable, _context: &IsolationContext) -> Result<Isolation> {
        let minimums = Self::minimums(per_entity);
        let mut table = per_entity.clone();
        for row in &mut table.rows {
            for (component, value) in row.labels.iter_mut() {
                if let Some(min) = minimums.get(&(row.node_type, component.clone())) {
                    *value -= min;
                }
            }
        }
        Ok(clamp_labels(table))
    }
}
