use super::{clamp_labels, Isolation, IsolationContext, Isolator, IsolatorKind};
use crate::error::Result;
use crate::models::TrainingTable;

/// Keeps per-entity labels as measured
#[derive(Debug, Clone, Default)]
pub struct NoneIsolator;

impl NoneIsolator {
    pub fn new() -> Self {
        Self
    }
}

impl Isolator for NoneIsolator {
    fn kind(&self) -> IsolatorKind {
        IsolatorKind::None
    }

    fn isolate(&self, per_entity: &TrainingTable, _context: &IsolationContext) -> Result<Isolation> {
        Ok(clamp_labels(per_entity.clone()))
    }
}
