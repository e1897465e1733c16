use super::{clamp_labels, Isolation, IsolationContext, Isolator, IsolatorKind};
use crate::error::Result;
use crate::models::TrainingTable;
use crate::profiler::IdleProfile;
use tracing::debug;

/// Subtracts the profiled idle power of the matching (node type, component)
///
/// Pairs without a profile entry lose their label rather than being zero
/// filled, so they are left out of training.
#[derive(Debug, Clone)]
pub struct ProfileBackgroundIsolator {
    profile: IdleProfile,
}

impl ProfileBackgroundIsolator {
    pub fn new(profile: IdleProfile) -> Self {
        Self { profile }
    }
}

impl Isolator for ProfileBackgroundIsolator {
    fn kind(&self) -> IsolatorKind {
        IsolatorKind::Profile
    }

    fn isolate(&self, per_entity: &TrainingTable, _context: &IsolationContext) -> Result<Isolation> {
        let mut table = per_entity.clone();
        let mut excluded = 0usize;
        for row in &mut table.rows {
            let node_type = row.node_type;
            row.labels.retain(|component, value| {
                match self.profile.background_power(node_type, component) {
                    Some(background) => {
                        *value -= background;
                        true
                    }
                    None => {
                        excluded += 1;
                        false
                    }
                }
            });
        }
        if excluded > 0 {
            debug!(excluded = excluded, "Labels without an idle profile entry excluded");
        }
        Ok(clamp_labels(table))
    }
}
