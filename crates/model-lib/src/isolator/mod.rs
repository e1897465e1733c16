//! Background power isolation
//!
//! An isolator turns the per-entity table into the dyn table by removing
//! background power from each label. Whatever the variant, isolated labels
//! are clamped at zero and the number of clamped values is reported.

mod min_idle;
mod none;
mod profile;
mod train;


pub use min_idle::MinIdleIsolator;
pub use none::NoneIsolator;
pub use profile::ProfileBackgroundIsolator;
pub use train::TrainIsolator;

use crate::error::{PowerModelError, Result};
use crate::models::{QueryResults, TrainingTable};
use crate::profiler::Profiler;
use crate::registry::FeatureGroup;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Feature group and energy source the table was extracted for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsolationContext {
    pub feature_group: FeatureGroup,
    pub energy_source: String,
}

/// Dyn table plus the number of labels clamped to zero
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Isolation {
    pub table: TrainingTable,
    pub clamped: usize,
}

/// Separates workload power from background power
pub trait Isolator: Send + Sync {
    fn kind(&self) -> IsolatorKind;

    fn isolate(&self, per_entity: &TrainingTable, context: &IsolationContext) -> Result<Isolation>;
}

/// Isolator selection key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IsolatorKind {
    #[default]
    None,
    Min,
    Profile,
    Trainer,
}

impl IsolatorKind {
    pub const ALL: [IsolatorKind; 4] = [
        IsolatorKind::None,
        IsolatorKind::Min,
        IsolatorKind::Profile,
        IsolatorKind::Trainer,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            IsolatorKind::None => "none",
            IsolatorKind::Min => "min",
            IsolatorKind::Profile => "profile",
            IsolatorKind::Trainer => "trainer",
        }
    }

    pub fn requires_idle_data(&self) -> bool {
        matches!(self, IsolatorKind::Profile | IsolatorKind::Trainer)
    }

    /// Construct the isolator, failing fast when idle telemetry is required but absent
    pub fn build(&self, idle: Option<&QueryResults>, min_samples: usize) -> Result<Box<dyn Isolator>> {
        let idle = match (self.requires_idle_data(), idle) {
            (true, None) => {
                return Err(PowerModelError::MissingIdleData {
                    isolator: self.name().to_string(),
                })
            }
            (_, idle) => idle,
        };
        let isolator: Box<dyn Isolator> = match (self, idle) {
            (IsolatorKind::Profile, Some(idle)) => {
                Box::new(ProfileBackgroundIsolator::new(Profiler::new().process(idle)))
            }
            (IsolatorKind::Trainer, Some(idle)) => {
                Box::new(TrainIsolator::new(idle.clone(), min_samples))
            }
            (IsolatorKind::Min, _) => Box::new(MinIdleIsolator::new()),
            _ => Box::new(NoneIsolator::new()),
        };
        Ok(isolator)
    }
}

impl fmt::Display for IsolatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for IsolatorKind {
    type Err = PowerModelError;

    fn from_str(s: &str) -> Result<Self> {
        IsolatorKind::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| PowerModelError::UnknownIsolator {
                name: s.to_string(),
                supported: IsolatorKind::ALL.iter().map(|k| k.name().to_string()).collect(),
            })
    }
}

/// Clamp every label of `table` at zero
pub(crate) fn clamp_labels(mut table: TrainingTable) -> Isolation {
    let mut clamped = 0;
    for row in &mut table.rows {
        for value in row.labels.values_mut() {
            if *value < 0.0 {
                *value = 0.0;
                clamped += 1;
            }
        }
    }
    Isolation { table, clamped }
}
