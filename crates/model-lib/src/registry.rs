//! Static vocabularies: feature groups, energy sources and query names

use crate::error::{PowerModelError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Prefix shared by every exporter query
pub const METRIC_PREFIX: &str = "kepler_";

/// Query carrying the node type code of each node
pub const NODE_INFO_QUERY: &str = "kepler_node_node_info";

/// Node type used when a node has no info sample
pub const DEFAULT_NODE_TYPE: u32 = 1;

pub const COUNTER_FEATURES: &[&str] = &["cpu_cycles", "cpu_instructions", "cache_miss"];
pub const CGROUP_FEATURES: &[&str] = &[
    "cgroupfs_cpu_usage_us",
    "cgroupfs_memory_usage_bytes",
    "cgroupfs_system_cpu_usage_us",
    "cgroupfs_user_cpu_usage_us",
];
pub const BPF_FEATURES: &[&str] = &["bpf_cpu_time_us"];
pub const IRQ_FEATURES: &[&str] = &["bpf_block_irq", "bpf_net_rx_irq", "bpf_net_tx_irq"];
pub const KUBELET_FEATURES: &[&str] = &["kubelet_cpu_usage", "kubelet_memory_bytes"];

/// Energy sources and their ordered components
pub const POWER_SOURCE_MAP: &[(&str, &[&str])] = &[
    ("rapl", &["package", "core", "uncore", "dram"]),
    ("acpi", &["platform"]),
];

/// Named, ordered set of feature columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FeatureGroup {
    Full,
    WorkloadOnly,
    CounterOnly,
    CgroupOnly,
    #[serde(rename = "BPFOnly")]
    BpfOnly,
    KubeletOnly,
    #[serde(rename = "IRQOnly")]
    IrqOnly,
    #[serde(rename = "CounterIRQCombined")]
    CounterIrqCombined,
    Basic,
}

impl FeatureGroup {
    pub const ALL: [FeatureGroup; 9] = [
        FeatureGroup::Full,
        FeatureGroup::WorkloadOnly,
        FeatureGroup::CounterOnly,
        FeatureGroup::CgroupOnly,
        FeatureGroup::BpfOnly,
        FeatureGroup::KubeletOnly,
        FeatureGroup::IrqOnly,
        FeatureGroup::CounterIrqCombined,
        FeatureGroup::Basic,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FeatureGroup::Full => "Full",
            FeatureGroup::WorkloadOnly => "WorkloadOnly",
            FeatureGroup::CounterOnly => "CounterOnly",
            FeatureGroup::CgroupOnly => "CgroupOnly",
            FeatureGroup::BpfOnly => "BPFOnly",
            FeatureGroup::KubeletOnly => "KubeletOnly",
            FeatureGroup::IrqOnly => "IRQOnly",
            FeatureGroup::CounterIrqCombined => "CounterIRQCombined",
            FeatureGroup::Basic => "Basic",
        }
    }

    /// Feature columns in model input order
    pub fn features(&self) -> Vec<&'static str> {
        let parts: &[&[&str]] = match self {
            FeatureGroup::Full => &[
                COUNTER_FEATURES,
                CGROUP_FEATURES,
                BPF_FEATURES,
                IRQ_FEATURES,
                KUBELET_FEATURES,
            ],
            FeatureGroup::WorkloadOnly => &[
                COUNTER_FEATURES,
                CGROUP_FEATURES,
                BPF_FEATURES,
                KUBELET_FEATURES,
            ],
            FeatureGroup::CounterOnly => &[COUNTER_FEATURES],
            FeatureGroup::CgroupOnly => &[CGROUP_FEATURES],
            FeatureGroup::BpfOnly => &[BPF_FEATURES],
            FeatureGroup::KubeletOnly => &[KUBELET_FEATURES],
            FeatureGroup::IrqOnly => &[IRQ_FEATURES],
            FeatureGroup::CounterIrqCombined => &[COUNTER_FEATURES, IRQ_FEATURES],
            FeatureGroup::Basic => &[&["cpu_cycles", "bpf_cpu_time_us"]],
        };
        parts.iter().flat_map(|p| p.iter().copied()).collect()
    }

    /// Queries the group needs, in feature order
    pub fn queries(&self) -> Vec<String> {
        self.features().into_iter().map(feature_query).collect()
    }
}

impl fmt::Display for FeatureGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FeatureGroup {
    type Err = PowerModelError;

    fn from_str(s: &str) -> Result<Self> {
        FeatureGroup::ALL
            .iter()
            .find(|g| g.name() == s)
            .copied()
            .ok_or_else(|| PowerModelError::UnknownFeatureGroup {
                name: s.to_string(),
                supported: FeatureGroup::ALL.iter().map(|g| g.name().to_string()).collect(),
            })
    }
}

/// Target of a trained model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelOutputType {
    /// Node-level absolute power
    AbsPower,
    /// Container-level isolated power
    DynPower,
}

impl ModelOutputType {
    pub fn for_node_level(node_level: bool) -> Self {
        if node_level {
            ModelOutputType::AbsPower
        } else {
            ModelOutputType::DynPower
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ModelOutputType::AbsPower => "AbsPower",
            ModelOutputType::DynPower => "DynPower",
        }
    }
}

impl fmt::Display for ModelOutputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Query name for a workload feature
pub fn feature_query(feature: &str) -> String {
    format!("{}container_{}_total", METRIC_PREFIX, feature)
}

/// Node-scope energy counter for a component
pub fn node_energy_query(component: &str) -> String {
    format!("{}node_{}_joules_total", METRIC_PREFIX, component)
}

/// Container-scope energy counter for a component
pub fn container_energy_query(component: &str) -> String {
    format!("{}container_{}_joules_total", METRIC_PREFIX, component)
}

/// Components of an energy source, or a configuration error naming the valid sources
pub fn energy_components(energy_source: &str) -> Result<Vec<String>> {
    POWER_SOURCE_MAP
        .iter()
        .find(|(source, _)| *source == energy_source)
        .map(|(_, components)| components.iter().map(|c| c.to_string()).collect())
        .ok_or_else(|| PowerModelError::UnknownEnergySource {
            name: energy_source.to_string(),
            supported: POWER_SOURCE_MAP.iter().map(|(s, _)| s.to_string()).collect(),
        })
}

/// Feature groups whose every query is present in `queries`
pub fn valid_feature_groups<'a, I>(queries: I) -> Vec<FeatureGroup>
where
    I: IntoIterator<Item = &'a str>,
{
    let available: std::collections::HashSet<&str> = queries.into_iter().collect();
    FeatureGroup::ALL
        .iter()
        .filter(|group| group.queries().iter().all(|q| available.contains(q.as_str())))
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_group_round_trip_name() {
        for group in FeatureGroup::ALL {
            assert_eq!(group.name().parse::<FeatureGroup>().unwrap(), group);
        }
        assert!("Nope".parse::<FeatureGroup>().is_err());
    }

    #[test]
    fn test_full_contains_every_feature() {
        let full = FeatureGroup::Full.features();
        for group in FeatureGroup::ALL {
            for feature in group.features() {
                assert!(full.contains(&feature), "{} missing from Full", feature);
            }
        }
    }

    #[test]
    fn test_energy_components() {
        assert_eq!(
            energy_components("rapl").unwrap(),
            vec!["package", "core", "uncore", "dram"]
        );
        assert_eq!(energy_components("acpi").unwrap(), vec!["platform"]);

        let err = energy_components("gpu").unwrap_err();
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("rapl"));
    }

    #[test]
    fn test_query_names() {
        assert_eq!(
            feature_query("bpf_cpu_time_us"),
            "kepler_container_bpf_cpu_time_us_total"
        );
        assert_eq!(node_energy_query("package"), "kepler_node_package_joules_total");
        assert_eq!(
            container_energy_query("dram"),
            "kepler_container_dram_joules_total"
        );
    }

    #[test]
    fn test_valid_feature_groups() {
        let queries = FeatureGroup::CgroupOnly.queries();
        let groups = valid_feature_groups(queries.iter().map(|q| q.as_str()));
        assert_eq!(groups, vec![FeatureGroup::CgroupOnly]);

        let mut queries = FeatureGroup::Basic.queries();
        queries.extend(FeatureGroup::CounterOnly.queries());
        let groups = valid_feature_groups(queries.iter().map(|q| q.as_str()));
        assert!(groups.contains(&FeatureGroup::Basic));
        assert!(groups.contains(&FeatureGroup::CounterOnly));
        assert!(groups.contains(&FeatureGroup::BpfOnly));
        assert!(!groups.contains(&FeatureGroup::Full));
    }
}
