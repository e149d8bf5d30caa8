//! # Scheduling Defaults
//!
//! Node affinity and topology spread constraints applied to every owned
//! workload unless the DynaKube overrides them.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    Affinity, NodeAffinity, NodeSelector, NodeSelectorRequirement, NodeSelectorTerm,
    TopologySpreadConstraint,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;

use crate::constants::{
    KUBERNETES_ARCH_LABEL, KUBERNETES_OS_LABEL, SUPPORTED_ARCHITECTURES, SUPPORTED_OS,
    TOPOLOGY_HOSTNAME_KEY, TOPOLOGY_ZONE_KEY,
};

/// Require a supported CPU architecture and Linux
pub fn multi_arch_node_affinity() -> Affinity {
    let requirement = |key: &str, values: &[&str]| NodeSelectorRequirement {
        key: key.to_string(),
        operator: "In".to_string(),
        values: Some(values.iter().map(ToString::to_string).collect()),
    };

    Affinity {
        node_affinity: Some(NodeAffinity {
            required_during_scheduling_ignored_during_execution: Some(NodeSelector {
                node_selector_terms: vec![NodeSelectorTerm {
                    match_expressions: Some(vec![
                        requirement(KUBERNETES_ARCH_LABEL, &SUPPORTED_ARCHITECTURES),
                        requirement(KUBERNETES_OS_LABEL, &SUPPORTED_OS),
                    ]),
                    match_fields: None,
                }],
            }),
            preferred_during_scheduling_ignored_during_execution: None,
        }),
        ..Affinity::default()
    }
}

fn spread(
    topology_key: &str,
    when_unsatisfiable: &str,
    match_labels: &BTreeMap<String, String>,
) -> TopologySpreadConstraint {
    TopologySpreadConstraint {
        max_skew: 1,
        topology_key: topology_key.to_string(),
        when_unsatisfiable: when_unsatisfiable.to_string(),
        label_selector: Some(LabelSelector {
            match_labels: Some(match_labels.clone()),
            match_expressions: None,
        }),
        ..TopologySpreadConstraint::default()
    }
}

/// Spread across zones where possible and never stack two pods on one node
pub fn default_topology_spread(
    match_labels: &BTreeMap<String, String>,
) -> Vec<TopologySpreadConstraint> {
    vec![
        spread(TOPOLOGY_ZONE_KEY, "ScheduleAnyway", match_labels),
        spread(TOPOLOGY_HOSTNAME_KEY, "DoNotSchedule", match_labels),
    ]
}

pub fn max_one_per_node(match_labels: &BTreeMap<String, String>) -> Vec<TopologySpreadConstraint> {
    vec![spread(TOPOLOGY_HOSTNAME_KEY, "DoNotSchedule", match_labels)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multi_arch_affinity() {
        let affinity = multi_arch_node_affinity();
        let terms = affinity
            .node_affinity
            .unwrap()
            .required_during_scheduling_ignored_during_execution
            .unwrap()
            .node_selector_terms;
        let expressions = terms[0].match_expressions.clone().unwrap();
        assert_eq!(expressions[0].key, "kubernetes.io/arch");
        assert_eq!(
            expressions[0].values.clone().unwrap(),
            vec!["amd64", "arm64", "ppc64le"]
        );
        assert_eq!(expressions[1].key, "kubernetes.io/os");
        assert_eq!(expressions[1].values.clone().unwrap(), vec!["linux"]);
    }

    #[test]
    fn test_default_topology_spread() {
        let labels = BTreeMap::from([("app".to_string(), "ag".to_string())]);
        let constraints = default_topology_spread(&labels);
        assert_eq!(constraints.len(), 2);
        assert_eq!(constraints[0].topology_key, "topology.kubernetes.io/zone");
        assert_eq!(constraints[0].when_unsatisfiable, "ScheduleAnyway");
        assert_eq!(constraints[1].topology_key, "kubernetes.io/hostname");
        assert_eq!(constraints[1].when_unsatisfiable, "DoNotSchedule");
        assert!(constraints.iter().all(|c| c.max_skew == 1));
    }
}
