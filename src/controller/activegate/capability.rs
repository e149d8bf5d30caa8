//! # Capabilities
//!
//! Maps the capability names declared on the DynaKube to the gateway
//! behaviour they switch on. Unknown names are dropped; argument names keep
//! the declared order.

use crate::crd::{CapabilityProperties, DynaKube};

use super::consts::ACTIVEGATE_NAME;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Routing,
    KubernetesMonitoring,
    MetricsIngest,
    DynatraceApi,
}

impl Capability {
    pub const ALL: [Capability; 4] = [
        Capability::Routing,
        Capability::KubernetesMonitoring,
        Capability::MetricsIngest,
        Capability::DynatraceApi,
    ];

    pub fn display_name(self) -> &'static str {
        match self {
            Capability::Routing => "routing",
            Capability::KubernetesMonitoring => "kubernetes-monitoring",
            Capability::MetricsIngest => "metrics-ingest",
            Capability::DynatraceApi => "dynatrace-api",
        }
    }

    /// Token passed to the gateway in `DT_CAPABILITIES`
    pub fn arg_name(self) -> &'static str {
        match self {
            Capability::Routing => "MSGrouter",
            Capability::KubernetesMonitoring => "kubernetes_monitoring",
            Capability::MetricsIngest => "metrics_ingest",
            Capability::DynatraceApi => "restInterface",
        }
    }

    /// Accepts display names and their camel-case aliases
    pub fn from_name(name: &str) -> Option<Capability> {
        match name {
            "routing" => Some(Capability::Routing),
            "kubernetes-monitoring" | "kubeMon" => Some(Capability::KubernetesMonitoring),
            "metrics-ingest" | "metricsIngest" => Some(Capability::MetricsIngest),
            "dynatrace-api" | "dtApi" => Some(Capability::DynatraceApi),
            _ => None,
        }
    }
}

/// All recognized capabilities of one DynaKube, served by one StatefulSet
#[derive(Debug, Clone)]
pub struct MultiCapability {
    capabilities: Vec<Capability>,
    properties: CapabilityProperties,
}

impl MultiCapability {
    pub fn new(dk: &DynaKube) -> Self {
        let Some(active_gate) = dk.spec.active_gate.as_ref() else {
            return Self {
                capabilities: Vec::new(),
                properties: CapabilityProperties::default(),
            };
        };

        let mut capabilities = Vec::new();
        for capability in active_gate
            .capabilities
            .iter()
            .filter_map(|name| Capability::from_name(name))
        {
            if !capabilities.contains(&capability) {
                capabilities.push(capability);
            }
        }

        Self {
            capabilities,
            properties: active_gate.capability_properties.clone(),
        }
    }

    pub fn enabled(&self) -> bool {
        !self.capabilities.is_empty()
    }

    pub fn short_name(&self) -> &'static str {
        ACTIVEGATE_NAME
    }

    /// Comma separated argument names in declared order
    pub fn arg_name(&self) -> String {
        self.capabilities
            .iter()
            .map(|c| c.arg_name())
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    pub fn properties(&self) -> &CapabilityProperties {
        &self.properties
    }

    /// Whether the gateway serves traffic through its Service
    pub fn serves_traffic(&self) -> bool {
        self.has(Capability::Routing)
            || self.has(Capability::MetricsIngest)
            || self.has(Capability::DynatraceApi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::ActiveGateSpec;

    fn dynakube(capabilities: &[&str]) -> DynaKube {
        let mut dk = DynaKube::new("dk", serde_json::from_value(serde_json::json!({
            "apiUrl": "https://tenant.live.dynatrace.com/api"
        })).unwrap());
        dk.spec.active_gate = Some(ActiveGateSpec {
            capabilities: capabilities.iter().map(ToString::to_string).collect(),
            ..ActiveGateSpec::default()
        });
        dk
    }

    #[test]
    fn test_arg_name_keeps_declared_order() {
        let capability = MultiCapability::new(&dynakube(&["metricsIngest", "routing"]));
        assert_eq!(capability.arg_name(), "metrics_ingest,MSGrouter");
        assert!(capability.enabled());
        assert_eq!(capability.short_name(), "activegate");
    }

    #[test]
    fn test_unknown_capabilities_are_dropped() {
        let capability = MultiCapability::new(&dynakube(&["routing", "statsd-ingest", "bogus"]));
        assert_eq!(capability.arg_name(), "MSGrouter");
        let none = MultiCapability::new(&dynakube(&["bogus"]));
        assert!(!none.enabled());
        assert_eq!(none.arg_name(), "");
    }

    #[test]
    fn test_aliases_and_duplicates() {
        let capability = MultiCapability::new(&dynakube(&[
            "kubeMon",
            "kubernetes-monitoring",
            "dtApi",
        ]));
        assert_eq!(capability.arg_name(), "kubernetes_monitoring,restInterface");
        assert!(capability.serves_traffic());
        assert!(!MultiCapability::new(&dynakube(&["kubeMon"])).serves_traffic());
    }

    #[test]
    fn test_no_activegate_section() {
        let mut dk = dynakube(&[]);
        dk.spec.active_gate = None;
        let capability = MultiCapability::new(&dk);
        assert!(!capability.enabled());
        assert_eq!(capability.properties().replicas, 1);
    }

    #[test]
    fn test_display_names_round_trip() {
        for capability in Capability::ALL {
            assert_eq!(Capability::from_name(capability.display_name()), Some(capability));
        }
    }
}
