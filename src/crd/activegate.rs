//! # ActiveGate Spec
//!
//! Capability list plus the properties shared by all capabilities.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    Affinity, EnvVar, ResourceRequirements, Toleration, TopologySpreadConstraint,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::spec::{default_replicas, default_true, ValueSource};

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActiveGateSpec {
    /// Ordered capability names; unknown names are ignored
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(flatten)]
    pub capability_properties: CapabilityProperties,
    /// Annotations added to the gateway pods
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    /// Secret with `server.p12`, `password` and `server.crt` for the gateway endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_secret_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_policy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_class_name: Option<String>,
    /// Run the gateway with a read-only root filesystem
    #[serde(default = "default_true")]
    pub read_only_filesystem: bool,
    /// Annotate pods with the runtime/default AppArmor profile
    #[serde(default)]
    pub use_app_armor: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_properties: Option<ValueSource>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// ActiveGate group reported to the backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tolerations: Vec<Toleration>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub topology_spread_constraints: Vec<TopologySpreadConstraint>,
    /// Replaces the default multi-arch node affinity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Affinity>,
    #[serde(default = "default_replicas")]
    pub replicas: i32,
}

impl Default for CapabilityProperties {
    fn default() -> Self {
        Self {
            custom_properties: None,
            node_selector: BTreeMap::new(),
            labels: BTreeMap::new(),
            image: None,
            group: None,
            resources: None,
            tolerations: Vec::new(),
            env: Vec::new(),
            topology_spread_constraints: Vec::new(),
            affinity: None,
            replicas: default_replicas(),
        }
    }
}
