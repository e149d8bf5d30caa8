//! # DynaKube Status
//!
//! Status types written back by the operator.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Status of the DynaKube resource
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DynaKubeStatus {
    /// Conditions, at most one per subsystem
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Overall phase (Running, Deploying, Error)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    /// UID of the kube-system namespace
    #[serde(default, rename = "kubeSystemUUID", skip_serializing_if = "String::is_empty")]
    pub kube_system_uuid: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kubernetes_cluster_name: String,
    #[serde(default, rename = "kubernetesClusterMEID", skip_serializing_if = "String::is_empty")]
    pub kubernetes_cluster_meid: String,
    #[serde(default)]
    pub active_gate: ActiveGateStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActiveGateStatus {
    #[serde(default)]
    pub connection_info: ConnectionInfoStatus,
    /// Cluster IPs of the gateway Service
    #[serde(default, rename = "serviceIPs")]
    pub service_ips: Vec<String>,
    /// Version of the deployed gateway image
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfoStatus {
    #[serde(default, rename = "tenantUUID", skip_serializing_if = "String::is_empty")]
    pub tenant_uuid: String,
    /// Comma separated communication endpoints
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub endpoints: String,
    /// RFC 3339 time of the last backend request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_request: Option<String>,
}

/// Condition represents a status condition for the resource
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    pub r#type: String,
    /// Status of condition (True, False, Unknown)
    pub status: String,
    /// Last transition time
    #[serde(default)]
    pub last_transition_time: Option<String>,
    /// Reason for condition
    #[serde(default)]
    pub reason: Option<String>,
    /// Message describing condition
    #[serde(default)]
    pub message: Option<String>,
}
