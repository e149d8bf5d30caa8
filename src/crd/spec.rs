//! # DynaKube Spec
//!
//! Top-level CRD specification and default values.

use k8s_openapi::api::core::v1::Secret;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{ActiveGateSpec, TemplatesSpec};

/// DynaKube Custom Resource Definition
///
/// Describes the monitoring components the operator deploys for one tenant.
///
/// # Example
///
/// ```yaml
/// apiVersion: dynatrace.com/v1beta3
/// kind: DynaKube
/// metadata:
///   name: dk
///   namespace: dynatrace
/// spec:
///   apiUrl: https://abc12345.live.dynatrace.com/api
///   activeGate:
///     capabilities:
///       - routing
///       - kubernetes-monitoring
/// ```
#[derive(kube::CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "DynaKube",
    group = "dynatrace.com",
    version = "v1beta3",
    namespaced,
    status = "crate::crd::DynaKubeStatus",
    shortname = "dk",
    printcolumn = r#"{"name":"ApiUrl", "type":"string", "jsonPath":".spec.apiUrl"}, {"name":"Status", "type":"string", "jsonPath":".status.phase"}, {"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct DynaKubeSpec {
    /// Tenant API endpoint, e.g. `https://<tenant>.live.dynatrace.com/api`
    pub api_url: String,
    /// Name of the Secret holding the API token (defaults to the DynaKube name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<String>,
    /// Network zone the components connect through
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_zone: Option<String>,
    /// Proxy URL for backend communication
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ValueSource>,
    /// ConfigMap holding additional trusted CA certificates under key `certs`
    #[serde(default, rename = "trustedCAs", skip_serializing_if = "Option::is_none")]
    pub trusted_cas: Option<String>,
    /// Image pull secret override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_pull_secret: Option<String>,
    /// ActiveGate section; absent means no gateway
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_gate: Option<ActiveGateSpec>,
    /// Extensions toggle; presence enables the extensions controller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<ExtensionsSpec>,
    /// Log monitoring toggle; presence enables the log module
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_monitoring: Option<LogMonitoringSpec>,
    /// Per-component templates
    #[serde(default)]
    pub templates: TemplatesSpec,
}

/// Inline value or a reference to a Secret holding it
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValueSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Name of a Secret in the DynaKube namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_from: Option<String>,
}

impl ValueSource {
    pub fn inline(&self) -> Option<&str> {
        self.value.as_deref().filter(|v| !v.is_empty())
    }

    pub fn secret_ref(&self) -> Option<&str> {
        self.value_from.as_deref().filter(|v| !v.is_empty())
    }

    pub fn is_set(&self) -> bool {
        self.inline().is_some() || self.secret_ref().is_some()
    }

    /// Resolve the referenced Secret entry
    pub fn read_from(secret: &Secret, key: &str) -> Option<String> {
        secret
            .data
            .as_ref()
            .and_then(|data| data.get(key))
            .map(|bytes| String::from_utf8_lossy(&bytes.0).into_owned())
    }
}

#[allow(clippy::empty_structs_with_brackets, reason = "serialized as an empty object")]
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
pub struct ExtensionsSpec {}

#[allow(clippy::empty_structs_with_brackets, reason = "serialized as an empty object")]
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
pub struct LogMonitoringSpec {}

pub fn default_true() -> bool {
    true
}

pub fn default_replicas() -> i32 {
    1
}
