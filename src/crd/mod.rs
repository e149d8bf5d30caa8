//! # Custom Resource Definitions
//!
//! The `DynaKube` custom resource and its helper accessors.
//!
//! ## Module Structure
//!
//! - `spec.rs` - Top-level spec, value sources, feature toggles
//! - `activegate.rs` - ActiveGate section (capabilities and their properties)
//! - `templates.rs` - Extensions controller and log module templates
//! - `status.rs` - Status, conditions and connection info

mod activegate;
mod spec;
mod status;
mod templates;

pub use activegate::{ActiveGateSpec, CapabilityProperties};
pub use spec::{
    default_replicas, default_true, DynaKube, DynaKubeSpec, ExtensionsSpec, LogMonitoringSpec,
    ValueSource,
};
pub use status::{ActiveGateStatus, Condition, ConnectionInfoStatus, DynaKubeStatus};
pub use templates::{ExtensionExecutionControllerSpec, ImageRefSpec, LogModuleSpec, TemplatesSpec};

use kube::ResourceExt;

impl DynaKube {
    /// Namespace of the resource, empty when unset
    pub fn ns(&self) -> String {
        self.namespace().unwrap_or_default()
    }

    /// Status, falling back to an empty one
    pub fn current_status(&self) -> DynaKubeStatus {
        self.status.clone().unwrap_or_default()
    }

    /// Mutable status, created on first access
    pub fn status_mut(&mut self) -> &mut DynaKubeStatus {
        self.status.get_or_insert_with(DynaKubeStatus::default)
    }

    /// Host part of `spec.apiUrl`
    pub fn api_url_host(&self) -> Option<String> {
        reqwest::Url::parse(&self.spec.api_url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
    }

    /// Secret holding the API token
    pub fn tokens_secret_name(&self) -> String {
        match self.spec.tokens.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => self.name_any(),
        }
    }

    /// Image pull secret referenced by every owned pod
    pub fn pull_secret_name(&self) -> String {
        match self.spec.custom_pull_secret.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("{}-pull-secret", self.name_any()),
        }
    }

    pub fn has_proxy(&self) -> bool {
        self.spec.proxy.as_ref().is_some_and(ValueSource::is_set)
    }

    /// Name of the ConfigMap with trusted CA certificates, if any
    pub fn trusted_cas(&self) -> Option<&str> {
        self.spec.trusted_cas.as_deref().filter(|name| !name.is_empty())
    }

    /// Name of the user-supplied ActiveGate TLS Secret, if any
    pub fn activegate_tls_secret_name(&self) -> Option<&str> {
        self.spec
            .active_gate
            .as_ref()
            .and_then(|ag| ag.tls_secret_name.as_deref())
            .filter(|name| !name.is_empty())
    }

    pub fn extensions_enabled(&self) -> bool {
        self.spec.extensions.is_some()
    }

    pub fn log_module_enabled(&self) -> bool {
        self.spec.log_monitoring.is_some()
    }

    /// Extensions controller template, falling back to defaults
    pub fn extension_execution_controller(&self) -> ExtensionExecutionControllerSpec {
        self.spec
            .templates
            .extension_execution_controller
            .clone()
            .unwrap_or_default()
    }

    /// Log module template, falling back to defaults
    pub fn log_module(&self) -> LogModuleSpec {
        self.spec.templates.log_module.clone().unwrap_or_default()
    }

    /// Default image for a component served from the tenant registry
    pub fn default_image(&self, component: &str) -> Option<String> {
        self.api_url_host()
            .map(|host| format!("{host}/linux/{component}:latest"))
    }
}
