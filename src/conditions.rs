//! # Conditions
//!
//! Typed status conditions, one per subsystem. Callers only use the
//! `set_*` wrappers, which fix reason and message format.

use std::fmt;

use chrono::Utc;

use crate::crd::Condition;
use crate::kubeobjects::time::format_rfc3339;

/// Closed set of condition types written by the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionType {
    ActiveGateStatefulSet,
    ActiveGateAuthTokenSecret,
    ActiveGateService,
    ActiveGateConnectionInfo,
    ActiveGateVersion,
    ExtensionsTokenSecret,
    ExtensionsTlsSecret,
    ExtensionsService,
    ExtensionsControllerStatefulSet,
    LogModuleDaemonSet,
    LogModuleConfigSecret,
}

impl ConditionType {
    pub const ACTIVEGATE: [ConditionType; 5] = [
        ConditionType::ActiveGateStatefulSet,
        ConditionType::ActiveGateAuthTokenSecret,
        ConditionType::ActiveGateService,
        ConditionType::ActiveGateConnectionInfo,
        ConditionType::ActiveGateVersion,
    ];

    pub const EXTENSIONS: [ConditionType; 4] = [
        ConditionType::ExtensionsTokenSecret,
        ConditionType::ExtensionsTlsSecret,
        ConditionType::ExtensionsService,
        ConditionType::ExtensionsControllerStatefulSet,
    ];

    pub const LOG_MODULE: [ConditionType; 2] = [
        ConditionType::LogModuleDaemonSet,
        ConditionType::LogModuleConfigSecret,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ConditionType::ActiveGateStatefulSet => "ActiveGateStatefulSet",
            ConditionType::ActiveGateAuthTokenSecret => "ActiveGateAuthTokenSecret",
            ConditionType::ActiveGateService => "ActiveGateService",
            ConditionType::ActiveGateConnectionInfo => "ActiveGateConnectionInfo",
            ConditionType::ActiveGateVersion => "ActiveGateVersion",
            ConditionType::ExtensionsTokenSecret => "ExtensionsTokenSecret",
            ConditionType::ExtensionsTlsSecret => "ExtensionsTLSSecret",
            ConditionType::ExtensionsService => "ExtensionsService",
            ConditionType::ExtensionsControllerStatefulSet => "ExtensionsControllerStatefulSet",
            ConditionType::LogModuleDaemonSet => "LogModuleDaemonSet",
            ConditionType::LogModuleConfigSecret => "LogModuleConfigSecret",
        }
    }
}

impl fmt::Display for ConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    StatefulSetCreated,
    DaemonSetCreated,
    ServiceCreated,
    SecretCreated,
    KubeApiError,
    SecretGenFailed,
    SecretReferenceFailed,
    Outdated,
}

impl Reason {
    pub fn as_str(self) -> &'static str {
        match self {
            Reason::StatefulSetCreated => "StatefulSetCreated",
            Reason::DaemonSetCreated => "DaemonSetCreated",
            Reason::ServiceCreated => "ServiceCreated",
            Reason::SecretCreated => "SecretCreated",
            Reason::KubeApiError => "KubeApiError",
            Reason::SecretGenFailed => "SecretGenFailed",
            Reason::SecretReferenceFailed => "SecretReferenceFailed",
            Reason::Outdated => "Outdated",
        }
    }
}

fn status_str(status: bool) -> &'static str {
    if status {
        "True"
    } else {
        "False"
    }
}

/// Insert or replace the condition of `condition_type`. The transition
/// time only moves when status, reason or message change.
pub fn set(
    conditions: &mut Vec<Condition>,
    condition_type: ConditionType,
    status: bool,
    reason: Reason,
    message: impl Into<String>,
) {
    let mut condition = Condition {
        r#type: condition_type.as_str().to_string(),
        status: status_str(status).to_string(),
        last_transition_time: Some(format_rfc3339(Utc::now())),
        reason: Some(reason.as_str().to_string()),
        message: Some(message.into()),
    };

    match conditions
        .iter_mut()
        .find(|c| c.r#type == condition.r#type)
    {
        Some(existing) => {
            let unchanged = existing.status == condition.status
                && existing.reason == condition.reason
                && existing.message == condition.message;
            if unchanged {
                condition
                    .last_transition_time
                    .clone_from(&existing.last_transition_time);
            }
            *existing = condition;
        }
        None => conditions.push(condition),
    }
}

pub fn find_by_type(conditions: &[Condition], condition_type: ConditionType) -> Option<&Condition> {
    conditions
        .iter()
        .find(|c| c.r#type == condition_type.as_str())
}

pub fn remove_by_type(conditions: &mut Vec<Condition>, condition_type: ConditionType) {
    conditions.retain(|c| c.r#type != condition_type.as_str());
}

/// Whether any of the given condition types is present
pub fn any_present(conditions: &[Condition], types: &[ConditionType]) -> bool {
    types.iter().any(|t| find_by_type(conditions, *t).is_some())
}

pub fn set_kube_api_error(
    conditions: &mut Vec<Condition>,
    condition_type: ConditionType,
    err: &dyn fmt::Display,
) {
    set(
        conditions,
        condition_type,
        false,
        Reason::KubeApiError,
        format!("A problem occurred when using the Kubernetes API: {err}"),
    );
}

pub fn set_secret_created(conditions: &mut Vec<Condition>, condition_type: ConditionType, name: &str) {
    set(conditions, condition_type, true, Reason::SecretCreated, format!("{name} created"));
}

pub fn set_statefulset_created(
    conditions: &mut Vec<Condition>,
    condition_type: ConditionType,
    name: &str,
) {
    set(conditions, condition_type, true, Reason::StatefulSetCreated, format!("{name} created"));
}

pub fn set_service_created(conditions: &mut Vec<Condition>, condition_type: ConditionType, name: &str) {
    set(conditions, condition_type, true, Reason::ServiceCreated, format!("{name} created"));
}

pub fn set_daemonset_created(
    conditions: &mut Vec<Condition>,
    condition_type: ConditionType,
    name: &str,
) {
    set(conditions, condition_type, true, Reason::DaemonSetCreated, format!("{name} created"));
}

pub fn set_secret_gen_failed(
    conditions: &mut Vec<Condition>,
    condition_type: ConditionType,
    err: &dyn fmt::Display,
) {
    set(
        conditions,
        condition_type,
        false,
        Reason::SecretGenFailed,
        format!("Failed to generate secret: {err}"),
    );
}

pub fn set_secret_reference_failed(
    conditions: &mut Vec<Condition>,
    condition_type: ConditionType,
    err: &dyn fmt::Display,
) {
    set(
        conditions,
        condition_type,
        false,
        Reason::SecretReferenceFailed,
        format!("Referenced secret could not be read: {err}"),
    );
}

pub fn set_outdated(conditions: &mut Vec<Condition>, condition_type: ConditionType, message: &str) {
    set(conditions, condition_type, false, Reason::Outdated, message);
}
