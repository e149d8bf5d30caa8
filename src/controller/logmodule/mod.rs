//! # Log Module
//!
//! Node-level log collection: a configuration Secret and a DaemonSet that
//! mounts it. Removed again once the DynaKube drops `logMonitoring`.

pub mod configsecret;
pub mod daemonset;

use kube::ResourceExt;
use tracing::info;

use self::configsecret::ConfigSecretReconciler;
use self::daemonset::DaemonSetReconciler;
use crate::conditions::{self, ConditionType};
use crate::controller::error::ReconcileError;
use crate::crd::DynaKube;
use crate::dtclient::DynatraceClient;
use crate::kubeobjects::{query, ClientError, ClusterClient};

pub const CONTAINER_NAME: &str = "main";
pub const IMAGE_NAME: &str = "dynatrace-logmodule";
pub const CONFIG_KEY: &str = "deployment.conf";

pub fn daemonset_name(dynakube: &str) -> String {
    format!("{dynakube}-logmodule")
}

pub fn config_secret_name(dynakube: &str) -> String {
    format!("{dynakube}-logmodule-config")
}

pub struct LogModuleReconciler<'a, C> {
    client: &'a C,
    dtc: &'a dyn DynatraceClient,
}

impl<C> std::fmt::Debug for LogModuleReconciler<'_, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogModuleReconciler").finish_non_exhaustive()
    }
}

impl<'a, C: ClusterClient> LogModuleReconciler<'a, C> {
    pub fn new(client: &'a C, dtc: &'a dyn DynatraceClient) -> Self {
        Self { client, dtc }
    }

    pub async fn reconcile(&self, dk: &mut DynaKube) -> Result<(), ReconcileError> {
        if !dk.log_module_enabled() {
            return self.cleanup(dk).await;
        }
        ConfigSecretReconciler::new(self.client, self.dtc)
            .reconcile(dk)
            .await?;
        DaemonSetReconciler::new(self.client).reconcile(dk).await
    }

    async fn cleanup(&self, dk: &mut DynaKube) -> Result<(), ReconcileError> {
        if !conditions::any_present(&dk.current_status().conditions, &ConditionType::LOG_MODULE) {
            return Ok(());
        }
        info!(dynakube = %dk.name_any(), "log monitoring disabled, removing log module");

        let ns = dk.ns();
        let name = dk.name_any();
        let results = [
            query::daemonsets(self.client)
                .delete(&ns, &daemonset_name(&name))
                .await,
            query::secrets(self.client)
                .delete(&ns, &config_secret_name(&name))
                .await,
        ];
        let errors: Vec<ClientError> = results.into_iter().filter_map(Result::err).collect();
        if let Some(err) = ClientError::aggregate(errors) {
            return Err(err.into());
        }

        let status = dk.status_mut();
        for condition_type in ConditionType::LOG_MODULE {
            conditions::remove_by_type(&mut status.conditions, condition_type);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::apps::v1::DaemonSet;
    use k8s_openapi::api::core::v1::Secret;

    use super::*;
    use crate::crd::LogMonitoringSpec;
    use crate::test_support::{cluster, dynakube, FakeDynatraceClient, KUBE_SYSTEM_UID};

    #[tokio::test]
    async fn test_enable_then_disable() {
        let cluster = cluster();
        let dtc = FakeDynatraceClient::default();
        let mut dk = dynakube();
        dk.spec.log_monitoring = Some(LogMonitoringSpec {});
        dk.status_mut().kube_system_uuid = KUBE_SYSTEM_UID.to_string();

        let reconciler = LogModuleReconciler::new(&cluster, &dtc);
        reconciler.reconcile(&mut dk).await.unwrap();
        assert!(cluster.snapshot::<DaemonSet>("dynatrace", "dk-logmodule").is_some());
        assert!(cluster.snapshot::<Secret>("dynatrace", "dk-logmodule-config").is_some());

        dk.spec.log_monitoring = None;
        reconciler.reconcile(&mut dk).await.unwrap();
        assert!(cluster.snapshot::<DaemonSet>("dynatrace", "dk-logmodule").is_none());
        assert!(cluster.snapshot::<Secret>("dynatrace", "dk-logmodule-config").is_none());
        assert!(!conditions::any_present(
            &dk.current_status().conditions,
            &ConditionType::LOG_MODULE
        ));
    }

    #[tokio::test]
    async fn test_disabled_without_conditions_is_noop() {
        let cluster = cluster();
        let dtc = FakeDynatraceClient::default();
        let mut dk = dynakube();
        LogModuleReconciler::new(&cluster, &dtc)
            .reconcile(&mut dk)
            .await
            .unwrap();
        assert!(cluster.operations().is_empty());
    }
}
