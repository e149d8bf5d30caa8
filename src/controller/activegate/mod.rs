//! # ActiveGate
//!
//! Reconciles the gateway of a DynaKube.
//!
//! ## Order
//!
//! 1. connection info (tenant Secret and ConfigMap)
//! 2. auth token Secret
//! 3. proxy Secret
//! 4. custom properties Secret
//! 5. deployment metadata ConfigMap
//! 6. version check; a downgrade leaves the StatefulSet untouched
//! 7. Service, recording its cluster IPs
//! 8. StatefulSet
//!
//! Every Secret is in place before the StatefulSet that mounts it. When the
//! DynaKube no longer requests a gateway, everything above is deleted and the
//! gateway conditions are removed.

pub mod authtoken;
pub mod capability;
pub mod connectioninfo;
pub mod consts;
pub mod customproperties;
pub mod deploymentmetadata;
pub mod proxy;
pub mod service;
pub mod statefulset;

use kube::ResourceExt;
use tracing::{info, warn};

use self::authtoken::AuthTokenReconciler;
use self::capability::MultiCapability;
use self::connectioninfo::ConnectionInfoReconciler;
use self::consts::{
    auth_token_secret_name, connection_info_config_map_name, custom_properties_secret_name,
    deployment_metadata_name, proxy_secret_name, service_name, statefulset_name,
    tenant_secret_name, ACTIVEGATE_NAME,
};
use self::customproperties::CustomPropertiesReconciler;
use self::deploymentmetadata::DeploymentMetadataReconciler;
use self::proxy::ProxyReconciler;
use self::service::ServiceReconciler;
use self::statefulset::StatefulSetReconciler;
use crate::conditions::{self, ConditionType};
use crate::controller::context::Context;
use crate::controller::error::ReconcileError;
use crate::crd::{ActiveGateStatus, DynaKube};
use crate::kubeobjects::{query, ClientError, ClusterClient};
use crate::version::{self, Version};

pub struct ActiveGateReconciler<'a, C> {
    ctx: Context<'a, C>,
}

impl<C> std::fmt::Debug for ActiveGateReconciler<'_, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveGateReconciler")
            .field("ctx", &self.ctx)
            .finish()
    }
}

impl<'a, C: ClusterClient> ActiveGateReconciler<'a, C> {
    pub fn new(ctx: Context<'a, C>) -> Self {
        Self { ctx }
    }

    pub async fn reconcile(&self, dk: &mut DynaKube) -> Result<(), ReconcileError> {
        let capability = MultiCapability::new(dk);
        if !capability.enabled() {
            return self.cleanup(dk).await;
        }

        let client = self.ctx.client;
        ConnectionInfoReconciler::new(client, self.ctx.dtc, self.ctx.config.api_request_threshold())
            .reconcile(dk)
            .await?;
        AuthTokenReconciler::new(client, self.ctx.dtc)
            .reconcile(dk)
            .await?;
        ProxyReconciler::new(client).reconcile(dk).await?;
        CustomPropertiesReconciler::new(
            client,
            ACTIVEGATE_NAME,
            capability.properties().custom_properties.as_ref(),
        )
        .reconcile(dk)
        .await?;
        DeploymentMetadataReconciler::new(client, &self.ctx.config.deployment_type)
            .reconcile(dk)
            .await?;
        let version_accepted = check_version(dk, &capability);
        ServiceReconciler::new(client, &capability)
            .reconcile(dk)
            .await?;
        if !version_accepted {
            return Ok(());
        }

        StatefulSetReconciler::new(client, &capability)
            .reconcile(dk)
            .await
    }

    async fn cleanup(&self, dk: &mut DynaKube) -> Result<(), ReconcileError> {
        if !conditions::any_present(&dk.current_status().conditions, &ConditionType::ACTIVEGATE) {
            return Ok(());
        }
        info!(dynakube = %dk.name_any(), "gateway no longer requested, removing it");

        let client = self.ctx.client;
        let ns = dk.ns();
        let name = dk.name_any();
        let mut errors: Vec<ClientError> = Vec::new();

        let results = [
            query::statefulsets(client).delete(&ns, &statefulset_name(&name)).await,
            query::services(client).delete(&ns, &service_name(&name)).await,
            query::secrets(client).delete(&ns, &auth_token_secret_name(&name)).await,
            query::secrets(client).delete(&ns, &tenant_secret_name(&name)).await,
            query::secrets(client).delete(&ns, &proxy_secret_name(&name)).await,
            query::secrets(client)
                .delete(&ns, &custom_properties_secret_name(&name, ACTIVEGATE_NAME))
                .await,
            query::config_maps(client)
                .delete(&ns, &connection_info_config_map_name(&name))
                .await,
            query::config_maps(client)
                .delete(&ns, &deployment_metadata_name(&name))
                .await,
        ];
        errors.extend(results.into_iter().filter_map(Result::err));

        if let Some(err) = ClientError::aggregate(errors) {
            return Err(err.into());
        }

        let status = dk.status_mut();
        for condition_type in ConditionType::ACTIVEGATE {
            conditions::remove_by_type(&mut status.conditions, condition_type);
        }
        status.active_gate = ActiveGateStatus::default();
        Ok(())
    }
}

fn gateway_image(dk: &DynaKube, capability: &MultiCapability) -> Option<String> {
    capability
        .properties()
        .image
        .clone()
        .filter(|image| !image.is_empty())
        .or_else(|| dk.default_image(ACTIVEGATE_NAME))
}

/// Advance `status.activeGate.version`; false when the image would downgrade
fn check_version(dk: &mut DynaKube, capability: &MultiCapability) -> bool {
    let Some(next) = gateway_image(dk, capability).as_deref().and_then(version::from_image) else {
        return true;
    };
    let current = dk.current_status().active_gate.version;
    if let Ok(current) = current.parse::<Version>() {
        if current.is_downgrade_to(&next) {
            warn!(%current, %next, "refusing gateway downgrade");
            conditions::set_outdated(
                &mut dk.status_mut().conditions,
                ConditionType::ActiveGateVersion,
                &format!("downgrade from {current} to {next} refused"),
            );
            return false;
        }
    }

    let status = dk.status_mut();
    status.active_gate.version = next.to_string();
    conditions::remove_by_type(&mut status.conditions, ConditionType::ActiveGateVersion);
    true
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::apps::v1::StatefulSet;
    use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service};

    use super::*;
    use crate::config::ControllerConfig;
    use crate::conditions::find_by_type;
    use crate::kubeobjects::MemoryCluster;
    use crate::test_support::{cluster, dynakube_with_activegate, FakeDynatraceClient, KUBE_SYSTEM_UID};

    async fn run(cluster: &MemoryCluster, dtc: &FakeDynatraceClient, dk: &mut DynaKube) -> Result<(), ReconcileError> {
        let config = ControllerConfig::default();
        ActiveGateReconciler::new(Context::new(cluster, dtc, &config))
            .reconcile(dk)
            .await
    }

    fn ready(capabilities: &[&str]) -> DynaKube {
        let mut dk = dynakube_with_activegate(capabilities);
        dk.status_mut().kube_system_uuid = KUBE_SYSTEM_UID.to_string();
        dk
    }

    #[tokio::test]
    async fn test_full_pass_creates_everything() {
        let cluster = cluster();
        let dtc = FakeDynatraceClient::default();
        let mut dk = ready(&["routing"]);
        run(&cluster, &dtc, &mut dk).await.unwrap();

        assert!(cluster.snapshot::<StatefulSet>("dynatrace", "dk-activegate").is_some());
        assert!(cluster.snapshot::<Service>("dynatrace", "dk-activegate").is_some());
        assert!(cluster.snapshot::<Secret>("dynatrace", "dk-activegate-auth-token").is_some());
        assert!(cluster.snapshot::<ConfigMap>("dynatrace", "dk-deployment-metadata").is_some());
        for condition_type in [
            ConditionType::ActiveGateStatefulSet,
            ConditionType::ActiveGateAuthTokenSecret,
            ConditionType::ActiveGateService,
            ConditionType::ActiveGateConnectionInfo,
        ] {
            assert!(find_by_type(&dk.current_status().conditions, condition_type).is_some());
        }
    }

    #[tokio::test]
    async fn test_disabled_gateway_is_cleaned_up() {
        let cluster = cluster();
        let dtc = FakeDynatraceClient::default();
        let mut dk = ready(&["routing"]);
        run(&cluster, &dtc, &mut dk).await.unwrap();

        dk.spec.active_gate = None;
        run(&cluster, &dtc, &mut dk).await.unwrap();
        assert!(cluster.snapshot::<StatefulSet>("dynatrace", "dk-activegate").is_none());
        assert!(cluster.snapshot::<Service>("dynatrace", "dk-activegate").is_none());
        for secret in ["dk-activegate-auth-token", "dk-activegate-tenant-secret"] {
            assert!(cluster.snapshot::<Secret>("dynatrace", secret).is_none(), "{secret}");
        }
        for config_map in ["dk-activegate-connection-info", "dk-deployment-metadata"] {
            assert!(cluster.snapshot::<ConfigMap>("dynatrace", config_map).is_none(), "{config_map}");
        }
        assert_eq!(dk.current_status().active_gate, ActiveGateStatus::default());
        assert!(!conditions::any_present(
            &dk.current_status().conditions,
            &ConditionType::ACTIVEGATE
        ));

        cluster.clear_operations();
        run(&cluster, &dtc, &mut dk).await.unwrap();
        assert!(cluster.object_writes().is_empty());
    }

    #[tokio::test]
    async fn test_downgrade_is_refused() {
        let cluster = cluster();
        let dtc = FakeDynatraceClient::default();
        let mut dk = ready(&["routing"]);
        dk.spec
            .active_gate
            .as_mut()
            .unwrap()
            .capability_properties
            .image = Some("registry/activegate:1.203.1.20210908-220956".to_string());
        run(&cluster, &dtc, &mut dk).await.unwrap();
        assert_eq!(dk.current_status().active_gate.version, "1.203.1.20210908-220956");
        let before: StatefulSet = cluster.snapshot("dynatrace", "dk-activegate").unwrap();

        dk.spec
            .active_gate
            .as_mut()
            .unwrap()
            .capability_properties
            .image = Some("registry/activegate:1.203.0.20200908-220956".to_string());
        run(&cluster, &dtc, &mut dk).await.unwrap();

        let after: StatefulSet = cluster.snapshot("dynatrace", "dk-activegate").unwrap();
        assert_eq!(before, after);
        let condition = find_by_type(&dk.current_status().conditions, ConditionType::ActiveGateVersion)
            .unwrap()
            .clone();
        assert_eq!(condition.reason.as_deref(), Some("Outdated"));
    }
}
