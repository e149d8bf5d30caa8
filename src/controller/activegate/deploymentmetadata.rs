//! # Deployment Metadata
//!
//! ConfigMap read by the gateway through `DT_DEPLOYMENT_METADATA`.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::ObjectMeta;
use kube::ResourceExt;

use super::consts::{deployment_metadata_name, DEPLOYMENT_METADATA_KEY};
use crate::constants::OPERATOR_VERSION;
use crate::controller::error::ReconcileError;
use crate::crd::DynaKube;
use crate::kubeobjects::{query, ClusterClient};

/// `orchestration_tech=Operator-<type>;script_version=<version>;orchestrator_id=<uuid>`
pub fn format_metadata(deployment_type: &str, kube_system_uuid: &str) -> String {
    format!(
        "orchestration_tech=Operator-{deployment_type};script_version={OPERATOR_VERSION};orchestrator_id={kube_system_uuid}"
    )
}

pub struct DeploymentMetadataReconciler<'a, C> {
    client: &'a C,
    deployment_type: &'a str,
}

impl<C> std::fmt::Debug for DeploymentMetadataReconciler<'_, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeploymentMetadataReconciler")
            .field("deployment_type", &self.deployment_type)
            .finish_non_exhaustive()
    }
}

impl<'a, C: ClusterClient> DeploymentMetadataReconciler<'a, C> {
    pub fn new(client: &'a C, deployment_type: &'a str) -> Self {
        Self {
            client,
            deployment_type,
        }
    }

    pub async fn reconcile(&self, dk: &DynaKube) -> Result<(), ReconcileError> {
        let kube_system_uuid = dk.current_status().kube_system_uuid;
        let config_map = ConfigMap {
            metadata: ObjectMeta {
                name: Some(deployment_metadata_name(&dk.name_any())),
                namespace: Some(dk.ns()),
                ..ObjectMeta::default()
            },
            data: Some(BTreeMap::from([(
                DEPLOYMENT_METADATA_KEY.to_string(),
                format_metadata(self.deployment_type, &kube_system_uuid),
            )])),
            ..ConfigMap::default()
        };
        query::config_maps(self.client)
            .with_owner(dk)
            .create_or_update(config_map)
            .await?;
        Ok(())
    }
}
