//! # Log Module Configuration
//!
//! `deployment.conf` for the log module, one `Key=value` per line:
//!
//! ```text
//! Tenant=abc12345
//! Server={https://abc12345.live.dynatrace.com:443,https://10.0.0.1:9999}
//! TenantToken=...
//! HostIdSource=k8s-node-name
//! ```
//!
//! The tenant data is the gateway's cached connection info when it is
//! available, otherwise it is requested from the backend.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use kube::ResourceExt;

use super::{config_secret_name, CONFIG_KEY};
use crate::conditions::{self, ConditionType};
use crate::controller::activegate::consts::{tenant_secret_name, TENANT_TOKEN_KEY};
use crate::controller::error::ReconcileError;
use crate::crd::{DynaKube, ValueSource};
use crate::dtclient::{ActiveGateConnectionInfo, DynatraceClient};
use crate::kubeobjects::{query, ClusterClient};

pub const HOST_ID_SOURCE: &str = "k8s-node-name";

pub fn render_config(dk: &DynaKube, tenant_uuid: &str, endpoints: &str, tenant_token: &str) -> String {
    let mut lines = vec![
        format!("Tenant={tenant_uuid}"),
        format!("Server={{{endpoints}}}"),
        format!("TenantToken={tenant_token}"),
        format!("HostIdSource={HOST_ID_SOURCE}"),
    ];
    if let Some(zone) = dk.spec.network_zone.as_deref().filter(|z| !z.is_empty()) {
        lines.push(format!("NetworkZone={zone}"));
    }
    lines.join("\n") + "\n"
}

pub struct ConfigSecretReconciler<'a, C> {
    client: &'a C,
    dtc: &'a dyn DynatraceClient,
}

impl<C> std::fmt::Debug for ConfigSecretReconciler<'_, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigSecretReconciler").finish_non_exhaustive()
    }
}

impl<'a, C: ClusterClient> ConfigSecretReconciler<'a, C> {
    pub fn new(client: &'a C, dtc: &'a dyn DynatraceClient) -> Self {
        Self { client, dtc }
    }

    pub async fn reconcile(&self, dk: &mut DynaKube) -> Result<(), ReconcileError> {
        let name = config_secret_name(&dk.name_any());
        match self.apply(dk, &name).await {
            Ok(()) => {
                conditions::set_secret_created(
                    &mut dk.status_mut().conditions,
                    ConditionType::LogModuleConfigSecret,
                    &name,
                );
                Ok(())
            }
            Err(err) if err.is_transient() => {
                conditions::set_outdated(
                    &mut dk.status_mut().conditions,
                    ConditionType::LogModuleConfigSecret,
                    &err.to_string(),
                );
                Err(err)
            }
            Err(err) => {
                conditions::set_kube_api_error(
                    &mut dk.status_mut().conditions,
                    ConditionType::LogModuleConfigSecret,
                    &err,
                );
                Err(err)
            }
        }
    }

    /// Cached gateway connection info, or a fresh backend request
    async fn connection_info(&self, dk: &DynaKube) -> Result<ActiveGateConnectionInfo, ReconcileError> {
        let cached = dk.current_status().active_gate.connection_info;
        if !cached.tenant_uuid.is_empty() {
            let tenant_secret: Option<Secret> = self
                .client
                .get(&dk.ns(), &tenant_secret_name(&dk.name_any()))
                .await?;
            if let Some(token) = tenant_secret
                .as_ref()
                .and_then(|secret| ValueSource::read_from(secret, TENANT_TOKEN_KEY))
            {
                return Ok(ActiveGateConnectionInfo {
                    tenant_uuid: cached.tenant_uuid,
                    tenant_token: token,
                    communication_endpoints: cached
                        .endpoints
                        .split(',')
                        .filter(|e| !e.is_empty())
                        .map(str::to_string)
                        .collect(),
                });
            }
        }
        let info = self.dtc.get_activegate_connection_info().await?;
        if info.tenant_uuid.is_empty() {
            return Err(ReconcileError::TenantUuidUnknown);
        }
        Ok(info)
    }

    async fn apply(&self, dk: &DynaKube, name: &str) -> Result<(), ReconcileError> {
        let info = self.connection_info(dk).await?;
        let config = render_config(dk, &info.tenant_uuid, &info.endpoints(), &info.tenant_token);
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(dk.ns()),
                ..ObjectMeta::default()
            },
            data: Some(BTreeMap::from([(
                CONFIG_KEY.to_string(),
                ByteString(config.into_bytes()),
            )])),
            ..Secret::default()
        };
        query::secrets(self.client)
            .with_owner(dk)
            .create_or_update(secret)
            .await?;
        Ok(())
    }
}
