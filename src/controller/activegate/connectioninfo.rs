//! # Connection Info
//!
//! Tenant UUID, tenant token and communication endpoints of the gateway.
//! They are cached in the DynaKube status, in the tenant Secret and in the
//! connection-info ConfigMap, and fetched again only once the last request
//! is older than the API request threshold.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use kube::ResourceExt;
use tracing::{debug, info};

use super::consts::{
    connection_info_config_map_name, tenant_secret_name, COMMUNICATION_ENDPOINTS_KEY,
    TENANT_TOKEN_KEY, TENANT_UUID_KEY,
};
use crate::conditions::{self, ConditionType};
use crate::controller::error::ReconcileError;
use crate::crd::{ConnectionInfoStatus, DynaKube};
use crate::dtclient::{ActiveGateConnectionInfo, DynatraceClient};
use crate::kubeobjects::time::{format_rfc3339, parse_rfc3339};
use crate::kubeobjects::{query, ClusterClient};

pub struct ConnectionInfoReconciler<'a, C> {
    client: &'a C,
    dtc: &'a dyn DynatraceClient,
    threshold: chrono::Duration,
}

impl<C> std::fmt::Debug for ConnectionInfoReconciler<'_, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionInfoReconciler")
            .field("threshold", &self.threshold)
            .finish_non_exhaustive()
    }
}

/// Whether the cached info was fetched less than `threshold` ago
pub fn is_fresh(status: &ConnectionInfoStatus, threshold: chrono::Duration, now: DateTime<Utc>) -> bool {
    status
        .last_request
        .as_deref()
        .and_then(parse_rfc3339)
        .is_some_and(|last| last + threshold > now)
}

impl<'a, C: ClusterClient> ConnectionInfoReconciler<'a, C> {
    pub fn new(client: &'a C, dtc: &'a dyn DynatraceClient, threshold: chrono::Duration) -> Self {
        Self {
            client,
            dtc,
            threshold,
        }
    }

    pub async fn reconcile(&self, dk: &mut DynaKube) -> Result<(), ReconcileError> {
        match self.refresh(dk).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_transient() => {
                conditions::set_outdated(
                    &mut dk.status_mut().conditions,
                    ConditionType::ActiveGateConnectionInfo,
                    &err.to_string(),
                );
                Err(err)
            }
            Err(err) => {
                conditions::set_kube_api_error(
                    &mut dk.status_mut().conditions,
                    ConditionType::ActiveGateConnectionInfo,
                    &err,
                );
                Err(err)
            }
        }
    }

    async fn refresh(&self, dk: &mut DynaKube) -> Result<(), ReconcileError> {
        let now = Utc::now();
        let secret_name = tenant_secret_name(&dk.name_any());
        let secret: Option<Secret> = self.client.get(&dk.ns(), &secret_name).await?;
        let cached = dk.current_status().active_gate.connection_info;
        if secret.is_some() && !cached.tenant_uuid.is_empty() && is_fresh(&cached, self.threshold, now) {
            debug!("connection info is fresh, skipping backend request");
            return Ok(());
        }

        let info = self.dtc.get_activegate_connection_info().await?;
        if info.tenant_uuid.is_empty() {
            return Err(ReconcileError::TenantUuidUnknown);
        }

        query::secrets(self.client)
            .with_owner(&*dk)
            .create_or_update(build_tenant_secret(dk, &secret_name, &info))
            .await?;
        query::config_maps(self.client)
            .with_owner(&*dk)
            .create_or_update(build_config_map(dk, &info))
            .await?;

        info!(tenant = %info.tenant_uuid, "connection info updated");
        dk.status_mut().active_gate.connection_info = ConnectionInfoStatus {
            tenant_uuid: info.tenant_uuid.clone(),
            endpoints: info.endpoints(),
            last_request: Some(format_rfc3339(now)),
        };
        conditions::set_secret_created(
            &mut dk.status_mut().conditions,
            ConditionType::ActiveGateConnectionInfo,
            &secret_name,
        );
        Ok(())
    }
}

fn build_tenant_secret(dk: &DynaKube, name: &str, info: &ActiveGateConnectionInfo) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(dk.ns()),
            ..ObjectMeta::default()
        },
        data: Some(BTreeMap::from([(
            TENANT_TOKEN_KEY.to_string(),
            ByteString(info.tenant_token.as_bytes().to_vec()),
        )])),
        ..Secret::default()
    }
}

fn build_config_map(dk: &DynaKube, info: &ActiveGateConnectionInfo) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(connection_info_config_map_name(&dk.name_any())),
            namespace: Some(dk.ns()),
            ..ObjectMeta::default()
        },
        data: Some(BTreeMap::from([
            (TENANT_UUID_KEY.to_string(), info.tenant_uuid.clone()),
            (COMMUNICATION_ENDPOINTS_KEY.to_string(), info.endpoints()),
        ])),
        ..ConfigMap::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::ValueSource;
    use crate::test_support::{cluster, dynakube_with_activegate, FakeDynatraceClient};

    fn threshold() -> chrono::Duration {
        chrono::Duration::minutes(15)
    }

    #[tokio::test]
    async fn test_fetches_and_stores() {
        let cluster = cluster();
        let dtc = FakeDynatraceClient::default();
        let mut dk = dynakube_with_activegate(&["routing"]);
        ConnectionInfoReconciler::new(&cluster, &dtc, threshold())
            .reconcile(&mut dk)
            .await
            .unwrap();

        let status = dk.current_status().active_gate.connection_info;
        assert_eq!(status.tenant_uuid, "abc12345");
        assert!(status.last_request.is_some());

        let secret: Secret = cluster
            .snapshot("dynatrace", "dk-activegate-tenant-secret")
            .unwrap();
        assert_eq!(
            ValueSource::read_from(&secret, TENANT_TOKEN_KEY).as_deref(),
            Some("tenant-token")
        );
        let config_map: ConfigMap = cluster
            .snapshot("dynatrace", "dk-activegate-connection-info")
            .unwrap();
        let data = config_map.data.unwrap();
        assert_eq!(data[TENANT_UUID_KEY], "abc12345");
        assert_eq!(
            data[COMMUNICATION_ENDPOINTS_KEY],
            "https://abc12345.live.dynatrace.com:443,https://10.0.0.1:9999"
        );
    }

    #[tokio::test]
    async fn test_fresh_info_skips_backend() {
        let cluster = cluster();
        let dtc = FakeDynatraceClient::default();
        let mut dk = dynakube_with_activegate(&["routing"]);
        let reconciler = ConnectionInfoReconciler::new(&cluster, &dtc, threshold());
        reconciler.reconcile(&mut dk).await.unwrap();
        reconciler.reconcile(&mut dk).await.unwrap();
        assert_eq!(dtc.connection_info_requests(), 1);
    }

    #[tokio::test]
    async fn test_stale_info_is_refetched() {
        let cluster = cluster();
        let dtc = FakeDynatraceClient::default();
        let mut dk = dynakube_with_activegate(&["routing"]);
        let reconciler = ConnectionInfoReconciler::new(&cluster, &dtc, threshold());
        reconciler.reconcile(&mut dk).await.unwrap();
        dk.status_mut().active_gate.connection_info.last_request =
            Some(format_rfc3339(Utc::now() - chrono::Duration::hours(1)));
        cluster.clear_operations();
        reconciler.reconcile(&mut dk).await.unwrap();
        assert_eq!(dtc.connection_info_requests(), 2);
        assert!(cluster.object_writes().is_empty());
    }

    #[tokio::test]
    async fn test_backend_failure_is_reported() {
        let cluster = cluster();
        let dtc = FakeDynatraceClient::failing();
        let mut dk = dynakube_with_activegate(&["routing"]);
        let err = ConnectionInfoReconciler::new(&cluster, &dtc, threshold())
            .reconcile(&mut dk)
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::Backend(_)));
        assert!(crate::conditions::find_by_type(
            &dk.current_status().conditions,
            ConditionType::ActiveGateConnectionInfo
        )
        .is_some());
    }

    #[tokio::test]
    async fn test_missing_tenant_marks_condition_outdated() {
        let cluster = cluster();
        let dtc = FakeDynatraceClient::tenant_pending();
        let mut dk = dynakube_with_activegate(&["routing"]);
        let err = ConnectionInfoReconciler::new(&cluster, &dtc, threshold())
            .reconcile(&mut dk)
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::TenantUuidUnknown));

        let status = dk.current_status();
        let condition = crate::conditions::find_by_type(
            &status.conditions,
            ConditionType::ActiveGateConnectionInfo,
        )
        .unwrap();
        assert_eq!(condition.status, "False");
        assert_eq!(condition.reason.as_deref(), Some("Outdated"));
        assert_eq!(condition.message.as_deref(), Some("tenantUUID unknown"));
        assert!(cluster.object_writes().is_empty());
    }

    #[test]
    fn test_is_fresh() {
        let now = Utc::now();
        let mut status = ConnectionInfoStatus::default();
        assert!(!is_fresh(&status, threshold(), now));
        status.last_request = Some(format_rfc3339(now - chrono::Duration::minutes(5)));
        assert!(is_fresh(&status, threshold(), now));
        status.last_request = Some(format_rfc3339(now - chrono::Duration::minutes(20)));
        assert!(!is_fresh(&status, threshold(), now));
    }
}
