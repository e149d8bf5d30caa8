//! # Auth Token
//!
//! Keeps the ActiveGate auth token Secret present and fresh. Tokens are
//! issued for 30 days; the Secret is replaced one day earlier so the tenant
//! UI never shows an expiring token.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use kube::ResourceExt;
use tracing::info;

use super::consts::{auth_token_secret_name, AUTH_TOKEN_KEY};
use crate::conditions::{self, ConditionType};
use crate::controller::error::ReconcileError;
use crate::crd::DynaKube;
use crate::dtclient::DynatraceClient;
use crate::kubeobjects::time::creation_time;
use crate::kubeobjects::{query, ClusterClient};
use crate::observability::metrics;

pub fn rotation_interval() -> chrono::Duration {
    chrono::Duration::days(29)
}

/// A Secret without creation timestamp counts as outdated
pub fn is_outdated(secret: &Secret, now: DateTime<Utc>) -> bool {
    creation_time(secret).map_or(true, |created| created + rotation_interval() < now)
}

pub struct AuthTokenReconciler<'a, C> {
    client: &'a C,
    dtc: &'a dyn DynatraceClient,
}

impl<C> std::fmt::Debug for AuthTokenReconciler<'_, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthTokenReconciler").finish_non_exhaustive()
    }
}

impl<'a, C: ClusterClient> AuthTokenReconciler<'a, C> {
    pub fn new(client: &'a C, dtc: &'a dyn DynatraceClient) -> Self {
        Self { client, dtc }
    }

    pub async fn reconcile(&self, dk: &mut DynaKube) -> Result<(), ReconcileError> {
        let name = auth_token_secret_name(&dk.name_any());
        match self.ensure(dk, &name).await {
            Ok(()) => {
                conditions::set_secret_created(
                    &mut dk.status_mut().conditions,
                    ConditionType::ActiveGateAuthTokenSecret,
                    &name,
                );
                Ok(())
            }
            Err(err @ ReconcileError::Backend(_)) => {
                conditions::set_secret_gen_failed(
                    &mut dk.status_mut().conditions,
                    ConditionType::ActiveGateAuthTokenSecret,
                    &err,
                );
                Err(err)
            }
            Err(err) => {
                conditions::set_kube_api_error(
                    &mut dk.status_mut().conditions,
                    ConditionType::ActiveGateAuthTokenSecret,
                    &err,
                );
                Err(err)
            }
        }
    }

    async fn ensure(&self, dk: &DynaKube, name: &str) -> Result<(), ReconcileError> {
        let secrets = query::secrets(self.client).with_owner(dk);
        if let Some(current) = secrets.get(&dk.ns(), name).await? {
            if !is_outdated(&current, Utc::now()) {
                return Ok(());
            }
            info!(secret = %name, "auth token outdated, rotating");
            secrets.delete(&dk.ns(), name).await?;
            metrics::increment_token_rotations();
        }

        let token = self.dtc.get_activegate_auth_token(&dk.name_any()).await?;
        secrets.create(build_secret(dk, name, &token.token)).await?;
        Ok(())
    }
}

fn build_secret(dk: &DynaKube, name: &str, token: &str) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(dk.ns()),
            ..ObjectMeta::default()
        },
        data: Some(BTreeMap::from([(
            AUTH_TOKEN_KEY.to_string(),
            ByteString(token.as_bytes().to_vec()),
        )])),
        ..Secret::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::find_by_type;
    use crate::crd::ValueSource;
    use crate::kubeobjects::memory::OperationKind;
    use crate::kubeobjects::time::from_datetime;
    use crate::test_support::{cluster, dynakube_with_activegate, FakeDynatraceClient};

    fn token_of(secret: &Secret) -> String {
        ValueSource::read_from(secret, AUTH_TOKEN_KEY).unwrap()
    }

    #[tokio::test]
    async fn test_creates_secret_once() {
        let cluster = cluster();
        let dtc = FakeDynatraceClient::default();
        let mut dk = dynakube_with_activegate(&["routing"]);
        let reconciler = AuthTokenReconciler::new(&cluster, &dtc);

        reconciler.reconcile(&mut dk).await.unwrap();
        reconciler.reconcile(&mut dk).await.unwrap();

        assert_eq!(dtc.token_requests(), 1);
        let secret: Secret = cluster.snapshot("dynatrace", "dk-activegate-auth-token").unwrap();
        assert_eq!(token_of(&secret), "dt0g02.auth-token-1");
        assert_eq!(secret.owner_references()[0].name, "dk");
        let condition = find_by_type(
            &dk.current_status().conditions,
            ConditionType::ActiveGateAuthTokenSecret,
        )
        .unwrap()
        .clone();
        assert_eq!(condition.reason.as_deref(), Some("SecretCreated"));
    }

    #[tokio::test]
    async fn test_rotates_outdated_secret() {
        let cluster = cluster();
        let dtc = FakeDynatraceClient::default();
        let mut dk = dynakube_with_activegate(&["routing"]);
        let mut old = build_secret(&dk, "dk-activegate-auth-token", "old");
        old.metadata.creation_timestamp =
            Some(from_datetime(Utc::now() - chrono::Duration::days(30)).unwrap());
        cluster.insert(&old).unwrap();

        AuthTokenReconciler::new(&cluster, &dtc)
            .reconcile(&mut dk)
            .await
            .unwrap();

        let kinds: Vec<OperationKind> = cluster.object_writes().into_iter().map(|op| op.kind).collect();
        assert_eq!(kinds, vec![OperationKind::Delete, OperationKind::Create]);
        let secret: Secret = cluster.snapshot("dynatrace", "dk-activegate-auth-token").unwrap();
        assert_eq!(token_of(&secret), "dt0g02.auth-token-1");
        let created = creation_time(&secret).unwrap();
        assert!(Utc::now() - created < chrono::Duration::seconds(2));
    }

    #[tokio::test]
    async fn test_young_secret_is_kept() {
        let cluster = cluster();
        let dtc = FakeDynatraceClient::default();
        let mut dk = dynakube_with_activegate(&["routing"]);
        let mut young = build_secret(&dk, "dk-activegate-auth-token", "young");
        young.metadata.creation_timestamp =
            Some(from_datetime(Utc::now() - chrono::Duration::days(28)).unwrap());
        cluster.insert(&young).unwrap();

        AuthTokenReconciler::new(&cluster, &dtc)
            .reconcile(&mut dk)
            .await
            .unwrap();
        assert_eq!(dtc.token_requests(), 0);
        assert!(cluster.object_writes().is_empty());
    }

    #[tokio::test]
    async fn test_backend_failure_sets_secret_gen_failed() {
        let cluster = cluster();
        let dtc = FakeDynatraceClient::failing();
        let mut dk = dynakube_with_activegate(&["routing"]);
        let err = AuthTokenReconciler::new(&cluster, &dtc)
            .reconcile(&mut dk)
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::Backend(_)));
        let condition = find_by_type(
            &dk.current_status().conditions,
            ConditionType::ActiveGateAuthTokenSecret,
        )
        .unwrap()
        .clone();
        assert_eq!(condition.reason.as_deref(), Some("SecretGenFailed"));
        assert!(cluster.object_writes().is_empty());
    }

    #[test]
    fn test_is_outdated_boundary() {
        let now = Utc::now();
        let mut secret = Secret::default();
        assert!(is_outdated(&secret, now));
        secret.metadata.creation_timestamp =
            Some(from_datetime(now - chrono::Duration::days(29) + chrono::Duration::minutes(1)).unwrap());
        assert!(!is_outdated(&secret, now));
        secret.metadata.creation_timestamp =
            Some(from_datetime(now - chrono::Duration::days(29) - chrono::Duration::minutes(1)).unwrap());
        assert!(is_outdated(&secret, now));
    }
}
