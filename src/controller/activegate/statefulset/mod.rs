//! # Gateway StatefulSet
//!
//! Builds the gateway StatefulSet and applies it through the query layer.
//!
//! The pod template carries a configuration hash over the custom properties
//! and the auth token, so rotating either rolls the pods.

mod builder;
pub mod modifiers;

pub use builder::{security_context, GatewayDraft, StatefulSetBuilder, READINESS_PATH};

use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use tracing::{debug, info};

use super::capability::MultiCapability;
use super::consts::{auth_token_secret_name, statefulset_name, AUTH_TOKEN_KEY, CUSTOM_PROPERTIES_KEY};
use crate::conditions::{self, ConditionType};
use crate::controller::error::ReconcileError;
use crate::crd::{DynaKube, ValueSource};
use crate::kubeobjects::hasher::fnv32;
use crate::kubeobjects::{query, ClusterClient};

pub struct StatefulSetReconciler<'a, C> {
    client: &'a C,
    capability: &'a MultiCapability,
}

impl<C> std::fmt::Debug for StatefulSetReconciler<'_, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatefulSetReconciler")
            .field("capabilities", &self.capability.arg_name())
            .finish_non_exhaustive()
    }
}

impl<'a, C: ClusterClient> StatefulSetReconciler<'a, C> {
    pub fn new(client: &'a C, capability: &'a MultiCapability) -> Self {
        Self { client, capability }
    }

    pub async fn reconcile(&self, dk: &mut DynaKube) -> Result<(), ReconcileError> {
        let kube_system_uuid = dk.current_status().kube_system_uuid;
        if kube_system_uuid.is_empty() {
            conditions::set_outdated(
                &mut dk.status_mut().conditions,
                ConditionType::ActiveGateStatefulSet,
                "kubeSystemUUID unknown",
            );
            return Err(ReconcileError::KubeSystemUuidUnknown);
        }

        let configuration_hash = match self.configuration_hash(dk).await {
            Ok(hash) => hash,
            Err(err @ ReconcileError::SecretReference(_)) => {
                conditions::set_secret_reference_failed(
                    &mut dk.status_mut().conditions,
                    ConditionType::ActiveGateStatefulSet,
                    &err,
                );
                return Err(err);
            }
            Err(err) => {
                conditions::set_kube_api_error(
                    &mut dk.status_mut().conditions,
                    ConditionType::ActiveGateStatefulSet,
                    &err,
                );
                return Err(err);
            }
        };

        let desired =
            StatefulSetBuilder::new(dk, self.capability, &kube_system_uuid, &configuration_hash)
                .build()?;
        let name = desired.name_any();

        match query::statefulsets(self.client)
            .with_owner(&*dk)
            .create_or_update(desired)
            .await
        {
            Ok(true) => {
                info!(statefulset = %name, "gateway statefulset applied");
                conditions::set_statefulset_created(
                    &mut dk.status_mut().conditions,
                    ConditionType::ActiveGateStatefulSet,
                    &name,
                );
                Ok(())
            }
            Ok(false) => {
                debug!(statefulset = %name, "gateway statefulset unchanged");
                Ok(())
            }
            Err(err) => {
                conditions::set_kube_api_error(
                    &mut dk.status_mut().conditions,
                    ConditionType::ActiveGateStatefulSet,
                    &err,
                );
                Err(err.into())
            }
        }
    }

    async fn custom_properties_data(&self, dk: &DynaKube) -> Result<String, ReconcileError> {
        let Some(source) = self.capability.properties().custom_properties.as_ref() else {
            return Ok(String::new());
        };
        if let Some(value) = source.inline() {
            return Ok(value.to_string());
        }
        let Some(secret_name) = source.secret_ref() else {
            return Ok(String::new());
        };
        let secret: Secret = self
            .client
            .get(&dk.ns(), secret_name)
            .await?
            .ok_or_else(|| {
                ReconcileError::SecretReference(format!(
                    "custom properties secret {secret_name} not found"
                ))
            })?;
        ValueSource::read_from(&secret, CUSTOM_PROPERTIES_KEY).ok_or_else(|| {
            ReconcileError::SecretReference(format!(
                "custom properties secret {secret_name} has no key {CUSTOM_PROPERTIES_KEY}"
            ))
        })
    }

    async fn auth_token_data(&self, dk: &DynaKube) -> Result<String, ReconcileError> {
        let secret: Option<Secret> = self
            .client
            .get(&dk.ns(), &auth_token_secret_name(&dk.name_any()))
            .await?;
        Ok(secret
            .and_then(|secret| ValueSource::read_from(&secret, AUTH_TOKEN_KEY))
            .unwrap_or_default())
    }

    /// Hash over custom properties and auth token; empty when neither exists
    pub async fn configuration_hash(&self, dk: &DynaKube) -> Result<String, ReconcileError> {
        let mut data = self.custom_properties_data(dk).await?;
        data.push_str(&self.auth_token_data(dk).await?);
        if data.is_empty() {
            return Ok(String::new());
        }
        Ok(fnv32(data.as_bytes()).to_string())
    }
}

/// Name of the gateway StatefulSet of `dk`
pub fn name_of(dk: &DynaKube) -> String {
    statefulset_name(&dk.name_any())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::{find_by_type, Reason};
    use crate::constants::ANNOTATION_ACTIVEGATE_CONFIGURATION_HASH;
    use crate::kubeobjects::memory::OperationKind;
    use crate::kubeobjects::MemoryCluster;
    use crate::test_support::{cluster, dynakube_with_activegate, KUBE_SYSTEM_UID};
    use k8s_openapi::api::apps::v1::StatefulSet;
    use k8s_openapi::ByteString;
    use kube::api::ObjectMeta;
    use std::collections::BTreeMap;

    fn ready_dynakube(capabilities: &[&str]) -> DynaKube {
        let mut dk = dynakube_with_activegate(capabilities);
        dk.status_mut().kube_system_uuid = KUBE_SYSTEM_UID.to_string();
        dk
    }

    fn secret(name: &str, key: &str, value: &str) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("dynatrace".to_string()),
                ..ObjectMeta::default()
            },
            data: Some(BTreeMap::from([(
                key.to_string(),
                ByteString(value.as_bytes().to_vec()),
            )])),
            ..Secret::default()
        }
    }

    async fn reconcile(cluster: &MemoryCluster, dk: &mut DynaKube) -> Result<(), ReconcileError> {
        let capability = MultiCapability::new(dk);
        StatefulSetReconciler::new(cluster, &capability)
            .reconcile(dk)
            .await
    }

    fn configuration_hash(sts: &StatefulSet) -> String {
        sts.spec.as_ref().unwrap().template.metadata.as_ref().unwrap()
            .annotations
            .as_ref()
            .unwrap()[ANNOTATION_ACTIVEGATE_CONFIGURATION_HASH]
            .clone()
    }

    #[tokio::test]
    async fn test_missing_kube_system_uuid() {
        let cluster = cluster();
        let mut dk = dynakube_with_activegate(&["routing"]);
        let err = reconcile(&cluster, &mut dk).await.unwrap_err();
        assert!(matches!(err, ReconcileError::KubeSystemUuidUnknown));
        let condition = find_by_type(
            &dk.current_status().conditions,
            ConditionType::ActiveGateStatefulSet,
        )
        .unwrap()
        .clone();
        assert_eq!(condition.reason.as_deref(), Some(Reason::Outdated.as_str()));
        assert!(cluster.object_writes().is_empty());
    }

    #[tokio::test]
    async fn test_creates_then_noop() {
        let cluster = cluster();
        let mut dk = ready_dynakube(&["routing"]);
        reconcile(&cluster, &mut dk).await.unwrap();
        let sts: StatefulSet = cluster.snapshot("dynatrace", "dk-activegate").unwrap();
        assert_eq!(sts.owner_references()[0].uid, "dk-uid");
        assert_eq!(configuration_hash(&sts), "");
        let condition = find_by_type(
            &dk.current_status().conditions,
            ConditionType::ActiveGateStatefulSet,
        )
        .unwrap()
        .clone();
        assert_eq!(condition.reason.as_deref(), Some("StatefulSetCreated"));

        cluster.clear_operations();
        reconcile(&cluster, &mut dk).await.unwrap();
        assert!(cluster.object_writes().is_empty());
    }

    #[tokio::test]
    async fn test_hash_follows_auth_token() {
        let cluster = cluster();
        let mut dk = ready_dynakube(&["routing"]);
        cluster
            .insert(&secret("dk-activegate-auth-token", AUTH_TOKEN_KEY, "token-1"))
            .unwrap();
        reconcile(&cluster, &mut dk).await.unwrap();
        let first: StatefulSet = cluster.snapshot("dynatrace", "dk-activegate").unwrap();
        assert!(!configuration_hash(&first).is_empty());

        cluster
            .insert(&secret("dk-activegate-auth-token", AUTH_TOKEN_KEY, "token-2"))
            .unwrap();
        cluster.clear_operations();
        reconcile(&cluster, &mut dk).await.unwrap();
        let second: StatefulSet = cluster.snapshot("dynatrace", "dk-activegate").unwrap();
        assert_ne!(configuration_hash(&first), configuration_hash(&second));
        assert_eq!(cluster.object_writes()[0].kind, OperationKind::Replace);
    }

    #[tokio::test]
    async fn test_missing_value_from_secret() {
        let cluster = cluster();
        let mut dk = ready_dynakube(&["routing"]);
        dk.spec
            .active_gate
            .as_mut()
            .unwrap()
            .capability_properties
            .custom_properties = Some(ValueSource {
            value: None,
            value_from: Some("absent".to_string()),
        });
        let err = reconcile(&cluster, &mut dk).await.unwrap_err();
        assert!(matches!(err, ReconcileError::SecretReference(_)));
        let condition = find_by_type(
            &dk.current_status().conditions,
            ConditionType::ActiveGateStatefulSet,
        )
        .unwrap()
        .clone();
        assert_eq!(condition.reason.as_deref(), Some("SecretReferenceFailed"));
    }

    #[tokio::test]
    async fn test_value_from_secret_feeds_hash() {
        let cluster = cluster();
        let mut dk = ready_dynakube(&["routing"]);
        dk.spec
            .active_gate
            .as_mut()
            .unwrap()
            .capability_properties
            .custom_properties = Some(ValueSource {
            value: None,
            value_from: Some("props".to_string()),
        });
        cluster
            .insert(&secret("props", CUSTOM_PROPERTIES_KEY, "a=b"))
            .unwrap();
        let capability = MultiCapability::new(&dk);
        let hash = StatefulSetReconciler::new(&cluster, &capability)
            .configuration_hash(&dk)
            .await
            .unwrap();
        assert_eq!(hash, fnv32(b"a=b").to_string());
    }

    #[tokio::test]
    async fn test_write_failure_sets_kube_api_error() {
        let cluster = cluster();
        cluster.fail_writes_for::<StatefulSet>("dk-activegate");
        let mut dk = ready_dynakube(&["routing"]);
        assert!(reconcile(&cluster, &mut dk).await.is_err());
        let condition = find_by_type(
            &dk.current_status().conditions,
            ConditionType::ActiveGateStatefulSet,
        )
        .unwrap()
        .clone();
        assert_eq!(condition.status, "False");
        assert_eq!(condition.reason.as_deref(), Some("KubeApiError"));
    }
}
