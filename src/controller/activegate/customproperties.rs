//! # Custom Properties
//!
//! Inline custom properties are stored in `<dk>-<owner>-custom-properties`
//! under `customProperties`. A `valueFrom` reference is mounted directly and
//! needs no Secret of its own.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use kube::ResourceExt;
use tracing::debug;

use super::consts::{custom_properties_secret_name, CUSTOM_PROPERTIES_KEY};
use crate::controller::error::ReconcileError;
use crate::crd::{DynaKube, ValueSource};
use crate::kubeobjects::{query, ClusterClient};

pub struct CustomPropertiesReconciler<'a, C> {
    client: &'a C,
    owner: &'a str,
    source: Option<&'a ValueSource>,
}

impl<C> std::fmt::Debug for CustomPropertiesReconciler<'_, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomPropertiesReconciler")
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

impl<'a, C: ClusterClient> CustomPropertiesReconciler<'a, C> {
    pub fn new(client: &'a C, owner: &'a str, source: Option<&'a ValueSource>) -> Self {
        Self {
            client,
            owner,
            source,
        }
    }

    pub async fn reconcile(&self, dk: &DynaKube) -> Result<(), ReconcileError> {
        let Some(value) = self.source.and_then(ValueSource::inline) else {
            debug!(owner = %self.owner, "no inline custom properties");
            return Ok(());
        };

        let name = custom_properties_secret_name(&dk.name_any(), self.owner);
        let secrets = query::secrets(self.client).with_owner(dk);
        let desired = build_secret(dk, &name, value);

        match secrets.get(&dk.ns(), &name).await? {
            None => {
                secrets.create(desired).await?;
            }
            Some(current) => {
                if ValueSource::read_from(&current, CUSTOM_PROPERTIES_KEY).as_deref() != Some(value) {
                    secrets.update(&current, desired).await?;
                }
            }
        }
        Ok(())
    }
}

fn build_secret(dk: &DynaKube, name: &str, value: &str) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(dk.ns()),
            ..ObjectMeta::default()
        },
        data: Some(BTreeMap::from([(
            CUSTOM_PROPERTIES_KEY.to_string(),
            ByteString(value.as_bytes().to_vec()),
        )])),
        ..Secret::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::activegate::consts::ACTIVEGATE_NAME;
    use crate::kubeobjects::memory::OperationKind;
    use crate::test_support::{cluster, dynakube};

    fn inline(value: &str) -> ValueSource {
        ValueSource {
            value: Some(value.to_string()),
            value_from: None,
        }
    }

    #[tokio::test]
    async fn test_inline_creates_and_updates() {
        let cluster = cluster();
        let dk = dynakube();

        let source = inline("foo=bar");
        CustomPropertiesReconciler::new(&cluster, ACTIVEGATE_NAME, Some(&source))
            .reconcile(&dk)
            .await
            .unwrap();
        let secret: Secret = cluster
            .snapshot("dynatrace", "dk-activegate-custom-properties")
            .unwrap();
        assert_eq!(
            ValueSource::read_from(&secret, CUSTOM_PROPERTIES_KEY).as_deref(),
            Some("foo=bar")
        );

        cluster.clear_operations();
        CustomPropertiesReconciler::new(&cluster, ACTIVEGATE_NAME, Some(&source))
            .reconcile(&dk)
            .await
            .unwrap();
        assert!(cluster.object_writes().is_empty());

        let changed = inline("foo=baz");
        CustomPropertiesReconciler::new(&cluster, ACTIVEGATE_NAME, Some(&changed))
            .reconcile(&dk)
            .await
            .unwrap();
        assert_eq!(cluster.object_writes()[0].kind, OperationKind::Replace);
        let secret: Secret = cluster
            .snapshot("dynatrace", "dk-activegate-custom-properties")
            .unwrap();
        assert_eq!(
            ValueSource::read_from(&secret, CUSTOM_PROPERTIES_KEY).as_deref(),
            Some("foo=baz")
        );
    }

    #[tokio::test]
    async fn test_value_from_is_pass_through() {
        let cluster = cluster();
        let source = ValueSource {
            value: None,
            value_from: Some("user-secret".to_string()),
        };
        CustomPropertiesReconciler::new(&cluster, ACTIVEGATE_NAME, Some(&source))
            .reconcile(&dynakube())
            .await
            .unwrap();
        CustomPropertiesReconciler::new(&cluster, ACTIVEGATE_NAME, None)
            .reconcile(&dynakube())
            .await
            .unwrap();
        assert!(cluster.object_writes().is_empty());
    }
}
