//! # Extensions Token Secret
//!
//! Random tokens shared by the extensions controller and the collector.
//! Generated once; an existing Secret is never regenerated.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use kube::ResourceExt;
use rand::Rng;

use super::{token_secret_name, EEC_TOKEN_KEY, OTELC_TOKEN_KEY};
use crate::conditions::{self, ConditionType};
use crate::controller::error::ReconcileError;
use crate::crd::DynaKube;
use crate::kubeobjects::{query, ClusterClient};

const TOKEN_PREFIX: &str = "dt0x01";
const TOKEN_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

fn random_part(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| char::from(TOKEN_CHARSET[rng.gen_range(0..TOKEN_CHARSET.len())]))
        .collect()
}

/// `dt0x01.<24 chars>.<64 chars>`
pub fn generate_token() -> String {
    format!("{TOKEN_PREFIX}.{}.{}", random_part(24), random_part(64))
}

pub struct TokenSecretReconciler<'a, C> {
    client: &'a C,
}

impl<C> std::fmt::Debug for TokenSecretReconciler<'_, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSecretReconciler").finish_non_exhaustive()
    }
}

impl<'a, C: ClusterClient> TokenSecretReconciler<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self { client }
    }

    pub async fn reconcile(&self, dk: &mut DynaKube) -> Result<(), ReconcileError> {
        let name = token_secret_name(&dk.name_any());
        match self.ensure(dk, &name).await {
            Ok(()) => {
                conditions::set_secret_created(
                    &mut dk.status_mut().conditions,
                    ConditionType::ExtensionsTokenSecret,
                    &name,
                );
                Ok(())
            }
            Err(err) => {
                conditions::set_kube_api_error(
                    &mut dk.status_mut().conditions,
                    ConditionType::ExtensionsTokenSecret,
                    &err,
                );
                Err(err)
            }
        }
    }

    async fn ensure(&self, dk: &DynaKube, name: &str) -> Result<(), ReconcileError> {
        let secrets = query::secrets(self.client).with_owner(dk);
        if secrets.get(&dk.ns(), name).await?.is_some() {
            return Ok(());
        }
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(dk.ns()),
                ..ObjectMeta::default()
            },
            data: Some(BTreeMap::from([
                (EEC_TOKEN_KEY.to_string(), ByteString(generate_token().into_bytes())),
                (OTELC_TOKEN_KEY.to_string(), ByteString(generate_token().into_bytes())),
            ])),
            ..Secret::default()
        };
        secrets.create(secret).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::ValueSource;
    use crate::test_support::{cluster, dynakube};

    #[test]
    fn test_token_shape() {
        let token = generate_token();
        let parts: Vec<&str> = token.split('.').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "dt0x01");
        assert_eq!(parts[1].len(), 24);
        assert_eq!(parts[2].len(), 64);
        assert!(parts[2].bytes().all(|b| TOKEN_CHARSET.contains(&b)));
        assert_ne!(generate_token(), token);
    }

    #[tokio::test]
    async fn test_created_once() {
        let cluster = cluster();
        let mut dk = dynakube();
        let reconciler = TokenSecretReconciler::new(&cluster);
        reconciler.reconcile(&mut dk).await.unwrap();
        let first: Secret = cluster.snapshot("dynatrace", "dk-extensions-token").unwrap();
        assert!(ValueSource::read_from(&first, EEC_TOKEN_KEY).is_some());
        assert!(ValueSource::read_from(&first, OTELC_TOKEN_KEY).is_some());

        reconciler.reconcile(&mut dk).await.unwrap();
        let second: Secret = cluster.snapshot("dynatrace", "dk-extensions-token").unwrap();
        assert_eq!(first.data, second.data);
        assert!(conditions::find_by_type(
            &dk.current_status().conditions,
            ConditionType::ExtensionsTokenSecret
        )
        .is_some());
    }
}
