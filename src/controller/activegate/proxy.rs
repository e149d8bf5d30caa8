//! # Internal Proxy Secret
//!
//! Splits the proxy URL of the DynaKube into the `host`, `port`, `username`
//! and `password` files the gateway reads.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use kube::ResourceExt;
use reqwest::Url;

use super::consts::{
    proxy_secret_name, PROXY_HOST_KEY, PROXY_PASSWORD_KEY, PROXY_PORT_KEY, PROXY_USERNAME_KEY,
};
use crate::constants::PROXY_KEY;
use crate::controller::error::ReconcileError;
use crate::crd::{DynaKube, ValueSource};
use crate::kubeobjects::{query, ClusterClient};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySettings {
    pub host: String,
    pub port: String,
    pub username: String,
    pub password: String,
}

/// Parse `scheme://[user[:password]@]host[:port]`; the port defaults per scheme
pub fn parse_proxy_url(raw: &str) -> Result<ProxySettings, ReconcileError> {
    let url = Url::parse(raw).map_err(|e| ReconcileError::Invalid(format!("proxy url: {e}")))?;
    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| ReconcileError::Invalid("proxy url has no host".to_string()))?;
    let port = url
        .port_or_known_default()
        .map(|p| p.to_string())
        .unwrap_or_default();
    Ok(ProxySettings {
        host: host.to_string(),
        port,
        username: url.username().to_string(),
        password: url.password().unwrap_or_default().to_string(),
    })
}

pub struct ProxyReconciler<'a, C> {
    client: &'a C,
}

impl<C> std::fmt::Debug for ProxyReconciler<'_, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyReconciler").finish_non_exhaustive()
    }
}

impl<'a, C: ClusterClient> ProxyReconciler<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self { client }
    }

    pub async fn reconcile(&self, dk: &DynaKube) -> Result<(), ReconcileError> {
        let name = proxy_secret_name(&dk.name_any());
        let secrets = query::secrets(self.client).with_owner(dk);

        let Some(raw) = self.proxy_url(dk).await? else {
            secrets.delete(&dk.ns(), &name).await?;
            return Ok(());
        };
        let settings = parse_proxy_url(&raw)?;
        secrets.create_or_update(build_secret(dk, &name, &settings)).await?;
        Ok(())
    }

    async fn proxy_url(&self, dk: &DynaKube) -> Result<Option<String>, ReconcileError> {
        let Some(source) = dk.spec.proxy.as_ref() else {
            return Ok(None);
        };
        if let Some(value) = source.inline() {
            return Ok(Some(value.to_string()));
        }
        let Some(secret_name) = source.secret_ref() else {
            return Ok(None);
        };
        let secret: Secret = self
            .client
            .get(&dk.ns(), secret_name)
            .await?
            .ok_or_else(|| {
                ReconcileError::SecretReference(format!("proxy secret {secret_name} not found"))
            })?;
        ValueSource::read_from(&secret, PROXY_KEY)
            .map(Some)
            .ok_or_else(|| {
                ReconcileError::SecretReference(format!(
                    "proxy secret {secret_name} has no key {PROXY_KEY}"
                ))
            })
    }
}

fn build_secret(dk: &DynaKube, name: &str, settings: &ProxySettings) -> Secret {
    let entry = |key: &str, value: &str| (key.to_string(), ByteString(value.as_bytes().to_vec()));
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(dk.ns()),
            ..ObjectMeta::default()
        },
        data: Some(BTreeMap::from([
            entry(PROXY_HOST_KEY, &settings.host),
            entry(PROXY_PORT_KEY, &settings.port),
            entry(PROXY_USERNAME_KEY, &settings.username),
            entry(PROXY_PASSWORD_KEY, &settings.password),
        ])),
        ..Secret::default()
    }
}
