//! # Extensions TLS Secret
//!
//! Self-signed server certificate for the extensions controller's datasource
//! endpoint. A stored certificate is kept until it is within the renewal
//! threshold of its `notAfter`, then replaced.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use kube::ResourceExt;
use tracing::info;

use super::{controller_name, tls_secret_name};
use crate::certificates::{self, CertificateRequest};
use crate::conditions::{self, ConditionType};
use crate::constants::{SECRET_TYPE_TLS, TLS_CRT_KEY, TLS_KEY_KEY};
use crate::controller::error::ReconcileError;
use crate::crd::DynaKube;
use crate::kubeobjects::{query, ClusterClient};
use crate::observability::metrics;

pub fn renewal_threshold() -> chrono::Duration {
    chrono::Duration::hours(12)
}

/// Common name and SANs for the controller's Service
pub fn certificate_request(dk: &DynaKube) -> CertificateRequest {
    let service = controller_name(&dk.name_any());
    let ns = dk.ns();
    CertificateRequest::server(
        format!("{service}.dynatrace"),
        vec![
            format!("{service}.{ns}"),
            format!("{service}.{ns}.svc"),
            format!("{service}.{ns}.svc.cluster.local"),
        ],
    )
}

fn needs_renewal(secret: &Secret, now: DateTime<Utc>) -> bool {
    let cert = secret
        .data
        .as_ref()
        .and_then(|data| data.get(TLS_CRT_KEY));
    let has_key = secret
        .data
        .as_ref()
        .is_some_and(|data| data.contains_key(TLS_KEY_KEY));
    match cert {
        Some(cert) if has_key => !certificates::validate(&cert.0, renewal_threshold(), now),
        _ => true,
    }
}

pub struct TlsSecretReconciler<'a, C> {
    client: &'a C,
}

impl<C> std::fmt::Debug for TlsSecretReconciler<'_, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsSecretReconciler").finish_non_exhaustive()
    }
}

impl<'a, C: ClusterClient> TlsSecretReconciler<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self { client }
    }

    pub async fn reconcile(&self, dk: &mut DynaKube) -> Result<(), ReconcileError> {
        let name = tls_secret_name(&dk.name_any());
        let user_supplied = dk
            .extension_execution_controller()
            .tls_ref_name
            .is_some_and(|name| !name.is_empty());
        if user_supplied {
            query::secrets(self.client).delete(&dk.ns(), &name).await?;
            conditions::remove_by_type(
                &mut dk.status_mut().conditions,
                ConditionType::ExtensionsTlsSecret,
            );
            return Ok(());
        }

        match self.ensure(dk, &name, Utc::now()).await {
            Ok(()) => {
                conditions::set_secret_created(
                    &mut dk.status_mut().conditions,
                    ConditionType::ExtensionsTlsSecret,
                    &name,
                );
                Ok(())
            }
            Err(err) => {
                conditions::set_kube_api_error(
                    &mut dk.status_mut().conditions,
                    ConditionType::ExtensionsTlsSecret,
                    &err,
                );
                Err(err)
            }
        }
    }

    async fn ensure(&self, dk: &DynaKube, name: &str, now: DateTime<Utc>) -> Result<(), ReconcileError> {
        let secrets = query::secrets(self.client).with_owner(dk);
        let current = secrets.get(&dk.ns(), name).await?;
        if current.as_ref().is_some_and(|secret| !needs_renewal(secret, now)) {
            return Ok(());
        }

        let generated = certificates::generate(now, &certificate_request(dk))?;
        info!(secret = %name, not_after = %generated.not_after, "issuing extensions certificate");
        let desired = Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(dk.ns()),
                ..ObjectMeta::default()
            },
            type_: Some(SECRET_TYPE_TLS.to_string()),
            data: Some(BTreeMap::from([
                (TLS_CRT_KEY.to_string(), ByteString(generated.cert_pem.into_bytes())),
                (TLS_KEY_KEY.to_string(), ByteString(generated.key_pem.into_bytes())),
            ])),
            ..Secret::default()
        };
        match current {
            Some(current) => {
                secrets.update(&current, desired).await?;
                metrics::increment_certificate_renewals();
            }
            None => {
                secrets.create(desired).await?;
            }
        }
        Ok(())
    }
}
