//! # Extensions
//!
//! Reconciles the extensions execution controller: a token Secret, a TLS
//! Secret for its datasource endpoint, a Service and a single-replica
//! StatefulSet.
//!
//! The controller reports to the gateway of the same DynaKube, so the tenant
//! UUID fetched by the gateway's connection-info step must be known first;
//! until then the pass ends with [`ReconcileError::TenantUuidUnknown`].

pub mod service;
pub mod statefulset;
pub mod tls;
pub mod token;

use kube::ResourceExt;
use tracing::info;

use self::service::ServiceReconciler;
use self::statefulset::StatefulSetReconciler;
use self::tls::TlsSecretReconciler;
use self::token::TokenSecretReconciler;
use crate::conditions::{self, ConditionType};
use crate::controller::error::ReconcileError;
use crate::crd::DynaKube;
use crate::kubeobjects::{query, ClientError, ClusterClient};

pub const CONTAINER_NAME: &str = "extension-controller";
pub const SERVICE_ACCOUNT_NAME: &str = "dynatrace-extension-controller";
pub const COLLECTOR_PORT: i32 = 14599;
pub const COLLECTOR_PORT_NAME: &str = "collector-com";

pub const EEC_TOKEN_KEY: &str = "eec.token";
pub const OTELC_TOKEN_KEY: &str = "otelc.token";

pub fn controller_name(dynakube: &str) -> String {
    format!("{dynakube}-extensions-controller")
}

pub fn token_secret_name(dynakube: &str) -> String {
    format!("{dynakube}-extensions-token")
}

pub fn tls_secret_name(dynakube: &str) -> String {
    format!("{dynakube}-extensions-controller-tls")
}

/// Secret actually mounted for TLS: the user's `tlsRefName` or the generated one
pub fn effective_tls_secret_name(dk: &DynaKube) -> String {
    dk.extension_execution_controller()
        .tls_ref_name
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| tls_secret_name(&dk.name_any()))
}

pub struct ExtensionsReconciler<'a, C> {
    client: &'a C,
}

impl<C> std::fmt::Debug for ExtensionsReconciler<'_, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionsReconciler").finish_non_exhaustive()
    }
}

impl<'a, C: ClusterClient> ExtensionsReconciler<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self { client }
    }

    pub async fn reconcile(&self, dk: &mut DynaKube) -> Result<(), ReconcileError> {
        if !dk.extensions_enabled() {
            return self.cleanup(dk).await;
        }
        if dk.current_status().active_gate.connection_info.tenant_uuid.is_empty() {
            let err = ReconcileError::TenantUuidUnknown;
            conditions::set_outdated(
                &mut dk.status_mut().conditions,
                ConditionType::ExtensionsControllerStatefulSet,
                &err.to_string(),
            );
            return Err(err);
        }

        TokenSecretReconciler::new(self.client).reconcile(dk).await?;
        TlsSecretReconciler::new(self.client).reconcile(dk).await?;
        ServiceReconciler::new(self.client).reconcile(dk).await?;
        StatefulSetReconciler::new(self.client).reconcile(dk).await
    }

    async fn cleanup(&self, dk: &mut DynaKube) -> Result<(), ReconcileError> {
        if !conditions::any_present(&dk.current_status().conditions, &ConditionType::EXTENSIONS) {
            return Ok(());
        }
        info!(dynakube = %dk.name_any(), "extensions disabled, removing controller");

        let ns = dk.ns();
        let name = dk.name_any();
        let results = [
            query::statefulsets(self.client)
                .delete(&ns, &controller_name(&name))
                .await,
            query::services(self.client)
                .delete(&ns, &controller_name(&name))
                .await,
            query::secrets(self.client)
                .delete(&ns, &token_secret_name(&name))
                .await,
            query::secrets(self.client)
                .delete(&ns, &tls_secret_name(&name))
                .await,
        ];
        let errors: Vec<ClientError> = results.into_iter().filter_map(Result::err).collect();
        if let Some(err) = ClientError::aggregate(errors) {
            return Err(err.into());
        }

        let status = dk.status_mut();
        for condition_type in ConditionType::EXTENSIONS {
            conditions::remove_by_type(&mut status.conditions, condition_type);
        }
        Ok(())
    }
}
