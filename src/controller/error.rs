//! # Reconcile Errors

use thiserror::Error;

use crate::certificates::CertificateError;
use crate::dtclient::DtClientError;
use crate::kubeobjects::builder::BuildError;
use crate::kubeobjects::ClientError;

#[derive(Debug, Error)]
pub enum ReconcileError {
    /// `status.kubeSystemUUID` has not been populated yet
    #[error("kubeSystemUUID unknown")]
    KubeSystemUuidUnknown,
    /// The tenant UUID has not been fetched yet
    #[error("tenantUUID unknown")]
    TenantUuidUnknown,
    #[error("secret reference failed: {0}")]
    SecretReference(String),
    #[error(transparent)]
    Kube(#[from] ClientError),
    #[error("Dynatrace API request failed: {0}")]
    Backend(#[from] DtClientError),
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error(transparent)]
    Certificate(#[from] CertificateError),
    #[error("invalid DynaKube: {0}")]
    Invalid(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ReconcileError {
    /// Preconditions a sibling subsystem will satisfy; requeue soon
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ReconcileError::KubeSystemUuidUnknown | ReconcileError::TenantUuidUnknown
        )
    }
}
