//! # DynaKube Reconciler
//!
//! Top level of one reconcile pass. Fills in the kube-system UUID, then runs
//! the components in dependency order:
//!
//! 1. ActiveGate (publishes the connection info the others consume)
//! 2. extensions controller
//! 3. log module
//!
//! A failing component stops the pass; the conditions it wrote stay on the
//! status so the caller can persist them. Disabled components clean up after
//! themselves inside their own reconcilers.

use kube::ResourceExt;
use serde_json::Value;
use tracing::{debug, info};

use super::activegate::ActiveGateReconciler;
use super::context::Context;
use super::error::ReconcileError;
use super::extensions::ExtensionsReconciler;
use super::logmodule::LogModuleReconciler;
use crate::crd::{DynaKube, DynaKubeStatus};
use crate::kubeobjects::ClusterClient;

pub const KUBE_SYSTEM_NAMESPACE: &str = "kube-system";

pub const PHASE_RUNNING: &str = "Running";
pub const PHASE_DEPLOYING: &str = "Deploying";
pub const PHASE_ERROR: &str = "Error";

pub struct DynaKubeReconciler<'a, C> {
    ctx: Context<'a, C>,
}

impl<C> std::fmt::Debug for DynaKubeReconciler<'_, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynaKubeReconciler")
            .field("ctx", &self.ctx)
            .finish()
    }
}

impl<'a, C: ClusterClient> DynaKubeReconciler<'a, C> {
    pub fn new(ctx: Context<'a, C>) -> Self {
        Self { ctx }
    }

    /// Runs every component and records the resulting phase
    pub async fn reconcile(&self, dk: &mut DynaKube) -> Result<(), ReconcileError> {
        let result = self.run(dk).await;
        let phase = phase_for(&result);
        if dk.current_status().phase.as_deref() != Some(phase) {
            info!(dynakube = %dk.name_any(), %phase, "phase changed");
        }
        dk.status_mut().phase = Some(phase.to_string());
        result
    }

    async fn run(&self, dk: &mut DynaKube) -> Result<(), ReconcileError> {
        self.ensure_kube_system_uuid(dk).await?;

        ActiveGateReconciler::new(self.ctx).reconcile(dk).await?;
        ExtensionsReconciler::new(self.ctx.client)
            .reconcile(dk)
            .await?;
        LogModuleReconciler::new(self.ctx.client, self.ctx.dtc)
            .reconcile(dk)
            .await
    }

    async fn ensure_kube_system_uuid(&self, dk: &mut DynaKube) -> Result<(), ReconcileError> {
        if !dk.current_status().kube_system_uuid.is_empty() {
            return Ok(());
        }
        let uid = self
            .ctx
            .client
            .get_namespace(KUBE_SYSTEM_NAMESPACE)
            .await?
            .and_then(|ns| ns.metadata.uid)
            .filter(|uid| !uid.is_empty())
            .ok_or(ReconcileError::KubeSystemUuidUnknown)?;
        debug!(dynakube = %dk.name_any(), %uid, "kube-system UUID resolved");
        dk.status_mut().kube_system_uuid = uid;
        Ok(())
    }
}

pub fn phase_for(result: &Result<(), ReconcileError>) -> &'static str {
    match result {
        Ok(()) => PHASE_RUNNING,
        Err(err) if err.is_transient() => PHASE_DEPLOYING,
        Err(_) => PHASE_ERROR,
    }
}

/// JSON merge patch turning `previous` into `current`
///
/// Fields that were set before and are now omitted are sent as `null`, so
/// the API server drops them instead of keeping stale values.
pub fn status_patch(
    previous: Option<&DynaKubeStatus>,
    current: &DynaKubeStatus,
) -> Result<Value, serde_json::Error> {
    let mut patch = serde_json::to_value(current)?;
    if let Some(previous) = previous {
        null_removed_fields(&serde_json::to_value(previous)?, &mut patch);
    }
    Ok(patch)
}

fn null_removed_fields(previous: &Value, patch: &mut Value) {
    let (Value::Object(old), Value::Object(new)) = (previous, patch) else {
        return;
    };
    for (key, old_value) in old {
        match new.get_mut(key) {
            None => {
                new.insert(key.clone(), Value::Null);
            }
            Some(new_value) => null_removed_fields(old_value, new_value),
        }
    }
}

/// Persist the status of `dk` on the cluster
pub async fn write_status<C: ClusterClient>(
    client: &C,
    dk: &DynaKube,
    previous: Option<&DynaKubeStatus>,
) -> Result<(), ReconcileError> {
    let patch = status_patch(previous, &dk.current_status())?;
    client
        .patch_status::<DynaKube>(&dk.ns(), &dk.name_any(), &patch)
        .await?;
    Ok(())
}
