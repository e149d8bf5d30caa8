//! # Controller
//!
//! Host glue around the DynaKube reconcile pass.
//!
//! - `activegate`, `extensions`, `logmodule`: per-component reconcilers
//! - `dynakube`: runs the components in order and records the phase
//! - `backoff`: Fibonacci backoff for failed passes
//! - `context`, `error`: shared handles and the error type
//!
//! [`run`] drives a `kube_runtime::Controller` that watches DynaKubes and the
//! objects they own. Each pass builds a backend client from the tokens
//! Secret, reconciles, and writes the status back whether or not it failed.

pub mod activegate;
pub mod backoff;
pub mod context;
pub mod dynakube;
pub mod error;
pub mod extensions;
pub mod logmodule;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use futures::StreamExt;
use k8s_openapi::api::apps::v1::{DaemonSet, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service};
use kube::{Api, Client, ResourceExt};
use kube_runtime::{controller::Action, watcher, Controller};
use tracing::{debug, error, info, warn, Instrument, Level};

use self::backoff::FibonacciBackoff;
use self::context::Context;
use self::dynakube::{write_status, DynaKubeReconciler, PHASE_ERROR};
use self::error::ReconcileError;
use crate::config::ControllerConfig;
use crate::constants::API_TOKEN_KEY;
use crate::crd::{DynaKube, ValueSource};
use crate::dtclient::HttpDynatraceClient;
use crate::kubeobjects::{ClusterClient, KubeCluster};
use crate::observability::metrics;

/// Per-DynaKube retry delays, keyed by `namespace/name`
#[derive(Debug)]
pub struct Backoffs {
    min: Duration,
    max: Duration,
    entries: Mutex<HashMap<String, FibonacciBackoff>>,
}

impl Backoffs {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn next(&self, key: &str) -> Duration {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .entry(key.to_string())
            .or_insert_with(|| FibonacciBackoff::new(self.min, self.max))
            .next_backoff()
    }

    pub fn reset(&self, key: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
    }
}

pub struct Reconciler {
    cluster: KubeCluster,
    config: ControllerConfig,
    backoffs: Backoffs,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn object_key(dk: &DynaKube) -> String {
    format!("{}/{}", dk.ns(), dk.name_any())
}

/// API token from the tokens Secret of `dk`
pub async fn api_token<C: ClusterClient>(client: &C, dk: &DynaKube) -> Result<String, ReconcileError> {
    let name = dk.tokens_secret_name();
    let secret: Option<Secret> = client.get(&dk.ns(), &name).await?;
    secret
        .as_ref()
        .and_then(|secret| ValueSource::read_from(secret, API_TOKEN_KEY))
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            ReconcileError::SecretReference(format!("secret {name} has no {API_TOKEN_KEY}"))
        })
}

impl Reconciler {
    pub fn new(client: Client, config: ControllerConfig) -> Self {
        let backoffs = Backoffs::new(
            config.reconciliation_error_requeue_duration(),
            config.reconcile_interval_duration(),
        );
        Self {
            cluster: KubeCluster::new(client),
            config,
            backoffs,
        }
    }

    async fn reconcile_dynakube(&self, dk: &mut DynaKube) -> Result<(), ReconcileError> {
        let token = api_token(&self.cluster, dk).await?;
        let dtc = HttpDynatraceClient::new(&dk.spec.api_url, &token)?;
        DynaKubeReconciler::new(Context::new(&self.cluster, &dtc, &self.config))
            .reconcile(dk)
            .await
    }

    /// One reconcile pass for `dk`
    pub async fn reconcile(dk: Arc<DynaKube>, ctx: Arc<Reconciler>) -> Result<Action, ReconcileError> {
        let span = tracing::span!(
            Level::INFO,
            "reconcile",
            resource.name = %dk.name_any(),
            resource.namespace = %dk.ns()
        );
        ctx.reconcile_inner(&dk).instrument(span).await
    }

    async fn reconcile_inner(&self, dk: &DynaKube) -> Result<Action, ReconcileError> {
        let start = Instant::now();
        metrics::increment_reconciliations();

        let mut dk = dk.clone();
        let previous = dk.status.clone();
        let result = self.reconcile_dynakube(&mut dk).await;
        if let Err(err) = &result {
            warn!(error = %err, "reconcile pass failed");
            if !err.is_transient() {
                dk.status_mut().phase = Some(PHASE_ERROR.to_string());
            }
        }

        if dk.status != previous {
            if let Err(err) = write_status(&self.cluster, &dk, previous.as_ref()).await {
                error!(error = %err, "failed to write status");
                if result.is_ok() {
                    return Err(err);
                }
            }
        } else {
            debug!("status unchanged");
        }

        metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());
        result?;
        self.backoffs.reset(&object_key(&dk));
        Ok(Action::requeue(self.config.reconcile_interval_duration()))
    }

    pub fn error_policy(dk: Arc<DynaKube>, err: &ReconcileError, ctx: Arc<Reconciler>) -> Action {
        metrics::increment_reconciliation_errors();
        let delay = if err.is_transient() {
            ctx.config.transient_requeue_duration()
        } else {
            ctx.backoffs.next(&object_key(&dk))
        };
        warn!(
            dynakube = %dk.name_any(),
            namespace = %dk.ns(),
            error = %err,
            requeue_secs = delay.as_secs(),
            "requeueing after error"
        );
        Action::requeue(delay)
    }
}

/// Watch DynaKubes in all namespaces until a shutdown signal arrives
pub async fn run(client: Client, config: ControllerConfig) {
    let dynakubes: Api<DynaKube> = Api::all(client.clone());
    let ctx = Arc::new(Reconciler::new(client.clone(), config));

    info!("starting DynaKube controller");
    Controller::new(dynakubes, watcher::Config::default())
        .owns(Api::<StatefulSet>::all(client.clone()), watcher::Config::default())
        .owns(Api::<DaemonSet>::all(client.clone()), watcher::Config::default())
        .owns(Api::<Service>::all(client.clone()), watcher::Config::default())
        .owns(Api::<Secret>::all(client.clone()), watcher::Config::default())
        .owns(Api::<ConfigMap>::all(client), watcher::Config::default())
        .shutdown_on_signal()
        .run(Reconciler::reconcile, Reconciler::error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((object, _)) => debug!(dynakube = %object.name, "reconciled"),
                Err(err) => debug!(error = %err, "controller event failed"),
            }
        })
        .await;
    info!("DynaKube controller stopped");
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use k8s_openapi::ByteString;
    use kube::api::ObjectMeta;

    use super::*;
    use crate::test_support::{cluster, dynakube, NAMESPACE};

    fn tokens_secret(name: &str, token: &str) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(NAMESPACE.to_string()),
                ..ObjectMeta::default()
            },
            data: Some(BTreeMap::from([(
                API_TOKEN_KEY.to_string(),
                ByteString(token.as_bytes().to_vec()),
            )])),
            ..Secret::default()
        }
    }

    #[tokio::test]
    async fn test_api_token_from_default_secret() {
        let cluster = cluster();
        cluster.insert(&tokens_secret("dk", "dt0c01.abc")).unwrap();
        assert_eq!(api_token(&cluster, &dynakube()).await.unwrap(), "dt0c01.abc");
    }

    #[tokio::test]
    async fn test_api_token_from_custom_secret() {
        let cluster = cluster();
        cluster.insert(&tokens_secret("my-tokens", "dt0c01.xyz")).unwrap();
        let mut dk = dynakube();
        dk.spec.tokens = Some("my-tokens".to_string());
        assert_eq!(api_token(&cluster, &dk).await.unwrap(), "dt0c01.xyz");
    }

    #[tokio::test]
    async fn test_missing_or_empty_token_is_secret_reference_error() {
        let cluster = cluster();
        let err = api_token(&cluster, &dynakube()).await.unwrap_err();
        assert!(matches!(err, ReconcileError::SecretReference(_)));

        cluster.insert(&tokens_secret("dk", "")).unwrap();
        let err = api_token(&cluster, &dynakube()).await.unwrap_err();
        assert!(matches!(err, ReconcileError::SecretReference(_)));
    }

    #[test]
    fn test_backoffs_are_per_key() {
        let backoffs = Backoffs::new(Duration::from_secs(30), Duration::from_secs(300));
        assert_eq!(backoffs.next("a/dk"), Duration::from_secs(30));
        assert_eq!(backoffs.next("a/dk"), Duration::from_secs(30));
        assert_eq!(backoffs.next("a/dk"), Duration::from_secs(60));
        assert_eq!(backoffs.next("b/dk"), Duration::from_secs(30));

        backoffs.reset("a/dk");
        assert_eq!(backoffs.next("a/dk"), Duration::from_secs(30));
    }
}
