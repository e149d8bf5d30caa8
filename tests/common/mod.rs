//! Shared fixtures for the integration tests
//!
//! A seeded in-memory cluster, a DynaKube factory and a fake backend that
//! issues a fresh auth token on every request.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::Container;

use dynakube_operator::config::ControllerConfig;
use dynakube_operator::controller::context::Context;
use dynakube_operator::controller::dynakube::DynaKubeReconciler;
use dynakube_operator::controller::error::ReconcileError;
use dynakube_operator::crd::DynaKube;
use dynakube_operator::dtclient::{
    ActiveGateAuthToken, ActiveGateConnectionInfo, DtClientError, DynatraceClient,
};
use dynakube_operator::kubeobjects::MemoryCluster;

pub const NAMESPACE: &str = "dynatrace";
pub const KUBE_SYSTEM_UID: &str = "01234567-89ab-cdef-0123-456789abcdef";
pub const DYNAKUBE_UID: &str = "dk-uid";

/// DynaKube `dk` in `dynatrace` with the given spec
pub fn dynakube_with_spec(spec: serde_json::Value) -> DynaKube {
    let mut dk = DynaKube::new("dk", serde_json::from_value(spec).expect("valid spec"));
    dk.metadata.namespace = Some(NAMESPACE.to_string());
    dk.metadata.uid = Some(DYNAKUBE_UID.to_string());
    dk
}

pub fn dynakube(capabilities: &[&str]) -> DynaKube {
    dynakube_with_spec(serde_json::json!({
        "apiUrl": "https://abc12345.live.dynatrace.com/api",
        "activeGate": { "capabilities": capabilities, "replicas": 1 },
    }))
}

pub fn seeded_cluster() -> MemoryCluster {
    let cluster = MemoryCluster::new();
    cluster.add_namespace("kube-system", Some(KUBE_SYSTEM_UID), Some("Active"));
    cluster.add_namespace(NAMESPACE, Some("dynatrace-uid"), Some("Active"));
    cluster
}

#[derive(Debug, Default)]
pub struct FakeDynatraceClient {
    pub token_requests: AtomicUsize,
    pub connection_info_requests: AtomicUsize,
}

impl FakeDynatraceClient {
    pub fn token_requests(&self) -> usize {
        self.token_requests.load(Ordering::SeqCst)
    }

    pub fn connection_info_requests(&self) -> usize {
        self.connection_info_requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DynatraceClient for FakeDynatraceClient {
    async fn get_activegate_auth_token(
        &self,
        _dynakube_name: &str,
    ) -> Result<ActiveGateAuthToken, DtClientError> {
        let count = self.token_requests.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(ActiveGateAuthToken {
            id: format!("token-{count}"),
            token: format!("dt0g02.integration-{count}"),
            expiration_date: None,
        })
    }

    async fn get_activegate_connection_info(
        &self,
    ) -> Result<ActiveGateConnectionInfo, DtClientError> {
        self.connection_info_requests.fetch_add(1, Ordering::SeqCst);
        Ok(ActiveGateConnectionInfo {
            tenant_uuid: "abc12345".to_string(),
            tenant_token: "tenant-token".to_string(),
            communication_endpoints: vec!["https://abc12345.live.dynatrace.com:443".to_string()],
        })
    }
}

/// One full reconcile pass with default configuration
pub async fn reconcile(
    cluster: &MemoryCluster,
    dtc: &FakeDynatraceClient,
    dk: &mut DynaKube,
) -> Result<(), ReconcileError> {
    let config = ControllerConfig::default();
    DynaKubeReconciler::new(Context::new(cluster, dtc, &config))
        .reconcile(dk)
        .await
}

pub fn gateway(cluster: &MemoryCluster) -> StatefulSet {
    cluster
        .snapshot(NAMESPACE, "dk-activegate")
        .expect("gateway statefulset exists")
}

pub fn first_container(sts: &StatefulSet) -> Container {
    sts.spec
        .as_ref()
        .and_then(|spec| spec.template.spec.as_ref())
        .map(|pod| pod.containers[0].clone())
        .expect("statefulset has a container")
}

pub fn env_value(container: &Container, name: &str) -> Option<String> {
    container
        .env
        .as_ref()?
        .iter()
        .find(|e| e.name == name)
        .and_then(|e| e.value.clone())
}

pub fn pod_annotation(sts: &StatefulSet, key: &str) -> Option<String> {
    sts.spec
        .as_ref()?
        .template
        .metadata
        .as_ref()?
        .annotations
        .as_ref()?
        .get(key)
        .cloned()
}
