//! Fixtures for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Container;

use crate::crd::DynaKube;
use crate::dtclient::{ActiveGateAuthToken, ActiveGateConnectionInfo, DtClientError, DynatraceClient};
use crate::kubeobjects::MemoryCluster;

pub const NAMESPACE: &str = "dynatrace";
pub const KUBE_SYSTEM_UID: &str = "kube-system-uid";

pub fn dynakube() -> DynaKube {
    let mut dk = DynaKube::new(
        "dk",
        serde_json::from_value(serde_json::json!({
            "apiUrl": "https://abc12345.live.dynatrace.com/api"
        }))
        .unwrap(),
    );
    dk.metadata.namespace = Some(NAMESPACE.to_string());
    dk.metadata.uid = Some("dk-uid".to_string());
    dk
}

pub fn dynakube_with_activegate(capabilities: &[&str]) -> DynaKube {
    let mut dk = dynakube();
    dk.spec.active_gate = Some(serde_json::from_value(serde_json::json!({
        "capabilities": capabilities,
    })).unwrap());
    dk
}

pub fn cluster() -> MemoryCluster {
    let cluster = MemoryCluster::new();
    cluster.add_namespace("kube-system", Some(KUBE_SYSTEM_UID), Some("Active"));
    cluster.add_namespace(NAMESPACE, Some("dynatrace-uid"), Some("Active"));
    cluster
}

/// Plain value of the env var `name`
pub fn env_value(container: &Container, name: &str) -> Option<String> {
    container
        .env
        .as_ref()?
        .iter()
        .find(|e| e.name == name)
        .and_then(|e| e.value.clone())
}

/// Issues a fresh token per call and counts requests
#[derive(Debug, Default)]
pub struct FakeDynatraceClient {
    pub token_requests: AtomicUsize,
    pub connection_info_requests: AtomicUsize,
    pub fail: bool,
    /// Connection info without a tenant UUID
    pub tenant_pending: bool,
}

impl FakeDynatraceClient {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn tenant_pending() -> Self {
        Self {
            tenant_pending: true,
            ..Self::default()
        }
    }

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
        if self.fail {
            return Err(DtClientError::Server {
                code: 401,
                message: "Token Authentication failed".to_string(),
            });
        }
        let count = self.token_requests.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(ActiveGateAuthToken {
            id: format!("token-{count}"),
            token: format!("dt0g02.auth-token-{count}"),
            expiration_date: None,
        })
    }

    async fn get_activegate_connection_info(
        &self,
    ) -> Result<ActiveGateConnectionInfo, DtClientError> {
        if self.fail {
            return Err(DtClientError::Server {
                code: 401,
                message: "Token Authentication failed".to_string(),
            });
        }
        self.connection_info_requests.fetch_add(1, Ordering::SeqCst);
        if self.tenant_pending {
            return Ok(ActiveGateConnectionInfo {
                tenant_uuid: String::new(),
                tenant_token: String::new(),
                communication_endpoints: Vec::new(),
            });
        }
        Ok(ActiveGateConnectionInfo {
            tenant_uuid: "abc12345".to_string(),
            tenant_token: "tenant-token".to_string(),
            communication_endpoints: vec![
                "https://abc12345.live.dynatrace.com:443".to_string(),
                "https://10.0.0.1:9999".to_string(),
            ],
        })
    }
}
