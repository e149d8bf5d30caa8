//! # Cluster Client
//!
//! The seam between reconcilers and the Kubernetes API. Reconcilers are
//! generic over [`ClusterClient`]; production uses [`KubeCluster`], tests use
//! [`super::memory::MemoryCluster`].

use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::NamespaceResourceScope;
use kube::{
    api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams},
    Client, Resource,
};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::constants::FIELD_MANAGER;

/// Any namespaced, statically typed Kubernetes object
pub trait KubeObject:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<T> KubeObject for T where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: String,
        namespace: String,
        name: String,
    },
    #[error("conflict on {kind} {namespace}/{name}: {message}")]
    Conflict {
        kind: String,
        namespace: String,
        name: String,
        message: String,
    },
    #[error("object is missing metadata.{0}")]
    MissingField(&'static str),
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("{count} operations failed: {summary}")]
    Aggregate { count: usize, summary: String },
    #[error("injected failure on {kind} {namespace}/{name}")]
    Injected {
        kind: String,
        namespace: String,
        name: String,
    },
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ClientError::Conflict { .. })
    }

    /// Fold several errors into one, or `None` when there are none
    pub fn aggregate(errors: Vec<ClientError>) -> Option<ClientError> {
        if errors.is_empty() {
            return None;
        }
        let summary = errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        Some(ClientError::Aggregate {
            count: errors.len(),
            summary,
        })
    }
}

#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// `Ok(None)` when the object does not exist
    async fn get<K: KubeObject>(&self, namespace: &str, name: &str)
        -> Result<Option<K>, ClientError>;

    async fn create<K: KubeObject>(&self, obj: &K) -> Result<K, ClientError>;

    /// Full replace; a stale `resourceVersion` yields [`ClientError::Conflict`]
    async fn replace<K: KubeObject>(&self, obj: &K) -> Result<K, ClientError>;

    async fn delete<K: KubeObject>(&self, namespace: &str, name: &str) -> Result<(), ClientError>;

    /// JSON merge patch of the status subresource
    async fn patch_status<K: KubeObject>(
        &self,
        namespace: &str,
        name: &str,
        status: &serde_json::Value,
    ) -> Result<(), ClientError>;

    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>, ClientError>;

    async fn list_namespaces(&self) -> Result<Vec<Namespace>, ClientError>;
}

pub(crate) fn object_ref<K: KubeObject>(obj: &K) -> Result<(String, String), ClientError> {
    let namespace = obj
        .meta()
        .namespace
        .clone()
        .ok_or(ClientError::MissingField("namespace"))?;
    let name = obj
        .meta()
        .name
        .clone()
        .ok_or(ClientError::MissingField("name"))?;
    Ok((namespace, name))
}

/// [`ClusterClient`] backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl Debug for KubeCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeCluster").finish_non_exhaustive()
    }
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K: KubeObject>(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn map_error<K: KubeObject>(err: kube::Error, namespace: &str, name: &str) -> ClientError {
    match err {
        kube::Error::Api(api_err) if api_err.code == 404 => ClientError::NotFound {
            kind: K::kind(&()).to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        },
        kube::Error::Api(api_err) if api_err.code == 409 => ClientError::Conflict {
            kind: K::kind(&()).to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
            message: api_err.message,
        },
        other => ClientError::Api(other),
    }
}

#[async_trait]
impl ClusterClient for KubeCluster {
    async fn get<K: KubeObject>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<K>, ClientError> {
        self.api::<K>(namespace)
            .get_opt(name)
            .await
            .map_err(|e| map_error::<K>(e, namespace, name))
    }

    async fn create<K: KubeObject>(&self, obj: &K) -> Result<K, ClientError> {
        let (namespace, name) = object_ref(obj)?;
        debug!(kind = %K::kind(&()), %namespace, %name, "creating object");
        self.api::<K>(&namespace)
            .create(&PostParams::default(), obj)
            .await
            .map_err(|e| map_error::<K>(e, &namespace, &name))
    }

    async fn replace<K: KubeObject>(&self, obj: &K) -> Result<K, ClientError> {
        let (namespace, name) = object_ref(obj)?;
        debug!(kind = %K::kind(&()), %namespace, %name, "replacing object");
        self.api::<K>(&namespace)
            .replace(&name, &PostParams::default(), obj)
            .await
            .map_err(|e| map_error::<K>(e, &namespace, &name))
    }

    async fn delete<K: KubeObject>(&self, namespace: &str, name: &str) -> Result<(), ClientError> {
        debug!(kind = %K::kind(&()), %namespace, %name, "deleting object");
        self.api::<K>(namespace)
            .delete(name, &DeleteParams::background())
            .await
            .map(|_| ())
            .map_err(|e| map_error::<K>(e, namespace, name))
    }

    async fn patch_status<K: KubeObject>(
        &self,
        namespace: &str,
        name: &str,
        status: &serde_json::Value,
    ) -> Result<(), ClientError> {
        let patch = serde_json::json!({ "status": status });
        self.api::<K>(namespace)
            .patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await
            .map(|_| ())
            .map_err(|e| map_error::<K>(e, namespace, name))
    }

    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>, ClientError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        Ok(api.get_opt(name).await?)
    }

    async fn list_namespaces(&self) -> Result<Vec<Namespace>, ClientError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_empty_is_none() {
        assert!(ClientError::aggregate(Vec::new()).is_none());
    }

    #[test]
    fn test_aggregate_joins_messages() {
        let errors = vec![
            ClientError::MissingField("name"),
            ClientError::NotFound {
                kind: "Secret".to_string(),
                namespace: "ns".to_string(),
                name: "s".to_string(),
            },
        ];
        let err = ClientError::aggregate(errors).unwrap();
        assert_eq!(
            err.to_string(),
            "2 operations failed: object is missing metadata.name; Secret ns/s not found"
        );
    }

    #[test]
    fn test_predicates() {
        let not_found = ClientError::NotFound {
            kind: "Service".to_string(),
            namespace: "ns".to_string(),
            name: "svc".to_string(),
        };
        assert!(not_found.is_not_found());
        assert!(!not_found.is_conflict());
    }
}
