//! # In-Memory Cluster
//!
//! A [`ClusterClient`] that keeps objects in process memory. It mimics the
//! parts of the API server the reconcilers rely on: UIDs, resource versions
//! with optimistic concurrency on replace, creation timestamps and Service
//! cluster IPs. Every write is recorded so tests can assert on the sequence
//! of operations, and writes to a named object can be made to fail.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde_json::{json, Value};

use super::client::{object_ref, ClientError, ClusterClient, KubeObject};
use super::time::format_rfc3339;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Create,
    Replace,
    Delete,
    PatchStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub kind: OperationKind,
    pub object_kind: String,
    pub namespace: String,
    pub name: String,
}

type ObjectKey = (String, String, String);

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<ObjectKey, Value>,
    namespaces: BTreeMap<String, Namespace>,
    operations: Vec<Operation>,
    failures: BTreeSet<(String, String)>,
    resource_version: u64,
    next_ip: u32,
}

impl State {
    fn next_resource_version(&mut self) -> String {
        self.resource_version += 1;
        self.resource_version.to_string()
    }

    fn next_cluster_ip(&mut self) -> String {
        self.next_ip += 1;
        format!("10.96.{}.{}", self.next_ip / 250, self.next_ip % 250 + 1)
    }

    fn check_failure(&self, kind: &str, namespace: &str, name: &str) -> Result<(), ClientError> {
        if self.failures.contains(&(kind.to_string(), name.to_string())) {
            return Err(ClientError::Injected {
                kind: kind.to_string(),
                namespace: namespace.to_string(),
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn record(&mut self, kind: OperationKind, object_kind: &str, namespace: &str, name: &str) {
        self.operations.push(Operation {
            kind,
            object_kind: object_kind.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
    }
}

#[derive(Debug, Default)]
pub struct MemoryCluster {
    state: Mutex<State>,
}

fn kind_of<K: KubeObject>() -> String {
    K::kind(&()).to_string()
}

/// RFC 7386 JSON merge patch
fn merge_patch(target: &mut Value, patch: &Value) {
    match patch {
        Value::Object(entries) => {
            if !target.is_object() {
                *target = json!({});
            }
            if let Value::Object(target_entries) = target {
                for (key, value) in entries {
                    if value.is_null() {
                        target_entries.remove(key);
                    } else {
                        merge_patch(
                            target_entries.entry(key.clone()).or_insert(Value::Null),
                            value,
                        );
                    }
                }
            }
        }
        other => *target = other.clone(),
    }
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a namespace, optionally with a UID and phase
    pub fn add_namespace(&self, name: &str, uid: Option<&str>, phase: Option<&str>) {
        let namespace = Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                uid: uid.map(str::to_string),
                ..ObjectMeta::default()
            },
            status: phase.map(|phase| k8s_openapi::api::core::v1::NamespaceStatus {
                phase: Some(phase.to_string()),
                ..Default::default()
            }),
            ..Namespace::default()
        };
        self.lock().namespaces.insert(name.to_string(), namespace);
    }

    /// Seed an object exactly as given, without recording an operation.
    /// A missing resource version is filled in.
    pub fn insert<K: KubeObject>(&self, obj: &K) -> Result<(), ClientError> {
        let (namespace, name) = object_ref(obj)?;
        let mut state = self.lock();
        let mut value = serde_json::to_value(obj)?;
        if value["metadata"]["resourceVersion"].is_null() {
            value["metadata"]["resourceVersion"] = Value::String(state.next_resource_version());
        }
        state.objects.insert((kind_of::<K>(), namespace, name), value);
        Ok(())
    }

    /// Read an object without going through the async client
    pub fn snapshot<K: KubeObject>(&self, namespace: &str, name: &str) -> Option<K> {
        let state = self.lock();
        state
            .objects
            .get(&(kind_of::<K>(), namespace.to_string(), name.to_string()))
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// All stored objects of one kind
    pub fn list<K: KubeObject>(&self) -> Vec<K> {
        let kind = kind_of::<K>();
        self.lock()
            .objects
            .iter()
            .filter(|((k, _, _), _)| *k == kind)
            .filter_map(|(_, value)| serde_json::from_value(value.clone()).ok())
            .collect()
    }

    /// Make every write to the named object fail
    pub fn fail_writes_for<K: KubeObject>(&self, name: &str) {
        self.lock()
            .failures
            .insert((kind_of::<K>(), name.to_string()));
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    pub fn operations(&self) -> Vec<Operation> {
        self.lock().operations.clone()
    }

    /// Recorded writes, excluding status patches
    pub fn object_writes(&self) -> Vec<Operation> {
        self.operations()
            .into_iter()
            .filter(|op| op.kind != OperationKind::PatchStatus)
            .collect()
    }

    pub fn clear_operations(&self) {
        self.lock().operations.clear();
    }
}

#[async_trait]
impl ClusterClient for MemoryCluster {
    async fn get<K: KubeObject>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<K>, ClientError> {
        let state = self.lock();
        match state
            .objects
            .get(&(kind_of::<K>(), namespace.to_string(), name.to_string()))
        {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    async fn create<K: KubeObject>(&self, obj: &K) -> Result<K, ClientError> {
        let (namespace, name) = object_ref(obj)?;
        let kind = kind_of::<K>();
        let mut state = self.lock();
        state.check_failure(&kind, &namespace, &name)?;

        let key = (kind.clone(), namespace.clone(), name.clone());
        if state.objects.contains_key(&key) {
            return Err(ClientError::Conflict {
                kind,
                namespace,
                name,
                message: "already exists".to_string(),
            });
        }

        let mut value = serde_json::to_value(obj)?;
        value["metadata"]["uid"] = Value::String(uuid::Uuid::new_v4().to_string());
        value["metadata"]["resourceVersion"] = Value::String(state.next_resource_version());
        value["metadata"]["creationTimestamp"] = Value::String(format_rfc3339(Utc::now()));
        if kind == "Service" {
            let ip_missing = value["spec"]["clusterIP"]
                .as_str()
                .map_or(true, str::is_empty);
            if ip_missing {
                let ip = state.next_cluster_ip();
                value["spec"]["clusterIP"] = Value::String(ip.clone());
                value["spec"]["clusterIPs"] = json!([ip]);
            }
        }

        state.record(OperationKind::Create, &kind, &namespace, &name);
        state.objects.insert(key, value.clone());
        Ok(serde_json::from_value(value)?)
    }

    async fn replace<K: KubeObject>(&self, obj: &K) -> Result<K, ClientError> {
        let (namespace, name) = object_ref(obj)?;
        let kind = kind_of::<K>();
        let mut state = self.lock();
        state.check_failure(&kind, &namespace, &name)?;

        let key = (kind.clone(), namespace.clone(), name.clone());
        let Some(stored) = state.objects.get(&key).cloned() else {
            return Err(ClientError::NotFound {
                kind,
                namespace,
                name,
            });
        };

        let mut value = serde_json::to_value(obj)?;
        let stored_version = stored["metadata"]["resourceVersion"].clone();
        let given_version = &value["metadata"]["resourceVersion"];
        if !given_version.is_null() && *given_version != stored_version {
            return Err(ClientError::Conflict {
                kind,
                namespace,
                name,
                message: "the object has been modified".to_string(),
            });
        }

        for field in ["uid", "creationTimestamp"] {
            value["metadata"][field] = stored["metadata"][field].clone();
        }
        if kind == "Service" && value["spec"]["clusterIP"].is_null() {
            value["spec"]["clusterIP"] = stored["spec"]["clusterIP"].clone();
            value["spec"]["clusterIPs"] = stored["spec"]["clusterIPs"].clone();
        }
        if !stored["status"].is_null() {
            value["status"] = stored["status"].clone();
        }
        value["metadata"]["resourceVersion"] = Value::String(state.next_resource_version());

        state.record(OperationKind::Replace, &kind, &namespace, &name);
        state.objects.insert(key, value.clone());
        Ok(serde_json::from_value(value)?)
    }

    async fn delete<K: KubeObject>(&self, namespace: &str, name: &str) -> Result<(), ClientError> {
        let kind = kind_of::<K>();
        let mut state = self.lock();
        state.check_failure(&kind, namespace, name)?;
        let key = (kind.clone(), namespace.to_string(), name.to_string());
        if state.objects.remove(&key).is_none() {
            return Err(ClientError::NotFound {
                kind,
                namespace: namespace.to_string(),
                name: name.to_string(),
            });
        }
        state.record(OperationKind::Delete, &kind, namespace, name);
        Ok(())
    }

    async fn patch_status<K: KubeObject>(
        &self,
        namespace: &str,
        name: &str,
        status: &Value,
    ) -> Result<(), ClientError> {
        let kind = kind_of::<K>();
        let mut state = self.lock();
        let key = (kind.clone(), namespace.to_string(), name.to_string());
        let Some(stored) = state.objects.get_mut(&key) else {
            return Err(ClientError::NotFound {
                kind,
                namespace: namespace.to_string(),
                name: name.to_string(),
            });
        };
        merge_patch(stored, &json!({ "status": status }));
        state.record(OperationKind::PatchStatus, &kind, namespace, name);
        Ok(())
    }

    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>, ClientError> {
        Ok(self.lock().namespaces.get(name).cloned())
    }

    async fn list_namespaces(&self) -> Result<Vec<Namespace>, ClientError> {
        Ok(self.lock().namespaces.values().cloned().collect())
    }
}
