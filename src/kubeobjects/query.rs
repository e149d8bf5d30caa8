//! # Query
//!
//! Typed create-or-update-or-recreate against the cluster.
//!
//! ## Algorithm
//!
//! `create_or_update` observes the current object and then:
//!
//! 1. creates it when absent,
//! 2. does nothing when `is_equal(current, desired)` holds,
//! 3. deletes and recreates it when `must_recreate(current, desired)` holds
//!    (immutable fields such as label selectors),
//! 4. otherwise replaces it in place, carrying over UID and resource version.
//!
//! Conflicts are not retried here; they surface to the caller so the host
//! runtime can requeue.

use std::fmt;

use k8s_openapi::api::apps::v1::{DaemonSet, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Secret, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};
use tracing::{debug, info};

use super::client::{ClientError, ClusterClient, KubeObject};
use super::hasher::{self, template_hashes_equal};
use crate::constants::ANNOTATION_PVC_TEMPLATE_HASH;
use crate::observability::metrics;

pub type Predicate<K> = fn(&K, &K) -> bool;

pub struct Query<'a, K, C> {
    client: &'a C,
    owner: Option<OwnerReference>,
    is_equal: Predicate<K>,
    must_recreate: Predicate<K>,
}

impl<K, C> fmt::Debug for Query<'_, K, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("owner", &self.owner.as_ref().map(|o| &o.name))
            .finish_non_exhaustive()
    }
}

fn never<K>(_current: &K, _desired: &K) -> bool {
    false
}

impl<'a, K: KubeObject, C: ClusterClient> Query<'a, K, C> {
    pub fn new(client: &'a C, is_equal: Predicate<K>, must_recreate: Predicate<K>) -> Self {
        Self {
            client,
            owner: None,
            is_equal,
            must_recreate,
        }
    }

    /// Attach a controller owner reference to every written object
    #[must_use]
    pub fn with_owner<O: Resource<DynamicType = ()>>(mut self, owner: &O) -> Self {
        self.owner = owner.controller_owner_ref(&());
        if self.owner.is_none() {
            debug!("owner has no uid yet; objects are written without owner reference");
        }
        self
    }

    pub async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>, ClientError> {
        self.client.get(namespace, name).await
    }

    fn prepare(&self, obj: &mut K) -> Result<(), ClientError> {
        if let Some(owner) = &self.owner {
            let references = obj.owner_references_mut();
            references.retain(|r| r.uid != owner.uid);
            references.push(owner.clone());
        }
        if hasher::template_hash(obj).is_none() {
            hasher::add_template_hash(obj)?;
        }
        Ok(())
    }

    pub async fn create(&self, mut obj: K) -> Result<K, ClientError> {
        self.prepare(&mut obj)?;
        let created = self.client.create(&obj).await?;
        info!(kind = %K::kind(&()), name = %created.name_any(), "created");
        metrics::record_object_applied(&K::kind(&()), "create");
        Ok(created)
    }

    /// Replace `desired`, keeping identity from `current`
    pub async fn update(&self, current: &K, mut desired: K) -> Result<K, ClientError> {
        self.prepare(&mut desired)?;
        desired.meta_mut().uid.clone_from(&current.meta().uid);
        desired
            .meta_mut()
            .resource_version
            .clone_from(&current.meta().resource_version);
        let updated = self.client.replace(&desired).await?;
        info!(kind = %K::kind(&()), name = %updated.name_any(), "updated");
        metrics::record_object_applied(&K::kind(&()), "update");
        Ok(updated)
    }

    /// Delete; a missing object is not an error
    pub async fn delete(&self, namespace: &str, name: &str) -> Result<(), ClientError> {
        match self.client.delete::<K>(namespace, name).await {
            Ok(()) => {
                info!(kind = %K::kind(&()), %name, "deleted");
                metrics::record_object_applied(&K::kind(&()), "delete");
                Ok(())
            }
            Err(err) if err.is_not_found() => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Returns whether the cluster was changed
    pub async fn create_or_update(&self, mut desired: K) -> Result<bool, ClientError> {
        self.prepare(&mut desired)?;
        let namespace = desired.namespace().unwrap_or_default();
        let name = desired.name_any();

        let Some(current) = self.get(&namespace, &name).await? else {
            self.create(desired).await?;
            return Ok(true);
        };

        if (self.is_equal)(&current, &desired) {
            debug!(kind = %K::kind(&()), %name, "unchanged");
            return Ok(false);
        }

        if (self.must_recreate)(&current, &desired) {
            info!(kind = %K::kind(&()), %name, "immutable field changed, recreating");
            self.delete(&namespace, &name).await?;
            desired.meta_mut().resource_version = None;
            desired.meta_mut().uid = None;
            self.create(desired).await?;
            return Ok(true);
        }

        self.update(&current, desired).await?;
        Ok(true)
    }

    /// Fan out to every namespace that is not terminating; errors are collected
    pub async fn create_or_update_for_namespaces(
        &self,
        desired: &K,
        namespaces: &[Namespace],
    ) -> Result<(), ClientError> {
        let mut errors = Vec::new();
        for namespace in namespaces.iter().filter(|ns| !is_terminating(ns)) {
            let mut obj = desired.clone();
            obj.meta_mut().namespace = Some(namespace.name_any());
            if let Err(err) = self.create_or_update(obj).await {
                errors.push(err);
            }
        }
        ClientError::aggregate(errors).map_or(Ok(()), Err)
    }

    pub async fn delete_for_namespaces(
        &self,
        name: &str,
        namespaces: &[Namespace],
    ) -> Result<(), ClientError> {
        let mut errors = Vec::new();
        for namespace in namespaces {
            if let Err(err) = self.delete(&namespace.name_any(), name).await {
                errors.push(err);
            }
        }
        ClientError::aggregate(errors).map_or(Ok(()), Err)
    }
}

fn is_terminating(namespace: &Namespace) -> bool {
    namespace
        .status
        .as_ref()
        .and_then(|status| status.phase.as_deref())
        == Some("Terminating")
}

fn statefulset_selector_changed(current: &StatefulSet, desired: &StatefulSet) -> bool {
    let labels = |sts: &StatefulSet| {
        sts.spec
            .as_ref()
            .and_then(|spec| spec.selector.match_labels.clone())
    };
    labels(current) != labels(desired)
}

fn daemonset_selector_changed(current: &DaemonSet, desired: &DaemonSet) -> bool {
    let labels = |ds: &DaemonSet| {
        ds.spec
            .as_ref()
            .and_then(|spec| spec.selector.match_labels.clone())
    };
    labels(current) != labels(desired)
}

/// Selector or volume-claim templates changed; both are immutable
pub fn extensions_must_recreate(current: &StatefulSet, desired: &StatefulSet) -> bool {
    let pvc_hash = |sts: &StatefulSet| {
        sts.annotations()
            .get(ANNOTATION_PVC_TEMPLATE_HASH)
            .cloned()
    };
    statefulset_selector_changed(current, desired) || pvc_hash(current) != pvc_hash(desired)
}

pub fn statefulsets<C: ClusterClient>(client: &C) -> Query<'_, StatefulSet, C> {
    Query::new(client, template_hashes_equal, statefulset_selector_changed)
}

pub fn daemonsets<C: ClusterClient>(client: &C) -> Query<'_, DaemonSet, C> {
    Query::new(client, template_hashes_equal, daemonset_selector_changed)
}

pub fn services<C: ClusterClient>(client: &C) -> Query<'_, Service, C> {
    Query::new(client, template_hashes_equal, never)
}

pub fn secrets<C: ClusterClient>(client: &C) -> Query<'_, Secret, C> {
    Query::new(client, template_hashes_equal, never)
}

pub fn config_maps<C: ClusterClient>(client: &C) -> Query<'_, ConfigMap, C> {
    Query::new(client, template_hashes_equal, never)
}
