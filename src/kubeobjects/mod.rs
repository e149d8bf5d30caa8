//! # Kubernetes Object Helpers
//!
//! Shared plumbing for the reconcilers: the cluster client seam, typed
//! create-or-update queries, hashing, labels, the environment priority map,
//! the modifier-driven builder and scheduling defaults.

pub mod builder;
pub mod client;
pub mod hasher;
pub mod labels;
pub mod memory;
pub mod prioritymap;
pub mod query;
pub mod scheduling;
pub mod time;

pub use client::{ClientError, ClusterClient, KubeCluster, KubeObject};
pub use memory::MemoryCluster;
