//! # DynaKube Operator
//!
//! Converges `DynaKube` custom resources into the workloads they describe:
//! the ActiveGate StatefulSet with its Secrets and Service, the extensions
//! controller, and the log module DaemonSet. Every owned object carries the
//! DynaKube as controller owner; progress is reported through conditions on
//! the DynaKube status.
//!
//! The binary in `main.rs` wires [`controller::run`] to a Kubernetes client.
//! Everything below [`controller`] works against the
//! [`kubeobjects::ClusterClient`] seam, so it runs unchanged against the
//! in-memory cluster used by the tests.

pub mod certificates;
pub mod conditions;
pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod dtclient;
pub mod kubeobjects;
pub mod observability;
pub mod server;
pub mod version;

#[cfg(test)]
mod test_support;
