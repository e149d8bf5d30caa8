//! # Observability
//!
//! Reconcile, object-write, token-rotation and certificate-renewal counters
//! exported through the `/metrics` endpoint of [`crate::server`].

pub mod metrics;
