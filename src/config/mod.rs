//! # Configuration
//!
//! Operator-level settings. Per-resource settings live on the `DynaKube` itself.

mod controller;

pub use controller::ControllerConfig;
