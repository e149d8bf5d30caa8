//! # Reconcile Context
//!
//! Borrowed handles one reconcile pass hands to every subsystem.

use crate::config::ControllerConfig;
use crate::dtclient::DynatraceClient;

pub struct Context<'a, C> {
    pub client: &'a C,
    pub dtc: &'a dyn DynatraceClient,
    pub config: &'a ControllerConfig,
}

impl<C> Clone for Context<'_, C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for Context<'_, C> {}

impl<C> std::fmt::Debug for Context<'_, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<'a, C> Context<'a, C> {
    pub fn new(client: &'a C, dtc: &'a dyn DynatraceClient, config: &'a ControllerConfig) -> Self {
        Self {
            client,
            dtc,
            config,
        }
    }
}
