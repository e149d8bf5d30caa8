//! Mounts the ActiveGate auth token as a single file.

use kube::ResourceExt;

use super::{mount, secret_volume};
use crate::controller::activegate::consts::{
    auth_token_secret_name, AUTH_TOKEN_KEY, AUTH_TOKEN_MOUNT_PATH, AUTH_TOKEN_VOLUME,
};
use crate::controller::activegate::statefulset::GatewayDraft;
use crate::crd::DynaKube;
use crate::kubeobjects::builder::{BuildError, Modifier};

#[derive(Debug)]
pub struct AuthTokenModifier {
    secret_name: String,
    enabled: bool,
}

impl AuthTokenModifier {
    pub fn new(dk: &DynaKube) -> Self {
        Self {
            secret_name: auth_token_secret_name(&dk.name_any()),
            enabled: dk.spec.active_gate.is_some(),
        }
    }
}

impl Modifier<GatewayDraft> for AuthTokenModifier {
    fn enabled(&self) -> bool {
        self.enabled
    }

    fn modify(&self, draft: &mut GatewayDraft) -> Result<(), BuildError> {
        draft.add_volume(secret_volume(AUTH_TOKEN_VOLUME, &self.secret_name, None))?;
        draft.add_mount(mount(
            AUTH_TOKEN_VOLUME,
            AUTH_TOKEN_MOUNT_PATH,
            Some(AUTH_TOKEN_KEY),
            true,
        ))
    }
}
