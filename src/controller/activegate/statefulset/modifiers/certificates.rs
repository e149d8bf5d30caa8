//! Mounts the user-supplied TLS Secret of the gateway endpoint.

use super::{mount, secret_volume};
use crate::controller::activegate::consts::{TLS_MOUNT_PATH, TLS_VOLUME};
use crate::controller::activegate::statefulset::GatewayDraft;
use crate::crd::DynaKube;
use crate::kubeobjects::builder::{BuildError, Modifier};

#[derive(Debug)]
pub struct CertificatesModifier {
    secret_name: Option<String>,
}

impl CertificatesModifier {
    pub fn new(dk: &DynaKube) -> Self {
        Self {
            secret_name: dk.activegate_tls_secret_name().map(str::to_string),
        }
    }
}

impl Modifier<GatewayDraft> for CertificatesModifier {
    fn enabled(&self) -> bool {
        self.secret_name.is_some()
    }

    fn modify(&self, draft: &mut GatewayDraft) -> Result<(), BuildError> {
        let Some(secret_name) = self.secret_name.as_deref() else {
            return Ok(());
        };
        draft.add_volume(secret_volume(TLS_VOLUME, secret_name, None))?;
        draft.add_mount(mount(TLS_VOLUME, TLS_MOUNT_PATH, None, true))
    }
}
