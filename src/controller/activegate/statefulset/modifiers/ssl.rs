//! Writable SSL directory for TLS material and the trusted CA bundle.

use super::{empty_dir, mount};
use crate::controller::activegate::consts::{SSL_MOUNT_PATH, SSL_VOLUME};
use crate::controller::activegate::statefulset::GatewayDraft;
use crate::crd::DynaKube;
use crate::kubeobjects::builder::{BuildError, Modifier};

#[derive(Debug)]
pub struct SslVolumeModifier {
    enabled: bool,
}

impl SslVolumeModifier {
    pub fn new(dk: &DynaKube) -> Self {
        Self {
            enabled: dk.activegate_tls_secret_name().is_some() || dk.trusted_cas().is_some(),
        }
    }
}

impl Modifier<GatewayDraft> for SslVolumeModifier {
    fn enabled(&self) -> bool {
        self.enabled
    }

    fn modify(&self, draft: &mut GatewayDraft) -> Result<(), BuildError> {
        draft.add_volume(empty_dir(SSL_VOLUME))?;
        draft.add_mount(mount(SSL_VOLUME, SSL_MOUNT_PATH, None, false))
    }
}
