//! Mounts the parsed proxy settings as four files.

use kube::ResourceExt;

use super::{mount, secret_volume};
use crate::controller::activegate::consts::{
    proxy_secret_name, PROXY_HOST_KEY, PROXY_MOUNT_DIR, PROXY_PASSWORD_KEY, PROXY_PORT_KEY,
    PROXY_USERNAME_KEY, PROXY_VOLUME,
};
use crate::controller::activegate::statefulset::GatewayDraft;
use crate::crd::DynaKube;
use crate::kubeobjects::builder::{BuildError, Modifier};

#[derive(Debug)]
pub struct ProxyModifier {
    enabled: bool,
    secret_name: String,
}

impl ProxyModifier {
    pub fn new(dk: &DynaKube) -> Self {
        Self {
            enabled: dk.has_proxy(),
            secret_name: proxy_secret_name(&dk.name_any()),
        }
    }
}

impl Modifier<GatewayDraft> for ProxyModifier {
    fn enabled(&self) -> bool {
        self.enabled
    }

    fn modify(&self, draft: &mut GatewayDraft) -> Result<(), BuildError> {
        draft.add_volume(secret_volume(PROXY_VOLUME, &self.secret_name, None))?;
        for key in [PROXY_HOST_KEY, PROXY_PORT_KEY, PROXY_USERNAME_KEY, PROXY_PASSWORD_KEY] {
            draft.add_mount(mount(
                PROXY_VOLUME,
                &format!("{PROXY_MOUNT_DIR}/{key}"),
                Some(key),
                true,
            ))?;
        }
        Ok(())
    }
}
