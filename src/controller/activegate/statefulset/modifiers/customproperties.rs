//! Mounts `custom.properties`, either from the operator-generated Secret or
//! from the user's Secret named by `valueFrom`.

use kube::ResourceExt;

use super::{key_to_path, mount, secret_volume};
use crate::controller::activegate::capability::MultiCapability;
use crate::controller::activegate::consts::{
    custom_properties_secret_name, ACTIVEGATE_NAME, CUSTOM_PROPERTIES_FILE, CUSTOM_PROPERTIES_KEY,
    CUSTOM_PROPERTIES_MOUNT_PATH, CUSTOM_PROPERTIES_VOLUME,
};
use crate::controller::activegate::statefulset::GatewayDraft;
use crate::crd::DynaKube;
use crate::kubeobjects::builder::{BuildError, Modifier};

#[derive(Debug)]
pub struct CustomPropertiesModifier {
    secret_name: Option<String>,
}

impl CustomPropertiesModifier {
    pub fn new(dk: &DynaKube, capability: &MultiCapability) -> Self {
        let secret_name = capability
            .properties()
            .custom_properties
            .as_ref()
            .filter(|source| source.is_set())
            .map(|source| match source.secret_ref() {
                Some(name) => name.to_string(),
                None => custom_properties_secret_name(&dk.name_any(), ACTIVEGATE_NAME),
            });
        Self { secret_name }
    }
}

impl Modifier<GatewayDraft> for CustomPropertiesModifier {
    fn enabled(&self) -> bool {
        self.secret_name.is_some()
    }

    fn modify(&self, draft: &mut GatewayDraft) -> Result<(), BuildError> {
        let Some(secret_name) = self.secret_name.as_deref() else {
            return Ok(());
        };
        draft.add_volume(secret_volume(
            CUSTOM_PROPERTIES_VOLUME,
            secret_name,
            Some(vec![key_to_path(CUSTOM_PROPERTIES_KEY, CUSTOM_PROPERTIES_FILE)]),
        ))?;
        draft.add_mount(mount(
            CUSTOM_PROPERTIES_VOLUME,
            CUSTOM_PROPERTIES_MOUNT_PATH,
            Some(CUSTOM_PROPERTIES_FILE),
            false,
        ))
    }
}
