//! Connection settings for the raw gateway image: tenant UUID and
//! communication endpoints from the connection-info ConfigMap, and the tenant
//! token Secret as a file.

use kube::ResourceExt;

use super::{mount, secret_volume};
use crate::controller::activegate::consts::{
    connection_info_config_map_name, tenant_secret_name, COMMUNICATION_ENDPOINTS_KEY,
    ENV_DT_SERVER, ENV_DT_TENANT, TENANT_TOKEN_KEY, TENANT_TOKEN_MOUNT_PATH, TENANT_TOKEN_VOLUME,
    TENANT_UUID_KEY,
};
use crate::controller::activegate::statefulset::builder::config_map_ref;
use crate::controller::activegate::statefulset::GatewayDraft;
use crate::crd::DynaKube;
use crate::kubeobjects::builder::{BuildError, Modifier};
use crate::kubeobjects::prioritymap::Priority;

#[derive(Debug)]
pub struct RawImageModifier {
    dynakube: String,
}

impl RawImageModifier {
    pub fn new(dk: &DynaKube) -> Self {
        Self {
            dynakube: dk.name_any(),
        }
    }
}

impl Modifier<GatewayDraft> for RawImageModifier {
    fn enabled(&self) -> bool {
        true
    }

    fn modify(&self, draft: &mut GatewayDraft) -> Result<(), BuildError> {
        let config_map = connection_info_config_map_name(&self.dynakube);
        draft.env.insert(
            ENV_DT_TENANT,
            config_map_ref(config_map.clone(), TENANT_UUID_KEY),
            Priority::Default,
        );
        draft.env.insert(
            ENV_DT_SERVER,
            config_map_ref(config_map, COMMUNICATION_ENDPOINTS_KEY),
            Priority::Default,
        );

        draft.add_volume(secret_volume(
            TENANT_TOKEN_VOLUME,
            &tenant_secret_name(&self.dynakube),
            None,
        ))?;
        draft.add_mount(mount(
            TENANT_TOKEN_VOLUME,
            TENANT_TOKEN_MOUNT_PATH,
            Some(TENANT_TOKEN_KEY),
            true,
        ))
    }
}
