//! Kubernetes monitoring: an init container converts the in-cluster CA into
//! a Java trust store that replaces the gateway's `cacerts`.
//!
//! Runs last so the init container can reuse the writable mounts of a
//! read-only gateway.

use k8s_openapi::api::core::v1::{Container, VolumeMount};

use super::{empty_dir, mount};
use crate::controller::activegate::capability::{Capability, MultiCapability};
use crate::controller::activegate::consts::{
    CACERTS_PATH, CERTIFICATE_LOADER_CONTAINER, K8S_CRT2JKS_SCRIPT, K8S_CRT2JKS_WORKING_DIR,
    READ_ONLY_VOLUMES, SSL_MOUNT_PATH, TRUSTSTORE_FILE, TRUSTSTORE_VOLUME,
};
use crate::controller::activegate::statefulset::builder::security_context;
use crate::controller::activegate::statefulset::GatewayDraft;
use crate::kubeobjects::builder::{BuildError, Modifier};

#[derive(Debug)]
pub struct KubeMonModifier {
    enabled: bool,
}

impl KubeMonModifier {
    pub fn new(capability: &MultiCapability) -> Self {
        Self {
            enabled: capability.has(Capability::KubernetesMonitoring),
        }
    }
}

fn read_only_mounts(container: &Container) -> Vec<VolumeMount> {
    container
        .volume_mounts
        .iter()
        .flatten()
        .filter(|m| READ_ONLY_VOLUMES.iter().any(|(name, _)| *name == m.name))
        .cloned()
        .collect()
}

impl Modifier<GatewayDraft> for KubeMonModifier {
    fn enabled(&self) -> bool {
        self.enabled
    }

    fn modify(&self, draft: &mut GatewayDraft) -> Result<(), BuildError> {
        let primary = draft
            .container()
            .cloned()
            .ok_or_else(|| BuildError::Invalid("gateway container missing".to_string()))?;
        let read_only = primary
            .security_context
            .as_ref()
            .and_then(|sc| sc.read_only_root_filesystem)
            .unwrap_or(false);

        let mut mounts = vec![mount(TRUSTSTORE_VOLUME, SSL_MOUNT_PATH, None, false)];
        mounts.extend(read_only_mounts(&primary));

        let init = Container {
            name: CERTIFICATE_LOADER_CONTAINER.to_string(),
            image: primary.image.clone(),
            image_pull_policy: primary.image_pull_policy.clone(),
            working_dir: Some(K8S_CRT2JKS_WORKING_DIR.to_string()),
            command: Some(vec!["/bin/bash".to_string()]),
            args: Some(vec!["-c".to_string(), K8S_CRT2JKS_SCRIPT.to_string()]),
            volume_mounts: Some(mounts),
            resources: primary.resources.clone(),
            security_context: Some(security_context(read_only)),
            ..Container::default()
        };

        draft.add_volume(empty_dir(TRUSTSTORE_VOLUME))?;
        draft.add_mount(mount(
            TRUSTSTORE_VOLUME,
            CACERTS_PATH,
            Some(TRUSTSTORE_FILE),
            true,
        ))?;
        let pod = draft.pod_spec_mut()?;
        pod.init_containers.get_or_insert_with(Vec::new).push(init);
        pod.automount_service_account_token = Some(true);
        Ok(())
    }
}
