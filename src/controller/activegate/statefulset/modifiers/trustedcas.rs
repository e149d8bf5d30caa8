//! Projects the `certs` key of the trusted-CA ConfigMap as a single PEM file.

use k8s_openapi::api::core::v1::{ConfigMapVolumeSource, Volume};

use super::{key_to_path, mount};
use crate::controller::activegate::consts::{
    TRUSTED_CAS_FILE, TRUSTED_CAS_KEY, TRUSTED_CAS_MOUNT_PATH, TRUSTED_CAS_VOLUME,
};
use crate::controller::activegate::statefulset::GatewayDraft;
use crate::crd::DynaKube;
use crate::kubeobjects::builder::{BuildError, Modifier};

#[derive(Debug)]
pub struct TrustedCasModifier {
    config_map: Option<String>,
}

impl TrustedCasModifier {
    pub fn new(dk: &DynaKube) -> Self {
        Self {
            config_map: dk.trusted_cas().map(str::to_string),
        }
    }
}

impl Modifier<GatewayDraft> for TrustedCasModifier {
    fn enabled(&self) -> bool {
        self.config_map.is_some()
    }

    fn modify(&self, draft: &mut GatewayDraft) -> Result<(), BuildError> {
        let Some(config_map) = self.config_map.clone() else {
            return Ok(());
        };
        draft.add_volume(Volume {
            name: TRUSTED_CAS_VOLUME.to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: config_map,
                items: Some(vec![key_to_path(TRUSTED_CAS_KEY, TRUSTED_CAS_FILE)]),
                ..ConfigMapVolumeSource::default()
            }),
            ..Volume::default()
        })?;
        draft.add_mount(mount(
            TRUSTED_CAS_VOLUME,
            TRUSTED_CAS_MOUNT_PATH,
            Some(TRUSTED_CAS_FILE),
            true,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::test_support::dynakube_with_activegate;

    #[test]
    fn test_projects_certs_key() {
        let mut dk = dynakube_with_activegate(&["routing"]);
        dk.spec.trusted_cas = Some("my-cas".to_string());
        let mut draft = draft(&dk);
        apply(&TrustedCasModifier::new(&dk), &mut draft);

        let pod = draft.statefulset.spec.as_ref().unwrap().template.spec.as_ref().unwrap();
        let source = pod.volumes.as_ref().unwrap()[0].config_map.as_ref().unwrap();
        assert_eq!(source.name, "my-cas");
        let items = source.items.as_ref().unwrap();
        assert_eq!(items[0].key, "certs");
        assert_eq!(items[0].path, "rootca.pem");

        let mount = mount_of(draft.container().unwrap(), TRUSTED_CAS_VOLUME).unwrap();
        assert_eq!(mount.sub_path.as_deref(), Some("rootca.pem"));
    }
}
