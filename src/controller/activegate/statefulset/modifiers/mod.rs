//! # Gateway Modifiers
//!
//! Each modifier amends the [`GatewayDraft`] for one feature. The order of
//! [`all`] is significant: the read-only modifier adds the writable mounts
//! that the kube-monitoring init container copies.

mod authtoken;
mod certificates;
mod customproperties;
mod kubemon;
mod proxy;
mod rawimage;
mod readonly;
mod serviceport;
mod ssl;
mod trustedcas;

pub use authtoken::AuthTokenModifier;
pub use certificates::CertificatesModifier;
pub use customproperties::CustomPropertiesModifier;
pub use kubemon::KubeMonModifier;
pub use proxy::ProxyModifier;
pub use rawimage::RawImageModifier;
pub use readonly::ReadOnlyModifier;
pub use serviceport::ServicePortModifier;
pub use ssl::SslVolumeModifier;
pub use trustedcas::TrustedCasModifier;

use k8s_openapi::api::core::v1::{
    EmptyDirVolumeSource, KeyToPath, SecretVolumeSource, Volume, VolumeMount,
};

use super::builder::GatewayDraft;
use crate::controller::activegate::capability::MultiCapability;
use crate::crd::DynaKube;
use crate::kubeobjects::builder::Modifier;

/// Every gateway modifier in application order
pub fn all<'a>(
    dk: &'a DynaKube,
    capability: &'a MultiCapability,
) -> Vec<Box<dyn Modifier<GatewayDraft> + 'a>> {
    vec![
        Box::new(SslVolumeModifier::new(dk)),
        Box::new(CertificatesModifier::new(dk)),
        Box::new(TrustedCasModifier::new(dk)),
        Box::new(CustomPropertiesModifier::new(dk, capability)),
        Box::new(ProxyModifier::new(dk)),
        Box::new(RawImageModifier::new(dk)),
        Box::new(AuthTokenModifier::new(dk)),
        Box::new(ReadOnlyModifier::new(dk)),
        Box::new(ServicePortModifier::new(dk, capability)),
        Box::new(KubeMonModifier::new(capability)),
    ]
}

pub(crate) fn empty_dir(name: &str) -> Volume {
    Volume {
        name: name.to_string(),
        empty_dir: Some(EmptyDirVolumeSource::default()),
        ..Volume::default()
    }
}

pub(crate) fn secret_volume(name: &str, secret_name: &str, items: Option<Vec<KeyToPath>>) -> Volume {
    Volume {
        name: name.to_string(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(secret_name.to_string()),
            items,
            ..SecretVolumeSource::default()
        }),
        ..Volume::default()
    }
}

pub(crate) fn key_to_path(key: &str, path: &str) -> KeyToPath {
    KeyToPath {
        key: key.to_string(),
        path: path.to_string(),
        mode: None,
    }
}

pub(crate) fn mount(name: &str, path: &str, sub_path: Option<&str>, read_only: bool) -> VolumeMount {
    VolumeMount {
        name: name.to_string(),
        mount_path: path.to_string(),
        sub_path: sub_path.map(str::to_string),
        read_only: read_only.then_some(true),
        ..VolumeMount::default()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::test_support::dynakube_with_activegate;

    #[test]
    fn test_all_modifiers_in_order() {
        let dk = dynakube_with_activegate(&["routing"]);
        let capability = MultiCapability::new(&dk);
        assert_eq!(all(&dk, &capability).len(), 10);
    }

    #[test]
    fn test_kubemon_sees_read_only_mounts() {
        let dk = dynakube_with_activegate(&["kubeMon"]);
        let capability = MultiCapability::new(&dk);
        let mut draft = draft(&dk);
        for modifier in all(&dk, &capability) {
            if modifier.enabled() {
                modifier.modify(&mut draft).unwrap();
            }
        }
        let init = &draft
            .statefulset
            .spec
            .as_ref()
            .unwrap()
            .template
            .spec
            .as_ref()
            .unwrap()
            .init_containers
            .as_ref()
            .unwrap()[0];
        assert!(mount_of(init, "ag-tmp-gateway").is_some());
    }
}
