//! Read-only root filesystem with writable scratch directories.

use super::{empty_dir, mount};
use crate::controller::activegate::consts::READ_ONLY_VOLUMES;
use crate::controller::activegate::statefulset::GatewayDraft;
use crate::crd::DynaKube;
use crate::kubeobjects::builder::{BuildError, Modifier};

#[derive(Debug)]
pub struct ReadOnlyModifier {
    enabled: bool,
}

impl ReadOnlyModifier {
    pub fn new(dk: &DynaKube) -> Self {
        Self {
            enabled: dk
                .spec
                .active_gate
                .as_ref()
                .is_some_and(|ag| ag.read_only_filesystem),
        }
    }
}

impl Modifier<GatewayDraft> for ReadOnlyModifier {
    fn enabled(&self) -> bool {
        self.enabled
    }

    fn modify(&self, draft: &mut GatewayDraft) -> Result<(), BuildError> {
        for (name, path) in READ_ONLY_VOLUMES {
            draft.add_volume(empty_dir(name))?;
            draft.add_mount(mount(name, path, None, false))?;
        }
        draft
            .container_mut()?
            .security_context
            .get_or_insert_with(Default::default)
            .read_only_root_filesystem = Some(true);
        Ok(())
    }
}
