//! # Log Module DaemonSet
//!
//! One pod per node. Node log directories are mounted read-only from the
//! host; the module writes only into two emptyDirs. The configuration Secret
//! is mounted as a single file through `subPath`.

use k8s_openapi::api::apps::v1::{
    DaemonSet, DaemonSetSpec, DaemonSetUpdateStrategy, RollingUpdateDaemonSet,
};
use k8s_openapi::api::core::v1::{
    Capabilities, Container, EnvVar, EnvVarSource, HostPathVolumeSource, LocalObjectReference,
    ObjectFieldSelector, PodSpec, PodTemplateSpec, SeccompProfile, SecretVolumeSource,
    SecurityContext, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;
use kube::ResourceExt;

use super::{config_secret_name, daemonset_name, CONFIG_KEY, CONTAINER_NAME, IMAGE_NAME};
use crate::conditions::{self, ConditionType};
use crate::controller::error::ReconcileError;
use crate::crd::DynaKube;
use crate::kubeobjects::builder::BuildError;
use crate::kubeobjects::hasher;
use crate::kubeobjects::labels::{merge_labels, AppLabels, LOGMODULE_COMPONENT};
use crate::kubeobjects::scheduling::multi_arch_node_affinity;
use crate::kubeobjects::{query, ClusterClient};

/// (volume, host path) pairs mounted read-only
pub const HOST_LOG_VOLUMES: [(&str, &str); 3] = [
    ("var-log-pods", "/var/log/pods"),
    ("docker-container-logs", "/var/lib/docker/containers"),
    ("container-logs", "/var/log/containers"),
];

/// (volume, mount path) pairs backed by emptyDirs
pub const WRITABLE_VOLUMES: [(&str, &str); 2] = [
    ("dynatrace-data", "/var/lib/dynatrace"),
    ("dynatrace-logs", "/var/log/dynatrace"),
];

const CONFIG_VOLUME: &str = "config";
const CONFIG_MOUNT_PATH: &str = "/var/lib/dynatrace/oneagent/agent/config/deployment.conf";
const DEFAULT_MAX_UNAVAILABLE: i32 = 1;

pub fn app_labels(dk: &DynaKube) -> AppLabels {
    AppLabels::new(LOGMODULE_COMPONENT, dk.name_any(), LOGMODULE_COMPONENT, "")
}

pub fn image(dk: &DynaKube) -> Result<String, BuildError> {
    match dk.log_module().image_ref {
        Some(image_ref) if !image_ref.repository.is_empty() => Ok(image_ref.image()),
        _ => dk.default_image(IMAGE_NAME).ok_or_else(|| {
            BuildError::Invalid(format!("cannot derive image from apiUrl {}", dk.spec.api_url))
        }),
    }
}

fn volumes(dk: &DynaKube) -> Vec<Volume> {
    let host = HOST_LOG_VOLUMES.iter().map(|(name, path)| Volume {
        name: (*name).to_string(),
        host_path: Some(HostPathVolumeSource {
            path: (*path).to_string(),
            type_: None,
        }),
        ..Volume::default()
    });
    let writable = WRITABLE_VOLUMES.iter().map(|(name, _)| Volume {
        name: (*name).to_string(),
        empty_dir: Some(Default::default()),
        ..Volume::default()
    });
    let config = Volume {
        name: CONFIG_VOLUME.to_string(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(config_secret_name(&dk.name_any())),
            ..SecretVolumeSource::default()
        }),
        ..Volume::default()
    };
    host.chain(writable).chain(std::iter::once(config)).collect()
}

fn volume_mounts() -> Vec<VolumeMount> {
    let mount = |name: &str, path: &str, read_only: bool| VolumeMount {
        name: name.to_string(),
        mount_path: path.to_string(),
        read_only: Some(read_only),
        ..VolumeMount::default()
    };
    let mut mounts: Vec<VolumeMount> = HOST_LOG_VOLUMES
        .iter()
        .map(|&(name, path)| mount(name, path, true))
        .collect();
    mounts.extend(WRITABLE_VOLUMES.iter().map(|&(name, path)| mount(name, path, false)));
    mounts.push(VolumeMount {
        sub_path: Some(CONFIG_KEY.to_string()),
        ..mount(CONFIG_VOLUME, CONFIG_MOUNT_PATH, true)
    });
    mounts
}

fn field_ref(path: &str) -> Option<EnvVarSource> {
    Some(EnvVarSource {
        field_ref: Some(ObjectFieldSelector {
            field_path: path.to_string(),
            api_version: None,
        }),
        ..EnvVarSource::default()
    })
}

fn env(dk: &DynaKube) -> Vec<EnvVar> {
    vec![
        EnvVar {
            name: "K8S_CLUSTER_UID".to_string(),
            value: Some(dk.current_status().kube_system_uuid),
            value_from: None,
        },
        EnvVar {
            name: "K8S_NODE_NAME".to_string(),
            value: None,
            value_from: field_ref("spec.nodeName"),
        },
        EnvVar {
            name: "K8S_POD_NAME".to_string(),
            value: None,
            value_from: field_ref("metadata.name"),
        },
    ]
}

fn security_context() -> SecurityContext {
    SecurityContext {
        privileged: Some(false),
        allow_privilege_escalation: Some(false),
        read_only_root_filesystem: Some(true),
        run_as_user: Some(0),
        run_as_group: Some(0),
        capabilities: Some(Capabilities {
            drop: Some(vec!["ALL".to_string()]),
            add: Some(vec!["DAC_READ_SEARCH".to_string()]),
        }),
        seccomp_profile: Some(SeccompProfile {
            type_: "RuntimeDefault".to_string(),
            localhost_profile: None,
        }),
        ..SecurityContext::default()
    }
}

pub fn build_daemonset(dk: &DynaKube) -> Result<DaemonSet, BuildError> {
    let template = dk.log_module();
    let labels = app_labels(dk);

    let container = Container {
        name: CONTAINER_NAME.to_string(),
        image: Some(image(dk)?),
        image_pull_policy: Some("Always".to_string()),
        args: Some(template.args.clone()).filter(|args| !args.is_empty()),
        env: Some(env(dk)),
        resources: template.resources.clone(),
        security_context: Some(security_context()),
        volume_mounts: Some(volume_mounts()),
        ..Container::default()
    };

    let pod_spec = PodSpec {
        containers: vec![container],
        service_account_name: Some(LOGMODULE_COMPONENT.to_string()),
        image_pull_secrets: Some(vec![LocalObjectReference {
            name: dk.pull_secret_name(),
        }]),
        affinity: Some(multi_arch_node_affinity()),
        tolerations: Some(template.tolerations.clone()).filter(|t| !t.is_empty()),
        node_selector: Some(template.node_selector.clone()).filter(|s| !s.is_empty()),
        priority_class_name: template.priority_class_name.clone(),
        dns_policy: template.dns_policy.clone(),
        volumes: Some(volumes(dk)),
        ..PodSpec::default()
    };

    let mut daemonset = DaemonSet {
        metadata: ObjectMeta {
            name: Some(daemonset_name(&dk.name_any())),
            namespace: Some(dk.ns()),
            labels: Some(labels.labels()),
            ..ObjectMeta::default()
        },
        spec: Some(DaemonSetSpec {
            selector: LabelSelector {
                match_labels: Some(labels.match_labels()),
                match_expressions: None,
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(merge_labels(&labels.labels(), &template.labels)),
                    annotations: Some(template.annotations.clone()).filter(|a| !a.is_empty()),
                    ..ObjectMeta::default()
                }),
                spec: Some(pod_spec),
            },
            update_strategy: Some(DaemonSetUpdateStrategy {
                type_: Some("RollingUpdate".to_string()),
                rolling_update: Some(RollingUpdateDaemonSet {
                    max_unavailable: Some(IntOrString::Int(
                        template.max_unavailable.unwrap_or(DEFAULT_MAX_UNAVAILABLE),
                    )),
                    max_surge: None,
                }),
            }),
            ..DaemonSetSpec::default()
        }),
        status: None,
    };
    hasher::add_template_hash(&mut daemonset)?;
    Ok(daemonset)
}

pub struct DaemonSetReconciler<'a, C> {
    client: &'a C,
}

impl<C> std::fmt::Debug for DaemonSetReconciler<'_, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaemonSetReconciler").finish_non_exhaustive()
    }
}

impl<'a, C: ClusterClient> DaemonSetReconciler<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self { client }
    }

    pub async fn reconcile(&self, dk: &mut DynaKube) -> Result<(), ReconcileError> {
        if dk.current_status().kube_system_uuid.is_empty() {
            let err = ReconcileError::KubeSystemUuidUnknown;
            conditions::set_outdated(
                &mut dk.status_mut().conditions,
                ConditionType::LogModuleDaemonSet,
                &err.to_string(),
            );
            return Err(err);
        }
        let result = self.apply(dk).await;
        let name = daemonset_name(&dk.name_any());
        let conditions = &mut dk.status_mut().conditions;
        match result {
            Ok(true) => {
                conditions::set_daemonset_created(conditions, ConditionType::LogModuleDaemonSet, &name);
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(err) => {
                conditions::set_kube_api_error(conditions, ConditionType::LogModuleDaemonSet, &err);
                Err(err)
            }
        }
    }

    async fn apply(&self, dk: &DynaKube) -> Result<bool, ReconcileError> {
        let daemonset = build_daemonset(dk)?;
        Ok(query::daemonsets(self.client)
            .with_owner(dk)
            .create_or_update(daemonset)
            .await?)
    }
}
