//! # Gateway StatefulSet Builder
//!
//! Produces the base gateway StatefulSet and runs it through the modifier
//! chain. Modifiers share a [`GatewayDraft`]: the StatefulSet under
//! construction plus the environment of the primary container as a
//! [`PriorityMap`], which is only rendered into the container once every
//! modifier has run.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    Capabilities, ConfigMapKeySelector, Container, EnvVarSource, HTTPGetAction,
    LocalObjectReference, PodSecurityContext, PodSpec, PodTemplateSpec, Probe, SeccompProfile,
    SecurityContext, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;
use kube::ResourceExt;

use super::modifiers;
use crate::constants::{
    ANNOTATION_ACTIVEGATE_CONFIGURATION_HASH, ANNOTATION_APPARMOR_PREFIX,
    APPARMOR_DEFAULT_PROFILE, USER_GROUP_ID,
};
use crate::controller::activegate::capability::{Capability, MultiCapability};
use crate::controller::activegate::consts::{
    deployment_metadata_name, statefulset_name, ACTIVEGATE_CONTAINER_NAME, ACTIVEGATE_NAME,
    DEPLOYMENT_METADATA_KEY, ENV_DT_CAPABILITIES, ENV_DT_DEPLOYMENT_METADATA, ENV_DT_GROUP,
    ENV_DT_HTTP_PORT, ENV_DT_ID_SEED_CLUSTER_ID, ENV_DT_ID_SEED_NAMESPACE, ENV_DT_NETWORK_ZONE,
    HTTPS_CONTAINER_PORT, HTTP_CONTAINER_PORT, SERVICE_ACCOUNT_NAME,
};
use crate::crd::DynaKube;
use crate::kubeobjects::builder::{BuildError, Builder};
use crate::kubeobjects::hasher;
use crate::kubeobjects::labels::{merge_labels, AppLabels, ACTIVEGATE_COMPONENT};
use crate::kubeobjects::prioritymap::{Priority, PriorityMap};
use crate::kubeobjects::scheduling::{default_topology_spread, multi_arch_node_affinity};

pub const READINESS_PATH: &str = "/rest/health";

/// StatefulSet under construction plus the primary container's environment
#[derive(Debug, Clone)]
pub struct GatewayDraft {
    pub statefulset: StatefulSet,
    pub env: PriorityMap,
}

impl GatewayDraft {
    pub fn pod_spec_mut(&mut self) -> Result<&mut PodSpec, BuildError> {
        self.statefulset
            .spec
            .as_mut()
            .and_then(|spec| spec.template.spec.as_mut())
            .ok_or_else(|| BuildError::Invalid("gateway pod spec missing".to_string()))
    }

    pub fn container_mut(&mut self) -> Result<&mut Container, BuildError> {
        self.pod_spec_mut()?
            .containers
            .iter_mut()
            .find(|c| c.name == ACTIVEGATE_CONTAINER_NAME)
            .ok_or_else(|| BuildError::Invalid("gateway container missing".to_string()))
    }

    pub fn container(&self) -> Option<&Container> {
        self.statefulset
            .spec
            .as_ref()
            .and_then(|spec| spec.template.spec.as_ref())
            .and_then(|pod| pod.containers.iter().find(|c| c.name == ACTIVEGATE_CONTAINER_NAME))
    }

    pub fn add_volume(&mut self, volume: Volume) -> Result<(), BuildError> {
        self.pod_spec_mut()?
            .volumes
            .get_or_insert_with(Vec::new)
            .push(volume);
        Ok(())
    }

    pub fn add_mount(&mut self, mount: VolumeMount) -> Result<(), BuildError> {
        self.container_mut()?
            .volume_mounts
            .get_or_insert_with(Vec::new)
            .push(mount);
        Ok(())
    }

    /// Render the environment into the primary container
    pub fn finish(mut self) -> Result<StatefulSet, BuildError> {
        let env = self.env.as_env_vars();
        self.container_mut()?.env = Some(env);
        Ok(self.statefulset)
    }
}

/// Restricted security context shared by the gateway containers
pub fn security_context(read_only_root: bool) -> SecurityContext {
    SecurityContext {
        privileged: Some(false),
        allow_privilege_escalation: Some(false),
        read_only_root_filesystem: Some(read_only_root),
        run_as_non_root: Some(true),
        run_as_user: Some(USER_GROUP_ID),
        run_as_group: Some(USER_GROUP_ID),
        capabilities: Some(Capabilities {
            drop: Some(vec!["ALL".to_string()]),
            add: None,
        }),
        seccomp_profile: Some(runtime_default_seccomp()),
        ..SecurityContext::default()
    }
}

fn runtime_default_seccomp() -> SeccompProfile {
    SeccompProfile {
        type_: "RuntimeDefault".to_string(),
        localhost_profile: None,
    }
}

fn readiness_probe() -> Probe {
    Probe {
        http_get: Some(HTTPGetAction {
            path: Some(READINESS_PATH.to_string()),
            port: IntOrString::Int(HTTPS_CONTAINER_PORT),
            scheme: Some("HTTPS".to_string()),
            ..HTTPGetAction::default()
        }),
        initial_delay_seconds: Some(90),
        period_seconds: Some(15),
        failure_threshold: Some(3),
        timeout_seconds: Some(2),
        ..Probe::default()
    }
}

/// Required key of a ConfigMap as an env var source
pub fn config_map_ref(name: String, key: &str) -> EnvVarSource {
    EnvVarSource {
        config_map_key_ref: Some(ConfigMapKeySelector {
            name,
            key: key.to_string(),
            optional: Some(false),
        }),
        ..EnvVarSource::default()
    }
}

pub struct StatefulSetBuilder<'a> {
    dk: &'a DynaKube,
    capability: &'a MultiCapability,
    kube_system_uuid: &'a str,
    configuration_hash: &'a str,
}

impl std::fmt::Debug for StatefulSetBuilder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatefulSetBuilder")
            .field("dynakube", &self.dk.name_any())
            .field("capabilities", &self.capability.arg_name())
            .finish_non_exhaustive()
    }
}

impl<'a> StatefulSetBuilder<'a> {
    pub fn new(
        dk: &'a DynaKube,
        capability: &'a MultiCapability,
        kube_system_uuid: &'a str,
        configuration_hash: &'a str,
    ) -> Self {
        Self {
            dk,
            capability,
            kube_system_uuid,
            configuration_hash,
        }
    }

    fn app_labels(&self) -> AppLabels {
        AppLabels::new(
            ACTIVEGATE_COMPONENT,
            self.dk.name_any(),
            ACTIVEGATE_NAME,
            self.dk.current_status().active_gate.version,
        )
    }

    fn image(&self) -> Result<String, BuildError> {
        match self.capability.properties().image.as_deref() {
            Some(image) if !image.is_empty() => Ok(image.to_string()),
            _ => self.dk.default_image(ACTIVEGATE_NAME).ok_or_else(|| {
                BuildError::Invalid(format!("cannot derive image from apiUrl {}", self.dk.spec.api_url))
            }),
        }
    }

    fn template_annotations(&self) -> BTreeMap<String, String> {
        let active_gate = self.dk.spec.active_gate.as_ref();
        let mut annotations = active_gate
            .map(|ag| ag.annotations.clone())
            .unwrap_or_default();
        annotations.insert(
            ANNOTATION_ACTIVEGATE_CONFIGURATION_HASH.to_string(),
            self.configuration_hash.to_string(),
        );
        if active_gate.is_some_and(|ag| ag.use_app_armor) {
            annotations.insert(
                format!("{ANNOTATION_APPARMOR_PREFIX}{ACTIVEGATE_CONTAINER_NAME}"),
                APPARMOR_DEFAULT_PROFILE.to_string(),
            );
        }
        annotations
    }

    fn base_env(&self) -> PriorityMap {
        let dk_name = self.dk.name_any();
        let mut env = PriorityMap::new();
        env.insert(ENV_DT_CAPABILITIES, self.capability.arg_name(), Priority::Default);
        env.insert(ENV_DT_ID_SEED_NAMESPACE, self.dk.ns(), Priority::Default);
        env.insert(ENV_DT_ID_SEED_CLUSTER_ID, self.kube_system_uuid, Priority::Default);
        env.insert(
            ENV_DT_DEPLOYMENT_METADATA,
            config_map_ref(deployment_metadata_name(&dk_name), DEPLOYMENT_METADATA_KEY),
            Priority::Default,
        );
        if let Some(group) = self.capability.properties().group.as_deref().filter(|g| !g.is_empty()) {
            env.insert(ENV_DT_GROUP, group, Priority::Default);
        }
        if let Some(zone) = self.dk.spec.network_zone.as_deref().filter(|z| !z.is_empty()) {
            env.insert(ENV_DT_NETWORK_ZONE, zone, Priority::Default);
        }
        if self.capability.has(Capability::MetricsIngest) {
            env.insert(ENV_DT_HTTP_PORT, HTTP_CONTAINER_PORT.to_string(), Priority::Default);
        }
        env.extend_env(&self.capability.properties().env, Priority::High);
        env
    }

    /// The StatefulSet before any modifier ran
    pub fn base(&self) -> Result<GatewayDraft, BuildError> {
        let properties = self.capability.properties();
        let active_gate = self.dk.spec.active_gate.clone().unwrap_or_default();
        let app_labels = self.app_labels();

        let container = Container {
            name: ACTIVEGATE_CONTAINER_NAME.to_string(),
            image: Some(self.image()?),
            image_pull_policy: Some("Always".to_string()),
            resources: properties.resources.clone(),
            readiness_probe: Some(readiness_probe()),
            security_context: Some(security_context(false)),
            ..Container::default()
        };

        let pod_spec = PodSpec {
            containers: vec![container],
            node_selector: Some(properties.node_selector.clone()).filter(|s| !s.is_empty()),
            tolerations: Some(properties.tolerations.clone()).filter(|t| !t.is_empty()),
            priority_class_name: active_gate.priority_class_name.clone(),
            dns_policy: active_gate.dns_policy.clone(),
            service_account_name: Some(SERVICE_ACCOUNT_NAME.to_string()),
            automount_service_account_token: Some(false),
            image_pull_secrets: Some(vec![LocalObjectReference {
                name: self.dk.pull_secret_name(),
            }]),
            security_context: Some(PodSecurityContext {
                seccomp_profile: Some(runtime_default_seccomp()),
                ..PodSecurityContext::default()
            }),
            ..PodSpec::default()
        };

        let statefulset = StatefulSet {
            metadata: ObjectMeta {
                name: Some(statefulset_name(&self.dk.name_any())),
                namespace: Some(self.dk.ns()),
                labels: Some(app_labels.labels()),
                annotations: Some(active_gate.annotations.clone()).filter(|a| !a.is_empty()),
                ..ObjectMeta::default()
            },
            spec: Some(StatefulSetSpec {
                replicas: Some(properties.replicas),
                pod_management_policy: Some("Parallel".to_string()),
                service_name: Some(statefulset_name(&self.dk.name_any())),
                selector: LabelSelector {
                    match_labels: Some(app_labels.match_labels()),
                    match_expressions: None,
                },
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(merge_labels(&app_labels.labels(), &properties.labels)),
                        annotations: Some(self.template_annotations()),
                        ..ObjectMeta::default()
                    }),
                    spec: Some(pod_spec),
                },
                ..StatefulSetSpec::default()
            }),
            status: None,
        };

        Ok(GatewayDraft {
            statefulset,
            env: self.base_env(),
        })
    }

    fn apply_scheduling_defaults(&self, statefulset: &mut StatefulSet) {
        let properties = self.capability.properties();
        let match_labels = self.app_labels().match_labels();
        let Some(pod) = statefulset
            .spec
            .as_mut()
            .and_then(|spec| spec.template.spec.as_mut())
        else {
            return;
        };
        pod.topology_spread_constraints = Some(if properties.topology_spread_constraints.is_empty() {
            default_topology_spread(&match_labels)
        } else {
            properties.topology_spread_constraints.clone()
        });
        pod.affinity = Some(
            properties
                .affinity
                .clone()
                .unwrap_or_else(multi_arch_node_affinity),
        );
    }

    /// Base, every modifier, scheduling defaults and the template hash
    pub fn build(&self) -> Result<StatefulSet, BuildError> {
        let draft = Builder::new(self.base()?)
            .add_modifiers(modifiers::all(self.dk, self.capability))
            .build()?;
        let mut statefulset = draft.finish()?;
        self.apply_scheduling_defaults(&mut statefulset);
        hasher::add_template_hash(&mut statefulset)?;
        Ok(statefulset)
    }
}
