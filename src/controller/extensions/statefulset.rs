//! # Extensions Controller StatefulSet
//!
//! Single replica. The runtime volume is either a volume claim template
//! (default 1Gi, `ReadWriteOnce`) or an emptyDir when
//! `useEphemeralVolume` is set. Claim templates are immutable, so their hash
//! is kept in an annotation and a change recreates the StatefulSet.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{
    StatefulSet, StatefulSetPersistentVolumeClaimRetentionPolicy, StatefulSetSpec,
};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, HTTPGetAction, LocalObjectReference, PersistentVolumeClaim,
    PersistentVolumeClaimSpec, PodSecurityContext, PodSpec, PodTemplateSpec, Probe,
    SeccompProfile, Secret, SecretVolumeSource, Volume, VolumeMount, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;
use kube::ResourceExt;

use super::service::app_labels;
use super::{
    controller_name, effective_tls_secret_name, token_secret_name, COLLECTOR_PORT,
    COLLECTOR_PORT_NAME, CONTAINER_NAME, EEC_TOKEN_KEY, OTELC_TOKEN_KEY, SERVICE_ACCOUNT_NAME,
};
use crate::conditions::{self, ConditionType};
use crate::constants::{
    ANNOTATION_EXTENSIONS_SECRET_HASH, ANNOTATION_PVC_TEMPLATE_HASH, TLS_CRT_KEY, TLS_KEY_KEY,
    USER_GROUP_ID,
};
use crate::controller::activegate::consts::statefulset_name as activegate_statefulset_name;
use crate::controller::activegate::statefulset::security_context;
use crate::controller::error::ReconcileError;
use crate::crd::{DynaKube, ExtensionExecutionControllerSpec};
use crate::kubeobjects::builder::{BuildError, Builder, Modifier};
use crate::kubeobjects::hasher::{self, template_hashes_equal};
use crate::kubeobjects::labels::merge_labels;
use crate::kubeobjects::prioritymap::{Priority, PriorityMap};
use crate::kubeobjects::query::{extensions_must_recreate, Query};
use crate::kubeobjects::scheduling::{max_one_per_node, multi_arch_node_affinity};
use crate::kubeobjects::ClusterClient;

pub const IMAGE_NAME: &str = "dynatrace-eec";

const RUNTIME_VOLUME: &str = "agent-runtime";
const RUNTIME_MOUNT_PATH: &str = "/var/lib/dynatrace/remotepluginmodule";
const TOKENS_VOLUME: &str = "tokens";
const TOKENS_MOUNT_PATH: &str = "/secrets/tokens";
const HTTPS_CERTS_VOLUME: &str = "https-certs";
const HTTPS_CERTS_MOUNT_PATH: &str = "/secrets/https";
const DEFAULT_RUNTIME_STORAGE: &str = "1Gi";

const EXTENSIONS_MODULE_EXEC_PATH: &str =
    "/opt/dynatrace/remotepluginmodule/agent/lib64/extensionsmodule";
const DS_INSTALL_DIR: &str = "/opt/dynatrace/remotepluginmodule/agent/datasources";

fn pod_spec_mut(sts: &mut StatefulSet) -> Result<&mut PodSpec, BuildError> {
    sts.spec
        .as_mut()
        .and_then(|spec| spec.template.spec.as_mut())
        .ok_or_else(|| BuildError::Invalid("extensions pod spec missing".to_string()))
}

/// Volume claim template for the runtime directory
#[derive(Debug)]
struct VolumeClaimModifier {
    template: ExtensionExecutionControllerSpec,
}

impl Modifier<StatefulSet> for VolumeClaimModifier {
    fn enabled(&self) -> bool {
        !self.template.use_ephemeral_volume
    }

    fn modify(&self, sts: &mut StatefulSet) -> Result<(), BuildError> {
        let claim_spec = self
            .template
            .persistent_volume_claim
            .clone()
            .unwrap_or_else(default_claim_spec);
        let claims = vec![PersistentVolumeClaim {
            metadata: ObjectMeta {
                name: Some(RUNTIME_VOLUME.to_string()),
                ..ObjectMeta::default()
            },
            spec: Some(claim_spec),
            status: None,
        }];
        let claim_hash = hasher::generate_hash(&claims)?;

        let spec = sts
            .spec
            .as_mut()
            .ok_or_else(|| BuildError::Invalid("extensions spec missing".to_string()))?;
        spec.volume_claim_templates = Some(claims);
        spec.persistent_volume_claim_retention_policy =
            Some(StatefulSetPersistentVolumeClaimRetentionPolicy {
                when_deleted: Some("Delete".to_string()),
                when_scaled: Some("Delete".to_string()),
            });
        sts.annotations_mut()
            .insert(ANNOTATION_PVC_TEMPLATE_HASH.to_string(), claim_hash);

        pod_spec_mut(sts)?
            .security_context
            .get_or_insert_with(PodSecurityContext::default)
            .fs_group = Some(USER_GROUP_ID);
        Ok(())
    }
}

#[derive(Debug)]
struct EphemeralVolumeModifier {
    enabled: bool,
}

impl Modifier<StatefulSet> for EphemeralVolumeModifier {
    fn enabled(&self) -> bool {
        self.enabled
    }

    fn modify(&self, sts: &mut StatefulSet) -> Result<(), BuildError> {
        pod_spec_mut(sts)?
            .volumes
            .get_or_insert_with(Vec::new)
            .push(Volume {
                name: RUNTIME_VOLUME.to_string(),
                empty_dir: Some(Default::default()),
                ..Volume::default()
            });
        Ok(())
    }
}

fn default_claim_spec() -> PersistentVolumeClaimSpec {
    PersistentVolumeClaimSpec {
        access_modes: Some(vec!["ReadWriteOnce".to_string()]),
        resources: Some(VolumeResourceRequirements {
            requests: Some(BTreeMap::from([(
                "storage".to_string(),
                Quantity(DEFAULT_RUNTIME_STORAGE.to_string()),
            )])),
            limits: None,
        }),
        ..PersistentVolumeClaimSpec::default()
    }
}

fn secret_volume(name: &str, secret: String) -> Volume {
    Volume {
        name: name.to_string(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(secret),
            default_mode: Some(0o644),
            ..SecretVolumeSource::default()
        }),
        ..Volume::default()
    }
}

fn mount(name: &str, path: &str, read_only: bool) -> VolumeMount {
    VolumeMount {
        name: name.to_string(),
        mount_path: path.to_string(),
        read_only: Some(read_only),
        ..VolumeMount::default()
    }
}

fn readiness_probe() -> Probe {
    Probe {
        http_get: Some(HTTPGetAction {
            path: Some("/readyz".to_string()),
            port: IntOrString::Int(COLLECTOR_PORT),
            scheme: Some("HTTPS".to_string()),
            ..HTTPGetAction::default()
        }),
        initial_delay_seconds: Some(15),
        period_seconds: Some(15),
        failure_threshold: Some(3),
        timeout_seconds: Some(2),
        success_threshold: Some(1),
        ..Probe::default()
    }
}

fn env(dk: &DynaKube) -> PriorityMap {
    let status = dk.current_status();
    let ns = dk.ns();
    let mut env = PriorityMap::new();
    let mut set = |key: &str, value: String| env.insert(key, value, Priority::Default);
    set("TenantId", status.active_gate.connection_info.tenant_uuid);
    set(
        "ServerUrl",
        format!("{}.{ns}:443", activegate_statefulset_name(&dk.name_any())),
    );
    set("EecTokenPath", format!("{TOKENS_MOUNT_PATH}/{EEC_TOKEN_KEY}"));
    set("EecIngestPort", COLLECTOR_PORT.to_string());
    set("ExtensionsModuleExecPath", EXTENSIONS_MODULE_EXEC_PATH.to_string());
    set("DsInstallDir", DS_INSTALL_DIR.to_string());
    set("K8sClusterUID", status.kube_system_uuid);
    set(
        "K8sExtServiceUrl",
        format!("https://{}.{ns}", controller_name(&dk.name_any())),
    );
    set("DSTokenPath", format!("{TOKENS_MOUNT_PATH}/{OTELC_TOKEN_KEY}"));
    set("DsHttpsCertPathPem", format!("{HTTPS_CERTS_MOUNT_PATH}/{TLS_CRT_KEY}"));
    set("DsHttpsPrivKeyPathPem", format!("{HTTPS_CERTS_MOUNT_PATH}/{TLS_KEY_KEY}"));
    env
}

/// Image from `imageRef`, else the tenant registry default
pub fn image(dk: &DynaKube) -> Result<String, BuildError> {
    match dk.extension_execution_controller().image_ref {
        Some(image_ref) if !image_ref.repository.is_empty() => Ok(image_ref.image()),
        _ => dk.default_image(IMAGE_NAME).ok_or_else(|| {
            BuildError::Invalid(format!("cannot derive image from apiUrl {}", dk.spec.api_url))
        }),
    }
}

/// Desired StatefulSet; `tls_hash` rolls the pods when the certificate changes
pub fn build_statefulset(dk: &DynaKube, tls_hash: &str) -> Result<StatefulSet, BuildError> {
    let template = dk.extension_execution_controller();
    let labels = app_labels(dk);
    let name = controller_name(&dk.name_any());

    let mut template_annotations = template.annotations.clone();
    template_annotations.insert(ANNOTATION_EXTENSIONS_SECRET_HASH.to_string(), tls_hash.to_string());

    let container = Container {
        name: CONTAINER_NAME.to_string(),
        image: Some(image(dk)?),
        image_pull_policy: Some("Always".to_string()),
        readiness_probe: Some(readiness_probe()),
        security_context: Some(security_context(true)),
        ports: Some(vec![ContainerPort {
            name: Some(COLLECTOR_PORT_NAME.to_string()),
            container_port: COLLECTOR_PORT,
            ..ContainerPort::default()
        }]),
        env: Some(env(dk).as_env_vars()),
        resources: template.resources.clone(),
        volume_mounts: Some(vec![
            mount(TOKENS_VOLUME, TOKENS_MOUNT_PATH, true),
            mount(RUNTIME_VOLUME, RUNTIME_MOUNT_PATH, false),
            mount(HTTPS_CERTS_VOLUME, HTTPS_CERTS_MOUNT_PATH, true),
        ]),
        ..Container::default()
    };

    let pod_spec = PodSpec {
        containers: vec![container],
        service_account_name: Some(SERVICE_ACCOUNT_NAME.to_string()),
        image_pull_secrets: Some(vec![LocalObjectReference {
            name: dk.pull_secret_name(),
        }]),
        affinity: Some(multi_arch_node_affinity()),
        tolerations: Some(template.tolerations.clone()).filter(|t| !t.is_empty()),
        topology_spread_constraints: Some(if template.topology_spread_constraints.is_empty() {
            max_one_per_node(&labels.match_labels())
        } else {
            template.topology_spread_constraints.clone()
        }),
        security_context: Some(PodSecurityContext {
            seccomp_profile: Some(SeccompProfile {
                type_: "RuntimeDefault".to_string(),
                localhost_profile: None,
            }),
            ..PodSecurityContext::default()
        }),
        volumes: Some(vec![
            secret_volume(TOKENS_VOLUME, token_secret_name(&dk.name_any())),
            secret_volume(HTTPS_CERTS_VOLUME, effective_tls_secret_name(dk)),
        ]),
        ..PodSpec::default()
    };

    let base = StatefulSet {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: Some(dk.ns()),
            labels: Some(labels.labels()),
            ..ObjectMeta::default()
        },
        spec: Some(StatefulSetSpec {
            replicas: Some(1),
            pod_management_policy: Some("Parallel".to_string()),
            service_name: Some(name),
            selector: LabelSelector {
                match_labels: Some(labels.match_labels()),
                match_expressions: None,
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(merge_labels(&labels.labels(), &template.labels)),
                    annotations: Some(template_annotations),
                    ..ObjectMeta::default()
                }),
                spec: Some(pod_spec),
            },
            ..StatefulSetSpec::default()
        }),
        status: None,
    };

    let ephemeral = template.use_ephemeral_volume;
    let mut statefulset = Builder::new(base)
        .add_modifier(VolumeClaimModifier { template })
        .add_modifier(EphemeralVolumeModifier { enabled: ephemeral })
        .build()?;
    hasher::add_template_hash(&mut statefulset)?;
    Ok(statefulset)
}

pub struct StatefulSetReconciler<'a, C> {
    client: &'a C,
}

impl<C> std::fmt::Debug for StatefulSetReconciler<'_, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatefulSetReconciler").finish_non_exhaustive()
    }
}

impl<'a, C: ClusterClient> StatefulSetReconciler<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self { client }
    }

    pub async fn reconcile(&self, dk: &mut DynaKube) -> Result<(), ReconcileError> {
        if dk.current_status().kube_system_uuid.is_empty() {
            let err = ReconcileError::KubeSystemUuidUnknown;
            conditions::set_outdated(
                &mut dk.status_mut().conditions,
                ConditionType::ExtensionsControllerStatefulSet,
                &err.to_string(),
            );
            return Err(err);
        }
        let name = controller_name(&dk.name_any());
        let result = self.apply(dk).await;
        let conditions = &mut dk.status_mut().conditions;
        match result {
            Ok(true) => {
                conditions::set_statefulset_created(
                    conditions,
                    ConditionType::ExtensionsControllerStatefulSet,
                    &name,
                );
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(err @ ReconcileError::SecretReference(_)) => {
                conditions::set_secret_reference_failed(
                    conditions,
                    ConditionType::ExtensionsControllerStatefulSet,
                    &err,
                );
                Err(err)
            }
            Err(err) => {
                conditions::set_kube_api_error(
                    conditions,
                    ConditionType::ExtensionsControllerStatefulSet,
                    &err,
                );
                Err(err)
            }
        }
    }

    /// Whether the StatefulSet was written
    async fn apply(&self, dk: &DynaKube) -> Result<bool, ReconcileError> {
        let tls_name = effective_tls_secret_name(dk);
        let tls: Secret = self
            .client
            .get(&dk.ns(), &tls_name)
            .await?
            .ok_or_else(|| ReconcileError::SecretReference(format!("TLS secret {tls_name} not found")))?;
        let tls_hash = hasher::generate_hash(&tls.data)?;

        let statefulset = build_statefulset(dk, &tls_hash)?;
        Ok(Query::new(self.client, template_hashes_equal, extensions_must_recreate)
            .with_owner(dk)
            .create_or_update(statefulset)
            .await?)
    }
}
