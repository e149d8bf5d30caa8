//! # Gateway Service
//!
//! ClusterIP Service in front of the gateway pods. Port 443 always, port 80
//! when metrics ingest is enabled. The allocated cluster IPs are recorded in
//! `status.activeGate.serviceIPs` for the DNS entry point of the gateway.

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;
use kube::ResourceExt;
use tracing::info;

use super::capability::{Capability, MultiCapability};
use super::consts::{
    service_name, ACTIVEGATE_NAME, HTTPS_SERVICE_PORT, HTTPS_SERVICE_PORT_NAME, HTTP_SERVICE_PORT,
    HTTP_SERVICE_PORT_NAME,
};
use crate::conditions::{self, ConditionType};
use crate::controller::error::ReconcileError;
use crate::crd::DynaKube;
use crate::kubeobjects::labels::{AppLabels, ACTIVEGATE_COMPONENT};
use crate::kubeobjects::{query, ClientError, ClusterClient};

pub struct ServiceReconciler<'a, C> {
    client: &'a C,
    capability: &'a MultiCapability,
}

impl<C> std::fmt::Debug for ServiceReconciler<'_, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceReconciler")
            .field("capabilities", &self.capability.arg_name())
            .finish_non_exhaustive()
    }
}

fn port(name: &str, port: i32) -> ServicePort {
    ServicePort {
        name: Some(name.to_string()),
        port,
        protocol: Some("TCP".to_string()),
        target_port: Some(IntOrString::String(name.to_string())),
        ..ServicePort::default()
    }
}

pub fn build_service(dk: &DynaKube, capability: &MultiCapability) -> Service {
    let app_labels = AppLabels::new(
        ACTIVEGATE_COMPONENT,
        dk.name_any(),
        ACTIVEGATE_NAME,
        dk.current_status().active_gate.version,
    );
    let mut ports = vec![port(HTTPS_SERVICE_PORT_NAME, HTTPS_SERVICE_PORT)];
    if capability.has(Capability::MetricsIngest) {
        ports.push(port(HTTP_SERVICE_PORT_NAME, HTTP_SERVICE_PORT));
    }

    Service {
        metadata: ObjectMeta {
            name: Some(service_name(&dk.name_any())),
            namespace: Some(dk.ns()),
            labels: Some(app_labels.labels()),
            ..ObjectMeta::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(app_labels.match_labels()),
            ports: Some(ports),
            ..ServiceSpec::default()
        }),
        status: None,
    }
}

fn port_key(port: &ServicePort) -> (Option<String>, i32, Option<IntOrString>) {
    (port.name.clone(), port.port, port.target_port.clone())
}

/// Ports or labels differ
fn needs_update(current: &Service, desired: &Service) -> bool {
    let ports = |svc: &Service| -> Vec<_> {
        svc.spec
            .as_ref()
            .and_then(|spec| spec.ports.as_ref())
            .map(|ports| ports.iter().map(port_key).collect())
            .unwrap_or_default()
    };
    ports(current) != ports(desired) || current.labels() != desired.labels()
}

fn cluster_ips(service: &Service) -> Vec<String> {
    let Some(spec) = service.spec.as_ref() else {
        return Vec::new();
    };
    match spec.cluster_ips.as_ref() {
        Some(ips) if !ips.is_empty() => ips.clone(),
        _ => spec.cluster_ip.clone().into_iter().filter(|ip| !ip.is_empty()).collect(),
    }
}

impl<'a, C: ClusterClient> ServiceReconciler<'a, C> {
    pub fn new(client: &'a C, capability: &'a MultiCapability) -> Self {
        Self { client, capability }
    }

    pub async fn reconcile(&self, dk: &mut DynaKube) -> Result<(), ReconcileError> {
        let desired = build_service(dk, self.capability);
        let name = desired.name_any();
        match self.apply(dk, desired).await {
            Ok((service, changed)) => {
                if changed {
                    info!(service = %name, "gateway service applied");
                    conditions::set_service_created(
                        &mut dk.status_mut().conditions,
                        ConditionType::ActiveGateService,
                        &name,
                    );
                }
                dk.status_mut().active_gate.service_ips = cluster_ips(&service);
                Ok(())
            }
            Err(err) => {
                conditions::set_kube_api_error(
                    &mut dk.status_mut().conditions,
                    ConditionType::ActiveGateService,
                    &err,
                );
                Err(err.into())
            }
        }
    }

    async fn apply(&self, dk: &DynaKube, mut desired: Service) -> Result<(Service, bool), ClientError> {
        let services = query::services(self.client).with_owner(dk);
        let Some(current) = services.get(&dk.ns(), &desired.name_any()).await? else {
            return Ok((services.create(desired).await?, true));
        };
        if !needs_update(&current, &desired) {
            return Ok((current, false));
        }

        if let (Some(spec), Some(current_spec)) = (desired.spec.as_mut(), current.spec.as_ref()) {
            spec.cluster_ip.clone_from(&current_spec.cluster_ip);
            spec.cluster_ips.clone_from(&current_spec.cluster_ips);
        }
        Ok((services.update(&current, desired).await?, true))
    }
}
