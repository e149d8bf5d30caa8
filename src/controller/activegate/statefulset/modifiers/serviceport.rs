//! Ports and DNS entry point of a gateway that serves traffic.
//!
//! `DT_DNS_ENTRY_POINT` lists one `/communication` URL per recorded Service
//! cluster IP, followed by the Service FQDN.

use k8s_openapi::api::core::v1::ContainerPort;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

use crate::controller::activegate::capability::{Capability, MultiCapability};
use crate::controller::activegate::consts::{
    service_name, ENV_DT_DNS_ENTRY_POINT, HTTPS_CONTAINER_PORT, HTTPS_SERVICE_PORT,
    HTTPS_SERVICE_PORT_NAME, HTTP_CONTAINER_PORT, HTTP_SERVICE_PORT_NAME,
};
use crate::controller::activegate::statefulset::GatewayDraft;
use crate::crd::DynaKube;
use crate::kubeobjects::builder::{BuildError, Modifier};
use crate::kubeobjects::prioritymap::Priority;

#[derive(Debug)]
pub struct ServicePortModifier {
    enabled: bool,
    metrics_ingest: bool,
    service_host: String,
    service_ips: Vec<String>,
}

impl ServicePortModifier {
    pub fn new(dk: &DynaKube, capability: &MultiCapability) -> Self {
        Self {
            enabled: capability.serves_traffic(),
            metrics_ingest: capability.has(Capability::MetricsIngest),
            service_host: format!("{}.{}", service_name(&dk.name_any()), dk.ns()),
            service_ips: dk.current_status().active_gate.service_ips,
        }
    }

    pub fn dns_entry_point(&self) -> String {
        self.service_ips
            .iter()
            .chain(std::iter::once(&self.service_host))
            .map(|host| format!("https://{host}:{HTTPS_SERVICE_PORT}/communication"))
            .collect::<Vec<_>>()
            .join(",")
    }

    fn container_ports(&self) -> Vec<ContainerPort> {
        let mut ports = vec![ContainerPort {
            name: Some(HTTPS_SERVICE_PORT_NAME.to_string()),
            container_port: HTTPS_CONTAINER_PORT,
            ..ContainerPort::default()
        }];
        if self.metrics_ingest {
            ports.push(ContainerPort {
                name: Some(HTTP_SERVICE_PORT_NAME.to_string()),
                container_port: HTTP_CONTAINER_PORT,
                ..ContainerPort::default()
            });
        }
        ports
    }
}

impl Modifier<GatewayDraft> for ServicePortModifier {
    fn enabled(&self) -> bool {
        self.enabled
    }

    fn modify(&self, draft: &mut GatewayDraft) -> Result<(), BuildError> {
        let container = draft.container_mut()?;
        if let Some(http_get) = container
            .readiness_probe
            .as_mut()
            .and_then(|probe| probe.http_get.as_mut())
        {
            http_get.port = IntOrString::String(HTTPS_SERVICE_PORT_NAME.to_string());
        }
        container
            .ports
            .get_or_insert_with(Vec::new)
            .extend(self.container_ports());

        draft
            .env
            .insert(ENV_DT_DNS_ENTRY_POINT, self.dns_entry_point(), Priority::Default);
        Ok(())
    }
}
