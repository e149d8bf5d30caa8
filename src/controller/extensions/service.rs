//! # Extensions Service

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;
use kube::ResourceExt;

use super::{controller_name, COLLECTOR_PORT, COLLECTOR_PORT_NAME};
use crate::conditions::{self, ConditionType};
use crate::controller::error::ReconcileError;
use crate::crd::DynaKube;
use crate::kubeobjects::labels::{AppLabels, EXTENSIONS_COMPONENT};
use crate::kubeobjects::{query, ClusterClient};

pub fn app_labels(dk: &DynaKube) -> AppLabels {
    AppLabels::new(EXTENSIONS_COMPONENT, dk.name_any(), EXTENSIONS_COMPONENT, "")
}

pub fn build_service(dk: &DynaKube) -> Service {
    let labels = app_labels(dk);
    Service {
        metadata: ObjectMeta {
            name: Some(controller_name(&dk.name_any())),
            namespace: Some(dk.ns()),
            labels: Some(labels.labels()),
            ..ObjectMeta::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(labels.match_labels()),
            ports: Some(vec![ServicePort {
                name: Some(COLLECTOR_PORT_NAME.to_string()),
                port: COLLECTOR_PORT,
                protocol: Some("TCP".to_string()),
                target_port: Some(IntOrString::String(COLLECTOR_PORT_NAME.to_string())),
                ..ServicePort::default()
            }]),
            ..ServiceSpec::default()
        }),
        status: None,
    }
}

pub struct ServiceReconciler<'a, C> {
    client: &'a C,
}

impl<C> std::fmt::Debug for ServiceReconciler<'_, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceReconciler").finish_non_exhaustive()
    }
}

impl<'a, C: ClusterClient> ServiceReconciler<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self { client }
    }

    pub async fn reconcile(&self, dk: &mut DynaKube) -> Result<(), ReconcileError> {
        let service = build_service(dk);
        let name = service.name_any();
        let result = query::services(self.client)
            .with_owner(&*dk)
            .create_or_update(service)
            .await;
        let conditions = &mut dk.status_mut().conditions;
        match result {
            Ok(_) => {
                conditions::set_service_created(conditions, ConditionType::ExtensionsService, &name);
                Ok(())
            }
            Err(err) => {
                conditions::set_kube_api_error(conditions, ConditionType::ExtensionsService, &err);
                Err(err.into())
            }
        }
    }
}
