//! # Constants
//!
//! Shared constants used throughout the operator.
//!
//! Label and annotation keys are part of the contract with existing clusters:
//! changing them orphans workloads created by earlier operator versions.

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default requeue interval after a successful reconcile (seconds)
pub const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 300;

/// Default requeue interval for reconciliation errors (seconds)
pub const DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS: u64 = 30;

/// Default requeue interval while a sibling subsystem has not yet populated
/// a required status field (seconds)
pub const DEFAULT_TRANSIENT_REQUEUE_SECS: u64 = 10;

/// Minimum age of the cached connection info before the backend is asked again (seconds)
pub const DEFAULT_API_REQUEST_THRESHOLD_SECS: u64 = 15 * 60;

/// Namespace the operator runs in when `POD_NAMESPACE` is unset
pub const DEFAULT_OPERATOR_NAMESPACE: &str = "dynatrace";

/// Deployment flavour written into the deployment-metadata ConfigMap
pub const DEFAULT_DEPLOYMENT_TYPE: &str = "manifest";

/// Field manager used for status patches
pub const FIELD_MANAGER: &str = "dynakube-operator";

// Labels

pub const APP_NAME_LABEL: &str = "app.kubernetes.io/name";
pub const APP_CREATED_BY_LABEL: &str = "app.kubernetes.io/created-by";
pub const APP_MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const APP_COMPONENT_LABEL: &str = "app.kubernetes.io/component";
pub const APP_VERSION_LABEL: &str = "app.kubernetes.io/version";

/// Value of `app.kubernetes.io/managed-by` on every owned object
pub const OPERATOR_NAME: &str = "dynatrace-operator";

// Annotations

/// Template hash of the owned object, written on its own metadata
pub const ANNOTATION_TEMPLATE_HASH: &str = "internal.operator.dynatrace.com/template-hash";

/// Configuration hash of referenced Secrets, written on the gateway pod template
pub const ANNOTATION_ACTIVEGATE_CONFIGURATION_HASH: &str =
    "internal.operator.dynatrace.com/activegate-configuration-hash";

/// Hash of the volume claim templates of the extensions controller
pub const ANNOTATION_PVC_TEMPLATE_HASH: &str = "internal.operator.dynatrace.com/pvc-template-hash";

/// Hash of the extensions TLS Secret, written on the extensions pod template
pub const ANNOTATION_EXTENSIONS_SECRET_HASH: &str =
    "internal.operator.dynatrace.com/extensions-secret-hash";

/// Prefix of the per-container AppArmor annotation
pub const ANNOTATION_APPARMOR_PREFIX: &str = "container.apparmor.security.beta.kubernetes.io/";

/// Value of the AppArmor annotation
pub const APPARMOR_DEFAULT_PROFILE: &str = "runtime/default";

// Shared Secret layout

pub const TLS_CRT_KEY: &str = "tls.crt";
pub const TLS_KEY_KEY: &str = "tls.key";
pub const SECRET_TYPE_TLS: &str = "kubernetes.io/tls";

/// Key of the API token inside the tokens Secret
pub const API_TOKEN_KEY: &str = "apiToken";

/// Key holding the proxy URL inside a user-supplied proxy Secret
pub const PROXY_KEY: &str = "proxy";

// Scheduling

pub const USER_GROUP_ID: i64 = 1001;
pub const KUBERNETES_ARCH_LABEL: &str = "kubernetes.io/arch";
pub const KUBERNETES_OS_LABEL: &str = "kubernetes.io/os";
pub const TOPOLOGY_ZONE_KEY: &str = "topology.kubernetes.io/zone";
pub const TOPOLOGY_HOSTNAME_KEY: &str = "kubernetes.io/hostname";
pub const SUPPORTED_ARCHITECTURES: [&str; 3] = ["amd64", "arm64", "ppc64le"];
pub const SUPPORTED_OS: [&str; 1] = ["linux"];

/// Namespace whose UID identifies the cluster
pub const KUBE_SYSTEM_NAMESPACE: &str = "kube-system";

/// Operator version reported in deployment metadata
pub const OPERATOR_VERSION: &str = env!("CARGO_PKG_VERSION");
