//! Names, ports and paths shared by the gateway reconcilers and modifiers.

pub const ACTIVEGATE_NAME: &str = "activegate";
pub const ACTIVEGATE_CONTAINER_NAME: &str = "activegate";
pub const SERVICE_ACCOUNT_NAME: &str = "dynatrace-activegate";

// Ports

pub const HTTPS_SERVICE_PORT: i32 = 443;
pub const HTTPS_SERVICE_PORT_NAME: &str = "https";
pub const HTTP_SERVICE_PORT: i32 = 80;
pub const HTTP_SERVICE_PORT_NAME: &str = "http";
pub const HTTPS_CONTAINER_PORT: i32 = 9999;
pub const HTTP_CONTAINER_PORT: i32 = 9998;

// Environment

pub const ENV_DT_CAPABILITIES: &str = "DT_CAPABILITIES";
pub const ENV_DT_ID_SEED_NAMESPACE: &str = "DT_ID_SEED_NAMESPACE";
pub const ENV_DT_ID_SEED_CLUSTER_ID: &str = "DT_ID_SEED_K8S_CLUSTER_ID";
pub const ENV_DT_DEPLOYMENT_METADATA: &str = "DT_DEPLOYMENT_METADATA";
pub const ENV_DT_GROUP: &str = "DT_GROUP";
pub const ENV_DT_NETWORK_ZONE: &str = "DT_NETWORK_ZONE";
pub const ENV_DT_HTTP_PORT: &str = "DT_HTTP_PORT";
pub const ENV_DT_DNS_ENTRY_POINT: &str = "DT_DNS_ENTRY_POINT";
pub const ENV_DT_TENANT: &str = "DT_TENANT";
pub const ENV_DT_SERVER: &str = "DT_SERVER";

// Secrets and ConfigMaps

pub const AUTH_TOKEN_SECRET_SUFFIX: &str = "-activegate-auth-token";
pub const AUTH_TOKEN_KEY: &str = "auth-token";
pub const TENANT_SECRET_SUFFIX: &str = "-activegate-tenant-secret";
pub const TENANT_TOKEN_KEY: &str = "tenant-token";
pub const CONNECTION_INFO_CONFIG_MAP_SUFFIX: &str = "-activegate-connection-info";
pub const TENANT_UUID_KEY: &str = "tenant-uuid";
pub const COMMUNICATION_ENDPOINTS_KEY: &str = "communication-endpoints";
pub const CUSTOM_PROPERTIES_SUFFIX: &str = "-custom-properties";
pub const CUSTOM_PROPERTIES_KEY: &str = "customProperties";
pub const PROXY_SECRET_SUFFIX: &str = "-activegate-internal-proxy";
pub const PROXY_HOST_KEY: &str = "host";
pub const PROXY_PORT_KEY: &str = "port";
pub const PROXY_USERNAME_KEY: &str = "username";
pub const PROXY_PASSWORD_KEY: &str = "password";
pub const DEPLOYMENT_METADATA_SUFFIX: &str = "-deployment-metadata";
pub const DEPLOYMENT_METADATA_KEY: &str = "activegate";
pub const TRUSTED_CAS_KEY: &str = "certs";

// Volumes and mount paths

pub const AUTH_TOKEN_VOLUME: &str = "ag-authtoken-secret";
pub const AUTH_TOKEN_MOUNT_PATH: &str = "/var/lib/dynatrace/secrets/tokens/auth-token";
pub const TENANT_TOKEN_VOLUME: &str = "ag-tenant-secret";
pub const TENANT_TOKEN_MOUNT_PATH: &str = "/var/lib/dynatrace/secrets/tokens/tenant-token";
pub const SSL_VOLUME: &str = "dynatrace-ssl";
pub const SSL_MOUNT_PATH: &str = "/var/lib/dynatrace/gateway/ssl";
pub const TLS_VOLUME: &str = "server-certs";
pub const TLS_MOUNT_PATH: &str = "/var/lib/dynatrace/secrets/tls";
pub const TRUSTED_CAS_VOLUME: &str = "trusted-cas";
pub const TRUSTED_CAS_FILE: &str = "rootca.pem";
pub const TRUSTED_CAS_MOUNT_PATH: &str = "/var/lib/dynatrace/secrets/rootca/rootca.pem";
pub const CUSTOM_PROPERTIES_VOLUME: &str = "custom-properties";
pub const CUSTOM_PROPERTIES_FILE: &str = "custom.properties";
pub const CUSTOM_PROPERTIES_MOUNT_PATH: &str =
    "/var/lib/dynatrace/gateway/config_template/custom.properties";
pub const PROXY_VOLUME: &str = "internal-proxy-secret-volume";
pub const PROXY_MOUNT_DIR: &str = "/var/lib/dynatrace/secrets/internal-proxy";
pub const TRUSTSTORE_VOLUME: &str = "truststore-volume";
pub const TRUSTSTORE_FILE: &str = "k8s-local.jks";
pub const CACERTS_PATH: &str = "/opt/dynatrace/gateway/jre/lib/security/cacerts";
pub const K8S_CRT2JKS_SCRIPT: &str = "/opt/dynatrace/gateway/k8scrt2jks.sh";
pub const K8S_CRT2JKS_WORKING_DIR: &str = "/var/lib/dynatrace/gateway";
pub const CERTIFICATE_LOADER_CONTAINER: &str = "certificate-loader";

/// Writable directories of a gateway running with a read-only root filesystem
pub const READ_ONLY_VOLUMES: [(&str, &str); 5] = [
    ("ag-lib-gateway-data", "/var/lib/dynatrace/gateway/data"),
    ("ag-log-gateway", "/var/log/dynatrace/gateway"),
    ("ag-tmp-gateway", "/var/tmp/dynatrace/gateway"),
    ("ag-lib-gateway-config", "/var/lib/dynatrace/gateway/config"),
    ("ag-lib-gateway-temp", "/var/lib/dynatrace/gateway/temp"),
];

pub fn statefulset_name(dynakube: &str) -> String {
    format!("{dynakube}-{ACTIVEGATE_NAME}")
}

pub fn service_name(dynakube: &str) -> String {
    format!("{dynakube}-{ACTIVEGATE_NAME}")
}

pub fn auth_token_secret_name(dynakube: &str) -> String {
    format!("{dynakube}{AUTH_TOKEN_SECRET_SUFFIX}")
}

pub fn tenant_secret_name(dynakube: &str) -> String {
    format!("{dynakube}{TENANT_SECRET_SUFFIX}")
}

pub fn connection_info_config_map_name(dynakube: &str) -> String {
    format!("{dynakube}{CONNECTION_INFO_CONFIG_MAP_SUFFIX}")
}

/// `<dk>-<owner>-custom-properties`
pub fn custom_properties_secret_name(dynakube: &str, owner: &str) -> String {
    format!("{dynakube}-{owner}{CUSTOM_PROPERTIES_SUFFIX}")
}

pub fn proxy_secret_name(dynakube: &str) -> String {
    format!("{dynakube}{PROXY_SECRET_SUFFIX}")
}

pub fn deployment_metadata_name(dynakube: &str) -> String {
    format!("{dynakube}{DEPLOYMENT_METADATA_SUFFIX}")
}
