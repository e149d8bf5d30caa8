//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use std::time::Duration;

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Environment variables are populated from the operator Deployment manifest.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Requeue interval after a successful reconcile (seconds)
    pub reconcile_interval_secs: u64,
    /// Reconciliation error requeue interval (seconds)
    /// How long to wait before retrying a failed reconciliation
    pub reconciliation_error_requeue_secs: u64,
    /// Requeue interval while tenant or kube-system UUID is not yet known (seconds)
    pub transient_requeue_secs: u64,
    /// Minimum age of cached connection info before the backend is queried again (seconds)
    pub api_request_threshold_secs: u64,
    /// HTTP server port for metrics and probes
    pub metrics_port: u16,
    /// Enable the metrics and probe server
    pub enable_metrics: bool,
    /// Namespace the operator is deployed to
    pub operator_namespace: String,
    /// Deployment flavour (manifest, helm, olm)
    pub deployment_type: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            reconcile_interval_secs: DEFAULT_RECONCILE_INTERVAL_SECS,
            reconciliation_error_requeue_secs: DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS,
            transient_requeue_secs: DEFAULT_TRANSIENT_REQUEUE_SECS,
            api_request_threshold_secs: DEFAULT_API_REQUEST_THRESHOLD_SECS,
            metrics_port: DEFAULT_METRICS_PORT,
            enable_metrics: true,
            operator_namespace: DEFAULT_OPERATOR_NAMESPACE.to_string(),
            deployment_type: DEFAULT_DEPLOYMENT_TYPE.to_string(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        use crate::constants::*;
        Self {
            reconcile_interval_secs: env_var_or_default(
                "RECONCILE_INTERVAL_SECS",
                DEFAULT_RECONCILE_INTERVAL_SECS,
            ),
            reconciliation_error_requeue_secs: env_var_or_default(
                "RECONCILIATION_ERROR_REQUEUE_SECS",
                DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS,
            ),
            transient_requeue_secs: env_var_or_default(
                "TRANSIENT_REQUEUE_SECS",
                DEFAULT_TRANSIENT_REQUEUE_SECS,
            ),
            api_request_threshold_secs: env_var_or_default(
                "API_REQUEST_THRESHOLD_SECS",
                DEFAULT_API_REQUEST_THRESHOLD_SECS,
            ),
            metrics_port: env_var_or_default("METRICS_PORT", DEFAULT_METRICS_PORT),
            enable_metrics: env_var_or_default_bool("ENABLE_METRICS", true),
            operator_namespace: env_var_or_default_str("POD_NAMESPACE", DEFAULT_OPERATOR_NAMESPACE),
            deployment_type: env_var_or_default_str("DEPLOYMENT_TYPE", DEFAULT_DEPLOYMENT_TYPE),
        }
    }

    /// Get requeue duration after a successful reconcile
    pub fn reconcile_interval_duration(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }

    /// Get reconciliation error requeue duration
    pub fn reconciliation_error_requeue_duration(&self) -> Duration {
        Duration::from_secs(self.reconciliation_error_requeue_secs)
    }

    /// Get requeue duration for precondition sentinels
    pub fn transient_requeue_duration(&self) -> Duration {
        Duration::from_secs(self.transient_requeue_secs)
    }

    /// Get the connection-info refresh threshold
    pub fn api_request_threshold(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.api_request_threshold_secs).unwrap_or(i64::MAX))
    }
}

/// Read environment variable or return default value
fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T
where
    <T as std::str::FromStr>::Err: std::fmt::Debug,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read environment variable as boolean or return default
fn env_var_or_default_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| {
            let v_lower = v.to_lowercase();
            v_lower == "true" || v_lower == "1" || v_lower == "yes" || v_lower == "on"
        })
        .unwrap_or(default)
}

/// Read environment variable as string or return default
fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_constants() {
        let config = ControllerConfig::default();
        assert_eq!(config.reconcile_interval_secs, 300);
        assert_eq!(config.api_request_threshold_secs, 900);
        assert_eq!(config.operator_namespace, "dynatrace");
        assert_eq!(config.reconciliation_error_requeue_duration(), Duration::from_secs(30));
    }

    #[test]
    fn test_api_request_threshold_as_chrono() {
        let config = ControllerConfig {
            api_request_threshold_secs: 60,
            ..ControllerConfig::default()
        };
        assert_eq!(config.api_request_threshold(), chrono::Duration::minutes(1));
    }

    #[test]
    fn test_env_var_or_default_falls_back_on_garbage() {
        let value: u64 = env_var_or_default("DYNAKUBE_OPERATOR_TEST_UNSET_VARIABLE", 7);
        assert_eq!(value, 7);
        assert!(env_var_or_default_bool("DYNAKUBE_OPERATOR_TEST_UNSET_VARIABLE", true));
    }
}
