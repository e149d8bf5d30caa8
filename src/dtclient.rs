//! # Dynatrace API Client
//!
//! The backend calls the gateway reconciler needs: issuing ActiveGate auth
//! tokens and reading tenant connection info. Reconcilers depend on the
//! [`DynatraceClient`] trait; [`HttpDynatraceClient`] talks to the tenant API
//! over `reqwest` with rustls.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::kubeobjects::time::format_rfc3339;

/// Lifetime requested for new ActiveGate auth tokens
pub fn auth_token_lifetime() -> chrono::Duration {
    chrono::Duration::days(30)
}

#[derive(Debug, Error)]
pub enum DtClientError {
    #[error("API token is empty")]
    EmptyToken,
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("dynatrace server error {code}: {message}")]
    Server { code: u16, message: String },
    #[error("unexpected response: {0}")]
    Response(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveGateAuthToken {
    pub id: String,
    pub token: String,
    #[serde(default)]
    pub expiration_date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveGateConnectionInfo {
    #[serde(rename = "tenantUUID")]
    pub tenant_uuid: String,
    pub tenant_token: String,
    #[serde(default)]
    pub communication_endpoints: Vec<String>,
}

impl ActiveGateConnectionInfo {
    /// Endpoints as the comma separated list the gateway expects
    pub fn endpoints(&self) -> String {
        self.communication_endpoints.join(",")
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthTokenRequest {
    name: String,
    seed_token: bool,
    active_gate_type: &'static str,
    expiration_date: String,
}

#[derive(Debug, Deserialize)]
struct ServerErrorResponse {
    error: ServerErrorBody,
}

#[derive(Debug, Deserialize)]
struct ServerErrorBody {
    #[serde(default)]
    code: u16,
    #[serde(default)]
    message: String,
}

#[async_trait]
pub trait DynatraceClient: Send + Sync {
    async fn get_activegate_auth_token(
        &self,
        dynakube_name: &str,
    ) -> Result<ActiveGateAuthToken, DtClientError>;

    async fn get_activegate_connection_info(&self)
        -> Result<ActiveGateConnectionInfo, DtClientError>;
}

pub struct HttpDynatraceClient {
    http_client: Client,
    api_url: String,
    api_token: String,
}

impl std::fmt::Debug for HttpDynatraceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpDynatraceClient")
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}

impl HttpDynatraceClient {
    pub fn new(api_url: &str, api_token: &str) -> Result<Self, DtClientError> {
        if api_token.is_empty() {
            return Err(DtClientError::EmptyToken);
        }
        let http_client = Client::builder()
            .timeout(std::time::Duration::from_secs(15 * 60))
            .build()?;
        Ok(Self {
            http_client,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_token: api_token.to_string(),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http_client
            .request(method, format!("{}{}", self.api_url, path))
            .header("Accept", "application/json")
            .header("Authorization", format!("Api-Token {}", self.api_token))
    }

    async fn read_response<T: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
    ) -> Result<T, DtClientError> {
        let status = response.status();
        let body = response.text().await?;
        if status != StatusCode::OK && status != StatusCode::CREATED {
            return Err(server_error(status, &body));
        }
        serde_json::from_str(&body).map_err(|e| DtClientError::Response(e.to_string()))
    }
}

fn server_error(status: StatusCode, body: &str) -> DtClientError {
    match serde_json::from_str::<ServerErrorResponse>(body) {
        Ok(parsed) => DtClientError::Server {
            code: if parsed.error.code == 0 {
                status.as_u16()
            } else {
                parsed.error.code
            },
            message: parsed.error.message,
        },
        Err(_) => DtClientError::Server {
            code: status.as_u16(),
            message: body.to_string(),
        },
    }
}

fn token_name(dynakube_name: &str) -> String {
    format!("dynatrace-operator-{dynakube_name}")
}

fn expiration_date(now: DateTime<Utc>) -> String {
    format_rfc3339(now + auth_token_lifetime())
}

#[async_trait]
impl DynatraceClient for HttpDynatraceClient {
    async fn get_activegate_auth_token(
        &self,
        dynakube_name: &str,
    ) -> Result<ActiveGateAuthToken, DtClientError> {
        let body = AuthTokenRequest {
            name: token_name(dynakube_name),
            seed_token: false,
            active_gate_type: "ENVIRONMENT",
            expiration_date: expiration_date(Utc::now()),
        };
        debug!(name = %body.name, "requesting ActiveGate auth token");
        let response = self
            .request(reqwest::Method::POST, "/v2/activeGateTokens")
            .json(&body)
            .send()
            .await?;
        Self::read_response(response).await
    }

    async fn get_activegate_connection_info(
        &self,
    ) -> Result<ActiveGateConnectionInfo, DtClientError> {
        debug!("requesting ActiveGate connection info");
        let response = self
            .request(
                reqwest::Method::GET,
                "/v1/deployment/installer/gateway/connectioninfo",
            )
            .send()
            .await?;
        Self::read_response(response).await
    }
}
