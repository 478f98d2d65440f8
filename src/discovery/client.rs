//! HTTP client for the service registry.

use std::time::Duration;

use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;

use crate::config::DiscoveryConfig;
use crate::registry::ServiceRecord;

/// Why a service name could not be resolved.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Unresolved {
    #[error("registry answered {0}")]
    NotRegistered(u16),

    #[error("registry lookup timed out")]
    Timeout,

    #[error("registry unreachable: {0}")]
    Transport(String),

    #[error("malformed registry response: {0}")]
    Malformed(String),
}

impl Unresolved {
    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Unresolved::Timeout
        } else if err.is_decode() {
            Unresolved::Malformed(err.to_string())
        } else {
            Unresolved::Transport(err.to_string())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PingStatus {
    Running,
    Error,
    Unavailable,
}

/// One entry of the gateway `/status` aggregation.
#[derive(Debug, Clone, Serialize)]
pub struct ServicePing {
    pub service: String,
    pub status: PingStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Client for service-to-service calls. Ignores proxy environment variables.
pub fn internal_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .build()
        .unwrap_or_default()
}

/// Registry client shared by the gateway.
#[derive(Debug, Clone)]
pub struct DiscoveryClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl DiscoveryClient {
    pub fn new(config: &DiscoveryConfig) -> Self {
        Self::with_client(internal_http_client(), config)
    }

    pub fn with_client(http: reqwest::Client, config: &DiscoveryConfig) -> Self {
        Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolve `name` to its first registered instance.
    pub async fn resolve(&self, name: &str) -> Result<ServiceRecord, Unresolved> {
        let url = format!("{}/services/{}", self.base_url, name);
        let result = self.fetch(&url).await;

        match &result {
            Ok(record) => tracing::debug!(
                service = %name,
                address = %record.address,
                port = %record.port,
                "Resolved service"
            ),
            Err(reason) => tracing::warn!(service = %name, reason = %reason, "Service unresolved"),
        }
        result
    }

    async fn fetch(&self, url: &str) -> Result<ServiceRecord, Unresolved> {
        let response = self
            .http
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(Unresolved::from_reqwest)?;

        if response.status() != StatusCode::OK {
            return Err(Unresolved::NotRegistered(response.status().as_u16()));
        }

        response
            .json::<ServiceRecord>()
            .await
            .map_err(Unresolved::from_reqwest)
    }

    /// Resolve `name` and call its `/status` endpoint.
    pub async fn ping(&self, name: &str, timeout: Duration) -> ServicePing {
        let record = match self.resolve(name).await {
            Ok(record) => record,
            Err(reason) => {
                return ServicePing {
                    service: name.to_string(),
                    status: PingStatus::Unavailable,
                    code: None,
                    error: Some(format!("{} unavailable: {}", name, reason)),
                }
            }
        };

        let url = format!("{}/status", record.base_url());
        match self.http.get(&url).timeout(timeout).send().await {
            Ok(response) if response.status() == StatusCode::OK => ServicePing {
                service: name.to_string(),
                status: PingStatus::Running,
                code: None,
                error: None,
            },
            Ok(response) => ServicePing {
                service: name.to_string(),
                status: PingStatus::Error,
                code: Some(response.status().as_u16()),
                error: None,
            },
            Err(e) => ServicePing {
                service: name.to_string(),
                status: PingStatus::Unavailable,
                code: None,
                error: Some(e.to_string()),
            },
        }
    }
}
