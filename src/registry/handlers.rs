//! HTTP handlers for the registry service.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::config::schema::opt_string_or_number;
use crate::error::RegistryError;
use crate::observability::metrics;
use crate::registry::store::{Registration, ServiceRegistry};

/// Body of `POST /register` and `POST /deregister`.
///
/// Every field is optional at the serde level so that missing fields get the
/// registry's own 400 body. Bodies that do not parse at all are mapped to the
/// same error by `instance`.
#[derive(Debug, Default, Deserialize)]
pub struct InstanceRequest {
    #[serde(default)]
    pub service_name: Option<String>,
    #[serde(default)]
    pub service_address: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub service_port: Option<String>,
}

impl InstanceRequest {
    fn fields(&self) -> (&str, &str, &str) {
        (
            self.service_name.as_deref().unwrap_or_default(),
            self.service_address.as_deref().unwrap_or_default(),
            self.service_port.as_deref().unwrap_or_default(),
        )
    }
}

/// Unwrap the JSON extractor, turning any rejection into `InvalidInput`.
fn instance(body: Result<Json<InstanceRequest>, JsonRejection>) -> Result<InstanceRequest, RegistryError> {
    body.map(|Json(body)| body).map_err(|rejection| {
        tracing::warn!(error = %rejection, "Unreadable registry request body");
        RegistryError::InvalidInput(rejection.body_text())
    })
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            RegistryError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "Missing required fields"),
            RegistryError::NotFound(_) => (StatusCode::NOT_FOUND, "Service not found"),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub async fn register(
    State(registry): State<Arc<ServiceRegistry>>,
    body: Result<Json<InstanceRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, RegistryError> {
    let body = instance(body)?;
    let (name, address, port) = body.fields();
    let outcome = registry.register(name, address, port).inspect_err(|e| {
        tracing::warn!(error = %e, "Rejected registration");
    })?;

    match outcome {
        Registration::Added => {
            tracing::info!(service = %name, address = %address, port = %port, "Service registered");
            metrics::record_registry_size(registry.status());
        }
        Registration::AlreadyPresent => {
            tracing::debug!(service = %name, address = %address, port = %port, "Instance already registered");
        }
    }

    Ok(Json(json!({
        "message": format!("Service '{}' registered successfully on port {}", name, port)
    })))
}

pub async fn deregister(
    State(registry): State<Arc<ServiceRegistry>>,
    body: Result<Json<InstanceRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, RegistryError> {
    let body = instance(body)?;
    let (name, address, port) = body.fields();
    let removed = registry.deregister(name, address, port).inspect_err(|e| {
        tracing::warn!(error = %e, "Rejected deregistration");
    })?;

    if removed {
        tracing::info!(service = %name, address = %address, port = %port, "Service deregistered");
        metrics::record_registry_size(registry.status());
    } else {
        tracing::debug!(service = %name, address = %address, port = %port, "Deregistration matched nothing");
    }

    Ok(Json(json!({ "message": "Service deregistered successfully" })))
}

pub async fn lookup(
    State(registry): State<Arc<ServiceRegistry>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, RegistryError> {
    let record = registry.lookup(&name)?;
    Ok(Json(record))
}

pub async fn list(State(registry): State<Arc<ServiceRegistry>>) -> impl IntoResponse {
    Json(json!({ "services": registry.snapshot() }))
}

pub async fn status(State(registry): State<Arc<ServiceRegistry>>) -> impl IntoResponse {
    Json(json!({
        "status": "Service Discovery is running",
        "registered_services": registry.status(),
    }))
}
