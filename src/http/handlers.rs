//! Gateway route handlers.

use std::time::{Duration, Instant};

use axum::{
    body::{Body, Bytes},
    extract::{FromRequest, Multipart, Path, State},
    http::{Method, Request},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::error::{GatewayError, GatewayResult};
use crate::http::request::{forwarded_headers, request_id};
use crate::http::server::AppState;
use crate::notify::NotificationKind;
use crate::observability::metrics;
use crate::routing::UpstreamRequest;

const NO_FILE_PART: &str = "No file part in the request";

/// `GET|POST|PUT|DELETE /user/{*path}` proxied to the user/file service.
pub async fn user_proxy(
    State(state): State<AppState>,
    Path(path): Path<String>,
    request: Request<Body>,
) -> Response {
    let start = Instant::now();
    let method = request.method().clone();

    let response = proxy_user(&state, &path, request)
        .await
        .unwrap_or_else(IntoResponse::into_response);

    metrics::record_request("user", method.as_str(), response.status().as_u16(), start);
    response
}

async fn proxy_user(state: &AppState, path: &str, request: Request<Body>) -> GatewayResult<Response> {
    let (parts, body) = request.into_parts();
    let request_id = request_id(&parts.headers);
    let body = read_body(body, state.config.listener.max_body_size).await?;

    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| format!("/user/{}", path));

    tracing::debug!(
        request_id = ?request_id,
        method = %parts.method,
        path = %path_and_query,
        "Proxying user request"
    );

    let upstream = UpstreamRequest {
        method: parts.method.clone(),
        path_and_query,
        headers: forwarded_headers(&parts.headers),
        body,
    };
    let response = state.dispatch(&state.config.upstream.service, &upstream).await?;

    if let Some(kind) = NotificationKind::for_user_route(&parts.method, path, response.status) {
        state.notifier.dispatch(kind, request_id);
    }
    Ok(response.into_response())
}

/// `POST /beats/upload`: validate the multipart form, then forward the raw body.
pub async fn beat_upload(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();

    let response = upload(&state, request)
        .await
        .unwrap_or_else(IntoResponse::into_response);

    metrics::record_request("upload", Method::POST.as_str(), response.status().as_u16(), start);
    response
}

async fn upload(state: &AppState, request: Request<Body>) -> GatewayResult<Response> {
    let (parts, body) = request.into_parts();
    let request_id = request_id(&parts.headers);
    let headers = forwarded_headers(&parts.headers);
    let body = read_body(body, state.config.listener.max_body_size).await?;

    let form = inspect_upload(Request::from_parts(parts, Body::from(body.clone()))).await?;
    tracing::info!(
        request_id = ?request_id,
        file = ?form.file_name,
        bytes = form.file_size,
        title = ?form.title,
        artist = ?form.artist,
        "Forwarding beat upload"
    );

    let upstream = UpstreamRequest {
        method: Method::POST,
        path_and_query: "/beats/upload".to_string(),
        headers,
        body,
    };
    let response = state.dispatch(&state.config.upstream.service, &upstream).await?;

    if let Some(kind) = NotificationKind::for_upload(response.status) {
        state.notifier.dispatch(kind, request_id);
    }
    Ok(response.into_response())
}

/// Fields of a beat upload form the gateway cares about.
#[derive(Debug, Default)]
struct UploadForm {
    file_name: Option<String>,
    file_size: usize,
    title: Option<String>,
    artist: Option<String>,
}

/// Parse the form and require a `beat` file part.
async fn inspect_upload(request: Request<Body>) -> GatewayResult<UploadForm> {
    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|_| GatewayError::BadRequest(NO_FILE_PART.to_string()))?;

    let mut form = UploadForm::default();
    let mut has_beat = false;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| GatewayError::BadRequest(format!("Malformed multipart body: {}", e)))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("beat") => {
                form.file_name = field.file_name().map(str::to_string);
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| GatewayError::BadRequest(format!("Malformed multipart body: {}", e)))?;
                form.file_size = data.len();
                has_beat = true;
            }
            Some("title") => form.title = field.text().await.ok(),
            Some("artist") => form.artist = field.text().await.ok(),
            _ => {}
        }
    }

    if has_beat {
        Ok(form)
    } else {
        Err(GatewayError::BadRequest(NO_FILE_PART.to_string()))
    }
}

/// `GET /status`: ping each configured service through the registry.
pub async fn gateway_status(State(state): State<AppState>) -> Response {
    let start = Instant::now();
    let timeout = Duration::from_millis(state.config.status.timeout_ms);

    let mut services = Vec::with_capacity(state.config.status.services.len());
    for name in &state.config.status.services {
        services.push(state.discovery.ping(name, timeout).await);
    }

    let response = Json(json!({
        "gateway_status": "running",
        "services": services,
        "circuit_breakers": state.breakers().snapshot(),
    }))
    .into_response();

    metrics::record_request("status", Method::GET.as_str(), response.status().as_u16(), start);
    response
}

async fn read_body(body: Body, limit: usize) -> GatewayResult<Bytes> {
    axum::body::to_bytes(body, limit)
        .await
        .map_err(|e| GatewayError::BadRequest(format!("Failed to read request body: {}", e)))
}
