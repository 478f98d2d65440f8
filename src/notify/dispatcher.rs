//! Detached notification dispatch.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{Method, StatusCode};
use serde_json::json;
use tokio::task::JoinHandle;

use crate::config::NotificationConfig;
use crate::discovery::{internal_http_client, DiscoveryClient, Unresolved};
use crate::http::request::X_REQUEST_ID;
use crate::observability::metrics;

/// Primary operations that notify the notification service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Signup,
    Login,
    Upload,
}

impl NotificationKind {
    /// Path on the notification service.
    pub fn path(&self) -> &'static str {
        match self {
            NotificationKind::Signup => "/notify-signup",
            NotificationKind::Login => "/notify-login",
            NotificationKind::Upload => "/notify-upload",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            NotificationKind::Signup => "signup",
            NotificationKind::Login => "login",
            NotificationKind::Upload => "upload",
        }
    }

    /// Trigger for a proxied `/user/{path}` call. `path` excludes the `/user/` prefix.
    pub fn for_user_route(method: &Method, path: &str, status: StatusCode) -> Option<Self> {
        if method != Method::POST {
            return None;
        }
        match (path.trim_matches('/'), status) {
            ("signup", StatusCode::CREATED) => Some(NotificationKind::Signup),
            ("login", StatusCode::OK) => Some(NotificationKind::Login),
            _ => None,
        }
    }

    /// Trigger for `POST /beats/upload`.
    pub fn for_upload(status: StatusCode) -> Option<Self> {
        (status == StatusCode::CREATED).then_some(NotificationKind::Upload)
    }
}

/// How a notification ended. Logged and counted, nothing else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationOutcome {
    Delivered,
    Rejected(u16),
    Unresolved(Unresolved),
    Failed(String),
    Disabled,
}

impl NotificationOutcome {
    fn label(&self) -> &'static str {
        match self {
            NotificationOutcome::Delivered => "delivered",
            NotificationOutcome::Rejected(_) => "rejected",
            NotificationOutcome::Unresolved(_) => "unresolved",
            NotificationOutcome::Failed(_) => "failed",
            NotificationOutcome::Disabled => "disabled",
        }
    }
}

/// Fires notifications on detached tasks.
#[derive(Debug, Clone)]
pub struct NotificationDispatcher {
    discovery: Arc<DiscoveryClient>,
    http: reqwest::Client,
    config: NotificationConfig,
}

impl NotificationDispatcher {
    pub fn new(discovery: Arc<DiscoveryClient>, config: NotificationConfig) -> Self {
        Self {
            discovery,
            http: internal_http_client(),
            config,
        }
    }

    /// Spawn the notification. The caller may drop the handle.
    pub fn dispatch(&self, kind: NotificationKind, request_id: Option<String>) -> JoinHandle<NotificationOutcome> {
        let this = self.clone();
        tokio::spawn(async move { this.notify(kind, request_id.as_deref()).await })
    }

    /// Resolve the notification service and POST once.
    pub async fn notify(&self, kind: NotificationKind, request_id: Option<&str>) -> NotificationOutcome {
        let outcome = self.send(kind, request_id).await;

        match &outcome {
            NotificationOutcome::Delivered => {
                tracing::info!(kind = kind.label(), request_id = ?request_id, "Notification sent")
            }
            NotificationOutcome::Disabled => {}
            other => tracing::warn!(
                kind = kind.label(),
                request_id = ?request_id,
                outcome = ?other,
                "Notification not delivered"
            ),
        }
        metrics::record_notification(kind.label(), outcome.label());
        outcome
    }

    async fn send(&self, kind: NotificationKind, request_id: Option<&str>) -> NotificationOutcome {
        if !self.config.enabled {
            return NotificationOutcome::Disabled;
        }

        let record = match self.discovery.resolve(&self.config.service).await {
            Ok(record) => record,
            Err(reason) => return NotificationOutcome::Unresolved(reason),
        };

        let url = format!("{}{}", record.base_url(), kind.path());
        let mut request = self
            .http
            .post(&url)
            .timeout(Duration::from_millis(self.config.timeout_ms))
            .json(&json!({ "event": kind.label() }));
        if let Some(id) = request_id {
            request = request.header(X_REQUEST_ID, id);
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => NotificationOutcome::Delivered,
            Ok(response) => NotificationOutcome::Rejected(response.status().as_u16()),
            Err(e) => NotificationOutcome::Failed(e.to_string()),
        }
    }
}
