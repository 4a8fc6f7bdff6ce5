//! Relay endpoint: one browser SSE subscription bridged to one upstream POST.
//!
//! - GET /api/mark-attendance: validate credentials, POST them to the upstream
//!   automation API, stream its progress back as `text/event-stream`
//! - GET /health: liveness probe
//!
//! The relay keeps no per-user state. Each request owns exactly one upstream
//! response; when the client goes away the body stream is dropped and the
//! upstream connection with it.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, HeaderName, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::reframe::reframe_stream;
use crate::types::{UpstreamRequest, REMEMBER_TOKEN_KEY, SESSION_COOKIE_KEY};

pub use crate::subscription::MARK_ATTENDANCE_PATH;

/// Shared state for the relay routes
#[derive(Clone)]
pub struct RelayState {
    config: Arc<RelayConfig>,
    http: reqwest::Client,
}

impl RelayState {
    pub fn new(config: RelayConfig) -> Self {
        Self::with_client(config, reqwest::Client::new())
    }

    pub fn with_client(config: RelayConfig, http: reqwest::Client) -> Self {
        Self {
            config: Arc::new(config),
            http,
        }
    }
}

/// Inbound query of the mark-attendance route.
///
/// Built from the raw pairs so that a repeated key (or a key given under both
/// its name and its alias) keeps the first value instead of failing
/// extraction. Empty values are treated exactly like missing ones.
#[derive(Debug, Default)]
pub struct MarkAttendanceQuery {
    pub user_email: Option<String>,
    pub quickchex_pass: Option<String>,
    pub gmail_app_password: Option<String>,
    pub session_cookie: Option<String>,
    pub remember_token: Option<String>,
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl MarkAttendanceQuery {
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut query = Self::default();
        for (key, value) in pairs {
            let slot = match key.as_str() {
                "user_email" => &mut query.user_email,
                "quickchex_pass" => &mut query.quickchex_pass,
                "gmail_app_password" => &mut query.gmail_app_password,
                SESSION_COOKIE_KEY | "session_cookie" => &mut query.session_cookie,
                REMEMBER_TOKEN_KEY | "remember_token" => &mut query.remember_token,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value);
            }
        }
        query
    }

    /// Build the upstream body. Continuation fields are forwarded only when
    /// the caller supplied them.
    pub fn into_upstream_request(self) -> Result<UpstreamRequest, RelayError> {
        match (
            present(self.user_email),
            present(self.quickchex_pass),
            present(self.gmail_app_password),
        ) {
            (Some(user_email), Some(quickchex_pass), Some(gmail_app_password)) => {
                Ok(UpstreamRequest {
                    user_email,
                    quickchex_pass,
                    gmail_app_password,
                    session_cookie: present(self.session_cookie),
                    remember_token: present(self.remember_token),
                })
            }
            _ => Err(RelayError::MissingCredentials),
        }
    }
}

pub fn router(state: RelayState) -> Router {
    Router::new()
        .route(MARK_ATTENDANCE_PATH, get(mark_attendance))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the relay until Ctrl+C.
pub async fn serve(config: RelayConfig) -> std::io::Result<()> {
    if config.upstream_url().is_none() {
        warn!("No upstream API URL configured; every mark-attendance request will fail with 500");
    }

    let listener = TcpListener::bind(config.bind_addr.as_str()).await?;
    info!(
        "QuickMark relay listening on http://{}{}",
        listener.local_addr()?,
        MARK_ATTENDANCE_PATH
    );

    let app = router(RelayState::new(config));
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("QuickMark relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        error!("Failed to install Ctrl+C handler: {}", err);
        return;
    }
    info!("Ctrl+C received, shutting down...");
}

async fn handle_health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "server": "quickmark-relay" }))
}

/// GET /api/mark-attendance
pub async fn mark_attendance(
    State(state): State<RelayState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Response, RelayError> {
    let request = MarkAttendanceQuery::from_pairs(pairs).into_upstream_request()?;

    let upstream_url = state.config.upstream_url().ok_or_else(|| {
        error!("Upstream API URL is not configured");
        RelayError::NotConfigured
    })?;

    info!("Proxying POST request to external API: {}", upstream_url);
    debug!(
        user = %request.user_email,
        continuation = request.session_cookie.is_some() || request.remember_token.is_some(),
        "forwarding credentials"
    );

    let response = state
        .http
        .post(upstream_url)
        .json(&request)
        .send()
        .await
        .map_err(|e| {
            error!("Error fetching from external API: {}", e);
            RelayError::UpstreamUnreachable(e)
        })?;

    let status = response.status();
    if !status.is_success() {
        let detail = response
            .text()
            .await
            .unwrap_or_else(|e| format!("<unreadable body: {}>", e));
        error!(
            "External API Error ({}): {} {}",
            upstream_url,
            status.as_u16(),
            detail
        );
        return Err(RelayError::UpstreamRejected {
            status: status.as_u16(),
        });
    }

    let frames = reframe_stream(response.bytes_stream());
    Ok(event_stream_response(Body::from_stream(frames)))
}

fn event_stream_response(body: Body) -> Response {
    let mut response = Response::new(body);
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(
        HeaderName::from_static("x-accel-buffering"),
        HeaderValue::from_static("no"),
    );
    response
}
