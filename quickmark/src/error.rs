//! Error types for the relay, the credential store and the client consumer.

use thiserror::Error;

/// Errors surfaced by the relay endpoint.
///
/// Every variant except `Stream` is turned into a JSON error body of the form
/// `{"status":"error","message":...}` before any byte of SSE is written.
/// `Stream` only occurs once the SSE response has started and aborts it.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Missing credentials")]
    MissingCredentials,
    #[error("API URL not configured on server")]
    NotConfigured,
    /// The upstream answered with a non-success status. Its body is logged
    /// server-side and never carried here.
    #[error("External API Error: {status}")]
    UpstreamRejected { status: u16 },
    #[error("Failed to connect to external API proxy")]
    UpstreamUnreachable(#[source] reqwest::Error),
    #[error("Upstream stream error: {0}")]
    Stream(String),
}

impl RelayError {
    /// HTTP status the browser sees for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            RelayError::MissingCredentials => 400,
            RelayError::NotConfigured => 500,
            RelayError::UpstreamRejected { status } => *status,
            RelayError::UpstreamUnreachable(_) => 500,
            RelayError::Stream(_) => 502,
        }
    }
}

#[cfg(feature = "server")]
impl axum::response::IntoResponse for RelayError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::BAD_GATEWAY);
        let body = serde_json::json!({
            "status": "error",
            "message": self.to_string(),
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Error type for key-value persistence backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serde(String),
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serde(e.to_string())
    }
}

impl From<toml::de::Error> for StoreError {
    fn from(e: toml::de::Error) -> Self {
        StoreError::Serde(e.to_string())
    }
}

impl From<toml::ser::Error> for StoreError {
    fn from(e: toml::ser::Error) -> Self {
        StoreError::Serde(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {reason}")]
    Read { path: String, reason: String },
    #[error("Failed to parse config file {path}: {reason}")]
    Parse { path: String, reason: String },
}

/// Errors raised on the client side of a run.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Form input rejected before any network call. The message is user-facing.
    #[error("{0}")]
    Validation(String),
    #[error("Invalid relay URL: {0}")]
    InvalidRelayUrl(String),
    #[error("Failed to open subscription: {0}")]
    Subscribe(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}
