//! Unified error type for the proxy.
//!
//! [`ProxyError`] carries the Anthropic-visible error taxonomy: every variant
//! maps to an `error.type` string and an HTTP status, and converts into the
//! Anthropic error body via [`IntoResponse`]. Handlers return
//! `Result<T, ProxyError>` and propagate with `?` — no manual `map_err`, no
//! boilerplate.
//!
//! Upstream HTTP failures are folded into the same taxonomy by status code
//! through [`ProxyError::from_status`], so a 429 from OpenAI surfaces to the
//! client as a `rate_limit_error` just as Anthropic itself would report it.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Error taxonomy exposed to clients in the `error.type` field.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// Request failed schema validation — rejected before any upstream call.
    #[error("{0}")]
    InvalidRequest(String),

    /// Upstream rejected our credentials, or no credential is configured.
    #[error("{0}")]
    Authentication(String),

    /// Upstream denied access to the requested resource.
    #[error("{0}")]
    Permission(String),

    /// Unknown model or endpoint.
    #[error("{0}")]
    NotFound(String),

    /// Upstream rate limit hit.
    #[error("{0}")]
    RateLimit(String),

    /// Upstream reported overload (Anthropic's 529).
    #[error("{0}")]
    Overloaded(String),

    /// Upstream 5xx or internal failure.
    #[error("{0}")]
    Api(String),

    /// Transport-level failure talking to the upstream.
    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),
}

impl ProxyError {
    /// The `error.type` string for the response body.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request_error",
            Self::Authentication(_) => "authentication_error",
            Self::Permission(_) => "permission_error",
            Self::NotFound(_) => "not_found_error",
            Self::RateLimit(_) => "rate_limit_error",
            Self::Overloaded(_) => "overloaded_error",
            Self::Api(_) | Self::Upstream(_) => "api_error",
        }
    }

    /// HTTP status for the response.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Authentication(_) => StatusCode::UNAUTHORIZED,
            Self::Permission(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::RateLimit(_) => StatusCode::TOO_MANY_REQUESTS,
            // 529 is Anthropic-specific and not in the StatusCode constants.
            Self::Overloaded(_) => {
                StatusCode::from_u16(529).expect("529 is a valid status code")
            }
            Self::Api(_) | Self::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Fold an upstream non-2xx reply into the taxonomy.
    ///
    /// When the body parses as JSON carrying an `error.message` (OpenAI and
    /// Anthropic both use this shape) that message is surfaced; otherwise the
    /// raw body text is used.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| {
                v.pointer("/error/message")
                    .or_else(|| v.pointer("/message"))
                    .and_then(|m| m.as_str())
                    .map(String::from)
            })
            .unwrap_or_else(|| body.to_string());

        match status.as_u16() {
            400 => Self::InvalidRequest(message),
            401 => Self::Authentication(message),
            403 => Self::Permission(message),
            404 => Self::NotFound(message),
            429 => Self::RateLimit(message),
            529 => Self::Overloaded(message),
            s => Self::Api(format!("upstream returned HTTP {s}: {message}")),
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        tracing::warn!(kind = self.kind(), error = %self, "request failed");
        (
            self.status(),
            Json(json!({
                "type": "error",
                "error": { "type": self.kind(), "message": self.to_string() },
            })),
        )
            .into_response()
    }
}
