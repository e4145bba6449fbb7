//! Request ID middleware.
//!
//! Every inbound request is assigned a unique `X-Request-ID`:
//!
//! - Accepted from the caller if they already provide `X-Request-ID`
//! - Freshly generated (UUID v4) otherwise
//! - Wrapped in a [`tracing`] span so every log line for the request
//!   (including mid-stream warnings from the translator) carries it
//! - Echoed back in the `X-Request-ID` response header
//!
//! For streaming responses the header is attached before the SSE body starts,
//! which lets clients correlate a truncated stream with server logs. Handlers
//! that need the id log within the span; nothing reads it from request state.

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use tracing::Instrument as _;
use uuid::Uuid;

/// Axum middleware that assigns a request ID to every request.
pub async fn request_id_middleware(req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(String::from)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let span = tracing::debug_span!("request", id = %id);
    let mut response = next.run(req).instrument(span).await;

    if let Ok(header_value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert("x-request-id", header_value);
    }

    response
}
