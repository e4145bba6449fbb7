//! HTTP surface of the proxy.
//!
//! Handlers are intentionally thin: schema work lives in [`crate::schema`]
//! and [`crate::convert`], streaming in [`crate::stream`], upstream I/O in
//! [`crate::backends`]. This module only assembles the route table and the
//! shared state.

pub mod completions;
pub mod health;
pub mod messages;
pub mod request_id;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::config::Config;

/// Shared application state — the immutable configuration only. Upstream
/// clients are built per request; `reqwest` connections are pooled inside.
pub struct AppState {
    pub config: Config,
}

/// Build the axum router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/v1/messages", post(messages::create_message))
        .route("/v1/messages/count_tokens", post(messages::count_tokens))
        .route("/v1/chat/completions", post(completions::chat_completions))
        .with_state(state)
}
