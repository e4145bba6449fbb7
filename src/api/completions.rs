//! `POST /v1/chat/completions` — OpenAI-format passthrough.
//!
//! The body is forwarded to the resolved upstream unchanged apart from model
//! normalization, so OpenAI-speaking clients can share the proxy (and its
//! model aliasing) with Anthropic-speaking ones. Streaming replies are
//! re-emitted as `data:` chunk lines with the `[DONE]` terminator; all three
//! providers surface the same chunk shape here.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::State,
    http::header,
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures_util::StreamExt;
use serde_json::Value;

use crate::backends::{ChunkStream, UpstreamClient};
use crate::error::ProxyError;
use crate::schema::openai::ChatRequest;
use crate::schema::{self, provider_of};

use super::AppState;

/// `POST /v1/chat/completions`.
pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    Json(mut body): Json<Value>,
) -> Result<Response, ProxyError> {
    let model = body
        .get("model")
        .and_then(Value::as_str)
        .ok_or_else(|| ProxyError::InvalidRequest("`model` field is required".into()))?;
    let normalized = schema::normalize_model(model, &state.config);
    body["model"] = Value::String(normalized);

    let request: ChatRequest = serde_json::from_value(body)
        .map_err(|e| ProxyError::InvalidRequest(format!("invalid request body: {e}")))?;

    let provider = provider_of(&request.model);
    let client = UpstreamClient::new(provider, &state.config)?;

    tracing::debug!(model = %request.model, provider = %provider, "passthrough dispatch");

    if request.stream.unwrap_or(false) {
        let chunks = client.complete_stream(&request).await?;
        Ok(passthrough_sse(chunks))
    } else {
        let response = client.complete(&request).await?;
        Ok(Json(response).into_response())
    }
}

/// Re-emit decoded chunks as OpenAI-style SSE, closing with `[DONE]`.
///
/// A mid-stream upstream error cannot become an HTTP error at this point; the
/// stream is terminated with `[DONE]` and the error logged.
fn passthrough_sse(upstream: ChunkStream) -> Response {
    struct Pipe {
        upstream: ChunkStream,
        done_sent: bool,
    }

    let pipe = Pipe { upstream, done_sent: false };

    let events = futures_util::stream::unfold(pipe, |mut pipe| async move {
        if pipe.done_sent {
            return None;
        }
        loop {
            match pipe.upstream.next().await {
                Some(Ok(chunk)) => match serde_json::to_string(&chunk) {
                    Ok(json) => return Some((Event::default().data(json), pipe)),
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to serialize chunk; skipping");
                    }
                },
                Some(Err(error)) => {
                    tracing::error!(error = %error, "upstream stream failed mid-passthrough");
                    pipe.done_sent = true;
                    return Some((Event::default().data("[DONE]"), pipe));
                }
                None => {
                    pipe.done_sent = true;
                    return Some((Event::default().data("[DONE]"), pipe));
                }
            }
        }
    });

    let sse = Sse::new(events.map(Ok::<_, Infallible>));
    (
        [
            (header::CONTENT_TYPE, "text/event-stream; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        sse,
    )
        .into_response()
}
