//! OpenAI chat completions adapter.
//!
//! The intermediate request already is OpenAI's wire shape, so this adapter
//! only strips the `openai/` provider tag, attaches auth, and decodes the
//! response. Streaming requests additionally opt in to usage reporting via
//! `stream_options` so the translator can surface real token counts.

use std::time::Duration;

use reqwest::{header, Client};
use serde_json::json;

use super::{decode_chunk_stream, ensure_success, ChunkStream};
use crate::error::ProxyError;
use crate::schema::openai::{ChatRequest, ChatResponse};
use crate::schema::strip_provider;

/// Request timeout for buffered completions. Streaming requests use the
/// no-timeout client — their body arrives incrementally.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Adapter for OpenAI's `/chat/completions`.
#[derive(Debug)]
pub struct OpenAIAdapter {
    /// Buffered requests — bounded by [`REQUEST_TIMEOUT`].
    client: Client,
    /// Streaming requests — no request-level timeout.
    stream_client: Client,
    base_url: String,
}

impl OpenAIAdapter {
    /// Build an adapter for the given base URL and bearer token.
    pub fn new(base_url: String, api_key: String) -> Self {
        let mut headers = header::HeaderMap::new();
        let value = format!("Bearer {api_key}");
        // Panics on invalid header bytes — surfaces misconfiguration at
        // startup, not at request time.
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&value)
                .expect("API key contains invalid Authorization header characters"),
        );

        let client = Client::builder()
            .default_headers(headers.clone())
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("failed to build reqwest client");
        let stream_client = Client::builder()
            .default_headers(headers)
            .build()
            .expect("failed to build streaming reqwest client");

        Self { client, stream_client, base_url }
    }

    /// Rewrite the outbound request: drop the provider tag, force the stream
    /// flag, and request usage on the final chunk when streaming.
    fn outbound(&self, request: &ChatRequest, stream: bool) -> ChatRequest {
        let mut request = request.clone();
        request.model = strip_provider(&request.model).to_string();
        request.stream = Some(stream);
        if stream {
            request
                .extra
                .entry("stream_options".to_string())
                .or_insert_with(|| json!({ "include_usage": true }));
        }
        request
    }

    /// `POST /chat/completions`, buffered.
    pub async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, ProxyError> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&self.outbound(request, false))
            .send()
            .await?;
        let response = ensure_success(response).await?;
        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| ProxyError::Api(format!("unparseable upstream response: {e}")))
    }

    /// `POST /chat/completions` with `stream: true`, decoded into chunks.
    pub async fn complete_stream(&self, request: &ChatRequest) -> Result<ChunkStream, ProxyError> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .stream_client
            .post(&url)
            .json(&self.outbound(request, true))
            .send()
            .await?;
        let response = ensure_success(response).await?;
        Ok(decode_chunk_stream(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request() -> ChatRequest {
        serde_json::from_value(json!({
            "model": "openai/gpt-4o",
            "messages": [{ "role": "user", "content": "Hi" }],
        }))
        .unwrap()
    }

    #[test]
    fn outbound_strips_tag_and_sets_stream_flag() {
        let adapter = OpenAIAdapter::new("http://test".into(), "sk-x".into());
        let out = adapter.outbound(&request(), false);
        assert_eq!(out.model, "gpt-4o");
        assert_eq!(out.stream, Some(false));
        assert!(out.extra.get("stream_options").is_none());
    }

    #[test]
    fn streaming_outbound_requests_usage() {
        let adapter = OpenAIAdapter::new("http://test".into(), "sk-x".into());
        let out = adapter.outbound(&request(), true);
        assert_eq!(out.stream, Some(true));
        assert_eq!(out.extra["stream_options"]["include_usage"], true);
    }

    #[test]
    fn caller_supplied_stream_options_win() {
        let adapter = OpenAIAdapter::new("http://test".into(), "sk-x".into());
        let mut req = request();
        req.extra
            .insert("stream_options".into(), json!({ "include_usage": false }));
        let out = adapter.outbound(&req, true);
        assert_eq!(out.extra["stream_options"]["include_usage"], false);
    }
}
