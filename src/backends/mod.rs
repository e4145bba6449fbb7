//! Upstream adapter factory and unified dispatch interface.
//!
//! [`UpstreamClient`] is an enum that wraps a concrete provider adapter
//! chosen from the resolved [`Provider`]. The proxy core interacts with the
//! same two-method API (`complete`, `complete_stream`); adapter-specific
//! protocol differences — schema translation, auth headers, endpoint paths —
//! are fully encapsulated in the adapter modules. Every adapter yields the
//! intermediate OpenAI chunk shape, so the streaming translator never sees
//! provider differences.

mod anthropic;
mod nvidia;
mod openai;

pub use anthropic::AnthropicAdapter;
pub use nvidia::NvidiaNimAdapter;
pub use openai::OpenAIAdapter;

use std::collections::VecDeque;
use std::pin::Pin;

use futures_util::{Stream, StreamExt};

use crate::config::Config;
use crate::error::ProxyError;
use crate::schema::openai::{ChatChunk, ChatRequest, ChatResponse};
use crate::schema::Provider;

/// A `Send`-able, heap-allocated stream of decoded upstream chunks.
///
/// The stream terminates after the upstream's `[DONE]` marker (or connection
/// close); an `Err` item ends it early.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ChatChunk, ProxyError>> + Send>>;

/// Unified upstream client — enum dispatch over concrete provider adapters.
#[derive(Debug)]
pub enum UpstreamClient {
    /// OpenAI chat completions.
    OpenAI(OpenAIAdapter),
    /// NVIDIA NIM — OpenAI wire format on NVIDIA's endpoint.
    NvidiaNim(NvidiaNimAdapter),
    /// Anthropic Messages API with request/response/stream translation.
    Anthropic(AnthropicAdapter),
}

impl UpstreamClient {
    /// Build a client for the given provider from configuration.
    ///
    /// # Errors
    /// Returns `authentication_error` when the provider's API key is not
    /// configured — surfaced before any upstream call is made.
    pub fn new(provider: Provider, config: &Config) -> Result<Self, ProxyError> {
        let api_key = config
            .api_key(provider)
            .ok_or_else(|| {
                ProxyError::Authentication(format!(
                    "no API key configured for provider `{provider}`"
                ))
            })?
            .to_string();
        let base_url = config.base_url(provider).trim_end_matches('/').to_string();

        Ok(match provider {
            Provider::OpenAI => Self::OpenAI(OpenAIAdapter::new(base_url, api_key)),
            Provider::NvidiaNim => Self::NvidiaNim(NvidiaNimAdapter::new(base_url, api_key)),
            Provider::Anthropic => Self::Anthropic(AnthropicAdapter::new(base_url, api_key)),
        })
    }

    /// Issue a non-streaming completion call.
    pub async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, ProxyError> {
        match self {
            Self::OpenAI(a) => a.complete(request).await,
            Self::NvidiaNim(a) => a.complete(request).await,
            Self::Anthropic(a) => a.complete(request).await,
        }
    }

    /// Issue a streaming completion call and return the decoded chunk stream.
    pub async fn complete_stream(&self, request: &ChatRequest) -> Result<ChunkStream, ProxyError> {
        match self {
            Self::OpenAI(a) => a.complete_stream(request).await,
            Self::NvidiaNim(a) => a.complete_stream(request).await,
            Self::Anthropic(a) => a.complete_stream(request).await,
        }
    }
}

/// Reject non-2xx upstream replies, folding the body into the error taxonomy.
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, ProxyError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(ProxyError::from_status(status, &body))
}

/// Decode an SSE response body into its `data:` payloads.
///
/// Bytes are buffered until a full line is available; `event:` lines and
/// comments are skipped, and the stream ends cleanly at `[DONE]`.
pub(crate) fn sse_data_lines(
    response: reqwest::Response,
) -> impl Stream<Item = Result<String, ProxyError>> + Send {
    struct DecodeState {
        bytes: futures_util::stream::BoxStream<'static, reqwest::Result<bytes::Bytes>>,
        buffer: String,
        pending: VecDeque<String>,
        done: bool,
    }

    let state = DecodeState {
        bytes: response.bytes_stream().boxed(),
        buffer: String::new(),
        pending: VecDeque::new(),
        done: false,
    };

    futures_util::stream::try_unfold(state, |mut state| async move {
        loop {
            if let Some(data) = state.pending.pop_front() {
                if data == "[DONE]" {
                    return Ok(None);
                }
                return Ok(Some((data, state)));
            }
            if state.done {
                return Ok(None);
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    state.buffer.push_str(&String::from_utf8_lossy(&chunk));
                    while let Some(pos) = state.buffer.find('\n') {
                        let line: String = state.buffer.drain(..=pos).collect();
                        let line = line.trim_end_matches(['\r', '\n']);
                        if let Some(data) = line.strip_prefix("data:") {
                            state.pending.push_back(data.trim_start().to_string());
                        }
                    }
                }
                Some(Err(e)) => return Err(ProxyError::from(e)),
                None => state.done = true,
            }
        }
    })
}

/// Decode an OpenAI-format SSE body into [`ChatChunk`]s.
///
/// Unparseable payloads are skipped with a warning rather than aborting the
/// stream — a malformed keep-alive must not kill an otherwise good response.
pub(crate) fn decode_chunk_stream(response: reqwest::Response) -> ChunkStream {
    sse_data_lines(response)
        .filter_map(|result| {
            futures_util::future::ready(match result {
                Ok(data) => match serde_json::from_str::<ChatChunk>(&data) {
                    Ok(chunk) => Some(Ok(chunk)),
                    Err(e) => {
                        tracing::warn!(error = %e, "skipping unparseable stream chunk");
                        None
                    }
                },
                Err(e) => Some(Err(e)),
            })
        })
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn config_for(server: &MockServer) -> Config {
        Config {
            anthropic_api_key: Some("sk-ant-test".into()),
            openai_api_key: Some("sk-test".into()),
            nvidia_api_key: Some("nvapi-test".into()),
            preferred_provider: Provider::OpenAI,
            big_model: "gpt-4o".into(),
            small_model: "gpt-4o-mini".into(),
            host: "0.0.0.0".into(),
            port: 8082,
            log_level: "info".into(),
            openai_base_url: server.uri(),
            anthropic_base_url: server.uri(),
            nvidia_base_url: server.uri(),
        }
    }

    fn chat_request(model: &str) -> ChatRequest {
        serde_json::from_value(json!({
            "model": model,
            "messages": [{ "role": "user", "content": "Hi" }],
            "max_tokens": 100,
        }))
        .unwrap()
    }

    fn sse_body(lines: &[&str]) -> String {
        let mut body = String::new();
        for line in lines {
            body.push_str("data: ");
            body.push_str(line);
            body.push_str("\n\n");
        }
        body
    }

    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn new_errors_without_provider_key() {
        let server = MockServer::start().await;
        let mut config = config_for(&server);
        config.nvidia_api_key = None;
        let err = UpstreamClient::new(Provider::NvidiaNim, &config).unwrap_err();
        assert_eq!(err.kind(), "authentication_error");
    }

    // -----------------------------------------------------------------------
    // complete — OpenAI wire shape
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn complete_strips_provider_tag_and_sends_bearer_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({ "model": "gpt-4o" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "content": "Hello." }, "finish_reason": "stop" }],
                "usage": { "prompt_tokens": 1, "completion_tokens": 1 },
            })))
            .mount(&server)
            .await;

        let client = UpstreamClient::new(Provider::OpenAI, &config_for(&server)).unwrap();
        let response = client.complete(&chat_request("openai/gpt-4o")).await.unwrap();

        assert_eq!(response.choices[0].message.content.as_deref(), Some("Hello."));
        assert_eq!(response.choices[0].finish_reason.as_deref(), Some("stop"));
    }

    #[tokio::test]
    async fn complete_maps_upstream_429_to_rate_limit_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": { "message": "rate limited", "type": "rate_limit_exceeded" },
            })))
            .mount(&server)
            .await;

        let client = UpstreamClient::new(Provider::OpenAI, &config_for(&server)).unwrap();
        let err = client.complete(&chat_request("openai/gpt-4o")).await.unwrap_err();
        assert_eq!(err.kind(), "rate_limit_error");
        assert_eq!(err.to_string(), "rate limited");
    }

    // -----------------------------------------------------------------------
    // complete_stream — SSE decoding
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn complete_stream_decodes_chunks_until_done() {
        let server = MockServer::start().await;
        let body = sse_body(&[
            r#"{"choices":[{"index":0,"delta":{"role":"assistant","content":"He"}}]}"#,
            r#"{"choices":[{"index":0,"delta":{"content":"llo"}}]}"#,
            r#"{"choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#,
            "[DONE]",
        ]);
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({ "stream": true })))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let client = UpstreamClient::new(Provider::OpenAI, &config_for(&server)).unwrap();
        let mut stream = client.complete_stream(&chat_request("openai/gpt-4o")).await.unwrap();

        let mut texts = Vec::new();
        let mut finish = None;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.unwrap();
            if let Some(choice) = chunk.choices.first() {
                if let Some(content) = &choice.delta.content {
                    texts.push(content.clone());
                }
                if let Some(reason) = &choice.finish_reason {
                    finish = Some(reason.clone());
                }
            }
        }
        assert_eq!(texts, vec!["He", "llo"]);
        assert_eq!(finish.as_deref(), Some("stop"));
    }

    #[tokio::test]
    async fn stream_skips_malformed_payloads() {
        let server = MockServer::start().await;
        let body = sse_body(&[
            "this is not json",
            r#"{"choices":[{"index":0,"delta":{"content":"ok"}}]}"#,
            "[DONE]",
        ]);
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let client = UpstreamClient::new(Provider::OpenAI, &config_for(&server)).unwrap();
        let mut stream = client.complete_stream(&chat_request("openai/gpt-4o")).await.unwrap();

        let mut count = 0;
        while let Some(chunk) = stream.next().await {
            assert!(chunk.is_ok());
            count += 1;
        }
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn stream_request_errors_map_before_first_chunk() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": { "message": "bad key" },
            })))
            .mount(&server)
            .await;

        let client = UpstreamClient::new(Provider::OpenAI, &config_for(&server)).unwrap();
        let err = match client.complete_stream(&chat_request("openai/gpt-4o")).await {
            Err(e) => e,
            Ok(_) => panic!("expected an error"),
        };
        assert_eq!(err.kind(), "authentication_error");
    }

    // -----------------------------------------------------------------------
    // NVIDIA NIM — same wire shape, its own path prefix and auth
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn nvidia_adapter_strips_only_the_provider_tag() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer nvapi-test"))
            .and(body_partial_json(json!({ "model": "meta/llama3-8b" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "content": "hi" }, "finish_reason": "stop" }],
            })))
            .mount(&server)
            .await;

        let client = UpstreamClient::new(Provider::NvidiaNim, &config_for(&server)).unwrap();
        let response = client
            .complete(&chat_request("nvidia_nim/meta/llama3-8b"))
            .await
            .unwrap();
        assert_eq!(response.choices[0].message.content.as_deref(), Some("hi"));
    }
}
