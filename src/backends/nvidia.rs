//! NVIDIA NIM adapter.
//!
//! NIM speaks the OpenAI chat-completions wire format on NVIDIA's hosted
//! endpoint (`integrate.api.nvidia.com` by default). The adapter differs from
//! the OpenAI one only in defaults: no `stream_options` injection (support
//! varies per hosted model) and NIM model ids keep their own slashes after
//! the `nvidia_nim/` tag is stripped.

use std::time::Duration;

use reqwest::{header, Client};

use super::{decode_chunk_stream, ensure_success, ChunkStream};
use crate::error::ProxyError;
use crate::schema::openai::{ChatRequest, ChatResponse};
use crate::schema::strip_provider;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Adapter for NVIDIA NIM's OpenAI-compatible endpoint.
#[derive(Debug)]
pub struct NvidiaNimAdapter {
    client: Client,
    stream_client: Client,
    base_url: String,
}

impl NvidiaNimAdapter {
    pub fn new(base_url: String, api_key: String) -> Self {
        let mut headers = header::HeaderMap::new();
        let value = format!("Bearer {api_key}");
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

    fn outbound(&self, request: &ChatRequest, stream: bool) -> ChatRequest {
        let mut request = request.clone();
        request.model = strip_provider(&request.model).to_string();
        request.stream = Some(stream);
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

    #[test]
    fn outbound_keeps_model_slashes_after_tag() {
        let adapter = NvidiaNimAdapter::new("http://test".into(), "nvapi-x".into());
        let request: ChatRequest = serde_json::from_value(json!({
            "model": "nvidia_nim/meta/llama-3.1-70b-instruct",
            "messages": [],
        }))
        .unwrap();
        let out = adapter.outbound(&request, true);
        assert_eq!(out.model, "meta/llama-3.1-70b-instruct");
        assert_eq!(out.stream, Some(true));
        assert!(out.extra.get("stream_options").is_none());
    }
}
