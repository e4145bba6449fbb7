//! Anthropic Messages API adapter.
//!
//! The proxy core speaks the OpenAI chat-completions shape internally; this
//! adapter translates to and from Anthropic's
//! [`/v1/messages`](https://docs.anthropic.com/en/api/messages) API so that
//! Anthropic-native targets plug into the same pipeline. Streaming responses
//! are translated on-the-fly from Anthropic's block-structured SSE events
//! into linear delta chunks.
//!
//! # Protocol differences handled here
//!
//! | Concern | OpenAI (internal) | Anthropic |
//! |---|---|---|
//! | System prompt | Leading `role: "system"` message | Top-level `system` field |
//! | Max tokens | Optional (`max_tokens`) | **Required** (`max_tokens`) |
//! | Tool result | `role: "tool"` message | `tool_result` block in a user turn |
//! | Tool call | `tool_calls` on the assistant message | `tool_use` content block |
//! | Finish reasons | `"stop"`, `"length"`, `"tool_calls"` | `"end_turn"`, `"max_tokens"`, `"tool_use"` |
//! | Auth header | `Authorization: Bearer …` | `x-api-key: …` |

use std::collections::HashMap;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::{header, Client};
use serde_json::{json, Map, Value};

use super::{ensure_success, sse_data_lines, ChunkStream};
use crate::convert::parse_tool_arguments;
use crate::error::ProxyError;
use crate::schema::openai::{
    ChatChunk, ChatContent, ChatRequest, ChatResponse, ChatUsage, Choice, ChunkChoice, ChunkDelta,
    ContentPart, FunctionCall, FunctionDelta, ResponseMessage, ToolCall, ToolCallDelta,
    ToolChoiceSpec,
};
use crate::schema::strip_provider;

/// Default max_tokens when the caller omits it. Required by Anthropic.
const DEFAULT_MAX_TOKENS: u32 = 8_192;

/// Anthropic API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Adapter for the Anthropic Messages API.
#[derive(Debug)]
pub struct AnthropicAdapter {
    client: Client,
    stream_client: Client,
    base_url: String,
}

impl AnthropicAdapter {
    /// Build an Anthropic adapter with the given API key.
    pub fn new(base_url: String, api_key: String) -> Self {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            "x-api-key",
            header::HeaderValue::from_str(&api_key)
                .expect("Anthropic API key contains invalid header characters"),
        );
        headers.insert(
            "anthropic-version",
            header::HeaderValue::from_static(ANTHROPIC_VERSION),
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

    /// Translate and forward a completion to `POST /v1/messages`, then
    /// translate the response back to the intermediate shape.
    pub async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, ProxyError> {
        let body = to_messages_body(request, false);
        let url = format!("{}/v1/messages", self.base_url);

        let response = self.client.post(&url).json(&body).send().await?;
        let response = ensure_success(response).await?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| ProxyError::Api(format!("unparseable upstream response: {e}")))?;
        Ok(from_messages_body(&body))
    }

    /// Streaming call: Anthropic SSE events are translated into intermediate
    /// chunks as they arrive.
    pub async fn complete_stream(&self, request: &ChatRequest) -> Result<ChunkStream, ProxyError> {
        let body = to_messages_body(request, true);
        let url = format!("{}/v1/messages", self.base_url);

        let response = self.stream_client.post(&url).json(&body).send().await?;
        let response = ensure_success(response).await?;

        let stream = sse_data_lines(response)
            .scan(EventTranslator::default(), |translator, result| {
                let item = match result {
                    Ok(data) => match serde_json::from_str::<Value>(&data) {
                        Ok(event) if event["type"] == "error" => {
                            let message = event
                                .pointer("/error/message")
                                .and_then(Value::as_str)
                                .unwrap_or("upstream stream error");
                            Some(Err(ProxyError::Api(message.to_string())))
                        }
                        Ok(event) => translator.on_event(&event).map(Ok),
                        Err(e) => {
                            tracing::warn!(error = %e, "skipping unparseable stream event");
                            None
                        }
                    },
                    Err(e) => Some(Err(e)),
                };
                futures_util::future::ready(Some(item))
            })
            .filter_map(futures_util::future::ready)
            .boxed();
        Ok(stream)
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// Request translation — pub(crate) for unit testing
// ──────────────────────────────────────────────────────────────────────────────

/// Convert an intermediate request to the Anthropic Messages format.
pub(crate) fn to_messages_body(request: &ChatRequest, stream: bool) -> Value {
    let mut system_parts: Vec<String> = Vec::new();
    let mut messages: Vec<Value> = Vec::new();

    for message in &request.messages {
        match message.role.as_str() {
            // Anthropic treats system content as a top-level field. Multiple
            // system messages are concatenated.
            "system" => {
                if let Some(text) = content_text(&message.content) {
                    system_parts.push(text);
                }
            }
            // Tool replies become tool_result blocks inside a user turn.
            "tool" => {
                let block = json!({
                    "type": "tool_result",
                    "tool_use_id": message.tool_call_id.as_deref().unwrap_or_default(),
                    "content": content_text(&message.content).unwrap_or_default(),
                });
                push_blocks(&mut messages, "user", vec![block]);
            }
            "assistant" => {
                let mut blocks = Vec::new();
                if let Some(text) = content_text(&message.content) {
                    if !text.is_empty() {
                        blocks.push(json!({ "type": "text", "text": text }));
                    }
                }
                for call in message.tool_calls.iter().flatten() {
                    blocks.push(json!({
                        "type": "tool_use",
                        "id": call.id,
                        "name": call.function.name,
                        "input": parse_tool_arguments(&call.function.arguments),
                    }));
                }
                if !blocks.is_empty() {
                    push_blocks(&mut messages, "assistant", blocks);
                }
            }
            _ => {
                let blocks = content_blocks(&message.content);
                if !blocks.is_empty() {
                    push_blocks(&mut messages, "user", blocks);
                }
            }
        }
    }

    let mut body = json!({
        "model": strip_provider(&request.model),
        "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        "messages": messages,
        "stream": stream,
    });

    if !system_parts.is_empty() {
        body["system"] = Value::String(system_parts.join("\n\n"));
    }
    if let Some(temperature) = request.temperature {
        body["temperature"] = json!(temperature);
    }
    if let Some(top_p) = request.top_p {
        body["top_p"] = json!(top_p);
    }
    if let Some(top_k) = request.top_k {
        body["top_k"] = json!(top_k);
    }
    if let Some(stop) = &request.stop {
        body["stop_sequences"] = json!(stop);
    }
    if let Some(tools) = &request.tools {
        body["tools"] = Value::Array(
            tools
                .iter()
                .map(|tool| {
                    json!({
                        "name": tool.function.name,
                        "description": tool.function.description,
                        "input_schema": tool.function.parameters,
                    })
                })
                .collect(),
        );
    }
    if let Some(choice) = &request.tool_choice {
        match choice {
            ToolChoiceSpec::Mode(mode) if mode == "auto" => {
                body["tool_choice"] = json!({ "type": "auto" });
            }
            ToolChoiceSpec::Mode(mode) if mode == "required" => {
                body["tool_choice"] = json!({ "type": "any" });
            }
            ToolChoiceSpec::Function { function, .. } => {
                body["tool_choice"] = json!({ "type": "tool", "name": function.name });
            }
            ToolChoiceSpec::Mode(other) => {
                tracing::debug!(mode = %other, "tool_choice mode has no Anthropic equivalent");
            }
        }
    }

    body
}

/// Append blocks to the previous message when it has the same role —
/// Anthropic requires strictly alternating user/assistant turns.
fn push_blocks(messages: &mut Vec<Value>, role: &str, blocks: Vec<Value>) {
    if let Some(last) = messages.last_mut() {
        if last["role"] == role {
            if let Some(content) = last["content"].as_array_mut() {
                content.extend(blocks);
                return;
            }
        }
    }
    messages.push(json!({ "role": role, "content": blocks }));
}

/// Plain-text rendering of message content (for system/tool messages).
fn content_text(content: &Option<ChatContent>) -> Option<String> {
    match content {
        Some(ChatContent::Text(text)) => Some(text.clone()),
        Some(ChatContent::Parts(parts)) => Some(
            parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        ),
        None => None,
    }
}

/// Block rendering of user content; data-URL images become base64 sources.
fn content_blocks(content: &Option<ChatContent>) -> Vec<Value> {
    match content {
        Some(ChatContent::Text(text)) => vec![json!({ "type": "text", "text": text })],
        Some(ChatContent::Parts(parts)) => parts
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(json!({ "type": "text", "text": text })),
                ContentPart::ImageUrl { image_url } => match parse_data_url(&image_url.url) {
                    Some((media_type, data)) => Some(json!({
                        "type": "image",
                        "source": {
                            "type": "base64",
                            "media_type": media_type,
                            "data": data,
                        },
                    })),
                    None => {
                        tracing::warn!("dropping non-data-URL image for Anthropic target");
                        None
                    }
                },
            })
            .collect(),
        None => Vec::new(),
    }
}

/// Split a `data:<media_type>;base64,<data>` URL.
fn parse_data_url(url: &str) -> Option<(&str, &str)> {
    let rest = url.strip_prefix("data:")?;
    let (media_type, data) = rest.split_once(";base64,")?;
    Some((media_type, data))
}

// ──────────────────────────────────────────────────────────────────────────────
// Response translation
// ──────────────────────────────────────────────────────────────────────────────

/// Convert a Messages API response to the intermediate shape.
pub(crate) fn from_messages_body(body: &Value) -> ChatResponse {
    let mut text = String::new();
    let mut tool_calls = Vec::new();

    for block in body["content"].as_array().into_iter().flatten() {
        match block["type"].as_str() {
            Some("text") => {
                if let Some(t) = block["text"].as_str() {
                    text.push_str(t);
                }
            }
            Some("tool_use") => {
                tool_calls.push(ToolCall {
                    id: block["id"].as_str().unwrap_or_default().to_string(),
                    kind: "function".to_string(),
                    function: FunctionCall {
                        name: block["name"].as_str().unwrap_or_default().to_string(),
                        arguments: block["input"].to_string(),
                    },
                });
            }
            _ => {}
        }
    }

    let finish_reason = map_stop_reason(body["stop_reason"].as_str());
    let prompt_tokens = body["usage"]["input_tokens"].as_u64().unwrap_or(0);
    let completion_tokens = body["usage"]["output_tokens"].as_u64().unwrap_or(0);

    ChatResponse {
        id: body["id"].as_str().map(String::from),
        model: body["model"].as_str().map(String::from),
        choices: vec![Choice {
            index: Some(0),
            message: ResponseMessage {
                role: Some("assistant".to_string()),
                content: if text.is_empty() { None } else { Some(text) },
                tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
            },
            finish_reason: Some(finish_reason.to_string()),
        }],
        usage: Some(ChatUsage {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }),
        extra: Map::new(),
    }
}

fn map_stop_reason(stop_reason: Option<&str>) -> &'static str {
    match stop_reason {
        Some("max_tokens") => "length",
        Some("tool_use") => "tool_calls",
        // `end_turn`, `stop_sequence`, anything else.
        _ => "stop",
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// Stream translation
// ──────────────────────────────────────────────────────────────────────────────

/// Folds Anthropic SSE events into intermediate chunks.
///
/// Anthropic identifies tool blocks by content index; OpenAI by a dense
/// tool-call slot. The map between the two lives here for one stream.
#[derive(Debug, Default)]
struct EventTranslator {
    input_tokens: u64,
    slots: HashMap<u64, u32>,
    next_slot: u32,
}

impl EventTranslator {
    fn on_event(&mut self, event: &Value) -> Option<ChatChunk> {
        match event["type"].as_str() {
            Some("message_start") => {
                self.input_tokens = event
                    .pointer("/message/usage/input_tokens")
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                let mut chunk = delta_chunk(ChunkDelta {
                    role: Some("assistant".to_string()),
                    ..Default::default()
                });
                chunk.usage = Some(ChatUsage {
                    prompt_tokens: self.input_tokens,
                    completion_tokens: 0,
                    total_tokens: self.input_tokens,
                });
                Some(chunk)
            }
            Some("content_block_start") => {
                let block = &event["content_block"];
                if block["type"] != "tool_use" {
                    return None;
                }
                let index = event["index"].as_u64().unwrap_or(0);
                let slot = self.next_slot;
                self.next_slot += 1;
                self.slots.insert(index, slot);
                Some(delta_chunk(ChunkDelta {
                    tool_calls: Some(vec![ToolCallDelta {
                        index: Some(slot),
                        id: block["id"].as_str().map(String::from),
                        kind: Some("function".to_string()),
                        function: Some(FunctionDelta {
                            name: block["name"].as_str().map(String::from),
                            arguments: Some(String::new()),
                        }),
                    }]),
                    ..Default::default()
                }))
            }
            Some("content_block_delta") => match event["delta"]["type"].as_str() {
                Some("text_delta") => Some(delta_chunk(ChunkDelta {
                    content: event["delta"]["text"].as_str().map(String::from),
                    ..Default::default()
                })),
                Some("input_json_delta") => {
                    let index = event["index"].as_u64().unwrap_or(0);
                    let slot = *self.slots.get(&index)?;
                    Some(delta_chunk(ChunkDelta {
                        tool_calls: Some(vec![ToolCallDelta {
                            index: Some(slot),
                            id: None,
                            kind: None,
                            function: Some(FunctionDelta {
                                name: None,
                                arguments: event["delta"]["partial_json"]
                                    .as_str()
                                    .map(String::from),
                            }),
                        }]),
                        ..Default::default()
                    }))
                }
                _ => None,
            },
            Some("message_delta") => {
                let finish_reason =
                    map_stop_reason(event.pointer("/delta/stop_reason").and_then(Value::as_str));
                let completion_tokens = event
                    .pointer("/usage/output_tokens")
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                let mut chunk = delta_chunk(ChunkDelta::default());
                chunk.choices[0].finish_reason = Some(finish_reason.to_string());
                chunk.usage = Some(ChatUsage {
                    prompt_tokens: self.input_tokens,
                    completion_tokens,
                    total_tokens: self.input_tokens + completion_tokens,
                });
                Some(chunk)
            }
            // ping, content_block_stop, message_stop carry nothing for us.
            _ => None,
        }
    }
}

fn delta_chunk(delta: ChunkDelta) -> ChatChunk {
    ChatChunk {
        choices: vec![ChunkChoice { index: Some(0), delta, finish_reason: None }],
        ..Default::default()
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chat_request(value: Value) -> ChatRequest {
        serde_json::from_value(value).unwrap()
    }

    // ── to_messages_body ──────────────────────────────────────────────────────

    #[test]
    fn system_message_moves_to_top_level_field() {
        let request = chat_request(json!({
            "model": "anthropic/claude-sonnet-4",
            "messages": [
                { "role": "system", "content": "You are terse." },
                { "role": "user", "content": "Hello" },
            ],
            "max_tokens": 256,
        }));
        let body = to_messages_body(&request, false);

        assert_eq!(body["model"], "claude-sonnet-4");
        assert_eq!(body["system"], "You are terse.");
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[0]["content"][0]["text"], "Hello");
    }

    #[test]
    fn max_tokens_defaults_when_absent() {
        let request = chat_request(json!({
            "model": "anthropic/claude-sonnet-4",
            "messages": [{ "role": "user", "content": "Hi" }],
        }));
        let body = to_messages_body(&request, false);
        assert_eq!(body["max_tokens"], DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn tool_message_becomes_tool_result_block_in_user_turn() {
        let request = chat_request(json!({
            "model": "anthropic/claude-sonnet-4",
            "messages": [
                { "role": "assistant", "content": null, "tool_calls": [{
                    "id": "toolu_1", "type": "function",
                    "function": { "name": "get_weather",
                                  "arguments": "{\"location\":\"Paris\"}" },
                }]},
                { "role": "tool", "tool_call_id": "toolu_1", "content": "22C, sunny" },
            ],
            "max_tokens": 64,
        }));
        let body = to_messages_body(&request, false);
        let messages = body["messages"].as_array().unwrap();

        assert_eq!(messages[0]["role"], "assistant");
        assert_eq!(messages[0]["content"][0]["type"], "tool_use");
        assert_eq!(messages[0]["content"][0]["input"], json!({ "location": "Paris" }));

        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[1]["content"][0]["type"], "tool_result");
        assert_eq!(messages[1]["content"][0]["tool_use_id"], "toolu_1");
        assert_eq!(messages[1]["content"][0]["content"], "22C, sunny");
    }

    #[test]
    fn consecutive_tool_messages_merge_into_one_user_turn() {
        let request = chat_request(json!({
            "model": "anthropic/claude-sonnet-4",
            "messages": [
                { "role": "tool", "tool_call_id": "a", "content": "1" },
                { "role": "tool", "tool_call_id": "b", "content": "2" },
            ],
            "max_tokens": 64,
        }));
        let body = to_messages_body(&request, false);
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["content"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn tools_and_choice_translate_to_anthropic_shapes() {
        let request = chat_request(json!({
            "model": "anthropic/claude-sonnet-4",
            "messages": [{ "role": "user", "content": "weather?" }],
            "max_tokens": 64,
            "tools": [{ "type": "function", "function": {
                "name": "get_weather",
                "description": "Get the weather",
                "parameters": { "type": "object" },
            }}],
            "tool_choice": "required",
        }));
        let body = to_messages_body(&request, false);

        assert_eq!(body["tools"][0]["name"], "get_weather");
        assert_eq!(body["tools"][0]["input_schema"]["type"], "object");
        assert_eq!(body["tool_choice"]["type"], "any");
    }

    #[test]
    fn data_url_image_round_trips_to_base64_source() {
        let request = chat_request(json!({
            "model": "anthropic/claude-sonnet-4",
            "messages": [{ "role": "user", "content": [
                { "type": "text", "text": "what is this?" },
                { "type": "image_url",
                  "image_url": { "url": "data:image/png;base64,AA==" } },
            ]}],
            "max_tokens": 64,
        }));
        let body = to_messages_body(&request, false);
        let blocks = body["messages"][0]["content"].as_array().unwrap();
        assert_eq!(blocks[1]["type"], "image");
        assert_eq!(blocks[1]["source"]["media_type"], "image/png");
        assert_eq!(blocks[1]["source"]["data"], "AA==");
    }

    #[test]
    fn stream_flag_is_set_by_caller() {
        let request = chat_request(json!({
            "model": "anthropic/claude-sonnet-4",
            "messages": [],
            "max_tokens": 1,
        }));
        assert_eq!(to_messages_body(&request, true)["stream"], true);
        assert_eq!(to_messages_body(&request, false)["stream"], false);
    }

    // ── from_messages_body ────────────────────────────────────────────────────

    #[test]
    fn text_response_maps_to_single_choice() {
        let body = json!({
            "id": "msg_123",
            "model": "claude-sonnet-4",
            "content": [{ "type": "text", "text": "Hello!" }],
            "stop_reason": "end_turn",
            "usage": { "input_tokens": 10, "output_tokens": 5 },
        });
        let response = from_messages_body(&body);

        let choice = &response.choices[0];
        assert_eq!(choice.message.content.as_deref(), Some("Hello!"));
        assert_eq!(choice.finish_reason.as_deref(), Some("stop"));
        let usage = response.usage.unwrap();
        assert_eq!(usage.prompt_tokens, 10);
        assert_eq!(usage.completion_tokens, 5);
        assert_eq!(usage.total_tokens, 15);
    }

    #[test]
    fn tool_use_blocks_become_tool_calls() {
        let body = json!({
            "id": "msg_456",
            "model": "claude-sonnet-4",
            "content": [
                { "type": "text", "text": "Checking." },
                { "type": "tool_use", "id": "toolu_1", "name": "get_weather",
                  "input": { "location": "Paris" } },
            ],
            "stop_reason": "tool_use",
            "usage": { "input_tokens": 1, "output_tokens": 1 },
        });
        let response = from_messages_body(&body);

        let message = &response.choices[0].message;
        assert_eq!(message.content.as_deref(), Some("Checking."));
        let calls = message.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].id, "toolu_1");
        assert_eq!(calls[0].function.name, "get_weather");
        let parsed: Value = serde_json::from_str(&calls[0].function.arguments).unwrap();
        assert_eq!(parsed, json!({ "location": "Paris" }));
        assert_eq!(response.choices[0].finish_reason.as_deref(), Some("tool_calls"));
    }

    #[test]
    fn stop_reason_mapping_table() {
        assert_eq!(map_stop_reason(Some("end_turn")), "stop");
        assert_eq!(map_stop_reason(Some("max_tokens")), "length");
        assert_eq!(map_stop_reason(Some("tool_use")), "tool_calls");
        assert_eq!(map_stop_reason(Some("stop_sequence")), "stop");
        assert_eq!(map_stop_reason(None), "stop");
    }

    // ── stream translation ────────────────────────────────────────────────────

    #[test]
    fn stream_events_translate_to_linear_chunks() {
        let mut translator = EventTranslator::default();

        assert!(translator
            .on_event(&json!({
                "type": "message_start",
                "message": { "usage": { "input_tokens": 7 } },
            }))
            .is_some());

        assert!(translator
            .on_event(&json!({
                "type": "content_block_start", "index": 0,
                "content_block": { "type": "text", "text": "" },
            }))
            .is_none());

        let chunk = translator
            .on_event(&json!({
                "type": "content_block_delta", "index": 0,
                "delta": { "type": "text_delta", "text": "Hello" },
            }))
            .unwrap();
        assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("Hello"));

        let chunk = translator
            .on_event(&json!({
                "type": "message_delta",
                "delta": { "stop_reason": "end_turn", "stop_sequence": null },
                "usage": { "output_tokens": 3 },
            }))
            .unwrap();
        assert_eq!(chunk.choices[0].finish_reason.as_deref(), Some("stop"));
        let usage = chunk.usage.unwrap();
        assert_eq!(usage.prompt_tokens, 7);
        assert_eq!(usage.completion_tokens, 3);

        assert!(translator.on_event(&json!({ "type": "message_stop" })).is_none());
    }

    #[test]
    fn tool_stream_events_carry_slot_and_fragments() {
        let mut translator = EventTranslator::default();

        // A text block at index 0 occupies no tool slot.
        translator.on_event(&json!({
            "type": "content_block_start", "index": 0,
            "content_block": { "type": "text", "text": "" },
        }));

        let chunk = translator
            .on_event(&json!({
                "type": "content_block_start", "index": 1,
                "content_block": {
                    "type": "tool_use", "id": "toolu_1", "name": "get_weather", "input": {},
                },
            }))
            .unwrap();
        let call = &chunk.choices[0].delta.tool_calls.as_ref().unwrap()[0];
        assert_eq!(call.index, Some(0));
        assert_eq!(call.id.as_deref(), Some("toolu_1"));
        assert_eq!(
            call.function.as_ref().unwrap().name.as_deref(),
            Some("get_weather")
        );

        let chunk = translator
            .on_event(&json!({
                "type": "content_block_delta", "index": 1,
                "delta": { "type": "input_json_delta", "partial_json": "{\"loc" },
            }))
            .unwrap();
        let call = &chunk.choices[0].delta.tool_calls.as_ref().unwrap()[0];
        assert_eq!(call.index, Some(0));
        assert_eq!(
            call.function.as_ref().unwrap().arguments.as_deref(),
            Some("{\"loc")
        );
    }

    #[test]
    fn ping_and_stop_events_produce_no_chunks() {
        let mut translator = EventTranslator::default();
        assert!(translator.on_event(&json!({ "type": "ping" })).is_none());
        assert!(translator
            .on_event(&json!({ "type": "content_block_stop", "index": 0 }))
            .is_none());
    }
}
