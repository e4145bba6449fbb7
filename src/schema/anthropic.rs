//! Anthropic Messages API wire types — the inbound surface of the proxy.
//!
//! Content is modelled as tagged variants with exhaustive matching rather
//! than loose JSON: every block the proxy understands has its own variant,
//! and anything else is preserved as [`ContentBlock::Unknown`] so the
//! flattener can stringify it instead of the request failing.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProxyError;

/// A `POST /v1/messages` request body.
#[derive(Debug, Clone, Deserialize)]
pub struct MessagesRequest {
    pub model: String,

    /// Model name as the client sent it, before normalization. Populated by
    /// [`crate::schema::normalize_request`]; echoed back in responses.
    #[serde(skip, default)]
    pub original_model: String,

    pub max_tokens: u32,
    pub messages: Vec<Message>,

    #[serde(default)]
    pub system: Option<SystemPrompt>,
    #[serde(default)]
    pub tools: Option<Vec<ToolDefinition>>,
    #[serde(default)]
    pub tool_choice: Option<ToolChoice>,

    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub top_k: Option<u32>,
    #[serde(default)]
    pub stop_sequences: Option<Vec<String>>,
    #[serde(default)]
    pub stream: Option<bool>,
}

impl MessagesRequest {
    /// Schema validation, performed before any upstream call.
    pub fn validate(&self) -> Result<(), ProxyError> {
        if self.model.trim().is_empty() {
            return Err(ProxyError::InvalidRequest("`model` must not be empty".into()));
        }
        if self.max_tokens == 0 {
            return Err(ProxyError::InvalidRequest("`max_tokens` must be positive".into()));
        }
        if let Some(tools) = &self.tools {
            for tool in tools {
                if tool.name.trim().is_empty() {
                    return Err(ProxyError::InvalidRequest(
                        "tool definitions must carry a non-empty `name`".into(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// True when the client asked for an SSE response.
    pub fn wants_stream(&self) -> bool {
        self.stream.unwrap_or(false)
    }
}

/// A `POST /v1/messages/count_tokens` request body.
#[derive(Debug, Clone, Deserialize)]
pub struct CountTokensRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub system: Option<SystemPrompt>,
    #[serde(default)]
    pub tools: Option<Vec<ToolDefinition>>,
}

/// One conversation turn.
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Turn content — a plain string or an ordered block sequence.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

/// System prompt — a single string or a sequence of text segments.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SystemPrompt {
    Text(String),
    Segments(Vec<TextSegment>),
}

impl SystemPrompt {
    /// Segments are joined with a single newline.
    pub fn joined(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Segments(segments) => segments
                .iter()
                .map(|s| s.text.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// A `{type: "text", text}` segment (system prompts, tool results).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TextSegment {
    pub text: String,
}

/// A content block inside a turn.
///
/// Deserialization dispatches on the `type` tag by hand so that blocks with
/// tags this proxy does not know are kept as [`ContentBlock::Unknown`]
/// instead of failing the whole request.
#[derive(Debug, Clone)]
pub enum ContentBlock {
    Text { text: String },
    Image { source: ImageSource },
    ToolUse { id: String, name: String, input: Value },
    ToolResult { tool_use_id: String, content: ToolResultContent },
    Unknown(Value),
}

impl<'de> Deserialize<'de> for ContentBlock {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error;

        let value = Value::deserialize(deserializer)?;
        let tag = value.get("type").and_then(Value::as_str).unwrap_or_default();

        let block = match tag {
            "text" => {
                let text = value
                    .get("text")
                    .and_then(Value::as_str)
                    .ok_or_else(|| D::Error::custom("text block missing `text`"))?
                    .to_string();
                Self::Text { text }
            }
            "image" => {
                let source = value
                    .get("source")
                    .cloned()
                    .ok_or_else(|| D::Error::custom("image block missing `source`"))?;
                let source =
                    serde_json::from_value(source).map_err(D::Error::custom)?;
                Self::Image { source }
            }
            "tool_use" => {
                let id = string_field(&value, "id").map_err(D::Error::custom)?;
                let name = string_field(&value, "name").map_err(D::Error::custom)?;
                let input = value.get("input").cloned().unwrap_or_else(|| Value::Object(Default::default()));
                Self::ToolUse { id, name, input }
            }
            "tool_result" => {
                let tool_use_id =
                    string_field(&value, "tool_use_id").map_err(D::Error::custom)?;
                let content = match value.get("content") {
                    Some(c) => serde_json::from_value(c.clone()).map_err(D::Error::custom)?,
                    None => ToolResultContent::Text(String::new()),
                };
                Self::ToolResult { tool_use_id, content }
            }
            _ => Self::Unknown(value),
        };
        Ok(block)
    }
}

fn string_field(value: &Value, field: &str) -> Result<String, String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or_else(|| format!("block missing `{field}`"))
}

/// Base64 image payload.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImageSource {
    #[serde(rename = "type")]
    pub kind: String,
    pub media_type: String,
    pub data: String,
}

impl ImageSource {
    /// Render as an OpenAI-style `data:` URL.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.data)
    }
}

/// Result payload of a `tool_result` block.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ToolResultContent {
    Text(String),
    Segments(Vec<TextSegment>),
}

impl ToolResultContent {
    /// Text segments are concatenated with newlines.
    pub fn joined(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Segments(segments) => segments
                .iter()
                .map(|s| s.text.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// A tool the model may call.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub input_schema: Value,
}

/// Tool-choice directive.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolChoice {
    Auto,
    Any,
    Tool { name: String },
}

/// A `/v1/messages` response body.
#[derive(Debug, Clone, Serialize)]
pub struct MessagesResponse {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub role: &'static str,
    pub model: String,
    pub content: Vec<ResponseBlock>,
    pub stop_reason: Option<StopReason>,
    pub stop_sequence: Option<String>,
    pub usage: Usage,
}

/// Output content block — text or tool_use only.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseBlock {
    Text { text: String },
    ToolUse { id: String, name: String, input: Value },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
    ToolUse,
}

impl StopReason {
    /// The wire string, for places that build payloads by hand.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EndTurn => "end_turn",
            Self::MaxTokens => "max_tokens",
            Self::StopSequence => "stop_sequence",
            Self::ToolUse => "tool_use",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request_from(value: serde_json::Value) -> MessagesRequest {
        serde_json::from_value(value).expect("request should deserialize")
    }

    // ── deserialization ───────────────────────────────────────────────────────

    #[test]
    fn parses_plain_text_request() {
        let req = request_from(json!({
            "model": "claude-3-5-haiku",
            "max_tokens": 100,
            "messages": [{ "role": "user", "content": "Hi" }],
        }));
        assert_eq!(req.model, "claude-3-5-haiku");
        assert!(matches!(req.messages[0].content, MessageContent::Text(ref t) if t == "Hi"));
        assert!(!req.wants_stream());
    }

    #[test]
    fn parses_block_content_with_all_known_tags() {
        let req = request_from(json!({
            "model": "m",
            "max_tokens": 1,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": "look at this" },
                    { "type": "image", "source": {
                        "type": "base64", "media_type": "image/png", "data": "AAAA" } },
                    { "type": "tool_result", "tool_use_id": "toolu_1", "content": "42" },
                ],
            }, {
                "role": "assistant",
                "content": [
                    { "type": "tool_use", "id": "toolu_1", "name": "calc", "input": {"x": 1} },
                ],
            }],
        }));

        let MessageContent::Blocks(blocks) = &req.messages[0].content else {
            panic!("expected blocks");
        };
        assert!(matches!(blocks[0], ContentBlock::Text { .. }));
        assert!(matches!(blocks[1], ContentBlock::Image { .. }));
        assert!(matches!(blocks[2], ContentBlock::ToolResult { .. }));

        let MessageContent::Blocks(blocks) = &req.messages[1].content else {
            panic!("expected blocks");
        };
        assert!(matches!(blocks[0], ContentBlock::ToolUse { .. }));
    }

    #[test]
    fn unknown_block_tag_is_preserved_not_rejected() {
        let req = request_from(json!({
            "model": "m",
            "max_tokens": 1,
            "messages": [{
                "role": "user",
                "content": [{ "type": "document", "title": "report.pdf" }],
            }],
        }));
        let MessageContent::Blocks(blocks) = &req.messages[0].content else {
            panic!("expected blocks");
        };
        match &blocks[0] {
            ContentBlock::Unknown(raw) => assert_eq!(raw["type"], "document"),
            other => panic!("expected Unknown, got {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_role() {
        let result: Result<MessagesRequest, _> = serde_json::from_value(json!({
            "model": "m",
            "max_tokens": 1,
            "messages": [{ "role": "system", "content": "nope" }],
        }));
        assert!(result.is_err());
    }

    // ── validation ────────────────────────────────────────────────────────────

    #[test]
    fn validate_rejects_empty_model() {
        let mut req = request_from(json!({
            "model": "m", "max_tokens": 1, "messages": [],
        }));
        req.model = "  ".into();
        assert!(req.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_max_tokens() {
        let mut req = request_from(json!({ "model": "m", "max_tokens": 1, "messages": [] }));
        req.max_tokens = 0;
        assert!(req.validate().is_err());
    }

    #[test]
    fn validate_rejects_unnamed_tool() {
        let req = request_from(json!({
            "model": "m", "max_tokens": 1, "messages": [],
            "tools": [{ "name": "", "input_schema": {"type": "object"} }],
        }));
        assert!(req.validate().is_err());
    }

    // ── joins ─────────────────────────────────────────────────────────────────

    #[test]
    fn system_segments_join_with_newline() {
        let system: SystemPrompt = serde_json::from_value(json!([
            { "type": "text", "text": "Be terse." },
            { "type": "text", "text": "Answer in French." },
        ]))
        .unwrap();
        assert_eq!(system.joined(), "Be terse.\nAnswer in French.");
    }

    #[test]
    fn tool_result_segments_join_with_newline() {
        let content: ToolResultContent = serde_json::from_value(json!([
            { "type": "text", "text": "line one" },
            { "type": "text", "text": "line two" },
        ]))
        .unwrap();
        assert_eq!(content.joined(), "line one\nline two");
    }

    #[test]
    fn image_source_renders_data_url() {
        let source = ImageSource {
            kind: "base64".into(),
            media_type: "image/jpeg".into(),
            data: "Zm9v".into(),
        };
        assert_eq!(source.data_url(), "data:image/jpeg;base64,Zm9v");
    }
}
