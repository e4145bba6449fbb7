//! Bidirectional message-format conversion.
//!
//! [`to_chat_request`] turns a validated Anthropic request into the flat
//! OpenAI-style message list every upstream adapter speaks; [`to_messages_response`]
//! turns the upstream's non-streaming reply back into the Anthropic shape.
//! Both are pure over their inputs — the handler owns all I/O.
//!
//! # Shape differences handled here
//!
//! | Concern | Anthropic | OpenAI |
//! |---|---|---|
//! | System prompt | Top-level `system` field | Leading `role: "system"` message |
//! | Tool result | `tool_result` content block in a user turn | Separate `role: "tool"` message |
//! | Tool call | `tool_use` content block | `tool_calls` array on the assistant message |
//! | Tool args | JSON object | JSON-encoded string |
//! | Stop reason | `end_turn` / `max_tokens` / `tool_use` | `stop` / `length` / `tool_calls` |

use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::error::ProxyError;
use crate::flatten::{self, OPENAI_MAX_TOKENS};
use crate::schema::anthropic::{
    ContentBlock, Message, MessageContent, MessagesRequest, MessagesResponse, ResponseBlock, Role,
    StopReason, ToolChoice, ToolDefinition, Usage,
};
use crate::schema::openai::{
    ChatContent, ChatMessage, ChatRequest, ChatResponse, ContentPart, FunctionRef, FunctionSpec,
    ImageUrl, ToolChoiceSpec, ToolSpec,
};
use crate::schema::{provider_of, supports_function_calling, Provider};

/// Mint a `msg_`-prefixed response id.
pub fn mint_message_id() -> String {
    let mut tail = Uuid::new_v4().simple().to_string();
    tail.truncate(24);
    format!("msg_{tail}")
}

/// Mint a tool-call id for upstreams that did not provide one.
pub fn mint_tool_call_id() -> String {
    let mut tail = Uuid::new_v4().simple().to_string();
    tail.truncate(12);
    format!("toolu_{tail}")
}

/// Map an OpenAI `finish_reason` onto the Anthropic stop-reason vocabulary.
pub fn map_finish_reason(finish_reason: Option<&str>) -> StopReason {
    match finish_reason {
        Some("length") => StopReason::MaxTokens,
        Some("tool_calls") => StopReason::ToolUse,
        // `stop`, `content_filter`, anything else, or absent.
        _ => StopReason::EndTurn,
    }
}

/// Convert a normalized Anthropic request into the intermediate shape.
///
/// The capability gate and flattener are consulted from the effective model:
/// targets without function calling lose `tools`/`tool_choice` silently, and
/// flattening targets get plain-string content instead of part arrays.
pub fn to_chat_request(req: &MessagesRequest) -> ChatRequest {
    let provider = provider_of(&req.model);
    let supports_tools = supports_function_calling(&req.model);
    let flatten_active = flatten::applies(provider, supports_tools);

    let mut messages = Vec::with_capacity(req.messages.len() + 1);
    if let Some(system) = &req.system {
        messages.push(ChatMessage::text("system", system.joined()));
    }
    for turn in &req.messages {
        match turn.role {
            Role::User => convert_user_turn(turn, flatten_active, &mut messages),
            Role::Assistant => convert_assistant_turn(turn, &mut messages),
        }
    }

    let max_tokens = if provider == Provider::OpenAI {
        req.max_tokens.min(OPENAI_MAX_TOKENS)
    } else {
        req.max_tokens
    };

    let (tools, tool_choice) = if supports_tools {
        (
            req.tools.as_ref().map(|tools| tools.iter().map(to_tool_spec).collect()),
            req.tool_choice.as_ref().map(to_tool_choice),
        )
    } else {
        if req.tools.is_some() {
            tracing::warn!(model = %req.model, "target lacks function calling; dropping tools");
        }
        (None, None)
    };

    ChatRequest {
        model: req.model.clone(),
        messages,
        max_tokens: Some(max_tokens),
        temperature: req.temperature,
        top_p: req.top_p,
        top_k: req.top_k,
        stop: req.stop_sequences.clone(),
        stream: req.stream,
        tools,
        tool_choice,
        extra: Map::new(),
    }
}

/// A user turn splits into an ordered mix of user and tool messages:
/// contiguous text/image blocks coalesce into one user message, and every
/// `tool_result` becomes its own `role: "tool"` message in source order.
fn convert_user_turn(turn: &Message, flatten_active: bool, out: &mut Vec<ChatMessage>) {
    let blocks = match &turn.content {
        MessageContent::Text(text) => {
            let text = if flatten_active { flatten::non_empty(text.clone()) } else { text.clone() };
            out.push(ChatMessage::text("user", text));
            return;
        }
        MessageContent::Blocks(blocks) => blocks,
    };

    let mut pending: Vec<&ContentBlock> = Vec::new();
    for block in blocks {
        match block {
            ContentBlock::ToolResult { tool_use_id, content } => {
                flush_user_blocks(&mut pending, flatten_active, out);
                let text = if flatten_active {
                    flatten::tool_result_text(content)
                } else {
                    content.joined()
                };
                out.push(ChatMessage {
                    role: "tool".to_string(),
                    content: Some(ChatContent::Text(text)),
                    tool_call_id: Some(tool_use_id.clone()),
                    tool_calls: None,
                    extra: Map::new(),
                });
            }
            ContentBlock::ToolUse { name, .. } => {
                tracing::warn!(tool = %name, "dropping tool_use block found in a user turn");
            }
            other => pending.push(other),
        }
    }
    flush_user_blocks(&mut pending, flatten_active, out);
}

/// Emit accumulated text/image blocks as a single user message.
fn flush_user_blocks(
    pending: &mut Vec<&ContentBlock>,
    flatten_active: bool,
    out: &mut Vec<ChatMessage>,
) {
    if pending.is_empty() {
        return;
    }
    let blocks: Vec<ContentBlock> = pending.drain(..).cloned().collect();

    if flatten_active {
        let text = flatten::non_empty(flatten::flatten_blocks(&blocks));
        out.push(ChatMessage::text("user", text));
        return;
    }

    let mut parts = Vec::with_capacity(blocks.len());
    for block in blocks {
        match block {
            ContentBlock::Text { text } => parts.push(ContentPart::Text { text }),
            ContentBlock::Image { source } => parts.push(ContentPart::ImageUrl {
                image_url: ImageUrl { url: source.data_url() },
            }),
            ContentBlock::Unknown(raw) => {
                tracing::warn!(tag = %raw["type"], "dropping unknown content block");
            }
            // Routed before reaching here.
            ContentBlock::ToolUse { .. } | ContentBlock::ToolResult { .. } => {}
        }
    }

    // A lone text part collapses to plain string content.
    let content = if let [ContentPart::Text { text }] = parts.as_slice() {
        ChatContent::Text(text.clone())
    } else {
        ChatContent::Parts(parts)
    };
    out.push(ChatMessage {
        role: "user".to_string(),
        content: Some(content),
        tool_call_id: None,
        tool_calls: None,
        extra: Map::new(),
    });
}

/// An assistant turn becomes one message; `tool_use` blocks move into the
/// `tool_calls` array with JSON-stringified arguments.
fn convert_assistant_turn(turn: &Message, out: &mut Vec<ChatMessage>) {
    let blocks = match &turn.content {
        MessageContent::Text(text) => {
            out.push(ChatMessage::text("assistant", text.clone()));
            return;
        }
        MessageContent::Blocks(blocks) => blocks,
    };

    let mut texts: Vec<&str> = Vec::new();
    let mut tool_calls = Vec::new();
    for block in blocks {
        match block {
            ContentBlock::Text { text } => texts.push(text),
            ContentBlock::ToolUse { id, name, input } => {
                tool_calls.push(crate::schema::openai::ToolCall {
                    id: id.clone(),
                    kind: "function".to_string(),
                    function: crate::schema::openai::FunctionCall {
                        name: name.clone(),
                        arguments: serde_json::to_string(input)
                            .unwrap_or_else(|_| "{}".to_string()),
                    },
                });
            }
            other => {
                tracing::warn!(block = ?other, "dropping unexpected block in assistant turn");
            }
        }
    }

    let text = texts.join("\n");
    out.push(ChatMessage {
        role: "assistant".to_string(),
        content: if text.is_empty() { None } else { Some(ChatContent::Text(text)) },
        tool_call_id: None,
        tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
        extra: Map::new(),
    });
}

fn to_tool_spec(tool: &ToolDefinition) -> ToolSpec {
    ToolSpec {
        kind: "function".to_string(),
        function: FunctionSpec {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: tool.input_schema.clone(),
            extra: Map::new(),
        },
        extra: Map::new(),
    }
}

fn to_tool_choice(choice: &ToolChoice) -> ToolChoiceSpec {
    match choice {
        ToolChoice::Auto => ToolChoiceSpec::Mode("auto".to_string()),
        ToolChoice::Any => ToolChoiceSpec::Mode("required".to_string()),
        ToolChoice::Tool { name } => ToolChoiceSpec::Function {
            kind: "function".to_string(),
            function: FunctionRef { name: name.clone() },
        },
    }
}

/// Convert a non-streaming upstream reply back into the Anthropic shape.
///
/// Tool-call arguments that fail to parse are wrapped as `{"raw": …}` rather
/// than failing the response; missing tool-call ids are minted. When the
/// capability gate stripped tools on the way out, any tool calls the upstream
/// nevertheless produced are demoted to text.
pub fn to_messages_response(
    resp: &ChatResponse,
    req: &MessagesRequest,
) -> Result<MessagesResponse, ProxyError> {
    let choice = resp
        .choices
        .first()
        .ok_or_else(|| ProxyError::Api("upstream response contained no choices".into()))?;

    let tools_allowed = supports_function_calling(&req.model);
    let mut content = Vec::new();

    if let Some(text) = &choice.message.content {
        if !text.is_empty() {
            content.push(ResponseBlock::Text { text: text.clone() });
        }
    }

    let mut saw_tool_use = false;
    if let Some(tool_calls) = &choice.message.tool_calls {
        for call in tool_calls {
            if !tools_allowed {
                tracing::warn!(
                    tool = %call.function.name,
                    "upstream produced a tool call despite stripped tools; demoting to text"
                );
                content.push(ResponseBlock::Text {
                    text: format!("{}({})", call.function.name, call.function.arguments),
                });
                continue;
            }
            let id = if call.id.is_empty() { mint_tool_call_id() } else { call.id.clone() };
            let input = parse_tool_arguments(&call.function.arguments);
            content.push(ResponseBlock::ToolUse { id, name: call.function.name.clone(), input });
            saw_tool_use = true;
        }
    }

    let stop_reason = if saw_tool_use {
        StopReason::ToolUse
    } else {
        map_finish_reason(choice.finish_reason.as_deref())
    };

    let usage = resp
        .usage
        .map(|u| Usage { input_tokens: u.prompt_tokens, output_tokens: u.completion_tokens })
        .unwrap_or_default();

    Ok(MessagesResponse {
        id: mint_message_id(),
        kind: "message",
        role: "assistant",
        model: req.original_model.clone(),
        content,
        stop_reason: Some(stop_reason),
        stop_sequence: None,
        usage,
    })
}

/// Parse a tool-call arguments string, falling back to `{"raw": …}`.
pub fn parse_tool_arguments(arguments: &str) -> Value {
    if arguments.trim().is_empty() {
        return json!({});
    }
    serde_json::from_str(arguments).unwrap_or_else(|_| json!({ "raw": arguments }))
}
