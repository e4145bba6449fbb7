//! Streaming translator — turns a linear stream of OpenAI-style chat chunks
//! into Anthropic's ordered, block-structured SSE event sequence.
//!
//! [`StreamTranslator`] is a value type with two transitions:
//! `on_chunk(chunk) -> events` and `finish() -> events`. It performs no I/O,
//! which keeps the event-ordering invariants directly testable:
//!
//! - every `content_block_start` is matched by exactly one `content_block_stop`
//!   with the same index before the stream ends;
//! - block indices are dense from 0 in emission order;
//! - a text block is closed before any tool_use block opens;
//! - `message_delta` (terminal stop reason + usage) precedes `message_stop`,
//!   and the literal `[DONE]` terminator comes last.
//!
//! Text deltas arriving after a tool block has opened are dropped — Anthropic
//! forbids text after tool_use inside one message, and both observed upstreams
//! send the name before the arguments.

use std::collections::HashMap;

use serde_json::{json, Value};

use crate::convert::{map_finish_reason, mint_message_id, mint_tool_call_id};
use crate::schema::anthropic::StopReason;
use crate::schema::openai::ChatChunk;

/// One outbound SSE event: a named event with a JSON payload, or the bare
/// `data: [DONE]` terminator.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Event { name: &'static str, data: Value },
    Done,
}

impl StreamEvent {
    fn named(name: &'static str, data: Value) -> Self {
        Self::Event { name, data }
    }
}

/// State for one tool_use block under assembly.
#[derive(Debug)]
struct ToolBlock {
    index: usize,
    id: String,
    name: String,
    arguments: String,
    closed: bool,
}

/// Chunk → event state machine for a single response stream.
#[derive(Debug)]
pub struct StreamTranslator {
    message_id: String,
    model: String,
    /// Mirrors the capability gate: false when tools were stripped outbound.
    tools_allowed: bool,
    started: bool,
    terminated: bool,
    /// Index of the currently open text block, if any.
    text_index: Option<usize>,
    /// Tool blocks in emission order.
    tool_blocks: Vec<ToolBlock>,
    /// Upstream tool-call slot → position in `tool_blocks`.
    slots: HashMap<u32, usize>,
    next_block_index: usize,
    input_tokens: u64,
    output_tokens: u64,
    finish_reason: Option<String>,
    /// Tool-call deltas suppressed because the capability gate failed.
    dropped_tool_calls: u64,
}

impl StreamTranslator {
    /// `model` is echoed in `message_start`; pass the client-visible name.
    ///
    /// `tools_allowed` is the capability-gate verdict for the effective
    /// model. When false, tool-call deltas the upstream sends anyway are
    /// dropped instead of opening `tool_use` blocks — the streaming mirror of
    /// the non-streaming converter's defense.
    pub fn new(model: impl Into<String>, tools_allowed: bool) -> Self {
        Self {
            message_id: mint_message_id(),
            model: model.into(),
            tools_allowed,
            started: false,
            terminated: false,
            text_index: None,
            tool_blocks: Vec::new(),
            slots: HashMap::new(),
            next_block_index: 0,
            input_tokens: 0,
            output_tokens: 0,
            finish_reason: None,
            dropped_tool_calls: 0,
        }
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// Consume one upstream chunk, producing the events it implies.
    pub fn on_chunk(&mut self, chunk: &ChatChunk) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.terminated {
            return events;
        }

        // Usage first: a first chunk carrying prompt_tokens (the Anthropic
        // adapter does this) should be reflected in message_start.
        if let Some(usage) = &chunk.usage {
            if usage.prompt_tokens > 0 {
                self.input_tokens = usage.prompt_tokens;
            }
            if usage.completion_tokens > 0 {
                self.output_tokens = usage.completion_tokens;
            }
        }
        self.ensure_started(&mut events);

        let Some(choice) = chunk.choices.first() else {
            return events;
        };

        if let Some(text) = &choice.delta.content {
            if !text.is_empty() {
                self.on_text(text, &mut events);
            }
        }

        if let Some(tool_calls) = &choice.delta.tool_calls {
            if self.tools_allowed {
                for delta in tool_calls {
                    self.on_tool_delta(delta, &mut events);
                }
            } else {
                self.dropped_tool_calls += tool_calls.len() as u64;
            }
        }

        if let Some(reason) = &choice.finish_reason {
            self.finish_reason = Some(reason.clone());
        }

        events
    }

    /// Normal termination — the upstream stream ended.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let stop_reason = if self.tool_blocks.is_empty() {
            map_finish_reason(self.finish_reason.as_deref())
        } else {
            StopReason::ToolUse
        };
        self.terminate(stop_reason)
    }

    /// Termination after a mid-stream upstream error.
    ///
    /// Once SSE headers have flushed an error can no longer become an HTTP
    /// response, so the stream is closed legally: open blocks stopped, then
    /// `message_delta` with `end_turn` and best-effort usage.
    pub fn finish_after_error(&mut self) -> Vec<StreamEvent> {
        self.terminate(StopReason::EndTurn)
    }

    fn terminate(&mut self, stop_reason: StopReason) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.terminated {
            return events;
        }
        // A stream that produced no chunks still gets a legal event sequence.
        self.ensure_started(&mut events);
        self.close_text_block(&mut events);
        for block in &mut self.tool_blocks {
            if !block.closed {
                block.closed = true;
                events.push(StreamEvent::named(
                    "content_block_stop",
                    json!({ "type": "content_block_stop", "index": block.index }),
                ));
            }
        }
        for block in &self.tool_blocks {
            tracing::debug!(
                id = %block.id,
                name = %block.name,
                args_len = block.arguments.len(),
                "assembled tool call"
            );
        }
        if self.dropped_tool_calls > 0 {
            tracing::warn!(
                count = self.dropped_tool_calls,
                "upstream streamed tool calls despite stripped tools; dropped"
            );
        }

        events.push(StreamEvent::named(
            "message_delta",
            json!({
                "type": "message_delta",
                "delta": { "stop_reason": stop_reason.as_str(), "stop_sequence": null },
                "usage": { "output_tokens": self.output_tokens },
            }),
        ));
        events.push(StreamEvent::named(
            "message_stop",
            json!({ "type": "message_stop" }),
        ));
        events.push(StreamEvent::Done);
        self.terminated = true;
        events
    }

    fn ensure_started(&mut self, events: &mut Vec<StreamEvent>) {
        if self.started {
            return;
        }
        self.started = true;
        events.push(StreamEvent::named(
            "message_start",
            json!({
                "type": "message_start",
                "message": {
                    "id": self.message_id,
                    "type": "message",
                    "role": "assistant",
                    "model": self.model,
                    "content": [],
                    "stop_reason": null,
                    "stop_sequence": null,
                    "usage": { "input_tokens": self.input_tokens, "output_tokens": 0 },
                },
            }),
        ));
        events.push(StreamEvent::named("ping", json!({ "type": "ping" })));
    }

    fn on_text(&mut self, text: &str, events: &mut Vec<StreamEvent>) {
        // Anthropic forbids text after tool_use within one message; late text
        // is dropped rather than re-opened out of order.
        if !self.tool_blocks.is_empty() {
            tracing::debug!(len = text.len(), "dropping text delta after tool block opened");
            return;
        }
        let index = match self.text_index {
            Some(index) => index,
            None => {
                let index = self.next_block_index;
                self.next_block_index += 1;
                self.text_index = Some(index);
                events.push(StreamEvent::named(
                    "content_block_start",
                    json!({
                        "type": "content_block_start",
                        "index": index,
                        "content_block": { "type": "text", "text": "" },
                    }),
                ));
                index
            }
        };
        events.push(StreamEvent::named(
            "content_block_delta",
            json!({
                "type": "content_block_delta",
                "index": index,
                "delta": { "type": "text_delta", "text": text },
            }),
        ));
    }

    fn on_tool_delta(
        &mut self,
        delta: &crate::schema::openai::ToolCallDelta,
        events: &mut Vec<StreamEvent>,
    ) {
        self.close_text_block(events);

        let slot = delta.index.unwrap_or(0);
        let position = match self.slots.get(&slot) {
            Some(&position) => {
                // Late-arriving name fragments update state for the final
                // message; the already-emitted start keeps the name it had.
                if let Some(name) = delta.function.as_ref().and_then(|f| f.name.as_deref()) {
                    self.tool_blocks[position].name.push_str(name);
                }
                position
            }
            None => {
                let index = self.next_block_index;
                self.next_block_index += 1;
                let id = delta
                    .id
                    .clone()
                    .filter(|id| !id.is_empty())
                    .unwrap_or_else(mint_tool_call_id);
                let name = delta
                    .function
                    .as_ref()
                    .and_then(|f| f.name.clone())
                    .unwrap_or_default();
                events.push(StreamEvent::named(
                    "content_block_start",
                    json!({
                        "type": "content_block_start",
                        "index": index,
                        "content_block": {
                            "type": "tool_use", "id": id, "name": name, "input": {},
                        },
                    }),
                ));
                self.tool_blocks.push(ToolBlock {
                    index,
                    id,
                    name,
                    arguments: String::new(),
                    closed: false,
                });
                let position = self.tool_blocks.len() - 1;
                self.slots.insert(slot, position);
                position
            }
        };

        if let Some(fragment) = delta.function.as_ref().and_then(|f| f.arguments.as_deref()) {
            if !fragment.is_empty() {
                let block = &mut self.tool_blocks[position];
                block.arguments.push_str(fragment);
                let index = block.index;
                events.push(StreamEvent::named(
                    "content_block_delta",
                    json!({
                        "type": "content_block_delta",
                        "index": index,
                        "delta": { "type": "input_json_delta", "partial_json": fragment },
                    }),
                ));
            }
        }
    }

    fn close_text_block(&mut self, events: &mut Vec<StreamEvent>) {
        if let Some(index) = self.text_index.take() {
            events.push(StreamEvent::named(
                "content_block_stop",
                json!({ "type": "content_block_stop", "index": index }),
            ));
        }
    }
}
