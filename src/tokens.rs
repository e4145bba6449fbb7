//! Input-token estimation for `POST /v1/messages/count_tokens`.
//!
//! When the effective model maps to a known OpenAI tokenizer the count comes
//! from `tiktoken`; otherwise the estimate falls back to the character-count
//! heuristic (Σ chars / 4, rounded up). Tool definitions and tool_use /
//! tool_result blocks contribute their JSON-serialized size under the same
//! rule.

use serde_json::json;
use tiktoken_rs::get_bpe_from_model;

use crate::schema::anthropic::{ContentBlock, CountTokensRequest, MessageContent};
use crate::schema::strip_provider;

/// Estimate the input-token count for a count_tokens request.
///
/// `effective_model` is the normalized model name; its provider tag is
/// stripped before the tokenizer lookup.
pub fn estimate_input_tokens(request: &CountTokensRequest, effective_model: &str) -> u64 {
    let texts = collect_texts(request);

    match get_bpe_from_model(strip_provider(effective_model)) {
        Ok(bpe) => texts
            .iter()
            .map(|t| bpe.encode_with_special_tokens(t).len() as u64)
            .sum(),
        Err(_) => {
            let chars: u64 = texts.iter().map(|t| t.chars().count() as u64).sum();
            chars.div_ceil(4)
        }
    }
}

/// Every piece of textual content that contributes to the estimate.
fn collect_texts(request: &CountTokensRequest) -> Vec<String> {
    let mut texts = Vec::new();

    if let Some(system) = &request.system {
        texts.push(system.joined());
    }

    for message in &request.messages {
        match &message.content {
            MessageContent::Text(text) => texts.push(text.clone()),
            MessageContent::Blocks(blocks) => {
                for block in blocks {
                    match block {
                        ContentBlock::Text { text } => texts.push(text.clone()),
                        ContentBlock::ToolResult { content, .. } => texts.push(content.joined()),
                        ContentBlock::ToolUse { name, input, .. } => {
                            texts.push(json!({ "name": name, "input": input }).to_string());
                        }
                        ContentBlock::Image { .. } | ContentBlock::Unknown(_) => {}
                    }
                }
            }
        }
    }

    if let Some(tools) = &request.tools {
        for tool in tools {
            texts.push(
                json!({
                    "name": tool.name,
                    "description": tool.description,
                    "input_schema": tool.input_schema,
                })
                .to_string(),
            );
        }
    }

    texts
}
