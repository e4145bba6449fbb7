//! Content flattener — rewrites structured content blocks into the plain-text
//! form required by targets that do not accept structured content.
//!
//! Active when the effective provider is OpenAI, or when the capability gate
//! determined the target cannot take tools. Both observed upstreams in that
//! set reject nested block arrays, so images become a placeholder line, tool
//! results become a `Tool Result:` paragraph, and whole arrays collapse to a
//! single space-joined string.

use crate::schema::anthropic::{ContentBlock, ToolResultContent};
use crate::schema::Provider;

/// Placeholder emitted in place of image blocks.
pub const IMAGE_PLACEHOLDER: &str = "[Image content not supported in this context]";

/// Replacement for empty content; OpenAI-family endpoints reject empty
/// user/assistant content outright.
pub const EMPTY_CONTENT: &str = "...";

/// Hard output-token ceiling for OpenAI-family targets.
pub const OPENAI_MAX_TOKENS: u32 = 16_384;

/// Whether flattening applies for this target.
pub fn applies(provider: Provider, supports_tools: bool) -> bool {
    provider == Provider::OpenAI || !supports_tools
}

/// Flatten a run of user-content blocks to a single string.
///
/// Transformed blocks are joined with single spaces and the result is
/// trimmed. `tool_result` blocks are handled separately by the converter
/// (they become their own messages) and are skipped here.
pub fn flatten_blocks(blocks: &[ContentBlock]) -> String {
    let mut pieces: Vec<String> = Vec::with_capacity(blocks.len());
    for block in blocks {
        match block {
            ContentBlock::Text { text } => pieces.push(text.clone()),
            ContentBlock::Image { .. } => pieces.push(IMAGE_PLACEHOLDER.to_string()),
            ContentBlock::ToolResult { .. } => {}
            ContentBlock::ToolUse { .. } => {}
            ContentBlock::Unknown(raw) => pieces.push(raw.to_string()),
        }
    }
    pieces.join(" ").trim().to_string()
}

/// Flattened text of a `tool_result` payload, prefixed for targets that see
/// it inline rather than as a structured block.
pub fn tool_result_text(content: &ToolResultContent) -> String {
    format!("Tool Result: {}", content.joined())
}

/// Replace empty content with the literal the upstreams tolerate.
pub fn non_empty(content: String) -> String {
    if content.trim().is_empty() {
        EMPTY_CONTENT.to_string()
    } else {
        content
    }
}
