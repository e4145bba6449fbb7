//! Schema layer: wire types for both sides of the proxy plus model-name
//! normalization and the capability probe.
//!
//! # Normalization
//!
//! Incoming model names are rewritten once, in order:
//!
//! 1. The original string is recorded on the request.
//! 2. A recognized provider tag (`openai/`, `anthropic/`, `nvidia_nim/`)
//!    passes the name through unchanged.
//! 3. Otherwise Claude-family aliases apply: `haiku` → `SMALL_MODEL`,
//!    `sonnet`/`opus` → `BIG_MODEL` (case-insensitive substring match).
//! 4. A name still lacking a provider tag gets the preferred provider's
//!    prefix.
//!
//! The function is idempotent: a normalized name always starts with a
//! recognized tag, so a second pass is a no-op.

pub mod anthropic;
pub mod openai;

use serde::{Deserialize, Serialize};

use crate::config::Config;

/// Upstream provider, resolved from the normalized model prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// OpenAI `/v1/chat/completions`.
    OpenAI,
    /// Anthropic Messages API, reached through the translating adapter.
    Anthropic,
    /// NVIDIA NIM — OpenAI wire format on NVIDIA's endpoint.
    NvidiaNim,
}

impl Provider {
    /// The model-name prefix carrying this provider tag.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::OpenAI => "openai/",
            Self::Anthropic => "anthropic/",
            Self::NvidiaNim => "nvidia_nim/",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::OpenAI => "openai",
            Self::Anthropic => "anthropic",
            Self::NvidiaNim => "nvidia_nim",
        })
    }
}

const PROVIDERS: [Provider; 3] = [Provider::OpenAI, Provider::Anthropic, Provider::NvidiaNim];

/// Resolve the provider tag of a normalized model name.
///
/// Untagged names fall back to [`Provider::OpenAI`]; normalized names always
/// carry a tag, so the fallback only matters for raw caller input.
pub fn provider_of(model: &str) -> Provider {
    PROVIDERS
        .into_iter()
        .find(|p| model.starts_with(p.prefix()))
        .unwrap_or(Provider::OpenAI)
}

/// Strip the provider tag off a normalized model name.
///
/// `nvidia_nim/meta/llama3-8b` → `meta/llama3-8b` — only the recognized tag
/// segment is removed, further slashes belong to the upstream model id.
pub fn strip_provider(model: &str) -> &str {
    PROVIDERS
        .into_iter()
        .find_map(|p| model.strip_prefix(p.prefix()))
        .unwrap_or(model)
}

/// Apply the normalization rules to a model name.
pub fn normalize_model(model: &str, config: &Config) -> String {
    if PROVIDERS.iter().any(|p| model.starts_with(p.prefix())) {
        return model.to_string();
    }

    let lower = model.to_ascii_lowercase();
    let resolved = if lower.contains("haiku") {
        config.small_model.as_str()
    } else if lower.contains("sonnet") || lower.contains("opus") {
        config.big_model.as_str()
    } else {
        model
    };

    if PROVIDERS.iter().any(|p| resolved.starts_with(p.prefix())) {
        resolved.to_string()
    } else {
        format!("{}{}", config.preferred_provider.prefix(), resolved)
    }
}

/// Normalize a request in place, recording the original model name.
pub fn normalize_request(request: &mut anthropic::MessagesRequest, config: &Config) {
    request.original_model = request.model.clone();
    request.model = normalize_model(&request.model, config);
    if request.model != request.original_model {
        tracing::debug!(
            original = %request.original_model,
            effective = %request.model,
            "model normalized"
        );
    }
}

/// NIM model families known to expose function calling.
const NIM_TOOL_FAMILIES: [&str; 5] = ["llama-3.1", "llama-3.3", "mistral", "mixtral", "qwen"];

/// Whether the effective model can receive a tool catalog at all.
///
/// Pure predicate over the normalized name: OpenAI and Anthropic models all
/// speak function calling; NIM models only for known families. Unrecognized
/// names fail closed so the capability gate drops tools instead of the
/// upstream rejecting the request.
pub fn supports_function_calling(model: &str) -> bool {
    match provider_of(model) {
        Provider::OpenAI | Provider::Anthropic => true,
        Provider::NvidiaNim => {
            let name = strip_provider(model).to_ascii_lowercase();
            NIM_TOOL_FAMILIES.iter().any(|family| name.contains(family))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(preferred: Provider) -> Config {
        Config {
            anthropic_api_key: Some("k".into()),
            openai_api_key: Some("k".into()),
            nvidia_api_key: Some("k".into()),
            preferred_provider: preferred,
            big_model: "gpt-4o".into(),
            small_model: "gpt-4o-mini".into(),
            host: "0.0.0.0".into(),
            port: 8082,
            log_level: "info".into(),
            openai_base_url: "http://openai.test".into(),
            anthropic_base_url: "http://anthropic.test".into(),
            nvidia_base_url: "http://nim.test".into(),
        }
    }

    // ── normalization ─────────────────────────────────────────────────────────

    #[test]
    fn haiku_maps_to_small_model_with_preferred_prefix() {
        let config = config_with(Provider::OpenAI);
        assert_eq!(
            normalize_model("claude-3-5-haiku-20241022", &config),
            "openai/gpt-4o-mini"
        );
    }

    #[test]
    fn sonnet_and_opus_map_to_big_model() {
        let config = config_with(Provider::OpenAI);
        assert_eq!(normalize_model("claude-sonnet-4", &config), "openai/gpt-4o");
        assert_eq!(normalize_model("claude-OPUS-4", &config), "openai/gpt-4o");
    }

    #[test]
    fn recognized_provider_tags_pass_through() {
        let config = config_with(Provider::OpenAI);
        for name in [
            "openai/gpt-4o",
            "anthropic/claude-sonnet-4",
            "nvidia_nim/meta/llama3-8b",
        ] {
            assert_eq!(normalize_model(name, &config), name);
        }
    }

    #[test]
    fn untagged_names_get_preferred_provider_prefix() {
        let config = config_with(Provider::NvidiaNim);
        assert_eq!(
            normalize_model("meta/llama3-8b-instruct", &config),
            "nvidia_nim/meta/llama3-8b-instruct"
        );
    }

    #[test]
    fn aliasing_respects_provider_tag_in_alias_target() {
        let mut config = config_with(Provider::OpenAI);
        config.small_model = "anthropic/claude-3-5-haiku-latest".into();
        assert_eq!(
            normalize_model("claude-3-5-haiku", &config),
            "anthropic/claude-3-5-haiku-latest"
        );
    }

    #[test]
    fn normalization_is_idempotent() {
        let config = config_with(Provider::Anthropic);
        for name in [
            "claude-3-5-haiku",
            "claude-sonnet-4-20250514",
            "gpt-4o",
            "openai/gpt-4o",
            "nvidia_nim/meta/llama3-8b",
            "some-unknown-model",
        ] {
            let once = normalize_model(name, &config);
            assert_eq!(normalize_model(&once, &config), once, "not idempotent for {name}");
        }
    }

    // ── provider resolution ───────────────────────────────────────────────────

    #[test]
    fn provider_resolution_and_stripping() {
        assert_eq!(provider_of("openai/gpt-4o"), Provider::OpenAI);
        assert_eq!(provider_of("anthropic/claude-sonnet-4"), Provider::Anthropic);
        assert_eq!(provider_of("nvidia_nim/meta/llama3-8b"), Provider::NvidiaNim);

        assert_eq!(strip_provider("openai/gpt-4o"), "gpt-4o");
        assert_eq!(strip_provider("nvidia_nim/meta/llama3-8b"), "meta/llama3-8b");
        assert_eq!(strip_provider("no-tag"), "no-tag");
    }

    // ── capability probe ──────────────────────────────────────────────────────

    #[test]
    fn openai_and_anthropic_models_support_tools() {
        assert!(supports_function_calling("openai/gpt-4o"));
        assert!(supports_function_calling("anthropic/claude-sonnet-4"));
    }

    #[test]
    fn nim_tool_support_is_per_family() {
        assert!(supports_function_calling("nvidia_nim/meta/llama-3.1-70b-instruct"));
        assert!(supports_function_calling("nvidia_nim/mistralai/mixtral-8x22b-instruct"));
        assert!(!supports_function_calling("nvidia_nim/meta/llama3-8b"));
    }
}
