//! Configuration for the proxy.
//!
//! Config is assembled once at startup from environment variables (a `.env`
//! file is honoured if present, real environment wins) and validated before
//! the server opens any ports. The resulting [`Config`] is an immutable record
//! threaded through handlers via `Arc` — there is no module-level state and no
//! hot reload.
//!
//! # Recognized variables
//!
//! | Variable | Meaning | Default |
//! |---|---|---|
//! | `ANTHROPIC_API_KEY` / `OPENAI_API_KEY` / `NVIDIA_NIM_API_KEY` | provider credentials (≥ 1 required) | — |
//! | `PREFERRED_PROVIDER` | `openai` \| `anthropic` \| `nvidia` | `openai` |
//! | `BIG_MODEL` / `SMALL_MODEL` | alias targets for sonnet+opus / haiku | `gpt-4o` / `gpt-4o-mini` |
//! | `SERVER_HOST` / `SERVER_PORT` | bind address | `0.0.0.0` / `8082` |
//! | `LOG_LEVEL` | debug/info/warning/error/critical | `info` |
//! | `OPENAI_BASE_URL` etc. | endpoint overrides | provider defaults |

use anyhow::Context;

use crate::schema::Provider;

/// Default OpenAI endpoint (also accepts Azure-style gateways via override).
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
/// Default Anthropic endpoint.
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
/// Default NVIDIA NIM endpoint.
const NVIDIA_BASE_URL: &str = "https://integrate.api.nvidia.com/v1";

/// Immutable runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub anthropic_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub nvidia_api_key: Option<String>,

    /// Provider prefixed onto untagged model names after aliasing.
    pub preferred_provider: Provider,

    /// Alias target for `sonnet` / `opus` model names.
    pub big_model: String,
    /// Alias target for `haiku` model names.
    pub small_model: String,

    pub host: String,
    pub port: u16,

    /// One of debug/info/warning/error/critical (Anthropic CLI vocabulary).
    pub log_level: String,

    pub openai_base_url: String,
    pub anthropic_base_url: String,
    pub nvidia_base_url: String,
}

impl Config {
    /// Build and validate the configuration from the environment.
    ///
    /// Reads a `.env` file first when one exists; values already present in
    /// the real environment are not overridden.
    pub fn from_env() -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();

        let preferred_provider = match env_or("PREFERRED_PROVIDER", "openai").as_str() {
            "openai" => Provider::OpenAI,
            "anthropic" => Provider::Anthropic,
            "nvidia" => Provider::NvidiaNim,
            other => anyhow::bail!(
                "PREFERRED_PROVIDER must be one of openai/anthropic/nvidia, got `{other}`"
            ),
        };

        let port = env_or("SERVER_PORT", "8082")
            .parse::<u16>()
            .context("SERVER_PORT must be a valid port number")?;

        let config = Self {
            anthropic_api_key: env_nonempty("ANTHROPIC_API_KEY"),
            openai_api_key: env_nonempty("OPENAI_API_KEY"),
            nvidia_api_key: env_nonempty("NVIDIA_NIM_API_KEY"),
            preferred_provider,
            big_model: env_or("BIG_MODEL", "gpt-4o"),
            small_model: env_or("SMALL_MODEL", "gpt-4o-mini"),
            host: env_or("SERVER_HOST", "0.0.0.0"),
            port,
            log_level: env_or("LOG_LEVEL", "info"),
            openai_base_url: env_or("OPENAI_BASE_URL", OPENAI_BASE_URL),
            anthropic_base_url: env_or("ANTHROPIC_BASE_URL", ANTHROPIC_BASE_URL),
            nvidia_base_url: env_or("NVIDIA_NIM_BASE_URL", NVIDIA_BASE_URL),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.anthropic_api_key.is_some()
                || self.openai_api_key.is_some()
                || self.nvidia_api_key.is_some(),
            "no provider credentials configured; set at least one of \
             ANTHROPIC_API_KEY, OPENAI_API_KEY, NVIDIA_NIM_API_KEY"
        );
        anyhow::ensure!(self.port != 0, "SERVER_PORT must be non-zero");
        anyhow::ensure!(
            self.api_key(self.preferred_provider).is_some(),
            "PREFERRED_PROVIDER is `{}` but its API key is not set",
            self.preferred_provider
        );
        anyhow::ensure!(!self.big_model.is_empty(), "BIG_MODEL must not be empty");
        anyhow::ensure!(!self.small_model.is_empty(), "SMALL_MODEL must not be empty");
        Ok(())
    }

    /// Credential for the given provider, if configured.
    pub fn api_key(&self, provider: Provider) -> Option<&str> {
        match provider {
            Provider::OpenAI => self.openai_api_key.as_deref(),
            Provider::Anthropic => self.anthropic_api_key.as_deref(),
            Provider::NvidiaNim => self.nvidia_api_key.as_deref(),
        }
    }

    /// Base URL for the given provider.
    pub fn base_url(&self, provider: Provider) -> &str {
        match provider {
            Provider::OpenAI => &self.openai_base_url,
            Provider::Anthropic => &self.anthropic_base_url,
            Provider::NvidiaNim => &self.nvidia_base_url,
        }
    }

    /// Default tracing filter directive derived from `LOG_LEVEL`.
    ///
    /// `warning` and `critical` are accepted for parity with the source CLI's
    /// vocabulary and mapped onto tracing's `warn` / `error`.
    pub fn env_filter_directive(&self) -> String {
        let level = match self.log_level.as_str() {
            "warning" => "warn",
            "critical" => "error",
            other => other,
        };
        format!("claude_proxy={level},tower_http=warn")
    }
}

fn env_or(var: &str, default: &str) -> String {
    std::env::var(var).ok().filter(|v| !v.is_empty()).unwrap_or_else(|| default.to_string())
}

fn env_nonempty(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.is_empty())
}
