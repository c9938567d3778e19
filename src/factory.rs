use std::env;
use std::time::Duration;

use tracing::warn;

use crate::providers::{chat, AnthropicProvider, ChatCompletionsProvider, OpenAIProvider, DEFAULT_TIMEOUT};
use crate::{Error, LLMProvider};

/// Default bound on model/tool round trips per call.
pub const DEFAULT_MAX_TOOL_CALL_DEPTH: u32 = 3;

/// Supported LLM providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderType {
    OpenAI,
    Anthropic,
    /// A locally hosted OpenAI-compatible server.
    Ollama,
}

const OPENAI_PREFIXES: &[&str] = &["gpt", "o1", "o3", "o4", "text-", "chatgpt"];
const ANTHROPIC_PREFIXES: &[&str] = &["claude", "anthropic"];
const OLLAMA_PREFIXES: &[&str] = &[
    "llama", "qwen", "mistral", "phi", "gemma", "mixtral", "deepseek",
];

impl ProviderType {
    /// Pick a provider from the model name. The conventional `"ollama"`
    /// placeholder key only decides for models no hosted family claims.
    pub fn detect(model: &str, api_key: Option<&str>) -> Self {
        let model = model.to_ascii_lowercase();
        let matches = |prefixes: &[&str]| prefixes.iter().any(|p| model.starts_with(p));
        if matches(ANTHROPIC_PREFIXES) {
            ProviderType::Anthropic
        } else if matches(OPENAI_PREFIXES) {
            ProviderType::OpenAI
        } else if matches(OLLAMA_PREFIXES) || api_key == Some("ollama") {
            ProviderType::Ollama
        } else {
            warn!(model = %model, "Unknown model family, defaulting to OpenAI");
            ProviderType::OpenAI
        }
    }
}

/// Which OpenAI-style API a call goes through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ApiMode {
    /// Responses API; supports continuation ids and hosted tools.
    #[default]
    Responses,
    /// Chat Completions; required for locally hosted servers.
    ChatCompletions,
}

/// Credentials, endpoints and limits for an [`LLMClient`](crate::LLMClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub anthropic_api_key: Option<String>,
    pub anthropic_base_url: String,
    pub ollama_base_url: String,
    pub max_tool_call_depth: u32,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_base_url: crate::providers::openai::client::DEFAULT_BASE_URL.to_string(),
            anthropic_api_key: None,
            anthropic_base_url: crate::providers::anthropic::client::DEFAULT_BASE_URL.to_string(),
            ollama_base_url: chat::client::OLLAMA_BASE_URL.to_string(),
            max_tool_call_depth: DEFAULT_MAX_TOOL_CALL_DEPTH,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create configuration from environment variables.
    ///
    /// Reads `OPENAI_API_KEY`, `OPENAI_BASE_URL`, `ANTHROPIC_API_KEY`,
    /// `ANTHROPIC_BASE_URL`, `OLLAMA_BASE_URL` and `LLM_MAX_TOOL_CALL_DEPTH`.
    /// Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        config.openai_api_key = get("OPENAI_API_KEY");
        config.anthropic_api_key = get("ANTHROPIC_API_KEY");
        if let Some(url) = get("OPENAI_BASE_URL") {
            config.openai_base_url = url;
        }
        if let Some(url) = get("ANTHROPIC_BASE_URL") {
            config.anthropic_base_url = url;
        }
        if let Some(url) = get("OLLAMA_BASE_URL") {
            config.ollama_base_url = url;
        }
        if let Some(depth) = get("LLM_MAX_TOOL_CALL_DEPTH") {
            config.max_tool_call_depth = depth.trim().parse().map_err(|_| {
                Error::config(format!(
                    "LLM_MAX_TOOL_CALL_DEPTH must be a non-negative integer, got '{depth}'"
                ))
            })?;
        }

        Ok(config)
    }

    pub fn with_openai(mut self, api_key: impl Into<String>) -> Self {
        self.openai_api_key = Some(api_key.into());
        self
    }

    pub fn with_openai_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.openai_base_url = base_url.into();
        self
    }

    pub fn with_anthropic(mut self, api_key: impl Into<String>) -> Self {
        self.anthropic_api_key = Some(api_key.into());
        self
    }

    pub fn with_anthropic_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.anthropic_base_url = base_url.into();
        self
    }

    pub fn with_ollama_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.ollama_base_url = base_url.into();
        self
    }

    pub fn with_max_tool_call_depth(mut self, depth: u32) -> Self {
        self.max_tool_call_depth = depth;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Factory for creating LLM providers.
pub struct ProviderFactory;

impl ProviderFactory {
    /// Create a provider from configuration.
    pub fn create(
        config: &ClientConfig,
        provider_type: ProviderType,
        mode: ApiMode,
    ) -> Result<Box<dyn LLMProvider>, Error> {
        match provider_type {
            ProviderType::OpenAI => {
                let api_key = config
                    .openai_api_key
                    .clone()
                    .ok_or_else(|| Error::config("OPENAI_API_KEY is required for OpenAI models"))?;
                let base_url = config.openai_base_url.clone();
                let provider: Box<dyn LLMProvider> = match mode {
                    ApiMode::Responses => {
                        Box::new(OpenAIProvider::with_timeout(api_key, base_url, config.timeout)?)
                    }
                    ApiMode::ChatCompletions => Box::new(ChatCompletionsProvider::with_timeout(
                        api_key,
                        base_url,
                        config.timeout,
                    )?),
                };
                Ok(provider)
            }
            ProviderType::Anthropic => {
                let api_key = config.anthropic_api_key.clone().ok_or_else(|| {
                    Error::config("ANTHROPIC_API_KEY is required for Anthropic models")
                })?;
                Ok(Box::new(AnthropicProvider::with_timeout(
                    api_key,
                    config.anthropic_base_url.clone(),
                    config.timeout,
                )?))
            }
            ProviderType::Ollama => {
                if mode == ApiMode::Responses {
                    warn!("Ollama has no Responses API, using Chat Completions");
                }
                Ok(Box::new(ChatCompletionsProvider::ollama_with_timeout(
                    config.ollama_base_url.clone(),
                    config.timeout,
                )?))
            }
        }
    }

    /// Detect the provider for `model` and create it.
    pub fn for_model(
        config: &ClientConfig,
        model: &str,
        mode: ApiMode,
    ) -> Result<Box<dyn LLMProvider>, Error> {
        let provider_type = ProviderType::detect(model, config.openai_api_key.as_deref());
        Self::create(config, provider_type, mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_detect_provider() {
        assert_eq!(ProviderType::detect("gpt-4o-mini", None), ProviderType::OpenAI);
        assert_eq!(ProviderType::detect("o3-mini", None), ProviderType::OpenAI);
        assert_eq!(ProviderType::detect("claude-3-5-haiku-latest", None), ProviderType::Anthropic);
        assert_eq!(ProviderType::detect("llama3.2", None), ProviderType::Ollama);
        assert_eq!(ProviderType::detect("Qwen2.5:7b", None), ProviderType::Ollama);
        assert_eq!(ProviderType::detect("my-finetune:7b", Some("ollama")), ProviderType::Ollama);
        assert_eq!(ProviderType::detect("mystery-model", None), ProviderType::OpenAI);
    }

    #[test]
    fn test_model_family_wins_over_ollama_key() {
        assert_eq!(ProviderType::detect("gpt-4o-mini", Some("ollama")), ProviderType::OpenAI);
        assert_eq!(
            ProviderType::detect("claude-3-5-haiku-latest", Some("ollama")),
            ProviderType::Anthropic
        );
    }

    #[test]
    fn test_config_from_env() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("ANTHROPIC_BASE_URL", "http://localhost:9999"),
            ("LLM_MAX_TOOL_CALL_DEPTH", "5"),
        ]))
        .unwrap();
        assert_eq!(config.openai_api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.anthropic_api_key, None);
        assert_eq!(config.anthropic_base_url, "http://localhost:9999");
        assert_eq!(config.ollama_base_url, "http://localhost:11434/v1");
        assert_eq!(config.max_tool_call_depth, 5);
    }

    #[test]
    fn test_config_rejects_bad_depth() {
        let result = ClientConfig::from_lookup(lookup(&[("LLM_MAX_TOOL_CALL_DEPTH", "three")]));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.max_tool_call_depth, 3);
        assert_eq!(config.timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_create_requires_credentials() {
        let config = ClientConfig::new();
        assert!(matches!(
            ProviderFactory::create(&config, ProviderType::OpenAI, ApiMode::Responses),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            ProviderFactory::create(&config, ProviderType::Anthropic, ApiMode::Responses),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_create_selects_api() {
        let config = ClientConfig::new().with_openai("sk-test").with_anthropic("sk-ant");

        let responses = ProviderFactory::create(&config, ProviderType::OpenAI, ApiMode::Responses).unwrap();
        assert_eq!(responses.name(), "OpenAI");

        let chat = ProviderFactory::create(&config, ProviderType::OpenAI, ApiMode::ChatCompletions).unwrap();
        assert_eq!(chat.name(), "OpenAI");

        let claude = ProviderFactory::for_model(&config, "claude-sonnet-4-5", ApiMode::Responses).unwrap();
        assert_eq!(claude.name(), "Anthropic");

        // Local servers never use the Responses API.
        let ollama = ProviderFactory::for_model(&config, "llama3.2", ApiMode::Responses).unwrap();
        assert_eq!(ollama.name(), "Ollama");
    }
}
