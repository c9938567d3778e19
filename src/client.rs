//! The unified entry point: one call surface over every provider.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::aggregator::{StreamAggregator, StreamHandler};
use crate::factory::{ApiMode, ClientConfig, ProviderFactory};
use crate::resolution::{LoopOutcome, ToolCallLoop};
use crate::tools::{ToolDeclaration, ToolRegistry};
use crate::types::{Prompt, Source};
use crate::{Error, LLMProvider, LLMRequest};

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TEMPERATURE: f32 = 0.0;
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Per-call settings for [`LLMClient::response`] and [`LLMClient::stream`].
#[derive(Debug, Clone, PartialEq)]
pub struct CallOptions {
    pub model: String,
    pub instructions: Option<String>,
    /// Declarations offered instead of the registry's own. Calls are still
    /// executed through the registry.
    pub tools: Option<Vec<ToolDeclaration>>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub mode: ApiMode,
    /// Continue a stored Responses API conversation.
    pub continuation_id: Option<String>,
    pub store: Option<bool>,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            instructions: None,
            tools: None,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            mode: ApiMode::default(),
            continuation_id: None,
            store: None,
        }
    }
}

impl CallOptions {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn tools(mut self, tools: Vec<ToolDeclaration>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn mode(mut self, mode: ApiMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn continuation_id(mut self, id: impl Into<String>) -> Self {
        self.continuation_id = Some(id.into());
        self
    }

    pub fn store(mut self, store: bool) -> Self {
        self.store = Some(store);
        self
    }
}

/// Final result of a `response` or `stream` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnifiedResponse {
    pub text: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    /// Only set by continuation-capable providers.
    pub response_id: Option<String>,
    #[serde(default)]
    pub sources: Vec<Source>,
}

impl UnifiedResponse {
    fn from_outcome(outcome: LoopOutcome, text: String) -> Self {
        Self {
            text,
            input_tokens: outcome.usage.input_tokens,
            output_tokens: outcome.usage.output_tokens,
            response_id: outcome.response.response_id,
            sources: outcome.sources,
        }
    }
}

/// Client that routes calls to a provider and resolves tool calls through
/// its registry.
///
/// Holds no conversation state between calls.
pub struct LLMClient {
    config: ClientConfig,
    registry: ToolRegistry,
    provider: Option<Arc<dyn LLMProvider>>,
}

impl LLMClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            registry: ToolRegistry::new(),
            provider: None,
        }
    }

    pub fn from_env() -> Result<Self, Error> {
        Ok(Self::new(ClientConfig::from_env()?))
    }

    pub fn with_registry(mut self, registry: ToolRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Send every call to `provider` instead of choosing one per model.
    pub fn with_provider(mut self, provider: impl LLMProvider) -> Self {
        self.provider = Some(Arc::new(provider));
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ToolRegistry {
        &mut self.registry
    }

    /// Generate an answer, running any requested tools along the way.
    pub async fn response(
        &self,
        input: impl Into<Prompt>,
        options: &CallOptions,
    ) -> Result<UnifiedResponse, Error> {
        let provider = self.provider_for(options)?;
        let request = self.build_request(input.into(), options);

        let outcome = ToolCallLoop::new(provider.as_ref(), &self.registry, self.config.max_tool_call_depth)
            .run(request)
            .await?;
        info!(
            provider = provider.name(),
            model = %options.model,
            provider_calls = outcome.provider_calls,
            input_tokens = outcome.usage.input_tokens,
            output_tokens = outcome.usage.output_tokens,
            "Response complete"
        );

        let text = outcome.response.content();
        Ok(UnifiedResponse::from_outcome(outcome, text))
    }

    /// Like [`response`](Self::response), but every text delta is handed to
    /// `handler` as it arrives. The returned text is exactly what the handler
    /// received, across all model turns.
    pub async fn stream<H: StreamHandler>(
        &self,
        input: impl Into<Prompt>,
        options: &CallOptions,
        handler: H,
    ) -> Result<UnifiedResponse, Error> {
        let provider = self.provider_for(options)?;
        let request = self.build_request(input.into(), options);

        let mut aggregator = StreamAggregator::new(handler);
        let outcome = ToolCallLoop::new(provider.as_ref(), &self.registry, self.config.max_tool_call_depth)
            .run_with(request, &mut aggregator)
            .await?;
        info!(
            provider = provider.name(),
            model = %options.model,
            provider_calls = outcome.provider_calls,
            "Stream complete"
        );

        Ok(UnifiedResponse::from_outcome(outcome, aggregator.into_text()))
    }

    fn provider_for(&self, options: &CallOptions) -> Result<Arc<dyn LLMProvider>, Error> {
        match &self.provider {
            Some(provider) => Ok(provider.clone()),
            None => Ok(Arc::from(ProviderFactory::for_model(
                &self.config,
                &options.model,
                options.mode,
            )?)),
        }
    }

    fn build_request(&self, prompt: Prompt, options: &CallOptions) -> LLMRequest {
        let tools = options
            .tools
            .clone()
            .unwrap_or_else(|| self.registry.declarations());

        let mut request = LLMRequest::new(options.model.clone(), prompt.into_items())
            .temperature(options.temperature)
            .max_tokens(options.max_tokens)
            .tools(tools);
        request.instructions = options.instructions.clone();
        request.previous_response_id = options.continuation_id.clone();
        request.store = options.store;
        request
    }
}
