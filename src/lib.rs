//! A unified client over multiple LLM providers.
//!
//! One request/response shape for the OpenAI Responses and Chat Completions
//! APIs, Anthropic, and locally hosted OpenAI-compatible servers such as
//! Ollama. Tools are declared once, rendered per provider, and executed
//! locally by a bounded resolution loop. Every provider call streams; text
//! can be forwarded to a handler as it arrives.

pub mod accumulator;
pub mod aggregator;
pub mod client;
pub mod error;
pub mod factory;
pub mod provider;
pub mod providers;
pub mod resolution;
pub mod response;
pub mod sse_stream;
pub mod tools;
pub mod types;

// Re-export core types for easy usage
pub use accumulator::ResponseAccumulator;
pub use aggregator::{StreamAggregator, StreamHandler};
pub use client::{CallOptions, LLMClient, UnifiedResponse};
pub use error::{BoxError, Error, SchemaError};
pub use factory::{ApiMode, ClientConfig, ProviderFactory, ProviderType};
pub use provider::LLMProvider;
pub use providers::{AnthropicProvider, ChatCompletionsProvider, OpenAIProvider};
pub use resolution::{LoopOutcome, ToolCallLoop, TurnCollector};
pub use response::*;
pub use sse_stream::{EventDecoder, SseEvent};
pub use tools::{
    ParamType, Tool, ToolDeclaration, ToolFormat, ToolHandler, ToolOutput, ToolParameter,
    ToolRegistry, ToolSchema,
};
pub use types::*;
