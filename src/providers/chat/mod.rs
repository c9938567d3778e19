//! OpenAI-compatible Chat Completions API (OpenAI chat mode, Ollama).

pub mod client;
pub mod types;

pub use client::ChatCompletionsProvider;
