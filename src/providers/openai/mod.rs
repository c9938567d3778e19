//! OpenAI Responses API (continuation-capable).

pub mod client;
pub mod types;

pub use client::OpenAIProvider;
