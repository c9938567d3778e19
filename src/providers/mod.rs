//! Provider implementations for different LLM services.

use std::time::Duration;

use reqwest::Client;

use crate::Error;

pub mod anthropic;
pub mod chat;
pub mod openai;

pub use anthropic::AnthropicProvider;
pub use chat::ChatCompletionsProvider;
pub use openai::OpenAIProvider;

/// Default request timeout for provider HTTP clients.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

pub(crate) fn http_client(timeout: Duration) -> Result<Client, Error> {
    Ok(Client::builder().timeout(timeout).build()?)
}

/// Turn a non-success HTTP response into the matching error, preferring the
/// `error.message` field both OpenAI and Anthropic put in error bodies.
pub(crate) async fn error_from_response(provider: &str, response: reqwest::Response) -> Error {
    let status = response.status().as_u16();
    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => return Error::from(e),
    };
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or(body);
    Error::from_status(provider, status, message)
}
