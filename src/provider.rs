use crate::{Error, LLMRequest, Response};

/// A trait for LLM providers that can generate responses.
/// All responses are internally streamed - use `response.stream()` for streaming
/// or `response.buffer().await` for the complete output.
#[async_trait::async_trait]
pub trait LLMProvider: Send + Sync + 'static {
    /// Issue one provider call. The request is sent in streaming mode.
    async fn generate(&self, request: &LLMRequest) -> Result<Response, Error>;

    /// Provider name used in errors and logs.
    fn name(&self) -> &'static str;
}
