use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use super::types::{OpenAIInputItem, ResponsesRequest, ResponsesStreamEvent};
use crate::provider::LLMProvider;
use crate::providers::{error_from_response, http_client, DEFAULT_TIMEOUT};
use crate::sse_stream::{decode_sse, EventDecoder, SseEvent};
use crate::tools::{ToolDeclaration, ToolFormat};
use crate::types::{FinishReason, FunctionCall, InputItem, OutputItemInfo, Usage};
use crate::{Error, LLMRequest, Response, StreamEvent};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const PROVIDER: &str = "OpenAI";

/// OpenAI provider over the Responses API.
pub struct OpenAIProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAIProvider {
    pub fn new(api_key: impl Into<String>) -> Result<Self, Error> {
        Self::new_with_base_url(api_key, DEFAULT_BASE_URL)
    }

    /// Custom base URL (proxies, compatible gateways, tests).
    pub fn new_with_base_url(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, Error> {
        Self::with_timeout(api_key, base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, Error> {
        Ok(Self {
            client: http_client(timeout)?,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Convert a unified request to the Responses API format.
    fn convert_request(&self, request: &LLMRequest) -> Result<ResponsesRequest, Error> {
        let input = request.messages.iter().map(Self::convert_item).collect();

        let tools = ToolFormat::Responses.render_all(&request.tools)?;
        let searches_files = request
            .tools
            .iter()
            .any(|t| matches!(t, ToolDeclaration::Internal { kind, .. } if kind == "file_search"));

        Ok(ResponsesRequest {
            model: request.model.clone(),
            input,
            instructions: request.instructions.clone(),
            temperature: request.temperature,
            max_output_tokens: request.max_tokens,
            top_p: request.top_p,
            parallel_tool_calls: (!tools.is_empty()).then_some(true),
            tools: (!tools.is_empty()).then_some(tools),
            previous_response_id: request.previous_response_id.clone(),
            include: searches_files.then(|| vec!["file_search_call.results".to_string()]),
            stream: true,
            store: request.store,
        })
    }

    fn convert_item(item: &InputItem) -> OpenAIInputItem {
        match item {
            InputItem::Message(msg) => OpenAIInputItem::Message {
                role: msg.role.as_str().to_string(),
                content: msg.content.clone(),
            },
            InputItem::FunctionCall(call) => OpenAIInputItem::FunctionCall {
                call_id: call.call_id.clone(),
                name: call.name.clone(),
                arguments: call.arguments.clone(),
            },
            InputItem::FunctionCallOutput {
                call_id, output, ..
            } => OpenAIInputItem::FunctionCallOutput {
                call_id: call_id.clone(),
                output: output.clone(),
            },
        }
    }
}

#[async_trait::async_trait]
impl LLMProvider for OpenAIProvider {
    async fn generate(&self, request: &LLMRequest) -> Result<Response, Error> {
        let body = self.convert_request(request)?;
        debug!(
            provider = PROVIDER,
            model = %body.model,
            items = body.input.len(),
            continuation = body.previous_response_id.is_some(),
            "Sending Responses API request"
        );

        let response = self
            .client
            .post(format!("{}/responses", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(PROVIDER, response).await);
        }

        Ok(decode_sse(response.bytes_stream(), ResponsesDecoder::default()))
    }

    fn name(&self) -> &'static str {
        PROVIDER
    }
}

/// Decoder for Responses API stream events.
#[derive(Debug, Default)]
pub(crate) struct ResponsesDecoder {
    response_id: Option<String>,
    saw_function_call: bool,
    completed: bool,
}

impl ResponsesDecoder {
    fn convert(&mut self, event: ResponsesStreamEvent) -> Result<Vec<StreamEvent>, Error> {
        match event.r#type.as_str() {
            "response.created" | "response.in_progress" => {
                if let Some(response) = event.response {
                    self.response_id = Some(response.id);
                }
            }
            "response.output_text.delta" => {
                if let Some(delta) = event.delta.filter(|d| !d.is_empty()) {
                    return Ok(vec![StreamEvent::ContentDelta { delta }]);
                }
            }
            "response.output_item.added" => {
                let Some(item) = event.item else {
                    return Ok(vec![]);
                };
                let info = match item.r#type.as_str() {
                    "message" => OutputItemInfo::Text,
                    "function_call" => OutputItemInfo::FunctionCall {
                        name: item.name.unwrap_or_default(),
                        id: item.id.unwrap_or_default(),
                    },
                    other => {
                        debug!(item_type = other, "Hosted tool item started");
                        return Ok(vec![]);
                    }
                };
                return Ok(vec![StreamEvent::OutputItemAdded { item: info }]);
            }
            "response.function_call_arguments.delta" => {
                if let (Some(id), Some(delta)) = (event.item_id, event.delta) {
                    return Ok(vec![StreamEvent::FunctionCallDelta { id, delta }]);
                }
            }
            "response.output_item.done" => {
                let Some(item) = event.item.filter(|i| i.r#type == "function_call") else {
                    return Ok(vec![]);
                };
                let id = item.id.unwrap_or_default();
                let call = FunctionCall {
                    call_id: item.call_id.unwrap_or_else(|| id.clone()),
                    id,
                    name: item.name.unwrap_or_default(),
                    arguments: item.arguments.unwrap_or_default(),
                };
                self.saw_function_call = true;
                return Ok(vec![StreamEvent::FunctionCallComplete { call }]);
            }
            "response.completed" | "response.incomplete" => {
                let Some(response) = event.response else {
                    return Err(Error::provider(PROVIDER, "completion event without response"));
                };
                self.completed = true;

                let finish_reason = match response
                    .incomplete_details
                    .as_ref()
                    .and_then(|d| d.reason.as_deref())
                {
                    Some("max_output_tokens") => FinishReason::Length,
                    Some("content_filter") => FinishReason::ContentFilter,
                    _ if self.saw_function_call
                        || response.output.iter().any(|o| o.r#type == "function_call") =>
                    {
                        FinishReason::ToolCalls
                    }
                    _ => FinishReason::Stop,
                };

                let usage = response.usage.map(Usage::from).unwrap_or_default();
                return Ok(vec![
                    StreamEvent::UsageUpdate { usage },
                    StreamEvent::Done {
                        finish_reason,
                        sources: response.sources(),
                        response_id: Some(response.id),
                    },
                ]);
            }
            "response.failed" => {
                let message = event
                    .response
                    .and_then(|r| r.error)
                    .map(|e| e.message)
                    .unwrap_or_else(|| "response failed".to_string());
                return Err(Error::provider(PROVIDER, message));
            }
            "error" => {
                let message = event.message.unwrap_or_else(|| "unknown stream error".to_string());
                return Err(match event.code.as_deref() {
                    Some("rate_limit_exceeded") => Error::RateLimit {
                        provider: PROVIDER.to_string(),
                        message,
                    },
                    _ => Error::provider(PROVIDER, message),
                });
            }
            _ => {}
        }

        Ok(vec![])
    }
}

impl EventDecoder for ResponsesDecoder {
    fn decode(&mut self, event: &SseEvent) -> Result<Vec<StreamEvent>, Error> {
        if event.is_done() || event.data.trim().is_empty() {
            return Ok(vec![]);
        }
        match serde_json::from_str::<ResponsesStreamEvent>(&event.data) {
            Ok(parsed) => self.convert(parsed),
            Err(e) => {
                debug!(error = %e, "Skipping unparseable Responses API event");
                Ok(vec![])
            }
        }
    }

    fn finish(&mut self) -> Result<Vec<StreamEvent>, Error> {
        if self.completed {
            Ok(vec![])
        } else {
            Err(Error::provider(
                PROVIDER,
                format!(
                    "stream ended before completion (response {})",
                    self.response_id.as_deref().unwrap_or("unknown")
                ),
            ))
        }
    }
}
