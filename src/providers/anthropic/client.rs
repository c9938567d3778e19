use std::collections::HashMap;
use std::time::Duration;

use reqwest::Client;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::types::*;
use crate::provider::LLMProvider;
use crate::providers::{error_from_response, http_client, DEFAULT_TIMEOUT};
use crate::sse_stream::{decode_sse, EventDecoder, SseEvent};
use crate::tools::ToolFormat;
use crate::types::{FinishReason, FunctionCall, InputItem, OutputItemInfo, Usage};
use crate::{Error, LLMRequest, Response, StreamEvent};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// The Messages API requires `max_tokens` on every request.
const DEFAULT_MAX_TOKENS: u32 = 4096;

const PROVIDER: &str = "Anthropic";

/// Anthropic Claude provider over the Messages API.
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>) -> Result<Self, Error> {
        Self::new_with_base_url(api_key, DEFAULT_BASE_URL)
    }

    /// Create a provider against a custom base URL (for testing).
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

    /// Convert internal request to Anthropic format.
    fn convert_request(&self, request: &LLMRequest) -> Result<AnthropicRequest, Error> {
        let mut messages: Vec<AnthropicMessage> = Vec::new();
        let mut system_parts: Vec<String> = request.instructions.iter().cloned().collect();

        for item in &request.messages {
            match item {
                // Anthropic has no developer role; both go to the system field.
                InputItem::Message(msg) if msg.role.is_instruction() => {
                    system_parts.push(msg.content.clone())
                }
                InputItem::Message(msg) => messages.push(AnthropicMessage {
                    role: msg.role.as_str().to_string(),
                    content: AnthropicContent::Text(msg.content.clone()),
                }),
                InputItem::FunctionCall(call) => {
                    let input = call.parsed_arguments().unwrap_or_else(|e| {
                        warn!(tool = %call.name, error = %e, "Resending tool call with unparseable arguments as empty input");
                        Value::Object(Map::new())
                    });
                    let block = AnthropicContentBlock::ToolUse {
                        id: call.call_id.clone(),
                        name: call.name.clone(),
                        input,
                    };

                    // Tool uses belong to the assistant turn that requested them.
                    match messages.last_mut() {
                        Some(last) if last.role == "assistant" => last.content.push_block(block),
                        _ => messages.push(AnthropicMessage {
                            role: "assistant".to_string(),
                            content: AnthropicContent::Blocks(vec![block]),
                        }),
                    }
                }
                InputItem::FunctionCallOutput {
                    call_id,
                    output,
                    is_error,
                } => {
                    let block = AnthropicContentBlock::ToolResult {
                        tool_use_id: call_id.clone(),
                        content: output.clone(),
                        is_error: *is_error,
                    };

                    // All results for one assistant turn go into a single user turn.
                    match messages.last_mut() {
                        Some(last) if last.role == "user" && last.content.has_tool_results() => {
                            last.content.push_block(block)
                        }
                        _ => messages.push(AnthropicMessage {
                            role: "user".to_string(),
                            content: AnthropicContent::Blocks(vec![block]),
                        }),
                    }
                }
            }
        }

        let tools = ToolFormat::Anthropic.render_all(&request.tools)?;
        let system = (!system_parts.is_empty()).then(|| system_parts.join("\n\n"));

        Ok(AnthropicRequest {
            model: request.model.clone(),
            messages,
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system,
            temperature: request.temperature,
            top_p: request.top_p,
            stop_sequences: request.stop.clone(),
            tools: (!tools.is_empty()).then_some(tools),
            stream: true,
        })
    }
}

#[async_trait::async_trait]
impl LLMProvider for AnthropicProvider {
    async fn generate(&self, request: &LLMRequest) -> Result<Response, Error> {
        let anthropic_request = self.convert_request(request)?;
        debug!(
            provider = PROVIDER,
            model = %anthropic_request.model,
            messages = anthropic_request.messages.len(),
            "Sending Messages API request"
        );

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&anthropic_request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(PROVIDER, response).await);
        }

        Ok(decode_sse(response.bytes_stream(), AnthropicDecoder::default()))
    }

    fn name(&self) -> &'static str {
        PROVIDER
    }
}

/// A tool use being built incrementally from streaming events.
#[derive(Debug)]
struct InProgressToolUse {
    id: String,
    name: String,
    input_buffer: String,
    /// The start event carried a complete input; deltas replace it.
    has_initial_input: bool,
}

/// Decoder for Messages API stream events, tracking tool uses by block index.
#[derive(Debug, Default)]
pub(crate) struct AnthropicDecoder {
    in_progress: HashMap<u32, InProgressToolUse>,
    stop_reason: Option<String>,
    done: bool,
}

impl AnthropicDecoder {
    fn convert(&mut self, event: AnthropicStreamEvent) -> Result<Vec<StreamEvent>, Error> {
        let mut events = Vec::new();

        match event {
            AnthropicStreamEvent::MessageStart { message } => {
                debug!(message_id = %message.id, "Anthropic message started");
                if let Some(usage) = message.usage {
                    events.push(StreamEvent::UsageUpdate {
                        usage: Usage::from(usage),
                    });
                }
            }
            AnthropicStreamEvent::ContentBlockStart {
                index,
                content_block,
            } => match content_block {
                AnthropicContentBlock::ToolUse { id, name, input } => {
                    events.push(StreamEvent::OutputItemAdded {
                        item: OutputItemInfo::FunctionCall {
                            name: name.clone(),
                            id: id.clone(),
                        },
                    });

                    let has_initial_input = input.as_object().is_some_and(|o| !o.is_empty());
                    let input_buffer = if has_initial_input {
                        serde_json::to_string(&input)?
                    } else {
                        String::new()
                    };
                    self.in_progress.insert(
                        index,
                        InProgressToolUse {
                            id,
                            name,
                            input_buffer,
                            has_initial_input,
                        },
                    );
                }
                AnthropicContentBlock::Text { text } => {
                    events.push(StreamEvent::OutputItemAdded {
                        item: OutputItemInfo::Text,
                    });
                    if !text.is_empty() {
                        events.push(StreamEvent::ContentDelta { delta: text });
                    }
                }
                AnthropicContentBlock::ToolResult { .. } | AnthropicContentBlock::Other => {}
            },
            AnthropicStreamEvent::ContentBlockDelta { index, delta } => match delta {
                AnthropicContentDelta::TextDelta { text } => {
                    if !text.is_empty() {
                        events.push(StreamEvent::ContentDelta { delta: text });
                    }
                }
                AnthropicContentDelta::InputJsonDelta { partial_json } => {
                    if let Some(call) = self.in_progress.get_mut(&index) {
                        if call.has_initial_input {
                            call.input_buffer.clear();
                            call.has_initial_input = false;
                        }
                        call.input_buffer.push_str(&partial_json);
                        events.push(StreamEvent::FunctionCallDelta {
                            id: call.id.clone(),
                            delta: partial_json,
                        });
                    }
                }
                AnthropicContentDelta::Other => {}
            },
            AnthropicStreamEvent::ContentBlockStop { index } => {
                if let Some(call) = self.in_progress.remove(&index) {
                    events.push(StreamEvent::FunctionCallComplete {
                        call: FunctionCall {
                            id: call.id.clone(),
                            call_id: call.id,
                            name: call.name,
                            arguments: call.input_buffer,
                        },
                    });
                }
            }
            AnthropicStreamEvent::MessageDelta { delta, usage } => {
                if let Some(reason) = delta.stop_reason {
                    self.stop_reason = Some(reason);
                }
                if let Some(usage) = usage {
                    events.push(StreamEvent::UsageUpdate {
                        usage: Usage::from(usage),
                    });
                }
            }
            AnthropicStreamEvent::MessageStop => {
                self.done = true;
                events.push(StreamEvent::done(finish_reason(self.stop_reason.as_deref())));
            }
            AnthropicStreamEvent::Ping => {}
            AnthropicStreamEvent::Error { error } => {
                return Err(match error.r#type.as_str() {
                    "rate_limit_error" => Error::RateLimit {
                        provider: PROVIDER.to_string(),
                        message: error.message,
                    },
                    _ => Error::provider(PROVIDER, format!("{}: {}", error.r#type, error.message)),
                });
            }
        }

        Ok(events)
    }
}

fn finish_reason(stop_reason: Option<&str>) -> FinishReason {
    match stop_reason {
        Some("max_tokens") => FinishReason::Length,
        Some("tool_use") => FinishReason::ToolCalls,
        Some("refusal") => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    }
}

impl EventDecoder for AnthropicDecoder {
    fn decode(&mut self, event: &SseEvent) -> Result<Vec<StreamEvent>, Error> {
        let data = event.data.trim();
        if data.is_empty() {
            return Ok(vec![]);
        }
        match serde_json::from_str::<AnthropicStreamEvent>(data) {
            Ok(parsed) => self.convert(parsed),
            // Keep-alives and comments are not JSON.
            Err(_) if !data.starts_with('{') => Ok(vec![]),
            Err(e) => {
                debug!(error = %e, "Skipping unrecognised Anthropic event");
                Ok(vec![])
            }
        }
    }

    fn finish(&mut self) -> Result<Vec<StreamEvent>, Error> {
        if self.done {
            Ok(vec![])
        } else {
            Err(Error::provider(PROVIDER, "stream ended before message_stop"))
        }
    }
}
