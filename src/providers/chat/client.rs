use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use super::types::*;
use crate::provider::LLMProvider;
use crate::providers::{error_from_response, http_client, DEFAULT_TIMEOUT};
use crate::sse_stream::{decode_sse, EventDecoder, SseEvent};
use crate::tools::ToolFormat;
use crate::types::{FinishReason, FunctionCall, InputItem, OutputItemInfo, Role, Usage};
use crate::{Error, LLMRequest, Response, StreamEvent};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";

/// Chat Completions provider for OpenAI chat mode and OpenAI-compatible
/// local servers such as Ollama.
pub struct ChatCompletionsProvider {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    format: ToolFormat,
    name: &'static str,
}

impl ChatCompletionsProvider {
    /// OpenAI Chat Completions.
    pub fn new(api_key: impl Into<String>) -> Result<Self, Error> {
        Self::new_with_base_url(api_key, OPENAI_BASE_URL)
    }

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
            api_key: Some(api_key.into()).filter(|k| !k.is_empty()),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            format: ToolFormat::ChatCompletions,
            name: "OpenAI",
        })
    }

    /// A local Ollama server. No credentials are sent.
    pub fn ollama(base_url: impl Into<String>) -> Result<Self, Error> {
        Self::ollama_with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn ollama_with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, Error> {
        Ok(Self {
            client: http_client(timeout)?,
            api_key: None,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            format: ToolFormat::Ollama,
            name: "Ollama",
        })
    }

    fn convert_request(&self, request: &LLMRequest) -> Result<ChatRequest, Error> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(instructions) = &request.instructions {
            messages.push(ChatMessage::text("system", instructions.clone()));
        }

        for item in &request.messages {
            match item {
                InputItem::Message(msg) => {
                    let role = match msg.role {
                        Role::Developer => Role::System,
                        role => role,
                    };
                    messages.push(ChatMessage::text(role.as_str(), msg.content.clone()));
                }
                InputItem::FunctionCall(call) => {
                    let tool_call = ChatToolCall {
                        id: call.call_id.clone(),
                        r#type: "function".to_string(),
                        function: ChatFunction {
                            name: call.name.clone(),
                            arguments: call.arguments.clone(),
                        },
                    };
                    match messages.last_mut() {
                        Some(last) if last.role == "assistant" => last.tool_calls.push(tool_call),
                        _ => messages.push(ChatMessage {
                            role: "assistant".to_string(),
                            content: None,
                            tool_calls: vec![tool_call],
                            tool_call_id: None,
                        }),
                    }
                }
                InputItem::FunctionCallOutput {
                    call_id, output, ..
                } => messages.push(ChatMessage::tool_result(call_id.clone(), output.clone())),
            }
        }

        let tools = self.format.render_all(&request.tools)?;

        Ok(ChatRequest {
            model: request.model.clone(),
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            top_p: request.top_p,
            stop: request.stop.clone(),
            tools: (!tools.is_empty()).then_some(tools),
            stream: true,
            stream_options: Some(StreamOptions {
                include_usage: true,
            }),
        })
    }
}

#[async_trait::async_trait]
impl LLMProvider for ChatCompletionsProvider {
    async fn generate(&self, request: &LLMRequest) -> Result<Response, Error> {
        if request.previous_response_id.is_some() {
            debug!(provider = self.name, "Ignoring continuation id on Chat Completions");
        }
        let body = self.convert_request(request)?;
        debug!(
            provider = self.name,
            model = %body.model,
            messages = body.messages.len(),
            "Sending Chat Completions request"
        );

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await?;

        if !response.status().is_success() {
            return Err(error_from_response(self.name, response).await);
        }

        Ok(decode_sse(response.bytes_stream(), ChatDecoder::new(self.name)))
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

#[derive(Debug, Default)]
struct PendingCall {
    id: String,
    name: String,
    arguments: String,
}

/// Reassembles Chat Completions chunks. Tool calls arrive as fragments keyed
/// by `index`; only the first fragment of a call carries its id and name.
#[derive(Debug)]
pub(crate) struct ChatDecoder {
    provider: &'static str,
    calls: BTreeMap<u32, PendingCall>,
    finish_reason: Option<FinishReason>,
    done: bool,
}

impl ChatDecoder {
    pub(crate) fn new(provider: &'static str) -> Self {
        Self {
            provider,
            calls: BTreeMap::new(),
            finish_reason: None,
            done: false,
        }
    }

    fn convert(&mut self, chunk: ChatChunk) -> Result<Vec<StreamEvent>, Error> {
        if let Some(error) = chunk.error {
            return Err(Error::provider(self.provider, error.message));
        }

        let mut events = Vec::new();
        for choice in chunk.choices {
            if let Some(delta) = choice.delta.content.filter(|c| !c.is_empty()) {
                events.push(StreamEvent::ContentDelta { delta });
            }

            for fragment in choice.delta.tool_calls {
                let call = self.calls.entry(fragment.index).or_default();
                let is_new = call.id.is_empty();
                if is_new {
                    call.id = fragment
                        .id
                        .filter(|id| !id.is_empty())
                        .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple()));
                }
                let (name, arguments) = fragment
                    .function
                    .map(|f| (f.name, f.arguments))
                    .unwrap_or_default();
                if let Some(name) = name {
                    call.name.push_str(&name);
                }
                if is_new {
                    events.push(StreamEvent::OutputItemAdded {
                        item: OutputItemInfo::FunctionCall {
                            name: call.name.clone(),
                            id: call.id.clone(),
                        },
                    });
                }
                if let Some(arguments) = arguments.filter(|a| !a.is_empty()) {
                    call.arguments.push_str(&arguments);
                    events.push(StreamEvent::FunctionCallDelta {
                        id: call.id.clone(),
                        delta: arguments,
                    });
                }
            }

            if let Some(reason) = choice.finish_reason {
                let flushed = self.flush_calls();
                self.finish_reason = Some(if flushed.is_empty() {
                    match reason.as_str() {
                        "length" => FinishReason::Length,
                        "content_filter" => FinishReason::ContentFilter,
                        "tool_calls" | "function_call" => FinishReason::ToolCalls,
                        _ => FinishReason::Stop,
                    }
                } else {
                    // Ollama reports "stop" even when it called tools.
                    FinishReason::ToolCalls
                });
                events.extend(flushed);
            }
        }

        // With include_usage the counters arrive in a final chunk without choices.
        if let Some(usage) = chunk.usage {
            events.push(StreamEvent::UsageUpdate {
                usage: Usage::from(usage),
            });
        }

        Ok(events)
    }

    fn flush_calls(&mut self) -> Vec<StreamEvent> {
        std::mem::take(&mut self.calls)
            .into_values()
            .map(|call| StreamEvent::FunctionCallComplete {
                call: FunctionCall {
                    id: call.id.clone(),
                    call_id: call.id,
                    name: call.name,
                    arguments: call.arguments,
                },
            })
            .collect()
    }

    fn done_events(&mut self) -> Vec<StreamEvent> {
        let had_calls = !self.calls.is_empty();
        let mut events = self.flush_calls();
        let finish_reason = match self.finish_reason.take() {
            Some(reason) => reason,
            None if had_calls => FinishReason::ToolCalls,
            None => FinishReason::Stop,
        };
        self.done = true;
        events.push(StreamEvent::done(finish_reason));
        events
    }
}

impl EventDecoder for ChatDecoder {
    fn decode(&mut self, event: &SseEvent) -> Result<Vec<StreamEvent>, Error> {
        if self.done {
            return Ok(vec![]);
        }
        if event.is_done() {
            return Ok(self.done_events());
        }
        let data = event.data.trim();
        if data.is_empty() {
            return Ok(vec![]);
        }
        match serde_json::from_str::<ChatChunk>(data) {
            Ok(chunk) => self.convert(chunk),
            Err(e) => {
                debug!(provider = self.provider, error = %e, "Skipping unparseable chunk");
                Ok(vec![])
            }
        }
    }

    fn finish(&mut self) -> Result<Vec<StreamEvent>, Error> {
        if self.done {
            return Ok(vec![]);
        }
        // Some servers close the stream without a [DONE] sentinel.
        if self.finish_reason.is_some() || !self.calls.is_empty() {
            return Ok(self.done_events());
        }
        Err(Error::provider(self.provider, "stream ended before a finish reason"))
    }
}
