//! The tool-call resolution loop.
//!
//! One loop instance drives a single top-level call:
//! 1. Send the request to the provider
//! 2. If the model asked for tools: run them, append the results, resend
//! 3. Otherwise return the model's answer
//! 4. Fail once the model keeps asking past the depth bound

use futures::future::join_all;
use tracing::{debug, warn};

use crate::aggregator::{StreamAggregator, StreamHandler};
use crate::tools::{ToolCallResult, ToolDeclaration, ToolRegistry};
use crate::types::{FunctionCall, InputItem, Source, Usage};
use crate::{CompleteResponse, Error, LLMProvider, LLMRequest, Response};

/// Turns one provider response into a complete turn.
#[async_trait::async_trait]
pub trait TurnCollector: Send {
    async fn collect(&mut self, response: Response) -> Result<CompleteResponse, Error>;
}

/// Collects turns without forwarding anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct Buffered;

#[async_trait::async_trait]
impl TurnCollector for Buffered {
    async fn collect(&mut self, response: Response) -> Result<CompleteResponse, Error> {
        response.buffer().await
    }
}

#[async_trait::async_trait]
impl<H: StreamHandler> TurnCollector for StreamAggregator<H> {
    async fn collect(&mut self, response: Response) -> Result<CompleteResponse, Error> {
        self.consume(response).await
    }
}

/// Result of a finished loop.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopOutcome {
    /// The model's final turn.
    pub response: CompleteResponse,
    /// Token usage summed over every provider call.
    pub usage: Usage,
    /// Citations gathered from every turn.
    pub sources: Vec<Source>,
    pub provider_calls: u32,
    pub tool_calls_executed: u32,
}

enum LoopState {
    AwaitingModel,
    ExecutingTools {
        turn: CompleteResponse,
        calls: Vec<FunctionCall>,
    },
    Done(CompleteResponse),
    Failed(Error),
}

/// Drives model turns and tool executions until the model answers.
pub struct ToolCallLoop<'a> {
    provider: &'a dyn LLMProvider,
    registry: &'a ToolRegistry,
    max_depth: u32,
}

impl<'a> ToolCallLoop<'a> {
    pub fn new(provider: &'a dyn LLMProvider, registry: &'a ToolRegistry, max_depth: u32) -> Self {
        Self {
            provider,
            registry,
            max_depth,
        }
    }

    /// Run to completion, buffering every turn.
    pub async fn run(&self, request: LLMRequest) -> Result<LoopOutcome, Error> {
        self.run_with(request, &mut Buffered).await
    }

    /// Run to completion, handing each provider response to `collector`.
    ///
    /// At most `max_depth + 1` provider calls are made. Tool calls of one
    /// turn run concurrently; their results enter the conversation in the
    /// order the model listed them.
    pub async fn run_with<C: TurnCollector>(
        &self,
        mut request: LLMRequest,
        collector: &mut C,
    ) -> Result<LoopOutcome, Error> {
        let mut state = LoopState::AwaitingModel;
        let mut depth = 0u32;
        let mut usage = Usage::default();
        let mut sources = Vec::new();
        let mut provider_calls = 0u32;
        let mut tool_calls_executed = 0u32;

        loop {
            state = match state {
                LoopState::AwaitingModel => {
                    provider_calls += 1;
                    debug!(
                        provider = self.provider.name(),
                        depth,
                        max_depth = self.max_depth,
                        items = request.messages.len(),
                        "Awaiting model"
                    );

                    let turn = match self.provider.generate(&request).await {
                        Ok(response) => collector.collect(response).await,
                        Err(e) => Err(e),
                    };
                    match turn {
                        Err(e) => LoopState::Failed(e),
                        Ok(turn) => {
                            usage.add(turn.usage);
                            sources.extend(turn.sources.iter().cloned());

                            let calls = self.executable_calls(&request, &turn);
                            if calls.is_empty() {
                                LoopState::Done(turn)
                            } else if depth >= self.max_depth {
                                let text = turn.content();
                                warn!(max_depth = self.max_depth, "Tool call depth exceeded");
                                LoopState::Failed(Error::ToolDepthExceeded {
                                    max_depth: self.max_depth,
                                    partial_text: (!text.is_empty()).then_some(text),
                                })
                            } else {
                                LoopState::ExecutingTools { turn, calls }
                            }
                        }
                    }
                }
                LoopState::ExecutingTools { turn, calls } => {
                    depth += 1;
                    debug!(depth, count = calls.len(), "Executing tool calls");

                    match join_all(calls.iter().map(|call| self.run_call(call)))
                        .await
                        .into_iter()
                        .collect::<Result<Vec<_>, _>>()
                    {
                        Ok(results) => {
                            tool_calls_executed += results.len() as u32;
                            self.extend_conversation(&mut request, &turn, results);
                            LoopState::AwaitingModel
                        }
                        Err(e) => LoopState::Failed(e),
                    }
                }
                LoopState::Done(response) => {
                    debug!(provider_calls, tool_calls_executed, "Resolution loop finished");
                    return Ok(LoopOutcome {
                        response,
                        usage,
                        sources,
                        provider_calls,
                        tool_calls_executed,
                    });
                }
                LoopState::Failed(e) => return Err(e),
            };
        }
    }

    fn is_hosted(&self, request: &LLMRequest, name: &str) -> bool {
        self.registry.is_internal(name)
            || request
                .tools
                .iter()
                .any(|t| matches!(t, ToolDeclaration::Internal { kind, .. } if kind == name))
    }

    /// Calls to run locally. Hosted tools are left to the provider.
    fn executable_calls(&self, request: &LLMRequest, turn: &CompleteResponse) -> Vec<FunctionCall> {
        turn.function_calls()
            .into_iter()
            .filter(|call| {
                let hosted = self.is_hosted(request, &call.name);
                if hosted {
                    debug!(tool = %call.name, "Leaving hosted tool call to the provider");
                }
                !hosted
            })
            .cloned()
            .collect()
    }

    /// Run one call. Failures local to the call become error output for the
    /// model; anything else aborts the loop.
    async fn run_call(&self, call: &FunctionCall) -> Result<ToolCallResult, Error> {
        let arguments = match call.parsed_arguments() {
            Ok(arguments) => arguments,
            Err(e) => {
                warn!(tool = %call.name, call_id = %call.call_id, error = %e, "Invalid tool arguments");
                return Ok(ToolCallResult::failure(
                    &call.call_id,
                    format!("Invalid JSON arguments for tool {}: {e}", call.name),
                ));
            }
        };

        debug!(tool = %call.name, call_id = %call.call_id, "Executing tool");
        match self.registry.execute(&call.name, arguments).await {
            Ok(output) => Ok(ToolCallResult::success(&call.call_id, &output)),
            Err(Error::UnknownTool(name)) => {
                warn!(tool = %name, "Model called an unregistered tool");
                Ok(ToolCallResult::failure(
                    &call.call_id,
                    format!("Error: Tool '{name}' not found in registry"),
                ))
            }
            Err(e) if e.is_tool_local() => {
                warn!(tool = %call.name, call_id = %call.call_id, error = %e, "Tool call failed");
                Ok(ToolCallResult::failure(&call.call_id, e.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    /// Append a tool turn and its results to the conversation.
    ///
    /// With server-side storage the follow-up only carries the new results
    /// and points at the stored response; otherwise the whole turn is
    /// replayed.
    fn extend_conversation(
        &self,
        request: &mut LLMRequest,
        turn: &CompleteResponse,
        results: Vec<ToolCallResult>,
    ) {
        let outputs = results.into_iter().map(ToolCallResult::into_item);
        match (&turn.response_id, request.store) {
            (Some(id), Some(true)) => {
                request.previous_response_id = Some(id.clone());
                request.messages = outputs.collect();
            }
            _ => {
                // Skip hosted tool calls so every replayed call has an output.
                let replayed: Vec<_> = turn
                    .to_items()
                    .into_iter()
                    .filter(|item| match item {
                        InputItem::FunctionCall(call) => !self.is_hosted(request, &call.name),
                        _ => true,
                    })
                    .collect();
                request.messages.extend(replayed);
                request.messages.extend(outputs);
            }
        }
    }
}
