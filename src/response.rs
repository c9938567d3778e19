//! Response handling for LLM generations.

use std::pin::Pin;

use futures_util::stream::Stream;
use futures_util::StreamExt;

use crate::accumulator::ResponseAccumulator;
use crate::types::{FinishReason, FunctionCall, InputItem, Message, Source, StreamEvent, Usage};
use crate::Error;

/// Boxed stream of unified events for one provider call.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, Error>> + Send>>;

/// A complete response from one provider call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompleteResponse {
    /// Ordered sequence of output items (text, function calls)
    pub output: Vec<OutputItem>,
    pub finish_reason: FinishReason,
    pub usage: Usage,
    /// Continuation id, only set by continuation-capable providers.
    pub response_id: Option<String>,
    pub sources: Vec<Source>,
}

/// An item in the LLM response output.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputItem {
    Text { content: String },
    FunctionCall { call: FunctionCall },
}

impl OutputItem {
    /// Text items become assistant messages, function calls become function call items.
    pub fn to_input_item(&self) -> InputItem {
        match self {
            OutputItem::Text { content } => InputItem::Message(Message::assistant(content.clone())),
            OutputItem::FunctionCall { call } => InputItem::FunctionCall(call.clone()),
        }
    }
}

impl CompleteResponse {
    /// All text content concatenated together.
    pub fn content(&self) -> String {
        self.output
            .iter()
            .filter_map(|item| match item {
                OutputItem::Text { content } => Some(content.as_str()),
                _ => None,
            })
            .collect()
    }

    /// All function calls in order.
    pub fn function_calls(&self) -> Vec<&FunctionCall> {
        self.output
            .iter()
            .filter_map(|item| match item {
                OutputItem::FunctionCall { call } => Some(call),
                _ => None,
            })
            .collect()
    }

    pub fn has_function_calls(&self) -> bool {
        self.output
            .iter()
            .any(|item| matches!(item, OutputItem::FunctionCall { .. }))
    }

    /// Convert this response to conversation items, preserving the ordering
    /// of text and function calls.
    pub fn to_items(&self) -> Vec<InputItem> {
        self.output.iter().map(OutputItem::to_input_item).collect()
    }
}

/// Response from an LLM generation that can be streamed or buffered.
/// All responses are internally streaming.
pub struct Response {
    stream: EventStream,
}

impl Response {
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<StreamEvent, Error>> + Send + 'static,
    {
        Self {
            stream: Box::pin(stream),
        }
    }

    /// Buffer the entire response by consuming the stream.
    pub async fn buffer(mut self) -> Result<CompleteResponse, Error> {
        let mut accumulator = ResponseAccumulator::new();

        while let Some(event) = self.stream.next().await {
            accumulator.process_event(event?)?;
            if accumulator.is_done() {
                break;
            }
        }

        accumulator.finalize()
    }

    /// Just the text content.
    pub async fn text(self) -> Result<String, Error> {
        Ok(self.buffer().await?.content())
    }

    pub fn stream(self) -> EventStream {
        self.stream
    }
}
