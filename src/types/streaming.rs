//! Types for streaming responses.

use crate::types::{FinishReason, FunctionCall, Source, Usage};

/// Events emitted while a provider call streams.
///
/// Every provider decoder maps its wire protocol onto this one model, so the
/// accumulator, the resolution loop and the stream aggregator never see a
/// provider-specific shape.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A chunk of text was received.
    ContentDelta { delta: String },
    /// A new output item was opened (text or function call).
    OutputItemAdded { item: OutputItemInfo },
    /// A fragment of a function call's argument JSON.
    FunctionCallDelta { id: String, delta: String },
    /// A function call has completed with full arguments.
    FunctionCallComplete { call: FunctionCall },
    /// Token counters reported mid-stream.
    UsageUpdate { usage: Usage },
    /// The provider call has finished.
    Done {
        finish_reason: FinishReason,
        response_id: Option<String>,
        sources: Vec<Source>,
    },
    /// The provider reported a failure inside the stream.
    Error { error: String },
}

impl StreamEvent {
    /// Terminal event with no continuation id and no citations.
    pub fn done(finish_reason: FinishReason) -> Self {
        StreamEvent::Done {
            finish_reason,
            response_id: None,
            sources: Vec::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done { .. } | StreamEvent::Error { .. })
    }
}

/// Information about an output item being added.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputItemInfo {
    /// Text/message output item.
    Text,
    /// Function call output item with name and ID.
    FunctionCall { name: String, id: String },
}
