//! Delta accumulation logic for streaming responses.

use std::collections::HashMap;

use crate::types::{FinishReason, FunctionCall, OutputItemInfo, Source, StreamEvent, Usage};
use crate::Error;
use crate::{CompleteResponse, OutputItem};

/// Accumulates one provider call's stream events into a complete response.
#[derive(Debug, Default)]
pub struct ResponseAccumulator {
    /// Ordered output items (text, function calls)
    output_items: Vec<OutputItem>,
    /// Argument fragments by call id, for providers that only stream deltas
    partial_arguments: HashMap<String, String>,
    finish_reason: Option<FinishReason>,
    usage: Usage,
    response_id: Option<String>,
    sources: Vec<Source>,
    done: bool,
}

impl ResponseAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process a stream event and update the accumulation.
    pub fn process_event(&mut self, event: StreamEvent) -> Result<(), Error> {
        match event {
            StreamEvent::ContentDelta { delta } => match self.output_items.last_mut() {
                Some(OutputItem::Text { content }) => content.push_str(&delta),
                // No open text item; providers without item events still work
                _ => self.output_items.push(OutputItem::Text { content: delta }),
            },
            StreamEvent::OutputItemAdded { item } => match item {
                OutputItemInfo::Text => {
                    // Filled by subsequent ContentDelta events
                    self.output_items.push(OutputItem::Text {
                        content: String::new(),
                    });
                }
                OutputItemInfo::FunctionCall { id, .. } => {
                    self.partial_arguments.entry(id).or_default();
                }
            },
            StreamEvent::FunctionCallDelta { id, delta } => {
                self.partial_arguments.entry(id).or_default().push_str(&delta);
            }
            StreamEvent::FunctionCallComplete { mut call } => {
                let partial = self.partial_arguments.remove(&call.id);
                if call.arguments.is_empty() {
                    call.arguments = partial.unwrap_or_default();
                }
                self.output_items.push(OutputItem::FunctionCall { call });
            }
            StreamEvent::UsageUpdate { usage } => self.usage.merge(usage),
            StreamEvent::Done {
                finish_reason,
                response_id,
                sources,
            } => {
                self.finish_reason = Some(finish_reason);
                if response_id.is_some() {
                    self.response_id = response_id;
                }
                self.sources.extend(sources);
                self.done = true;
            }
            StreamEvent::Error { error } => return Err(Error::streaming(error)),
        }

        Ok(())
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Finalize and return the complete response.
    pub fn finalize(self) -> Result<CompleteResponse, Error> {
        // Drop empty text items opened by item events that carried no text
        let output: Vec<OutputItem> = self
            .output_items
            .into_iter()
            .filter(|item| !matches!(item, OutputItem::Text { content } if content.is_empty()))
            .collect();

        let finish_reason = self.finish_reason.unwrap_or_else(|| {
            if output.iter().any(|i| matches!(i, OutputItem::FunctionCall { .. })) {
                FinishReason::ToolCalls
            } else {
                FinishReason::Stop
            }
        });

        Ok(CompleteResponse {
            output,
            finish_reason,
            usage: self.usage,
            response_id: self.response_id,
            sources: self.sources,
        })
    }

    /// Concatenated text so far.
    pub fn current_content(&self) -> String {
        self.output_items
            .iter()
            .filter_map(|item| match item {
                OutputItem::Text { content } => Some(content.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Completed function calls so far.
    pub fn completed_function_calls(&self) -> Vec<FunctionCall> {
        self.output_items
            .iter()
            .filter_map(|item| match item {
                OutputItem::FunctionCall { call } => Some(call.clone()),
                _ => None,
            })
            .collect()
    }
}
