use serde::{Deserialize, Serialize};

use super::message::InputItem;
use super::prompt::Prompt;
use crate::tools::ToolDeclaration;

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
    #[serde(default)]
    pub cached_tokens: Option<u32>,
}

impl Usage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
            cached_tokens: None,
        }
    }

    /// Fold a later report from the same provider call into this one.
    ///
    /// Providers report counters piecemeal (Anthropic sends input tokens on
    /// `message_start` and output tokens on `message_delta`), so non-zero
    /// counters replace earlier values.
    pub fn merge(&mut self, other: Usage) {
        if other.input_tokens > 0 {
            self.input_tokens = other.input_tokens;
        }
        if other.output_tokens > 0 {
            self.output_tokens = other.output_tokens;
        }
        if other.cached_tokens.is_some() {
            self.cached_tokens = other.cached_tokens;
        }
    }

    /// Sum usage across separate provider calls.
    pub fn add(&mut self, other: Usage) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
        self.cached_tokens = match (self.cached_tokens, other.cached_tokens) {
            (None, None) => None,
            (a, b) => Some(a.unwrap_or(0).saturating_add(b.unwrap_or(0))),
        };
    }
}

/// One outbound call to a provider, in provider-neutral form.
#[derive(Debug, Clone, Default)]
pub struct LLMRequest {
    pub model: String,
    pub messages: Vec<InputItem>,
    /// System-level instructions, kept apart from `messages`.
    pub instructions: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f32>,
    pub stop: Option<Vec<String>>,
    pub tools: Vec<ToolDeclaration>,
    /// Continuation token (Responses API only).
    pub previous_response_id: Option<String>,
    pub store: Option<bool>,
}

impl LLMRequest {
    pub fn new(model: impl Into<String>, messages: Vec<InputItem>) -> Self {
        Self {
            model: model.into(),
            messages,
            ..Default::default()
        }
    }

    pub fn from_prompt(model: impl Into<String>, prompt: &Prompt) -> Self {
        Self::new(model, prompt.items().to_vec())
    }

    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn stop(mut self, stop: Vec<String>) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn tools(mut self, tools: Vec<ToolDeclaration>) -> Self {
        self.tools = tools;
        self
    }

    pub fn previous_response_id(mut self, id: impl Into<String>) -> Self {
        self.previous_response_id = Some(id.into());
        self
    }

    pub fn store(mut self, store: bool) -> Self {
        self.store = Some(store);
        self
    }

    /// Function tools only, in declaration order.
    pub fn function_schemas(&self) -> impl Iterator<Item = &crate::tools::ToolSchema> {
        self.tools.iter().filter_map(|tool| match tool {
            ToolDeclaration::Function(schema) => Some(schema),
            ToolDeclaration::Internal { .. } => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_merge_keeps_piecemeal_counters() {
        let mut usage = Usage::new(12, 0);
        usage.merge(Usage::new(0, 7));
        assert_eq!(usage, Usage::new(12, 7));
    }

    #[test]
    fn test_usage_add_sums_calls() {
        let mut total = Usage::new(10, 5);
        total.add(Usage {
            input_tokens: 20,
            output_tokens: 3,
            cached_tokens: Some(4),
        });
        assert_eq!(total.input_tokens, 30);
        assert_eq!(total.output_tokens, 8);
        assert_eq!(total.cached_tokens, Some(4));
    }

    #[test]
    fn test_request_builder() {
        let prompt = Prompt::system("Be brief").with_user("Hi");
        let request = LLMRequest::from_prompt("gpt-4o-mini", &prompt)
            .temperature(0.0)
            .max_tokens(4096)
            .previous_response_id("resp_1");

        assert_eq!(request.model, "gpt-4o-mini");
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.temperature, Some(0.0));
        assert_eq!(request.max_tokens, Some(4096));
        assert_eq!(request.previous_response_id.as_deref(), Some("resp_1"));
        assert!(request.tools.is_empty());
    }
}
