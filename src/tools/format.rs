//! Rendering of tool schemas into each provider's wire shape.

use serde_json::{json, Map, Value};
use tracing::debug;

use super::schema::ToolSchema;
use crate::error::SchemaError;

/// Tool types executed by the provider itself rather than locally.
pub const INTERNAL_TOOL_KINDS: &[&str] = &[
    "file_search",
    "web_search",
    "web_search_preview",
    "code_interpreter",
    "retrieval",
];

/// Provider families with distinct tool declaration shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolFormat {
    /// OpenAI Responses API.
    Responses,
    /// OpenAI Chat Completions API.
    ChatCompletions,
    /// Anthropic Messages API.
    Anthropic,
    /// OpenAI-compatible endpoint of a locally hosted model server.
    Ollama,
}

impl ToolFormat {
    pub fn provider_name(&self) -> &'static str {
        match self {
            ToolFormat::Responses | ToolFormat::ChatCompletions => "OpenAI",
            ToolFormat::Anthropic => "Anthropic",
            ToolFormat::Ollama => "Ollama",
        }
    }

    pub fn supports_internal_tools(&self) -> bool {
        matches!(self, ToolFormat::Responses)
    }

    /// Render one function schema.
    pub fn render(&self, schema: &ToolSchema) -> Result<Value, SchemaError> {
        match self {
            ToolFormat::Responses => Ok(json!({
                "type": "function",
                "name": schema.name,
                "description": schema.description,
                "parameters": schema.parameters_json(),
            })),
            ToolFormat::ChatCompletions => Ok(chat_function(schema)),
            ToolFormat::Anthropic => Ok(json!({
                "name": schema.name,
                "description": schema.description,
                "input_schema": schema.parameters_json(),
            })),
            ToolFormat::Ollama => {
                if let Some(nested) = schema
                    .parameters
                    .iter()
                    .find(|p| p.ty.has_nested_fields())
                {
                    return Err(SchemaError::UnsupportedTypeForProvider {
                        tool: schema.name.clone(),
                        parameter: nested.name.clone(),
                        provider: self.provider_name().to_string(),
                        found: nested.ty.to_json().to_string(),
                    });
                }
                Ok(chat_function(schema))
            }
        }
    }

    /// Render a declaration list, dropping hosted tools the format cannot carry.
    pub fn render_all(&self, tools: &[ToolDeclaration]) -> Result<Vec<Value>, SchemaError> {
        let mut rendered = Vec::with_capacity(tools.len());
        for tool in tools {
            match tool {
                ToolDeclaration::Function(schema) => rendered.push(self.render(schema)?),
                ToolDeclaration::Internal { kind, options } => {
                    if self.supports_internal_tools() {
                        let mut value = options.clone();
                        value.insert("type".into(), Value::String(kind.clone()));
                        rendered.push(Value::Object(value));
                    } else {
                        debug!(
                            tool = %kind,
                            provider = self.provider_name(),
                            "Skipping hosted tool unsupported by provider"
                        );
                    }
                }
            }
        }
        Ok(rendered)
    }
}

fn chat_function(schema: &ToolSchema) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": schema.name,
            "description": schema.description,
            "parameters": schema.parameters_json(),
        }
    })
}

/// A tool as offered to the model for one call.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolDeclaration {
    /// A locally executed function.
    Function(ToolSchema),
    /// A provider-hosted tool such as `web_search_preview`, with its options.
    Internal {
        kind: String,
        options: Map<String, Value>,
    },
}

impl ToolDeclaration {
    pub fn internal(kind: impl Into<String>) -> Self {
        ToolDeclaration::Internal {
            kind: kind.into(),
            options: Map::new(),
        }
    }

    /// Hosted tool with extra options, e.g. `{"search_context_size": "low"}`.
    pub fn internal_with_options(kind: impl Into<String>, options: Map<String, Value>) -> Self {
        ToolDeclaration::Internal {
            kind: kind.into(),
            options,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ToolDeclaration::Function(schema) => &schema.name,
            ToolDeclaration::Internal { kind, .. } => kind,
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, ToolDeclaration::Internal { .. })
    }
}

impl From<ToolSchema> for ToolDeclaration {
    fn from(schema: ToolSchema) -> Self {
        ToolDeclaration::Function(schema)
    }
}
