use thiserror::Error;

/// Boxed error produced by user code (tool callables, stream handlers).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur when using the unified-llm library.
#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Provider error: {provider} - {message}")]
    Provider { provider: String, message: String },

    #[error("{provider} API error (status {status}): {message}")]
    Api {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("Rate limit exceeded: {provider} - {message}")]
    RateLimit { provider: String, message: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Streaming error: {0}")]
    Streaming(String),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("Tool '{0}' is already registered")]
    DuplicateTool(String),

    #[error("Tool '{0}' not found in registry")]
    UnknownTool(String),

    #[error("Tool '{0}' is executed by the provider and cannot run locally")]
    InternalTool(String),

    #[error("Invalid arguments for tool {tool}: {message}")]
    Argument { tool: String, message: String },

    #[error("Error executing tool {tool}: {source}")]
    ToolExecution {
        tool: String,
        #[source]
        source: BoxError,
    },

    #[error("Maximum tool call depth ({max_depth}) exceeded")]
    ToolDepthExceeded {
        max_depth: u32,
        /// Text the model produced alongside its last tool request, if any.
        partial_text: Option<String>,
    },

    #[error("Stream handler failed: {0}")]
    Consumer(#[source] BoxError),
}

impl Error {
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Error::Auth(message.into())
    }

    pub fn streaming(message: impl Into<String>) -> Self {
        Error::Streaming(message.into())
    }

    pub fn argument(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Argument {
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub fn tool_execution(tool: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Error::ToolExecution {
            tool: tool.into(),
            source: source.into(),
        }
    }

    /// Map a non-success HTTP status from a provider into the matching error.
    pub fn from_status(provider: &str, status: u16, body: String) -> Self {
        match status {
            401 | 403 => Error::Auth(format!("{provider}: {body}")),
            429 => Error::RateLimit {
                provider: provider.to_string(),
                message: body,
            },
            _ => Error::Api {
                provider: provider.to_string(),
                status,
                message: body,
            },
        }
    }

    /// Whether this error is local to a single tool call and should be shown
    /// to the model instead of aborting the conversation.
    pub fn is_tool_local(&self) -> bool {
        matches!(
            self,
            Error::UnknownTool(_) | Error::Argument { .. } | Error::ToolExecution { .. }
        )
    }
}

/// Failures while deriving a tool schema or adapting it to a provider format.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Parameter '{parameter}' of tool '{tool}' has no type")]
    MissingTypeAnnotation { tool: String, parameter: String },

    #[error("Parameter '{parameter}' of tool '{tool}' uses type '{found}' which {provider} does not support")]
    UnsupportedTypeForProvider {
        tool: String,
        parameter: String,
        provider: String,
        found: String,
    },

    #[error("Invalid schema for tool '{tool}': {message}")]
    Invalid { tool: String, message: String },
}
