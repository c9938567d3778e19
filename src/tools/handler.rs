//! Callable side of a tool: the async handler trait, adapters for plain
//! functions, and the value a call produces.

use std::future::Future;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::BoxError;
use crate::types::InputItem;
use crate::Error;

/// Something that can run a tool call with JSON arguments.
#[async_trait::async_trait]
pub trait ToolHandler: Send + Sync + 'static {
    /// Run the tool. Argument decoding failures should be reported as
    /// [`Error::Argument`]; anything else as [`Error::ToolExecution`].
    async fn call(&self, arguments: Value) -> Result<ToolOutput, Error>;
}

/// What a tool returned.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    Text(String),
    Json(Value),
}

impl ToolOutput {
    pub fn json<T: Serialize>(value: &T) -> Result<Self, Error> {
        Ok(ToolOutput::Json(serde_json::to_value(value)?))
    }

    /// Text shown to the model: strings verbatim, structured values as JSON.
    pub fn to_model_text(&self) -> String {
        match self {
            ToolOutput::Text(text) => text.clone(),
            ToolOutput::Json(Value::String(text)) => text.clone(),
            ToolOutput::Json(value) => value.to_string(),
        }
    }
}

impl From<String> for ToolOutput {
    fn from(text: String) -> Self {
        ToolOutput::Text(text)
    }
}

impl From<&str> for ToolOutput {
    fn from(text: &str) -> Self {
        ToolOutput::Text(text.to_string())
    }
}

impl From<Value> for ToolOutput {
    fn from(value: Value) -> Self {
        ToolOutput::Json(value)
    }
}

/// Outcome of one tool call, correlated to the request by `call_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallResult {
    pub call_id: String,
    pub output: String,
    pub error: Option<String>,
}

impl ToolCallResult {
    pub fn success(call_id: impl Into<String>, output: &ToolOutput) -> Self {
        Self {
            call_id: call_id.into(),
            output: output.to_model_text(),
            error: None,
        }
    }

    /// A failed call; the error text doubles as the output the model sees.
    pub fn failure(call_id: impl Into<String>, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            call_id: call_id.into(),
            output: error.clone(),
            error: Some(error),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn into_item(self) -> InputItem {
        InputItem::FunctionCallOutput {
            is_error: self.error.is_some(),
            call_id: self.call_id,
            output: self.output,
        }
    }
}

fn decode_arguments<Args: DeserializeOwned>(tool: &str, arguments: Value) -> Result<Args, Error> {
    serde_json::from_value(arguments).map_err(|e| Error::argument(tool, e.to_string()))
}

/// Adapter for `async fn(Args) -> Result<T, E>`.
pub(crate) struct AsyncFnHandler<F, Args> {
    tool: String,
    f: F,
    _args: PhantomData<fn() -> Args>,
}

impl<F, Args> AsyncFnHandler<F, Args> {
    pub(crate) fn new(tool: impl Into<String>, f: F) -> Self {
        Self {
            tool: tool.into(),
            f,
            _args: PhantomData,
        }
    }
}

#[async_trait::async_trait]
impl<F, Fut, Args, T, E> ToolHandler for AsyncFnHandler<F, Args>
where
    F: Fn(Args) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    Args: DeserializeOwned + Send + 'static,
    T: Into<ToolOutput> + Send + 'static,
    E: Into<BoxError> + Send + 'static,
{
    async fn call(&self, arguments: Value) -> Result<ToolOutput, Error> {
        let args = decode_arguments::<Args>(&self.tool, arguments)?;
        (self.f)(args)
            .await
            .map(Into::into)
            .map_err(|e| Error::tool_execution(self.tool.as_str(), e))
    }
}

/// Adapter for `fn(Args) -> Result<T, E>`, run inline on the calling task.
pub(crate) struct SyncFnHandler<F, Args> {
    tool: String,
    f: F,
    _args: PhantomData<fn() -> Args>,
}

impl<F, Args> SyncFnHandler<F, Args> {
    pub(crate) fn new(tool: impl Into<String>, f: F) -> Self {
        Self {
            tool: tool.into(),
            f,
            _args: PhantomData,
        }
    }
}

#[async_trait::async_trait]
impl<F, Args, T, E> ToolHandler for SyncFnHandler<F, Args>
where
    F: Fn(Args) -> Result<T, E> + Send + Sync + 'static,
    Args: DeserializeOwned + Send + 'static,
    T: Into<ToolOutput> + Send + 'static,
    E: Into<BoxError> + Send + 'static,
{
    async fn call(&self, arguments: Value) -> Result<ToolOutput, Error> {
        let args = decode_arguments::<Args>(&self.tool, arguments)?;
        (self.f)(args)
            .map(Into::into)
            .map_err(|e| Error::tool_execution(self.tool.as_str(), e))
    }
}
