use std::fmt;
use std::future::Future;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

use super::format::{ToolDeclaration, ToolFormat, INTERNAL_TOOL_KINDS};
use super::handler::{AsyncFnHandler, SyncFnHandler, ToolHandler, ToolOutput};
use super::schema::ToolSchema;
use crate::error::{BoxError, SchemaError};
use crate::Error;

#[derive(Clone)]
enum ToolKind {
    Local(Arc<dyn ToolHandler>),
    /// Executed by the provider; carries the hosted tool type and its options.
    Internal {
        kind: String,
        options: Map<String, Value>,
    },
}

/// A registration: a schema plus either a local handler or a hosted tool type.
///
/// Built once and never re-inspected; the schema is derived when the value is
/// constructed, not when the tool is called.
#[derive(Clone)]
pub struct Tool {
    schema: ToolSchema,
    kind: ToolKind,
}

impl Tool {
    /// Schema plus a custom handler.
    pub fn new(schema: ToolSchema, handler: impl ToolHandler) -> Result<Self, SchemaError> {
        schema.validate()?;
        Ok(Self {
            schema,
            kind: ToolKind::Local(Arc::new(handler)),
        })
    }

    /// Wrap an async function taking a `JsonSchema` argument struct.
    ///
    /// The schema is derived from `Args` and attached to the returned value;
    /// nothing is registered.
    pub fn from_fn<Args, F, Fut, T, E>(name: impl Into<String>, f: F) -> Result<Self, SchemaError>
    where
        Args: DeserializeOwned + JsonSchema + Send + 'static,
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Into<ToolOutput> + Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        let name = name.into();
        let schema = ToolSchema::derive::<Args>(name.clone())?;
        Ok(Self {
            schema,
            kind: ToolKind::Local(Arc::new(AsyncFnHandler::<F, Args>::new(name, f))),
        })
    }

    /// Like [`Tool::from_fn`] for a synchronous function.
    pub fn from_sync_fn<Args, F, T, E>(name: impl Into<String>, f: F) -> Result<Self, SchemaError>
    where
        Args: DeserializeOwned + JsonSchema + Send + 'static,
        F: Fn(Args) -> Result<T, E> + Send + Sync + 'static,
        T: Into<ToolOutput> + Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        let name = name.into();
        let schema = ToolSchema::derive::<Args>(name.clone())?;
        Ok(Self {
            schema,
            kind: ToolKind::Local(Arc::new(SyncFnHandler::<F, Args>::new(name, f))),
        })
    }

    /// A provider-hosted tool such as `file_search` or `web_search_preview`.
    pub fn internal(kind: impl Into<String>) -> Self {
        Self::internal_with_options(kind, Map::new())
    }

    pub fn internal_with_options(kind: impl Into<String>, options: Map<String, Value>) -> Self {
        let kind = kind.into();
        Self {
            schema: ToolSchema::new(kind.clone(), format!("Provider-hosted tool {kind}")),
            kind: ToolKind::Internal { kind, options },
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.schema.description = description.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.schema.name
    }

    pub fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    pub fn is_internal(&self) -> bool {
        matches!(self.kind, ToolKind::Internal { .. })
    }

    pub fn declaration(&self) -> ToolDeclaration {
        match &self.kind {
            ToolKind::Local(_) => ToolDeclaration::Function(self.schema.clone()),
            ToolKind::Internal { kind, options } => {
                ToolDeclaration::internal_with_options(kind.clone(), options.clone())
            }
        }
    }
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.schema.name)
            .field("internal", &self.is_internal())
            .finish()
    }
}

/// Named tools available to the resolution loop.
///
/// Registration order is preserved and is the order tools are offered to
/// the model. Mutation takes `&mut self`; share a finished registry behind
/// an `Arc` for concurrent calls.
///
/// Calls to the provider-hosted kinds in [`INTERNAL_TOOL_KINDS`] are left to
/// the provider even when nothing is registered under that name.
#[derive(Clone, Debug)]
pub struct ToolRegistry {
    tools: Vec<Tool>,
    internal_kinds: Vec<String>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self {
            tools: Vec::new(),
            internal_kinds: INTERNAL_TOOL_KINDS.iter().map(|k| k.to_string()).collect(),
        }
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat calls named `kind` as provider-hosted.
    pub fn add_internal_kind(&mut self, kind: impl Into<String>) -> &mut Self {
        let kind = kind.into();
        if !self.internal_kinds.contains(&kind) {
            self.internal_kinds.push(kind);
        }
        self
    }

    pub fn internal_kinds(&self) -> &[String] {
        &self.internal_kinds
    }

    /// Register `tool` under `name`, which becomes the name the model sees.
    pub fn register(&mut self, name: impl Into<String>, mut tool: Tool) -> Result<&mut Self, Error> {
        let name = name.into();
        if self.has_tool(&name) {
            return Err(Error::DuplicateTool(name));
        }
        tool.schema.name = name;
        tool.schema.validate()?;
        debug!(tool = %tool.schema.name, internal = tool.is_internal(), "Registered tool");
        self.tools.push(tool);
        Ok(self)
    }

    /// Register under the tool's own name.
    pub fn register_tool(&mut self, tool: Tool) -> Result<&mut Self, Error> {
        let name = tool.name().to_string();
        self.register(name, tool)
    }

    pub fn unregister(&mut self, name: &str) -> Result<&mut Self, Error> {
        let index = self
            .tools
            .iter()
            .position(|t| t.name() == name)
            .ok_or_else(|| Error::UnknownTool(name.to_string()))?;
        self.tools.remove(index);
        debug!(tool = %name, "Unregistered tool");
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// A registration decides for its own name; otherwise the hosted kinds do.
    pub fn is_internal(&self, name: &str) -> bool {
        match self.get(name) {
            Some(tool) => tool.is_internal(),
            None => self.internal_kinds.iter().any(|k| k == name),
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(Tool::name).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        self.tools.iter().map(Tool::declaration).collect()
    }

    /// Declarations rendered for one provider format.
    pub fn schemas(&self, format: ToolFormat) -> Result<Vec<Value>, SchemaError> {
        format.render_all(&self.declarations())
    }

    /// Run a registered tool.
    ///
    /// Arguments are checked against the schema before the handler is
    /// invoked: they must form a JSON object holding every required
    /// parameter and nothing undeclared. Defaults fill absent parameters.
    pub async fn execute(&self, name: &str, arguments: Value) -> Result<ToolOutput, Error> {
        let tool = match self.get(name) {
            Some(tool) => tool,
            None if self.is_internal(name) => return Err(Error::InternalTool(name.to_string())),
            None => return Err(Error::UnknownTool(name.to_string())),
        };
        let handler = match &tool.kind {
            ToolKind::Local(handler) => handler,
            ToolKind::Internal { .. } => return Err(Error::InternalTool(name.to_string())),
        };

        let arguments = bind_arguments(&tool.schema, arguments)?;
        debug!(tool = %name, "Executing tool");

        handler.call(Value::Object(arguments)).await.map_err(|e| match e {
            Error::Argument { message, .. } => Error::Argument {
                tool: name.to_string(),
                message,
            },
            Error::ToolExecution { source, .. } => Error::ToolExecution {
                tool: name.to_string(),
                source,
            },
            other => Error::tool_execution(name, other),
        })
    }
}

fn bind_arguments(schema: &ToolSchema, arguments: Value) -> Result<Map<String, Value>, Error> {
    let mut arguments = match arguments {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            return Err(Error::argument(
                &schema.name,
                format!("arguments must be a JSON object, got {other}"),
            ))
        }
    };

    if let Some(unexpected) = arguments.keys().find(|k| schema.parameter(k).is_none()) {
        return Err(Error::argument(
            &schema.name,
            format!("unexpected argument '{unexpected}'"),
        ));
    }

    let present = |args: &Map<String, Value>, name: &str| args.get(name).is_some_and(|v| !v.is_null());
    if let Some(missing) = schema
        .required_parameters()
        .find(|p| !present(&arguments, &p.name))
    {
        return Err(Error::argument(
            &schema.name,
            format!("missing required argument '{}'", missing.name),
        ));
    }

    for param in &schema.parameters {
        if present(&arguments, &param.name) {
            continue;
        }
        if let Some(default) = &param.default {
            arguments.insert(param.name.clone(), default.clone());
        }
    }
    Ok(arguments)
}
