use serde::{Deserialize, Serialize};

/// An item in a conversation: a message, a tool call the model made, or the
/// output of such a call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InputItem {
    /// A message with role and content
    Message(Message),
    /// A function call requested by the model
    FunctionCall(FunctionCall),
    /// Output from a function call
    FunctionCallOutput {
        call_id: String,
        output: String,
        #[serde(default)]
        is_error: bool,
    },
}

/// A message with role and content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl InputItem {
    pub fn system(content: impl Into<String>) -> Self {
        InputItem::Message(Message::system(content))
    }

    pub fn developer(content: impl Into<String>) -> Self {
        InputItem::Message(Message::developer(content))
    }

    pub fn user(content: impl Into<String>) -> Self {
        InputItem::Message(Message::user(content))
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        InputItem::Message(Message::assistant(content))
    }

    pub fn function_call(call: FunctionCall) -> Self {
        InputItem::FunctionCall(call)
    }

    /// Create a successful function call output item.
    pub fn function_call_output(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        InputItem::FunctionCallOutput {
            call_id: call_id.into(),
            output: output.into(),
            is_error: false,
        }
    }

    /// Get the role of this item (if it's a message).
    pub fn role(&self) -> Option<Role> {
        match self {
            InputItem::Message(msg) => Some(msg.role),
            _ => None,
        }
    }

    /// Get the text content of this item (if any).
    pub fn content(&self) -> Option<String> {
        match self {
            InputItem::Message(msg) => msg.content(),
            InputItem::FunctionCallOutput { output, .. } => Some(output.clone()),
            InputItem::FunctionCall(_) => None,
        }
    }

    pub fn get_function_call(&self) -> Option<&FunctionCall> {
        match self {
            InputItem::FunctionCall(call) => Some(call),
            _ => None,
        }
    }

    /// Get the call ID this item answers (if it's a function call output).
    pub fn function_call_id(&self) -> Option<&str> {
        match self {
            InputItem::FunctionCallOutput { call_id, .. } => Some(call_id),
            _ => None,
        }
    }
}

impl From<Message> for InputItem {
    fn from(message: Message) -> Self {
        InputItem::Message(message)
    }
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Message {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn developer(content: impl Into<String>) -> Self {
        Self::new(Role::Developer, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Get the text content of this message, `None` when empty.
    pub fn content(&self) -> Option<String> {
        if self.content.is_empty() {
            None
        } else {
            Some(self.content.clone())
        }
    }
}

/// Role of a message participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Developer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Developer => "developer",
        }
    }

    /// System and developer messages both carry instructions.
    pub fn is_instruction(&self) -> bool {
        matches!(self, Role::System | Role::Developer)
    }
}

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Provider item ID (Responses API `fc_...`); equals `call_id` elsewhere.
    pub id: String,
    /// Correlation token that the matching output must echo.
    pub call_id: String,
    pub name: String,
    pub arguments: String, // JSON string
}

impl FunctionCall {
    /// Parse the raw argument text. Empty text means "no arguments".
    pub fn parsed_arguments(&self) -> Result<serde_json::Value, serde_json::Error> {
        if self.arguments.trim().is_empty() {
            return Ok(serde_json::Value::Object(serde_json::Map::new()));
        }
        serde_json::from_str(&self.arguments)
    }
}

/// Reason why generation finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
}

/// A file citation attached to generated text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub file_id: String,
    pub filename: String,
    #[serde(default)]
    pub index: u32,
}
