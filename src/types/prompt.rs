use super::message::{InputItem, Message};

/// A structured prompt containing a sequence of input items.
///
/// This is the `input` of a call: either a single user prompt or an ordered
/// conversation. Ordering is preserved verbatim when forwarded to providers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Prompt {
    items: Vec<InputItem>,
}

impl Prompt {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            items: vec![InputItem::system(content)],
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            items: vec![InputItem::user(content)],
        }
    }

    pub fn with_system(mut self, content: impl Into<String>) -> Self {
        self.items.push(InputItem::system(content));
        self
    }

    pub fn with_developer(mut self, content: impl Into<String>) -> Self {
        self.items.push(InputItem::developer(content));
        self
    }

    pub fn with_user(mut self, content: impl Into<String>) -> Self {
        self.items.push(InputItem::user(content));
        self
    }

    pub fn with_assistant(mut self, content: impl Into<String>) -> Self {
        self.items.push(InputItem::assistant(content));
        self
    }

    pub fn with_item(mut self, item: InputItem) -> Self {
        self.items.push(item);
        self
    }

    pub fn with_items(mut self, items: Vec<InputItem>) -> Self {
        self.items.extend(items);
        self
    }

    /// Add a response to the conversation, preserving the ordering of text
    /// and function calls.
    pub fn with_response(mut self, response: &crate::response::CompleteResponse) -> Self {
        self.items.extend(response.to_items());
        self
    }

    pub fn items(&self) -> &[InputItem] {
        &self.items
    }

    pub fn into_items(self) -> Vec<InputItem> {
        self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl From<&str> for Prompt {
    fn from(s: &str) -> Self {
        Prompt::user(s)
    }
}

impl From<String> for Prompt {
    fn from(s: String) -> Self {
        Prompt::user(s)
    }
}

impl From<InputItem> for Prompt {
    fn from(item: InputItem) -> Self {
        Prompt { items: vec![item] }
    }
}

impl From<Vec<InputItem>> for Prompt {
    fn from(items: Vec<InputItem>) -> Self {
        Prompt { items }
    }
}

impl From<Vec<Message>> for Prompt {
    fn from(messages: Vec<Message>) -> Self {
        Prompt {
            items: messages.into_iter().map(InputItem::Message).collect(),
        }
    }
}

impl From<&[Message]> for Prompt {
    fn from(messages: &[Message]) -> Self {
        messages.to_vec().into()
    }
}
