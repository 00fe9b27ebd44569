mod chunk;
mod content;

pub(crate) use chunk::parse_tool_args;
pub use chunk::{AiMessageChunk, ToolCallChunk};
pub use content::{ContentBlock, MediaSource, MessageContent};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::usage::UsageMetadata;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }

    /// Message class label used when listing a history.
    pub fn label(&self) -> &'static str {
        match self {
            Self::System => "SystemMessage",
            Self::User => "HumanMessage",
            Self::Assistant => "AIMessage",
            Self::Tool => "ToolMessage",
        }
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl ToolCall {
    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.args.get(key).and_then(Value::as_str)
    }

    pub fn args_json(&self) -> String {
        Value::Object(self.args.clone()).to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Local-only payload attached to tool results; never sent to the model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<Value>,
}

impl Message {
    fn new(role: Role, content: impl Into<MessageContent>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
            id: None,
            tool_calls: Vec::new(),
            tool_call_id: None,
            artifact: None,
        }
    }

    pub fn system(content: impl Into<MessageContent>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<MessageContent>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<MessageContent>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn tool(content: impl Into<MessageContent>, tool_call_id: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::new(Role::Tool, content)
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_artifact(mut self, artifact: Value) -> Self {
        self.artifact = Some(artifact);
        self
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    pub fn text(&self) -> String {
        self.content.text()
    }
}

/// A complete model reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AiMessage {
    pub id: Option<String>,
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<UsageMetadata>,
    pub finish_reason: Option<String>,
    pub model: Option<String>,
}

impl AiMessage {
    pub fn text(&self) -> &str {
        &self.content
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

impl From<AiMessage> for Message {
    fn from(value: AiMessage) -> Self {
        let mut message = Message::assistant(value.content).with_tool_calls(value.tool_calls);
        message.id = value.id;
        message
    }
}

/// Anything the chat model accepts as input.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInput {
    pub messages: Vec<Message>,
}

impl From<&str> for ModelInput {
    fn from(value: &str) -> Self {
        Self {
            messages: vec![Message::user(value)],
        }
    }
}

impl From<String> for ModelInput {
    fn from(value: String) -> Self {
        Self {
            messages: vec![Message::user(value)],
        }
    }
}

impl From<Message> for ModelInput {
    fn from(value: Message) -> Self {
        Self {
            messages: vec![value],
        }
    }
}

impl From<Vec<Message>> for ModelInput {
    fn from(messages: Vec<Message>) -> Self {
        Self { messages }
    }
}

impl From<&[Message]> for ModelInput {
    fn from(messages: &[Message]) -> Self {
        Self {
            messages: messages.to_vec(),
        }
    }
}
