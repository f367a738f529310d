//! Conversation messages and tool calls.

use crate::fields;
use agstream_util::Identifier;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Call-kind tag carried by every tool call the protocol produces.
pub const FUNCTION_CALL_TYPE: &str = "function";

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Assistant,
    System,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Tool => "tool",
        }
    }

    /// Parse a role from its wire name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            "system" => Some(Role::System),
            "tool" => Some(Role::Tool),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Function invoked by a tool call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// Arguments as accumulated from the stream; usually JSON text.
    #[serde(default)]
    pub arguments: String,
}

/// A tool call requested by an assistant message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "default_call_type")]
    pub call_type: String,
    pub function: FunctionCall,
}

fn default_call_type() -> String {
    FUNCTION_CALL_TYPE.to_string()
}

impl ToolCall {
    /// Create a function call with empty arguments.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            call_type: default_call_type(),
            function: FunctionCall {
                name: name.into(),
                arguments: String::new(),
            },
        }
    }

    /// Decode leniently: missing fields default to empty.
    pub fn from_value(doc: &Value) -> Self {
        let function = doc.get("function").unwrap_or(&Value::Null);
        Self {
            id: fields::string(doc, &["id"]),
            call_type: fields::opt_string(doc, &["type"]).unwrap_or_else(default_call_type),
            function: FunctionCall {
                name: fields::string(function, &["name"]),
                arguments: fields::string(function, &["arguments"]),
            },
        }
    }
}

/// A single conversation message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Originating tool call (tool role only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn new(id: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            content: content.into(),
            name: None,
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// Create a user message with a fresh id.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Identifier::message(), Role::User, content)
    }

    /// Create an assistant message with a fresh id.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Identifier::message(), Role::Assistant, content)
    }

    /// Create a system message with a fresh id.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Identifier::message(), Role::System, content)
    }

    /// Create a tool result message answering `tool_call_id`.
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut message = Self::new(Identifier::message(), Role::Tool, content);
        message.tool_call_id = Some(tool_call_id.into());
        message
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn find_tool_call(&self, id: &str) -> Option<&ToolCall> {
        self.tool_calls.iter().find(|tc| tc.id == id)
    }

    pub fn find_tool_call_mut(&mut self, id: &str) -> Option<&mut ToolCall> {
        self.tool_calls.iter_mut().find(|tc| tc.id == id)
    }

    /// Decode leniently, as found in `MESSAGES_SNAPSHOT` payloads.
    ///
    /// Unknown roles become `user`; a missing id is generated.
    pub fn from_value(doc: &Value) -> Self {
        let role = fields::opt_string(doc, &["role"])
            .and_then(|r| Role::parse(&r))
            .unwrap_or_default();
        let id = fields::opt_string(doc, &["id"])
            .filter(|id| !id.is_empty())
            .unwrap_or_else(Identifier::message);

        Self {
            id,
            role,
            content: fields::string(doc, &["content"]),
            name: fields::opt_string(doc, &["name"]).filter(|n| !n.is_empty()),
            tool_calls: fields::array(doc, &["toolCalls", "tool_calls"])
                .iter()
                .map(ToolCall::from_value)
                .collect(),
            tool_call_id: fields::opt_string(doc, &["toolCallId", "tool_call_id"])
                .filter(|id| !id.is_empty()),
        }
    }

    /// Encode to the camelCase wire form.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::parse("assistant"), Some(Role::Assistant));
        assert_eq!(Role::parse("Assistant"), None);
        assert_eq!(Role::Tool.to_string(), "tool");
    }

    #[test]
    fn test_message_wire_shape() {
        let mut message = Message::new("m1", Role::Assistant, "hi");
        message.tool_calls.push(ToolCall::new("tc1", "search"));

        let value = message.to_value();
        assert_eq!(value["id"], "m1");
        assert_eq!(value["role"], "assistant");
        assert_eq!(value["toolCalls"][0]["type"], "function");
        assert_eq!(value["toolCalls"][0]["function"]["name"], "search");
        assert!(value.get("toolCallId").is_none());
    }

    #[test]
    fn test_tool_message_carries_call_id() {
        let message = Message::tool("tc1", "42");
        assert_eq!(message.role, Role::Tool);
        assert_eq!(message.tool_call_id.as_deref(), Some("tc1"));
        assert!(message.id.starts_with("msg_"));
    }

    #[test]
    fn test_from_value_lenient() {
        let message = Message::from_value(&json!({
            "id": "m2",
            "role": "wizard",
            "content": 7,
            "tool_calls": [{"id": "tc", "function": {"name": "f"}}]
        }));

        assert_eq!(message.id, "m2");
        assert_eq!(message.role, Role::User);
        assert_eq!(message.content, "");
        assert_eq!(message.tool_calls[0].call_type, "function");
        assert_eq!(message.tool_calls[0].function.arguments, "");
    }

    #[test]
    fn test_from_value_generates_missing_id() {
        let message = Message::from_value(&json!({"role": "system", "content": "be brief"}));
        assert!(message.id.starts_with("msg_"));
        assert_eq!(message.role, Role::System);
    }

    #[test]
    fn test_serde_roundtrip() {
        let message = Message::new("m3", Role::User, "hello").with_name("ada");
        let text = serde_json::to_string(&message).unwrap();
        let back: Message = serde_json::from_str(&text).unwrap();
        assert_eq!(back, message);
    }
}
