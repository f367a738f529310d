//! Run request and result documents.

use crate::message::Message;
use agstream_util::Identifier;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool the agent may call, described by a JSON schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "empty_object")]
    pub parameters: Value,
}

impl Tool {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: empty_object(),
        }
    }

    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }
}

/// A piece of caller-supplied context forwarded to the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    pub description: String,
    pub value: String,
}

impl Context {
    pub fn new(description: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            value: value.into(),
        }
    }
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

/// Outbound request document for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunAgentInput {
    pub thread_id: String,
    pub run_id: String,
    #[serde(default)]
    pub state: Value,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub tools: Vec<Tool>,
    #[serde(default)]
    pub context: Vec<Context>,
    #[serde(default)]
    pub forwarded_props: Value,
}

impl RunAgentInput {
    pub fn new(thread_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            run_id: run_id.into(),
            state: empty_object(),
            messages: Vec::new(),
            tools: Vec::new(),
            context: Vec::new(),
            forwarded_props: empty_object(),
        }
    }

    /// Serialize to the camelCase wire document.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunAgentResult {
    pub thread_id: String,
    pub run_id: String,
    /// Payload of the last non-null `RUN_FINISHED` result.
    pub result: Value,
    /// Messages created during this run.
    pub new_messages: Vec<Message>,
    /// State document at the end of the run.
    pub new_state: Value,
}

/// Caller-facing parameters for starting a run.
///
/// Anything left unset is filled in from the agent's own session when the
/// request is built.
#[derive(Debug, Clone, Default)]
pub struct RunAgentParams {
    pub thread_id: Option<String>,
    pub run_id: Option<String>,
    pub tools: Vec<Tool>,
    pub context: Vec<Context>,
    pub forwarded_props: Option<Value>,
    pub state: Option<Value>,
    /// Messages appended to the session before the request is built.
    pub messages: Vec<Message>,
}

impl RunAgentParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn add_tool(mut self, tool: Tool) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn add_context(mut self, context: Context) -> Self {
        self.context.push(context);
        self
    }

    pub fn with_forwarded_props(mut self, props: Value) -> Self {
        self.forwarded_props = Some(props);
        self
    }

    pub fn with_state(mut self, state: Value) -> Self {
        self.state = Some(state);
        self
    }

    pub fn add_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    pub fn add_user_message(self, content: impl Into<String>) -> Self {
        self.add_message(Message::user(content))
    }

    /// Thread id to use, generating one if unset.
    pub fn thread_id_or_new(&self) -> String {
        self.thread_id.clone().unwrap_or_else(Identifier::thread)
    }

    /// Run id to use, generating one if unset.
    pub fn run_id_or_new(&self) -> String {
        self.run_id.clone().unwrap_or_else(Identifier::run)
    }
}
