//! Model request types and capability descriptions.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Message;

/// Description of an invocable capability, as advertised to a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilitySpec {
    pub name: String,
    pub description: String,
    /// JSON Schema for the call arguments.
    pub input_schema: Value,
}

/// A single chat completion request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelRequest {
    pub messages: Vec<Message>,
    /// Capabilities the model may ask to call. Empty disables tool calling.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<CapabilitySpec>,
    /// JSON Schema the reply content must satisfy, for structured output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
}

impl ModelRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn with_tools(mut self, tools: Vec<CapabilitySpec>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    /// Text of the first system message, if any.
    pub fn system_prompt(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == super::Role::System)
            .map(|m| m.content.as_str())
    }
}
