//! Chat completions wire format.

use conduit_core::{Message, Role, ToolCallRequest, ToolDescriptor};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ChatTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    pub stream: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ChatToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl From<&Message> for ChatMessage {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
            tool_calls: message.tool_calls.iter().map(ChatToolCall::from).collect(),
            tool_call_id: message.tool_call_id.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub function: ChatFunctionCall,
}

impl From<&ToolCallRequest> for ChatToolCall {
    fn from(call: &ToolCallRequest) -> Self {
        Self {
            id: call.call_id.clone(),
            kind: "function",
            function: ChatFunctionCall {
                name: call.tool_name.clone(),
                // The API expects arguments as an encoded JSON string.
                arguments: call.arguments.to_string(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatFunctionCall {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatTool {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub function: ChatFunction,
}

impl From<&ToolDescriptor> for ChatTool {
    fn from(tool: &ToolDescriptor) -> Self {
        Self {
            kind: "function",
            function: ChatFunction {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: tool.parameter_schema.to_json_schema(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatFunction {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// One streamed `chat.completion.chunk`.
#[derive(Debug, Deserialize)]
pub(crate) struct ChatChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChunkChoice {
    #[serde(default)]
    pub delta: ChunkDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ChunkDelta {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallDelta>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ToolCallDelta {
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FunctionDelta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

/// Tool call being assembled from deltas sharing one `index`.
#[derive(Debug, Default)]
pub(crate) struct PartialToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl PartialToolCall {
    pub fn apply(&mut self, delta: ToolCallDelta) {
        if let Some(id) = delta.id {
            self.id = id;
        }
        if let Some(function) = delta.function {
            if let Some(name) = function.name {
                self.name.push_str(&name);
            }
            if let Some(arguments) = function.arguments {
                self.arguments.push_str(&arguments);
            }
        }
    }

    /// Completes the call.
    ///
    /// Arguments that are not valid JSON are passed on as a string value, so
    /// that argument validation reports them instead of the transport.
    pub fn finish(self, fallback_id: usize) -> ToolCallRequest {
        let arguments = if self.arguments.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(&self.arguments).unwrap_or(Value::String(self.arguments))
        };

        let call_id = if self.id.is_empty() {
            format!("call_{fallback_id}")
        } else {
            self.id
        };

        ToolCallRequest::new(call_id, self.name, arguments)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn serializes_assistant_tool_calls() {
        let call = ToolCallRequest::new("call_1", "web_search", json!({"query": "rust"}));
        let message = Message::assistant_with_tools("", vec![call]);

        let value = serde_json::to_value(ChatMessage::from(&message)).unwrap();
        assert_eq!(value["role"], "assistant");
        assert_eq!(value["tool_calls"][0]["type"], "function");
        assert_eq!(value["tool_calls"][0]["function"]["arguments"], "{\"query\":\"rust\"}");
        assert!(value.get("tool_call_id").is_none());
    }

    #[test]
    fn assembles_tool_call_from_deltas() {
        let chunks = [
            json!({"index": 0, "id": "call_7", "function": {"name": "search_", "arguments": "{\"que"}}),
            json!({"index": 0, "function": {"name": "documents", "arguments": "ry\": \"q3\"}"}}),
        ];

        let mut partial = PartialToolCall::default();
        for chunk in chunks {
            partial.apply(serde_json::from_value(chunk).unwrap());
        }

        let call = partial.finish(0);
        assert_eq!(call.call_id, "call_7");
        assert_eq!(call.tool_name, "search_documents");
        assert_eq!(call.arguments, json!({"query": "q3"}));
    }

    #[test]
    fn keeps_unparseable_arguments_as_string() {
        let partial = PartialToolCall {
            id: String::new(),
            name: "generate_image".into(),
            arguments: "{broken".into(),
        };

        let call = partial.finish(3);
        assert_eq!(call.call_id, "call_3");
        assert_eq!(call.arguments, json!("{broken"));
    }

    #[test]
    fn tolerates_sparse_chunks() {
        let chunk: ChatChunk =
            serde_json::from_value(json!({"id": "x", "choices": [{"index": 0, "delta": {}}]})).unwrap();
        assert!(chunk.choices[0].delta.content.is_none());
        assert!(chunk.choices[0].finish_reason.is_none());
    }
}
