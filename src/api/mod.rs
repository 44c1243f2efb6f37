use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const TOOL_KIND_FUNCTION: &str = "function";
pub const TOOL_CHOICE_AUTO: &str = "auto";

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ChatToolCall>>,
}

#[derive(Serialize, Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ChatToolDefinition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
}

impl ChatRequest {
    /// Build a streaming request. An empty tool list is sent as no tools at all,
    /// which also drops `tool_choice`.
    pub fn streaming(
        model: impl Into<String>,
        messages: Vec<ChatMessage>,
        tools: Vec<ChatToolDefinition>,
    ) -> Self {
        let tools = (!tools.is_empty()).then_some(tools);
        let tool_choice = tools.as_ref().map(|_| TOOL_CHOICE_AUTO.to_string());
        Self {
            model: model.into(),
            messages,
            stream: true,
            tools,
            tool_choice,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ChatResponseDelta {
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ChatToolCallDelta>>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ChatResponseChoice {
    #[serde(default)]
    pub delta: ChatResponseDelta,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatResponseChoice>,
}

impl ChatResponse {
    pub fn first_delta(&self) -> Option<&ChatResponseDelta> {
        self.choices.first().map(|choice| &choice.delta)
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ChatToolCallFunctionDelta {
    pub name: Option<String>,
    pub arguments: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ChatToolCallDelta {
    pub index: Option<u32>,
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub function: Option<ChatToolCallFunctionDelta>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ChatToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub function: ChatToolCallFunction,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ChatToolCallFunction {
    pub name: String,
    pub arguments: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ChatToolDefinition {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: ChatToolFunction,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ChatToolFunction {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn streaming_request_omits_empty_tool_list() {
        let request = ChatRequest::streaming("gpt-4o", Vec::new(), Vec::new());
        let value = serde_json::to_value(&request).expect("serialize");
        assert_eq!(value["stream"], true);
        assert!(value.get("tools").is_none());
        assert!(value.get("tool_choice").is_none());
    }

    #[test]
    fn streaming_request_sets_auto_tool_choice_with_tools() {
        let tool = ChatToolDefinition {
            kind: TOOL_KIND_FUNCTION.to_string(),
            function: ChatToolFunction {
                name: "postgres__query".to_string(),
                description: String::new(),
                parameters: serde_json::json!({"type": "object", "properties": {}}),
            },
        };
        let request = ChatRequest::streaming("gpt-4o", Vec::new(), vec![tool]);
        let value = serde_json::to_value(&request).expect("serialize");
        assert_eq!(value["tool_choice"], "auto");
        assert_eq!(value["tools"][0]["type"], "function");
        assert_eq!(value["tools"][0]["function"]["name"], "postgres__query");
    }

    #[test]
    fn stream_chunk_parses_tool_call_deltas() {
        let payload = r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","type":"function","function":{"name":"postgres__query","arguments":"{\"sql\""}}]}}]}"#;
        let response: ChatResponse = serde_json::from_str(payload).expect("parse");
        let delta = response.first_delta().expect("delta");
        assert!(delta.content.is_none());
        let calls = delta.tool_calls.as_ref().expect("tool calls");
        assert_eq!(calls[0].index, Some(0));
        assert_eq!(calls[0].id.as_deref(), Some("call_1"));
        assert_eq!(
            calls[0].function.as_ref().and_then(|f| f.arguments.as_deref()),
            Some("{\"sql\"")
        );
    }

    #[test]
    fn stream_chunk_without_choices_parses() {
        let response: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).expect("parse");
        assert!(response.first_delta().is_none());
    }
}
