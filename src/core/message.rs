use crate::api::{ChatMessage, ChatToolCall, ChatToolCallFunction, TOOL_KIND_FUNCTION};

pub const ROLE_SYSTEM: &str = "system";
pub const ROLE_USER: &str = "user";
pub const ROLE_ASSISTANT: &str = "assistant";
pub const ROLE_TOOL: &str = "tool";

/// A tool call reconstructed from stream fragments. Immutable once the stream ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallRequest {
    pub id: String,
    pub kind: String,
    pub namespaced_name: String,
    /// Concatenated argument fragments; only valid JSON once fully accumulated.
    pub raw_arguments: String,
}

impl ToolCallRequest {
    pub fn new(
        id: impl Into<String>,
        namespaced_name: impl Into<String>,
        raw_arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: TOOL_KIND_FUNCTION.to_string(),
            namespaced_name: namespaced_name.into(),
            raw_arguments: raw_arguments.into(),
        }
    }

    pub fn has_name(&self) -> bool {
        !self.namespaced_name.is_empty()
    }

    fn to_api(&self) -> ChatToolCall {
        ChatToolCall {
            id: self.id.clone(),
            kind: self.kind.clone(),
            function: ChatToolCallFunction {
                name: self.namespaced_name.clone(),
                arguments: self.raw_arguments.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    System {
        text: String,
    },
    User {
        text: String,
    },
    Assistant {
        text: Option<String>,
        tool_calls: Option<Vec<ToolCallRequest>>,
    },
    Tool {
        tool_call_id: String,
        tool_name: String,
        result_text: String,
    },
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Message::System { text: text.into() }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Message::User { text: text.into() }
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Message::Assistant {
            text: Some(text.into()),
            tool_calls: None,
        }
    }

    /// Assistant turn that requested tools. Empty text is dropped rather than sent as "".
    pub fn assistant_tool_calls(text: &str, tool_calls: Vec<ToolCallRequest>) -> Self {
        Message::Assistant {
            text: (!text.is_empty()).then(|| text.to_string()),
            tool_calls: Some(tool_calls),
        }
    }

    pub fn tool_result(call: &ToolCallRequest, result_text: impl Into<String>) -> Self {
        Message::Tool {
            tool_call_id: call.id.clone(),
            tool_name: call.namespaced_name.clone(),
            result_text: result_text.into(),
        }
    }

    pub fn role(&self) -> &'static str {
        match self {
            Message::System { .. } => ROLE_SYSTEM,
            Message::User { .. } => ROLE_USER,
            Message::Assistant { .. } => ROLE_ASSISTANT,
            Message::Tool { .. } => ROLE_TOOL,
        }
    }

    pub fn tool_calls(&self) -> &[ToolCallRequest] {
        match self {
            Message::Assistant {
                tool_calls: Some(calls),
                ..
            } => calls,
            _ => &[],
        }
    }

    pub fn to_api(&self) -> ChatMessage {
        let role = self.role().to_string();
        match self {
            Message::System { text } | Message::User { text } => ChatMessage {
                role,
                content: Some(text.clone()),
                name: None,
                tool_call_id: None,
                tool_calls: None,
            },
            Message::Assistant { text, tool_calls } => ChatMessage {
                role,
                content: text.clone(),
                name: None,
                tool_call_id: None,
                tool_calls: tool_calls
                    .as_ref()
                    .map(|calls| calls.iter().map(ToolCallRequest::to_api).collect()),
            },
            Message::Tool {
                tool_call_id,
                tool_name,
                result_text,
            } => ChatMessage {
                role,
                content: Some(result_text.clone()),
                name: Some(tool_name.clone()),
                tool_call_id: Some(tool_call_id.clone()),
                tool_calls: None,
            },
        }
    }
}

/// Checks that every tool message answers a call from the nearest preceding
/// assistant message, which is what the LLM backend enforces.
pub fn tool_results_are_attributed(history: &[Message]) -> bool {
    let mut open_calls: Vec<&str> = Vec::new();
    for message in history {
        match message {
            Message::Assistant { .. } => {
                open_calls = message
                    .tool_calls()
                    .iter()
                    .map(|call| call.id.as_str())
                    .collect();
            }
            Message::Tool { tool_call_id, .. } => {
                if !open_calls.contains(&tool_call_id.as_str()) {
                    return false;
                }
            }
            _ => open_calls.clear(),
        }
    }
    true
}
