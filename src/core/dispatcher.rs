//! Tool dispatcher.
//!
//! Executes reconstructed tool calls against a provider's tool session one at
//! a time, in request order. Every failure is folded into the tool-result
//! message for its call, so the follow-up LLM request always happens.

use rust_mcp_schema::{CallToolResult, ContentBlock};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::core::catalog::decode_tool_name;
use crate::core::constants::NO_TEXT_SENTINEL;
use crate::core::error::ChatError;
use crate::core::message::{Message, ToolCallRequest};
use crate::mcp::ToolSession;
use crate::ui::StreamingMessage;

/// Parse accumulated arguments into the object the tool session expects.
/// Blank arguments are not valid JSON and are rejected like any other.
pub fn parse_tool_arguments(
    short_name: &str,
    raw_arguments: &str,
) -> Result<Map<String, Value>, ChatError> {
    let parse_error = |message: String| ChatError::ToolArgumentParse {
        tool: short_name.to_string(),
        arguments: raw_arguments.to_string(),
        message,
    };
    match serde_json::from_str::<Value>(raw_arguments) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(parse_error(format!(
            "expected a JSON object, found {}",
            json_kind(&other)
        ))),
        Err(err) => Err(parse_error(err.to_string())),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// First text content item of a tool response, or the no-text sentinel.
pub fn tool_output_text(result: &CallToolResult) -> String {
    result
        .content
        .iter()
        .find_map(|block| match block {
            ContentBlock::TextContent(text) => Some(text.text.clone()),
            _ => None,
        })
        .unwrap_or_else(|| NO_TEXT_SENTINEL.to_string())
}

pub struct ToolDispatcher<'a> {
    provider: &'a str,
    session: &'a dyn ToolSession,
}

impl<'a> ToolDispatcher<'a> {
    pub fn new(provider: &'a str, session: &'a dyn ToolSession) -> Self {
        Self { provider, session }
    }

    /// Run every named call and return one tool-result message per call, in order.
    pub async fn dispatch_all(
        &self,
        calls: &[ToolCallRequest],
        message: &mut dyn StreamingMessage,
    ) -> Vec<Message> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            if let Some(result) = self.dispatch(call, message).await {
                results.push(result);
            }
        }
        results
    }

    /// Execute one call. Returns `None` only for nameless stream artifacts.
    pub async fn dispatch(
        &self,
        call: &ToolCallRequest,
        message: &mut dyn StreamingMessage,
    ) -> Option<Message> {
        if !call.has_name() {
            debug!(tool_call_id = %call.id, "Skipping tool call without a function name");
            return None;
        }

        let Some(short_name) = decode_tool_name(self.provider, &call.namespaced_name) else {
            let err = ChatError::ToolNameFormat {
                name: call.namespaced_name.clone(),
                provider: self.provider.to_string(),
            };
            return Some(self.degrade(call, err, message).await);
        };

        let arguments = match parse_tool_arguments(&short_name, &call.raw_arguments) {
            Ok(arguments) => arguments,
            Err(err) => return Some(self.degrade(call, err, message).await),
        };

        let rendered_arguments = Value::Object(arguments.clone()).to_string();
        message
            .stream_token(&format!(
                "Calling MCP tool: `{}/{}` with args: `{}`\n",
                self.provider, short_name, rendered_arguments
            ))
            .await;
        debug!(
            provider = %self.provider,
            tool = %short_name,
            tool_call_id = %call.id,
            arguments = %rendered_arguments,
            "Calling tool"
        );

        match self.session.call_tool(&short_name, arguments).await {
            Ok(result) => {
                let text = tool_output_text(&result);
                message
                    .stream_token(&format!(
                        "Tool response for `{short_name}`: \n```json\n{text}\n```\n"
                    ))
                    .await;
                debug!(
                    provider = %self.provider,
                    tool = %short_name,
                    tool_call_id = %call.id,
                    output_len = text.len(),
                    "Tool call succeeded"
                );
                Some(Message::tool_result(call, text))
            }
            Err(error) => {
                let err = ChatError::ToolInvocation {
                    tool: short_name,
                    message: error,
                };
                Some(self.degrade(call, err, message).await)
            }
        }
    }

    async fn degrade(
        &self,
        call: &ToolCallRequest,
        err: ChatError,
        message: &mut dyn StreamingMessage,
    ) -> Message {
        warn!(
            provider = %self.provider,
            tool = %call.namespaced_name,
            tool_call_id = %call.id,
            error = %err,
            "Tool call failed"
        );
        message.stream_token(&format!("{err}\n")).await;
        Message::tool_result(call, err.tool_result_content())
    }
}
