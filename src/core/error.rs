//! Error taxonomy for a chat session.
//!
//! Tool-side failures never abort a turn; they are rendered into tool-result
//! messages. Only LLM request failures and a missing tool session end a turn
//! early, and configuration failures stop the session entirely.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// Missing credentials or capability. Fatal to the session.
    Configuration(String),
    /// A namespaced tool name did not carry the expected provider prefix.
    ToolNameFormat { name: String, provider: String },
    /// Accumulated tool arguments were not a JSON object.
    ToolArgumentParse {
        tool: String,
        arguments: String,
        message: String,
    },
    /// The tool session failed while executing a call.
    ToolInvocation { tool: String, message: String },
    /// Either LLM round-trip failed.
    LlmRequest(String),
    /// Tool calls were requested but no session is registered for the provider.
    MissingToolSession { provider: String },
}

impl ChatError {
    /// Text recorded as tool-result content for recoverable tool failures.
    ///
    /// Argument errors carry a shorter message for the model than the one
    /// streamed to the user.
    pub fn tool_result_content(&self) -> String {
        match self {
            ChatError::ToolArgumentParse {
                tool, arguments, ..
            } => {
                format!("Error: Invalid JSON arguments for tool {tool}. Arguments: {arguments}")
            }
            other => other.to_string(),
        }
    }

    /// Text shown to the user when this error ends a turn.
    pub fn user_message(&self) -> String {
        match self {
            ChatError::LlmRequest(message) => format!("An error occurred: {message}"),
            ChatError::Configuration(message) => format!("Critical Error: {message}"),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatError::Configuration(message) => write!(f, "{message}"),
            ChatError::ToolNameFormat { name, provider } => write!(
                f,
                "Error: Tool name '{name}' not in expected format for server '{provider}'."
            ),
            ChatError::ToolArgumentParse {
                tool,
                arguments,
                message,
            } => write!(
                f,
                "Error: Could not parse arguments for tool {tool}: {arguments}. JSON Error: {message}"
            ),
            ChatError::ToolInvocation { tool, message } => {
                write!(f, "Error calling MCP tool {tool}: {message}")
            }
            ChatError::LlmRequest(message) => write!(f, "{message}"),
            ChatError::MissingToolSession { provider } => write!(
                f,
                "Error: Could not find active MCP session for '{provider}'."
            ),
        }
    }
}

impl std::error::Error for ChatError {}
