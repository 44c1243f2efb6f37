//! Streaming response accumulator.
//!
//! Reduces the incremental events of one LLM response into the full text and
//! the ordered list of tool calls it requested. Text fragments are forwarded
//! to the open streaming message as they arrive.

use crate::api::{ChatResponse, ChatToolCallDelta, TOOL_KIND_FUNCTION};
use crate::core::chat_stream::ChatEventStream;
use crate::core::error::ChatError;
use crate::core::message::ToolCallRequest;
use crate::ui::StreamingMessage;
use futures_util::StreamExt;
use tracing::{debug, warn};

/// How far past the last known call a delta's index may point. Indices
/// further out are malformed and dropped rather than gap-filled.
const MAX_TOOL_CALL_INDEX_GAP: usize = 64;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct PendingToolCall {
    id: Option<String>,
    kind: Option<String>,
    name: String,
    arguments: String,
}

impl PendingToolCall {
    fn finish(self, index: usize) -> ToolCallRequest {
        ToolCallRequest {
            id: self.id.unwrap_or_else(|| format!("tool-call-{index}")),
            kind: self.kind.unwrap_or_else(|| TOOL_KIND_FUNCTION.to_string()),
            namespaced_name: self.name,
            raw_arguments: self.arguments,
        }
    }
}

/// Everything one LLM response produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccumulatedResponse {
    pub text: String,
    pub tool_calls: Vec<ToolCallRequest>,
}

impl AccumulatedResponse {
    /// Calls that carry a function name; nameless entries are stream artifacts.
    pub fn named_tool_calls(&self) -> Vec<ToolCallRequest> {
        self.tool_calls
            .iter()
            .filter(|call| call.has_name())
            .cloned()
            .collect()
    }

    pub fn requests_tools(&self) -> bool {
        self.tool_calls.iter().any(ToolCallRequest::has_name)
    }
}

#[derive(Debug, Default)]
pub struct StreamAccumulator {
    text: String,
    calls: Vec<PendingToolCall>,
    collect_tool_calls: bool,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self {
            collect_tool_calls: true,
            ..Self::default()
        }
    }

    /// An accumulator that ignores tool-call deltas entirely.
    pub fn text_only() -> Self {
        Self::default()
    }

    /// Fold one stream event in, returning the text fragment to forward, if any.
    pub fn apply_event<'a>(&mut self, event: &'a ChatResponse) -> Option<&'a str> {
        let delta = event.first_delta()?;
        if self.collect_tool_calls {
            if let Some(tool_calls) = &delta.tool_calls {
                for tool_call in tool_calls {
                    self.apply_tool_call_delta(tool_call);
                }
            }
        }
        match delta.content.as_deref() {
            Some(fragment) if !fragment.is_empty() => {
                self.text.push_str(fragment);
                Some(fragment)
            }
            _ => None,
        }
    }

    pub fn apply_tool_call_delta(&mut self, delta: &ChatToolCallDelta) {
        // A delta without an index continues the most recent call.
        let index = delta
            .index
            .map(|index| index as usize)
            .unwrap_or_else(|| self.calls.len().saturating_sub(1));
        if index > self.calls.len().saturating_add(MAX_TOOL_CALL_INDEX_GAP) {
            warn!(
                index,
                known_calls = self.calls.len(),
                "Ignoring tool call delta with an out-of-range index"
            );
            return;
        }
        if index >= self.calls.len() {
            self.calls.resize_with(index + 1, PendingToolCall::default);
        }
        let entry = &mut self.calls[index];

        if entry.id.is_none() {
            entry.id = delta.id.clone().filter(|id| !id.is_empty());
        }
        if entry.kind.is_none() {
            entry.kind = delta.kind.clone().filter(|kind| !kind.is_empty());
        }
        if let Some(function) = &delta.function {
            if let Some(name) = &function.name {
                entry.name.push_str(name);
            }
            if let Some(arguments) = &function.arguments {
                entry.arguments.push_str(arguments);
            }
        }
    }

    pub fn finish(self) -> AccumulatedResponse {
        let tool_calls = self
            .calls
            .into_iter()
            .enumerate()
            .map(|(index, call)| call.finish(index))
            .collect();
        AccumulatedResponse {
            text: self.text,
            tool_calls,
        }
    }
}

/// Drive a response stream to exhaustion, streaming text into `message`.
pub async fn accumulate(
    mut stream: ChatEventStream,
    mut accumulator: StreamAccumulator,
    message: &mut dyn StreamingMessage,
) -> Result<AccumulatedResponse, ChatError> {
    while let Some(event) = stream.next().await {
        let event = event?;
        if let Some(fragment) = accumulator.apply_event(&event) {
            message.stream_token(fragment).await;
        }
    }
    let response = accumulator.finish();
    debug!(
        text_len = response.text.len(),
        tool_calls = response.tool_calls.len(),
        "LLM response accumulated"
    );
    Ok(response)
}
