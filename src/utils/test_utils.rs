use crate::api::{
    ChatRequest, ChatResponse, ChatResponseChoice, ChatResponseDelta, ChatToolCallDelta,
    ChatToolCallFunctionDelta,
};
use crate::core::chat_stream::{ChatEventStream, LlmClient};
use crate::core::error::ChatError;
use crate::core::session::TurnState;
use crate::mcp::ToolSession;
use crate::ui::{Presenter, StreamingMessage};
use async_trait::async_trait;
use rust_mcp_schema::{CallToolResult, ListToolsResult};
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

pub fn text_event(text: &str) -> ChatResponse {
    ChatResponse {
        choices: vec![ChatResponseChoice {
            delta: ChatResponseDelta {
                content: Some(text.to_string()),
                tool_calls: None,
            },
        }],
    }
}

pub fn tool_call_event(
    index: u32,
    id: Option<&str>,
    name: Option<&str>,
    arguments: Option<&str>,
) -> ChatResponse {
    let function = (name.is_some() || arguments.is_some()).then(|| ChatToolCallFunctionDelta {
        name: name.map(str::to_string),
        arguments: arguments.map(str::to_string),
    });
    ChatResponse {
        choices: vec![ChatResponseChoice {
            delta: ChatResponseDelta {
                content: None,
                tool_calls: Some(vec![ChatToolCallDelta {
                    index: Some(index),
                    id: id.map(str::to_string),
                    kind: id.map(|_| "function".to_string()),
                    function,
                }]),
            },
        }],
    }
}

pub fn text_tool_result(text: &str) -> CallToolResult {
    serde_json::from_value(serde_json::json!({
        "content": [{"type": "text", "text": text}]
    }))
    .expect("tool result")
}

pub fn tool_listing(tools: Value) -> ListToolsResult {
    serde_json::from_value(serde_json::json!({ "tools": tools })).expect("tool listing")
}

#[derive(Debug, Clone)]
pub enum ScriptedEvent {
    Event(ChatResponse),
    Error(String),
}

impl ScriptedEvent {
    pub fn into_stream(events: Vec<ScriptedEvent>) -> ChatEventStream {
        let items: Vec<Result<ChatResponse, ChatError>> = events
            .into_iter()
            .map(|event| match event {
                ScriptedEvent::Event(response) => Ok(response),
                ScriptedEvent::Error(message) => Err(ChatError::LlmRequest(message)),
            })
            .collect();
        Box::pin(futures_util::stream::iter(items))
    }
}

/// One scripted reply: a stream of events, or a failure to open the stream.
pub type ScriptedReply = Result<Vec<ScriptedEvent>, String>;

pub fn text_reply(fragments: &[&str]) -> ScriptedReply {
    Ok(fragments
        .iter()
        .map(|fragment| ScriptedEvent::Event(text_event(fragment)))
        .collect())
}

/// Notes the session's turn state each time a double is called.
#[derive(Default)]
struct TurnStateLog {
    receiver: Mutex<Option<watch::Receiver<TurnState>>>,
    seen: Mutex<Vec<TurnState>>,
}

impl TurnStateLog {
    fn follow(&self, receiver: watch::Receiver<TurnState>) {
        *self.receiver.lock().expect("state receiver lock") = Some(receiver);
    }

    fn record(&self) {
        if let Some(receiver) = self.receiver.lock().expect("state receiver lock").as_ref() {
            let state = *receiver.borrow();
            self.seen.lock().expect("state log lock").push(state);
        }
    }

    fn seen(&self) -> Vec<TurnState> {
        self.seen.lock().expect("state log lock").clone()
    }
}

/// Replays scripted replies in order and records every request it receives.
#[derive(Default)]
pub struct ScriptedLlmClient {
    replies: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<ChatRequest>>,
    states: TurnStateLog,
}

impl ScriptedLlmClient {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    /// Record the session state at every request from now on.
    pub fn follow_state(&self, receiver: watch::Receiver<TurnState>) {
        self.states.follow(receiver);
    }

    pub fn states_at_requests(&self) -> Vec<TurnState> {
        self.states.seen()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn create(&self, request: ChatRequest) -> Result<ChatEventStream, ChatError> {
        self.states.record();
        self.requests.lock().expect("requests lock").push(request);
        let reply = self
            .replies
            .lock()
            .expect("replies lock")
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()));
        reply
            .map(ScriptedEvent::into_stream)
            .map_err(ChatError::LlmRequest)
    }
}

/// Tool session double that serves a fixed listing and queued call results.
pub struct RecordingToolSession {
    listing: Mutex<Result<ListToolsResult, String>>,
    results: Mutex<VecDeque<Result<CallToolResult, String>>>,
    calls: Mutex<Vec<(String, Map<String, Value>)>>,
    states: TurnStateLog,
}

impl Default for RecordingToolSession {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingToolSession {
    pub fn new() -> Self {
        Self::with_listing(Ok(tool_listing(serde_json::json!([]))))
    }

    pub fn with_listing(listing: Result<ListToolsResult, String>) -> Self {
        Self {
            listing: Mutex::new(listing),
            results: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            states: TurnStateLog::default(),
        }
    }

    pub fn push_result(&self, result: Result<CallToolResult, String>) {
        self.results.lock().expect("results lock").push_back(result);
    }

    pub fn calls(&self) -> Vec<(String, Map<String, Value>)> {
        self.calls.lock().expect("calls lock").clone()
    }

    /// Record the session state at every tool call from now on.
    pub fn follow_state(&self, receiver: watch::Receiver<TurnState>) {
        self.states.follow(receiver);
    }

    pub fn states_at_calls(&self) -> Vec<TurnState> {
        self.states.seen()
    }
}

#[async_trait]
impl ToolSession for RecordingToolSession {
    async fn list_tools(&self) -> Result<ListToolsResult, String> {
        self.listing.lock().expect("listing lock").clone()
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<CallToolResult, String> {
        self.states.record();
        self.calls
            .lock()
            .expect("calls lock")
            .push((name.to_string(), arguments));
        self.results
            .lock()
            .expect("results lock")
            .pop_front()
            .unwrap_or_else(|| Err("no scripted result".to_string()))
    }
}

#[derive(Debug, Default)]
struct PresenterLog {
    sent: Vec<String>,
    tokens: Vec<String>,
    set_contents: Vec<String>,
    final_contents: Vec<String>,
    opened: usize,
}

/// Presenter double; clones share one log.
#[derive(Debug, Default, Clone)]
pub struct RecordingPresenter {
    log: Arc<Mutex<PresenterLog>>,
}

impl RecordingPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<String> {
        self.log.lock().expect("presenter lock").sent.clone()
    }

    pub fn streamed_tokens(&self) -> Vec<String> {
        self.log.lock().expect("presenter lock").tokens.clone()
    }

    pub fn streamed_text(&self) -> String {
        self.streamed_tokens().concat()
    }

    pub fn set_contents(&self) -> Vec<String> {
        self.log.lock().expect("presenter lock").set_contents.clone()
    }

    /// Content of each message at the time `update()` finalized it.
    pub fn final_contents(&self) -> Vec<String> {
        self.log.lock().expect("presenter lock").final_contents.clone()
    }

    pub fn opened_messages(&self) -> usize {
        self.log.lock().expect("presenter lock").opened
    }
}

#[async_trait]
impl Presenter for RecordingPresenter {
    async fn send(&self, text: &str) {
        self.log
            .lock()
            .expect("presenter lock")
            .sent
            .push(text.to_string());
    }

    async fn open_streaming_message(&self) -> Box<dyn StreamingMessage> {
        self.log.lock().expect("presenter lock").opened += 1;
        Box::new(RecordingStreamingMessage {
            log: Arc::clone(&self.log),
            content: String::new(),
            streaming: true,
        })
    }
}

struct RecordingStreamingMessage {
    log: Arc<Mutex<PresenterLog>>,
    content: String,
    streaming: bool,
}

#[async_trait]
impl StreamingMessage for RecordingStreamingMessage {
    async fn stream_token(&mut self, token: &str) {
        self.content.push_str(token);
        self.log
            .lock()
            .expect("presenter lock")
            .tokens
            .push(token.to_string());
    }

    async fn set_content(&mut self, text: &str) {
        self.content = text.to_string();
        self.log
            .lock()
            .expect("presenter lock")
            .set_contents
            .push(text.to_string());
    }

    async fn update(&mut self) {
        self.streaming = false;
        self.log
            .lock()
            .expect("presenter lock")
            .final_contents
            .push(self.content.clone());
    }

    fn content(&self) -> &str {
        &self.content
    }

    fn is_streaming(&self) -> bool {
        self.streaming
    }
}
