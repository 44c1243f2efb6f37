//! Conversation orchestrator.
//!
//! A [`ChatSession`] owns one conversation: its history, its tool catalog and
//! the tool session registered for the database provider. Each user message
//! runs as one turn to completion before the next is accepted, which the
//! `&mut self` receivers enforce.
//!
//! A turn makes one LLM request, or two when the first response asks for
//! tools. Tool failures are folded into tool results; only an LLM failure or
//! a missing tool session ends a turn early.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::{ChatMessage, ChatRequest, ChatToolDefinition};
use crate::core::accumulator::{accumulate, AccumulatedResponse, StreamAccumulator};
use crate::core::catalog::ToolCatalog;
use crate::core::chat_stream::LlmClient;
use crate::core::constants::{GREETING, POSTGRES_PROVIDER, SYSTEM_PROMPT, USING_TOOLS_NOTICE};
use crate::core::dispatcher::ToolDispatcher;
use crate::core::error::ChatError;
use crate::core::message::Message;
use crate::mcp::ToolSession;
use crate::ui::{Presenter, StreamingMessage};

const LLM_NOT_CONFIGURED: &str = "LLM client not configured. Please check environment variables.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    AwaitingFirstResponse,
    ToolPhase,
    AwaitingFinalResponse,
}

pub struct ChatSession {
    llm: Option<Arc<dyn LlmClient>>,
    presenter: Arc<dyn Presenter>,
    model: String,
    history: Vec<Message>,
    catalog: ToolCatalog,
    tool_session: Option<Arc<dyn ToolSession>>,
    state: watch::Sender<TurnState>,
    config_error_reported: bool,
}

impl ChatSession {
    /// `llm` is `None` when credentials could not be resolved. The
    /// configuration error is reported once and no turn runs.
    pub fn new(
        llm: Option<Arc<dyn LlmClient>>,
        presenter: Arc<dyn Presenter>,
        model: impl Into<String>,
    ) -> Self {
        let (state, _) = watch::channel(TurnState::Idle);
        Self {
            llm,
            presenter,
            model: model.into(),
            history: Vec::new(),
            catalog: ToolCatalog::new(),
            tool_session: None,
            state,
            config_error_reported: false,
        }
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn state(&self) -> TurnState {
        *self.state.borrow()
    }

    /// Receiver that follows every turn state transition.
    pub fn watch_state(&self) -> watch::Receiver<TurnState> {
        self.state.subscribe()
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    /// Greet the user and reset the conversation.
    pub async fn start(&mut self) {
        if self.llm.is_none() {
            self.report_missing_llm().await;
        }
        self.presenter.send(GREETING).await;
        self.history.clear();
        self.catalog = ToolCatalog::new();
        self.state.send_replace(TurnState::Idle);
        debug!("Chat session initialized");
    }

    /// Register a connected tool provider and load its tool catalog.
    ///
    /// Only the database provider is routed to; other providers are reported
    /// and ignored. Replacing the catalog between turns is the only supported
    /// reconnect.
    pub async fn on_provider_connect(&mut self, provider: &str, session: Arc<dyn ToolSession>) {
        if provider != POSTGRES_PROVIDER {
            warn!(provider = %provider, "Ignoring connection from unsupported tool provider");
            self.presenter
                .send(&format!(
                    "Error fetching/processing tools from MCP server '{provider}': only the '{POSTGRES_PROVIDER}' server is supported."
                ))
                .await;
            return;
        }

        info!(provider = %provider, "Tool provider connected");
        self.presenter
            .send(&format!("Connected to MCP server: '{provider}'."))
            .await;
        self.tool_session = Some(Arc::clone(&session));

        match session.list_tools().await {
            Ok(listing) if !listing.tools.is_empty() => {
                let names: Vec<&str> =
                    listing.tools.iter().map(|tool| tool.name.as_str()).collect();
                self.presenter
                    .send(&format!("Tools found for '{provider}': {names:?}"))
                    .await;
                self.catalog.replace_from_listing(provider, &listing);
            }
            Ok(_) => {
                self.presenter
                    .send(&format!(
                        "No tools returned by list_tools() for '{provider}'."
                    ))
                    .await;
                self.catalog.clear_provider(provider);
            }
            Err(err) => {
                warn!(provider = %provider, error = %err, "Listing tools failed");
                self.presenter
                    .send(&format!("Error calling list_tools for '{provider}': {err}"))
                    .await;
                self.catalog.clear_provider(provider);
            }
        }
    }

    /// Run one full turn for a user message. Always ends in [`TurnState::Idle`].
    pub async fn handle_user_message(&mut self, text: &str) {
        let Some(llm) = self.llm.clone() else {
            if self.config_error_reported {
                debug!("Skipping turn without an LLM client");
            } else {
                self.report_missing_llm().await;
            }
            return;
        };

        self.history.push(Message::user(text));
        let mut message = self.presenter.open_streaming_message().await;

        match self.run_turn(llm.as_ref(), message.as_mut()).await {
            Ok(final_text) => {
                if !final_text.is_empty() && message.content() != final_text {
                    message.set_content(&final_text).await;
                }
                message.update().await;
                if !final_text.is_empty() {
                    self.history.push(Message::assistant_text(final_text));
                }
            }
            Err(err @ ChatError::MissingToolSession { .. }) => {
                warn!(error = %err, "Ending turn early");
                let text = err.user_message();
                message.stream_token(&format!("{text}\n")).await;
                message.update().await;
                self.presenter.send(&text).await;
            }
            Err(err) => {
                warn!(error = %err, "Turn failed");
                let text = err.user_message();
                if message.is_streaming() {
                    message.set_content(&text).await;
                    message.update().await;
                } else {
                    self.presenter.send(&text).await;
                }
            }
        }

        self.transition(TurnState::Idle);
    }

    async fn run_turn(
        &mut self,
        llm: &dyn LlmClient,
        message: &mut dyn StreamingMessage,
    ) -> Result<String, ChatError> {
        // Snapshot the catalog so the request reflects one consistent tool set.
        let tools = self.catalog.tools_for(POSTGRES_PROVIDER).to_vec();

        self.transition(TurnState::AwaitingFirstResponse);
        let first = self
            .request(llm, tools, StreamAccumulator::new(), message)
            .await?;
        if !first.requests_tools() {
            return Ok(first.text);
        }

        message.stream_token(USING_TOOLS_NOTICE).await;
        let session = self
            .tool_session
            .clone()
            .ok_or_else(|| ChatError::MissingToolSession {
                provider: POSTGRES_PROVIDER.to_string(),
            })?;

        let calls = first.named_tool_calls();
        for call in &calls {
            debug!(
                tool_call_id = %call.id,
                tool = %call.namespaced_name,
                arguments = %call.raw_arguments,
                "Reconstructed tool call"
            );
        }
        self.history
            .push(Message::assistant_tool_calls(&first.text, calls.clone()));

        self.transition(TurnState::ToolPhase);
        let results = ToolDispatcher::new(POSTGRES_PROVIDER, session.as_ref())
            .dispatch_all(&calls, message)
            .await;
        self.history.extend(results);

        self.transition(TurnState::AwaitingFinalResponse);
        let second = self
            .request(llm, Vec::new(), StreamAccumulator::text_only(), message)
            .await?;
        Ok(second.text)
    }

    async fn request(
        &self,
        llm: &dyn LlmClient,
        tools: Vec<ChatToolDefinition>,
        accumulator: StreamAccumulator,
        message: &mut dyn StreamingMessage,
    ) -> Result<AccumulatedResponse, ChatError> {
        let request = ChatRequest::streaming(&self.model, self.api_messages(), tools);
        let stream = llm.create(request).await?;
        accumulate(stream, accumulator, message).await
    }

    fn api_messages(&self) -> Vec<ChatMessage> {
        std::iter::once(Message::system(SYSTEM_PROMPT))
            .chain(self.history.iter().cloned())
            .map(|message| message.to_api())
            .collect()
    }

    async fn report_missing_llm(&mut self) {
        let err = ChatError::Configuration(LLM_NOT_CONFIGURED.to_string());
        warn!(error = %err, "Chat session has no LLM client");
        self.presenter.send(&err.user_message()).await;
        self.config_error_reported = true;
    }

    fn transition(&mut self, next: TurnState) {
        let previous = self.state.send_replace(next);
        debug!(from = ?previous, to = ?next, "Turn state transition");
    }
}
