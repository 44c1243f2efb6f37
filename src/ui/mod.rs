//! Presentation layer for chat sessions.
//!
//! The core talks to the user only through [`Presenter`] and the
//! [`StreamingMessage`] handles it opens. [`terminal`] renders both to
//! stdout for the interactive binary.
//!
//! Ownership boundary: this layer displays text, while [`crate::core`] decides
//! what text to display and when.

pub mod terminal;

use async_trait::async_trait;

pub use terminal::TerminalPresenter;

/// Sink for everything the assistant shows the user.
#[async_trait]
pub trait Presenter: Send + Sync {
    /// Show a standalone message.
    async fn send(&self, text: &str);

    /// Open a message that is filled incrementally while a turn runs.
    async fn open_streaming_message(&self) -> Box<dyn StreamingMessage>;
}

/// A message under construction.
///
/// Tokens append in order. `set_content` replaces what has been shown so far,
/// and `update` marks the message complete.
#[async_trait]
pub trait StreamingMessage: Send {
    async fn stream_token(&mut self, token: &str);

    async fn set_content(&mut self, text: &str);

    async fn update(&mut self);

    fn content(&self) -> &str;

    fn is_streaming(&self) -> bool;
}
