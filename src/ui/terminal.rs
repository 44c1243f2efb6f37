use async_trait::async_trait;
use tokio::io::{AsyncWriteExt, Stdout};
use tracing::warn;

use super::{Presenter, StreamingMessage};

async fn write_out(stdout: &mut Stdout, text: &str) {
    let result = async {
        stdout.write_all(text.as_bytes()).await?;
        stdout.flush().await
    }
    .await;
    if let Err(err) = result {
        warn!(error = %err, "Failed to write to stdout");
    }
}

/// Line-oriented presenter that prints to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPresenter;

impl TerminalPresenter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Presenter for TerminalPresenter {
    async fn send(&self, text: &str) {
        let mut stdout = tokio::io::stdout();
        write_out(&mut stdout, &format!("{text}\n\n")).await;
    }

    async fn open_streaming_message(&self) -> Box<dyn StreamingMessage> {
        Box::new(TerminalStreamingMessage::new())
    }
}

pub struct TerminalStreamingMessage {
    stdout: Stdout,
    content: String,
    streaming: bool,
}

impl TerminalStreamingMessage {
    fn new() -> Self {
        Self {
            stdout: tokio::io::stdout(),
            content: String::new(),
            streaming: true,
        }
    }
}

/// Text that must still be printed for the screen to show `replacement`.
///
/// The terminal cannot erase what was streamed, so a replacement that is
/// already the tail of the shown text prints nothing.
fn replacement_suffix<'a>(shown: &str, replacement: &'a str) -> Option<&'a str> {
    if replacement.is_empty() || shown.ends_with(replacement) {
        None
    } else {
        Some(replacement)
    }
}

#[async_trait]
impl StreamingMessage for TerminalStreamingMessage {
    async fn stream_token(&mut self, token: &str) {
        self.content.push_str(token);
        write_out(&mut self.stdout, token).await;
    }

    async fn set_content(&mut self, text: &str) {
        if let Some(pending) = replacement_suffix(&self.content, text) {
            write_out(&mut self.stdout, &format!("\n{pending}")).await;
        }
        self.content = text.to_string();
    }

    async fn update(&mut self) {
        if self.streaming {
            self.streaming = false;
            write_out(&mut self.stdout, "\n\n").await;
        }
    }

    fn content(&self) -> &str {
        &self.content
    }

    fn is_streaming(&self) -> bool {
        self.streaming
    }
}
