use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{stream, Stream, StreamExt};
use memchr::memchr;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::api::{ChatRequest, ChatResponse};
use crate::core::config::{LlmEndpoint, LlmSettings};
use crate::core::error::ChatError;
use crate::utils::url::construct_api_url;

/// Incremental events of one streamed completion.
pub type ChatEventStream = Pin<Box<dyn Stream<Item = Result<ChatResponse, ChatError>> + Send>>;

/// Anything that can open a streamed chat completion.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn create(&self, request: ChatRequest) -> Result<ChatEventStream, ChatError>;
}

#[derive(Debug)]
enum SseLine {
    Event(ChatResponse),
    Done,
    Error(String),
    Skip,
}

fn extract_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

fn parse_data_payload(payload: &str) -> SseLine {
    if payload == "[DONE]" {
        return SseLine::Done;
    }
    if payload.trim().is_empty() {
        return SseLine::Skip;
    }

    match serde_json::from_str::<Value>(payload) {
        Ok(value) if value.get("error").is_some() => SseLine::Error(format_api_error(payload)),
        Ok(value) => match serde_json::from_value::<ChatResponse>(value) {
            Ok(response) => SseLine::Event(response),
            Err(_) => SseLine::Error(format_api_error(payload)),
        },
        Err(_) => SseLine::Error(format_api_error(payload)),
    }
}

fn process_sse_line(line: &str) -> SseLine {
    extract_data_payload(line)
        .map(parse_data_payload)
        .unwrap_or(SseLine::Skip)
}

/// One-line description of an OpenAI or Azure error body. Azure and OpenAI
/// both nest it under `error`; `error.code` is appended when present.
fn error_summary(body: &Value) -> Option<String> {
    let error = body.get("error");
    let message = match error {
        Some(Value::String(text)) => Some(text.as_str()),
        Some(Value::Object(fields)) => fields.get("message").and_then(Value::as_str),
        _ => None,
    }
    .or_else(|| body.get("message").and_then(Value::as_str))?;

    let message = message.split_whitespace().collect::<Vec<_>>().join(" ");
    if message.is_empty() {
        return None;
    }
    let code = error
        .and_then(|error| error.get("code"))
        .and_then(Value::as_str)
        .filter(|code| !code.is_empty());
    Some(match code {
        Some(code) => format!("{message} ({code})"),
        None => message,
    })
}

fn fenced(language: &str, body: &str) -> String {
    format!("```{language}\n{body}\n```")
}

/// Render an error body for the transcript: a summary line when one can be
/// found, then the body in a fenced block.
fn format_api_error(error_text: &str) -> String {
    let body = error_text.trim();
    let (summary, block) = match serde_json::from_str::<Value>(body) {
        Ok(value) => {
            let pretty = serde_json::to_string_pretty(&value).unwrap_or_else(|_| body.to_string());
            (error_summary(&value), fenced("json", &pretty))
        }
        Err(_) if body.is_empty() => (None, fenced("", "<empty>")),
        Err(_) if body.starts_with('<') && body.ends_with('>') => (None, fenced("xml", body)),
        Err(_) => (None, fenced("", body)),
    };

    match summary {
        Some(summary) => format!("API Error: {summary}\n{block}"),
        None => format!("API Error:\n{block}"),
    }
}

/// Streaming client for OpenAI-compatible `chat/completions` endpoints,
/// including Azure OpenAI deployments.
#[derive(Clone)]
pub struct OpenAiChatClient {
    client: reqwest::Client,
    endpoint: LlmEndpoint,
}

impl OpenAiChatClient {
    pub fn new(client: reqwest::Client, settings: &LlmSettings) -> Self {
        Self {
            client,
            endpoint: settings.endpoint.clone(),
        }
    }

    fn completions_url(&self, model: &str) -> String {
        match &self.endpoint {
            LlmEndpoint::OpenAi { base_url, .. } => construct_api_url(base_url, "chat/completions"),
            LlmEndpoint::Azure {
                endpoint,
                api_version,
                ..
            } => format!(
                "{}?api-version={}",
                construct_api_url(
                    endpoint,
                    &format!("openai/deployments/{model}/chat/completions")
                ),
                api_version
            ),
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.endpoint {
            LlmEndpoint::OpenAi { api_key, .. } => {
                request.header("Authorization", format!("Bearer {api_key}"))
            }
            LlmEndpoint::Azure { api_key, .. } => request.header("api-key", api_key),
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiChatClient {
    async fn create(&self, request: ChatRequest) -> Result<ChatEventStream, ChatError> {
        let url = self.completions_url(&request.model);
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.as_ref().map_or(0, Vec::len),
            "Sending chat completion request"
        );

        let http_request = self
            .client
            .post(url)
            .header("Content-Type", "application/json");
        let response = self
            .authorize(http_request)
            .json(&request)
            .send()
            .await
            .map_err(|err| ChatError::LlmRequest(format_api_error(&err.to_string())))?;

        if !response.status().is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            return Err(ChatError::LlmRequest(format_api_error(&error_text)));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(pump_sse_body(response, tx));

        let events = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Ok(Box::pin(events))
    }
}

/// Split the response body into SSE lines and forward parsed events until
/// `[DONE]`, an error, body exhaustion, or the receiver going away.
async fn pump_sse_body(
    response: reqwest::Response,
    tx: mpsc::UnboundedSender<Result<ChatResponse, ChatError>>,
) {
    let mut body = response.bytes_stream();
    let mut buffer: Vec<u8> = Vec::new();

    while let Some(chunk) = body.next().await {
        let chunk_bytes = match chunk {
            Ok(bytes) => bytes,
            Err(err) => {
                let _ = tx.send(Err(ChatError::LlmRequest(err.to_string())));
                return;
            }
        };
        buffer.extend_from_slice(&chunk_bytes);

        while let Some(newline_pos) = memchr(b'\n', &buffer) {
            let parsed = match std::str::from_utf8(&buffer[..newline_pos]) {
                Ok(line) => process_sse_line(line.trim()),
                Err(err) => {
                    warn!(error = %err, "Invalid UTF-8 in stream");
                    SseLine::Skip
                }
            };
            buffer.drain(..=newline_pos);

            match parsed {
                SseLine::Event(event) => {
                    if tx.send(Ok(event)).is_err() {
                        return;
                    }
                }
                SseLine::Done => {
                    debug!("Chat completion stream finished");
                    return;
                }
                SseLine::Error(message) => {
                    let _ = tx.send(Err(ChatError::LlmRequest(message)));
                    return;
                }
                SseLine::Skip => {}
            }
        }
    }

    if let Ok(line) = std::str::from_utf8(&buffer) {
        match process_sse_line(line.trim()) {
            SseLine::Event(event) => {
                let _ = tx.send(Ok(event));
            }
            SseLine::Error(message) => {
                let _ = tx.send(Err(ChatError::LlmRequest(message)));
            }
            SseLine::Done | SseLine::Skip => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(endpoint: LlmEndpoint) -> OpenAiChatClient {
        OpenAiChatClient::new(
            reqwest::Client::new(),
            &LlmSettings {
                endpoint,
                model: "gpt-4o".to_string(),
            },
        )
    }

    #[test]
    fn process_sse_line_handles_spacing_variants() {
        let variants = [
            (
                r#"data: {"choices":[{"delta":{"content":"Hello"}}]}"#,
                "Hello",
                "data: [DONE]",
            ),
            (
                r#"data:{"choices":[{"delta":{"content":"World"}}]}"#,
                "World",
                "data:[DONE]",
            ),
        ];

        for (chunk_line, expected_chunk, done_line) in variants {
            match process_sse_line(chunk_line) {
                SseLine::Event(event) => assert_eq!(
                    event.first_delta().and_then(|d| d.content.as_deref()),
                    Some(expected_chunk)
                ),
                other => panic!("expected event, got {:?}", other),
            }
            assert!(matches!(process_sse_line(done_line), SseLine::Done));
        }
    }

    #[test]
    fn process_sse_line_skips_comments_and_blank_lines() {
        assert!(matches!(process_sse_line(""), SseLine::Skip));
        assert!(matches!(process_sse_line(": keep-alive"), SseLine::Skip));
        assert!(matches!(process_sse_line("event: message"), SseLine::Skip));
        assert!(matches!(process_sse_line("data: "), SseLine::Skip));
    }

    #[test]
    fn process_sse_line_routes_stream_errors() {
        let error_line = r#"data: {"error":{"message":"internal server error"}}"#;

        match process_sse_line(error_line) {
            SseLine::Error(text) => {
                let expected = r#"API Error: internal server error
```json
{
  "error": {
    "message": "internal server error"
  }
}
```"#;
                assert_eq!(text, expected);
            }
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[test]
    fn process_sse_line_reports_malformed_payloads() {
        assert!(matches!(
            process_sse_line("data: {not json"),
            SseLine::Error(_)
        ));
    }

    fn first_line(text: &str) -> &str {
        text.lines().next().unwrap_or_default()
    }

    #[test]
    fn azure_deployment_errors_carry_the_error_code() {
        let raw = r#"{"error":{"code":"DeploymentNotFound","message":"The API deployment for this resource does not exist."}}"#;
        let formatted = format_api_error(raw);

        assert_eq!(
            first_line(&formatted),
            "API Error: The API deployment for this resource does not exist. (DeploymentNotFound)"
        );
        assert!(formatted.contains("```json\n{\n  \"error\": {\n"));
        assert!(formatted.ends_with("}\n```"));
    }

    #[test]
    fn openai_auth_errors_are_summarized() {
        let raw = r#"{"error":{"message":"Incorrect API key provided: sk-test.","type":"invalid_request_error","param":null,"code":"invalid_api_key"}}"#;
        assert_eq!(
            first_line(&format_api_error(raw)),
            "API Error: Incorrect API key provided: sk-test. (invalid_api_key)"
        );
    }

    #[test]
    fn multiline_error_strings_are_collapsed() {
        let raw = "{\"error\": \"Rate limit reached for gpt-4o,\\n   retry in 20s\"}";
        assert_eq!(
            first_line(&format_api_error(raw)),
            "API Error: Rate limit reached for gpt-4o, retry in 20s"
        );
    }

    #[test]
    fn json_bodies_without_a_message_are_shown_whole() {
        let raw = r#"{"statusCode":429}"#;
        let expected = "API Error:\n```json\n{\n  \"statusCode\": 429\n}\n```";
        assert_eq!(format_api_error(raw), expected);
    }

    #[test]
    fn gateway_and_plaintext_bodies_are_fenced() {
        assert_eq!(
            format_api_error("<html><body>502 Bad Gateway</body></html>"),
            "API Error:\n```xml\n<html><body>502 Bad Gateway</body></html>\n```"
        );
        assert_eq!(
            format_api_error("upstream connect error\n"),
            "API Error:\n```\nupstream connect error\n```"
        );
        assert_eq!(format_api_error("  "), "API Error:\n```\n<empty>\n```");
    }

    #[test]
    fn openai_url_appends_chat_completions() {
        let client = client(LlmEndpoint::OpenAi {
            base_url: "https://api.openai.com/v1/".to_string(),
            api_key: "sk-test".to_string(),
        });
        assert_eq!(
            client.completions_url("gpt-4o"),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn azure_url_targets_deployment_with_api_version() {
        let client = client(LlmEndpoint::Azure {
            endpoint: "https://example.openai.azure.com/".to_string(),
            api_key: "key".to_string(),
            api_version: "2024-06-01".to_string(),
        });
        assert_eq!(
            client.completions_url("my-deployment"),
            "https://example.openai.azure.com/openai/deployments/my-deployment/chat/completions?api-version=2024-06-01"
        );
    }

    #[test]
    fn auth_header_matches_endpoint_flavour() {
        let openai = client(LlmEndpoint::OpenAi {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: "sk-test".to_string(),
        });
        let request = openai
            .authorize(reqwest::Client::new().post("https://api.openai.com/v1/chat/completions"))
            .build()
            .expect("request");
        assert_eq!(
            request.headers().get("Authorization").and_then(|v| v.to_str().ok()),
            Some("Bearer sk-test")
        );

        let azure = client(LlmEndpoint::Azure {
            endpoint: "https://example.openai.azure.com".to_string(),
            api_key: "azure-key".to_string(),
            api_version: "2024-06-01".to_string(),
        });
        let request = azure
            .authorize(reqwest::Client::new().post("https://example.openai.azure.com/"))
            .build()
            .expect("request");
        assert_eq!(
            request.headers().get("api-key").and_then(|v| v.to_str().ok()),
            Some("azure-key")
        );
        assert!(request.headers().get("Authorization").is_none());
    }
}
