//! Stdio MCP client.
//!
//! Spawns the configured server process and speaks newline-delimited
//! JSON-RPC over its stdin/stdout. Responses are matched to requests by id
//! through a pending map fed by a background reader task.

use super::protocol::{
    is_method_not_found, parse_call_tool, parse_initialize_result, parse_list_tools,
};
use super::ToolSession;
use crate::core::config::McpServerConfig;
use async_trait::async_trait;
use rust_mcp_schema::schema_utils::{
    ClientMessage, FromMessage, MessageFromClient, NotificationFromClient, RequestFromClient,
    ServerMessage,
};
use rust_mcp_schema::{
    CallToolRequestParams, CallToolResult, ClientCapabilities, Implementation,
    InitializeRequestParams, InitializeResult, ListToolsResult, PaginatedRequestParams, RequestId,
    LATEST_PROTOCOL_VERSION,
};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, Command};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};

const MCP_MAX_TOOL_LIST: usize = 100;
const STDIO_REQUEST_TIMEOUT_SECONDS: u64 = 60;
const STDIO_WRITE_TIMEOUT_SECONDS: u64 = 10;

type PendingMap = Arc<Mutex<HashMap<RequestId, oneshot::Sender<ServerMessage>>>>;

pub struct StdioToolSession {
    server_name: String,
    stdin: Mutex<ChildStdin>,
    pending: PendingMap,
    next_request_id: AtomicI64,
    server_details: Option<InitializeResult>,
}

impl StdioToolSession {
    /// Spawn the server and complete the `initialize` handshake.
    pub async fn connect(
        config: &McpServerConfig,
        connection_string: Option<&str>,
    ) -> Result<Self, String> {
        let (command, args) = config.command_line(connection_string);
        debug!(
            server = %config.name,
            command = %command,
            arg_count = args.len(),
            "Starting MCP stdio server"
        );

        let mut cmd = Command::new(&command);
        cmd.args(&args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);
        if let Some(env) = &config.env {
            cmd.envs(env);
        }

        let mut child = cmd
            .spawn()
            .map_err(|err| format!("Failed to spawn MCP server '{command}': {err}"))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| "Unable to retrieve stdin.".to_string())?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| "Unable to retrieve stdout.".to_string())?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| "Unable to retrieve stderr.".to_string())?;

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        spawn_stdout_reader(pending.clone(), stdout, config.name.clone());
        spawn_stderr_drain(stderr, config.name.clone());

        let reaper_pending = pending.clone();
        let server_name = config.name.clone();
        tokio::spawn(async move {
            let status = child.wait().await;
            debug!(server = %server_name, status = ?status, "MCP stdio server exited");
            // Dropping the senders wakes every waiter with a closed channel.
            reaper_pending.lock().await.clear();
        });

        let mut session = Self {
            server_name: config.name.clone(),
            stdin: Mutex::new(stdin),
            pending,
            next_request_id: AtomicI64::new(0),
            server_details: None,
        };
        let details = session.initialize().await?;
        session.server_details = Some(details);
        Ok(session)
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn server_details(&self) -> Option<&InitializeResult> {
        self.server_details.as_ref()
    }

    async fn initialize(&self) -> Result<InitializeResult, String> {
        let response = self
            .send_request(RequestFromClient::InitializeRequest(client_details()))
            .await?;
        let result = parse_initialize_result(response)?;
        debug!(
            server = %self.server_name,
            protocol_version = %result.protocol_version,
            "MCP server initialized"
        );
        self.send_notification(NotificationFromClient::InitializedNotification(None))
            .await?;
        Ok(result)
    }

    fn next_request_id(&self) -> RequestId {
        let id = self.next_request_id.fetch_add(1, Ordering::SeqCst);
        RequestId::Integer(id)
    }

    async fn write_line(&self, payload: &str) -> Result<(), String> {
        let write_timeout = tokio::time::Duration::from_secs(STDIO_WRITE_TIMEOUT_SECONDS);
        let mut stdin = self.stdin.lock().await;
        tokio::time::timeout(write_timeout, stdin.write_all(payload.as_bytes()))
            .await
            .map_err(|_| "Timed out writing MCP stdio message.".to_string())?
            .map_err(|err| err.to_string())?;
        tokio::time::timeout(write_timeout, stdin.write_all(b"\n"))
            .await
            .map_err(|_| "Timed out writing MCP stdio message newline.".to_string())?
            .map_err(|err| err.to_string())?;
        tokio::time::timeout(write_timeout, stdin.flush())
            .await
            .map_err(|_| "Timed out flushing MCP stdio message.".to_string())?
            .map_err(|err| err.to_string())
    }

    async fn send_request(&self, request: RequestFromClient) -> Result<ServerMessage, String> {
        let request_id = self.next_request_id();
        let message = ClientMessage::from_message(
            MessageFromClient::RequestFromClient(request),
            Some(request_id.clone()),
        )
        .map_err(|err| err.to_string())?;
        let payload = serde_json::to_string(&message).map_err(|err| err.to_string())?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(request_id.clone(), tx);

        debug!(
            server = %self.server_name,
            request_id = ?request_id,
            bytes = payload.len(),
            "Sending MCP stdio request"
        );
        if let Err(err) = self.write_line(&payload).await {
            self.pending.lock().await.remove(&request_id);
            return Err(err);
        }

        let timeout = tokio::time::Duration::from_secs(STDIO_REQUEST_TIMEOUT_SECONDS);
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(message)) => {
                debug!(
                    server = %self.server_name,
                    request_id = ?request_id,
                    "MCP stdio response received"
                );
                Ok(message)
            }
            Ok(Err(_)) => Err("MCP stdio response channel closed.".to_string()),
            Err(_) => {
                self.pending.lock().await.remove(&request_id);
                Err("MCP stdio request timed out.".to_string())
            }
        }
    }

    async fn send_notification(&self, notification: NotificationFromClient) -> Result<(), String> {
        let message = ClientMessage::from_message(
            MessageFromClient::NotificationFromClient(notification),
            None,
        )
        .map_err(|err| err.to_string())?;
        let payload = serde_json::to_string(&message).map_err(|err| err.to_string())?;
        debug!(server = %self.server_name, "Sending MCP stdio notification");
        self.write_line(&payload).await
    }

    async fn fetch_tools_page(&self, cursor: Option<String>) -> Result<ListToolsResult, String> {
        let params = cursor.map(|cursor| PaginatedRequestParams {
            cursor: Some(cursor),
            meta: None,
        });
        let response = self
            .send_request(RequestFromClient::ListToolsRequest(params))
            .await?;
        if is_method_not_found(&response) {
            debug!(server = %self.server_name, "MCP server does not support tools/list");
            return Ok(ListToolsResult {
                meta: None,
                next_cursor: None,
                tools: Vec::new(),
            });
        }
        parse_list_tools(response)
    }
}

#[async_trait]
impl ToolSession for StdioToolSession {
    async fn list_tools(&self) -> Result<ListToolsResult, String> {
        let mut list = self.fetch_tools_page(None).await?;
        let mut tools = std::mem::take(&mut list.tools);
        let mut next_cursor = list.next_cursor.take();

        while tools.len() < MCP_MAX_TOOL_LIST {
            let Some(cursor) = next_cursor.take() else {
                break;
            };
            let page = self.fetch_tools_page(Some(cursor)).await?;
            tools.extend(page.tools);
            next_cursor = page.next_cursor;
        }
        tools.truncate(MCP_MAX_TOOL_LIST);

        Ok(ListToolsResult {
            meta: list.meta,
            next_cursor,
            tools,
        })
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<CallToolResult, String> {
        let params = CallToolRequestParams::new(name).with_arguments(arguments);
        let response = self
            .send_request(RequestFromClient::CallToolRequest(params))
            .await?;
        parse_call_tool(response)
    }
}

fn client_details() -> InitializeRequestParams {
    InitializeRequestParams {
        capabilities: ClientCapabilities::default(),
        client_info: Implementation {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            title: Some("sqlmate MCP client".to_string()),
            description: None,
            icons: Vec::new(),
            website_url: None,
        },
        meta: None,
        protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
    }
}

fn spawn_stdout_reader(
    pending: PendingMap,
    stdout: tokio::process::ChildStdout,
    server_name: String,
) {
    tokio::spawn(async move {
        let mut reader = BufReader::new(stdout).lines();
        while let Ok(Some(line)) = reader.next_line().await {
            let value = match serde_json::from_str::<Value>(&line) {
                Ok(value) => value,
                Err(err) => {
                    debug!(
                        server = %server_name,
                        error = %err,
                        "Skipping non-JSON MCP stdout line"
                    );
                    continue;
                }
            };
            let items = match value {
                Value::Array(items) => items,
                single => vec![single],
            };
            for item in items {
                match serde_json::from_value::<ServerMessage>(item) {
                    Ok(message) => dispatch_message(&pending, message, &server_name).await,
                    Err(err) => {
                        warn!(server = %server_name, error = %err, "Unrecognized MCP message")
                    }
                }
            }
        }
        debug!(server = %server_name, "MCP stdout closed");
    });
}

fn spawn_stderr_drain(stderr: tokio::process::ChildStderr, server_name: String) {
    tokio::spawn(async move {
        let mut reader = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = reader.next_line().await {
            debug!(server = %server_name, "stderr: {line}");
        }
    });
}

async fn dispatch_message(pending: &PendingMap, message: ServerMessage, server_name: &str) {
    match &message {
        ServerMessage::Response(response) => {
            if let Some(tx) = pending.lock().await.remove(&response.id) {
                let _ = tx.send(message);
            }
        }
        ServerMessage::Error(error) => {
            debug!(
                server = %server_name,
                error_id = ?error.id,
                error_code = error.error.code,
                "Received MCP stdio error"
            );
            if let Some(id) = error.id.as_ref() {
                if let Some(tx) = pending.lock().await.remove(id) {
                    let _ = tx.send(message);
                }
            }
        }
        ServerMessage::Request(request) => {
            // Server-initiated requests (sampling, roots) are not supported.
            debug!(
                server = %server_name,
                method = %request.method(),
                "Ignoring MCP server request"
            );
        }
        ServerMessage::Notification(_) => {
            debug!(server = %server_name, "Received MCP stdio notification");
        }
    }
}
