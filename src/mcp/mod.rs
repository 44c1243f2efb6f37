//! Model Context Protocol integration.
//!
//! The chat core only needs two operations from a connected tool server,
//! captured by [`ToolSession`]. [`client::StdioToolSession`] implements it
//! over a spawned server process.

pub mod client;
pub mod protocol;

use async_trait::async_trait;
use rust_mcp_schema::{CallToolResult, ListToolsResult};
use serde_json::{Map, Value};

/// A live connection to one tool provider.
///
/// Implementations are not required to support concurrent calls; callers
/// issue one request at a time.
#[async_trait]
pub trait ToolSession: Send + Sync {
    async fn list_tools(&self) -> Result<ListToolsResult, String>;

    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<CallToolResult, String>;
}
