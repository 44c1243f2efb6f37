//! Shared constants used across the application

/// The single tool provider this front-end routes tool calls to.
pub const POSTGRES_PROVIDER: &str = "postgres";

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant that can query a PostgreSQL database. When you need to query the database, use the tool provided by the 'postgres' MCP server. The SQL should be valid PostgreSQL.";

pub const GREETING: &str =
    "Hello! I can help you query your PostgreSQL database. What would you like to know?";

/// Substituted when a tool response carries no text content.
pub const NO_TEXT_SENTINEL: &str = "Tool execution failed or returned no text.";

/// Separator between a provider name and the tool name it namespaces.
pub const NAMESPACE_SEPARATOR: &str = "__";

pub const USING_TOOLS_NOTICE: &str = "\n\nUsing tool(s)...\n";

pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
