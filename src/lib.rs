//! sqlmate is a terminal chat assistant that answers questions about a
//! PostgreSQL database by letting an LLM call tools on a Model Context
//! Protocol server.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the conversation: history, the tool catalog, stream
//!   accumulation, tool dispatch and the two-request turn.
//! - [`mcp`] defines the tool session seam and a stdio JSON-RPC client for it.
//! - [`ui`] defines how the core presents text and renders it to the terminal.
//! - [`api`] defines the OpenAI-compatible chat payloads.
//!
//! The binary (`src/main.rs`) routes through [`crate::cli::main`], which loads
//! configuration, connects the MCP server and runs the interactive loop.

pub mod api;
pub mod cli;
pub mod core;
pub mod mcp;
pub mod ui;
pub mod utils;
