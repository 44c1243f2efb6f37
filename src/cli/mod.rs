//! Command-line interface parsing and the interactive chat loop.

use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{ArgAction, Parser};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::core::chat_stream::{LlmClient, OpenAiChatClient};
use crate::core::config::{Config, ConfigError, LlmSettings, ENV_POSTGRES_CONNECTION};
use crate::core::error::ChatError;
use crate::core::session::ChatSession;
use crate::mcp::client::StdioToolSession;
use crate::ui::{Presenter, TerminalPresenter};

/// Overrides the `-v` derived log filter when set.
pub const LOG_ENV: &str = "SQLMATE_LOG";

#[derive(Parser, Debug)]
#[command(name = "sqlmate")]
#[command(about = "Chat with your PostgreSQL database from the terminal")]
#[command(
    long_about = "sqlmate is a terminal chat assistant that answers questions about a PostgreSQL \
database. The LLM decides when to run SQL, and queries are executed through a Model Context \
Protocol server.\n\n\
Environment Variables:\n\
  AZURE_OPENAI_API_KEY, AZURE_OPENAI_ENDPOINT, AZURE_OPENAI_API_VERSION\n\
                                 Use an Azure OpenAI deployment when all three are set\n\
  AZURE_OPENAI_DEPLOYMENT_NAME   Azure deployment to use (defaults to gpt-4o)\n\
  OPENAI_API_KEY                 API key for OpenAI-compatible endpoints\n\
  OPENAI_BASE_URL                Custom API base URL (defaults to https://api.openai.com/v1)\n\
  POSTGRESQL_CONNECTION_STRING   Passed to the default MCP server command\n\
  SQLMATE_LOG                    Log filter directives (overrides -v)\n\n\
Variables may also be placed in a .env file in the working directory.\n\n\
Commands:\n\
  /quit, /exit      Leave the chat"
)]
pub struct Args {
    /// Model (or Azure deployment) to use for chat
    #[arg(short = 'm', long, value_name = "MODEL")]
    pub model: Option<String>,

    /// Path to config.toml (defaults to the platform config directory)
    #[arg(short = 'c', long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Do not start the MCP server; chat without database tools
    #[arg(long)]
    pub no_mcp: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long, action = ArgAction::Count)]
    pub verbose: u8,
}

pub fn main() -> Result<(), Box<dyn Error>> {
    tokio::runtime::Runtime::new()?.block_on(async_main())
}

fn default_log_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

fn init_logging(verbose: u8) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_log_level(verbose)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    match path.map(Path::to_path_buf).or_else(Config::default_path) {
        Some(path) => Config::load_from_path(&path),
        None => Ok(Config::default()),
    }
}

fn is_exit_command(line: &str) -> bool {
    matches!(line, "/quit" | "/exit")
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_logging(args.verbose);

    let config = load_config(args.config.as_deref())?;
    let settings = match LlmSettings::resolve(
        |key| std::env::var(key).ok(),
        &config,
        args.model.as_deref(),
    ) {
        Ok(settings) => settings,
        Err(err) => {
            let err = ChatError::Configuration(err.to_string());
            eprintln!("{}", err.user_message());
            std::process::exit(1);
        }
    };
    info!(model = %settings.model, "Starting sqlmate");

    let presenter: Arc<dyn Presenter> = Arc::new(TerminalPresenter::new());
    let llm: Arc<dyn LlmClient> = Arc::new(OpenAiChatClient::new(
        reqwest::Client::new(),
        &settings,
    ));
    let mut session = ChatSession::new(Some(llm), Arc::clone(&presenter), settings.model.clone());
    session.start().await;

    if !args.no_mcp && config.mcp.is_enabled() {
        let connection_string = std::env::var(ENV_POSTGRES_CONNECTION).ok();
        match StdioToolSession::connect(&config.mcp, connection_string.as_deref()).await {
            Ok(tool_session) => {
                if let Some(details) = tool_session.server_details() {
                    info!(
                        server = %tool_session.server_name(),
                        implementation = %details.server_info.name,
                        version = %details.server_info.version,
                        protocol_version = %details.protocol_version,
                        "MCP server ready"
                    );
                }
                session
                    .on_provider_connect(&config.mcp.name, Arc::new(tool_session))
                    .await;
            }
            Err(err) => {
                warn!(server = %config.mcp.name, error = %err, "MCP server connection failed");
                presenter
                    .send(&format!(
                        "Failed to connect to MCP server '{}': {err}",
                        config.mcp.name
                    ))
                    .await;
            }
        }
    }

    run_chat(&mut session).await?;
    Ok(())
}

/// Read user messages from stdin until EOF or an exit command.
async fn run_chat(session: &mut ChatSession) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if is_exit_command(line) {
            break;
        }
        session.handle_user_message(line).await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags() {
        let args = Args::try_parse_from([
            "sqlmate",
            "--model",
            "gpt-4.1",
            "--config",
            "/tmp/sqlmate.toml",
            "--no-mcp",
            "-vv",
        ])
        .expect("args");
        assert_eq!(args.model.as_deref(), Some("gpt-4.1"));
        assert_eq!(args.config, Some(PathBuf::from("/tmp/sqlmate.toml")));
        assert!(args.no_mcp);
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn defaults_are_quiet_with_mcp_enabled() {
        let args = Args::try_parse_from(["sqlmate"]).expect("args");
        assert!(args.model.is_none());
        assert!(!args.no_mcp);
        assert_eq!(args.verbose, 0);
    }

    #[test]
    fn verbosity_maps_to_log_level() {
        assert_eq!(default_log_level(0), "warn");
        assert_eq!(default_log_level(1), "info");
        assert_eq!(default_log_level(2), "debug");
        assert_eq!(default_log_level(7), "trace");
    }

    #[test]
    fn explicit_missing_config_path_is_default() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("absent.toml");
        let config = load_config(Some(path.as_path())).expect("config");
        assert!(config.model.is_none());
        assert!(config.mcp.is_enabled());
    }

    #[test]
    fn exit_commands() {
        assert!(is_exit_command("/quit"));
        assert!(is_exit_command("/exit"));
        assert!(!is_exit_command("quit"));
    }
}
