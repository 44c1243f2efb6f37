//! Configuration loading.
//!
//! Credentials come from the environment (optionally seeded from a `.env`
//! file); everything else may be set in `config.toml` under the platform
//! config directory.

use crate::core::constants::{DEFAULT_MODEL, DEFAULT_OPENAI_BASE_URL, POSTGRES_PROVIDER};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_AZURE_API_KEY: &str = "AZURE_OPENAI_API_KEY";
pub const ENV_AZURE_ENDPOINT: &str = "AZURE_OPENAI_ENDPOINT";
pub const ENV_AZURE_API_VERSION: &str = "AZURE_OPENAI_API_VERSION";
pub const ENV_AZURE_DEPLOYMENT: &str = "AZURE_OPENAI_DEPLOYMENT_NAME";
pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_OPENAI_BASE_URL: &str = "OPENAI_BASE_URL";
pub const ENV_POSTGRES_CONNECTION: &str = "POSTGRESQL_CONNECTION_STRING";

const DEFAULT_MCP_COMMAND: &str = "npx";
const DEFAULT_MCP_ARGS: [&str; 2] = ["-y", "@modelcontextprotocol/server-postgres"];

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to parse the configuration file as valid TOML.
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    /// No usable LLM credentials were found.
    MissingCredentials(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "Failed to read config at {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "Failed to parse config at {}: {}", path.display(), source)
            }
            ConfigError::MissingCredentials(message) => write!(f, "{message}"),
        }
    }
}

impl StdError for ConfigError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::MissingCredentials(_) => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct McpServerConfig {
    #[serde(default = "default_mcp_name")]
    pub name: String,
    pub command: Option<String>,
    pub args: Option<Vec<String>>,
    pub env: Option<HashMap<String, String>>,
    pub enabled: Option<bool>,
}

fn default_mcp_name() -> String {
    POSTGRES_PROVIDER.to_string()
}

impl Default for McpServerConfig {
    fn default() -> Self {
        Self {
            name: default_mcp_name(),
            command: None,
            args: None,
            env: None,
            enabled: None,
        }
    }
}

impl McpServerConfig {
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    /// Command and arguments used to launch the server. Without an explicit
    /// command the reference Postgres server is started via `npx`, with the
    /// connection string appended when one is known.
    pub fn command_line(&self, connection_string: Option<&str>) -> (String, Vec<String>) {
        match &self.command {
            Some(command) => (command.clone(), self.args.clone().unwrap_or_default()),
            None => {
                let mut args: Vec<String> = self
                    .args
                    .clone()
                    .unwrap_or_else(|| DEFAULT_MCP_ARGS.iter().map(|a| a.to_string()).collect());
                if let Some(connection) = connection_string.filter(|c| !c.trim().is_empty()) {
                    args.push(connection.to_string());
                }
                (DEFAULT_MCP_COMMAND.to_string(), args)
            }
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct Config {
    /// Model (or Azure deployment) used when no `--model` is given
    pub model: Option<String>,
    #[serde(default)]
    pub mcp: McpServerConfig,
}

impl Config {
    pub fn load_from_path(config_path: &Path) -> Result<Config, ConfigError> {
        if !config_path.exists() {
            return Ok(Config::default());
        }
        let contents = fs::read_to_string(config_path).map_err(|source| ConfigError::Read {
            path: config_path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: config_path.to_path_buf(),
            source,
        })
    }

    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "sqlmate", "sqlmate")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmEndpoint {
    OpenAi {
        base_url: String,
        api_key: String,
    },
    Azure {
        endpoint: String,
        api_key: String,
        api_version: String,
    },
}

/// Process-wide, read-only LLM settings shared by every chat session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmSettings {
    pub endpoint: LlmEndpoint,
    pub model: String,
}

impl LlmSettings {
    /// Resolve settings from an environment lookup. Azure wins when all of
    /// its variables are present; otherwise an OpenAI key is required.
    pub fn resolve<F>(
        lookup: F,
        config: &Config,
        model_override: Option<&str>,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let azure = (
            get(ENV_AZURE_API_KEY),
            get(ENV_AZURE_ENDPOINT),
            get(ENV_AZURE_API_VERSION),
        );
        if let (Some(api_key), Some(endpoint), Some(api_version)) = azure {
            let model = model_override
                .map(str::to_string)
                .or_else(|| get(ENV_AZURE_DEPLOYMENT))
                .or_else(|| config.model.clone())
                .unwrap_or_else(|| DEFAULT_MODEL.to_string());
            return Ok(Self {
                endpoint: LlmEndpoint::Azure {
                    endpoint,
                    api_key,
                    api_version,
                },
                model,
            });
        }

        let api_key = get(ENV_OPENAI_API_KEY).ok_or_else(|| {
            ConfigError::MissingCredentials(format!(
                "LLM client not configured. Set {ENV_AZURE_API_KEY}, {ENV_AZURE_ENDPOINT} and \
{ENV_AZURE_API_VERSION}, or {ENV_OPENAI_API_KEY}."
            ))
        })?;
        let base_url =
            get(ENV_OPENAI_BASE_URL).unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string());
        let model = model_override
            .map(str::to_string)
            .or_else(|| config.model.clone())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        Ok(Self {
            endpoint: LlmEndpoint::OpenAi { base_url, api_key },
            model,
        })
    }
}
