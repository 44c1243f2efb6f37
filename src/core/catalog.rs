//! Tool catalog adapter.
//!
//! Converts the tool list a provider advertises into function-calling
//! definitions, and owns the namespacing codec that keeps tool names from
//! different providers apart.
//!
//! A namespaced name is `<provider>__<short name>` with every `/` in the short
//! name written as `__`. Decoding strips the provider prefix and turns every
//! remaining `__` back into `/`, so a short name that itself contains `__`
//! does not survive the round trip.

use crate::api::{ChatToolDefinition, ChatToolFunction, TOOL_KIND_FUNCTION};
use crate::core::constants::NAMESPACE_SEPARATOR;
use rust_mcp_schema::{ListToolsResult, Tool};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

/// A tool as advertised by its provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub provider: String,
    pub short_name: String,
    pub description: Option<String>,
    pub input_schema: Option<Value>,
}

impl ToolSpec {
    pub fn from_mcp(provider: &str, tool: &Tool) -> Self {
        let input_schema = serde_json::to_value(&tool.input_schema)
            .ok()
            .filter(Value::is_object);
        Self {
            provider: provider.to_string(),
            short_name: tool.name.clone(),
            description: tool.description.clone(),
            input_schema,
        }
    }

    pub fn namespaced_name(&self) -> String {
        encode_tool_name(&self.provider, &self.short_name)
    }

    pub fn to_definition(&self) -> ChatToolDefinition {
        ChatToolDefinition {
            kind: TOOL_KIND_FUNCTION.to_string(),
            function: ChatToolFunction {
                name: self.namespaced_name(),
                description: self.description.clone().unwrap_or_default(),
                parameters: self
                    .input_schema
                    .clone()
                    .unwrap_or_else(empty_object_schema),
            },
        }
    }
}

fn empty_object_schema() -> Value {
    serde_json::json!({"type": "object", "properties": {}})
}

fn provider_prefix(provider: &str) -> String {
    format!("{provider}{NAMESPACE_SEPARATOR}")
}

pub fn encode_tool_name(provider: &str, short_name: &str) -> String {
    format!(
        "{}{}",
        provider_prefix(provider),
        short_name.replace('/', NAMESPACE_SEPARATOR)
    )
}

/// Recover the provider-local tool name, or `None` when the name does not
/// belong to `provider`.
pub fn decode_tool_name(provider: &str, namespaced: &str) -> Option<String> {
    namespaced
        .strip_prefix(&provider_prefix(provider))
        .map(|rest| rest.replace(NAMESPACE_SEPARATOR, "/"))
}

/// Session-scoped function definitions, keyed by provider.
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    providers: HashMap<String, Vec<ChatToolDefinition>>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the provider's entry wholesale. Unnamed tools are skipped.
    pub fn replace_from_specs(&mut self, provider: &str, specs: &[ToolSpec]) -> usize {
        let definitions: Vec<ChatToolDefinition> = specs
            .iter()
            .filter(|spec| {
                let keep = !spec.short_name.trim().is_empty();
                if !keep {
                    warn!(provider = %provider, "Skipping advertised tool without a name");
                }
                keep
            })
            .map(ToolSpec::to_definition)
            .collect();
        let count = definitions.len();
        debug!(provider = %provider, tools = count, "Replacing tool catalog entry");
        self.providers.insert(provider.to_string(), definitions);
        count
    }

    pub fn replace_from_listing(&mut self, provider: &str, listing: &ListToolsResult) -> usize {
        let specs: Vec<ToolSpec> = listing
            .tools
            .iter()
            .map(|tool| ToolSpec::from_mcp(provider, tool))
            .collect();
        self.replace_from_specs(provider, &specs)
    }

    /// Record a provider whose listing could not be used as having no tools.
    pub fn clear_provider(&mut self, provider: &str) {
        self.providers.insert(provider.to_string(), Vec::new());
    }

    pub fn tools_for(&self, provider: &str) -> &[ChatToolDefinition] {
        self.providers
            .get(provider)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn tool_names(&self, provider: &str) -> Vec<String> {
        self.tools_for(provider)
            .iter()
            .map(|tool| tool.function.name.clone())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.values().all(Vec::is_empty)
    }
}
