use std::sync::Arc;

use anyhow::Result;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;

use crate::llm::ToolSchema;
use crate::tool::Tool;

/// Registered tool as listed to operators
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub parameters: Value,
    pub metadata: Value,
}

/// Name → tool map shared by the proxy and the agent.
#[derive(Default)]
pub struct ToolRegistry {
    tools: DashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under its own name. Re-registering replaces.
    pub fn register(&self, tool: Arc<dyn Tool>) -> Result<()> {
        let name = tool.name().to_string();
        if name.is_empty() {
            anyhow::bail!("tool name must not be empty");
        }
        if !tool.parameters().is_object() {
            anyhow::bail!("tool '{}' parameters must be a JSON object schema", name);
        }
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::warn!(tool = %name, "Replacing previously registered tool");
        } else {
            tracing::debug!(tool = %name, "Registered tool");
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).map(|t| t.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Sorted tool names
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn list(&self) -> Vec<ToolInfo> {
        self.names()
            .into_iter()
            .filter_map(|name| self.get(&name))
            .map(|tool| ToolInfo {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters(),
                metadata: tool.metadata(),
            })
            .collect()
    }

    /// Schemas in the shape the LLM providers expect
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.list()
            .into_iter()
            .map(|info| ToolSchema {
                name: info.name,
                description: info.description,
                input_schema: info.parameters,
            })
            .collect()
    }
}
