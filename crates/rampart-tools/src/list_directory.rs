use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use rampart_runtime::Tool;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::workspace_guard::WorkspaceGuard;

pub struct ListDirectoryTool {
    guard: Arc<WorkspaceGuard>,
}

impl ListDirectoryTool {
    pub fn new(guard: Arc<WorkspaceGuard>) -> Self {
        Self { guard }
    }
}

#[async_trait]
impl Tool for ListDirectoryTool {
    fn name(&self) -> &str {
        "list_directory"
    }

    fn description(&self) -> &str {
        "List files and directories in the agent workspace."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "default": ".", "description": "Directory path relative to workspace" }
            }
        })
    }

    fn metadata(&self) -> Value {
        json!({"category": "filesystem", "side_effects": false})
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let path_str = input["path"].as_str().unwrap_or(".");
        let path = self.guard.resolve(path_str)?;

        if !path.exists() {
            bail!("Directory not found: {}", path_str);
        }
        if !path.is_dir() {
            bail!("Not a directory: {}", path_str);
        }

        let mut reader = tokio::fs::read_dir(&path)
            .await
            .context("Failed to read directory")?;
        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let meta = entry.metadata().await?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let entry = if meta.is_dir() {
                json!({"name": name, "type": "dir"})
            } else {
                json!({"name": name, "type": "file", "size": meta.len()})
            };
            entries.push(entry);
        }
        entries.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));

        Ok(json!({
            "path": path_str,
            "count": entries.len(),
            "entries": entries,
        }))
    }
}
