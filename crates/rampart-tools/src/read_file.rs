use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use rampart_runtime::Tool;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::workspace_guard::WorkspaceGuard;

pub struct ReadFileTool {
    guard: Arc<WorkspaceGuard>,
}

impl ReadFileTool {
    pub fn new(guard: Arc<WorkspaceGuard>) -> Self {
        Self { guard }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a UTF-8 text file from the agent workspace. Path is relative to the workspace root."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "minLength": 1, "description": "File path relative to workspace" }
            },
            "required": ["path"]
        })
    }

    fn metadata(&self) -> Value {
        json!({"category": "filesystem", "side_effects": false})
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let path_str = input["path"]
            .as_str()
            .context("Missing required field 'path'")?;
        let path = self.guard.resolve(path_str)?;

        if !path.exists() {
            bail!("File not found: {}", path_str);
        }
        if !path.is_file() {
            bail!("Not a file: {}", path_str);
        }
        self.guard.check_size(&path).await?;

        let bytes = tokio::fs::read(&path)
            .await
            .context("Failed to read file")?;
        let check_len = bytes.len().min(8192);
        if bytes[..check_len].contains(&0) {
            bail!("Binary file detected, cannot read: {}", path_str);
        }
        let content = String::from_utf8(bytes).context("File is not valid UTF-8")?;

        tracing::debug!(path = path_str, size = content.len(), "read_file");
        Ok(json!({
            "path": path_str,
            "size": content.len(),
            "content": content,
        }))
    }
}
