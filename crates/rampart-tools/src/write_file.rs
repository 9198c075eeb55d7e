use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use rampart_runtime::Tool;
use serde_json::{json, Value};
use std::io::Write;
use std::sync::Arc;

use crate::workspace_guard::WorkspaceGuard;

pub struct WriteFileTool {
    guard: Arc<WorkspaceGuard>,
}

impl WriteFileTool {
    pub fn new(guard: Arc<WorkspaceGuard>) -> Self {
        Self { guard }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Create or overwrite a file in the agent workspace. Parent directories are created automatically."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "minLength": 1, "description": "File path relative to workspace" },
                "content": { "type": "string", "description": "Content to write" }
            },
            "required": ["path", "content"]
        })
    }

    fn metadata(&self) -> Value {
        json!({"category": "filesystem", "side_effects": true})
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let path_str = input["path"]
            .as_str()
            .context("Missing required field 'path'")?;
        let content = input["content"]
            .as_str()
            .context("Missing required field 'content'")?;

        if content.len() as u64 > self.guard.max_file_size() {
            bail!("Content too large: {} bytes", content.len());
        }

        let path = self.guard.resolve(path_str)?;
        if path.is_dir() {
            bail!("Is a directory: {}", path_str);
        }

        let parent = path.parent().unwrap_or(self.guard.root()).to_path_buf();
        tokio::fs::create_dir_all(&parent)
            .await
            .with_context(|| format!("Failed to create directories: {:?}", parent))?;

        // Atomic write: temp file + rename
        let mut tmp = tempfile::NamedTempFile::new_in(&parent)
            .context("Failed to create temp file for atomic write")?;
        tmp.write_all(content.as_bytes())
            .context("Failed to write to temp file")?;
        tmp.flush()?;
        tmp.persist(&path)
            .with_context(|| format!("Failed to persist file: {:?}", path))?;

        tracing::info!(path = path_str, size = content.len(), "write_file");
        Ok(json!({
            "path": path_str,
            "size": content.len(),
            "status": "written",
        }))
    }
}
