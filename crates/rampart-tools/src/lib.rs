pub mod calculate;
pub mod list_directory;
pub mod read_file;
pub mod workspace_guard;
pub mod write_file;

pub use calculate::CalculateTool;
pub use list_directory::ListDirectoryTool;
pub use read_file::ReadFileTool;
pub use workspace_guard::WorkspaceGuard;
pub use write_file::WriteFileTool;

use anyhow::Result;
use rampart_runtime::ToolRegistry;
use std::path::PathBuf;
use std::sync::Arc;

/// Files larger than this are refused by the file tools
pub const DEFAULT_MAX_FILE_SIZE_MB: u64 = 10;

/// Register the built-in tools; file tools are confined to `workspace`.
pub fn register_default_tools(registry: &ToolRegistry, workspace: PathBuf) -> Result<()> {
    let guard = Arc::new(WorkspaceGuard::new(workspace, DEFAULT_MAX_FILE_SIZE_MB)?);

    registry.register(Arc::new(CalculateTool))?;
    registry.register(Arc::new(ReadFileTool::new(guard.clone())))?;
    registry.register(Arc::new(WriteFileTool::new(guard.clone())))?;
    registry.register(Arc::new(ListDirectoryTool::new(guard)))?;

    tracing::info!(tools = ?registry.names(), "Default tools registered");
    Ok(())
}
