use anyhow::{bail, Context, Result};
use std::path::{Component, Path, PathBuf};

/// Confines file tools to one directory.
/// All file operations must resolve paths through this guard.
pub struct WorkspaceGuard {
    root: PathBuf,
    max_file_size: u64,
}

impl WorkspaceGuard {
    /// Open the workspace, creating the directory when it does not exist yet.
    pub fn new(root: PathBuf, max_file_size_mb: u64) -> Result<Self> {
        std::fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create workspace {:?}", root))?;
        let root = root
            .canonicalize()
            .with_context(|| format!("Workspace root not found: {:?}", root))?;
        Ok(Self {
            root,
            max_file_size: max_file_size_mb * 1024 * 1024,
        })
    }

    /// Resolve a path relative to the workspace root.
    /// Rejects absolute paths, `..` escapes and symlinks pointing outside.
    pub fn resolve(&self, input_path: &str) -> Result<PathBuf> {
        if Path::new(input_path).is_absolute() {
            bail!("Path '{}' escapes the workspace", input_path);
        }
        let joined = self.root.join(input_path);

        // Existing paths: canonicalize follows symlinks
        let resolved = if joined.exists() {
            joined.canonicalize()?
        } else {
            normalize_path(&joined)
        };

        if !resolved.starts_with(&self.root) {
            bail!("Path '{}' escapes the workspace", input_path);
        }
        Ok(resolved)
    }

    pub async fn check_size(&self, path: &Path) -> Result<()> {
        let meta = tokio::fs::metadata(path)
            .await
            .context("Failed to read file metadata")?;
        if meta.len() > self.max_file_size {
            bail!(
                "File too large: {} bytes (max {} MB)",
                meta.len(),
                self.max_file_size / (1024 * 1024)
            );
        }
        Ok(())
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Resolve `.` and `..` without touching the filesystem.
fn normalize_path(path: &Path) -> PathBuf {
    let mut parts: Vec<Component> = Vec::new();
    for c in path.components() {
        match c {
            Component::ParentDir => {
                if matches!(parts.last(), Some(Component::Normal(_))) {
                    parts.pop();
                }
            }
            Component::CurDir => {}
            other => parts.push(other),
        }
    }
    parts.iter().collect()
}
