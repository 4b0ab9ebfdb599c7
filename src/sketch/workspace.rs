use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use uuid::Uuid;

use crate::errors::BuildError;

/// Extension `arduino-cli` expects for a sketch's main file.
pub const SKETCH_EXTENSION: &str = "ino";

/// Creates per-request sketch directories under a fixed root.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
    cleanup_delay: Duration,
}

impl WorkspaceManager {
    /// Create the manager, creating `root` if it does not exist yet.
    pub fn new(root: impl Into<PathBuf>, cleanup_delay: Duration) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create workspace root {}", root.display()))?;
        Ok(Self {
            root,
            cleanup_delay,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stage `source_code` into a fresh workspace with a random id.
    pub async fn allocate(&self, source_code: &str) -> Result<SketchWorkspace, BuildError> {
        self.stage(source_code, Uuid::new_v4()).await
    }

    /// Write `source_code` verbatim to `<root>/<id>/<id>.ino`.
    ///
    /// The returned guard owns the directory: dropping it schedules removal.
    pub async fn stage(&self, source_code: &str, id: Uuid) -> Result<SketchWorkspace, BuildError> {
        let dir = self.root.join(id.to_string());
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| BuildError::Staging {
                path: dir.clone(),
                source,
            })?;

        let workspace = SketchWorkspace {
            id,
            sketch_path: dir.join(format!("{}.{}", id, SKETCH_EXTENSION)),
            dir,
            cleanup_delay: self.cleanup_delay,
        };

        tokio::fs::write(&workspace.sketch_path, source_code)
            .await
            .map_err(|source| BuildError::Staging {
                path: workspace.sketch_path.clone(),
                source,
            })?;

        tracing::debug!(sketch_id = %id, dir = %workspace.dir.display(), "staged sketch");
        Ok(workspace)
    }
}

/// A staged sketch directory, exclusively owned by one request.
///
/// Removal is tied to the guard: when it drops, the directory is deleted
/// after the configured grace delay on the Tokio runtime, or immediately if
/// no runtime is available.
#[derive(Debug)]
pub struct SketchWorkspace {
    id: Uuid,
    dir: PathBuf,
    sketch_path: PathBuf,
    cleanup_delay: Duration,
}

impl SketchWorkspace {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn sketch_path(&self) -> &Path {
        &self.sketch_path
    }
}

impl Drop for SketchWorkspace {
    fn drop(&mut self) {
        let dir = std::mem::take(&mut self.dir);
        let delay = self.cleanup_delay;
        let id = self.id;

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    release(&dir).await;
                    tracing::debug!(sketch_id = %id, "released workspace");
                });
            }
            Err(_) => release_blocking(&dir),
        }
    }
}

/// Recursively delete a workspace directory. Failures are logged, never
/// returned; a directory that is already gone counts as released.
pub async fn release(dir: &Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "Failed to clean up temporary files");
        }
    }
}

fn release_blocking(dir: &Path) {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "Failed to clean up temporary files");
        }
    }
}
