//! Local artifact erasure.
//!
//! The pipeline and the startup sweep only need "delete, best effort".
//! Which deletion is used is injected, so overwrite-then-unlink can replace
//! plain unlink without touching pipeline logic.

use async_trait::async_trait;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::EraseMode;

/// A strategy for removing a local file.
#[async_trait]
pub trait Eraser: Send + Sync {
    /// Remove `path`. A path that no longer exists is not an error.
    async fn erase(&self, path: &Path) -> io::Result<()>;
}

pub type SharedEraser = Arc<dyn Eraser>;

/// Build the eraser selected in the configuration.
pub fn from_mode(mode: EraseMode) -> SharedEraser {
    match mode {
        EraseMode::Shred => Arc::new(ShredEraser::default()),
        EraseMode::Unlink => Arc::new(UnlinkEraser),
    }
}

/// Plain `unlink`.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnlinkEraser;

#[async_trait]
impl Eraser for UnlinkEraser {
    async fn erase(&self, path: &Path) -> io::Result<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Overwrite with `shred -u -z`, falling back to unlink when shred is
/// unavailable or fails.
#[derive(Debug, Clone)]
pub struct ShredEraser {
    program: String,
}

impl Default for ShredEraser {
    fn default() -> Self {
        Self {
            program: "shred".to_string(),
        }
    }
}

impl ShredEraser {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl Eraser for ShredEraser {
    async fn erase(&self, path: &Path) -> io::Result<()> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Ok(());
        }

        let status = Command::new(&self.program)
            .arg("-u")
            .arg("-z")
            .arg(path)
            .kill_on_drop(true)
            .status()
            .await;

        match status {
            Ok(status) if status.success() => {
                debug!(path = %path.display(), "Shredded");
                Ok(())
            }
            Ok(status) => {
                warn!(path = %path.display(), %status, "shred failed, unlinking instead");
                UnlinkEraser.erase(path).await
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "shred unavailable, unlinking instead");
                UnlinkEraser.erase(path).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unlink_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seg.h264");
        std::fs::write(&path, b"raw").unwrap();

        UnlinkEraser.erase(&path).await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_unlink_missing_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        UnlinkEraser
            .erase(&dir.path().join("gone.mp4"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_shred_falls_back_when_program_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seg.mp4");
        std::fs::write(&path, b"plaintext").unwrap();

        let eraser = ShredEraser::new("definitely-not-a-shred-binary");
        eraser.erase(&path).await.unwrap();
        assert!(!path.exists());
    }
}
