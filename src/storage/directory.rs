//! Object store backed by a local directory.
//!
//! Useful on a bench setup where a mounted share or a sync daemon takes
//! care of getting artifacts off the device.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::{ObjectStore, StoreError};

#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn object_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl ObjectStore for DirectoryStore {
    async fn upload(&self, local_path: &Path, remote_key: &str) -> Result<(), StoreError> {
        if remote_key.contains("..") || remote_key.starts_with('/') {
            return Err(StoreError::Upload {
                key: remote_key.to_string(),
                message: "key escapes the store directory".to_string(),
            });
        }

        let target = self.object_path(remote_key);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Upload {
                    key: remote_key.to_string(),
                    message: e.to_string(),
                })?;
        }

        tokio::fs::copy(local_path, &target)
            .await
            .map_err(|source| StoreError::Read {
                path: local_path.display().to_string(),
                source,
            })?;
        Ok(())
    }
}
