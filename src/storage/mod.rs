//! Remote object storage for encrypted segment artifacts.
//!
//! Uploads are a single `upload(local_path, remote_key)` call. The pipeline
//! does not retry; a failed upload is reported and the artifact is lost.

pub mod directory;
#[cfg(feature = "http-upload")]
pub mod http;
pub mod s3;

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{StoreBackend, StoreConfig};

pub use directory::DirectoryStore;
#[cfg(feature = "http-upload")]
pub use http::HttpStore;
pub use s3::S3CliStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store config error: {0}")]
    Config(String),
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("Upload of {key} failed: {message}")]
    Upload { key: String, message: String },
}

/// Destination for encrypted artifacts.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(&self, local_path: &Path, remote_key: &str) -> Result<(), StoreError>;
}

pub type SharedStore = Arc<dyn ObjectStore>;

/// Build the object store selected in the configuration.
pub fn from_config(config: &StoreConfig) -> Result<SharedStore, StoreError> {
    match config.backend {
        StoreBackend::S3 => Ok(Arc::new(S3CliStore::new(config.clone()))),
        StoreBackend::Directory => {
            let root = config.directory.clone().ok_or_else(|| {
                StoreError::Config("directory backend needs store.directory".to_string())
            })?;
            Ok(Arc::new(DirectoryStore::new(root)))
        }
        #[cfg(feature = "http-upload")]
        StoreBackend::Http => Ok(Arc::new(HttpStore::new(config.base_url.clone())?)),
        #[cfg(not(feature = "http-upload"))]
        StoreBackend::Http => Err(StoreError::Config(
            "http backend requires the http-upload feature".to_string(),
        )),
    }
}
