//! Uploads with HTTP PUT against a base URL (presigned bucket endpoint or
//! a small ingest service).

use async_trait::async_trait;
use std::path::Path;

use super::{ObjectStore, StoreError};

pub struct HttpStore {
    base_url: String,
    client: reqwest::Client,
}

impl HttpStore {
    pub fn new(base_url: String) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| StoreError::Config(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { base_url, client })
    }

    pub fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), key)
    }
}

#[async_trait]
impl ObjectStore for HttpStore {
    async fn upload(&self, local_path: &Path, remote_key: &str) -> Result<(), StoreError> {
        let body = tokio::fs::read(local_path)
            .await
            .map_err(|source| StoreError::Read {
                path: local_path.display().to_string(),
                source,
            })?;

        let response = self
            .client
            .put(self.object_url(remote_key))
            .header("Content-Type", "application/octet-stream")
            .body(body)
            .send()
            .await
            .map_err(|e| StoreError::Upload {
                key: remote_key.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(StoreError::Upload {
                key: remote_key.to_string(),
                message: format!("{}: {message}", status.as_u16()),
            });
        }
        Ok(())
    }
}
