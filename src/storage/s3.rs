//! S3 uploads through the AWS CLI.
//!
//! Works against AWS S3 and any S3-compatible endpoint (R2, MinIO) using
//! the credentials of the configured CLI profile.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use super::{ObjectStore, StoreError};
use crate::config::StoreConfig;

pub struct S3CliStore {
    config: StoreConfig,
}

impl S3CliStore {
    pub fn new(config: StoreConfig) -> Self {
        Self { config }
    }

    fn s3_url(&self, key: &str) -> String {
        format!("s3://{}/{}", self.config.bucket, key)
    }

    fn command(&self, local_path: &Path, key: &str) -> Command {
        let mut cmd = Command::new("aws");
        cmd.args(["s3", "cp"]).arg(local_path).arg(self.s3_url(key));

        if let Some(ref acl) = self.config.acl {
            cmd.args(["--acl", acl]);
        }
        if let Some(ref endpoint) = self.config.endpoint_url {
            cmd.args(["--endpoint-url", endpoint]);
        }
        if let Some(ref region) = self.config.region {
            cmd.args(["--region", region]);
        }
        if let Some(ref profile) = self.config.profile {
            cmd.args(["--profile", profile]);
        }
        cmd.arg("--only-show-errors");
        cmd
    }
}

#[async_trait]
impl ObjectStore for S3CliStore {
    async fn upload(&self, local_path: &Path, remote_key: &str) -> Result<(), StoreError> {
        let output = self
            .command(local_path, remote_key)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| StoreError::Upload {
                key: remote_key.to_string(),
                message: format!("failed to run aws s3 cp: {e}"),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(StoreError::Upload {
                key: remote_key.to_string(),
                message: stderr.trim().to_string(),
            });
        }

        debug!(key = remote_key, bucket = %self.config.bucket, "Uploaded to S3");
        Ok(())
    }
}
