//! Capture backend that records nothing.
//!
//! Used on hosts without a camera so the rest of the agent (key rotation,
//! peripheral handling) can run unchanged. Segments recorded with it have
//! no raw file.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::{CaptureDevice, CaptureError};

#[derive(Debug, Default)]
pub struct NoopCapture {
    current: Option<PathBuf>,
}

impl NoopCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Path of the recording that would be in progress.
    pub fn current_output(&self) -> Option<&Path> {
        self.current.as_deref()
    }
}

#[async_trait]
impl CaptureDevice for NoopCapture {
    async fn start(&mut self, output: &Path) -> Result<(), CaptureError> {
        if self.current.is_some() {
            return Err(CaptureError::AlreadyRunning);
        }
        self.current = Some(output.to_path_buf());
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        self.current = None;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.current.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_lifecycle() {
        let mut capture = NoopCapture::new();
        capture.stop().await.unwrap();

        capture.start(Path::new("a.h264")).await.unwrap();
        assert!(capture.is_running());
        assert!(matches!(
            capture.start(Path::new("b.h264")).await,
            Err(CaptureError::AlreadyRunning)
        ));

        capture.stop().await.unwrap();
        assert!(!capture.is_running());
        assert!(capture.current_output().is_none());
    }
}
