//! Video capture for the CryptoCam agent.
//!
//! A capture device records into exactly one output file at a time. The
//! rotation controller starts it on a fresh path every segment and stops it
//! when the segment closes.

pub mod noop;
pub mod raspivid;

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

use crate::config::{CaptureBackend, CaptureConfig};

pub use noop::NoopCapture;
pub use raspivid::RaspividCapture;

/// Errors that can occur while starting or stopping a recording.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Capture is already running")]
    AlreadyRunning,
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("Failed to stop recording: {0}")]
    Stop(std::io::Error),
}

/// A recording device writing to a named file.
#[async_trait]
pub trait CaptureDevice: Send {
    /// Begin recording into `output`.
    async fn start(&mut self, output: &Path) -> Result<(), CaptureError>;

    /// Stop the active recording. Stopping an idle device is not an error.
    async fn stop(&mut self) -> Result<(), CaptureError>;

    /// Whether a recording is in progress.
    fn is_running(&self) -> bool;
}

/// Build the capture device selected in the configuration.
pub fn from_config(config: &CaptureConfig) -> Box<dyn CaptureDevice> {
    match config.backend {
        CaptureBackend::Raspivid => Box::new(RaspividCapture::new(config.clone())),
        CaptureBackend::None => Box::new(NoopCapture::new()),
    }
}
