//! Fakes shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use cryptocam_agent::capture::{CaptureDevice, CaptureError};
use cryptocam_agent::channel::{CredentialChannel, LoopbackChannel, PeerEvents};
use cryptocam_agent::core::{Pipeline, RotationController, RotationSettings};
use cryptocam_agent::erase::UnlinkEraser;
use cryptocam_agent::media::{MediaTool, ToolError};
use cryptocam_agent::storage::{DirectoryStore, ObjectStore, StoreError};
use cryptocam_agent::transparency::{create_shared_log, SharedTransparencyLog};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const RAW_CONTENT: &[u8] = b"\x00\x00\x00\x01raw h264 payload for one segment";

/// Writes [`RAW_CONTENT`] to the output path on start.
#[derive(Default)]
pub struct FakeCamera {
    running: bool,
}

#[async_trait]
impl CaptureDevice for FakeCamera {
    async fn start(&mut self, output: &Path) -> Result<(), CaptureError> {
        std::fs::write(output, RAW_CONTENT).map_err(|source| CaptureError::Spawn {
            program: "fake-camera".to_string(),
            source,
        })?;
        self.running = true;
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        self.running = false;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running
    }
}

/// How the fake media tool should misbehave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToolFault {
    #[default]
    None,
    /// Write half an output file, then fail the wrap
    Wrap,
    /// Write half a thumbnail, then fail the frame grab
    Thumbnail,
    /// Report a successful frame grab without writing anything
    MissingThumbnail,
}

/// Copies input to output, optionally failing.
#[derive(Default)]
pub struct FakeTools {
    pub fault: ToolFault,
}

fn tool_error(tool: &str) -> ToolError {
    ToolError::Failed {
        tool: tool.to_string(),
        status: "exit status: 1".to_string(),
        diagnostic: "injected failure".to_string(),
    }
}

#[async_trait]
impl MediaTool for FakeTools {
    async fn wrap(&self, input: &Path, output: &Path) -> Result<(), ToolError> {
        if self.fault == ToolFault::Wrap {
            std::fs::write(output, b"partial").ok();
            return Err(tool_error("MP4Box"));
        }
        std::fs::copy(input, output).map_err(|source| ToolError::Spawn {
            tool: "MP4Box".to_string(),
            source,
        })?;
        Ok(())
    }

    async fn grab_frame(&self, input: &Path, output: &Path) -> Result<(), ToolError> {
        match self.fault {
            ToolFault::Thumbnail => {
                std::fs::write(output, b"partial").ok();
                Err(tool_error("ffmpeg"))
            }
            ToolFault::MissingThumbnail => Ok(()),
            _ => {
                std::fs::copy(input, output).map_err(|source| ToolError::Spawn {
                    tool: "ffmpeg".to_string(),
                    source,
                })?;
                Ok(())
            }
        }
    }
}

/// Directory-backed store that rejects keys with a given suffix.
pub struct FlakyStore {
    inner: DirectoryStore,
    reject_suffix: Option<&'static str>,
    pub attempts: Mutex<Vec<String>>,
}

impl FlakyStore {
    pub fn new(root: PathBuf, reject_suffix: Option<&'static str>) -> Self {
        Self {
            inner: DirectoryStore::new(root),
            reject_suffix,
            attempts: Mutex::new(Vec::new()),
        }
    }

    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStore for FlakyStore {
    async fn upload(&self, local_path: &Path, remote_key: &str) -> Result<(), StoreError> {
        self.attempts.lock().unwrap().push(remote_key.to_string());
        if let Some(suffix) = self.reject_suffix {
            if remote_key.ends_with(suffix) {
                return Err(StoreError::Upload {
                    key: remote_key.to_string(),
                    message: "injected failure".to_string(),
                });
            }
        }
        self.inner.upload(local_path, remote_key).await
    }
}

/// Keeps every published value for tests that inspect rotation history,
/// then forwards to the loopback peer.
pub struct RecordingChannel {
    inner: Arc<LoopbackChannel>,
    history: Mutex<Vec<Vec<u8>>>,
}

impl RecordingChannel {
    pub fn new(inner: Arc<LoopbackChannel>) -> Self {
        Self {
            inner,
            history: Mutex::new(Vec::new()),
        }
    }

    /// Every value published so far, oldest first.
    pub fn history(&self) -> Vec<Vec<u8>> {
        self.history.lock().unwrap().clone()
    }
}

impl CredentialChannel for RecordingChannel {
    fn set_current_value(&self, value: &[u8]) {
        self.history.lock().unwrap().push(value.to_vec());
        self.inner.set_current_value(value);
    }

    fn force_disconnect(&self) {
        self.inner.force_disconnect();
    }
}

pub fn file_count(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

/// A controller wired to fakes, with its directories and peer handle.
pub struct Rig {
    pub controller: RotationController,
    pub events: PeerEvents,
    pub channel: Arc<LoopbackChannel>,
    pub recorder: Arc<RecordingChannel>,
    pub transparency: SharedTransparencyLog,
    pub work: TempDir,
    pub store: TempDir,
}

pub fn rig(segment: Duration) -> Rig {
    let work = tempfile::tempdir().unwrap();
    let store = tempfile::tempdir().unwrap();
    let transparency = create_shared_log();
    let (channel, events) = LoopbackChannel::new();
    let recorder = Arc::new(RecordingChannel::new(channel.clone()));

    let pipeline = Arc::new(Pipeline::new(
        Arc::new(FakeTools::default()),
        Arc::new(DirectoryStore::new(store.path().to_path_buf())),
        Arc::new(UnlinkEraser),
        transparency.clone(),
        Duration::from_millis(100),
    ));
    let settings = RotationSettings {
        segment_duration: segment,
        bonding_timeout: Duration::from_secs(5),
        read_timeout: Duration::from_secs(5),
        work_dir: work.path().to_path_buf(),
        base_url: "https://s3-eu-west-1.amazonaws.com/cryptocam/".to_string(),
    };
    let controller = RotationController::new(
        settings,
        Box::new(FakeCamera::default()),
        recorder.clone(),
        pipeline,
        transparency.clone(),
    );

    Rig {
        controller,
        events,
        channel,
        recorder,
        transparency,
        work,
        store,
    }
}
