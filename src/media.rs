//! External media tools used by the processing pipeline.
//!
//! Wrapping the raw H.264 stream into an MP4 container is done with MP4Box;
//! the thumbnail is a single frame grabbed with ffmpeg. Both run as
//! subprocesses and report failure together with their stderr.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use crate::config::ToolConfig;

/// Failure of an external tool invocation.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Failed to run {tool}: {source}")]
    Spawn {
        tool: String,
        source: std::io::Error,
    },
    #[error("{tool} exited with {status}: {diagnostic}")]
    Failed {
        tool: String,
        status: String,
        diagnostic: String,
    },
}

/// Container wrapping and frame extraction.
#[async_trait]
pub trait MediaTool: Send + Sync {
    /// Wrap a raw capture into a standard container.
    async fn wrap(&self, input: &Path, output: &Path) -> Result<(), ToolError>;

    /// Extract a single still image from a wrapped container.
    async fn grab_frame(&self, input: &Path, output: &Path) -> Result<(), ToolError>;
}

/// MP4Box for wrapping, ffmpeg for thumbnails.
#[derive(Debug, Clone)]
pub struct Mp4BoxFfmpeg {
    tools: ToolConfig,
    fps: u32,
}

impl Mp4BoxFfmpeg {
    pub fn new(tools: ToolConfig, fps: u32) -> Self {
        Self { tools, fps }
    }

    fn wrap_command(&self, input: &Path, output: &Path) -> Command {
        let mut cmd = Command::new(&self.tools.mp4box);
        cmd.args(["-fps", &self.fps.to_string(), "-add"])
            .arg(input)
            .arg("-new")
            .arg(output);
        cmd
    }

    fn grab_command(&self, input: &Path, output: &Path) -> Command {
        let mut cmd = Command::new(&self.tools.ffmpeg);
        cmd.args(["-y", "-loglevel", "error", "-i"])
            .arg(input)
            .args(["-frames:v", "1", "-q:v", "2"])
            .arg(output);
        cmd
    }
}

#[async_trait]
impl MediaTool for Mp4BoxFfmpeg {
    async fn wrap(&self, input: &Path, output: &Path) -> Result<(), ToolError> {
        run(&self.tools.mp4box, self.wrap_command(input, output)).await
    }

    async fn grab_frame(&self, input: &Path, output: &Path) -> Result<(), ToolError> {
        run(&self.tools.ffmpeg, self.grab_command(input, output)).await
    }
}

async fn run(tool: &str, mut cmd: Command) -> Result<(), ToolError> {
    let output = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| ToolError::Spawn {
            tool: tool.to_string(),
            source,
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ToolError::Failed {
            tool: tool.to_string(),
            status: output.status.to_string(),
            diagnostic: stderr.trim().to_string(),
        });
    }

    debug!(tool, "Tool finished");
    Ok(())
}
