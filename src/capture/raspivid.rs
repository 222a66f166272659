//! Raspberry Pi camera capture via the `raspivid` command.
//!
//! Each recording is one `raspivid -t 0` process writing raw H.264 to the
//! segment's output path. Stopping sends SIGTERM so the encoder can flush,
//! and escalates to a kill if the process does not exit in time.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use super::{CaptureDevice, CaptureError};
use crate::config::CaptureConfig;

const STOP_GRACE: Duration = Duration::from_secs(2);

pub struct RaspividCapture {
    config: CaptureConfig,
    child: Option<Child>,
}

impl RaspividCapture {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            child: None,
        }
    }

    fn command(&self, output: &Path) -> Command {
        let mut cmd = Command::new(&self.config.program);
        cmd.arg("-o")
            .arg(output)
            .args(["-t", "0", "-n"])
            .args(["-fps", &self.config.fps.to_string()]);
        if let Some(width) = self.config.width {
            cmd.args(["-w", &width.to_string()]);
        }
        if let Some(height) = self.config.height {
            cmd.args(["-h", &height.to_string()]);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl CaptureDevice for RaspividCapture {
    async fn start(&mut self, output: &Path) -> Result<(), CaptureError> {
        if self.child.is_some() {
            return Err(CaptureError::AlreadyRunning);
        }

        let child = self
            .command(output)
            .spawn()
            .map_err(|source| CaptureError::Spawn {
                program: self.config.program.clone(),
                source,
            })?;

        info!(output = %output.display(), pid = ?child.id(), "Recording started");
        self.child = Some(child);
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        if let Some(pid) = child.id() {
            let signalled = Command::new("kill")
                .args(["-TERM", &pid.to_string()])
                .status()
                .await
                .map(|s| s.success())
                .unwrap_or(false);

            if signalled {
                match tokio::time::timeout(STOP_GRACE, child.wait()).await {
                    Ok(Ok(status)) => {
                        debug!(%status, "Recorder exited");
                        return Ok(());
                    }
                    Ok(Err(e)) => return Err(CaptureError::Stop(e)),
                    Err(_) => warn!(pid, "Recorder ignored SIGTERM, killing"),
                }
            }
        }

        child.start_kill().map_err(CaptureError::Stop)?;
        child.wait().await.map_err(CaptureError::Stop)?;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.child.is_some()
    }
}
