//! Processing pipeline for segments whose key was read.
//!
//! ```text
//!  raw.h264 ──wrap──▶ seg.mp4 ──grab──▶ seg.jpg
//!                        │                 │
//!                     encrypt           encrypt      (concurrent)
//!                        │                 │
//!                     upload            upload       (concurrent)
//!                        └──────┬──────────┘
//!                            cleanup                 (always)
//! ```
//!
//! Every path a job may create is registered in its [`JobFiles`] before the
//! stage that creates it runs. The registry is drained when the job ends,
//! whichever stage failed, and its `Drop` unlinks anything left if the job
//! task itself is torn down.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::core::segment::SegmentSnapshot;
use crate::crypto;
use crate::erase::SharedEraser;
use crate::keys::KeyMaterial;
use crate::media::MediaTool;
use crate::storage::SharedStore;
use crate::transparency::SharedTransparencyLog;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Wrap,
    Thumbnail,
    EncryptVideo,
    EncryptThumbnail,
    UploadVideo,
    UploadThumbnail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Ok,
    Failed(String),
}

/// Where one artifact stream ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactOutcome {
    /// Uploaded under this object key
    Uploaded(String),
    /// Never produced because an earlier stage aborted the job
    NotProduced,
    EncryptFailed(String),
    UploadFailed(String),
}

impl ArtifactOutcome {
    pub fn is_uploaded(&self) -> bool {
        matches!(self, ArtifactOutcome::Uploaded(_))
    }
}

/// Result of one pipeline job.
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub segment: String,
    pub stages: Vec<(Stage, StageStatus)>,
    pub video: ArtifactOutcome,
    pub thumbnail: ArtifactOutcome,
    /// Files removed during cleanup
    pub erased: usize,
}

impl JobReport {
    fn new(segment: &str) -> Self {
        Self {
            segment: segment.to_string(),
            stages: Vec::new(),
            video: ArtifactOutcome::NotProduced,
            thumbnail: ArtifactOutcome::NotProduced,
            erased: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.video.is_uploaded() && self.thumbnail.is_uploaded()
    }

    pub fn status_of(&self, stage: Stage) -> Option<&StageStatus> {
        self.stages
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, status)| status)
    }

    fn record(&mut self, stage: Stage, status: StageStatus) {
        self.stages.push((stage, status));
    }
}

/// Registry of the files a job has created.
///
/// Paths are registered at most once. [`JobFiles::release`] erases every
/// registered path that still exists and ignores individual failures.
pub struct JobFiles {
    paths: Vec<PathBuf>,
    eraser: SharedEraser,
}

impl JobFiles {
    pub fn new(eraser: SharedEraser) -> Self {
        Self {
            paths: Vec::new(),
            eraser,
        }
    }

    /// Take ownership of `path` for cleanup.
    pub fn register(&mut self, path: &Path) -> PathBuf {
        if !self.paths.iter().any(|p| p == path) {
            self.paths.push(path.to_path_buf());
        }
        path.to_path_buf()
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Erase every registered path. Returns how many files were removed.
    pub async fn release(mut self) -> usize {
        let mut erased = 0;
        for path in std::mem::take(&mut self.paths) {
            if !path.exists() {
                continue;
            }
            match self.eraser.erase(&path).await {
                Ok(()) => erased += 1,
                Err(e) => warn!(path = %path.display(), error = %e, "Cleanup failed"),
            }
        }
        erased
    }
}

impl Drop for JobFiles {
    fn drop(&mut self) {
        for path in self.paths.drain(..) {
            let _ = std::fs::remove_file(&path);
        }
    }
}

/// Shared collaborators of every pipeline job.
pub struct Pipeline {
    tools: Arc<dyn MediaTool>,
    store: SharedStore,
    eraser: SharedEraser,
    transparency: SharedTransparencyLog,
    handoff_delay: Duration,
}

impl Pipeline {
    pub fn new(
        tools: Arc<dyn MediaTool>,
        store: SharedStore,
        eraser: SharedEraser,
        transparency: SharedTransparencyLog,
        handoff_delay: Duration,
    ) -> Self {
        Self {
            tools,
            store,
            eraser,
            transparency,
            handoff_delay,
        }
    }

    /// Process a read segment in the background.
    pub fn spawn_job(self: &Arc<Self>, segment: SegmentSnapshot) -> JoinHandle<JobReport> {
        let pipeline = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(pipeline.handoff_delay).await;
            pipeline.run(segment).await
        })
    }

    /// Delete an unread segment in the background.
    pub fn spawn_discard(self: &Arc<Self>, segment: SegmentSnapshot) -> JoinHandle<()> {
        let pipeline = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(pipeline.handoff_delay).await;
            if let Err(e) = pipeline.eraser.erase(&segment.paths.raw).await {
                warn!(segment = %segment.id, error = %e, "Failed to delete unread recording");
            }
            pipeline.transparency.record_discard();
            info!(segment = %segment.id, "Key not read so deleted recording without uploading");
        })
    }

    /// Run every stage for `segment`, then clean up.
    pub async fn run(&self, segment: SegmentSnapshot) -> JobReport {
        let mut files = JobFiles::new(self.eraser.clone());
        let mut report = JobReport::new(&segment.id);

        self.run_stages(&segment, &mut files, &mut report).await;

        report.erased = files.release().await;
        self.transparency.record_job(report.is_success());

        if report.is_success() {
            info!(segment = %report.segment, erased = report.erased, "Uploaded and removed");
        } else {
            warn!(
                segment = %report.segment,
                video = ?report.video,
                thumbnail = ?report.thumbnail,
                erased = report.erased,
                "Job finished with lost artifacts"
            );
        }
        report
    }

    async fn run_stages(
        &self,
        segment: &SegmentSnapshot,
        files: &mut JobFiles,
        report: &mut JobReport,
    ) {
        let paths = &segment.paths;
        let raw = files.register(&paths.raw);

        let recorded = segment.closed_at - segment.created_at;
        info!(
            segment = %segment.id,
            recorded_secs = recorded.num_seconds(),
            "Wrapping previous recording"
        );
        let wrapped = files.register(&paths.wrapped);
        if let Err(e) = self.tools.wrap(&raw, &wrapped).await {
            error!(segment = %segment.id, error = %e, "Failed to wrap recording");
            report.record(Stage::Wrap, StageStatus::Failed(e.to_string()));
            return;
        }
        report.record(Stage::Wrap, StageStatus::Ok);

        // The raw stream is not needed once wrapped.
        if let Err(e) = self.eraser.erase(&raw).await {
            warn!(segment = %segment.id, error = %e, "Failed to erase raw recording");
        }

        debug!(segment = %segment.id, "Extracting thumbnail");
        let thumbnail = files.register(&paths.thumbnail);
        if let Err(e) = self.tools.grab_frame(&wrapped, &thumbnail).await {
            error!(segment = %segment.id, error = %e, "Failed to extract thumbnail");
            report.record(Stage::Thumbnail, StageStatus::Failed(e.to_string()));
            return;
        }
        report.record(Stage::Thumbnail, StageStatus::Ok);

        let encrypted_video = files.register(&paths.encrypted_video);
        let encrypted_thumbnail = files.register(&paths.encrypted_thumbnail);

        let (video, thumbnail) = tokio::join!(
            self.seal_and_upload(
                segment,
                wrapped,
                encrypted_video,
                segment.video_key(),
                (Stage::EncryptVideo, Stage::UploadVideo),
            ),
            self.seal_and_upload(
                segment,
                thumbnail,
                encrypted_thumbnail,
                segment.thumbnail_key(),
                (Stage::EncryptThumbnail, Stage::UploadThumbnail),
            ),
        );

        report.stages.extend(video.1);
        report.stages.extend(thumbnail.1);
        report.video = video.0;
        report.thumbnail = thumbnail.0;
    }

    /// Encrypt one artifact and upload the ciphertext.
    async fn seal_and_upload(
        &self,
        segment: &SegmentSnapshot,
        plaintext: PathBuf,
        ciphertext: PathBuf,
        remote_key: String,
        (encrypt_stage, upload_stage): (Stage, Stage),
    ) -> (ArtifactOutcome, Vec<(Stage, StageStatus)>) {
        let mut stages = Vec::with_capacity(2);

        debug!(segment = %segment.id, artifact = %plaintext.display(), "Encrypting");
        let material = segment.material.clone();
        let sealed_path = ciphertext.clone();
        let sealed =
            tokio::task::spawn_blocking(move || encrypt(&material, &plaintext, &sealed_path))
                .await
                .unwrap_or_else(|e| Err(format!("encryption task failed: {e}")));

        if let Err(e) = sealed {
            error!(segment = %segment.id, stage = ?encrypt_stage, error = %e, "Encryption failed");
            stages.push((encrypt_stage, StageStatus::Failed(e.clone())));
            return (ArtifactOutcome::EncryptFailed(e), stages);
        }
        stages.push((encrypt_stage, StageStatus::Ok));

        info!(segment = %segment.id, key = %remote_key, "Uploading");
        match self.store.upload(&ciphertext, &remote_key).await {
            Ok(()) => {
                self.transparency.record_upload();
                stages.push((upload_stage, StageStatus::Ok));
                (ArtifactOutcome::Uploaded(remote_key), stages)
            }
            Err(e) => {
                self.transparency.record_upload_failure();
                error!(segment = %segment.id, error = %e, "Failed to upload");
                stages.push((upload_stage, StageStatus::Failed(e.to_string())));
                (ArtifactOutcome::UploadFailed(e.to_string()), stages)
            }
        }
    }
}

fn encrypt(material: &KeyMaterial, plaintext: &Path, ciphertext: &Path) -> Result<(), String> {
    crypto::encrypt_file(material, plaintext, ciphertext)
        .map(|_| ())
        .map_err(|e| e.to_string())
}
