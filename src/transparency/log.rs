//! Transparency log.
//!
//! Counts what the device did with its recordings so an operator (or a
//! curious passer-by) can audit it: how many segments were recorded, how
//! many keys were read, how many recordings were discarded unread, and how
//! many artifacts left the device. Nothing identifying is stored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Transparency statistics for the current run.
#[derive(Debug)]
pub struct TransparencyLog {
    /// Segments opened
    segments_recorded: AtomicU64,
    /// Segments whose key was read at least once
    keys_read: AtomicU64,
    /// Segments deleted without processing
    segments_discarded: AtomicU64,
    /// Processing jobs that uploaded every artifact
    jobs_completed: AtomicU64,
    /// Processing jobs that lost at least one artifact
    jobs_failed: AtomicU64,
    /// Encrypted artifacts uploaded
    artifacts_uploaded: AtomicU64,
    /// Upload attempts that failed
    uploads_failed: AtomicU64,
    /// Run start time
    session_start: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl TransparencyLog {
    /// Create a new transparency log.
    pub fn new() -> Self {
        Self {
            segments_recorded: AtomicU64::new(0),
            keys_read: AtomicU64::new(0),
            segments_discarded: AtomicU64::new(0),
            jobs_completed: AtomicU64::new(0),
            jobs_failed: AtomicU64::new(0),
            artifacts_uploaded: AtomicU64::new(0),
            uploads_failed: AtomicU64::new(0),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create a transparency log that continues counting from the stats
    /// persisted at `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);

        if let Err(e) = log.load() {
            warn!(error = %e, "Could not load previous transparency stats");
        }

        log
    }

    pub fn record_segment(&self) {
        self.segments_recorded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_key_read(&self) {
        self.keys_read.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_discard(&self) {
        self.segments_discarded.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a finished processing job.
    pub fn record_job(&self, fully_uploaded: bool) {
        if fully_uploaded {
            self.jobs_completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.jobs_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_upload(&self) {
        self.artifacts_uploaded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upload_failure(&self) {
        self.uploads_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn stats(&self) -> TransparencyStats {
        TransparencyStats {
            segments_recorded: self.segments_recorded.load(Ordering::Relaxed),
            keys_read: self.keys_read.load(Ordering::Relaxed),
            segments_discarded: self.segments_discarded.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            artifacts_uploaded: self.artifacts_uploaded.load(Ordering::Relaxed),
            uploads_failed: self.uploads_failed.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        self.stats().summary()
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                segments_recorded: stats.segments_recorded,
                keys_read: stats.keys_read,
                segments_discarded: stats.segments_discarded,
                jobs_completed: stats.jobs_completed,
                jobs_failed: stats.jobs_failed,
                artifacts_uploaded: stats.artifacts_uploaded,
                uploads_failed: stats.uploads_failed,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;

            std::fs::write(path, json)?;
        }
        Ok(())
    }

    /// Load stats from disk.
    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let persisted = read_persisted(path)?;

                self.segments_recorded
                    .store(persisted.segments_recorded, Ordering::Relaxed);
                self.keys_read.store(persisted.keys_read, Ordering::Relaxed);
                self.segments_discarded
                    .store(persisted.segments_discarded, Ordering::Relaxed);
                self.jobs_completed
                    .store(persisted.jobs_completed, Ordering::Relaxed);
                self.jobs_failed.store(persisted.jobs_failed, Ordering::Relaxed);
                self.artifacts_uploaded
                    .store(persisted.artifacts_uploaded, Ordering::Relaxed);
                self.uploads_failed
                    .store(persisted.uploads_failed, Ordering::Relaxed);
            }
        }
        Ok(())
    }
}

impl Default for TransparencyLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of transparency statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransparencyStats {
    pub segments_recorded: u64,
    pub keys_read: u64,
    pub segments_discarded: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub artifacts_uploaded: u64,
    pub uploads_failed: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

impl TransparencyStats {
    pub fn summary(&self) -> String {
        format!(
            "Recording Statistics:\n\
             - Segments recorded: {}\n\
             - Keys read by a peer: {}\n\
             - Segments discarded unread: {}\n\
             - Jobs fully uploaded: {}\n\
             - Jobs with lost artifacts: {}\n\
             - Encrypted artifacts uploaded: {}\n\
             - Failed uploads: {}\n\
             \n\
             Privacy Guarantee:\n\
             - Unread recordings never leave the device\n\
             - Only ciphertext is uploaded\n\
             - Local copies are erased after every segment",
            self.segments_recorded,
            self.keys_read,
            self.segments_discarded,
            self.jobs_completed,
            self.jobs_failed,
            self.artifacts_uploaded,
            self.uploads_failed,
        )
    }
}

/// Stats format for persistence.
#[derive(Debug, Serialize, Deserialize)]
pub struct PersistedStats {
    pub segments_recorded: u64,
    pub keys_read: u64,
    pub segments_discarded: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub artifacts_uploaded: u64,
    pub uploads_failed: u64,
    pub last_updated: DateTime<Utc>,
}

/// Read persisted stats without constructing a log.
pub fn read_persisted(path: &std::path::Path) -> Result<PersistedStats, std::io::Error> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(std::io::Error::other)
}

/// Thread-safe shared transparency log.
pub type SharedTransparencyLog = Arc<TransparencyLog>;

/// Create a new shared transparency log.
pub fn create_shared_log() -> SharedTransparencyLog {
    Arc::new(TransparencyLog::new())
}

/// Create a new shared transparency log with persistence.
pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedTransparencyLog {
    Arc::new(TransparencyLog::with_persistence(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transparency_log_counting() {
        let log = TransparencyLog::new();

        log.record_segment();
        log.record_segment();
        log.record_key_read();
        log.record_discard();
        log.record_job(true);
        log.record_job(false);

        let stats = log.stats();
        assert_eq!(stats.segments_recorded, 2);
        assert_eq!(stats.keys_read, 1);
        assert_eq!(stats.segments_discarded, 1);
        assert_eq!(stats.jobs_completed, 1);
        assert_eq!(stats.jobs_failed, 1);
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transparency.json");

        let log = TransparencyLog::with_persistence(path.clone());
        log.record_segment();
        log.record_upload();
        log.record_upload_failure();
        log.save().unwrap();

        let reloaded = TransparencyLog::with_persistence(path);
        let stats = reloaded.stats();
        assert_eq!(stats.segments_recorded, 1);
        assert_eq!(stats.artifacts_uploaded, 1);
        assert_eq!(stats.uploads_failed, 1);
    }

    #[test]
    fn test_summary_format() {
        let log = TransparencyLog::new();
        let summary = log.summary();

        assert!(summary.contains("Segments recorded"));
        assert!(summary.contains("Privacy Guarantee"));
        assert!(summary.contains("Unread recordings never leave the device"));
    }
}
