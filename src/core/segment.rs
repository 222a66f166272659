//! Segments: one fixed-length recording, its key material and the files
//! derived from it.
//!
//! A [`Segment`] is owned by the rotation controller while it is active.
//! Closing it consumes the value and yields an immutable
//! [`SegmentSnapshot`], which is what the processing pipeline receives.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::erase::Eraser;
use crate::keys::KeyMaterial;

/// Raw capture container.
pub const RAW_EXTENSION: &str = "h264";
/// Wrapped, standard container.
pub const WRAPPED_EXTENSION: &str = "mp4";
/// Still image.
pub const THUMBNAIL_EXTENSION: &str = "jpg";
/// Encrypted artifact suffix, appended to the plaintext name.
pub const ENCRYPTED_EXTENSION: &str = "enc";

/// Extensions removed by the startup sweep.
pub const SWEEP_EXTENSIONS: &[&str] = &[
    RAW_EXTENSION,
    WRAPPED_EXTENSION,
    THUMBNAIL_EXTENSION,
    ENCRYPTED_EXTENSION,
];

/// Every local path a segment can produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub raw: PathBuf,
    pub wrapped: PathBuf,
    pub thumbnail: PathBuf,
    pub encrypted_video: PathBuf,
    pub encrypted_thumbnail: PathBuf,
}

impl ArtifactPaths {
    pub fn new(dir: &Path, stem: &str) -> Self {
        Self {
            raw: dir.join(format!("{stem}.{RAW_EXTENSION}")),
            wrapped: dir.join(format!("{stem}.{WRAPPED_EXTENSION}")),
            thumbnail: dir.join(format!("{stem}.{THUMBNAIL_EXTENSION}")),
            encrypted_video: dir.join(format!("{stem}.{WRAPPED_EXTENSION}.{ENCRYPTED_EXTENSION}")),
            encrypted_thumbnail: dir.join(format!(
                "{stem}.{THUMBNAIL_EXTENSION}.{ENCRYPTED_EXTENSION}"
            )),
        }
    }
}

/// Issues sortable, unique segment identifiers.
///
/// The identifier is the creation time down to the millisecond followed by
/// a per-process sequence number, so two rotations within the same
/// millisecond still get distinct file names.
#[derive(Debug, Default)]
pub struct SegmentClock {
    sequence: u64,
}

impl SegmentClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self, now: DateTime<Utc>) -> String {
        self.sequence += 1;
        format!(
            "{}-{:06}",
            now.format("%Y-%m-%d-%H-%M-%S-%3f"),
            self.sequence
        )
    }
}

/// The segment currently being recorded.
#[derive(Debug)]
pub struct Segment {
    id: String,
    paths: ArtifactPaths,
    material: KeyMaterial,
    destination: String,
    reads: u32,
    created_at: DateTime<Utc>,
}

impl Segment {
    pub fn open(
        id: String,
        work_dir: &Path,
        material: KeyMaterial,
        destination: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        let paths = ArtifactPaths::new(work_dir, &id);
        Self {
            id,
            paths,
            material,
            destination,
            reads: 0,
            created_at,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn raw_path(&self) -> &Path {
        &self.paths.raw
    }

    pub fn material(&self) -> &KeyMaterial {
        &self.material
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Count a first read of this segment's key.
    pub fn mark_read(&mut self) {
        self.reads += 1;
    }

    pub fn reads(&self) -> u32 {
        self.reads
    }

    pub fn was_key_read(&self) -> bool {
        self.reads > 0
    }

    /// Close the segment. Consuming `self` makes the transition one-shot.
    pub fn close(self, closed_at: DateTime<Utc>) -> SegmentSnapshot {
        SegmentSnapshot {
            id: self.id,
            paths: self.paths,
            material: self.material,
            destination: self.destination,
            reads: self.reads,
            created_at: self.created_at,
            closed_at,
        }
    }
}

/// Immutable view of a closed segment.
#[derive(Debug, Clone)]
pub struct SegmentSnapshot {
    pub id: String,
    pub paths: ArtifactPaths,
    pub material: KeyMaterial,
    pub destination: String,
    pub reads: u32,
    pub created_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
}

impl SegmentSnapshot {
    pub fn was_key_read(&self) -> bool {
        self.reads > 0
    }

    /// Object store key of the encrypted video.
    pub fn video_key(&self) -> String {
        format!("{}.{WRAPPED_EXTENSION}", self.destination)
    }

    /// Object store key of the encrypted thumbnail.
    pub fn thumbnail_key(&self) -> String {
        format!("{}.{THUMBNAIL_EXTENSION}", self.destination)
    }
}

/// Whether `path` looks like a recording or processing artifact.
pub fn is_artifact(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SWEEP_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

/// Erase every leftover artifact in `dir` from a previous run.
///
/// Returns the number of files erased. A missing directory is treated as
/// empty; individual erase failures are logged and skipped.
pub async fn sweep(dir: &Path, eraser: &dyn Eraser) -> std::io::Result<usize> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let mut erased = 0;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_file = entry
            .file_type()
            .await
            .map(|t| t.is_file())
            .unwrap_or(false);
        if !is_file || !is_artifact(&path) {
            continue;
        }
        match eraser.erase(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "Swept leftover artifact");
                erased += 1;
            }
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to sweep artifact"),
        }
    }

    info!(dir = %dir.display(), erased, "Cleared old recordings");
    Ok(erased)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::erase::UnlinkEraser;
    use chrono::TimeZone;

    #[test]
    fn test_artifact_naming() {
        let paths = ArtifactPaths::new(Path::new("/rec"), "stem");
        assert_eq!(paths.raw, Path::new("/rec/stem.h264"));
        assert_eq!(paths.wrapped, Path::new("/rec/stem.mp4"));
        assert_eq!(paths.thumbnail, Path::new("/rec/stem.jpg"));
        assert_eq!(paths.encrypted_video, Path::new("/rec/stem.mp4.enc"));
        assert_eq!(paths.encrypted_thumbnail, Path::new("/rec/stem.jpg.enc"));
    }

    #[test]
    fn test_ids_sort_by_creation() {
        let mut clock = SegmentClock::new();
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 9, 59, 59).unwrap();
        let t1 = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 29).unwrap();

        let a = clock.next_id(t0);
        let b = clock.next_id(t0);
        let c = clock.next_id(t1);

        assert_ne!(a, b);
        assert!(a < b && b < c);
        assert!(a.starts_with("2024-05-01-09-59-59-000"));
    }

    #[test]
    fn test_close_preserves_read_state() {
        let now = Utc::now();
        let mut segment = Segment::open(
            "s1".to_string(),
            Path::new("/rec"),
            KeyMaterial::generate().unwrap(),
            "dest".to_string(),
            now,
        );
        assert!(!segment.was_key_read());
        segment.mark_read();

        let snapshot = segment.close(now);
        assert!(snapshot.was_key_read());
        assert_eq!(snapshot.video_key(), "dest.mp4");
        assert_eq!(snapshot.thumbnail_key(), "dest.jpg");
    }

    #[tokio::test]
    async fn test_sweep_only_removes_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.h264", "a.mp4", "a.jpg", "a.mp4.enc", "a.jpg.enc"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::write(dir.path().join("notes.txt"), b"keep").unwrap();
        std::fs::create_dir(dir.path().join("nested.mp4")).unwrap();

        let erased = sweep(dir.path(), &UnlinkEraser).await.unwrap();
        assert_eq!(erased, 5);
        assert!(dir.path().join("notes.txt").exists());
        assert!(dir.path().join("nested.mp4").exists());
    }

    #[tokio::test]
    async fn test_sweep_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let erased = sweep(&dir.path().join("absent"), &UnlinkEraser)
            .await
            .unwrap();
        assert_eq!(erased, 0);
    }
}
