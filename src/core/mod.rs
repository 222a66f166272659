//! Core of the CryptoCam agent.
//!
//! This module contains:
//! - Segments and their on-disk artifacts
//! - The read-once gate guarding each segment's key
//! - The rotation controller driving the record/disclose cycle
//! - The processing pipeline for segments whose key was read

pub mod gate;
pub mod pipeline;
pub mod rotation;
pub mod segment;

// Re-export commonly used types
pub use gate::{GateState, ReadEffect, ReadOnceGate, TimerKind, TimerToken};
pub use pipeline::{ArtifactOutcome, JobFiles, JobReport, Pipeline, Stage, StageStatus};
pub use rotation::{Handoff, RotationController, RotationSettings};
pub use segment::{sweep, ArtifactPaths, Segment, SegmentClock, SegmentSnapshot};
