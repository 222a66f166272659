//! Transparency module for the CryptoCam agent.
//!
//! Tracks and exposes what the device does with what it records.

pub mod log;

// Re-export commonly used types
pub use log::{
    create_shared_log, create_shared_log_with_persistence, read_persisted, PersistedStats,
    SharedTransparencyLog, TransparencyLog, TransparencyStats,
};
