//! CryptoCam Agent - privacy-first recording for unattended cameras.
//!
//! The camera records continuously in fixed-length segments. Each segment
//! is encrypted under its own key, and that key is offered exactly once to
//! a nearby peer over a short-range wireless link. A segment is only
//! processed and uploaded if somebody actually read its key; otherwise the
//! recording is deleted on the device.
//!
//! # Privacy Guarantees
//!
//! - **Read-once keys**: Each key is disclosed to the first reader, after
//!   which the link is closed
//! - **No silent uploads**: Segments whose key nobody read never leave the
//!   device
//! - **Ciphertext only**: Uploaded artifacts are encrypted with the
//!   segment key
//! - **No local retention**: Recordings and intermediates are erased after
//!   every segment and swept at startup
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       CryptoCam Agent                         │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐        │
//! │  │  Capture    │◀──│  Rotation   │──▶│ Credential  │◀── peer│
//! │  │ (raspivid)  │   │ Controller  │   │  Channel    │        │
//! │  └─────────────┘   └─────────────┘   └─────────────┘        │
//! │                      │   │    ▲            │                 │
//! │                      │   │    └── Read-Once Gate             │
//! │                      │   ▼                                   │
//! │                      │ ┌─────────────┐   ┌─────────────┐    │
//! │                      │ │  Pipeline   │──▶│   Object    │    │
//! │                      │ │ wrap/encrypt│   │   Store     │    │
//! │                      │ └─────────────┘   └─────────────┘    │
//! │                      ▼                                       │
//! │               ┌─────────────┐                                │
//! │               │Transparency │                                │
//! │               │    Log      │                                │
//! │               └─────────────┘                                │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use cryptocam_agent::keys::{DisclosedKey, KeyMaterial};
//! use std::time::Duration;
//!
//! let material = KeyMaterial::generate().expect("entropy source");
//! let payload = DisclosedKey::new(&material, "destination", "https://example.invalid/", Duration::from_secs(30));
//! println!("{}", String::from_utf8_lossy(&payload.redacted().to_bytes()));
//! ```

pub mod capture;
pub mod channel;
pub mod config;
pub mod core;
pub mod crypto;
pub mod erase;
pub mod error;
pub mod keys;
pub mod media;
pub mod storage;
pub mod transparency;

// Re-export key types at crate root for convenience
pub use config::Config;
pub use core::{Pipeline, RotationController, RotationSettings};
pub use error::AgentError;
pub use keys::{DisclosedKey, KeyMaterial};
pub use transparency::{SharedTransparencyLog, TransparencyLog, TransparencyStats};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Privacy declaration that can be displayed to passers-by and operators.
pub const PRIVACY_DECLARATION: &str = r#"
╔══════════════════════════════════════════════════════════════════╗
║                CRYPTOCAM - PRIVACY DECLARATION                   ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  This camera records video in short segments.                    ║
║                                                                  ║
║  ✓ WHAT HAPPENS TO A RECORDING:                                  ║
║    • Every segment is encrypted with its own key                 ║
║    • The key is offered to one nearby phone, once                ║
║    • Only if the key was read is the segment uploaded            ║
║    • Uploads are encrypted; only the key holder can view them    ║
║                                                                  ║
║  ✗ WHAT NEVER HAPPENS:                                           ║
║    • Unread recordings are never uploaded                        ║
║    • Keys are never stored or uploaded by the camera             ║
║    • Recordings are not kept on the device                       ║
║                                                                  ║
║  Local copies are erased after every segment and on startup.     ║
║                                                                  ║
║  You can view recording statistics anytime with:                 ║
║    cryptocam status                                              ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#;
