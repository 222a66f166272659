//! Credential channel: the boundary to the wireless peripheral that
//! discloses the active segment's key to one nearby peer at a time.
//!
//! The peripheral pushes [`PeerEvent`]s into the agent. Reads carry a
//! reply slot that the agent fills synchronously from the last published
//! value, so there is no shared mutable state between the radio side and
//! the rotation controller.

pub mod bridge;
pub mod loopback;

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use zeroize::Zeroizing;

pub use bridge::{Advertisement, PeripheralBridge};
pub use loopback::LoopbackChannel;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Failed to bind peripheral socket {path}: {source}")]
    Bind {
        path: String,
        source: std::io::Error,
    },
}

/// Signals raised by the peripheral.
#[derive(Debug)]
pub enum PeerEvent {
    /// A peer connected
    Connect { peer: Option<String> },
    /// A peer requested the key value starting at `offset`
    Read {
        offset: usize,
        reply: oneshot::Sender<Vec<u8>>,
    },
    /// The peer went away
    Disconnect,
}

/// Receiving end of the peripheral's event stream.
pub type PeerEvents = mpsc::UnboundedReceiver<PeerEvent>;

/// Operations the agent performs on the peripheral.
pub trait CredentialChannel: Send + Sync {
    /// Replace the value served to reading peers.
    fn set_current_value(&self, value: &[u8]);

    /// Drop the currently connected peer, if any.
    fn force_disconnect(&self);
}

pub type SharedChannel = Arc<dyn CredentialChannel>;

/// The readable key attribute.
///
/// Holds the last published payload and answers offset reads, so payloads
/// larger than one transfer unit can be fetched in several packets. The
/// previous payload is wiped when replaced.
#[derive(Clone, Default)]
pub struct KeyCharacteristic {
    value: Zeroizing<Vec<u8>>,
}

impl KeyCharacteristic {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, value: &[u8]) {
        self.value = Zeroizing::new(value.to_vec());
    }

    /// Bytes from `offset` to the end. Offsets past the end yield nothing.
    pub fn read(&self, offset: usize) -> Vec<u8> {
        self.value
            .get(offset..)
            .map(<[u8]>::to_vec)
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for KeyCharacteristic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyCharacteristic")
            .field("len", &self.value.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_reads() {
        let mut characteristic = KeyCharacteristic::new();
        assert!(characteristic.read(0).is_empty());

        characteristic.update(b"0123456789");
        assert_eq!(characteristic.read(0), b"0123456789");
        assert_eq!(characteristic.read(4), b"456789");
        assert!(characteristic.read(10).is_empty());
        assert!(characteristic.read(99).is_empty());
    }

    #[test]
    fn test_debug_hides_value() {
        let mut characteristic = KeyCharacteristic::new();
        characteristic.update(b"secret-key-bytes");
        let debug = format!("{characteristic:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("16"));
    }

    #[test]
    fn test_chunked_reassembly() {
        let payload: Vec<u8> = (0..200u8).collect();
        let mut characteristic = KeyCharacteristic::new();
        characteristic.update(&payload);

        // 20-byte transfer unit, as on a default BLE MTU.
        let mut assembled = Vec::new();
        loop {
            let chunk = characteristic.read(assembled.len());
            if chunk.is_empty() {
                break;
            }
            assembled.extend_from_slice(&chunk[..chunk.len().min(20)]);
        }
        assert_eq!(assembled, payload);
    }
}
