//! Per-segment key material and the payload disclosed to peers.
//!
//! Every segment gets a fresh 32-byte key and 16-byte IV drawn from the
//! operating system RNG. A failing entropy source is surfaced as
//! [`KeyError::Entropy`]; there is no fallback generator.

use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Key length in bytes (AES-256).
pub const KEY_LEN: usize = 32;

/// IV length in bytes (one AES block).
pub const IV_LEN: usize = 16;

/// Identifier of the cipher advertised to peers.
pub const ALGORITHM: &str = "aes-256-ctr";

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("entropy source unavailable: {0}")]
    Entropy(String),
}

/// Where key bytes come from.
///
/// Any cryptographically secure RNG qualifies. The agent uses [`OsRng`].
pub trait EntropySource: Send {
    fn try_fill(&mut self, dest: &mut [u8]) -> Result<(), rand::Error>;
}

impl<R: RngCore + CryptoRng + Send> EntropySource for R {
    fn try_fill(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.try_fill_bytes(dest)
    }
}

/// A segment's symmetric key and IV.
///
/// Wiped from memory on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial {
    key: [u8; KEY_LEN],
    iv: [u8; IV_LEN],
}

impl KeyMaterial {
    /// Draw a fresh key/IV pair from the OS RNG.
    pub fn generate() -> Result<Self, KeyError> {
        Self::generate_from(&mut OsRng)
    }

    pub fn generate_from(source: &mut dyn EntropySource) -> Result<Self, KeyError> {
        let mut material = Self {
            key: [0u8; KEY_LEN],
            iv: [0u8; IV_LEN],
        };
        source
            .try_fill(&mut material.key)
            .map_err(|e| KeyError::Entropy(e.to_string()))?;
        source
            .try_fill(&mut material.iv)
            .map_err(|e| KeyError::Entropy(e.to_string()))?;
        Ok(material)
    }

    /// Build key material from known bytes (decryption side).
    pub fn from_parts(key: [u8; KEY_LEN], iv: [u8; IV_LEN]) -> Self {
        Self { key, iv }
    }

    /// Parse hex-encoded key and IV as printed in a disclosed payload.
    pub fn from_hex(key: &str, iv: &str) -> Result<Self, hex::FromHexError> {
        let mut material = Self {
            key: [0u8; KEY_LEN],
            iv: [0u8; IV_LEN],
        };
        hex::decode_to_slice(key.trim(), &mut material.key)?;
        hex::decode_to_slice(iv.trim(), &mut material.iv)?;
        Ok(material)
    }

    pub fn key(&self) -> &[u8; KEY_LEN] {
        &self.key
    }

    pub fn iv(&self) -> &[u8; IV_LEN] {
        &self.iv
    }

    pub fn key_hex(&self) -> String {
        hex::encode(self.key)
    }

    pub fn iv_hex(&self) -> String {
        hex::encode(self.iv)
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("key", &"<redacted>")
            .field("iv", &"<redacted>")
            .finish()
    }
}

/// Mint an unguessable destination identifier for a segment's uploads.
pub fn mint_destination() -> String {
    Uuid::new_v4().to_string()
}

/// Payload pushed into the credential channel for the active segment.
///
/// Holds the key in clear text. Callers wipe it with
/// [`Zeroize::zeroize`] once the bytes are published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize)]
#[serde(rename_all = "camelCase")]
pub struct DisclosedKey {
    /// Hex-encoded key
    pub key: String,
    /// Hex-encoded IV
    pub iv: String,
    pub algorithm: String,
    /// Object store key prefix for this segment
    pub destination: String,
    /// Public URL the ciphertext will appear under, without extension
    pub url: String,
    /// Milliseconds until the next key becomes available
    pub reconnect_in: u64,
}

impl DisclosedKey {
    pub fn new(
        material: &KeyMaterial,
        destination: &str,
        base_url: &str,
        reconnect_in: Duration,
    ) -> Self {
        Self {
            key: material.key_hex(),
            iv: material.iv_hex(),
            algorithm: ALGORITHM.to_string(),
            destination: destination.to_string(),
            url: join_url(base_url, destination),
            reconnect_in: reconnect_in.as_millis() as u64,
        }
    }

    /// Serialised bytes served to reading peers.
    pub fn to_bytes(&self) -> Zeroizing<Vec<u8>> {
        // Serialising a struct of strings and integers cannot fail.
        Zeroizing::new(serde_json::to_vec(self).unwrap_or_default())
    }

    /// Copy with key and IV blanked out, for logging.
    pub fn redacted(&self) -> Self {
        Self {
            key: "<redacted>".to_string(),
            iv: "<redacted>".to_string(),
            ..self.clone()
        }
    }
}

fn join_url(base: &str, destination: &str) -> String {
    if base.is_empty() {
        destination.to_string()
    } else if base.ends_with('/') {
        format!("{base}{destination}")
    } else {
        format!("{base}/{destination}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generated_material_is_unique() {
        let mut seen = HashSet::new();
        for _ in 0..1000 {
            let material = KeyMaterial::generate().unwrap();
            assert!(seen.insert((*material.key(), *material.iv())));
        }
    }

    /// Hands out `remaining` fills, then fails.
    struct FailingAfter {
        remaining: usize,
    }

    impl RngCore for FailingAfter {
        fn next_u32(&mut self) -> u32 {
            0
        }

        fn next_u64(&mut self) -> u64 {
            0
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            self.try_fill_bytes(dest).unwrap();
        }

        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
            if self.remaining == 0 {
                return Err(rand::Error::new("entropy pool drained"));
            }
            self.remaining -= 1;
            dest.fill(0xA5);
            Ok(())
        }
    }

    impl CryptoRng for FailingAfter {}

    #[test]
    fn test_entropy_failure_is_reported() {
        let err = KeyMaterial::generate_from(&mut FailingAfter { remaining: 0 }).unwrap_err();
        assert!(matches!(
            err,
            KeyError::Entropy(ref message) if message.contains("drained")
        ));

        // Key succeeds but the IV draw fails.
        let err = KeyMaterial::generate_from(&mut FailingAfter { remaining: 1 }).unwrap_err();
        assert!(matches!(err, KeyError::Entropy(_)));

        let material = KeyMaterial::generate_from(&mut FailingAfter { remaining: 2 }).unwrap();
        assert_eq!(material.key(), &[0xA5; KEY_LEN]);
    }

    #[test]
    fn test_zeroized_payload_drops_key() {
        let material = KeyMaterial::from_parts([3u8; KEY_LEN], [4u8; IV_LEN]);
        let mut payload = DisclosedKey::new(&material, "dest", "", Duration::from_secs(1));
        payload.zeroize();
        assert!(payload.key.is_empty());
        assert!(payload.iv.is_empty());
    }

    #[test]
    fn test_hex_round_trip() {
        let material = KeyMaterial::generate().unwrap();
        let parsed = KeyMaterial::from_hex(&material.key_hex(), &material.iv_hex()).unwrap();
        assert_eq!(parsed, material);
    }

    #[test]
    fn test_from_hex_rejects_wrong_length() {
        assert!(KeyMaterial::from_hex("abcd", &"00".repeat(IV_LEN)).is_err());
    }

    #[test]
    fn test_debug_redacts_key() {
        let material = KeyMaterial::from_parts([7u8; KEY_LEN], [9u8; IV_LEN]);
        let debug = format!("{material:?}");
        assert!(!debug.contains(&material.key_hex()));
        assert!(debug.contains("redacted"));
    }

    #[test]
    fn test_disclosed_payload_shape() {
        let material = KeyMaterial::from_parts([1u8; KEY_LEN], [2u8; IV_LEN]);
        let payload = DisclosedKey::new(
            &material,
            "dest-1",
            "https://bucket.example/",
            Duration::from_secs(30),
        );
        let json: serde_json::Value = serde_json::from_slice(&payload.to_bytes()).unwrap();
        assert_eq!(json["key"], "01".repeat(KEY_LEN));
        assert_eq!(json["iv"], "02".repeat(IV_LEN));
        assert_eq!(json["algorithm"], ALGORITHM);
        assert_eq!(json["destination"], "dest-1");
        assert_eq!(json["url"], "https://bucket.example/dest-1");
        assert_eq!(json["reconnectIn"], 30_000);
    }

    #[test]
    fn test_join_url_without_trailing_slash() {
        assert_eq!(join_url("https://a.b/c", "d"), "https://a.b/c/d");
        assert_eq!(join_url("", "d"), "d");
    }
}
