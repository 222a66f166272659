//! AES-256-CTR file encryption.
//!
//! Output is the same length as the input and carries no header; the key
//! and IV travel out of band through the credential channel. CTR mode is
//! symmetric, so decryption is the same keystream applied again.

use crate::keys::KeyMaterial;
use ctr::cipher::{KeyIvInit, StreamCipher};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use thiserror::Error;

type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;

const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
    #[error("keystream exhausted")]
    Keystream,
}

/// Encrypt `input` into `output` with the segment's key material.
///
/// Returns the number of bytes written.
pub fn encrypt_file(
    material: &KeyMaterial,
    input: &Path,
    output: &Path,
) -> Result<u64, CryptoError> {
    apply_keystream_file(material, input, output)
}

/// Decrypt a file produced by [`encrypt_file`].
pub fn decrypt_file(
    material: &KeyMaterial,
    input: &Path,
    output: &Path,
) -> Result<u64, CryptoError> {
    apply_keystream_file(material, input, output)
}

/// Apply the keystream to an in-memory buffer.
pub fn apply_keystream(material: &KeyMaterial, data: &mut [u8]) -> Result<(), CryptoError> {
    let mut cipher = Aes256Ctr::new(material.key().into(), material.iv().into());
    cipher
        .try_apply_keystream(data)
        .map_err(|_| CryptoError::Keystream)
}

fn apply_keystream_file(
    material: &KeyMaterial,
    input: &Path,
    output: &Path,
) -> Result<u64, CryptoError> {
    let read_err = |source| CryptoError::Read {
        path: input.display().to_string(),
        source,
    };
    let write_err = |source| CryptoError::Write {
        path: output.display().to_string(),
        source,
    };

    let mut reader = BufReader::new(File::open(input).map_err(read_err)?);
    let mut writer = BufWriter::new(File::create(output).map_err(write_err)?);
    let mut cipher = Aes256Ctr::new(material.key().into(), material.iv().into());

    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buffer).map_err(read_err)?;
        if n == 0 {
            break;
        }
        cipher
            .try_apply_keystream(&mut buffer[..n])
            .map_err(|_| CryptoError::Keystream)?;
        writer.write_all(&buffer[..n]).map_err(write_err)?;
        total += n as u64;
    }
    writer.flush().map_err(write_err)?;

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{IV_LEN, KEY_LEN};

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("clip.mp4");
        let sealed = dir.path().join("clip.mp4.enc");
        let opened = dir.path().join("clip.out.mp4");

        // Spans several chunks with a ragged tail.
        let data: Vec<u8> = (0..(CHUNK_SIZE * 3 + 17))
            .map(|i| (i % 251) as u8)
            .collect();
        std::fs::write(&plain, &data).unwrap();

        let material = KeyMaterial::generate().unwrap();
        let written = encrypt_file(&material, &plain, &sealed).unwrap();
        assert_eq!(written, data.len() as u64);

        let ciphertext = std::fs::read(&sealed).unwrap();
        assert_eq!(ciphertext.len(), data.len());
        assert_ne!(ciphertext, data);

        decrypt_file(&material, &sealed, &opened).unwrap();
        assert_eq!(std::fs::read(&opened).unwrap(), data);
    }

    #[test]
    fn test_chunked_matches_single_pass() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("a.jpg");
        let sealed = dir.path().join("a.jpg.enc");
        let data = vec![0x5au8; CHUNK_SIZE + 1];
        std::fs::write(&plain, &data).unwrap();

        let material = KeyMaterial::from_parts([3u8; KEY_LEN], [4u8; IV_LEN]);
        encrypt_file(&material, &plain, &sealed).unwrap();

        let mut in_memory = data.clone();
        apply_keystream(&material, &mut in_memory).unwrap();
        assert_eq!(std::fs::read(&sealed).unwrap(), in_memory);
    }

    #[test]
    fn test_different_iv_changes_ciphertext() {
        let mut a = vec![0u8; 64];
        let mut b = vec![0u8; 64];
        let first = KeyMaterial::from_parts([1u8; KEY_LEN], [0u8; IV_LEN]);
        let second = KeyMaterial::from_parts([1u8; KEY_LEN], [1u8; IV_LEN]);
        apply_keystream(&first, &mut a).unwrap();
        apply_keystream(&second, &mut b).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_missing_input_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let material = KeyMaterial::generate().unwrap();
        let err = encrypt_file(
            &material,
            &dir.path().join("missing.mp4"),
            &dir.path().join("out.enc"),
        )
        .unwrap_err();
        assert!(matches!(err, CryptoError::Read { .. }));
    }
}
