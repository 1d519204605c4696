// ABOUTME: AES-256-GCM sealing helpers for secrets persisted in the credential store
// ABOUTME: Handles data key loading/generation and nonce-prepended ciphertext encoding
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! Encryption-at-rest for stored warehouse passwords.
//!
//! Each sealed value carries its own random nonce prepended to the
//! ciphertext, base64-encoded for storage in a TEXT column.

use crate::errors::{AppError, AppResult};
use base64::{engine::general_purpose, Engine as _};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use ring::rand::{SecureRandom, SystemRandom};
use tracing::warn;

/// Nonce length for AES-256-GCM
const NONCE_LEN: usize = 12;

/// Environment variable holding the base64-encoded 32-byte data key
const DATA_KEY_ENV: &str = "JORDI_DATA_KEY";

/// Generate a random 32-byte data key
#[must_use]
pub fn generate_data_key() -> [u8; 32] {
    use rand::Rng;
    let mut key = [0u8; 32];
    rand::thread_rng().fill(&mut key);
    key
}

/// Load the data key from the environment, or generate an ephemeral one.
///
/// An ephemeral key means sealed values do not survive a restart; that is
/// acceptable for development but logged loudly so operators notice.
#[must_use]
pub fn load_data_key_from_env() -> Vec<u8> {
    match std::env::var(DATA_KEY_ENV) {
        Ok(encoded) => match general_purpose::STANDARD.decode(encoded.trim()) {
            Ok(key) if key.len() == 32 => key,
            Ok(key) => {
                warn!(
                    "{} must decode to 32 bytes (got {}), generating ephemeral key",
                    DATA_KEY_ENV,
                    key.len()
                );
                generate_data_key().to_vec()
            }
            Err(e) => {
                warn!("{} is not valid base64 ({e}), generating ephemeral key", DATA_KEY_ENV);
                generate_data_key().to_vec()
            }
        },
        Err(_) => {
            warn!("{} not set, stored credentials will not survive restart", DATA_KEY_ENV);
            generate_data_key().to_vec()
        }
    }
}

/// Seal a plaintext value with AES-256-GCM.
///
/// The random nonce is prepended to the ciphertext and the whole blob is
/// base64-encoded.
///
/// # Errors
///
/// Returns an error if the key is invalid or the RNG fails.
pub fn seal(plaintext: &str, key: &[u8]) -> AppResult<String> {
    let rng = SystemRandom::new();
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rng.fill(&mut nonce_bytes)
        .map_err(|_| AppError::internal("System RNG failure while sealing secret"))?;
    let nonce = Nonce::assume_unique_for_key(nonce_bytes);

    let unbound_key = UnboundKey::new(&AES_256_GCM, key)
        .map_err(|_| AppError::internal("Invalid data key length for AES-256-GCM"))?;
    let sealing_key = LessSafeKey::new(unbound_key);

    let mut data = plaintext.as_bytes().to_vec();
    sealing_key
        .seal_in_place_append_tag(nonce, Aad::empty(), &mut data)
        .map_err(|_| AppError::internal("Failed to seal secret"))?;

    let mut combined = nonce_bytes.to_vec();
    combined.extend(data);
    Ok(general_purpose::STANDARD.encode(combined))
}

/// Open a value sealed by [`seal`].
///
/// # Errors
///
/// Returns an error if the blob is malformed, the key is wrong, or the
/// ciphertext fails authentication.
pub fn open(sealed: &str, key: &[u8]) -> AppResult<String> {
    let combined = general_purpose::STANDARD
        .decode(sealed)
        .map_err(|e| AppError::invalid_input(format!("Sealed value is not valid base64: {e}")))?;

    if combined.len() < NONCE_LEN {
        return Err(AppError::invalid_input("Sealed value too short"));
    }

    let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
    let nonce_array: [u8; NONCE_LEN] = nonce_bytes
        .try_into()
        .map_err(|_| AppError::invalid_input("Sealed value nonce is malformed"))?;
    let nonce = Nonce::assume_unique_for_key(nonce_array);

    let unbound_key = UnboundKey::new(&AES_256_GCM, key)
        .map_err(|_| AppError::internal("Invalid data key length for AES-256-GCM"))?;
    let opening_key = LessSafeKey::new(unbound_key);

    let mut data = ciphertext.to_vec();
    let plaintext = opening_key
        .open_in_place(nonce, Aad::empty(), &mut data)
        .map_err(|_| AppError::invalid_input("Failed to open sealed value (wrong key?)"))?;

    String::from_utf8(plaintext.to_vec())
        .map_err(|e| AppError::internal(format!("Sealed value is not valid UTF-8: {e}")))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_seal_open_round_trip() {
        let key = generate_data_key();
        let sealed = seal("hunter2", &key).unwrap();
        assert_ne!(sealed, "hunter2");
        assert_eq!(open(&sealed, &key).unwrap(), "hunter2");
    }

    #[test]
    fn test_open_with_wrong_key_fails() {
        let key = generate_data_key();
        let other = generate_data_key();
        let sealed = seal("hunter2", &key).unwrap();
        assert!(open(&sealed, &other).is_err());
    }

    #[test]
    fn test_nonces_are_unique_per_seal() {
        let key = generate_data_key();
        let a = seal("same", &key).unwrap();
        let b = seal("same", &key).unwrap();
        assert_ne!(a, b);
    }
}
