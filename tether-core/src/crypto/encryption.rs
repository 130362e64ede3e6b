// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Symmetric Encryption (ChaCha20-Poly1305)
//!
//! Authenticated encryption used for per-topic envelopes and for keys at rest.
//!
//! Sealed format: `iv (12 bytes) || ciphertext || tag (16 bytes)`

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use ring::rand::{SecureRandom, SystemRandom};
use thiserror::Error;
use zeroize::Zeroize;

/// Encryption error types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncryptionError {
    #[error("Encryption failed")]
    EncryptionFailed,
    #[error("Decryption failed: data may be corrupted or wrong key")]
    DecryptionFailed,
    #[error("Ciphertext too short")]
    CiphertextTooShort,
    #[error("Invalid key material: {0}")]
    InvalidKey(String),
}

/// Nonce size for ChaCha20-Poly1305 (96 bits = 12 bytes).
pub const IV_SIZE: usize = 12;
/// Authentication tag size.
pub const TAG_SIZE: usize = 16;

/// 256-bit symmetric encryption key.
#[derive(Clone, PartialEq, Eq)]
pub struct SymmetricKey {
    bytes: [u8; 32],
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Don't expose key bytes in debug output
        f.debug_struct("SymmetricKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

impl Drop for SymmetricKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl SymmetricKey {
    /// Generates a new random symmetric key.
    pub fn generate() -> Result<Self, EncryptionError> {
        let rng = SystemRandom::new();
        let key = ring::rand::generate::<[u8; 32]>(&rng)
            .map_err(|_| EncryptionError::InvalidKey("system RNG failure".into()))?
            .expose();
        Ok(SymmetricKey { bytes: key })
    }

    /// Creates a key from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        SymmetricKey { bytes }
    }

    /// Parses a key from its lowercase hex form.
    pub fn from_hex(hex_str: &str) -> Result<Self, EncryptionError> {
        let raw = hex::decode(hex_str).map_err(|e| EncryptionError::InvalidKey(e.to_string()))?;
        let bytes: [u8; 32] = raw
            .try_into()
            .map_err(|_| EncryptionError::InvalidKey("expected 32 bytes".into()))?;
        Ok(SymmetricKey { bytes })
    }

    /// Returns a reference to the key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// Hex encoding, as carried in pairing URIs.
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// Topic addressed by this key: lowercase hex of its SHA-256.
    pub fn derive_topic(&self) -> String {
        super::kdf::sha256_hex(&self.bytes)
    }
}

/// Encrypts data with a fresh random IV.
///
/// Output format: `iv (12 bytes) || ciphertext || tag (16 bytes)`
pub fn encrypt(key: &SymmetricKey, plaintext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
    let rng = SystemRandom::new();

    let mut iv = [0u8; IV_SIZE];
    rng.fill(&mut iv)
        .map_err(|_| EncryptionError::EncryptionFailed)?;

    let sealed = seal(key, &iv, plaintext)?;

    let mut output = Vec::with_capacity(IV_SIZE + sealed.len());
    output.extend_from_slice(&iv);
    output.extend_from_slice(&sealed);
    Ok(output)
}

/// Decrypts `iv || ciphertext || tag`.
pub fn decrypt(key: &SymmetricKey, data: &[u8]) -> Result<Vec<u8>, EncryptionError> {
    if data.len() < IV_SIZE + TAG_SIZE {
        return Err(EncryptionError::CiphertextTooShort);
    }
    let (iv, sealed) = data.split_at(IV_SIZE);
    open(key, iv, sealed)
}

/// Seals a plaintext under an explicit IV.
pub fn seal(key: &SymmetricKey, iv: &[u8; IV_SIZE], plaintext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
    let cipher = ChaCha20Poly1305::new(key.as_bytes().into());
    cipher
        .encrypt(Nonce::from_slice(iv), plaintext)
        .map_err(|_| EncryptionError::EncryptionFailed)
}

/// Opens `ciphertext || tag` under an explicit IV.
pub fn open(key: &SymmetricKey, iv: &[u8], sealed: &[u8]) -> Result<Vec<u8>, EncryptionError> {
    if iv.len() != IV_SIZE {
        return Err(EncryptionError::CiphertextTooShort);
    }
    if sealed.len() < TAG_SIZE {
        return Err(EncryptionError::CiphertextTooShort);
    }
    let cipher = ChaCha20Poly1305::new(key.as_bytes().into());
    cipher
        .decrypt(Nonce::from_slice(iv), sealed)
        .map_err(|_| EncryptionError::DecryptionFailed)
}
