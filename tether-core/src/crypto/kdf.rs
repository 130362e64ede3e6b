// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! HKDF Key Derivation Function
//!
//! HMAC-SHA256 Extract-and-Expand (RFC 5869). Turns a raw X25519 shared
//! secret into the symmetric key bound to a session topic.

use ring::{digest, hmac};

/// HKDF-SHA256 key derivation.
pub struct HKDF;

impl HKDF {
    /// HKDF Extract: PRK = HMAC-SHA256(salt, IKM). Missing salt is HashLen zeros.
    pub fn extract(salt: Option<&[u8]>, ikm: &[u8]) -> [u8; 32] {
        let default_salt = [0u8; 32];
        let salt_bytes = salt.unwrap_or(&default_salt);
        let key = hmac::Key::new(hmac::HMAC_SHA256, salt_bytes);
        let tag = hmac::sign(&key, ikm);
        let mut prk = [0u8; 32];
        prk.copy_from_slice(tag.as_ref());
        prk
    }

    /// HKDF Expand for a single 32-byte block: T(1) = HMAC(PRK, info || 0x01).
    pub fn expand_key(prk: &[u8; 32], info: &[u8]) -> [u8; 32] {
        let key = hmac::Key::new(hmac::HMAC_SHA256, prk);
        let mut input = Vec::with_capacity(info.len() + 1);
        input.extend_from_slice(info);
        input.push(1u8);

        let tag = hmac::sign(&key, &input);
        let mut okm = [0u8; 32];
        okm.copy_from_slice(tag.as_ref());
        okm
    }

    /// Derives a fixed-size 32-byte key.
    pub fn derive_key(salt: Option<&[u8]>, ikm: &[u8], info: &[u8]) -> [u8; 32] {
        let prk = Self::extract(salt, ikm);
        Self::expand_key(&prk, info)
    }
}

/// SHA-256 of `data`, hex encoded. Topics are the hash of their key material.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(digest::digest(&digest::SHA256, data).as_ref())
}
