// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Envelope Serializer
//!
//! Seals JSON payloads with the symmetric key bound to a topic and frames
//! them for the relay.
//!
//! Wire format (base64 of):
//! - type 0: `0x00 || iv (12) || ciphertext || tag (16)`
//! - type 1: `0x01 || sender public key (32) || iv (12) || ciphertext || tag (16)`
//!
//! Type 1 lets a peer that only knows our public key reach us: the
//! receiver derives the key from its own keypair bound to the topic and
//! the embedded sender key.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::crypto::{self, EncryptionError, PublicKey, SymmetricKey, IV_SIZE};
use crate::kms::{KeyManagementService, KmsError};

/// Serializer error types.
#[derive(Error, Debug)]
pub enum SerializerError {
    #[error("No symmetric key for topic {0}")]
    SymKeyNotFound(String),

    #[error("No public key bound to topic {0}")]
    PublicKeyNotFound(String),

    #[error("Unknown envelope type {0}")]
    UnknownEnvelopeType(u8),

    #[error("Malformed envelope: {0}")]
    Malformed(String),

    #[error("Encryption error: {0}")]
    Encryption(#[from] EncryptionError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Key management error: {0}")]
    Kms(#[from] KmsError),
}

/// Envelope framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeType {
    Type0,
    Type1 { sender_public_key: PublicKey },
}

impl EnvelopeType {
    fn tag(&self) -> u8 {
        match self {
            EnvelopeType::Type0 => 0,
            EnvelopeType::Type1 { .. } => 1,
        }
    }
}

const PUBLIC_KEY_SIZE: usize = 32;

/// Topic-keyed envelope codec.
pub struct Serializer {
    kms: Arc<KeyManagementService>,
}

impl Serializer {
    pub fn new(kms: Arc<KeyManagementService>) -> Self {
        Serializer { kms }
    }

    fn sym_key(&self, topic: &str) -> Result<SymmetricKey, SerializerError> {
        self.kms
            .get_sym_key(topic)?
            .ok_or_else(|| SerializerError::SymKeyNotFound(topic.to_string()))
    }

    /// JSON-encodes `payload`, seals it with the key bound to `topic` and frames it.
    pub fn serialize<T: Serialize>(
        &self,
        topic: &str,
        payload: &T,
        envelope: EnvelopeType,
    ) -> Result<String, SerializerError> {
        let key = self.sym_key(topic)?;
        let plaintext = serde_json::to_vec(payload)?;
        let sealed = crypto::encrypt(&key, &plaintext)?;

        let mut frame = Vec::with_capacity(1 + PUBLIC_KEY_SIZE + sealed.len());
        frame.push(envelope.tag());
        if let EnvelopeType::Type1 { sender_public_key } = envelope {
            frame.extend_from_slice(sender_public_key.as_bytes());
        }
        frame.extend_from_slice(&sealed);
        Ok(BASE64.encode(frame))
    }

    /// Reverses [`Self::serialize`]. Returns the sender key for type 1 envelopes.
    pub fn deserialize<T: DeserializeOwned>(
        &self,
        topic: &str,
        wire: &str,
    ) -> Result<(T, Option<PublicKey>), SerializerError> {
        let frame = BASE64
            .decode(wire)
            .map_err(|e| SerializerError::Malformed(e.to_string()))?;
        let (&tag, body) = frame
            .split_first()
            .ok_or_else(|| SerializerError::Malformed("empty envelope".into()))?;

        let (plaintext, sender) = match tag {
            0 => (crypto::decrypt(&self.sym_key(topic)?, body)?, None),
            1 => {
                if body.len() < PUBLIC_KEY_SIZE + IV_SIZE {
                    return Err(SerializerError::Malformed("type 1 envelope too short".into()));
                }
                let (sender_bytes, sealed) = body.split_at(PUBLIC_KEY_SIZE);
                let mut raw = [0u8; PUBLIC_KEY_SIZE];
                raw.copy_from_slice(sender_bytes);
                let sender = PublicKey::from_bytes(raw);

                let receiver = self
                    .kms
                    .get_public_key(topic)?
                    .ok_or_else(|| SerializerError::PublicKeyNotFound(topic.to_string()))?;
                let keys = self.kms.perform_key_agreement(&receiver, &sender.to_hex())?;
                (crypto::decrypt(&keys.shared_key, sealed)?, Some(sender))
            }
            other => return Err(SerializerError::UnknownEnvelopeType(other)),
        };

        Ok((serde_json::from_slice(&plaintext)?, sender))
    }
}
