// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Key Management Service
//!
//! Owns keypair generation, key agreement and the binding of symmetric
//! keys to topics. All key material lives in the injected keychain and is
//! never handed to the transport.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::crypto::{AgreementKeys, EncryptionError, KeyPair, PublicKey, SymmetricKey};
use crate::storage::{SecureStorage, StorageError};

/// Key management error types.
#[derive(Error, Debug)]
pub enum KmsError {
    #[error("Key agreement missing or invalid: {0}")]
    AgreementMissingOrInvalid(String),

    #[error("Corrupted key material: {0}")]
    CorruptedKey(String),

    #[error("Encryption error: {0}")]
    Encryption(#[from] EncryptionError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

fn private_key_name(public_key: &PublicKey) -> String {
    format!("privkey/{}", public_key.to_hex())
}

fn sym_key_name(topic: &str) -> String {
    format!("symkey/{}", topic)
}

fn public_key_name(topic: &str) -> String {
    format!("pubkey/{}", topic)
}

/// Keychain-backed key management.
pub struct KeyManagementService {
    keychain: Arc<dyn SecureStorage>,
}

impl KeyManagementService {
    pub fn new(keychain: Arc<dyn SecureStorage>) -> Self {
        KeyManagementService { keychain }
    }

    /// Generates a keypair, stores the private half and returns the public half.
    pub fn create_key_pair(&self) -> Result<PublicKey, KmsError> {
        let pair = KeyPair::generate();
        let public_key = pair.public_key();
        self.keychain
            .save_key(&private_key_name(&public_key), &pair.secret_bytes())?;
        Ok(public_key)
    }

    /// Generates a fresh symmetric key (not yet bound to a topic).
    pub fn create_sym_key(&self) -> Result<SymmetricKey, KmsError> {
        Ok(SymmetricKey::generate()?)
    }

    fn private_key(&self, public_key: &PublicKey) -> Result<Option<KeyPair>, KmsError> {
        let Some(raw) = self.keychain.load_key(&private_key_name(public_key))? else {
            return Ok(None);
        };
        let bytes: [u8; 32] = raw
            .try_into()
            .map_err(|_| KmsError::CorruptedKey(format!("private key for {}", public_key)))?;
        Ok(Some(KeyPair::from_secret_bytes(bytes)))
    }

    /// Derives the shared key between our `self_public_key` and `peer_public_key`
    /// (64 hex chars).
    pub fn perform_key_agreement(
        &self,
        self_public_key: &PublicKey,
        peer_public_key: &str,
    ) -> Result<AgreementKeys, KmsError> {
        let peer: PublicKey = peer_public_key.parse().map_err(|e: EncryptionError| {
            KmsError::AgreementMissingOrInvalid(format!("peer key: {}", e))
        })?;
        let pair = self.private_key(self_public_key)?.ok_or_else(|| {
            KmsError::AgreementMissingOrInvalid(format!("no private key for {}", self_public_key))
        })?;
        Ok(pair.agree(&peer))
    }

    /// Binds agreement keys to `topic`: the shared key for sealing and our
    /// public key for type 1 envelopes.
    pub fn set_agreement_secret(&self, keys: &AgreementKeys, topic: &str) -> Result<(), KmsError> {
        self.set_sym_key(&keys.shared_key, topic)?;
        self.set_public_key(&keys.public_key, topic)?;
        debug!(topic = %topic, "agreement secret bound");
        Ok(())
    }

    pub fn set_sym_key(&self, key: &SymmetricKey, topic: &str) -> Result<(), KmsError> {
        self.keychain.save_key(&sym_key_name(topic), key.as_bytes())?;
        Ok(())
    }

    pub fn get_sym_key(&self, topic: &str) -> Result<Option<SymmetricKey>, KmsError> {
        let Some(raw) = self.keychain.load_key(&sym_key_name(topic))? else {
            return Ok(None);
        };
        let bytes: [u8; 32] = raw
            .try_into()
            .map_err(|_| KmsError::CorruptedKey(format!("sym key for {}", topic)))?;
        Ok(Some(SymmetricKey::from_bytes(bytes)))
    }

    pub fn set_public_key(&self, public_key: &PublicKey, topic: &str) -> Result<(), KmsError> {
        self.keychain
            .save_key(&public_key_name(topic), public_key.as_bytes())?;
        Ok(())
    }

    pub fn get_public_key(&self, topic: &str) -> Result<Option<PublicKey>, KmsError> {
        let Some(raw) = self.keychain.load_key(&public_key_name(topic))? else {
            return Ok(None);
        };
        let bytes: [u8; 32] = raw
            .try_into()
            .map_err(|_| KmsError::CorruptedKey(format!("public key for {}", topic)))?;
        Ok(Some(PublicKey::from_bytes(bytes)))
    }

    pub fn has_private_key(&self, public_key: &PublicKey) -> Result<bool, KmsError> {
        Ok(self.keychain.has_key(&private_key_name(public_key))?)
    }

    pub fn delete_sym_key(&self, topic: &str) -> Result<(), KmsError> {
        self.keychain.delete_key(&sym_key_name(topic))?;
        Ok(())
    }

    pub fn delete_private_key(&self, public_key: &PublicKey) -> Result<(), KmsError> {
        self.keychain.delete_key(&private_key_name(public_key))?;
        Ok(())
    }

    pub fn delete_public_key(&self, topic: &str) -> Result<(), KmsError> {
        self.keychain.delete_key(&public_key_name(topic))?;
        Ok(())
    }

    /// Removes everything bound to `topic`.
    pub fn delete_topic_keys(&self, topic: &str) -> Result<(), KmsError> {
        self.delete_sym_key(topic)?;
        self.delete_public_key(topic)
    }
}
