// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Secure Storage Module
//!
//! Keychain abstraction for private keys and topic symmetric keys. Hosts
//! plug in their platform keychain; two implementations ship here: an
//! in-memory one and one that seals every entry before handing it to a
//! [`KeyValueStore`].

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{KeyValueStore, StorageError};
use crate::crypto::SymmetricKey;

/// Trait for secure storage of cryptographic keys.
pub trait SecureStorage: Send + Sync {
    /// Saves a key to secure storage.
    fn save_key(&self, name: &str, key: &[u8]) -> Result<(), StorageError>;

    /// Loads a key from secure storage.
    /// Returns None if the key doesn't exist.
    fn load_key(&self, name: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Deletes a key from secure storage. Deleting a missing key is not an error.
    fn delete_key(&self, name: &str) -> Result<(), StorageError>;

    /// Checks if a key exists in secure storage.
    fn has_key(&self, name: &str) -> Result<bool, StorageError> {
        Ok(self.load_key(name)?.is_some())
    }
}

/// Process-local keychain. Keys vanish with the process.
#[derive(Default)]
pub struct MemoryKeychain {
    keys: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryKeychain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.keys.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.lock().is_empty()
    }
}

impl SecureStorage for MemoryKeychain {
    fn save_key(&self, name: &str, key: &[u8]) -> Result<(), StorageError> {
        self.keys.lock().insert(name.to_string(), key.to_vec());
        Ok(())
    }

    fn load_key(&self, name: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.keys.lock().get(name).cloned())
    }

    fn delete_key(&self, name: &str) -> Result<(), StorageError> {
        self.keys.lock().remove(name);
        Ok(())
    }
}

/// Keychain persisted in a key-value store, each entry sealed with a
/// storage key held by the host.
pub struct EncryptedKeychain {
    store: Arc<dyn KeyValueStore>,
    encryption_key: SymmetricKey,
}

const KEYCHAIN_PREFIX: &str = "keychain/";

impl EncryptedKeychain {
    pub fn new(store: Arc<dyn KeyValueStore>, encryption_key: SymmetricKey) -> Self {
        Self {
            store,
            encryption_key,
        }
    }

    fn entry_key(name: &str) -> String {
        format!("{}{}", KEYCHAIN_PREFIX, name)
    }
}

impl SecureStorage for EncryptedKeychain {
    fn save_key(&self, name: &str, key: &[u8]) -> Result<(), StorageError> {
        let sealed = crate::crypto::encrypt(&self.encryption_key, key)
            .map_err(|e| StorageError::Encryption(format!("Encryption failed: {}", e)))?;
        self.store.set(&Self::entry_key(name), &sealed)
    }

    fn load_key(&self, name: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let Some(sealed) = self.store.get(&Self::entry_key(name))? else {
            return Ok(None);
        };
        let key = crate::crypto::decrypt(&self.encryption_key, &sealed)
            .map_err(|e| StorageError::Encryption(format!("Decryption failed: {}", e)))?;
        Ok(Some(key))
    }

    fn delete_key(&self, name: &str) -> Result<(), StorageError> {
        self.store.delete(&Self::entry_key(name))
    }
}
