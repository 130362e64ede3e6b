// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Persistent Storage Module
//!
//! Durable key-value storage for sessions, pairings, proposals, verify
//! contexts and the RPC history, plus the keychain holding private and
//! symmetric keys.
//! Each write is crash-safe at the granularity of a single key.

#[cfg(feature = "testing")]
pub mod error;
#[cfg(not(feature = "testing"))]
mod error;

pub mod migration;
pub mod pairings;
pub mod proposals;
pub mod secure;
pub mod sessions;
pub mod verify_contexts;

pub use error::StorageError;
pub use pairings::PairingStore;
pub use proposals::ProposalStore;
pub use secure::{EncryptedKeychain, MemoryKeychain, SecureStorage};
pub use sessions::SessionStore;
pub use verify_contexts::VerifyContextStore;

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Byte-level persistent store.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Removes `key`. Removing a missing key is not an error.
    fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// All keys starting with `prefix`, sorted.
    fn keys(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}

/// SQLite-backed store: one `kv` table under the migration runner.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens or creates a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        Self::with_connection(Connection::open(path)?)
    }

    /// Creates an in-memory database (for testing).
    pub fn in_memory() -> Result<Self, StorageError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StorageError> {
        migration::MigrationRunner::run(&conn, &migration::all_migrations())?;
        Ok(SqliteStore {
            conn: Mutex::new(conn),
        })
    }

    /// Returns the current schema version.
    pub fn schema_version(&self) -> Result<u32, StorageError> {
        migration::MigrationRunner::current_version(&self.conn.lock())
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let conn = self.conn.lock();
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.conn.lock().execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            rusqlite::params![key, value],
        )?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.conn
            .lock()
            .execute("DELETE FROM kv WHERE key = ?1", [key])?;
        Ok(())
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT key FROM kv WHERE substr(key, 1, ?2) = ?1 ORDER BY key")?;
        let keys = stmt
            .query_map(rusqlite::params![prefix, prefix.len() as i64], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }
}

/// In-memory store (for testing and ephemeral clients).
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.entries.lock().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.entries.lock().remove(key);
        Ok(())
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        Ok(self
            .entries
            .lock()
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }
}

/// JSON-coded typed view over a prefix of a [`KeyValueStore`].
pub(crate) struct JsonStore<T> {
    store: Arc<dyn KeyValueStore>,
    prefix: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Serialize + DeserializeOwned> JsonStore<T> {
    pub(crate) fn new(store: Arc<dyn KeyValueStore>, prefix: &'static str) -> Self {
        JsonStore {
            store,
            prefix,
            _marker: PhantomData,
        }
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    pub(crate) fn get(&self, key: &str) -> Result<Option<T>, StorageError> {
        match self.store.get(&self.full_key(key))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn set(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec(value)?;
        self.store.set(&self.full_key(key), &bytes)
    }

    pub(crate) fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.store.delete(&self.full_key(key))
    }

    /// Every decodable value under the prefix. Undecodable entries are
    /// logged and skipped.
    pub(crate) fn all(&self) -> Result<Vec<T>, StorageError> {
        Ok(self.entries()?.into_iter().map(|(_, v)| v).collect())
    }

    /// Like [`Self::all`], paired with each key (prefix stripped).
    pub(crate) fn entries(&self) -> Result<Vec<(String, T)>, StorageError> {
        let mut values = Vec::new();
        for key in self.store.keys(self.prefix)? {
            let Some(bytes) = self.store.get(&key)? else {
                continue;
            };
            match serde_json::from_slice(&bytes) {
                Ok(value) => values.push((key[self.prefix.len()..].to_string(), value)),
                Err(e) => tracing::warn!(key = %key, error = %e, "skipping undecodable record"),
            }
        }
        Ok(values)
    }
}
