// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Session storage, keyed by session topic.
//!
//! Writes are serialized so concurrent field updates on one session
//! cannot overwrite each other.

use std::sync::Arc;

use parking_lot::Mutex;

use super::{JsonStore, KeyValueStore, StorageError};
use crate::sign::Session;

pub struct SessionStore {
    inner: JsonStore<Session>,
    writes: Mutex<()>,
}

impl SessionStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        SessionStore {
            inner: JsonStore::new(store, "session/"),
            writes: Mutex::new(()),
        }
    }

    pub fn set(&self, session: &Session) -> Result<(), StorageError> {
        let _guard = self.writes.lock();
        self.inner.set(&session.topic, session)
    }

    pub fn get(&self, topic: &str) -> Result<Option<Session>, StorageError> {
        self.inner.get(topic)
    }

    pub fn all(&self) -> Result<Vec<Session>, StorageError> {
        self.inner.all()
    }

    pub fn delete(&self, topic: &str) -> Result<(), StorageError> {
        let _guard = self.writes.lock();
        self.inner.delete(topic)
    }

    /// Reads, modifies and writes back the session under `topic` as one
    /// step. Returns the updated session, or `None` if there is none.
    pub fn update(
        &self,
        topic: &str,
        modify: impl FnOnce(&mut Session),
    ) -> Result<Option<Session>, StorageError> {
        let _guard = self.writes.lock();
        let Some(mut session) = self.inner.get(topic)? else {
            return Ok(None);
        };
        modify(&mut session);
        self.inner.set(topic, &session)?;
        Ok(Some(session))
    }

    /// Marks a session acknowledged. Returns the updated session, or `None`
    /// if no session exists under `topic`.
    pub fn acknowledge(&self, topic: &str) -> Result<Option<Session>, StorageError> {
        self.update(topic, |session| session.acknowledged = true)
    }

    /// Sessions created over `pairing_topic`.
    pub fn for_pairing(&self, pairing_topic: &str) -> Result<Vec<Session>, StorageError> {
        Ok(self
            .all()?
            .into_iter()
            .filter(|s| s.pairing_topic == pairing_topic)
            .collect())
    }
}
