// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Pairing storage, keyed by pairing topic.

use std::sync::Arc;

use super::{JsonStore, KeyValueStore, StorageError};
use crate::sign::{AppMetadata, Pairing};

pub struct PairingStore {
    inner: JsonStore<Pairing>,
}

impl PairingStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        PairingStore {
            inner: JsonStore::new(store, "pairing/"),
        }
    }

    pub fn set(&self, pairing: &Pairing) -> Result<(), StorageError> {
        self.inner.set(&pairing.topic, pairing)
    }

    pub fn get(&self, topic: &str) -> Result<Option<Pairing>, StorageError> {
        self.inner.get(topic)
    }

    pub fn all(&self) -> Result<Vec<Pairing>, StorageError> {
        self.inner.all()
    }

    pub fn delete(&self, topic: &str) -> Result<(), StorageError> {
        self.inner.delete(topic)
    }

    /// Marks a pairing active with a new expiry and, when known, the peer's
    /// metadata. Fails with `NotFound` for unknown topics.
    pub fn activate(
        &self,
        topic: &str,
        expiry: u64,
        peer_metadata: Option<AppMetadata>,
    ) -> Result<Pairing, StorageError> {
        let mut pairing = self
            .get(topic)?
            .ok_or_else(|| StorageError::NotFound(format!("pairing {}", topic)))?;
        pairing.active = true;
        pairing.expiry = pairing.expiry.max(expiry);
        if peer_metadata.is_some() {
            pairing.peer_metadata = peer_metadata;
        }
        self.set(&pairing)?;
        Ok(pairing)
    }
}
