// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Proposal storage.
//!
//! The responder keeps received proposals keyed by proposer public key
//! until they are approved, rejected or expire. The proposer keeps each
//! proposal it sent keyed by proposer public key until it is answered or
//! expires, then, once approved, keyed by the session topic the responder
//! derived, so the settle request arriving on that topic can be validated
//! against it.

use std::sync::Arc;

use super::{JsonStore, KeyValueStore, StorageError};
use crate::crypto::PublicKey;
use crate::sign::Proposal;

pub struct ProposalStore {
    received: JsonStore<Proposal>,
    sent: JsonStore<Proposal>,
    pending_settlement: JsonStore<Proposal>,
}

impl ProposalStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        ProposalStore {
            received: JsonStore::new(store.clone(), "proposal/"),
            sent: JsonStore::new(store.clone(), "proposal-sent/"),
            pending_settlement: JsonStore::new(store, "proposal-settle/"),
        }
    }

    pub fn set(&self, proposal: &Proposal) -> Result<(), StorageError> {
        self.received
            .set(&proposal.proposer.public_key.to_hex(), proposal)
    }

    pub fn get(&self, proposer: &PublicKey) -> Result<Option<Proposal>, StorageError> {
        self.received.get(&proposer.to_hex())
    }

    pub fn all(&self) -> Result<Vec<Proposal>, StorageError> {
        self.received.all()
    }

    pub fn delete(&self, proposer: &PublicKey) -> Result<(), StorageError> {
        self.received.delete(&proposer.to_hex())
    }

    /// Remembers a proposal this side published and is waiting on.
    pub fn set_sent(&self, proposal: &Proposal) -> Result<(), StorageError> {
        self.sent.set(&proposal.proposer.public_key.to_hex(), proposal)
    }

    pub fn sent(&self, proposer: &PublicKey) -> Result<Option<Proposal>, StorageError> {
        self.sent.get(&proposer.to_hex())
    }

    pub fn all_sent(&self) -> Result<Vec<Proposal>, StorageError> {
        self.sent.all()
    }

    pub fn delete_sent(&self, proposer: &PublicKey) -> Result<(), StorageError> {
        self.sent.delete(&proposer.to_hex())
    }

    /// Remembers the proposal a not-yet-settled session topic came from.
    pub fn set_pending_settlement(
        &self,
        session_topic: &str,
        proposal: &Proposal,
    ) -> Result<(), StorageError> {
        self.pending_settlement.set(session_topic, proposal)
    }

    pub fn pending_settlement(&self, session_topic: &str) -> Result<Option<Proposal>, StorageError> {
        self.pending_settlement.get(session_topic)
    }

    pub fn delete_pending_settlement(&self, session_topic: &str) -> Result<(), StorageError> {
        self.pending_settlement.delete(session_topic)
    }

    /// `(session topic, proposal)` pairs awaiting settlement.
    pub fn all_pending_settlements(&self) -> Result<Vec<(String, Proposal)>, StorageError> {
        self.pending_settlement.entries()
    }
}
