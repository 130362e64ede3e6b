// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! RPC History
//!
//! Correlation ledger of requests sent and received. Every response must
//! resolve exactly one pending record on the topic it was sent on; replays
//! and duplicates are rejected here.
//!
//! Records are written through to the key-value store under `history/`, so
//! requests pending at shutdown can still be answered after a restart.
//! Resolved records are kept for a retention window to catch late
//! duplicates, then pruned.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use super::{RpcId, RpcRequest, RpcResponse};
use crate::clock::Clock;
use crate::sign::TransportType;
use crate::storage::{JsonStore, KeyValueStore, StorageError};

/// History error types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HistoryError {
    #[error("Duplicate request id: {0}")]
    DuplicateRequestId(RpcId),

    #[error("Request not found: {0}")]
    RequestNotFound(RpcId),

    #[error("Request already resolved: {0}")]
    AlreadyResolved(RpcId),

    #[error("Malformed response for {0}: {1}")]
    MalformedResponse(RpcId, String),

    #[error("History storage error: {0}")]
    Storage(String),
}

impl From<StorageError> for HistoryError {
    fn from(err: StorageError) -> Self {
        HistoryError::Storage(err.to_string())
    }
}

/// Which side originated a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Emitter {
    Local,
    Remote,
}

/// A correlated request and, once resolved, its response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRecord {
    pub id: RpcId,
    pub topic: String,
    pub request: RpcRequest,
    pub response: Option<RpcResponse>,
    pub emitter: Emitter,
    pub transport_type: TransportType,
    pub created_at: u64,
    pub resolved_at: Option<u64>,
}

impl RpcRecord {
    pub fn is_resolved(&self) -> bool {
        self.response.is_some()
    }
}

/// Correlation ledger shared by all inbound and outbound flows.
///
/// The map is the read path; every mutation is persisted before it is
/// applied to the map.
pub struct RpcHistory {
    records: Mutex<HashMap<RpcId, RpcRecord>>,
    store: JsonStore<RpcRecord>,
    clock: Arc<dyn Clock>,
}

impl RpcHistory {
    /// Opens the history persisted in `store`.
    pub fn load(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Result<Self, HistoryError> {
        let store: JsonStore<RpcRecord> = JsonStore::new(store, "history/");
        let records = store
            .all()?
            .into_iter()
            .map(|record| (record.id, record))
            .collect();
        Ok(RpcHistory {
            records: Mutex::new(records),
            store,
            clock,
        })
    }

    /// Records a request. Any existing record with the same id is a replay.
    pub fn set(
        &self,
        request: &RpcRequest,
        topic: &str,
        emitter: Emitter,
        transport_type: TransportType,
    ) -> Result<(), HistoryError> {
        let mut records = self.records.lock();
        if records.contains_key(&request.id) {
            return Err(HistoryError::DuplicateRequestId(request.id));
        }

        let record = RpcRecord {
            id: request.id,
            topic: topic.to_string(),
            request: request.clone(),
            response: None,
            emitter,
            transport_type,
            created_at: self.clock.now(),
            resolved_at: None,
        };
        self.store.set(&request.id.to_string(), &record)?;
        records.insert(request.id, record);
        Ok(())
    }

    /// Checks that `response`, seen on `topic`, would resolve a pending
    /// record, without mutating.
    pub fn validate(&self, topic: &str, response: &RpcResponse) -> Result<RpcRecord, HistoryError> {
        let records = self.records.lock();
        Self::check(&records, topic, response).cloned()
    }

    /// Resolves the pending record on `topic` matching `response`.
    pub fn resolve(&self, topic: &str, response: &RpcResponse) -> Result<RpcRecord, HistoryError> {
        let mut records = self.records.lock();
        let mut record = Self::check(&records, topic, response)?.clone();
        record.response = Some(response.clone());
        record.resolved_at = Some(self.clock.now());

        self.store.set(&response.id.to_string(), &record)?;
        records.insert(response.id, record.clone());
        Ok(record)
    }

    fn check<'a>(
        records: &'a HashMap<RpcId, RpcRecord>,
        topic: &str,
        response: &RpcResponse,
    ) -> Result<&'a RpcRecord, HistoryError> {
        if response.jsonrpc != super::JSONRPC_VERSION {
            return Err(HistoryError::MalformedResponse(
                response.id,
                format!("unsupported jsonrpc version {}", response.jsonrpc),
            ));
        }
        let record = records
            .get(&response.id)
            .filter(|record| record.topic == topic)
            .ok_or(HistoryError::RequestNotFound(response.id))?;
        if record.is_resolved() {
            return Err(HistoryError::AlreadyResolved(response.id));
        }
        Ok(record)
    }

    pub fn get(&self, id: RpcId) -> Option<RpcRecord> {
        self.records.lock().get(&id).cloned()
    }

    /// Removes a single record (e.g. after a failed publish).
    pub fn delete(&self, id: RpcId) {
        let mut records = self.records.lock();
        if records.remove(&id).is_some() {
            self.forget(id);
        }
    }

    /// Purges every record for a torn-down topic. Returns how many were removed.
    pub fn delete_all(&self, topic: &str) -> usize {
        self.remove_where(|record| record.topic == topic)
    }

    /// Drops resolved records older than `retention` seconds. Unresolved
    /// records stay until answered or until their topic is torn down.
    pub fn prune_resolved(&self, retention: u64) -> usize {
        let now = self.clock.now();
        self.remove_where(|record| {
            record
                .resolved_at
                .is_some_and(|resolved_at| now > resolved_at.saturating_add(retention))
        })
    }

    fn remove_where(&self, doomed: impl Fn(&RpcRecord) -> bool) -> usize {
        let mut records = self.records.lock();
        let ids: Vec<RpcId> = records
            .values()
            .filter(|record| doomed(record))
            .map(|record| record.id)
            .collect();
        for id in &ids {
            records.remove(id);
            self.forget(*id);
        }
        ids.len()
    }

    fn forget(&self, id: RpcId) {
        if let Err(e) = self.store.delete(&id.to_string()) {
            warn!(id = %id, error = %e, "failed to delete history record");
        }
    }

    /// Unresolved requests received from the peer on `topic`.
    pub fn pending_requests(&self, topic: &str) -> Vec<RpcRecord> {
        let mut pending: Vec<RpcRecord> = self
            .records
            .lock()
            .values()
            .filter(|r| r.topic == topic && r.emitter == Emitter::Remote && !r.is_resolved())
            .cloned()
            .collect();
        pending.sort_by_key(|r| r.id);
        pending
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}
