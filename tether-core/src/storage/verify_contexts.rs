// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Verify contexts cached per proposal or request id.

use std::sync::Arc;

use super::{JsonStore, KeyValueStore, StorageError};
use crate::rpc::RpcId;
use crate::sign::VerifyContext;

pub struct VerifyContextStore {
    inner: JsonStore<VerifyContext>,
}

impl VerifyContextStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        VerifyContextStore {
            inner: JsonStore::new(store, "verify/"),
        }
    }

    pub fn set(&self, id: RpcId, context: &VerifyContext) -> Result<(), StorageError> {
        self.inner.set(&id.to_string(), context)
    }

    pub fn get(&self, id: RpcId) -> Result<Option<VerifyContext>, StorageError> {
        self.inner.get(&id.to_string())
    }

    pub fn delete(&self, id: RpcId) -> Result<(), StorageError> {
        self.inner.delete(&id.to_string())
    }
}
