// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Pairing Engine
//!
//! Creates and joins pairings from URIs and serves the pairing-level ping
//! and delete methods. A pairing starts inactive with a short expiry and is
//! activated, with a long expiry, once the peer shows up.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::context::{spawn_listener, EngineContext};
use super::params::{DeleteParams, PingParams};
use super::reason::Reason;
use super::types::{AppMetadata, Pairing, RelayProtocolOptions};
use super::uri::PairingUri;
use crate::api::{SignError, SignEvent, SignResult};
use crate::networking::RequestSubscriptionPayload;
use crate::rpc::{ProtocolMethod, RpcRequest};
use crate::serializer::EnvelopeType;
use crate::storage::StorageError;

pub(crate) struct PairingEngine {
    ctx: Arc<EngineContext>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl PairingEngine {
    pub fn new(ctx: Arc<EngineContext>) -> Arc<Self> {
        Arc::new(PairingEngine {
            ctx,
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn start(self: &Arc<Self>) {
        let requests = |method| self.ctx.interactor.subscribe_on_request(method);
        let tasks = [
            spawn_listener(
                self,
                requests(ProtocolMethod::PairingPing),
                |engine: Arc<Self>, payload| async move { engine.on_ping(payload).await },
            ),
            spawn_listener(
                self,
                requests(ProtocolMethod::PairingDelete),
                |engine: Arc<Self>, payload| async move { engine.on_delete(payload).await },
            ),
        ];
        self.tasks.lock().extend(tasks);
    }

    /// New inactive pairing, ready to be shared as a URI.
    pub async fn create(&self) -> SignResult<PairingUri> {
        let sym_key = self.ctx.kms.create_sym_key()?;
        let expiry = self.ctx.now() + self.ctx.ttl.pairing_inactive;
        let uri = PairingUri::new(sym_key, RelayProtocolOptions::default(), expiry);

        self.ctx.kms.set_sym_key(&uri.sym_key, &uri.topic)?;
        self.ctx.pairings.set(&Pairing {
            topic: uri.topic.clone(),
            relay: uri.relay.clone(),
            peer_metadata: None,
            expiry,
            active: false,
        })?;
        if let Err(e) = self.ctx.interactor.subscribe(&uri.topic).await {
            self.discard(&uri.topic).await;
            return Err(e.into());
        }
        info!(topic = %uri.topic, "pairing created");
        Ok(uri)
    }

    /// Joins the pairing described by `uri`. Pairing twice with the same
    /// URI returns the stored pairing.
    pub async fn pair(&self, uri: &str) -> SignResult<Pairing> {
        let uri: PairingUri = uri.parse()?;
        let now = self.ctx.now();
        if uri.expiry_timestamp.is_some_and(|expiry| now > expiry) {
            return Err(SignError::PairingExpired(uri.topic));
        }
        if let Some(existing) = self.ctx.pairings.get(&uri.topic)? {
            debug!(topic = %uri.topic, "pairing already known");
            return Ok(existing);
        }

        let pairing = Pairing {
            topic: uri.topic.clone(),
            relay: uri.relay.clone(),
            peer_metadata: None,
            expiry: uri
                .expiry_timestamp
                .unwrap_or(now + self.ctx.ttl.pairing_inactive),
            active: false,
        };
        self.ctx.kms.set_sym_key(&uri.sym_key, &uri.topic)?;
        self.ctx.pairings.set(&pairing)?;
        if let Err(e) = self.ctx.interactor.subscribe(&uri.topic).await {
            self.discard(&uri.topic).await;
            return Err(e.into());
        }
        info!(topic = %uri.topic, "paired");
        Ok(pairing)
    }

    /// Marks the pairing in use by a proposal or session.
    pub fn activate(&self, topic: &str, peer_metadata: Option<AppMetadata>) -> SignResult<Pairing> {
        let expiry = self.ctx.now() + self.ctx.ttl.pairing_active;
        match self.ctx.pairings.activate(topic, expiry, peer_metadata) {
            Ok(pairing) => Ok(pairing),
            Err(StorageError::NotFound(_)) => Err(SignError::PairingNotFound(topic.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn ping(&self, topic: &str) -> SignResult<()> {
        self.existing(topic)?;
        let request = RpcRequest::new(ProtocolMethod::PairingPing.name(), &PingParams {})?;
        let _: bool = self
            .ctx
            .interactor
            .await_response(&request, topic, ProtocolMethod::PairingPing, EnvelopeType::Type0)
            .await
            .map_err(SignError::from_networking)?;
        Ok(())
    }

    /// Tells the peer and forgets the pairing. Delivery is best-effort.
    pub async fn delete(&self, topic: &str) -> SignResult<()> {
        self.existing(topic)?;
        if self.ctx.interactor.is_connected() {
            let request = RpcRequest::new(
                ProtocolMethod::PairingDelete.name(),
                &DeleteParams::from(Reason::UserDisconnected),
            )?;
            if let Err(e) = self
                .ctx
                .interactor
                .request(&request, topic, ProtocolMethod::PairingDelete, EnvelopeType::Type0)
                .await
            {
                warn!(topic = %topic, error = %e, "pairing delete not delivered");
            }
        }
        self.discard(topic).await;
        Ok(())
    }

    fn existing(&self, topic: &str) -> SignResult<Pairing> {
        self.ctx
            .pairings
            .get(topic)?
            .ok_or_else(|| SignError::PairingNotFound(topic.to_string()))
    }

    /// Drops a pairing with its subscription and key.
    pub async fn discard(&self, topic: &str) {
        self.ctx.teardown_topic(topic).await;
        if let Err(e) = self.ctx.pairings.delete(topic) {
            warn!(topic = %topic, error = %e, "failed to delete pairing");
        }
    }

    async fn on_ping(&self, payload: RequestSubscriptionPayload) {
        if let Err(e) = self
            .ctx
            .interactor
            .respond_success(
                &payload.topic,
                payload.request.id,
                ProtocolMethod::PairingPing,
                &true,
            )
            .await
        {
            warn!(topic = %payload.topic, error = %e, "pairing ping response failed");
        }
    }

    async fn on_delete(&self, payload: RequestSubscriptionPayload) {
        let reason = match payload.request.params_as::<DeleteParams>() {
            Ok(reason) => reason,
            Err(e) => {
                debug!(topic = %payload.topic, error = %e, "malformed pairing delete");
                Reason::UserDisconnected.payload()
            }
        };
        if let Err(e) = self
            .ctx
            .interactor
            .respond_success(
                &payload.topic,
                payload.request.id,
                ProtocolMethod::PairingDelete,
                &true,
            )
            .await
        {
            warn!(topic = %payload.topic, error = %e, "pairing delete response failed");
        }
        self.discard(&payload.topic).await;
        info!(topic = %payload.topic, code = reason.code, "pairing deleted by peer");
        self.ctx.emit(SignEvent::PairingDeleted {
            topic: payload.topic,
            reason,
        });
    }
}

impl Drop for PairingEngine {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}
