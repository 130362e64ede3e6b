// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Event System
//!
//! Everything the engines report to the host goes through one
//! [`EventDispatcher`]: a broadcast channel for async consumers plus
//! optional synchronous handlers.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::crypto::PublicKey;
use crate::network::ConnectionState;
use crate::rpc::{RpcId, RpcOutcome};
use crate::sign::{
    Blockchain, EventPayload, Proposal, ReasonPayload, RequestPayload, Session, SessionNamespaces,
    VerifyContext,
};

/// Events emitted by the sign client.
#[derive(Debug, Clone)]
pub enum SignEvent {
    /// A dApp proposed a session (wallet side).
    SessionProposal {
        proposal: Proposal,
        verify_context: VerifyContext,
    },

    /// A session was established. Wallets see it unacknowledged until the
    /// dApp confirms the settlement.
    SessionSettled { session: Session },

    /// The wallet rejected our proposal (dApp side).
    SessionRejected {
        pairing_topic: String,
        proposer_public_key: PublicKey,
        reason: ReasonPayload,
    },

    /// The dApp confirmed our settlement (wallet side).
    SessionAcknowledged { topic: String },

    /// The dApp refused our settlement; the session is gone (wallet side).
    SessionSettleFailed { topic: String, reason: ReasonPayload },

    /// The dApp asked us to perform a chain call (wallet side).
    SessionRequest {
        topic: String,
        id: RpcId,
        chain_id: Blockchain,
        request: RequestPayload,
        verify_context: VerifyContext,
    },

    /// The wallet answered one of our requests (dApp side).
    SessionResponse {
        topic: String,
        id: RpcId,
        chain_id: Blockchain,
        outcome: RpcOutcome,
    },

    /// The wallet emitted a chain event (dApp side).
    SessionEvent {
        topic: String,
        chain_id: Blockchain,
        event: EventPayload,
    },

    SessionUpdated {
        topic: String,
        namespaces: SessionNamespaces,
    },

    SessionExtended { topic: String, expiry: u64 },

    /// The peer deleted the session.
    SessionDeleted { topic: String, reason: ReasonPayload },

    SessionPing { topic: String },

    SessionExpired { topic: String },

    PairingExpired { topic: String },

    /// The peer deleted the pairing.
    PairingDeleted { topic: String, reason: ReasonPayload },

    ProposalExpired {
        pairing_topic: String,
        proposer_public_key: PublicKey,
    },

    /// Relay connection state changed.
    ConnectionStateChanged { state: ConnectionState },

    /// Error event for async operations.
    Error { message: String },
}

/// Event handler trait.
///
/// Implement this trait to receive sign events synchronously.
pub trait EventHandler: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: SignEvent);
}

/// Simple callback-based event handler.
pub struct CallbackHandler<F>
where
    F: Fn(SignEvent) + Send + Sync,
{
    callback: F,
}

impl<F> CallbackHandler<F>
where
    F: Fn(SignEvent) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        CallbackHandler { callback }
    }
}

impl<F> EventHandler for CallbackHandler<F>
where
    F: Fn(SignEvent) + Send + Sync,
{
    fn on_event(&self, event: SignEvent) {
        (self.callback)(event);
    }
}

/// Fans events out to subscribers and handlers.
pub struct EventDispatcher {
    sender: broadcast::Sender<SignEvent>,
    handlers: Mutex<Vec<Arc<dyn EventHandler>>>,
}

impl EventDispatcher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        EventDispatcher {
            sender,
            handlers: Mutex::new(Vec::new()),
        }
    }

    /// A new receiver; it sees events dispatched after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<SignEvent> {
        self.sender.subscribe()
    }

    pub fn add_handler(&self, handler: Arc<dyn EventHandler>) {
        self.handlers.lock().push(handler);
    }

    pub fn clear_handlers(&self) {
        self.handlers.lock().clear();
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.lock().len()
    }

    /// Dispatches an event to all handlers and subscribers.
    pub fn dispatch(&self, event: SignEvent) {
        let handlers = self.handlers.lock().clone();
        for handler in &handlers {
            handler.on_event(event.clone());
        }
        // No subscribers is fine.
        let _ = self.sender.send(event);
    }
}
