// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! State shared by the sign engines.

use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::types::{AppMetadata, Session};
use crate::api::{EventDispatcher, SignEvent, TtlConfig};
use crate::clock::Clock;
use crate::kms::KeyManagementService;
use crate::networking::{MethodStream, NetworkingInteractor};
use crate::storage::{PairingStore, ProposalStore, SessionStore, VerifyContextStore};
use crate::verify::VerifyClient;

/// Collaborators every engine works against.
pub(crate) struct EngineContext {
    pub kms: Arc<KeyManagementService>,
    pub interactor: Arc<NetworkingInteractor>,
    pub sessions: SessionStore,
    pub pairings: PairingStore,
    pub proposals: ProposalStore,
    pub verify_contexts: VerifyContextStore,
    pub verifier: Arc<dyn VerifyClient>,
    pub clock: Arc<dyn Clock>,
    pub metadata: AppMetadata,
    pub ttl: TtlConfig,
    pub events: Arc<EventDispatcher>,
}

impl EngineContext {
    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    pub fn emit(&self, event: SignEvent) {
        self.events.dispatch(event);
    }

    /// Stops listening on `topic` and drops its keys.
    ///
    /// Offline, the relay has already forgotten the subscription, so only
    /// the local tracking is cleared.
    pub async fn teardown_topic(&self, topic: &str) {
        if self.interactor.is_connected() && self.interactor.is_subscribed(topic) {
            if let Err(e) = self.interactor.unsubscribe(topic).await {
                warn!(topic = %topic, error = %e, "unsubscribe failed");
                self.interactor.relay().forget(topic);
            }
        } else {
            self.interactor.relay().forget(topic);
        }
        if let Err(e) = self.kms.delete_topic_keys(topic) {
            warn!(topic = %topic, error = %e, "failed to delete topic keys");
        }
    }

    /// Removes a session with everything bound to it.
    pub async fn teardown_session(&self, session: &Session) {
        self.teardown_topic(&session.topic).await;
        if let Err(e) = self
            .kms
            .delete_private_key(&session.self_participant.public_key)
        {
            warn!(topic = %session.topic, error = %e, "failed to delete session private key");
        }
        if let Err(e) = self.sessions.delete(&session.topic) {
            warn!(topic = %session.topic, error = %e, "failed to delete session");
        }
        debug!(topic = %session.topic, "session torn down");
    }
}

/// Runs `handler` on a fresh task for every payload of `stream`.
///
/// The listener holds the engine weakly and stops once it is dropped.
pub(crate) fn spawn_listener<E, T, F, Fut>(
    engine: &Arc<E>,
    mut stream: MethodStream<T>,
    handler: F,
) -> JoinHandle<()>
where
    E: Send + Sync + 'static,
    T: Clone + Send + 'static,
    F: Fn(Arc<E>, T) -> Fut + Copy + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let engine = Arc::downgrade(engine);
    tokio::spawn(async move {
        while let Some(payload) = stream.recv().await {
            let Some(engine) = engine.upgrade() else {
                break;
            };
            tokio::spawn(handler(engine, payload));
        }
    })
}
