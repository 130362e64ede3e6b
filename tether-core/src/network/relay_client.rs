// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Relay Client
//!
//! Publish/subscribe primitives over the dispatcher with relay
//! acknowledgements. Publishes are never retried here: a timeout means the
//! message is presumed undelivered and the caller decides what to do.
//!
//! The relay keeps no memory of a disconnected client, so every tracked
//! topic is re-subscribed in one batch whenever the socket comes back.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::dispatcher::Dispatcher;
use super::error::NetworkError;
use super::relay::{
    BatchSubscribeParams, PublishParams, RelayMessage, SubscribeParams, SubscriptionParams,
    UnsubscribeParams, IRN_BATCH_SUBSCRIBE, IRN_PUBLISH, IRN_SUBSCRIBE, IRN_SUBSCRIPTION,
    IRN_UNSUBSCRIBE, MAX_BATCH_SUBSCRIBE,
};
use super::subscriptions::SubscriptionsTracker;
use super::transport::ConnectionState;
use crate::rpc::{RpcHistory, RpcId, RpcOutcome, RpcPayload, RpcRequest, RpcResponse};

const MESSAGE_CHANNEL_CAPACITY: usize = 256;

/// Configuration for the relay client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayClientConfig {
    /// Wait for the relay to acknowledge a publish.
    pub publish_timeout: Duration,
    /// Wait for the relay to return subscription ids.
    pub subscribe_timeout: Duration,
}

impl Default for RelayClientConfig {
    fn default() -> Self {
        RelayClientConfig {
            publish_timeout: Duration::from_secs(60),
            subscribe_timeout: Duration::from_secs(30),
        }
    }
}

/// Publish/subscribe client for the relay.
pub struct RelayClient {
    dispatcher: Arc<Dispatcher>,
    subscriptions: Arc<SubscriptionsTracker>,
    history: Arc<RpcHistory>,
    config: RelayClientConfig,
    /// Relay requests awaiting their response: id -> continuation.
    pending: Mutex<HashMap<RpcId, oneshot::Sender<RpcResponse>>>,
    messages_tx: broadcast::Sender<RelayMessage>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl RelayClient {
    /// Creates the client and starts its inbound and reconnect listeners.
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        subscriptions: Arc<SubscriptionsTracker>,
        history: Arc<RpcHistory>,
        config: RelayClientConfig,
    ) -> Arc<Self> {
        let (messages_tx, _) = broadcast::channel(MESSAGE_CHANNEL_CAPACITY);
        let client = Arc::new(RelayClient {
            dispatcher: dispatcher.clone(),
            subscriptions,
            history,
            config,
            pending: Mutex::new(HashMap::new()),
            messages_tx,
            tasks: Mutex::new(Vec::new()),
        });

        let inbound = tokio::spawn(Self::listen_inbound(
            Arc::downgrade(&client),
            dispatcher.messages(),
        ));
        let reconnect = tokio::spawn(Self::listen_reconnects(
            Arc::downgrade(&client),
            dispatcher.status_changes(),
        ));
        client.tasks.lock().extend([inbound, reconnect]);
        client
    }

    async fn listen_inbound(this: Weak<Self>, mut frames: broadcast::Receiver<String>) {
        loop {
            let frame = match frames.recv().await {
                Ok(frame) => frame,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "relay client lagged behind inbound frames");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            let Some(client) = this.upgrade() else {
                break;
            };
            client.handle_frame(&frame);
        }
    }

    async fn listen_reconnects(
        this: Weak<Self>,
        mut status: tokio::sync::watch::Receiver<ConnectionState>,
    ) {
        let mut connected_before = *status.borrow_and_update() == ConnectionState::Connected;
        while status.changed().await.is_ok() {
            if *status.borrow_and_update() != ConnectionState::Connected {
                continue;
            }
            if !connected_before {
                connected_before = true;
                continue;
            }
            let Some(client) = this.upgrade() else {
                break;
            };
            let topics = client.subscriptions.topics();
            if topics.is_empty() {
                continue;
            }
            info!(count = topics.len(), "re-subscribing after reconnect");
            tokio::spawn(async move {
                if let Err(e) = client.batch_subscribe(topics).await {
                    warn!(error = %e, "re-subscription failed");
                }
            });
        }
    }

    fn handle_frame(self: &Arc<Self>, frame: &str) {
        let payload: RpcPayload = match serde_json::from_str(frame) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "dropping malformed relay frame");
                return;
            }
        };

        match payload {
            RpcPayload::Response(response) => match self.pending.lock().remove(&response.id) {
                Some(continuation) => {
                    let _ = continuation.send(response);
                }
                None => debug!(id = %response.id, "relay response without pending request"),
            },
            RpcPayload::Request(request) if request.method == IRN_SUBSCRIPTION => {
                let params: SubscriptionParams = match request.params_as() {
                    Ok(params) => params,
                    Err(e) => {
                        warn!(id = %request.id, error = %e, "malformed irn_subscription");
                        return;
                    }
                };
                self.acknowledge(request.id);
                let message = RelayMessage::from(params.data);
                debug!(topic = %message.topic, tag = message.tag, "relay message received");
                let _ = self.messages_tx.send(message);
            }
            RpcPayload::Request(request) => {
                debug!(method = %request.method, "ignoring unsupported relay request");
            }
        }
    }

    fn acknowledge(self: &Arc<Self>, id: RpcId) {
        let ack = match RpcResponse::success(id, &true).and_then(|r| serde_json::to_string(&r)) {
            Ok(ack) => ack,
            Err(e) => {
                warn!(id = %id, error = %e, "failed to encode relay ack");
                return;
            }
        };
        let dispatcher = self.dispatcher.clone();
        tokio::spawn(async move {
            if let Err(e) = dispatcher.protected_send(ack, false).await {
                warn!(id = %id, error = %e, "failed to acknowledge relay message");
            }
        });
    }

    /// Sends a relay request and waits for its response.
    async fn call<P: Serialize, R: DeserializeOwned>(
        &self,
        method: &str,
        params: &P,
        wait: Duration,
        timeout_error: NetworkError,
    ) -> Result<R, NetworkError> {
        let request = RpcRequest::new(method, params)?;
        let id = request.id;
        let text = serde_json::to_string(&request)?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        if let Err(e) = self.dispatcher.protected_send(text, true).await {
            self.pending.lock().remove(&id);
            return Err(e);
        }

        let response = match tokio::time::timeout(wait, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => return Err(NetworkError::Closed),
            Err(_) => {
                self.pending.lock().remove(&id);
                warn!(method, id = %id, "relay request timed out");
                return Err(timeout_error);
            }
        };

        match response.outcome {
            RpcOutcome::Result(value) => Ok(serde_json::from_value(value)?),
            RpcOutcome::Error(error) => Err(NetworkError::Relay {
                code: error.code,
                message: error.message,
            }),
        }
    }

    /// Publishes `message` on `topic` and waits for the relay's acknowledgement.
    pub async fn publish(
        &self,
        topic: &str,
        message: String,
        tag: u32,
        ttl: u64,
        prompt: bool,
    ) -> Result<(), NetworkError> {
        let params = PublishParams {
            topic: topic.to_string(),
            message,
            ttl,
            tag,
            prompt,
        };
        let _: bool = self
            .call(
                IRN_PUBLISH,
                &params,
                self.config.publish_timeout,
                NetworkError::PublishTimeout,
            )
            .await?;
        debug!(topic = %topic, tag, "published");
        Ok(())
    }

    /// Subscribes to `topic` and returns the relay's subscription id.
    pub async fn subscribe(&self, topic: &str) -> Result<String, NetworkError> {
        let params = SubscribeParams {
            topic: topic.to_string(),
        };
        let id: String = self
            .call(
                IRN_SUBSCRIBE,
                &params,
                self.config.subscribe_timeout,
                NetworkError::SubscribeTimeout,
            )
            .await?;
        self.subscriptions.set(topic, &id);
        debug!(topic = %topic, "subscribed");
        Ok(id)
    }

    /// Subscribes to many topics, at most 500 per relay call.
    pub async fn batch_subscribe(&self, topics: Vec<String>) -> Result<(), NetworkError> {
        for chunk in topics.chunks(MAX_BATCH_SUBSCRIBE) {
            let params = BatchSubscribeParams {
                topics: chunk.to_vec(),
            };
            let ids: Vec<String> = self
                .call(
                    IRN_BATCH_SUBSCRIBE,
                    &params,
                    self.config.subscribe_timeout,
                    NetworkError::SubscribeTimeout,
                )
                .await?;
            if ids.len() != chunk.len() {
                return Err(NetworkError::Malformed(format!(
                    "expected {} subscription ids, got {}",
                    chunk.len(),
                    ids.len()
                )));
            }
            for (topic, id) in chunk.iter().zip(ids) {
                self.subscriptions.set(topic, &id);
            }
        }
        Ok(())
    }

    /// Stops tracking `topic`, purges its RPC history and tells the relay.
    pub async fn unsubscribe(&self, topic: &str) -> Result<(), NetworkError> {
        let id = self
            .subscriptions
            .remove(topic)
            .ok_or_else(|| NetworkError::SubscriptionIdNotFound(topic.to_string()))?;
        let purged = self.history.delete_all(topic);
        debug!(topic = %topic, purged, "unsubscribing");

        let params = UnsubscribeParams {
            topic: topic.to_string(),
            id,
        };
        let _: bool = self
            .call(
                IRN_UNSUBSCRIBE,
                &params,
                self.config.subscribe_timeout,
                NetworkError::SubscribeTimeout,
            )
            .await?;
        Ok(())
    }

    /// Drops `topic` locally without talking to the relay.
    ///
    /// Used while offline: the relay forgets a closed socket's
    /// subscriptions on its own, so only local state needs clearing.
    pub fn forget(&self, topic: &str) {
        self.subscriptions.remove(topic);
        let purged = self.history.delete_all(topic);
        debug!(topic = %topic, purged, "forgot topic");
    }

    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.subscriptions.is_subscribed(topic)
    }

    /// Inbound peer messages on subscribed topics.
    pub fn messages(&self) -> broadcast::Receiver<RelayMessage> {
        self.messages_tx.subscribe()
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }
}

impl Drop for RelayClient {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::connection::{ConnectionPolicy, ReconnectConfig};
    use crate::network::mock::MockRelay;
    use crate::clock::SystemClock;
    use crate::storage::MemoryStore;

    fn client(relay: &MockRelay) -> Arc<RelayClient> {
        let tracker = Arc::new(SubscriptionsTracker::new());
        let dispatcher = Dispatcher::new(
            relay.transport(),
            ConnectionPolicy::Manual,
            ReconnectConfig::default(),
            tracker.clone(),
            Duration::from_secs(30),
        )
        .unwrap();
        RelayClient::new(
            dispatcher,
            tracker,
            Arc::new(
                RpcHistory::load(Arc::new(MemoryStore::new()), Arc::new(SystemClock)).unwrap(),
            ),
            RelayClientConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let relay = MockRelay::new();
        let alice = client(&relay);
        let bob = client(&relay);

        bob.subscribe("topic").await.unwrap();
        let mut inbox = bob.messages();

        alice
            .publish("topic", "hello".into(), 1108, 300, true)
            .await
            .unwrap();

        let message = inbox.recv().await.unwrap();
        assert_eq!(message.topic, "topic");
        assert_eq!(message.message, "hello");
        assert_eq!(message.tag, 1108);
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_times_out_without_ack() {
        let relay = MockRelay::new();
        relay.set_acknowledge_publishes(false);
        let alice = client(&relay);

        let result = alice.publish("topic", "hello".into(), 1108, 300, false).await;
        assert_eq!(result, Err(NetworkError::PublishTimeout));
        assert!(alice.pending.lock().is_empty());
    }

    #[tokio::test]
    async fn test_unsubscribe_unknown_topic() {
        let relay = MockRelay::new();
        let alice = client(&relay);
        assert_eq!(
            alice.unsubscribe("never").await,
            Err(NetworkError::SubscriptionIdNotFound("never".into()))
        );
    }

    #[tokio::test]
    async fn test_batch_subscribe_chunks_at_limit() {
        let relay = MockRelay::new();
        let alice = client(&relay);
        let topics: Vec<String> = (0..1001).map(|i| format!("topic-{}", i)).collect();

        alice.batch_subscribe(topics).await.unwrap();
        assert_eq!(relay.call_count(IRN_BATCH_SUBSCRIBE), 3);
        assert!(alice.is_subscribed("topic-1000"));
    }

    #[tokio::test]
    async fn test_forget_is_local_only() {
        let relay = MockRelay::new();
        let alice = client(&relay);
        alice.subscribe("topic").await.unwrap();

        alice.forget("topic");
        assert!(!alice.is_subscribed("topic"));
        assert_eq!(relay.call_count(IRN_UNSUBSCRIBE), 0);
    }

    #[tokio::test]
    async fn test_relay_error_is_surfaced() {
        let relay = MockRelay::new();
        relay.reject_publishes_with_tag(1102);
        let alice = client(&relay);
        assert!(matches!(
            alice.publish("topic", "x".into(), 1102, 300, false).await,
            Err(NetworkError::Relay { .. })
        ));
    }
}
