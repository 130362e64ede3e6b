// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::NetworkingError;
use crate::crypto::PublicKey;
use crate::network::{RelayClient, RelayMessage};
use crate::rpc::method::PublishPolicy;
use crate::rpc::{
    Emitter, HistoryError, ProtocolMethod, RpcHistory, RpcId, RpcOutcome, RpcPayload, RpcRequest,
    RpcResponse,
};
use crate::serializer::{EnvelopeType, Serializer};
use crate::sign::{Reason, TransportType};

const CHANNEL_CAPACITY: usize = 256;

/// A peer request that passed decryption and history checks.
#[derive(Debug, Clone)]
pub struct RequestSubscriptionPayload {
    pub topic: String,
    pub request: RpcRequest,
    pub published_at: u64,
    /// Set for type 1 envelopes.
    pub sender_public_key: Option<PublicKey>,
    /// Key for the verify service lookup.
    pub attestation_id: String,
    pub transport_type: TransportType,
}

/// A peer response, paired with the request it resolved.
#[derive(Debug, Clone)]
pub struct ResponseSubscriptionPayload {
    pub topic: String,
    pub request: RpcRequest,
    pub response: RpcResponse,
    pub published_at: u64,
}

/// Inbound payloads narrowed to one protocol method.
pub struct MethodStream<T> {
    rx: broadcast::Receiver<T>,
    method: &'static str,
    method_of: fn(&T) -> &str,
}

impl<T: Clone> MethodStream<T> {
    /// Next payload for this method, or `None` once the interactor is gone.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            match self.rx.recv().await {
                Ok(payload) if (self.method_of)(&payload) == self.method => return Some(payload),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(method = self.method, skipped, "method stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

fn request_method(payload: &RequestSubscriptionPayload) -> &str {
    &payload.request.method
}

fn response_method(payload: &ResponseSubscriptionPayload) -> &str {
    &payload.request.method
}

/// Peer-level JSON-RPC over the relay.
pub struct NetworkingInteractor {
    relay: Arc<RelayClient>,
    serializer: Arc<Serializer>,
    history: Arc<RpcHistory>,
    response_timeout: Duration,
    requests_tx: broadcast::Sender<RequestSubscriptionPayload>,
    responses_tx: broadcast::Sender<ResponseSubscriptionPayload>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl NetworkingInteractor {
    pub fn new(
        relay: Arc<RelayClient>,
        serializer: Arc<Serializer>,
        history: Arc<RpcHistory>,
        response_timeout: Duration,
    ) -> Arc<Self> {
        let (requests_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (responses_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        let interactor = Arc::new(NetworkingInteractor {
            relay: relay.clone(),
            serializer,
            history,
            response_timeout,
            requests_tx,
            responses_tx,
            listener: Mutex::new(None),
        });

        let task = tokio::spawn(Self::listen(Arc::downgrade(&interactor), relay.messages()));
        *interactor.listener.lock() = Some(task);
        interactor
    }

    async fn listen(this: Weak<Self>, mut messages: broadcast::Receiver<RelayMessage>) {
        loop {
            let message = match messages.recv().await {
                Ok(message) => message,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "interactor lagged behind relay messages");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            let Some(interactor) = this.upgrade() else {
                break;
            };
            interactor.handle_message(message);
        }
    }

    fn handle_message(&self, message: RelayMessage) {
        let (payload, sender) = match self
            .serializer
            .deserialize::<RpcPayload>(&message.topic, &message.message)
        {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(topic = %message.topic, error = %e, "dropping undecryptable message");
                return;
            }
        };

        match payload {
            RpcPayload::Request(request) => {
                match self.history.set(
                    &request,
                    &message.topic,
                    Emitter::Remote,
                    TransportType::Relay,
                ) {
                    Ok(()) => {}
                    Err(HistoryError::DuplicateRequestId(id)) => {
                        debug!(topic = %message.topic, id = %id, "dropping duplicate request");
                        return;
                    }
                    Err(e) => {
                        warn!(topic = %message.topic, error = %e, "dropping request");
                        return;
                    }
                }
                debug!(topic = %message.topic, method = %request.method, id = %request.id, "peer request");
                let _ = self.requests_tx.send(RequestSubscriptionPayload {
                    topic: message.topic,
                    request,
                    published_at: message.published_at,
                    sender_public_key: sender,
                    attestation_id: crate::verify::attestation_id(&message.message),
                    transport_type: TransportType::Relay,
                });
            }
            RpcPayload::Response(response) => {
                let record = match self.history.resolve(&message.topic, &response) {
                    Ok(record) => record,
                    Err(e) => {
                        debug!(topic = %message.topic, error = %e, "dropping uncorrelated response");
                        return;
                    }
                };
                debug!(topic = %message.topic, method = %record.request.method, id = %response.id, "peer response");
                let _ = self.responses_tx.send(ResponseSubscriptionPayload {
                    topic: message.topic,
                    request: record.request,
                    response,
                    published_at: message.published_at,
                });
            }
        }
    }

    /// Records, seals and publishes `request` on `topic`.
    pub async fn request(
        &self,
        request: &RpcRequest,
        topic: &str,
        method: ProtocolMethod,
        envelope: EnvelopeType,
    ) -> Result<(), NetworkingError> {
        self.history
            .set(request, topic, Emitter::Local, TransportType::Relay)?;

        let result = self.seal_and_publish(topic, request, method.request_policy(), envelope).await;
        if let Err(e) = &result {
            warn!(topic = %topic, method = method.name(), error = %e, "request publish failed");
            self.history.delete(request.id);
        }
        result
    }

    /// Sends `request` and waits for its correlated response.
    ///
    /// A peer error response surfaces as [`NetworkingError::PeerError`].
    pub async fn await_response<T: DeserializeOwned>(
        &self,
        request: &RpcRequest,
        topic: &str,
        method: ProtocolMethod,
        envelope: EnvelopeType,
    ) -> Result<T, NetworkingError> {
        let mut responses = self.responses_tx.subscribe();
        self.request(request, topic, method, envelope).await?;

        let id = request.id;
        let wait = async {
            loop {
                match responses.recv().await {
                    Ok(payload) if payload.response.id == id && payload.topic == topic => {
                        return Ok(payload.response)
                    }
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "response waiter lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return Err(NetworkingError::Closed),
                }
            }
        };

        let response = tokio::time::timeout(self.response_timeout, wait)
            .await
            .map_err(|_| NetworkingError::ResponseTimeout)??;

        match response.outcome {
            RpcOutcome::Result(value) => Ok(serde_json::from_value(value)?),
            RpcOutcome::Error(error) => Err(NetworkingError::PeerError {
                code: error.code,
                message: error.message,
            }),
        }
    }

    /// Answers a recorded peer request: validate, publish, then resolve.
    pub async fn respond(
        &self,
        topic: &str,
        response: &RpcResponse,
        method: ProtocolMethod,
        envelope: EnvelopeType,
    ) -> Result<(), NetworkingError> {
        self.history.validate(topic, response)?;
        self.seal_and_publish(topic, response, method.response_policy(), envelope)
            .await?;
        self.history.resolve(topic, response)?;
        Ok(())
    }

    pub async fn respond_success<R: Serialize>(
        &self,
        topic: &str,
        request_id: RpcId,
        method: ProtocolMethod,
        result: &R,
    ) -> Result<(), NetworkingError> {
        let response = RpcResponse::success(request_id, result)?;
        self.respond(topic, &response, method, EnvelopeType::Type0)
            .await
    }

    pub async fn respond_error(
        &self,
        topic: &str,
        request_id: RpcId,
        method: ProtocolMethod,
        reason: Reason,
    ) -> Result<(), NetworkingError> {
        let response = RpcResponse::error(request_id, reason.code(), reason.to_string());
        self.respond(topic, &response, method, EnvelopeType::Type0)
            .await
    }

    /// Publishes a response without touching the history. The caller
    /// commits the resolution once its own flow has succeeded.
    pub async fn publish_response(
        &self,
        topic: &str,
        response: &RpcResponse,
        method: ProtocolMethod,
        envelope: EnvelopeType,
    ) -> Result<(), NetworkingError> {
        self.seal_and_publish(topic, response, method.response_policy(), envelope)
            .await
    }

    async fn seal_and_publish<T: Serialize>(
        &self,
        topic: &str,
        payload: &T,
        policy: PublishPolicy,
        envelope: EnvelopeType,
    ) -> Result<(), NetworkingError> {
        let message = self.serializer.serialize(topic, payload, envelope)?;
        self.relay
            .publish(topic, message, policy.tag, policy.ttl, policy.prompt)
            .await?;
        Ok(())
    }

    /// Every inbound peer request.
    pub fn requests(&self) -> broadcast::Receiver<RequestSubscriptionPayload> {
        self.requests_tx.subscribe()
    }

    /// Every inbound peer response.
    pub fn responses(&self) -> broadcast::Receiver<ResponseSubscriptionPayload> {
        self.responses_tx.subscribe()
    }

    pub fn subscribe_on_request(
        &self,
        method: ProtocolMethod,
    ) -> MethodStream<RequestSubscriptionPayload> {
        MethodStream {
            rx: self.requests_tx.subscribe(),
            method: method.name(),
            method_of: request_method,
        }
    }

    pub fn subscribe_on_response(
        &self,
        method: ProtocolMethod,
    ) -> MethodStream<ResponseSubscriptionPayload> {
        MethodStream {
            rx: self.responses_tx.subscribe(),
            method: method.name(),
            method_of: response_method,
        }
    }

    pub async fn subscribe(&self, topic: &str) -> Result<(), NetworkingError> {
        self.relay.subscribe(topic).await?;
        Ok(())
    }

    pub async fn batch_subscribe(&self, topics: Vec<String>) -> Result<(), NetworkingError> {
        if topics.is_empty() {
            return Ok(());
        }
        self.relay.batch_subscribe(topics).await?;
        Ok(())
    }

    pub async fn unsubscribe(&self, topic: &str) -> Result<(), NetworkingError> {
        self.relay.unsubscribe(topic).await?;
        Ok(())
    }

    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.relay.is_subscribed(topic)
    }

    pub fn is_connected(&self) -> bool {
        self.relay.dispatcher().is_connected()
    }

    pub fn history(&self) -> &Arc<RpcHistory> {
        &self.history
    }

    pub fn relay(&self) -> &Arc<RelayClient> {
        &self.relay
    }
}

impl Drop for NetworkingInteractor {
    fn drop(&mut self) {
        if let Some(task) = self.listener.get_mut().take() {
            task.abort();
        }
    }
}
