// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Session Engine
//!
//! Everything that happens on a settled session topic: chain requests and
//! their responses, wallet events, controller updates and extensions,
//! pings and deletion. Inbound calls are checked against the namespaces
//! the session grants before the host ever sees them.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::context::{spawn_listener, EngineContext};
use super::namespaces::{
    validate_conformance, validate_session_namespaces, Blockchain, SessionNamespaces,
};
use super::params::{
    DeleteParams, EventPayload, PingParams, RequestPayload, SessionEventParams,
    SessionExtendParams, SessionRequestParams, SessionUpdateParams,
};
use super::reason::Reason;
use super::types::Session;
use crate::api::{SignError, SignEvent, SignResult};
use crate::networking::{RequestSubscriptionPayload, ResponseSubscriptionPayload};
use crate::rpc::{Emitter, ProtocolMethod, RpcId, RpcOutcome, RpcRequest, RpcResponse};
use crate::serializer::EnvelopeType;

pub(crate) struct SessionEngine {
    ctx: Arc<EngineContext>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SessionEngine {
    pub fn new(ctx: Arc<EngineContext>) -> Arc<Self> {
        Arc::new(SessionEngine {
            ctx,
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn start(self: &Arc<Self>) {
        let interactor = &self.ctx.interactor;
        let tasks = [
            spawn_listener(
                self,
                interactor.subscribe_on_request(ProtocolMethod::SessionRequest),
                |engine: Arc<Self>, payload| async move { engine.on_request(payload).await },
            ),
            spawn_listener(
                self,
                interactor.subscribe_on_response(ProtocolMethod::SessionRequest),
                |engine: Arc<Self>, payload| async move { engine.on_request_response(payload) },
            ),
            spawn_listener(
                self,
                interactor.subscribe_on_request(ProtocolMethod::SessionEvent),
                |engine: Arc<Self>, payload| async move { engine.on_event(payload).await },
            ),
            spawn_listener(
                self,
                interactor.subscribe_on_request(ProtocolMethod::SessionUpdate),
                |engine: Arc<Self>, payload| async move { engine.on_update(payload).await },
            ),
            spawn_listener(
                self,
                interactor.subscribe_on_request(ProtocolMethod::SessionExtend),
                |engine: Arc<Self>, payload| async move { engine.on_extend(payload).await },
            ),
            spawn_listener(
                self,
                interactor.subscribe_on_request(ProtocolMethod::SessionDelete),
                |engine: Arc<Self>, payload| async move { engine.on_delete(payload).await },
            ),
            spawn_listener(
                self,
                interactor.subscribe_on_request(ProtocolMethod::SessionPing),
                |engine: Arc<Self>, payload| async move { engine.on_ping(payload).await },
            ),
        ];
        self.tasks.lock().extend(tasks);
    }

    pub fn sessions(&self) -> SignResult<Vec<Session>> {
        Ok(self.ctx.sessions.all()?)
    }

    /// The stored, unexpired session on `topic`.
    fn session(&self, topic: &str) -> SignResult<Session> {
        let session = self
            .ctx
            .sessions
            .get(topic)?
            .ok_or_else(|| SignError::SessionNotFound(topic.to_string()))?;
        if session.is_expired(self.ctx.now()) {
            return Err(SignError::SessionExpired(topic.to_string()));
        }
        Ok(session)
    }

    /// Sends a chain call to the wallet. The answer arrives later as
    /// [`SignEvent::SessionResponse`].
    pub async fn request(
        &self,
        topic: &str,
        chain_id: Blockchain,
        request: RequestPayload,
    ) -> SignResult<RpcId> {
        let session = self.session(topic)?;
        if !session.has_method(&chain_id, &request.method) {
            return Err(SignError::Unauthorized(Reason::UnauthorizedMethod));
        }
        if request
            .expiry_timestamp
            .is_some_and(|expiry| self.ctx.now() > expiry)
        {
            return Err(SignError::Invalid(Reason::SessionRequestExpired));
        }

        let rpc = RpcRequest::new(
            ProtocolMethod::SessionRequest.name(),
            &SessionRequestParams { request, chain_id },
        )?;
        self.ctx
            .interactor
            .request(&rpc, topic, ProtocolMethod::SessionRequest, EnvelopeType::Type0)
            .await
            .map_err(SignError::from_networking)?;
        debug!(topic = %topic, id = %rpc.id, "session request sent");
        Ok(rpc.id)
    }

    /// Answers a pending chain call from the dApp.
    pub async fn respond(&self, topic: &str, id: RpcId, outcome: RpcOutcome) -> SignResult<()> {
        self.session(topic)?;
        let pending = self.ctx.interactor.history().get(id).filter(|record| {
            record.topic == topic && record.emitter == Emitter::Remote && !record.is_resolved()
        });
        if pending.is_none() {
            return Err(SignError::RequestNotFound(id.to_string()));
        }

        let response = match outcome {
            RpcOutcome::Result(value) => RpcResponse::success(id, &value)?,
            RpcOutcome::Error(error) => RpcResponse::error(id, error.code, error.message),
        };
        self.ctx
            .interactor
            .respond(topic, &response, ProtocolMethod::SessionRequest, EnvelopeType::Type0)
            .await
            .map_err(SignError::from_networking)?;
        if let Err(e) = self.ctx.verify_contexts.delete(id) {
            warn!(id = %id, error = %e, "failed to delete verify context");
        }
        Ok(())
    }

    /// Emits a chain event to the dApp.
    pub async fn emit(&self, topic: &str, chain_id: Blockchain, event: EventPayload) -> SignResult<()> {
        let session = self.session(topic)?;
        if !session.has_event(&chain_id, &event.name) {
            return Err(SignError::Unauthorized(Reason::UnauthorizedEvent));
        }
        let rpc = RpcRequest::new(
            ProtocolMethod::SessionEvent.name(),
            &SessionEventParams { event, chain_id },
        )?;
        self.ctx
            .interactor
            .request(&rpc, topic, ProtocolMethod::SessionEvent, EnvelopeType::Type0)
            .await
            .map_err(SignError::from_networking)
    }

    /// Replaces the granted namespaces once the peer accepts them.
    pub async fn update(&self, topic: &str, namespaces: SessionNamespaces) -> SignResult<()> {
        let session = self.session(topic)?;
        if !session.self_is_controller() {
            return Err(SignError::NotController);
        }
        validate_session_namespaces(&namespaces)
            .and_then(|_| validate_conformance(&session.required_namespaces, &namespaces))
            .map_err(SignError::Invalid)?;

        let rpc = RpcRequest::new(
            ProtocolMethod::SessionUpdate.name(),
            &SessionUpdateParams {
                namespaces: namespaces.clone(),
            },
        )?;
        let _: bool = self
            .ctx
            .interactor
            .await_response(&rpc, topic, ProtocolMethod::SessionUpdate, EnvelopeType::Type0)
            .await
            .map_err(SignError::from_networking)?;

        self.ctx
            .sessions
            .update(topic, |session| session.namespaces = namespaces)?
            .ok_or_else(|| SignError::SessionNotFound(topic.to_string()))?;
        info!(topic = %topic, "session updated");
        Ok(())
    }

    /// Pushes the expiry to a full session lifetime from now.
    pub async fn extend(&self, topic: &str) -> SignResult<u64> {
        let session = self.session(topic)?;
        if !session.self_is_controller() {
            return Err(SignError::NotController);
        }
        let expiry = self.ctx.now() + self.ctx.ttl.session;
        let rpc = RpcRequest::new(
            ProtocolMethod::SessionExtend.name(),
            &SessionExtendParams { expiry },
        )?;
        let _: bool = self
            .ctx
            .interactor
            .await_response(&rpc, topic, ProtocolMethod::SessionExtend, EnvelopeType::Type0)
            .await
            .map_err(SignError::from_networking)?;

        self.ctx
            .sessions
            .update(topic, |session| session.expiry = expiry)?
            .ok_or_else(|| SignError::SessionNotFound(topic.to_string()))?;
        info!(topic = %topic, expiry, "session extended");
        Ok(expiry)
    }

    pub async fn ping(&self, topic: &str) -> SignResult<()> {
        self.session(topic)?;
        let rpc = RpcRequest::new(ProtocolMethod::SessionPing.name(), &PingParams {})?;
        let _: bool = self
            .ctx
            .interactor
            .await_response(&rpc, topic, ProtocolMethod::SessionPing, EnvelopeType::Type0)
            .await
            .map_err(SignError::from_networking)?;
        Ok(())
    }

    /// Deletes the session on both sides. The peer is told best-effort;
    /// the local teardown always happens.
    pub async fn disconnect(&self, topic: &str) -> SignResult<()> {
        let session = self
            .ctx
            .sessions
            .get(topic)?
            .ok_or_else(|| SignError::SessionNotFound(topic.to_string()))?;
        if self.ctx.interactor.is_connected() {
            let rpc = RpcRequest::new(
                ProtocolMethod::SessionDelete.name(),
                &DeleteParams::from(Reason::UserDisconnected),
            )?;
            if let Err(e) = self
                .ctx
                .interactor
                .request(&rpc, topic, ProtocolMethod::SessionDelete, EnvelopeType::Type0)
                .await
            {
                warn!(topic = %topic, error = %e, "session delete not delivered");
            }
        }
        self.ctx.teardown_session(&session).await;
        info!(topic = %topic, "session disconnected");
        Ok(())
    }

    /// The live session an inbound request targets, or the reason to refuse.
    fn inbound_session(&self, topic: &str) -> Result<Session, Reason> {
        match self.ctx.sessions.get(topic) {
            Ok(Some(session)) if !session.is_expired(self.ctx.now()) => Ok(session),
            Ok(_) => Err(Reason::NoSessionForTopic),
            Err(e) => {
                warn!(topic = %topic, error = %e, "session unreadable");
                Err(Reason::NoSessionForTopic)
            }
        }
    }

    async fn refuse(&self, payload: &RequestSubscriptionPayload, method: ProtocolMethod, reason: Reason) {
        debug!(topic = %payload.topic, method = method.name(), reason = %reason, "refusing peer request");
        if let Err(e) = self
            .ctx
            .interactor
            .respond_error(&payload.topic, payload.request.id, method, reason)
            .await
        {
            warn!(topic = %payload.topic, error = %e, "refusal not delivered");
        }
    }

    async fn accept(&self, payload: &RequestSubscriptionPayload, method: ProtocolMethod) {
        if let Err(e) = self
            .ctx
            .interactor
            .respond_success(&payload.topic, payload.request.id, method, &true)
            .await
        {
            warn!(topic = %payload.topic, method = method.name(), error = %e, "response not delivered");
        }
    }

    async fn on_request(&self, payload: RequestSubscriptionPayload) {
        const METHOD: ProtocolMethod = ProtocolMethod::SessionRequest;
        let session = match self.inbound_session(&payload.topic) {
            Ok(session) => session,
            Err(reason) => return self.refuse(&payload, METHOD, reason).await,
        };
        let params: SessionRequestParams = match payload.request.params_as() {
            Ok(params) => params,
            Err(_) => return self.refuse(&payload, METHOD, Reason::InvalidMethod).await,
        };
        if params
            .request
            .expiry_timestamp
            .is_some_and(|expiry| self.ctx.now() > expiry)
        {
            return self
                .refuse(&payload, METHOD, Reason::SessionRequestExpired)
                .await;
        }
        if !session.has_method(&params.chain_id, &params.request.method) {
            return self
                .refuse(&payload, METHOD, Reason::UnauthorizedMethod)
                .await;
        }

        let verify_context = self
            .ctx
            .verifier
            .resolve_or_unknown(&payload.attestation_id, &session.peer_participant.metadata.url)
            .await;
        if let Err(e) = self
            .ctx
            .verify_contexts
            .set(payload.request.id, &verify_context)
        {
            warn!(id = %payload.request.id, error = %e, "failed to store verify context");
        }

        debug!(topic = %payload.topic, id = %payload.request.id, method = %params.request.method, "session request received");
        self.ctx.emit(SignEvent::SessionRequest {
            topic: payload.topic,
            id: payload.request.id,
            chain_id: params.chain_id,
            request: params.request,
            verify_context,
        });
    }

    fn on_request_response(&self, payload: ResponseSubscriptionPayload) {
        let chain_id = match payload.request.params_as::<SessionRequestParams>() {
            Ok(params) => params.chain_id,
            Err(e) => {
                warn!(topic = %payload.topic, error = %e, "own request unreadable");
                return;
            }
        };
        self.ctx.emit(SignEvent::SessionResponse {
            topic: payload.topic,
            id: payload.response.id,
            chain_id,
            outcome: payload.response.outcome,
        });
    }

    async fn on_event(&self, payload: RequestSubscriptionPayload) {
        const METHOD: ProtocolMethod = ProtocolMethod::SessionEvent;
        let session = match self.inbound_session(&payload.topic) {
            Ok(session) => session,
            Err(reason) => return self.refuse(&payload, METHOD, reason).await,
        };
        let params: SessionEventParams = match payload.request.params_as() {
            Ok(params) => params,
            Err(_) => return self.refuse(&payload, METHOD, Reason::InvalidEvent).await,
        };
        if !session.has_event(&params.chain_id, &params.event.name) {
            return self
                .refuse(&payload, METHOD, Reason::UnauthorizedEvent)
                .await;
        }
        self.accept(&payload, METHOD).await;
        self.ctx.emit(SignEvent::SessionEvent {
            topic: payload.topic,
            chain_id: params.chain_id,
            event: params.event,
        });
    }

    async fn on_update(&self, payload: RequestSubscriptionPayload) {
        const METHOD: ProtocolMethod = ProtocolMethod::SessionUpdate;
        let session = match self.inbound_session(&payload.topic) {
            Ok(session) => session,
            Err(reason) => return self.refuse(&payload, METHOD, reason).await,
        };
        if !session.peer_is_controller() {
            return self
                .refuse(&payload, METHOD, Reason::UnauthorizedUpdateRequest)
                .await;
        }
        let namespaces = payload
            .request
            .params_as::<SessionUpdateParams>()
            .map_err(|_| Reason::InvalidUpdateRequest)
            .and_then(|params| {
                validate_session_namespaces(&params.namespaces)
                    .and_then(|_| {
                        validate_conformance(&session.required_namespaces, &params.namespaces)
                    })
                    .map_err(|_| Reason::InvalidUpdateRequest)?;
                Ok(params.namespaces)
            });
        let namespaces = match namespaces {
            Ok(namespaces) => namespaces,
            Err(reason) => return self.refuse(&payload, METHOD, reason).await,
        };

        let stored = self.ctx.sessions.update(&payload.topic, |session| {
            session.namespaces = namespaces.clone();
        });
        match stored {
            Ok(Some(_)) => {}
            Ok(None) => {
                return self
                    .refuse(&payload, METHOD, Reason::NoSessionForTopic)
                    .await
            }
            Err(e) => {
                warn!(topic = %payload.topic, error = %e, "failed to store update");
                return self
                    .refuse(&payload, METHOD, Reason::InvalidUpdateRequest)
                    .await;
            }
        }
        self.accept(&payload, METHOD).await;
        info!(topic = %payload.topic, "session updated by peer");
        self.ctx.emit(SignEvent::SessionUpdated {
            topic: payload.topic,
            namespaces,
        });
    }

    async fn on_extend(&self, payload: RequestSubscriptionPayload) {
        const METHOD: ProtocolMethod = ProtocolMethod::SessionExtend;
        let session = match self.inbound_session(&payload.topic) {
            Ok(session) => session,
            Err(reason) => return self.refuse(&payload, METHOD, reason).await,
        };
        if !session.peer_is_controller() {
            return self
                .refuse(&payload, METHOD, Reason::UnauthorizedExtendRequest)
                .await;
        }
        let ceiling = self.ctx.now() + self.ctx.ttl.session;
        let expiry = match payload.request.params_as::<SessionExtendParams>() {
            Ok(params) if params.expiry >= session.expiry && params.expiry <= ceiling => {
                params.expiry
            }
            _ => {
                return self
                    .refuse(&payload, METHOD, Reason::InvalidExtendRequest)
                    .await
            }
        };

        let stored = self
            .ctx
            .sessions
            .update(&payload.topic, |session| session.expiry = expiry);
        match stored {
            Ok(Some(_)) => {}
            Ok(None) => {
                return self
                    .refuse(&payload, METHOD, Reason::NoSessionForTopic)
                    .await
            }
            Err(e) => {
                warn!(topic = %payload.topic, error = %e, "failed to store extension");
                return self
                    .refuse(&payload, METHOD, Reason::InvalidExtendRequest)
                    .await;
            }
        }
        self.accept(&payload, METHOD).await;
        info!(topic = %payload.topic, expiry, "session extended by peer");
        self.ctx.emit(SignEvent::SessionExtended {
            topic: payload.topic,
            expiry,
        });
    }

    async fn on_delete(&self, payload: RequestSubscriptionPayload) {
        const METHOD: ProtocolMethod = ProtocolMethod::SessionDelete;
        let session = match self.ctx.sessions.get(&payload.topic) {
            Ok(Some(session)) => session,
            Ok(None) => {
                return self
                    .refuse(&payload, METHOD, Reason::NoSessionForTopic)
                    .await
            }
            Err(e) => {
                warn!(topic = %payload.topic, error = %e, "session unreadable");
                return;
            }
        };
        let reason = payload
            .request
            .params_as::<DeleteParams>()
            .unwrap_or_else(|_| Reason::UserDisconnected.payload());

        self.accept(&payload, METHOD).await;
        self.ctx.teardown_session(&session).await;
        info!(topic = %payload.topic, code = reason.code, "session deleted by peer");
        self.ctx.emit(SignEvent::SessionDeleted {
            topic: payload.topic,
            reason,
        });
    }

    async fn on_ping(&self, payload: RequestSubscriptionPayload) {
        const METHOD: ProtocolMethod = ProtocolMethod::SessionPing;
        if let Err(reason) = self.inbound_session(&payload.topic) {
            return self.refuse(&payload, METHOD, reason).await;
        }
        self.accept(&payload, METHOD).await;
        self.ctx.emit(SignEvent::SessionPing {
            topic: payload.topic,
        });
    }
}

impl Drop for SessionEngine {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}
