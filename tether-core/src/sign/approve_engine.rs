// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Approve Engine
//!
//! Turns proposals into sessions.
//!
//! Wallet side: a proposal arrives on the pairing topic and is stored by
//! proposer key until the host approves or rejects it. Approval derives the
//! session topic by key agreement and sends the proposal answer and the
//! settlement together; the session is stored only once both are out, and
//! stays unacknowledged until the dApp confirms the settlement.
//!
//! dApp side: the proposal answer carries the wallet key, from which the
//! same session topic is derived. The proposal is remembered under that
//! topic so the settlement can be checked against what was asked for.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::context::{spawn_listener, EngineContext};
use super::namespaces::{
    validate_conformance, validate_proposal_namespaces, validate_session_namespaces,
    SessionNamespaces,
};
use super::pairing_engine::PairingEngine;
use super::params::{SessionProposeParams, SessionProposeResponse, SessionSettleParams};
use super::reason::{Reason, ReasonPayload};
use super::types::{Participant, Proposal, Session, TransportType};
use crate::api::{SignError, SignEvent, SignResult};
use crate::crypto::PublicKey;
use crate::networking::{NetworkingError, RequestSubscriptionPayload, ResponseSubscriptionPayload};
use crate::rpc::{ProtocolMethod, RpcOutcome, RpcRequest, RpcResponse};
use crate::serializer::EnvelopeType;

type SettleOutcome = Result<(), ReasonPayload>;

pub(crate) struct ApproveEngine {
    ctx: Arc<EngineContext>,
    pairing: Arc<PairingEngine>,
    /// Proposals currently being approved or rejected.
    in_flight: Mutex<HashSet<PublicKey>>,
    /// Session topics whose settlement is on the wire but not yet stored,
    /// with the dApp's answer if it overtook the store.
    settling: Mutex<HashMap<String, Option<SettleOutcome>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Releases an in-flight claim on drop.
struct Claim<'a> {
    in_flight: &'a Mutex<HashSet<PublicKey>>,
    proposer: PublicKey,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.proposer);
    }
}

impl ApproveEngine {
    pub fn new(ctx: Arc<EngineContext>, pairing: Arc<PairingEngine>) -> Arc<Self> {
        Arc::new(ApproveEngine {
            ctx,
            pairing,
            in_flight: Mutex::new(HashSet::new()),
            settling: Mutex::new(HashMap::new()),
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn start(self: &Arc<Self>) {
        let interactor = &self.ctx.interactor;
        let tasks = [
            spawn_listener(
                self,
                interactor.subscribe_on_request(ProtocolMethod::SessionPropose),
                |engine: Arc<Self>, payload| async move {
                    engine.handle_session_propose_request(payload).await
                },
            ),
            spawn_listener(
                self,
                interactor.subscribe_on_response(ProtocolMethod::SessionPropose),
                |engine: Arc<Self>, payload| async move {
                    engine.handle_session_propose_response(payload).await
                },
            ),
            spawn_listener(
                self,
                interactor.subscribe_on_request(ProtocolMethod::SessionSettle),
                |engine: Arc<Self>, payload| async move {
                    engine.handle_session_settle_request(payload).await
                },
            ),
            spawn_listener(
                self,
                interactor.subscribe_on_response(ProtocolMethod::SessionSettle),
                |engine: Arc<Self>, payload| async move {
                    engine.handle_session_settle_response(payload).await
                },
            ),
        ];
        self.tasks.lock().extend(tasks);
    }

    fn claim(&self, proposer: &PublicKey) -> SignResult<Claim<'_>> {
        if !self.in_flight.lock().insert(*proposer) {
            debug!(proposer = %proposer, "proposal already being answered");
            return Err(SignError::ProposalNotFound);
        }
        Ok(Claim {
            in_flight: &self.in_flight,
            proposer: *proposer,
        })
    }

    /// Approves the proposal from `proposer` with the granted namespaces.
    pub async fn approve_proposal(
        &self,
        proposer: &PublicKey,
        namespaces: SessionNamespaces,
        session_properties: Option<BTreeMap<String, String>>,
        scoped_properties: Option<BTreeMap<String, String>>,
    ) -> SignResult<Session> {
        if namespaces.is_empty() {
            return Err(SignError::EmptySessionNamespacesForbidden);
        }
        let _claim = self.claim(proposer)?;
        let proposal = self
            .ctx
            .proposals
            .get(proposer)?
            .ok_or(SignError::ProposalNotFound)?;

        let now = self.ctx.now();
        if proposal.is_expired(now) {
            info!(proposer = %proposer, "approving expired proposal");
            self.purge_proposal(&proposal);
            return Err(SignError::ProposalExpired);
        }
        if !self.ctx.interactor.is_connected() {
            return Err(SignError::NetworkNotConnected);
        }

        let granted = validate_session_namespaces(&namespaces)
            .and_then(|_| validate_conformance(&proposal.required_namespaces, &namespaces));
        if let Err(reason) = granted {
            warn!(proposer = %proposer, reason = %reason, "namespaces do not satisfy proposal");
            let response = RpcResponse::error(proposal.id, reason.code(), reason.to_string());
            if let Err(e) = self.answer_proposal(&proposal, &response).await {
                warn!(proposer = %proposer, error = %e, "rejection not delivered");
            }
            self.purge_proposal(&proposal);
            return Err(SignError::UnsupportedNamespace(reason));
        }
        if let Err(reason) = validate_conformance(&proposal.optional_namespaces, &namespaces) {
            debug!(proposer = %proposer, reason = %reason, "optional namespaces partially granted");
        }

        let relay = proposal
            .relays
            .first()
            .cloned()
            .ok_or(SignError::RelayNotFound)?;

        let self_public_key = self.ctx.kms.create_key_pair()?;
        let agreement = match self
            .ctx
            .kms
            .perform_key_agreement(&self_public_key, &proposer.to_hex())
        {
            Ok(agreement) => agreement,
            Err(e) => {
                self.discard_key(&self_public_key);
                return Err(SignError::AgreementMissingOrInvalid(e.to_string()));
            }
        };
        let topic = agreement.derive_topic();
        if let Err(e) = self.ctx.kms.set_agreement_secret(&agreement, &topic) {
            self.discard_key(&self_public_key);
            return Err(e.into());
        }
        if let Err(e) = self.ctx.interactor.subscribe(&topic).await {
            self.rollback(&topic, &self_public_key, None).await;
            return Err(SignError::from_networking(e));
        }

        let self_participant = Participant {
            public_key: self_public_key,
            metadata: self.ctx.metadata.clone(),
        };
        let expiry = now + self.ctx.ttl.session;
        let response = RpcResponse::success(
            proposal.id,
            &SessionProposeResponse {
                relay: relay.clone(),
                responder_public_key: self_public_key,
            },
        )?;
        let settle = RpcRequest::new(
            ProtocolMethod::SessionSettle.name(),
            &SessionSettleParams {
                relay: relay.clone(),
                controller: self_participant.clone(),
                namespaces: namespaces.clone(),
                session_properties: session_properties.clone(),
                scoped_properties: scoped_properties.clone(),
                expiry,
            },
        )?;

        self.settling.lock().insert(topic.clone(), None);
        let (answered, settled) = tokio::join!(
            self.ctx.interactor.publish_response(
                &proposal.pairing_topic,
                &response,
                ProtocolMethod::SessionPropose,
                EnvelopeType::Type0,
            ),
            self.ctx.interactor.request(
                &settle,
                &topic,
                ProtocolMethod::SessionSettle,
                EnvelopeType::Type0,
            ),
        );
        if let Err(e) = answered.and(settled) {
            warn!(topic = %topic, error = %e, "settlement not delivered, rolling back");
            self.settling.lock().remove(&topic);
            self.rollback(&topic, &self_public_key, Some(&settle)).await;
            return Err(SignError::from_networking(e));
        }
        if let Err(e) = self
            .ctx
            .interactor
            .history()
            .resolve(&proposal.pairing_topic, &response)
        {
            debug!(id = %proposal.id, error = %e, "proposal answer not in history");
        }

        let session = Session {
            topic: topic.clone(),
            pairing_topic: proposal.pairing_topic.clone(),
            relay,
            self_participant,
            peer_participant: proposal.proposer.clone(),
            controller: self_public_key,
            namespaces,
            required_namespaces: proposal.required_namespaces.clone(),
            session_properties,
            scoped_properties,
            expiry,
            acknowledged: false,
            transport_type: TransportType::Relay,
            verify_context: self.ctx.verify_contexts.get(proposal.id).ok().flatten(),
        };
        let stored = self.ctx.sessions.set(&session);
        let early_answer = self.settling.lock().remove(&topic).flatten();
        if let Err(e) = stored {
            warn!(topic = %topic, error = %e, "failed to store session, rolling back");
            self.rollback(&topic, &self_public_key, None).await;
            return Err(e.into());
        }

        self.purge_proposal(&proposal);
        if let Err(e) = self
            .pairing
            .activate(&proposal.pairing_topic, Some(proposal.proposer.metadata.clone()))
        {
            debug!(topic = %proposal.pairing_topic, error = %e, "pairing not activated");
        }
        info!(topic = %topic, "session settled");
        self.ctx.emit(SignEvent::SessionSettled {
            session: session.clone(),
        });

        if let Some(outcome) = early_answer {
            self.apply_settle_outcome(&topic, outcome).await;
        }
        Ok(session)
    }

    /// Rejects the proposal from `proposer`; the dApp sees `reason`.
    pub async fn reject_proposal(&self, proposer: &PublicKey, reason: Reason) -> SignResult<()> {
        let _claim = self.claim(proposer)?;
        let proposal = self
            .ctx
            .proposals
            .get(proposer)?
            .ok_or(SignError::ProposalNotFound)?;

        let response = RpcResponse::error(proposal.id, reason.code(), reason.to_string());
        self.answer_proposal(&proposal, &response)
            .await
            .map_err(SignError::from_networking)?;
        self.purge_proposal(&proposal);
        info!(proposer = %proposer, code = reason.code(), "proposal rejected");
        Ok(())
    }

    /// Proposals waiting for an answer, oldest first.
    pub fn pending_proposals(&self) -> SignResult<Vec<Proposal>> {
        let mut proposals = self.ctx.proposals.all()?;
        proposals.sort_by_key(|p| p.id);
        Ok(proposals)
    }

    /// Publishes an answer to a stored proposal, then resolves its history
    /// record if one is still held.
    async fn answer_proposal(
        &self,
        proposal: &Proposal,
        response: &RpcResponse,
    ) -> Result<(), NetworkingError> {
        self.ctx
            .interactor
            .publish_response(
                &proposal.pairing_topic,
                response,
                ProtocolMethod::SessionPropose,
                EnvelopeType::Type0,
            )
            .await?;
        if let Err(e) = self
            .ctx
            .interactor
            .history()
            .resolve(&proposal.pairing_topic, response)
        {
            debug!(id = %proposal.id, error = %e, "proposal answer not in history");
        }
        Ok(())
    }

    fn purge_proposal(&self, proposal: &Proposal) {
        if let Err(e) = self.ctx.proposals.delete(&proposal.proposer.public_key) {
            warn!(id = %proposal.id, error = %e, "failed to delete proposal");
        }
        if let Err(e) = self.ctx.verify_contexts.delete(proposal.id) {
            warn!(id = %proposal.id, error = %e, "failed to delete verify context");
        }
    }

    fn discard_key(&self, public_key: &PublicKey) {
        if let Err(e) = self.ctx.kms.delete_private_key(public_key) {
            warn!(error = %e, "failed to delete private key");
        }
    }

    async fn rollback(&self, topic: &str, public_key: &PublicKey, settle: Option<&RpcRequest>) {
        self.ctx.teardown_topic(topic).await;
        self.discard_key(public_key);
        if let Some(settle) = settle {
            self.ctx.interactor.history().delete(settle.id);
        }
    }

    async fn handle_session_propose_request(&self, payload: RequestSubscriptionPayload) {
        let topic = payload.topic.clone();
        let id = payload.request.id;
        let params: SessionProposeParams = match payload.request.params_as() {
            Ok(params) => params,
            Err(e) => {
                warn!(topic = %topic, id = %id, error = %e, "malformed proposal");
                self.refuse_proposal(&topic, &payload, Reason::InvalidUpdateRequest)
                    .await;
                return;
            }
        };
        let shape = validate_proposal_namespaces(&params.required_namespaces)
            .and_then(|_| validate_proposal_namespaces(&params.optional_namespaces));
        if let Err(reason) = shape {
            warn!(topic = %topic, id = %id, reason = %reason, "proposal namespaces malformed");
            self.refuse_proposal(&topic, &payload, Reason::InvalidUpdateRequest)
                .await;
            return;
        }

        let now = self.ctx.now();
        let expiry = params
            .expiry_timestamp
            .unwrap_or(now + self.ctx.ttl.proposal);
        if now > expiry {
            self.refuse_proposal(&topic, &payload, Reason::SessionRequestExpired)
                .await;
            return;
        }

        let proposal = Proposal {
            id,
            pairing_topic: topic.clone(),
            proposer: params.proposer,
            relays: params.relays,
            required_namespaces: params.required_namespaces,
            optional_namespaces: params.optional_namespaces,
            session_properties: params.session_properties,
            scoped_properties: params.scoped_properties,
            expiry_timestamp: expiry,
        };
        if let Err(e) = self.ctx.proposals.set(&proposal) {
            warn!(topic = %topic, error = %e, "failed to store proposal");
            return;
        }
        if let Err(e) = self
            .pairing
            .activate(&topic, Some(proposal.proposer.metadata.clone()))
        {
            debug!(topic = %topic, error = %e, "pairing not activated");
        }

        let verify_context = self
            .ctx
            .verifier
            .resolve_or_unknown(&payload.attestation_id, &proposal.proposer.metadata.url)
            .await;
        if let Err(e) = self.ctx.verify_contexts.set(id, &verify_context) {
            warn!(id = %id, error = %e, "failed to store verify context");
        }

        info!(topic = %topic, id = %id, proposer = %proposal.proposer.public_key, "session proposal received");
        self.ctx.emit(SignEvent::SessionProposal {
            proposal,
            verify_context,
        });
    }

    async fn refuse_proposal(&self, topic: &str, payload: &RequestSubscriptionPayload, reason: Reason) {
        if let Err(e) = self
            .ctx
            .interactor
            .respond_error(
                topic,
                payload.request.id,
                ProtocolMethod::SessionPropose,
                reason,
            )
            .await
        {
            warn!(topic = %topic, error = %e, "proposal refusal not delivered");
        }
    }

    async fn handle_session_propose_response(&self, payload: ResponseSubscriptionPayload) {
        let params: SessionProposeParams = match payload.request.params_as() {
            Ok(params) => params,
            Err(e) => {
                warn!(topic = %payload.topic, error = %e, "own proposal unreadable");
                return;
            }
        };
        let proposer = params.proposer.public_key;
        if let Err(e) = self.ctx.proposals.delete_sent(&proposer) {
            warn!(topic = %payload.topic, error = %e, "failed to delete sent proposal");
        }

        match payload.response.outcome {
            RpcOutcome::Result(value) => {
                let answer: SessionProposeResponse = match serde_json::from_value(value) {
                    Ok(answer) => answer,
                    Err(e) => {
                        warn!(topic = %payload.topic, error = %e, "malformed proposal answer");
                        return;
                    }
                };
                let request = payload.request;
                if let Err(e) = self
                    .prepare_settlement(&payload.topic, &request, params, answer)
                    .await
                {
                    warn!(topic = %payload.topic, error = %e, "cannot follow approved proposal");
                    self.ctx.emit(SignEvent::Error {
                        message: e.to_string(),
                    });
                }
            }
            RpcOutcome::Error(error) => {
                self.discard_key(&proposer);
                info!(topic = %payload.topic, code = error.code, "proposal rejected by peer");
                self.ctx.emit(SignEvent::SessionRejected {
                    pairing_topic: payload.topic,
                    proposer_public_key: proposer,
                    reason: ReasonPayload {
                        code: error.code,
                        message: error.message,
                    },
                });
            }
        }
    }

    /// Derives the session topic from the wallet's key and waits there for
    /// the settlement.
    async fn prepare_settlement(
        &self,
        pairing_topic: &str,
        request: &RpcRequest,
        params: SessionProposeParams,
        answer: SessionProposeResponse,
    ) -> SignResult<()> {
        let proposer = params.proposer.public_key;
        let agreement = self
            .ctx
            .kms
            .perform_key_agreement(&proposer, &answer.responder_public_key.to_hex())
            .map_err(|e| SignError::AgreementMissingOrInvalid(e.to_string()))?;
        let topic = agreement.derive_topic();
        self.ctx.kms.set_agreement_secret(&agreement, &topic)?;

        let proposal = Proposal {
            id: request.id,
            pairing_topic: pairing_topic.to_string(),
            proposer: params.proposer,
            relays: params.relays,
            required_namespaces: params.required_namespaces,
            optional_namespaces: params.optional_namespaces,
            session_properties: params.session_properties,
            scoped_properties: params.scoped_properties,
            expiry_timestamp: params
                .expiry_timestamp
                .unwrap_or(self.ctx.now() + self.ctx.ttl.proposal),
        };
        self.ctx.proposals.set_pending_settlement(&topic, &proposal)?;
        self.ctx
            .interactor
            .subscribe(&topic)
            .await
            .map_err(SignError::from_networking)?;
        debug!(topic = %topic, "awaiting settlement");
        Ok(())
    }

    async fn handle_session_settle_request(&self, payload: RequestSubscriptionPayload) {
        let topic = payload.topic.clone();
        let id = payload.request.id;
        let proposal = match self.ctx.proposals.pending_settlement(&topic) {
            Ok(Some(proposal)) => proposal,
            Ok(None) => {
                warn!(topic = %topic, "settlement without pending proposal");
                self.respond_settle_error(&topic, &payload, Reason::SessionSettlementFailed)
                    .await;
                return;
            }
            Err(e) => {
                warn!(topic = %topic, error = %e, "pending proposal unreadable");
                self.respond_settle_error(&topic, &payload, Reason::SessionSettlementFailed)
                    .await;
                return;
            }
        };

        let now = self.ctx.now();
        let params = payload
            .request
            .params_as::<SessionSettleParams>()
            .map_err(|_| Reason::InvalidSessionSettleRequest)
            .and_then(|params| {
                validate_session_namespaces(&params.namespaces)?;
                validate_conformance(&proposal.required_namespaces, &params.namespaces)?;
                if params.expiry <= now {
                    return Err(Reason::InvalidSessionSettleRequest);
                }
                Ok(params)
            });
        let params = match params {
            Ok(params) => params,
            Err(reason) => {
                warn!(topic = %topic, id = %id, reason = %reason, "settlement refused");
                self.respond_settle_error(&topic, &payload, reason).await;
                self.abandon_settlement(&topic, &proposal).await;
                self.ctx.emit(SignEvent::SessionRejected {
                    pairing_topic: proposal.pairing_topic.clone(),
                    proposer_public_key: proposal.proposer.public_key,
                    reason: reason.payload(),
                });
                return;
            }
        };

        let session = Session {
            topic: topic.clone(),
            pairing_topic: proposal.pairing_topic.clone(),
            relay: params.relay,
            self_participant: proposal.proposer.clone(),
            peer_participant: params.controller.clone(),
            controller: params.controller.public_key,
            namespaces: params.namespaces,
            required_namespaces: proposal.required_namespaces.clone(),
            session_properties: params.session_properties,
            scoped_properties: params.scoped_properties,
            expiry: params.expiry,
            acknowledged: true,
            transport_type: payload.transport_type,
            verify_context: None,
        };
        if let Err(e) = self.ctx.sessions.set(&session) {
            warn!(topic = %topic, error = %e, "failed to store session");
            self.respond_settle_error(&topic, &payload, Reason::SessionSettlementFailed)
                .await;
            return;
        }
        if let Err(e) = self
            .ctx
            .interactor
            .respond_success(&topic, id, ProtocolMethod::SessionSettle, &true)
            .await
        {
            warn!(topic = %topic, error = %e, "settlement acknowledgement not delivered");
        }
        if let Err(e) = self.ctx.proposals.delete_pending_settlement(&topic) {
            warn!(topic = %topic, error = %e, "failed to clear pending settlement");
        }
        if let Err(e) = self.pairing.activate(
            &proposal.pairing_topic,
            Some(params.controller.metadata.clone()),
        ) {
            debug!(topic = %proposal.pairing_topic, error = %e, "pairing not activated");
        }

        info!(topic = %topic, "session settled by peer");
        self.ctx.emit(SignEvent::SessionSettled { session });
    }

    async fn respond_settle_error(
        &self,
        topic: &str,
        payload: &RequestSubscriptionPayload,
        reason: Reason,
    ) {
        if let Err(e) = self
            .ctx
            .interactor
            .respond_error(topic, payload.request.id, ProtocolMethod::SessionSettle, reason)
            .await
        {
            warn!(topic = %topic, error = %e, "settlement error not delivered");
        }
    }

    async fn abandon_settlement(&self, topic: &str, proposal: &Proposal) {
        if let Err(e) = self.ctx.proposals.delete_pending_settlement(topic) {
            warn!(topic = %topic, error = %e, "failed to clear pending settlement");
        }
        self.ctx.teardown_topic(topic).await;
        self.discard_key(&proposal.proposer.public_key);
    }

    async fn handle_session_settle_response(&self, payload: ResponseSubscriptionPayload) {
        let outcome = match payload.response.outcome {
            RpcOutcome::Result(_) => Ok(()),
            RpcOutcome::Error(error) => Err(ReasonPayload {
                code: error.code,
                message: error.message,
            }),
        };
        {
            let mut settling = self.settling.lock();
            if let Some(slot) = settling.get_mut(&payload.topic) {
                debug!(topic = %payload.topic, "settlement answered before store");
                *slot = Some(outcome);
                return;
            }
        }
        self.apply_settle_outcome(&payload.topic, outcome).await;
    }

    async fn apply_settle_outcome(&self, topic: &str, outcome: SettleOutcome) {
        match outcome {
            Ok(()) => match self.ctx.sessions.acknowledge(topic) {
                Ok(Some(_)) => {
                    info!(topic = %topic, "session acknowledged");
                    self.ctx.emit(SignEvent::SessionAcknowledged {
                        topic: topic.to_string(),
                    });
                }
                Ok(None) => debug!(topic = %topic, "acknowledgement for unknown session"),
                Err(e) => warn!(topic = %topic, error = %e, "failed to acknowledge session"),
            },
            Err(reason) => {
                warn!(topic = %topic, code = reason.code, "settlement refused by peer");
                match self.ctx.sessions.get(topic) {
                    Ok(Some(session)) => self.ctx.teardown_session(&session).await,
                    Ok(None) => self.ctx.teardown_topic(topic).await,
                    Err(e) => warn!(topic = %topic, error = %e, "session unreadable"),
                }
                self.ctx.emit(SignEvent::SessionSettleFailed {
                    topic: topic.to_string(),
                    reason,
                });
            }
        }
    }
}

impl Drop for ApproveEngine {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::MockRelay;
    use crate::sign::context::test_support::{next_event, peer, TestPeer};
    use crate::sign::namespaces::{ProposalNamespace, ProposalNamespaces, SessionNamespace};
    use crate::sign::propose::ProposeService;

    struct Side {
        peer: TestPeer,
        pairing: Arc<PairingEngine>,
        approve: Arc<ApproveEngine>,
    }

    fn side(relay: &MockRelay, name: &str) -> Side {
        let peer = peer(relay, name);
        let pairing = PairingEngine::new(peer.ctx.clone());
        let approve = ApproveEngine::new(peer.ctx.clone(), pairing.clone());
        pairing.start();
        approve.start();
        Side {
            peer,
            pairing,
            approve,
        }
    }

    fn required() -> ProposalNamespaces {
        let mut required = ProposalNamespaces::new();
        required.insert(
            "eip155".into(),
            ProposalNamespace::new(
                vec!["eip155:1".parse().unwrap()],
                vec!["personal_sign".to_string()],
                Vec::<String>::new(),
            ),
        );
        required
    }

    fn granted(chain: &str) -> SessionNamespaces {
        let mut namespaces = SessionNamespaces::new();
        namespaces.insert(
            "eip155".into(),
            SessionNamespace::new(
                vec![format!("{}:0xab16a96d359ec26a11e2c2b3d8f8b8942d5bfcdb", chain)
                    .parse()
                    .unwrap()],
                vec!["personal_sign".to_string()],
                Vec::<String>::new(),
            ),
        );
        namespaces
    }

    /// Pairs both sides and delivers one proposal to the wallet.
    async fn proposed(dapp: &Side, wallet: &mut Side) -> Proposal {
        let uri = dapp.pairing.create().await.unwrap();
        wallet.pairing.pair(&uri.to_string()).await.unwrap();
        ProposeService::new(dapp.peer.ctx.clone())
            .propose(&uri.topic, required(), ProposalNamespaces::new(), None)
            .await
            .unwrap();
        next_event(&mut wallet.peer.events, |event| match event {
            SignEvent::SessionProposal { proposal, .. } => Some(proposal),
            _ => None,
        })
        .await
    }

    #[tokio::test]
    async fn test_approve_settles_both_sides() {
        let relay = MockRelay::new();
        let mut dapp = side(&relay, "dapp");
        let mut wallet = side(&relay, "wallet");
        let proposal = proposed(&dapp, &mut wallet).await;

        let session = wallet
            .approve
            .approve_proposal(&proposal.proposer.public_key, granted("eip155:1"), None, None)
            .await
            .unwrap();
        assert!(!session.acknowledged);
        assert!(session.self_is_controller());

        let settled = next_event(&mut dapp.peer.events, |event| match event {
            SignEvent::SessionSettled { session } => Some(session),
            _ => None,
        })
        .await;
        assert_eq!(settled.topic, session.topic);
        assert!(settled.acknowledged);
        assert!(settled.peer_is_controller());

        let acknowledged = next_event(&mut wallet.peer.events, |event| match event {
            SignEvent::SessionAcknowledged { topic } => Some(topic),
            _ => None,
        })
        .await;
        assert_eq!(acknowledged, session.topic);
        assert!(wallet.peer.ctx.sessions.get(&session.topic).unwrap().unwrap().acknowledged);
        assert!(wallet.peer.ctx.proposals.all().unwrap().is_empty());
        assert!(dapp.peer.ctx.proposals.all_pending_settlements().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_second_approval_finds_nothing() {
        let relay = MockRelay::new();
        let dapp = side(&relay, "dapp");
        let mut wallet = side(&relay, "wallet");
        let proposal = proposed(&dapp, &mut wallet).await;
        let key = proposal.proposer.public_key;

        wallet
            .approve
            .approve_proposal(&key, granted("eip155:1"), None, None)
            .await
            .unwrap();
        let again = wallet
            .approve
            .approve_proposal(&key, granted("eip155:1"), None, None)
            .await;
        assert!(matches!(again, Err(SignError::ProposalNotFound)));
    }

    #[tokio::test]
    async fn test_empty_namespaces_fail_before_io() {
        let relay = MockRelay::new();
        let dapp = side(&relay, "dapp");
        let mut wallet = side(&relay, "wallet");
        let proposal = proposed(&dapp, &mut wallet).await;
        let publishes = relay.call_count("irn_publish");

        let result = wallet
            .approve
            .approve_proposal(
                &proposal.proposer.public_key,
                SessionNamespaces::new(),
                None,
                None,
            )
            .await;
        assert!(matches!(result, Err(SignError::EmptySessionNamespacesForbidden)));
        assert_eq!(relay.call_count("irn_publish"), publishes);
        assert!(wallet
            .peer
            .ctx
            .proposals
            .get(&proposal.proposer.public_key)
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_expired_proposal_is_purged() {
        let relay = MockRelay::new();
        let dapp = side(&relay, "dapp");
        let mut wallet = side(&relay, "wallet");
        let proposal = proposed(&dapp, &mut wallet).await;
        let key = proposal.proposer.public_key;

        wallet.peer.clock.set(proposal.expiry_timestamp + 1);
        let first = wallet
            .approve
            .approve_proposal(&key, granted("eip155:1"), None, None)
            .await;
        assert!(matches!(first, Err(SignError::ProposalExpired)));
        let second = wallet
            .approve
            .approve_proposal(&key, granted("eip155:1"), None, None)
            .await;
        assert!(matches!(second, Err(SignError::ProposalNotFound)));
    }

    #[tokio::test]
    async fn test_unsupported_namespace_is_sent_to_proposer() {
        let relay = MockRelay::new();
        let mut dapp = side(&relay, "dapp");
        let mut wallet = side(&relay, "wallet");
        let proposal = proposed(&dapp, &mut wallet).await;

        let result = wallet
            .approve
            .approve_proposal(&proposal.proposer.public_key, granted("eip155:137"), None, None)
            .await;
        assert!(matches!(
            result,
            Err(SignError::UnsupportedNamespace(Reason::UnsupportedChains))
        ));
        assert!(wallet.peer.ctx.sessions.all().unwrap().is_empty());

        let reason = next_event(&mut dapp.peer.events, |event| match event {
            SignEvent::SessionRejected { reason, .. } => Some(reason),
            _ => None,
        })
        .await;
        assert_eq!(reason.reason(), Some(Reason::UnsupportedChains));
    }

    #[tokio::test]
    async fn test_reject_reaches_proposer() {
        let relay = MockRelay::new();
        let mut dapp = side(&relay, "dapp");
        let mut wallet = side(&relay, "wallet");
        let proposal = proposed(&dapp, &mut wallet).await;
        let key = proposal.proposer.public_key;

        wallet
            .approve
            .reject_proposal(&key, Reason::UserRejected)
            .await
            .unwrap();
        let (proposer, reason) = next_event(&mut dapp.peer.events, |event| match event {
            SignEvent::SessionRejected {
                proposer_public_key,
                reason,
                ..
            } => Some((proposer_public_key, reason)),
            _ => None,
        })
        .await;
        assert_eq!(proposer, key);
        assert_eq!(reason.code, 5000);
        assert!(!dapp.peer.ctx.kms.has_private_key(&key).unwrap());
        assert!(dapp.peer.ctx.proposals.sent(&key).unwrap().is_none());
        assert!(wallet.approve.pending_proposals().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_proposal_is_refused_unstored() {
        let relay = MockRelay::new();
        let mut dapp = side(&relay, "dapp");
        let wallet = side(&relay, "wallet");
        let uri = dapp.pairing.create().await.unwrap();
        wallet.pairing.pair(&uri.to_string()).await.unwrap();

        let mut bad = required();
        bad.get_mut("eip155").unwrap().methods.clear();
        let params = SessionProposeParams {
            relays: vec![Default::default()],
            proposer: Participant {
                public_key: dapp.peer.ctx.kms.create_key_pair().unwrap(),
                metadata: dapp.peer.ctx.metadata.clone(),
            },
            required_namespaces: bad,
            optional_namespaces: ProposalNamespaces::new(),
            session_properties: None,
            scoped_properties: None,
            expiry_timestamp: None,
        };
        let request = RpcRequest::new(ProtocolMethod::SessionPropose.name(), &params).unwrap();
        dapp.peer
            .ctx
            .interactor
            .request(&request, &uri.topic, ProtocolMethod::SessionPropose, EnvelopeType::Type0)
            .await
            .unwrap();

        let reason = next_event(&mut dapp.peer.events, |event| match event {
            SignEvent::SessionRejected { reason, .. } => Some(reason),
            _ => None,
        })
        .await;
        assert_eq!(reason.reason(), Some(Reason::InvalidUpdateRequest));
        assert!(wallet.peer.ctx.proposals.all().unwrap().is_empty());
    }
}
