// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Session proposals sent by the dApp.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, warn};

use super::context::EngineContext;
use super::namespaces::{validate_proposal_namespaces, ProposalNamespaces};
use super::params::SessionProposeParams;
use super::types::{Participant, Proposal, RelayProtocolOptions};
use crate::api::{SignError, SignResult};
use crate::crypto::PublicKey;
use crate::rpc::{ProtocolMethod, RpcRequest};
use crate::serializer::EnvelopeType;

pub(crate) struct ProposeService {
    ctx: Arc<EngineContext>,
}

impl ProposeService {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        ProposeService { ctx }
    }

    /// Publishes a proposal on `pairing_topic` and returns the proposer key
    /// that will identify it in the wallet's answer.
    pub async fn propose(
        &self,
        pairing_topic: &str,
        required_namespaces: ProposalNamespaces,
        optional_namespaces: ProposalNamespaces,
        session_properties: Option<BTreeMap<String, String>>,
    ) -> SignResult<PublicKey> {
        validate_proposal_namespaces(&required_namespaces).map_err(SignError::Invalid)?;
        validate_proposal_namespaces(&optional_namespaces).map_err(SignError::Invalid)?;
        if self.ctx.pairings.get(pairing_topic)?.is_none() {
            return Err(SignError::PairingNotFound(pairing_topic.to_string()));
        }

        let proposer = self.ctx.kms.create_key_pair()?;
        let expiry = self.ctx.now() + self.ctx.ttl.proposal;
        let params = SessionProposeParams {
            relays: vec![RelayProtocolOptions::default()],
            proposer: Participant {
                public_key: proposer,
                metadata: self.ctx.metadata.clone(),
            },
            required_namespaces,
            optional_namespaces,
            session_properties,
            scoped_properties: None,
            expiry_timestamp: Some(expiry),
        };
        let request = RpcRequest::new(ProtocolMethod::SessionPropose.name(), &params)?;

        // Stored before publishing: the answer may arrive before the publish ack.
        let sent = Proposal {
            id: request.id,
            pairing_topic: pairing_topic.to_string(),
            proposer: params.proposer,
            relays: params.relays,
            required_namespaces: params.required_namespaces,
            optional_namespaces: params.optional_namespaces,
            session_properties: params.session_properties,
            scoped_properties: params.scoped_properties,
            expiry_timestamp: expiry,
        };
        if let Err(e) = self.ctx.proposals.set_sent(&sent) {
            self.discard_key(&proposer);
            return Err(e.into());
        }

        if let Err(e) = self
            .ctx
            .interactor
            .request(
                &request,
                pairing_topic,
                ProtocolMethod::SessionPropose,
                EnvelopeType::Type0,
            )
            .await
        {
            self.discard_key(&proposer);
            if let Err(e) = self.ctx.proposals.delete_sent(&proposer) {
                warn!(error = %e, "failed to delete sent proposal");
            }
            return Err(SignError::from_networking(e));
        }

        info!(topic = %pairing_topic, id = %request.id, "session proposed");
        Ok(proposer)
    }

    fn discard_key(&self, proposer: &PublicKey) {
        if let Err(e) = self.ctx.kms.delete_private_key(proposer) {
            warn!(error = %e, "failed to delete proposer key");
        }
    }
}
