// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Sign Data Model
//!
//! Pairings, proposals and sessions as held by each peer. The remote peer
//! keeps its own mirror of every session under the same topic; the two
//! copies are reconciled only through protocol messages.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::namespaces::{
    namespace_for_chain, Blockchain, ProposalNamespaces, SessionNamespaces,
};
use crate::crypto::PublicKey;
use crate::rpc::RpcId;

/// Relay protocol name used by default.
pub const DEFAULT_RELAY_PROTOCOL: &str = "irn";

/// Deep-link targets for an app.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redirect {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub universal: Option<String>,
    #[serde(default, rename = "linkMode")]
    pub link_mode: bool,
}

/// Public description of an app, shown to the peer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppMetadata {
    pub name: String,
    pub description: String,
    pub url: String,
    #[serde(default)]
    pub icons: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect: Option<Redirect>,
}

impl AppMetadata {
    pub fn new(name: &str, description: &str, url: &str) -> Self {
        AppMetadata {
            name: name.to_string(),
            description: description.to_string(),
            url: url.to_string(),
            icons: Vec::new(),
            redirect: None,
        }
    }

    pub fn with_icon(mut self, icon: &str) -> Self {
        self.icons.push(icon.to_string());
        self
    }
}

/// One side of a pairing or session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub public_key: PublicKey,
    pub metadata: AppMetadata,
}

/// Relay options carried by proposals and settlements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayProtocolOptions {
    pub protocol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl Default for RelayProtocolOptions {
    fn default() -> Self {
        RelayProtocolOptions {
            protocol: DEFAULT_RELAY_PROTOCOL.to_string(),
            data: None,
        }
    }
}

/// How a session's messages travel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransportType {
    #[default]
    Relay,
    LinkMode,
}

/// Trust verdict from the verify service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Validation {
    #[default]
    Unknown,
    Valid,
    Invalid,
    Scam,
}

/// Display-only trust annotation for a proposal or request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyContext {
    pub origin: Option<String>,
    pub validation: Validation,
    pub verify_url: String,
    #[serde(default)]
    pub is_scam: bool,
}

impl VerifyContext {
    /// Context used when the verify service is unreachable or silent.
    pub fn unknown(verify_url: &str) -> Self {
        VerifyContext {
            origin: None,
            validation: Validation::Unknown,
            verify_url: verify_url.to_string(),
            is_scam: false,
        }
    }
}

/// A 64-char lowercase hex relay topic.
pub type Topic = String;

/// Provisional channel used for the proposal handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pairing {
    pub topic: Topic,
    pub relay: RelayProtocolOptions,
    pub peer_metadata: Option<AppMetadata>,
    pub expiry: u64,
    pub active: bool,
}

impl Pairing {
    pub fn is_expired(&self, now: u64) -> bool {
        now > self.expiry
    }
}

/// An unconfirmed session request held by the responder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    pub id: RpcId,
    pub pairing_topic: Topic,
    pub proposer: Participant,
    pub relays: Vec<RelayProtocolOptions>,
    pub required_namespaces: ProposalNamespaces,
    pub optional_namespaces: ProposalNamespaces,
    pub session_properties: Option<BTreeMap<String, String>>,
    pub scoped_properties: Option<BTreeMap<String, String>>,
    pub expiry_timestamp: u64,
}

impl Proposal {
    pub fn is_expired(&self, now: u64) -> bool {
        now > self.expiry_timestamp
    }

    pub fn proposer_public_key(&self) -> PublicKey {
        self.proposer.public_key
    }
}

/// A confirmed, durable session.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub topic: Topic,
    pub pairing_topic: Topic,
    pub relay: RelayProtocolOptions,
    pub self_participant: Participant,
    pub peer_participant: Participant,
    pub controller: PublicKey,
    pub namespaces: SessionNamespaces,
    pub required_namespaces: ProposalNamespaces,
    pub session_properties: Option<BTreeMap<String, String>>,
    pub scoped_properties: Option<BTreeMap<String, String>>,
    pub expiry: u64,
    pub acknowledged: bool,
    pub transport_type: TransportType,
    pub verify_context: Option<VerifyContext>,
}

impl Session {
    pub fn is_expired(&self, now: u64) -> bool {
        now > self.expiry
    }

    /// Whether this peer controls namespace updates and extensions.
    pub fn self_is_controller(&self) -> bool {
        self.controller == self.self_participant.public_key
    }

    pub fn peer_is_controller(&self) -> bool {
        self.controller == self.peer_participant.public_key
    }

    /// Whether `method` is granted on `chain`.
    pub fn has_method(&self, chain: &Blockchain, method: &str) -> bool {
        namespace_for_chain(&self.namespaces, chain)
            .map(|ns| ns.methods.contains(method))
            .unwrap_or(false)
    }

    /// Whether `event` is granted on `chain`.
    pub fn has_event(&self, chain: &Blockchain, event: &str) -> bool {
        namespace_for_chain(&self.namespaces, chain)
            .map(|ns| ns.events.contains(event))
            .unwrap_or(false)
    }

    /// Every chain granted by the session.
    pub fn chains(&self) -> Vec<Blockchain> {
        let mut chains: Vec<Blockchain> = self
            .namespaces
            .values()
            .flat_map(|ns| ns.all_chains())
            .collect();
        chains.sort();
        chains.dedup();
        chains
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("topic", &self.topic)
            .field("pairing_topic", &self.pairing_topic)
            .field("peer", &self.peer_participant.metadata.name)
            .field("controller", &self.controller)
            .field("expiry", &self.expiry)
            .field("acknowledged", &self.acknowledged)
            .finish()
    }
}
