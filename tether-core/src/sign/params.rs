// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Wire params of the sign protocol methods.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::namespaces::{Blockchain, ProposalNamespaces, SessionNamespaces};
use super::reason::ReasonPayload;
use super::types::{Participant, RelayProtocolOptions};
use crate::crypto::PublicKey;

/// `wc_sessionPropose` params.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionProposeParams {
    pub relays: Vec<RelayProtocolOptions>,
    pub proposer: Participant,
    #[serde(default)]
    pub required_namespaces: ProposalNamespaces,
    #[serde(default)]
    pub optional_namespaces: ProposalNamespaces,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_properties: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scoped_properties: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_timestamp: Option<u64>,
}

/// `wc_sessionPropose` success result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionProposeResponse {
    pub relay: RelayProtocolOptions,
    pub responder_public_key: PublicKey,
}

/// `wc_sessionSettle` params.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSettleParams {
    pub relay: RelayProtocolOptions,
    pub controller: Participant,
    pub namespaces: SessionNamespaces,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_properties: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scoped_properties: Option<BTreeMap<String, String>>,
    pub expiry: u64,
}

/// `wc_sessionUpdate` params.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUpdateParams {
    pub namespaces: SessionNamespaces,
}

/// `wc_sessionExtend` params.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionExtendParams {
    pub expiry: u64,
}

/// The dApp's chain-scoped call inside `wc_sessionRequest`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPayload {
    pub method: String,
    pub params: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_timestamp: Option<u64>,
}

/// `wc_sessionRequest` params.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequestParams {
    pub request: RequestPayload,
    pub chain_id: Blockchain,
}

/// The wallet's event inside `wc_sessionEvent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    pub name: String,
    pub data: Value,
}

/// `wc_sessionEvent` params.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEventParams {
    pub event: EventPayload,
    pub chain_id: Blockchain,
}

/// `wc_sessionDelete` and `wc_pairingDelete` params.
pub type DeleteParams = ReasonPayload;

/// Empty params object used by pings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingParams {}
