// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Sign Protocol
//!
//! Protocol types and the engines driving the session lifecycle.
//!
//! # Lifecycle
//!
//! 1. The dApp creates a pairing and shares it as a [`PairingUri`]
//! 2. The wallet pairs, receives the proposal and approves or rejects it
//! 3. Approval derives a session topic from an X25519 agreement and the
//!    wallet publishes the settlement on it
//! 4. Requests, events, updates and extensions flow over the session
//!    until one side deletes it or it expires

pub(crate) mod approve_engine;
pub(crate) mod context;
pub(crate) mod expiry;
pub(crate) mod pairing_engine;
pub(crate) mod propose;
pub(crate) mod session_engine;

#[cfg(feature = "testing")]
pub mod namespaces;
#[cfg(not(feature = "testing"))]
mod namespaces;

#[cfg(feature = "testing")]
pub mod params;
#[cfg(not(feature = "testing"))]
mod params;

#[cfg(feature = "testing")]
pub mod reason;
#[cfg(not(feature = "testing"))]
mod reason;

#[cfg(feature = "testing")]
pub mod types;
#[cfg(not(feature = "testing"))]
mod types;

#[cfg(feature = "testing")]
pub mod uri;
#[cfg(not(feature = "testing"))]
mod uri;

pub use expiry::SweepReport;
pub use namespaces::{
    namespace_for_chain, validate_conformance, validate_proposal_namespaces,
    validate_session_namespaces, Account, Blockchain, NamespaceError, ProposalNamespace,
    ProposalNamespaces, SessionNamespace, SessionNamespaces,
};
pub use params::{
    DeleteParams, EventPayload, PingParams, RequestPayload, SessionEventParams,
    SessionExtendParams, SessionProposeParams, SessionProposeResponse, SessionRequestParams,
    SessionSettleParams, SessionUpdateParams,
};
pub use reason::{Reason, ReasonPayload};
pub use types::{
    AppMetadata, Pairing, Participant, Proposal, Redirect, RelayProtocolOptions, Session, Topic,
    TransportType, Validation, VerifyContext, DEFAULT_RELAY_PROTOCOL,
};
pub use uri::{PairingUri, UriError};
