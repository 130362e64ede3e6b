// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! API Error Types
//!
//! Unified error type for the sign API layer.

use thiserror::Error;

use crate::kms::KmsError;
use crate::network::NetworkError;
use crate::networking::NetworkingError;
use crate::rpc::HistoryError;
use crate::serializer::SerializerError;
use crate::sign::{Reason, UriError};
use crate::storage::StorageError;

/// Unified error type for sign operations.
#[derive(Error, Debug)]
pub enum SignError {
    /// No stored proposal for the given proposer key.
    #[error("proposal not found")]
    ProposalNotFound,

    /// The proposal outlived its expiry and was discarded.
    #[error("proposal expired")]
    ProposalExpired,

    /// Approving with no namespaces at all.
    #[error("empty session namespaces are forbidden")]
    EmptySessionNamespacesForbidden,

    /// The relay socket is not connected.
    #[error("network not connected")]
    NetworkNotConnected,

    /// The proposal offers no relay protocol.
    #[error("relay not found")]
    RelayNotFound,

    #[error("pairing not found: {0}")]
    PairingNotFound(String),

    /// The pairing URI or stored pairing is past its expiry.
    #[error("pairing expired: {0}")]
    PairingExpired(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// The session expired before the operation.
    #[error("session expired: {0}")]
    SessionExpired(String),

    /// X25519 agreement could not be performed.
    #[error("key agreement missing or invalid: {0}")]
    AgreementMissingOrInvalid(String),

    /// Granted namespaces do not satisfy the proposal.
    #[error("unsupported namespace: {0}")]
    UnsupportedNamespace(Reason),

    /// The session does not grant the method, chain or event used.
    #[error("unauthorized: {0}")]
    Unauthorized(Reason),

    /// Parameters rejected before reaching the network.
    #[error("invalid: {0}")]
    Invalid(Reason),

    /// Only the session controller may update or extend.
    #[error("not the session controller")]
    NotController,

    /// The peer answered with an error.
    #[error("peer rejected ({code}): {message}")]
    PeerRejected { code: i64, message: String },

    #[error("no pending request {0} on this session")]
    RequestNotFound(String),

    #[error("invalid pairing uri: {0}")]
    InvalidUri(#[from] UriError),

    #[error("key management error: {0}")]
    Kms(#[from] KmsError),

    #[error("serializer error: {0}")]
    Serializer(#[from] SerializerError),

    #[error("networking error: {0}")]
    Networking(#[from] NetworkingError),

    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    #[error("history error: {0}")]
    History(#[from] HistoryError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl SignError {
    /// Lifts peer errors out of the networking layer.
    pub(crate) fn from_networking(err: NetworkingError) -> Self {
        match err {
            NetworkingError::PeerError { code, message } => SignError::PeerRejected { code, message },
            other => SignError::Networking(other),
        }
    }
}

/// Result type for sign operations.
pub type SignResult<T> = Result<T, SignError>;
