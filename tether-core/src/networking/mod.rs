// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Networking Interactor
//!
//! Peer-level request/response plumbing on top of the relay client: seals
//! outbound JSON-RPC through the serializer, records it in the RPC history
//! and publishes it with the method's relay policy. Inbound envelopes take
//! the reverse path and come out as typed request and response streams.

mod interactor;

pub use interactor::{
    MethodStream, NetworkingInteractor, RequestSubscriptionPayload, ResponseSubscriptionPayload,
};

use thiserror::Error;

use crate::network::NetworkError;
use crate::rpc::HistoryError;
use crate::serializer::SerializerError;

/// Networking error types.
#[derive(Error, Debug)]
pub enum NetworkingError {
    #[error("Serializer error: {0}")]
    Serializer(#[from] SerializerError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("History error: {0}")]
    History(#[from] HistoryError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Timed out waiting for peer response")]
    ResponseTimeout,

    #[error("Peer responded with error {code}: {message}")]
    PeerError { code: i64, message: String },

    #[error("Networking interactor shut down")]
    Closed,
}
