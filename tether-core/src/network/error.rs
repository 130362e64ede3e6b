// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Network error types.

use thiserror::Error;

/// Network error types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Timed out waiting for connection")]
    ConnectionTimeout,

    #[error("Connection is managed automatically; manual connect/disconnect is forbidden")]
    ManualConnectionForbidden,

    #[error("Timed out waiting for publish acknowledgement")]
    PublishTimeout,

    #[error("Timed out waiting for subscription acknowledgement")]
    SubscribeTimeout,

    #[error("No subscription for topic {0}")]
    SubscriptionIdNotFound(String),

    #[error("Relay error {code}: {message}")]
    Relay { code: i64, message: String },

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Malformed relay frame: {0}")]
    Malformed(String),

    #[error("Relay client shut down")]
    Closed,
}

impl From<serde_json::Error> for NetworkError {
    fn from(err: serde_json::Error) -> Self {
        NetworkError::Malformed(err.to_string())
    }
}
