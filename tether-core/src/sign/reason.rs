// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Peer-visible rejection reasons.
//!
//! Reasons travel in the `error` object of a response or in the params of a
//! delete request, so both sides show the same diagnostic.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Protocol-level reason codes.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reason {
    #[error("Invalid method.")]
    InvalidMethod,
    #[error("Invalid event.")]
    InvalidEvent,
    #[error("Invalid update request.")]
    InvalidUpdateRequest,
    #[error("Invalid extend request.")]
    InvalidExtendRequest,
    #[error("Invalid session settle request.")]
    InvalidSessionSettleRequest,
    #[error("Unauthorized method.")]
    UnauthorizedMethod,
    #[error("Unauthorized event.")]
    UnauthorizedEvent,
    #[error("Unauthorized update request.")]
    UnauthorizedUpdateRequest,
    #[error("Unauthorized extend request.")]
    UnauthorizedExtendRequest,
    #[error("User rejected.")]
    UserRejected,
    #[error("User rejected chains.")]
    UserRejectedChains,
    #[error("User rejected methods.")]
    UserRejectedMethods,
    #[error("User rejected events.")]
    UserRejectedEvents,
    #[error("Unsupported chains.")]
    UnsupportedChains,
    #[error("Unsupported methods.")]
    UnsupportedMethods,
    #[error("Unsupported events.")]
    UnsupportedEvents,
    #[error("Unsupported accounts.")]
    UnsupportedAccounts,
    #[error("Unsupported namespace key.")]
    UnsupportedNamespaceKey,
    #[error("User disconnected.")]
    UserDisconnected,
    #[error("Session settlement failed.")]
    SessionSettlementFailed,
    #[error("No matching session for topic.")]
    NoSessionForTopic,
    #[error("Session request expired.")]
    SessionRequestExpired,
}

impl Reason {
    const ALL: [Reason; 22] = [
        Reason::InvalidMethod,
        Reason::InvalidEvent,
        Reason::InvalidUpdateRequest,
        Reason::InvalidExtendRequest,
        Reason::InvalidSessionSettleRequest,
        Reason::UnauthorizedMethod,
        Reason::UnauthorizedEvent,
        Reason::UnauthorizedUpdateRequest,
        Reason::UnauthorizedExtendRequest,
        Reason::UserRejected,
        Reason::UserRejectedChains,
        Reason::UserRejectedMethods,
        Reason::UserRejectedEvents,
        Reason::UnsupportedChains,
        Reason::UnsupportedMethods,
        Reason::UnsupportedEvents,
        Reason::UnsupportedAccounts,
        Reason::UnsupportedNamespaceKey,
        Reason::UserDisconnected,
        Reason::SessionSettlementFailed,
        Reason::NoSessionForTopic,
        Reason::SessionRequestExpired,
    ];

    pub fn code(&self) -> i64 {
        match self {
            Reason::InvalidMethod => 1001,
            Reason::InvalidEvent => 1002,
            Reason::InvalidUpdateRequest => 1003,
            Reason::InvalidExtendRequest => 1004,
            Reason::InvalidSessionSettleRequest => 1005,
            Reason::UnauthorizedMethod => 3001,
            Reason::UnauthorizedEvent => 3002,
            Reason::UnauthorizedUpdateRequest => 3003,
            Reason::UnauthorizedExtendRequest => 3004,
            Reason::UserRejected => 5000,
            Reason::UserRejectedChains => 5001,
            Reason::UserRejectedMethods => 5002,
            Reason::UserRejectedEvents => 5003,
            Reason::UnsupportedChains => 5100,
            Reason::UnsupportedMethods => 5101,
            Reason::UnsupportedEvents => 5102,
            Reason::UnsupportedAccounts => 5103,
            Reason::UnsupportedNamespaceKey => 5104,
            Reason::UserDisconnected => 6000,
            Reason::SessionSettlementFailed => 7000,
            Reason::NoSessionForTopic => 7001,
            Reason::SessionRequestExpired => 8000,
        }
    }

    pub fn from_code(code: i64) -> Option<Reason> {
        Self::ALL.iter().copied().find(|r| r.code() == code)
    }

    pub fn payload(&self) -> ReasonPayload {
        ReasonPayload {
            code: self.code(),
            message: self.to_string(),
        }
    }
}

/// Wire form of a reason: `{ "code": 5000, "message": "User rejected." }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasonPayload {
    pub code: i64,
    pub message: String,
}

impl ReasonPayload {
    /// The known reason for this code, if any.
    pub fn reason(&self) -> Option<Reason> {
        Reason::from_code(self.code)
    }
}

impl From<Reason> for ReasonPayload {
    fn from(reason: Reason) -> Self {
        reason.payload()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_unique() {
        for reason in Reason::ALL {
            assert_eq!(Reason::from_code(reason.code()), Some(reason));
        }
    }

    #[test]
    fn test_payload() {
        let payload = Reason::UserRejected.payload();
        assert_eq!(payload.code, 5000);
        assert_eq!(payload.message, "User rejected.");
        assert_eq!(payload.reason(), Some(Reason::UserRejected));
    }
}
