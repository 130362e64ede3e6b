// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Protocol methods and their relay publish policies.

/// Relay publish policy for one direction of a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishPolicy {
    pub tag: u32,
    pub ttl: u64,
    pub prompt: bool,
}

/// Peer-to-peer protocol methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolMethod {
    SessionPropose,
    SessionSettle,
    SessionUpdate,
    SessionExtend,
    SessionRequest,
    SessionEvent,
    SessionDelete,
    SessionPing,
    PairingDelete,
    PairingPing,
}

const FIVE_MINUTES: u64 = 300;
const ONE_DAY: u64 = 86_400;
const THIRTY_SECONDS: u64 = 30;

impl ProtocolMethod {
    pub const ALL: [ProtocolMethod; 10] = [
        ProtocolMethod::SessionPropose,
        ProtocolMethod::SessionSettle,
        ProtocolMethod::SessionUpdate,
        ProtocolMethod::SessionExtend,
        ProtocolMethod::SessionRequest,
        ProtocolMethod::SessionEvent,
        ProtocolMethod::SessionDelete,
        ProtocolMethod::SessionPing,
        ProtocolMethod::PairingDelete,
        ProtocolMethod::PairingPing,
    ];

    /// JSON-RPC method name.
    pub fn name(&self) -> &'static str {
        match self {
            ProtocolMethod::SessionPropose => "wc_sessionPropose",
            ProtocolMethod::SessionSettle => "wc_sessionSettle",
            ProtocolMethod::SessionUpdate => "wc_sessionUpdate",
            ProtocolMethod::SessionExtend => "wc_sessionExtend",
            ProtocolMethod::SessionRequest => "wc_sessionRequest",
            ProtocolMethod::SessionEvent => "wc_sessionEvent",
            ProtocolMethod::SessionDelete => "wc_sessionDelete",
            ProtocolMethod::SessionPing => "wc_sessionPing",
            ProtocolMethod::PairingDelete => "wc_pairingDelete",
            ProtocolMethod::PairingPing => "wc_pairingPing",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|m| m.name() == name)
    }

    /// Publish policy for requests of this method.
    pub fn request_policy(&self) -> PublishPolicy {
        let (tag, ttl, prompt) = match self {
            ProtocolMethod::SessionPropose => (1100, FIVE_MINUTES, true),
            ProtocolMethod::SessionSettle => (1102, FIVE_MINUTES, false),
            ProtocolMethod::SessionUpdate => (1104, ONE_DAY, false),
            ProtocolMethod::SessionExtend => (1106, ONE_DAY, false),
            ProtocolMethod::SessionRequest => (1108, FIVE_MINUTES, true),
            ProtocolMethod::SessionEvent => (1110, FIVE_MINUTES, true),
            ProtocolMethod::SessionDelete => (1112, ONE_DAY, false),
            ProtocolMethod::SessionPing => (1114, THIRTY_SECONDS, false),
            ProtocolMethod::PairingDelete => (1000, ONE_DAY, false),
            ProtocolMethod::PairingPing => (1002, THIRTY_SECONDS, false),
        };
        PublishPolicy { tag, ttl, prompt }
    }

    /// Publish policy for responses; the tag is always request tag + 1.
    pub fn response_policy(&self) -> PublishPolicy {
        let request = self.request_policy();
        let ttl = match self {
            ProtocolMethod::SessionPropose | ProtocolMethod::SessionSettle => FIVE_MINUTES,
            other => other.request_policy().ttl,
        };
        PublishPolicy {
            tag: request.tag + 1,
            ttl,
            prompt: false,
        }
    }
}
