// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Pairing URIs
//!
//! `wc:{topic}@2?relay-protocol=irn&symKey={hex}&expiryTimestamp={secs}`
//!
//! The URI is the only out-of-band secret: whoever scans it can read the
//! pairing topic. The topic must be the hash of the key, so a tampered
//! URI cannot point a wallet at someone else's topic with a fresh key.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use url::Url;

use super::types::{RelayProtocolOptions, Topic};
use crate::crypto::SymmetricKey;

const SCHEME: &str = "wc";
const VERSION: &str = "2";

/// Pairing URI error types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UriError {
    #[error("not a pairing uri: {0}")]
    InvalidFormat(String),

    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(String),

    #[error("missing parameter {0}")]
    MissingParameter(&'static str),

    #[error("invalid symmetric key")]
    InvalidSymKey,

    #[error("topic does not match symmetric key")]
    TopicMismatch,

    #[error("invalid expiry timestamp")]
    InvalidExpiry,
}

/// Decoded pairing URI.
#[derive(Clone, PartialEq, Eq)]
pub struct PairingUri {
    pub topic: Topic,
    pub sym_key: SymmetricKey,
    pub relay: RelayProtocolOptions,
    pub expiry_timestamp: Option<u64>,
}

impl PairingUri {
    pub fn new(sym_key: SymmetricKey, relay: RelayProtocolOptions, expiry_timestamp: u64) -> Self {
        PairingUri {
            topic: sym_key.derive_topic(),
            sym_key,
            relay,
            expiry_timestamp: Some(expiry_timestamp),
        }
    }
}

impl fmt::Debug for PairingUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PairingUri")
            .field("topic", &self.topic)
            .field("sym_key", &"[REDACTED]")
            .field("relay", &self.relay)
            .field("expiry_timestamp", &self.expiry_timestamp)
            .finish()
    }
}

impl fmt::Display for PairingUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}@{}?relay-protocol={}&symKey={}",
            SCHEME,
            self.topic,
            VERSION,
            self.relay.protocol,
            self.sym_key.to_hex()
        )?;
        if let Some(data) = &self.relay.data {
            write!(f, "&relay-data={}", data)?;
        }
        if let Some(expiry) = self.expiry_timestamp {
            write!(f, "&expiryTimestamp={}", expiry)?;
        }
        Ok(())
    }
}

impl FromStr for PairingUri {
    type Err = UriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(s.trim()).map_err(|e| UriError::InvalidFormat(e.to_string()))?;
        if url.scheme() != SCHEME {
            return Err(UriError::InvalidFormat(format!("scheme {}", url.scheme())));
        }

        let (topic, version) = url
            .path()
            .split_once('@')
            .ok_or_else(|| UriError::InvalidFormat("missing version".into()))?;
        if version != VERSION {
            return Err(UriError::UnsupportedVersion(version.to_string()));
        }

        let mut protocol = None;
        let mut data = None;
        let mut sym_key = None;
        let mut expiry = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "relay-protocol" => protocol = Some(value.into_owned()),
                "relay-data" => data = Some(value.into_owned()),
                "symKey" => sym_key = Some(value.into_owned()),
                "expiryTimestamp" => {
                    expiry = Some(value.parse::<u64>().map_err(|_| UriError::InvalidExpiry)?)
                }
                _ => {}
            }
        }

        let sym_key = sym_key.ok_or(UriError::MissingParameter("symKey"))?;
        let sym_key = SymmetricKey::from_hex(&sym_key).map_err(|_| UriError::InvalidSymKey)?;
        if sym_key.derive_topic() != topic {
            return Err(UriError::TopicMismatch);
        }

        Ok(PairingUri {
            topic: topic.to_string(),
            sym_key,
            relay: RelayProtocolOptions {
                protocol: protocol.ok_or(UriError::MissingParameter("relay-protocol"))?,
                data,
            },
            expiry_timestamp: expiry,
        })
    }
}
