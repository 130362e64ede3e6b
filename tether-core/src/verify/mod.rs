// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Verify Client
//!
//! Best-effort domain trust annotations for proposals and requests. The
//! result is for display only; nothing in the protocol branches on it, and
//! every failure degrades to [`Validation::Unknown`].

#[cfg(feature = "verify-http")]
mod http;

#[cfg(feature = "verify-http")]
pub use http::HttpVerifyClient;

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use thiserror::Error;

use crate::crypto::sha256_hex;
use crate::sign::{Validation, VerifyContext};

/// Default verify service.
pub const DEFAULT_VERIFY_URL: &str = "https://verify.walletconnect.org";

/// Verify error types.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("HTTP error: {0}")]
    HttpError(u16),

    #[error("Verify request failed: {0}")]
    Request(String),

    #[error("Malformed attestation: {0}")]
    Malformed(String),
}

/// Attestation id of an inbound envelope: hex SHA-256 of the wire string.
pub fn attestation_id(wire_message: &str) -> String {
    sha256_hex(wire_message.as_bytes())
}

/// Derives the annotation from what the service attested.
///
/// `attested_origin` is what the service saw the request come from;
/// `metadata_url` is what the peer claims to be.
pub fn classify(
    attested_origin: Option<&str>,
    is_scam: bool,
    metadata_url: &str,
    verify_url: &str,
) -> VerifyContext {
    let validation = match attested_origin {
        _ if is_scam => Validation::Scam,
        None => Validation::Unknown,
        Some(origin) if same_origin(origin, metadata_url) => Validation::Valid,
        Some(_) => Validation::Invalid,
    };
    VerifyContext {
        origin: attested_origin.map(str::to_string),
        validation,
        verify_url: verify_url.to_string(),
        is_scam,
    }
}

fn same_origin(a: &str, b: &str) -> bool {
    match (url::Url::parse(a), url::Url::parse(b)) {
        (Ok(a), Ok(b)) => a.origin() == b.origin(),
        _ => a.trim_end_matches('/') == b.trim_end_matches('/'),
    }
}

/// Source of verify contexts.
#[async_trait]
pub trait VerifyClient: Send + Sync {
    /// Looks up the attestation for an inbound message from a peer
    /// claiming `metadata_url`.
    async fn resolve(
        &self,
        attestation_id: &str,
        metadata_url: &str,
    ) -> Result<VerifyContext, VerifyError>;

    /// Like [`Self::resolve`], degrading every failure to `Unknown`.
    async fn resolve_or_unknown(&self, attestation_id: &str, metadata_url: &str) -> VerifyContext {
        match self.resolve(attestation_id, metadata_url).await {
            Ok(context) => context,
            Err(e) => {
                tracing::debug!(error = %e, "verify lookup failed");
                VerifyContext::unknown(self.verify_url())
            }
        }
    }

    fn verify_url(&self) -> &str {
        DEFAULT_VERIFY_URL
    }
}

/// Verifier for hosts without a verify service: always `Unknown`.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnknownVerifier;

#[async_trait]
impl VerifyClient for UnknownVerifier {
    async fn resolve(
        &self,
        _attestation_id: &str,
        _metadata_url: &str,
    ) -> Result<VerifyContext, VerifyError> {
        Ok(VerifyContext::unknown(DEFAULT_VERIFY_URL))
    }
}

/// Verifier answering from a fixed origin table (for testing).
#[derive(Default)]
pub struct StaticVerifier {
    /// metadata url -> (attested origin, is scam)
    origins: Mutex<HashMap<String, (String, bool)>>,
}

impl StaticVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attests that peers claiming `metadata_url` really come from `origin`.
    pub fn attest(&self, metadata_url: &str, origin: &str, is_scam: bool) {
        self.origins
            .lock()
            .insert(metadata_url.to_string(), (origin.to_string(), is_scam));
    }
}

#[async_trait]
impl VerifyClient for StaticVerifier {
    async fn resolve(
        &self,
        _attestation_id: &str,
        metadata_url: &str,
    ) -> Result<VerifyContext, VerifyError> {
        let origins = self.origins.lock();
        let (origin, is_scam) = origins
            .get(metadata_url)
            .ok_or_else(|| VerifyError::Malformed(format!("no attestation for {}", metadata_url)))?;
        Ok(classify(Some(origin), *is_scam, metadata_url, DEFAULT_VERIFY_URL))
    }
}
