// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! HTTP verify client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{classify, VerifyClient, VerifyError};
use crate::sign::VerifyContext;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Attestation {
    origin: Option<String>,
    #[serde(default)]
    is_scam: Option<bool>,
}

/// Queries `{verify_url}/attestation/{id}`.
pub struct HttpVerifyClient {
    client: Client,
    verify_url: String,
}

impl HttpVerifyClient {
    pub fn new(verify_url: &str, timeout: Duration) -> Result<Self, VerifyError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!(
                "Tether/{}",
                option_env!("CARGO_PKG_VERSION").unwrap_or("0.1.0")
            ))
            .build()
            .map_err(|e| VerifyError::Request(e.to_string()))?;
        Ok(HttpVerifyClient {
            client,
            verify_url: verify_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl VerifyClient for HttpVerifyClient {
    async fn resolve(
        &self,
        attestation_id: &str,
        metadata_url: &str,
    ) -> Result<VerifyContext, VerifyError> {
        let url = format!("{}/attestation/{}", self.verify_url, attestation_id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| VerifyError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(VerifyError::HttpError(response.status().as_u16()));
        }

        let attestation: Attestation = response
            .json()
            .await
            .map_err(|e| VerifyError::Malformed(e.to_string()))?;

        Ok(classify(
            attestation.origin.as_deref(),
            attestation.is_scam.unwrap_or(false),
            metadata_url,
            &self.verify_url,
        ))
    }

    fn verify_url(&self) -> &str {
        &self.verify_url
    }
}
