// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Relay wire messages (`irn_*` JSON-RPC methods).
//!
//! These travel in clear between client and relay; peer payloads inside
//! `message` are sealed envelopes.

use serde::{Deserialize, Serialize};

pub const IRN_PUBLISH: &str = "irn_publish";
pub const IRN_SUBSCRIBE: &str = "irn_subscribe";
pub const IRN_BATCH_SUBSCRIBE: &str = "irn_batchSubscribe";
pub const IRN_UNSUBSCRIBE: &str = "irn_unsubscribe";
pub const IRN_SUBSCRIPTION: &str = "irn_subscription";

/// Maximum topics per `irn_batchSubscribe` call.
pub const MAX_BATCH_SUBSCRIBE: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishParams {
    pub topic: String,
    pub message: String,
    pub ttl: u64,
    pub tag: u32,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub prompt: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeParams {
    pub topic: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSubscribeParams {
    pub topics: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsubscribeParams {
    pub topic: String,
    pub id: String,
}

/// Message pushed by the relay on a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionData {
    pub topic: String,
    pub message: String,
    #[serde(default)]
    pub published_at: u64,
    #[serde(default)]
    pub tag: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionParams {
    /// Subscription id.
    pub id: String,
    pub data: SubscriptionData,
}

/// An inbound peer message, as handed to the networking layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayMessage {
    pub topic: String,
    pub message: String,
    pub published_at: u64,
    pub tag: u32,
}

impl From<SubscriptionData> for RelayMessage {
    fn from(data: SubscriptionData) -> Self {
        RelayMessage {
            topic: data.topic,
            message: data.message,
            published_at: data.published_at,
            tag: data.tag,
        }
    }
}
