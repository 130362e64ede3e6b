// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! API Configuration
//!
//! Configuration types for the sign client. A [`SignConfig`] is built once
//! and handed to [`crate::api::SignClient::builder`]; nothing reads global
//! state.

use std::time::Duration;

use crate::network::{ConnectionPolicy, ReconnectConfig, RelayClientConfig};
use crate::sign::AppMetadata;

/// Default relay endpoint.
pub const DEFAULT_RELAY_URL: &str = "wss://relay.walletconnect.org";

/// Configuration for a sign client instance.
#[derive(Debug, Clone)]
pub struct SignConfig {
    /// Relay WebSocket URL.
    pub relay_url: String,

    /// Project id sent to the relay.
    pub project_id: String,

    /// Our own app metadata, shown to peers.
    pub metadata: AppMetadata,

    /// Who manages the relay socket lifecycle.
    pub connection_policy: ConnectionPolicy,

    /// Automatic reconnection tuning.
    pub reconnect: ReconnectConfig,

    pub timeouts: TimeoutConfig,

    pub ttl: TtlConfig,

    /// Capacity of the event broadcast channel.
    pub event_channel_capacity: usize,

    /// How often expired records are swept (`None` = on demand only).
    pub expiry_sweep_interval: Option<Duration>,
}

impl SignConfig {
    /// Creates a configuration for the given project and app.
    pub fn new(project_id: impl Into<String>, metadata: AppMetadata) -> Self {
        SignConfig {
            relay_url: DEFAULT_RELAY_URL.to_string(),
            project_id: project_id.into(),
            metadata,
            connection_policy: ConnectionPolicy::Automatic,
            reconnect: ReconnectConfig::default(),
            timeouts: TimeoutConfig::default(),
            ttl: TtlConfig::default(),
            event_channel_capacity: 256,
            expiry_sweep_interval: Some(Duration::from_secs(60)),
        }
    }

    /// Sets the relay server URL.
    pub fn with_relay_url(mut self, url: impl Into<String>) -> Self {
        self.relay_url = url.into();
        self
    }

    pub fn with_connection_policy(mut self, policy: ConnectionPolicy) -> Self {
        self.connection_policy = policy;
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn with_timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_ttl(mut self, ttl: TtlConfig) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// Sets the periodic expiry sweep interval; `None` disables the sweeper.
    pub fn with_expiry_sweep_interval(mut self, interval: Option<Duration>) -> Self {
        self.expiry_sweep_interval = interval;
        self
    }

    /// Converts to RelayClientConfig for the network layer.
    pub fn to_relay_client_config(&self) -> RelayClientConfig {
        RelayClientConfig {
            publish_timeout: self.timeouts.publish,
            subscribe_timeout: self.timeouts.subscribe,
        }
    }
}

/// Bounded waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Wait for the socket to come up before a send.
    pub connection: Duration,
    /// Wait for the relay to acknowledge a publish.
    pub publish: Duration,
    /// Wait for the relay to return subscription ids.
    pub subscribe: Duration,
    /// Wait for a peer response.
    pub response: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        TimeoutConfig {
            connection: Duration::from_secs(30),
            publish: Duration::from_secs(60),
            subscribe: Duration::from_secs(30),
            response: Duration::from_secs(60),
        }
    }
}

/// Lifetimes of protocol records, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlConfig {
    pub proposal: u64,
    pub session: u64,
    /// Pairing before the peer showed up.
    pub pairing_inactive: u64,
    /// Pairing once a proposal went through.
    pub pairing_active: u64,
    /// How long a resolved RPC record is kept to catch late duplicates.
    pub history: u64,
}

impl Default for TtlConfig {
    fn default() -> Self {
        TtlConfig {
            proposal: 300,
            session: 7 * 24 * 60 * 60,
            pairing_inactive: 300,
            pairing_active: 30 * 24 * 60 * 60,
            history: 24 * 60 * 60,
        }
    }
}
