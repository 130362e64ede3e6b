// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Connection Handlers
//!
//! Policies deciding when the relay socket is (re)connected.
//!
//! - **Automatic**: the handler owns the socket lifecycle. It connects on
//!   start, retries immediately a few times after a drop and then falls
//!   back to a fixed interval until connected. Caller connect/disconnect
//!   calls are refused.
//! - **Manual**: the caller decides, except that an outbound send may
//!   connect when it must, or when there are subscriptions to serve.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::error::NetworkError;
use super::subscriptions::SubscriptionsTracker;
use super::transport::{Transport, TransportResult};

/// Which side manages the socket lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionPolicy {
    #[default]
    Automatic,
    Manual,
}

/// Retry tuning for the automatic policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Attempts made back to back before switching to periodic retry.
    pub immediate_attempts: u32,
    pub retry_interval: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        ReconnectConfig {
            immediate_attempts: 3,
            retry_interval: Duration::from_secs(5),
        }
    }
}

/// Reacts to caller requests and socket transitions.
pub(crate) trait ConnectionHandler: Send + Sync {
    /// Called once when the dispatcher starts listening.
    fn on_start(&self);

    fn handle_connect(&self) -> TransportResult<()>;

    fn handle_disconnect(&self, code: u16) -> TransportResult<()>;

    /// The socket is closed and an outbound send is waiting.
    fn handle_internal_connect(&self, unconditionally: bool) -> TransportResult<()>;

    fn on_connected(&self);

    fn on_disconnected(&self);

    fn on_network_change(&self, _available: bool) {}

    fn on_app_foreground(&self) {}
}

#[derive(Default)]
struct RetryState {
    attempts: u32,
    periodic: Option<JoinHandle<()>>,
}

/// Self-managing reconnection.
pub(crate) struct AutomaticConnectionHandler {
    transport: Arc<dyn Transport>,
    config: ReconnectConfig,
    runtime: Handle,
    state: Mutex<RetryState>,
}

impl AutomaticConnectionHandler {
    pub(crate) fn new(transport: Arc<dyn Transport>, config: ReconnectConfig, runtime: Handle) -> Self {
        AutomaticConnectionHandler {
            transport,
            config,
            runtime,
            state: Mutex::new(RetryState::default()),
        }
    }

    fn reconnect(&self) {
        if self.transport.is_connected() {
            return;
        }
        let mut state = self.state.lock();
        if state.attempts < self.config.immediate_attempts {
            state.attempts += 1;
            debug!(attempt = state.attempts, "reconnecting");
            match self.transport.connect() {
                Ok(()) => return,
                Err(e) => warn!(error = %e, "immediate reconnect failed"),
            }
        }
        self.start_periodic(&mut state);
    }

    fn start_periodic(&self, state: &mut RetryState) {
        if state.periodic.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }
        info!(
            interval_secs = self.config.retry_interval.as_secs(),
            "switching to periodic reconnect"
        );
        let transport = self.transport.clone();
        let interval = self.config.retry_interval;
        state.periodic = Some(self.runtime.spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if transport.is_connected() {
                    break;
                }
                if let Err(e) = transport.connect() {
                    warn!(error = %e, "periodic reconnect failed");
                }
            }
        }));
    }

    #[cfg(test)]
    fn is_retrying_periodically(&self) -> bool {
        self.state
            .lock()
            .periodic
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

impl ConnectionHandler for AutomaticConnectionHandler {
    fn on_start(&self) {
        if let Err(e) = self.transport.connect() {
            warn!(error = %e, "initial connect failed");
            self.reconnect();
        }
    }

    fn handle_connect(&self) -> TransportResult<()> {
        Err(NetworkError::ManualConnectionForbidden)
    }

    fn handle_disconnect(&self, _code: u16) -> TransportResult<()> {
        Err(NetworkError::ManualConnectionForbidden)
    }

    fn handle_internal_connect(&self, _unconditionally: bool) -> TransportResult<()> {
        self.reconnect();
        Ok(())
    }

    fn on_connected(&self) {
        let mut state = self.state.lock();
        state.attempts = 0;
        if let Some(task) = state.periodic.take() {
            task.abort();
        }
    }

    fn on_disconnected(&self) {
        self.reconnect();
    }

    fn on_network_change(&self, available: bool) {
        if available {
            self.reconnect();
        }
    }

    fn on_app_foreground(&self) {
        self.reconnect();
    }
}

impl Drop for AutomaticConnectionHandler {
    fn drop(&mut self) {
        if let Some(task) = self.state.get_mut().periodic.take() {
            task.abort();
        }
    }
}

/// Caller-driven connection.
pub(crate) struct ManualConnectionHandler {
    transport: Arc<dyn Transport>,
    subscriptions: Arc<SubscriptionsTracker>,
}

impl ManualConnectionHandler {
    pub(crate) fn new(transport: Arc<dyn Transport>, subscriptions: Arc<SubscriptionsTracker>) -> Self {
        ManualConnectionHandler {
            transport,
            subscriptions,
        }
    }
}

impl ConnectionHandler for ManualConnectionHandler {
    fn on_start(&self) {}

    fn handle_connect(&self) -> TransportResult<()> {
        self.transport.connect()
    }

    fn handle_disconnect(&self, code: u16) -> TransportResult<()> {
        self.transport.disconnect(code)
    }

    fn handle_internal_connect(&self, unconditionally: bool) -> TransportResult<()> {
        if unconditionally || self.subscriptions.is_subscribed_to_any() {
            self.transport.connect()
        } else {
            debug!("no subscriptions, not connecting");
            Ok(())
        }
    }

    fn on_connected(&self) {}

    fn on_disconnected(&self) {}
}
