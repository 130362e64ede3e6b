// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Dispatcher
//!
//! Sole writer to the relay socket. Tracks connection status, forwards
//! inbound text frames and offers [`Dispatcher::protected_send`], which
//! waits for (or triggers) connectivity before writing.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::connection::{
    AutomaticConnectionHandler, ConnectionHandler, ConnectionPolicy, ManualConnectionHandler,
    ReconnectConfig,
};
use super::error::NetworkError;
use super::subscriptions::SubscriptionsTracker;
use super::transport::{ConnectionState, Transport, TransportEvent, TransportResult};

const TEXT_CHANNEL_CAPACITY: usize = 512;

/// Owns the socket on behalf of the relay client.
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    handler: Arc<dyn ConnectionHandler>,
    status: Arc<watch::Sender<ConnectionState>>,
    text_tx: broadcast::Sender<String>,
    connection_timeout: Duration,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Starts listening to `transport`. Must be called within a tokio runtime.
    pub fn new(
        transport: Arc<dyn Transport>,
        policy: ConnectionPolicy,
        reconnect: ReconnectConfig,
        subscriptions: Arc<SubscriptionsTracker>,
        connection_timeout: Duration,
    ) -> Result<Arc<Self>, NetworkError> {
        let runtime = Handle::try_current()
            .map_err(|e| NetworkError::ConnectionFailed(format!("no async runtime: {}", e)))?;

        let handler: Arc<dyn ConnectionHandler> = match policy {
            ConnectionPolicy::Automatic => Arc::new(AutomaticConnectionHandler::new(
                transport.clone(),
                reconnect,
                runtime.clone(),
            )),
            ConnectionPolicy::Manual => Arc::new(ManualConnectionHandler::new(
                transport.clone(),
                subscriptions,
            )),
        };

        let initial = if transport.is_connected() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        };
        let (status, _) = watch::channel(initial);
        let (text_tx, _) = broadcast::channel(TEXT_CHANNEL_CAPACITY);

        let dispatcher = Arc::new(Dispatcher {
            transport: transport.clone(),
            handler: handler.clone(),
            status: Arc::new(status),
            text_tx,
            connection_timeout,
            listener: Mutex::new(None),
        });

        let events = transport.events();
        let task = runtime.spawn(Self::listen(
            events,
            handler.clone(),
            dispatcher.status.clone(),
            dispatcher.text_tx.clone(),
        ));
        *dispatcher.listener.lock() = Some(task);

        handler.on_start();
        Ok(dispatcher)
    }

    async fn listen(
        mut events: broadcast::Receiver<TransportEvent>,
        handler: Arc<dyn ConnectionHandler>,
        status: Arc<watch::Sender<ConnectionState>>,
        text_tx: broadcast::Sender<String>,
    ) {
        loop {
            match events.recv().await {
                Ok(TransportEvent::Connected) => {
                    info!("relay socket connected");
                    status.send_replace(ConnectionState::Connected);
                    handler.on_connected();
                }
                Ok(TransportEvent::Disconnected(error)) => {
                    match &error {
                        Some(e) => warn!(error = %e, "relay socket disconnected"),
                        None => info!("relay socket disconnected"),
                    }
                    status.send_replace(ConnectionState::Disconnected);
                    handler.on_disconnected();
                }
                Ok(TransportEvent::Text(text)) => {
                    // No receivers is fine: nobody is listening yet.
                    let _ = text_tx.send(text);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "dispatcher lagged behind socket events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("transport event stream closed");
                    break;
                }
            }
        }
    }

    /// Caller-initiated connect. Refused under the automatic policy.
    pub fn connect(&self) -> TransportResult<()> {
        self.handler.handle_connect()
    }

    /// Caller-initiated disconnect. Refused under the automatic policy.
    pub fn disconnect(&self, code: u16) -> TransportResult<()> {
        self.handler.handle_disconnect(code)
    }

    /// Sends `text`, first establishing connectivity if needed.
    ///
    /// When the socket is closed the active policy decides whether to
    /// connect; the send then waits up to the connection timeout for the
    /// socket to come up and fails with `ConnectionTimeout` otherwise.
    pub async fn protected_send(
        &self,
        text: String,
        connect_unconditionally: bool,
    ) -> TransportResult<()> {
        if self.transport.is_connected() {
            return self.transport.write(text);
        }

        let mut status = self.status.subscribe();
        self.handler
            .handle_internal_connect(connect_unconditionally)?;

        match tokio::time::timeout(
            self.connection_timeout,
            status.wait_for(|s| *s == ConnectionState::Connected),
        )
        .await
        {
            Ok(Ok(_)) => {}
            Ok(Err(_)) => return Err(NetworkError::Closed),
            Err(_) => {
                warn!(
                    timeout_secs = self.connection_timeout.as_secs(),
                    "timed out waiting for relay connection"
                );
                return Err(NetworkError::ConnectionTimeout);
            }
        }

        self.transport.write(text)
    }

    pub fn status(&self) -> ConnectionState {
        *self.status.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionState::Connected
    }

    pub fn status_changes(&self) -> watch::Receiver<ConnectionState> {
        self.status.subscribe()
    }

    /// Inbound text frames.
    pub fn messages(&self) -> broadcast::Receiver<String> {
        self.text_tx.subscribe()
    }

    /// Host notification that network reachability changed.
    pub fn notify_network_change(&self, available: bool) {
        self.handler.on_network_change(available);
    }

    /// Host notification that the app returned to the foreground.
    pub fn notify_app_foreground(&self) {
        self.handler.on_app_foreground();
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        if let Some(task) = self.listener.get_mut().take() {
            task.abort();
        }
    }
}
