// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! WebSocket Transport
//!
//! Relay socket over tokio-tungstenite. `connect` spawns a task that dials
//! the relay and then pumps frames both ways until either side closes.
//!
//! # Example
//!
//! ```ignore
//! use tether_core::network::WebSocketTransport;
//!
//! let transport = WebSocketTransport::new("wss://relay.walletconnect.org", "project-id")?;
//! transport.connect()?;
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};
use url::Url;

use super::error::NetworkError;
use super::transport::{Transport, TransportEvent, TransportResult};

const EVENT_CHANNEL_CAPACITY: usize = 512;

enum Command {
    Text(String),
    Close(u16),
}

/// WebSocket transport for relay communication.
///
/// Supports both ws:// (plaintext) and wss:// (TLS) connections.
pub struct WebSocketTransport {
    url: Url,
    runtime: Handle,
    events: broadcast::Sender<TransportEvent>,
    connected: Arc<AtomicBool>,
    connecting: Arc<AtomicBool>,
    outbound: Arc<Mutex<Option<mpsc::UnboundedSender<Command>>>>,
}

impl WebSocketTransport {
    /// Creates a transport for `relay_url`, authenticated by `project_id`.
    /// Must be called within a tokio runtime.
    pub fn new(relay_url: &str, project_id: &str) -> TransportResult<Self> {
        let mut url = Url::parse(relay_url)
            .map_err(|e| NetworkError::ConnectionFailed(format!("invalid relay url: {}", e)))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(NetworkError::ConnectionFailed(format!(
                "unsupported scheme {}",
                url.scheme()
            )));
        }
        url.query_pairs_mut().append_pair("projectId", project_id);

        let runtime = Handle::try_current()
            .map_err(|e| NetworkError::ConnectionFailed(format!("no async runtime: {}", e)))?;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(WebSocketTransport {
            url,
            runtime,
            events,
            connected: Arc::new(AtomicBool::new(false)),
            connecting: Arc::new(AtomicBool::new(false)),
            outbound: Arc::new(Mutex::new(None)),
        })
    }

    /// The dialled URL, including the project id query.
    pub fn url(&self) -> &str {
        self.url.as_str()
    }
}

impl Transport for WebSocketTransport {
    fn connect(&self) -> TransportResult<()> {
        if self.connected.load(Ordering::SeqCst) || self.connecting.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let url = self.url.to_string();
        let events = self.events.clone();
        let connected = self.connected.clone();
        let connecting = self.connecting.clone();
        let outbound = self.outbound.clone();

        self.runtime.spawn(async move {
            let socket = tokio_tungstenite::connect_async(url.as_str()).await;
            connecting.store(false, Ordering::SeqCst);
            let (stream, _) = match socket {
                Ok(socket) => socket,
                Err(e) => {
                    warn!(error = %e, "websocket connect failed");
                    let _ = events.send(TransportEvent::Disconnected(Some(e.to_string())));
                    return;
                }
            };

            let (mut sink, mut source) = stream.split();
            let (tx, mut rx) = mpsc::unbounded_channel();
            *outbound.lock() = Some(tx);
            connected.store(true, Ordering::SeqCst);
            let _ = events.send(TransportEvent::Connected);

            let error = loop {
                tokio::select! {
                    command = rx.recv() => match command {
                        Some(Command::Text(text)) => {
                            if let Err(e) = sink.send(Message::Text(text)).await {
                                break Some(e.to_string());
                            }
                        }
                        Some(Command::Close(code)) => {
                            let frame = CloseFrame {
                                code: CloseCode::from(code),
                                reason: "".into(),
                            };
                            let _ = sink.send(Message::Close(Some(frame))).await;
                            break None;
                        }
                        None => break None,
                    },
                    frame = source.next() => match frame {
                        Some(Ok(Message::Text(text))) => {
                            let _ = events.send(TransportEvent::Text(text));
                        }
                        Some(Ok(Message::Close(frame))) => {
                            debug!(?frame, "relay closed the socket");
                            break None;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => break Some(e.to_string()),
                        None => break Some("stream ended".to_string()),
                    },
                }
            };

            outbound.lock().take();
            connected.store(false, Ordering::SeqCst);
            let _ = events.send(TransportEvent::Disconnected(error));
        });
        Ok(())
    }

    fn disconnect(&self, code: u16) -> TransportResult<()> {
        if let Some(tx) = self.outbound.lock().as_ref() {
            let _ = tx.send(Command::Close(code));
        }
        Ok(())
    }

    fn write(&self, text: String) -> TransportResult<()> {
        let guard = self.outbound.lock();
        let tx = guard.as_ref().ok_or(NetworkError::NotConnected)?;
        tx.send(Command::Text(text))
            .map_err(|_| NetworkError::SendFailed("socket closed".to_string()))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn events(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }
}
