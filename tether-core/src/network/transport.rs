// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Transport Trait
//!
//! Contract required from the relay socket. The socket is treated as an
//! unreliable, at-least-once, possibly reordering text channel.

use tokio::sync::broadcast;

use super::error::NetworkError;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, NetworkError>;

/// WebSocket close code for a normal closure.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Connection state as observed by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// Something that happened on the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected,
    /// The socket closed, with an error description if it failed.
    Disconnected(Option<String>),
    Text(String),
}

/// Transport trait for the relay socket.
///
/// `connect` only initiates a connection; completion is reported through
/// [`TransportEvent::Connected`] (or `Disconnected` on failure). Only the
/// dispatcher writes to a transport.
pub trait Transport: Send + Sync {
    fn connect(&self) -> TransportResult<()>;

    /// Closes the socket. Safe to call when not connected.
    fn disconnect(&self, code: u16) -> TransportResult<()>;

    /// Writes one text frame. Fails with `NotConnected` when closed.
    fn write(&self, text: String) -> TransportResult<()>;

    fn is_connected(&self) -> bool;

    /// Subscribes to socket events. Events sent before subscribing are not replayed.
    fn events(&self) -> broadcast::Receiver<TransportEvent>;
}
