// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Network + Transport Layer
//!
//! Everything between the sealed envelopes and the relay socket.
//!
//! # Architecture
//!
//! - **Transport trait**: the socket contract, implemented by
//!   [`WebSocketTransport`] and the in-process [`MockTransport`]
//! - **Connection handlers**: automatic or manual (re)connection policy
//! - **Dispatcher**: sole socket writer, connection status, `protected_send`
//! - **Relay client**: publish/subscribe with relay acknowledgements and
//!   re-subscription after reconnect
//!
//! # Example
//!
//! ```ignore
//! use tether_core::network::{Dispatcher, MockRelay, RelayClient, RelayClientConfig};
//!
//! let relay = MockRelay::new();
//! let dispatcher = Dispatcher::new(relay.transport(), policy, reconnect, tracker.clone(), timeout)?;
//! let client = RelayClient::new(dispatcher, tracker, history, RelayClientConfig::default());
//! client.subscribe(&topic).await?;
//! ```

#[cfg(feature = "testing")]
pub mod connection;
#[cfg(not(feature = "testing"))]
mod connection;

#[cfg(feature = "testing")]
pub mod dispatcher;
#[cfg(not(feature = "testing"))]
mod dispatcher;

#[cfg(feature = "testing")]
pub mod error;
#[cfg(not(feature = "testing"))]
mod error;

#[cfg(feature = "testing")]
pub mod mock;
#[cfg(not(feature = "testing"))]
mod mock;

pub mod relay;

#[cfg(feature = "testing")]
pub mod relay_client;
#[cfg(not(feature = "testing"))]
mod relay_client;

#[cfg(feature = "testing")]
pub mod subscriptions;
#[cfg(not(feature = "testing"))]
mod subscriptions;

#[cfg(feature = "testing")]
pub mod transport;
#[cfg(not(feature = "testing"))]
mod transport;

#[cfg(feature = "websocket")]
mod websocket;

// Error types
pub use error::NetworkError;

// Transport abstraction
pub use transport::{
    ConnectionState, Transport, TransportEvent, TransportResult, NORMAL_CLOSURE,
};

// In-process relay for testing
pub use mock::{MockRelay, MockTransport};

// WebSocket transport for production
#[cfg(feature = "websocket")]
pub use websocket::WebSocketTransport;

// Connection management
pub use connection::{ConnectionPolicy, ReconnectConfig};
pub use dispatcher::Dispatcher;
pub use subscriptions::SubscriptionsTracker;

// Relay client
pub use relay::RelayMessage;
pub use relay_client::{RelayClient, RelayClientConfig};
