// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Tether API Layer
//!
//! High-level API for dApps and wallets speaking the sign protocol.
//!
//! # Overview
//!
//! The API layer wraps the engines behind one handle that coordinates:
//! - Pairing and session proposals
//! - Approval and settlement
//! - Session requests, events, updates and extensions
//! - Expiry sweeping
//! - Event delivery to the host
//!
//! # Example
//!
//! ```ignore
//! use tether_core::api::{SignClient, SignConfig};
//! use tether_core::sign::AppMetadata;
//!
//! let metadata = AppMetadata::new("Wallet", "A wallet", "https://wallet.example.org");
//! let wallet = SignClient::builder(SignConfig::new(project_id, metadata))
//!     .build()
//!     .await?;
//!
//! wallet.pair(&uri).await?;
//! let mut events = wallet.subscribe_events();
//! while let Ok(event) = events.recv().await {
//!     println!("Event: {:?}", event);
//! }
//! ```
//!
//! # Module Structure
//!
//! - [`error`] - Error types for the API layer
//! - [`config`] - Configuration types
//! - [`events`] - Event system for callbacks
//! - [`client`] - The [`SignClient`] facade and its builder

#[cfg(feature = "testing")]
pub mod client;
#[cfg(not(feature = "testing"))]
mod client;

#[cfg(feature = "testing")]
pub mod config;
#[cfg(not(feature = "testing"))]
mod config;

#[cfg(feature = "testing")]
pub mod error;
#[cfg(not(feature = "testing"))]
mod error;

#[cfg(feature = "testing")]
pub mod events;
#[cfg(not(feature = "testing"))]
mod events;

// Error types
pub use error::{SignError, SignResult};

// Configuration
pub use config::{SignConfig, TimeoutConfig, TtlConfig, DEFAULT_RELAY_URL};

// Events
pub use events::{CallbackHandler, EventDispatcher, EventHandler, SignEvent};

// Client
pub use client::{ConnectResult, SignClient, SignClientBuilder};
