// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Tether Core Library
//!
//! Session protocol engine connecting dApps and wallets over an untrusted
//! relay. Peers pair through a shared URI, agree on a session key with
//! X25519 and exchange sealed JSON-RPC messages on derived topics.
//! Key derivation uses the audited `ring` crate.

pub mod api;
pub mod clock;
pub mod crypto;
pub mod kms;
pub mod network;
pub mod networking;
pub mod rpc;
pub mod serializer;
pub mod sign;
pub mod storage;
pub mod verify;

pub use api::{
    ConnectResult, SignClient, SignClientBuilder, SignConfig, SignError, SignEvent, SignResult,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use crypto::{PublicKey, SymmetricKey};
pub use network::{ConnectionPolicy, ConnectionState, MockRelay, NetworkError, Transport};
pub use rpc::{RpcErrorPayload, RpcId, RpcOutcome};
pub use sign::{
    Account, AppMetadata, Blockchain, EventPayload, Pairing, PairingUri, Proposal,
    ProposalNamespace, ProposalNamespaces, Reason, ReasonPayload, RequestPayload, Session,
    SessionNamespace, SessionNamespaces, SweepReport, VerifyContext,
};
pub use storage::{KeyValueStore, MemoryStore, SecureStorage, SqliteStore, StorageError};
