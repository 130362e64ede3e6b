// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Common Test Utilities
//!
//! Shared helpers for driving a dApp and a wallet against one in-process
//! relay. Not every test binary uses every helper.

#![allow(dead_code)]

pub mod strategies;

use std::sync::Arc;
use std::time::Duration;

use tether_core::api::{ConnectResult, SignClient, SignConfig, SignEvent};
use tether_core::network::{ConnectionPolicy, MockRelay, MockTransport};
use tether_core::storage::{KeyValueStore, MemoryKeychain, MemoryStore, SecureStorage};
use tether_core::{
    AppMetadata, ManualClock, Proposal, ProposalNamespace, ProposalNamespaces, Session,
    SessionNamespace, SessionNamespaces, StorageError,
};
use tokio::sync::broadcast;

/// Fixed start time for every test clock.
pub const T0: u64 = 1_700_000_000;

pub const ADDRESS: &str = "0xab16a96d359ec26a11e2c2b3d8f8b8942d5bfcdb";

/// Installs a test log writer once; `RUST_LOG` picks the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub struct Peer {
    pub client: SignClient,
    pub clock: Arc<ManualClock>,
    pub transport: Arc<MockTransport>,
    pub events: broadcast::Receiver<SignEvent>,
}

pub fn config(name: &str) -> SignConfig {
    SignConfig::new(
        "test-project",
        AppMetadata::new(name, name, &format!("https://{}.example.org", name)),
    )
    .with_connection_policy(ConnectionPolicy::Manual)
    .with_expiry_sweep_interval(None)
}

pub async fn peer(relay: &MockRelay, name: &str) -> Peer {
    peer_with(
        relay,
        name,
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryKeychain::new()),
    )
    .await
}

pub async fn peer_with(
    relay: &MockRelay,
    name: &str,
    store: Arc<dyn KeyValueStore>,
    keychain: Arc<dyn SecureStorage>,
) -> Peer {
    init_tracing();
    let clock = Arc::new(ManualClock::new(T0));
    let transport = relay.transport();
    let client = SignClient::builder(config(name))
        .transport(transport.clone())
        .store(store)
        .keychain(keychain)
        .clock(clock.clone())
        .build()
        .await
        .unwrap();
    let events = client.subscribe_events();
    Peer {
        client,
        clock,
        transport,
        events,
    }
}

/// In-memory store that counts writes per key prefix.
#[derive(Default)]
pub struct CountingStore {
    inner: MemoryStore,
    writes: parking_lot::Mutex<Vec<String>>,
}

impl CountingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes (sets and deletes) to keys under `prefix` so far.
    pub fn writes(&self, prefix: &str) -> usize {
        self.writes
            .lock()
            .iter()
            .filter(|key| key.starts_with(prefix))
            .count()
    }

    fn record(&self, key: &str) {
        self.writes.lock().push(key.to_string());
    }
}

impl KeyValueStore for CountingStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.record(key);
        self.inner.set(key, value)
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.record(key);
        self.inner.delete(key)
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        self.inner.keys(prefix)
    }
}

/// Next event matching `pick`, skipping others.
pub async fn next_event<T>(
    events: &mut broadcast::Receiver<SignEvent>,
    mut pick: impl FnMut(SignEvent) -> Option<T>,
) -> T {
    let wait = async {
        loop {
            if let Some(found) = pick(events.recv().await.unwrap()) {
                return found;
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .expect("event not delivered")
}

/// Polls `condition` until it holds or five seconds pass.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    let wait = async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .expect("condition never held");
}

pub fn eip155_required() -> ProposalNamespaces {
    let mut required = ProposalNamespaces::new();
    required.insert(
        "eip155".into(),
        ProposalNamespace::new(
            vec!["eip155:1".parse().unwrap()],
            vec!["eth_sendTransaction".to_string(), "personal_sign".to_string()],
            vec!["chainChanged".to_string(), "accountsChanged".to_string()],
        ),
    );
    required
}

/// Grants `personal_sign` and `eth_sendTransaction` with one account per chain.
pub fn eip155_granted(chains: &[&str]) -> SessionNamespaces {
    let mut namespaces = SessionNamespaces::new();
    namespaces.insert(
        "eip155".into(),
        SessionNamespace::new(
            chains
                .iter()
                .map(|chain| format!("{}:{}", chain, ADDRESS).parse().unwrap()),
            vec!["eth_sendTransaction".to_string(), "personal_sign".to_string()],
            vec!["chainChanged".to_string(), "accountsChanged".to_string()],
        ),
    );
    namespaces
}

/// The dApp connects, the wallet pairs and receives the proposal.
pub async fn propose(dapp: &Peer, wallet: &mut Peer) -> (ConnectResult, Proposal) {
    let connect = dapp
        .client
        .connect(eip155_required(), ProposalNamespaces::new(), None)
        .await
        .unwrap();
    wallet.client.pair(&connect.uri.to_string()).await.unwrap();
    let proposal = next_event(&mut wallet.events, |event| match event {
        SignEvent::SessionProposal { proposal, .. } => Some(proposal),
        _ => None,
    })
    .await;
    (connect, proposal)
}

/// Runs a full approval and waits for the dApp side to settle.
/// Returns the wallet's and the dApp's view of the session.
pub async fn settle(dapp: &mut Peer, wallet: &mut Peer) -> (Session, Session) {
    let (_, proposal) = propose(dapp, wallet).await;
    let session = wallet
        .client
        .approve(
            &proposal.proposer.public_key,
            eip155_granted(&["eip155:1"]),
            None,
            None,
        )
        .await
        .unwrap();
    let settled = next_event(&mut dapp.events, |event| match event {
        SignEvent::SessionSettled { session } => Some(session),
        _ => None,
    })
    .await;
    next_event(&mut wallet.events, |event| match event {
        SignEvent::SessionAcknowledged { .. } => Some(()),
        _ => None,
    })
    .await;
    (session, settled)
}
