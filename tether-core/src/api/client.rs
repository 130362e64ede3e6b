// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Sign Client
//!
//! Main entry point for the sign API. One [`SignClient`] owns the relay
//! connection, the stores and the engines for a single app, dApp or
//! wallet alike.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::crypto::PublicKey;
use crate::kms::KeyManagementService;
use crate::network::{
    ConnectionState, Dispatcher, RelayClient, SubscriptionsTracker, Transport, NORMAL_CLOSURE,
};
use crate::networking::NetworkingInteractor;
use crate::rpc::{RpcHistory, RpcId, RpcOutcome};
use crate::serializer::Serializer;
use crate::sign::approve_engine::ApproveEngine;
use crate::sign::context::EngineContext;
use crate::sign::expiry::ExpirySweeper;
use crate::sign::pairing_engine::PairingEngine;
use crate::sign::propose::ProposeService;
use crate::sign::session_engine::SessionEngine;
use crate::sign::{
    AppMetadata, Blockchain, EventPayload, Pairing, PairingUri, Proposal, ProposalNamespaces,
    Reason, RequestPayload, Session, SessionNamespaces, SweepReport, VerifyContext,
};
use crate::storage::{
    KeyValueStore, MemoryKeychain, MemoryStore, PairingStore, ProposalStore, SecureStorage,
    SessionStore, SqliteStore, VerifyContextStore,
};
use crate::verify::{UnknownVerifier, VerifyClient};

use super::config::SignConfig;
use super::error::{SignError, SignResult};
use super::events::{EventDispatcher, EventHandler, SignEvent};

/// What the dApp hands to the wallet after [`SignClient::connect`].
#[derive(Debug, Clone)]
pub struct ConnectResult {
    /// Pairing URI to show as a QR code or deep link.
    pub uri: PairingUri,
    pub pairing_topic: String,
    /// Identifies the proposal in the wallet's answer.
    pub proposer_public_key: PublicKey,
}

/// Sign protocol client.
///
/// # Example
///
/// ```ignore
/// use tether_core::api::{SignClient, SignConfig};
///
/// let client = SignClient::builder(SignConfig::new(project_id, metadata))
///     .storage_path("tether.db")
///     .build()
///     .await?;
/// let mut events = client.subscribe_events();
///
/// let connect = client.connect(required, optional, None).await?;
/// println!("scan: {}", connect.uri);
/// ```
pub struct SignClient {
    config: SignConfig,
    ctx: Arc<EngineContext>,
    pairing: Arc<PairingEngine>,
    approve: Arc<ApproveEngine>,
    session: Arc<SessionEngine>,
    propose: ProposeService,
    sweeper: Arc<ExpirySweeper>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SignClient {
    pub fn builder(config: SignConfig) -> SignClientBuilder {
        SignClientBuilder::new(config)
    }

    // === dApp side ===

    /// Creates a pairing and proposes a session on it.
    pub async fn connect(
        &self,
        required_namespaces: ProposalNamespaces,
        optional_namespaces: ProposalNamespaces,
        session_properties: Option<BTreeMap<String, String>>,
    ) -> SignResult<ConnectResult> {
        let uri = self.pairing.create().await?;
        let proposer_public_key = match self
            .propose
            .propose(
                &uri.topic,
                required_namespaces,
                optional_namespaces,
                session_properties,
            )
            .await
        {
            Ok(key) => key,
            Err(e) => {
                self.pairing.discard(&uri.topic).await;
                return Err(e);
            }
        };
        Ok(ConnectResult {
            pairing_topic: uri.topic.clone(),
            uri,
            proposer_public_key,
        })
    }

    /// Proposes a new session on a pairing that already has a peer.
    pub async fn connect_on_pairing(
        &self,
        pairing_topic: &str,
        required_namespaces: ProposalNamespaces,
        optional_namespaces: ProposalNamespaces,
        session_properties: Option<BTreeMap<String, String>>,
    ) -> SignResult<PublicKey> {
        let pairing = self
            .ctx
            .pairings
            .get(pairing_topic)?
            .ok_or_else(|| SignError::PairingNotFound(pairing_topic.to_string()))?;
        if pairing.is_expired(self.ctx.now()) {
            return Err(SignError::PairingExpired(pairing_topic.to_string()));
        }
        self.propose
            .propose(
                pairing_topic,
                required_namespaces,
                optional_namespaces,
                session_properties,
            )
            .await
    }

    // === Wallet side ===

    /// Joins the pairing in `uri`; proposals arrive as events.
    pub async fn pair(&self, uri: &str) -> SignResult<Pairing> {
        self.pairing.pair(uri).await
    }

    pub async fn approve(
        &self,
        proposer_public_key: &PublicKey,
        namespaces: SessionNamespaces,
        session_properties: Option<BTreeMap<String, String>>,
        scoped_properties: Option<BTreeMap<String, String>>,
    ) -> SignResult<Session> {
        self.approve
            .approve_proposal(
                proposer_public_key,
                namespaces,
                session_properties,
                scoped_properties,
            )
            .await
    }

    pub async fn reject(&self, proposer_public_key: &PublicKey, reason: Reason) -> SignResult<()> {
        self.approve
            .reject_proposal(proposer_public_key, reason)
            .await
    }

    pub fn get_pending_proposals(&self) -> SignResult<Vec<Proposal>> {
        self.approve.pending_proposals()
    }

    // === Sessions ===

    pub async fn request(
        &self,
        topic: &str,
        chain_id: Blockchain,
        request: RequestPayload,
    ) -> SignResult<RpcId> {
        self.session.request(topic, chain_id, request).await
    }

    pub async fn respond(&self, topic: &str, id: RpcId, outcome: RpcOutcome) -> SignResult<()> {
        self.session.respond(topic, id, outcome).await
    }

    pub async fn emit(
        &self,
        topic: &str,
        chain_id: Blockchain,
        event: EventPayload,
    ) -> SignResult<()> {
        self.session.emit(topic, chain_id, event).await
    }

    pub async fn update(&self, topic: &str, namespaces: SessionNamespaces) -> SignResult<()> {
        self.session.update(topic, namespaces).await
    }

    /// Returns the new expiry.
    pub async fn extend(&self, topic: &str) -> SignResult<u64> {
        self.session.extend(topic).await
    }

    /// Pings a session, or a pairing if no session lives on `topic`.
    pub async fn ping(&self, topic: &str) -> SignResult<()> {
        if self.ctx.sessions.get(topic)?.is_some() {
            return self.session.ping(topic).await;
        }
        if self.ctx.pairings.get(topic)?.is_some() {
            return self.pairing.ping(topic).await;
        }
        Err(SignError::SessionNotFound(topic.to_string()))
    }

    /// Deletes a session, or a pairing if no session lives on `topic`.
    pub async fn disconnect(&self, topic: &str) -> SignResult<()> {
        if self.ctx.sessions.get(topic)?.is_some() {
            return self.session.disconnect(topic).await;
        }
        if self.ctx.pairings.get(topic)?.is_some() {
            return self.pairing.delete(topic).await;
        }
        Err(SignError::SessionNotFound(topic.to_string()))
    }

    pub fn get_sessions(&self) -> SignResult<Vec<Session>> {
        self.session.sessions()
    }

    pub fn get_pairings(&self) -> SignResult<Vec<Pairing>> {
        Ok(self.ctx.pairings.all()?)
    }

    /// The verify context stored for an inbound proposal or request.
    pub fn get_verify_context(&self, id: RpcId) -> SignResult<Option<VerifyContext>> {
        Ok(self.ctx.verify_contexts.get(id)?)
    }

    /// Removes expired sessions, pairings and proposals now.
    pub async fn sweep_expired(&self) -> SignResult<SweepReport> {
        self.sweeper.sweep().await
    }

    // === Relay connection ===

    /// Opens the relay socket. Only allowed under the manual policy.
    pub fn connect_relay(&self) -> SignResult<()> {
        Ok(self.dispatcher().connect()?)
    }

    /// Closes the relay socket. Only allowed under the manual policy.
    pub fn disconnect_relay(&self) -> SignResult<()> {
        Ok(self.dispatcher().disconnect(NORMAL_CLOSURE)?)
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.dispatcher().status()
    }

    /// Reports a platform network change to the automatic policy.
    pub fn notify_network_change(&self, available: bool) {
        self.dispatcher().notify_network_change(available);
    }

    pub fn notify_app_foreground(&self) {
        self.dispatcher().notify_app_foreground();
    }

    fn dispatcher(&self) -> &Arc<Dispatcher> {
        self.ctx.interactor.relay().dispatcher()
    }

    // === Events ===

    /// A receiver for every event dispatched after this call.
    pub fn subscribe_events(&self) -> broadcast::Receiver<SignEvent> {
        self.ctx.events.subscribe()
    }

    pub fn add_handler(&self, handler: Arc<dyn EventHandler>) {
        self.ctx.events.add_handler(handler);
    }

    pub fn metadata(&self) -> &AppMetadata {
        &self.ctx.metadata
    }

    pub fn config(&self) -> &SignConfig {
        &self.config
    }

    /// Subscribes once, in a single batch, to every stored topic.
    async fn restore_subscriptions(&self) -> SignResult<usize> {
        let now = self.ctx.now();
        let mut topics: Vec<String> = self
            .ctx
            .sessions
            .all()?
            .into_iter()
            .filter(|s| !s.is_expired(now))
            .map(|s| s.topic)
            .collect();
        topics.extend(
            self.ctx
                .pairings
                .all()?
                .into_iter()
                .filter(|p| !p.is_expired(now))
                .map(|p| p.topic),
        );
        topics.extend(
            self.ctx
                .proposals
                .all_pending_settlements()?
                .into_iter()
                .map(|(topic, _)| topic),
        );
        topics.sort();
        topics.dedup();
        if topics.is_empty() {
            return Ok(0);
        }
        let count = topics.len();
        self.ctx
            .interactor
            .batch_subscribe(topics)
            .await
            .map_err(SignError::from_networking)?;
        Ok(count)
    }

    fn spawn_state_forwarder(&self) -> JoinHandle<()> {
        let mut status = self.dispatcher().status_changes();
        let events = Arc::downgrade(&self.ctx.events);
        tokio::spawn(async move {
            while status.changed().await.is_ok() {
                let state = *status.borrow_and_update();
                let Some(events) = events.upgrade() else {
                    break;
                };
                events.dispatch(SignEvent::ConnectionStateChanged { state });
            }
        })
    }
}

impl Drop for SignClient {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}

/// Assembles a [`SignClient`] from its collaborators.
///
/// Anything not injected falls back to: the WebSocket transport, an
/// in-memory store and keychain, the system clock and a verifier that
/// reports every origin as unknown.
pub struct SignClientBuilder {
    config: SignConfig,
    transport: Option<Arc<dyn Transport>>,
    store: Option<Arc<dyn KeyValueStore>>,
    storage_path: Option<PathBuf>,
    keychain: Option<Arc<dyn SecureStorage>>,
    verifier: Option<Arc<dyn VerifyClient>>,
    clock: Option<Arc<dyn Clock>>,
}

impl SignClientBuilder {
    pub fn new(config: SignConfig) -> Self {
        SignClientBuilder {
            config,
            transport: None,
            store: None,
            storage_path: None,
            keychain: None,
            verifier: None,
            clock: None,
        }
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Persists state in a SQLite database at `path`.
    pub fn storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_path = Some(path.into());
        self
    }

    pub fn keychain(mut self, keychain: Arc<dyn SecureStorage>) -> Self {
        self.keychain = Some(keychain);
        self
    }

    pub fn verifier(mut self, verifier: Arc<dyn VerifyClient>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds the client, starts its engines and resubscribes to every
    /// stored topic. Must be called within a tokio runtime.
    pub async fn build(self) -> SignResult<SignClient> {
        let config = self.config;
        let transport = match self.transport {
            Some(transport) => transport,
            None => default_transport(&config)?,
        };
        let store: Arc<dyn KeyValueStore> = match (self.store, self.storage_path) {
            (Some(store), _) => store,
            (None, Some(path)) => Arc::new(SqliteStore::open(path)?),
            (None, None) => {
                debug!("no store configured, state is in-memory");
                Arc::new(MemoryStore::new())
            }
        };
        let keychain = self
            .keychain
            .unwrap_or_else(|| Arc::new(MemoryKeychain::new()));
        let verifier = self
            .verifier
            .unwrap_or_else(|| Arc::new(UnknownVerifier));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let kms = Arc::new(KeyManagementService::new(keychain));
        let tracker = Arc::new(SubscriptionsTracker::new());
        let history = Arc::new(RpcHistory::load(store.clone(), clock.clone())?);
        let dispatcher = Dispatcher::new(
            transport,
            config.connection_policy,
            config.reconnect,
            tracker.clone(),
            config.timeouts.connection,
        )?;
        let relay = RelayClient::new(
            dispatcher,
            tracker,
            history.clone(),
            config.to_relay_client_config(),
        );
        let interactor = NetworkingInteractor::new(
            relay,
            Arc::new(Serializer::new(kms.clone())),
            history,
            config.timeouts.response,
        );

        let ctx = Arc::new(EngineContext {
            kms,
            interactor,
            sessions: SessionStore::new(store.clone()),
            pairings: PairingStore::new(store.clone()),
            proposals: ProposalStore::new(store.clone()),
            verify_contexts: VerifyContextStore::new(store),
            verifier,
            clock,
            metadata: config.metadata.clone(),
            ttl: config.ttl,
            events: Arc::new(EventDispatcher::new(config.event_channel_capacity)),
        });

        let pairing = PairingEngine::new(ctx.clone());
        let approve = ApproveEngine::new(ctx.clone(), pairing.clone());
        let session = SessionEngine::new(ctx.clone());
        let sweeper = ExpirySweeper::new(ctx.clone(), pairing.clone());
        pairing.start();
        approve.start();
        session.start();

        let client = SignClient {
            propose: ProposeService::new(ctx.clone()),
            config,
            ctx,
            pairing,
            approve,
            session,
            sweeper,
            tasks: Mutex::new(Vec::new()),
        };

        let mut tasks = vec![client.spawn_state_forwarder()];
        if let Some(interval) = client.config.expiry_sweep_interval {
            tasks.push(client.sweeper.spawn(interval));
        }
        client.tasks.lock().extend(tasks);

        match client.restore_subscriptions().await {
            Ok(0) => {}
            Ok(count) => info!(count, "restored topic subscriptions"),
            Err(e) => {
                warn!(error = %e, "failed to restore subscriptions");
                client.ctx.emit(SignEvent::Error {
                    message: format!("failed to restore subscriptions: {}", e),
                });
            }
        }
        info!(name = %client.ctx.metadata.name, "sign client ready");
        Ok(client)
    }
}

#[cfg(feature = "websocket")]
fn default_transport(config: &SignConfig) -> SignResult<Arc<dyn Transport>> {
    if config.project_id.is_empty() {
        return Err(SignError::Configuration("project id is required".into()));
    }
    let transport = crate::network::WebSocketTransport::new(&config.relay_url, &config.project_id)?;
    Ok(Arc::new(transport))
}

#[cfg(not(feature = "websocket"))]
fn default_transport(_config: &SignConfig) -> SignResult<Arc<dyn Transport>> {
    Err(SignError::Configuration(
        "no transport given and the websocket feature is disabled".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::network::{ConnectionPolicy, MockRelay};

    fn config(name: &str) -> SignConfig {
        SignConfig::new(
            "project",
            AppMetadata::new(name, name, &format!("https://{}.example.org", name)),
        )
        .with_connection_policy(ConnectionPolicy::Manual)
        .with_expiry_sweep_interval(None)
    }

    #[tokio::test]
    async fn test_build_with_injected_collaborators() {
        let relay = MockRelay::new();
        let client = SignClient::builder(config("dapp"))
            .transport(relay.transport())
            .clock(Arc::new(ManualClock::new(1_700_000_000)))
            .build()
            .await
            .unwrap();

        assert_eq!(client.metadata().name, "dapp");
        assert_eq!(client.connection_state(), ConnectionState::Disconnected);
        assert!(client.get_sessions().unwrap().is_empty());
        assert_eq!(relay.call_count("irn_batchSubscribe"), 0);
    }

    #[tokio::test]
    async fn test_restart_resubscribes_in_one_batch() {
        let relay = MockRelay::new();
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let keychain: Arc<dyn SecureStorage> = Arc::new(MemoryKeychain::new());
        let clock = Arc::new(ManualClock::new(1_700_000_000));

        let first = SignClient::builder(config("dapp"))
            .transport(relay.transport())
            .store(store.clone())
            .keychain(keychain.clone())
            .clock(clock.clone())
            .build()
            .await
            .unwrap();
        first.pairing.create().await.unwrap();
        first.pairing.create().await.unwrap();
        first.disconnect_relay().unwrap();
        drop(first);

        let second = SignClient::builder(config("dapp"))
            .transport(relay.transport())
            .store(store)
            .keychain(keychain)
            .clock(clock)
            .build()
            .await
            .unwrap();
        assert_eq!(second.get_pairings().unwrap().len(), 2);
        assert_eq!(relay.call_count("irn_batchSubscribe"), 1);
    }

    #[tokio::test]
    async fn test_ping_unknown_topic() {
        let relay = MockRelay::new();
        let client = SignClient::builder(config("dapp"))
            .transport(relay.transport())
            .build()
            .await
            .unwrap();
        assert!(matches!(
            client.ping("nowhere").await,
            Err(SignError::SessionNotFound(_))
        ));
    }
}
