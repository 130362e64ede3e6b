// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Mock Relay
//!
//! In-process relay and transports for testing. Every [`MockTransport`]
//! handed out by the same [`MockRelay`] talks to the same hub, so two
//! clients built on it can pair and exchange messages without a socket.
//!
//! Publishes on a topic nobody else is subscribed to are held in a mailbox
//! and flushed to the next subscriber, mirroring the relay's short-term
//! message retention. Every publish is also kept so a test can replay it,
//! the way a relay may deliver a message more than once.
//!
//! # Example
//!
//! ```ignore
//! use tether_core::network::MockRelay;
//!
//! let relay = MockRelay::new();
//! let dapp_transport = relay.transport();
//! let wallet_transport = relay.transport();
//!
//! relay.set_reachable(false); // subsequent connects fail
//! assert_eq!(relay.call_count("irn_publish"), 0);
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;

use super::error::NetworkError;
use super::relay::{
    BatchSubscribeParams, PublishParams, SubscribeParams, SubscriptionData, SubscriptionParams,
    UnsubscribeParams, IRN_BATCH_SUBSCRIBE, IRN_PUBLISH, IRN_SUBSCRIBE, IRN_SUBSCRIPTION,
    IRN_UNSUBSCRIBE,
};
use super::transport::{Transport, TransportEvent, TransportResult};
use crate::rpc::{RpcPayload, RpcRequest, RpcResponse};

const EVENT_CHANNEL_CAPACITY: usize = 1024;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;
const REJECTED: i64 = -32000;

struct Peer {
    events: broadcast::Sender<TransportEvent>,
    connected: Arc<AtomicBool>,
}

impl Peer {
    fn deliver(&self, text: String) {
        if self.connected.load(Ordering::SeqCst) {
            let _ = self.events.send(TransportEvent::Text(text));
        }
    }
}

struct HubState {
    peers: HashMap<u64, Peer>,
    /// topic -> client id -> subscription id
    subscriptions: HashMap<String, BTreeMap<u64, String>>,
    /// topic -> (publisher, message) awaiting a subscriber
    mailbox: HashMap<String, Vec<(u64, SubscriptionData)>>,
    /// topic -> (publisher, message) for every publish, oldest first
    published: HashMap<String, Vec<(u64, SubscriptionData)>>,
    reachable: bool,
    acknowledge_publishes: bool,
    rejected_tags: HashSet<u32>,
    calls: HashMap<String, usize>,
    next_client: u64,
    next_subscription: u64,
}

impl HubState {
    fn subscription_id(&mut self) -> String {
        self.next_subscription += 1;
        format!("sub-{}", self.next_subscription)
    }

    fn drop_client_subscriptions(&mut self, client: u64) {
        for subscribers in self.subscriptions.values_mut() {
            subscribers.remove(&client);
        }
        self.subscriptions.retain(|_, subscribers| !subscribers.is_empty());
    }

    /// Delivers `data` to every subscriber of its topic except `publisher`.
    /// Returns how many received it.
    fn fan_out(&self, publisher: u64, data: &SubscriptionData) -> usize {
        let Some(subscribers) = self.subscriptions.get(&data.topic) else {
            return 0;
        };
        let mut delivered = 0;
        for (client, id) in subscribers.iter().filter(|(client, _)| **client != publisher) {
            if let (Some(peer), Some(text)) =
                (self.peers.get(client), subscription_frame(id, data.clone()))
            {
                peer.deliver(text);
                delivered += 1;
            }
        }
        delivered
    }

    fn flush_mailbox(&mut self, topic: &str, client: u64) {
        let Some(queued) = self.mailbox.remove(topic) else {
            return;
        };
        let (own, queued): (Vec<_>, Vec<_>) =
            queued.into_iter().partition(|(publisher, _)| *publisher == client);
        if !own.is_empty() {
            self.mailbox.insert(topic.to_string(), own);
        }
        let Some(peer) = self.peers.get(&client) else {
            return;
        };
        let id = self
            .subscriptions
            .get(topic)
            .and_then(|s| s.get(&client))
            .cloned()
            .unwrap_or_default();
        for (_, data) in queued {
            if let Some(text) = subscription_frame(&id, data) {
                peer.deliver(text);
            }
        }
    }
}

fn subscription_frame(id: &str, data: SubscriptionData) -> Option<String> {
    let params = SubscriptionParams {
        id: id.to_string(),
        data,
    };
    let request = RpcRequest::new(IRN_SUBSCRIPTION, &params).ok()?;
    serde_json::to_string(&request).ok()
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Shared in-process relay hub.
#[derive(Clone)]
pub struct MockRelay {
    hub: Arc<Mutex<HubState>>,
}

impl Default for MockRelay {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRelay {
    pub fn new() -> Self {
        MockRelay {
            hub: Arc::new(Mutex::new(HubState {
                peers: HashMap::new(),
                subscriptions: HashMap::new(),
                mailbox: HashMap::new(),
                published: HashMap::new(),
                reachable: true,
                acknowledge_publishes: true,
                rejected_tags: HashSet::new(),
                calls: HashMap::new(),
                next_client: 0,
                next_subscription: 0,
            })),
        }
    }

    /// Creates a new client socket attached to this relay.
    pub fn transport(&self) -> Arc<MockTransport> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let connected = Arc::new(AtomicBool::new(false));
        let client = {
            let mut hub = self.hub.lock();
            hub.next_client += 1;
            let client = hub.next_client;
            hub.peers.insert(
                client,
                Peer {
                    events: events.clone(),
                    connected: connected.clone(),
                },
            );
            client
        };
        Arc::new(MockTransport {
            hub: self.hub.clone(),
            client,
            events,
            connected,
            connect_calls: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            inject_error: Mutex::new(None),
        })
    }

    /// When unreachable, connects are accepted but the socket closes at once.
    pub fn set_reachable(&self, reachable: bool) {
        self.hub.lock().reachable = reachable;
    }

    /// When disabled, publishes are delivered but never acknowledged.
    pub fn set_acknowledge_publishes(&self, enabled: bool) {
        self.hub.lock().acknowledge_publishes = enabled;
    }

    /// Rejects every publish carrying `tag` with a relay error.
    pub fn reject_publishes_with_tag(&self, tag: u32) {
        self.hub.lock().rejected_tags.insert(tag);
    }

    /// How many times `method` reached the relay.
    pub fn call_count(&self, method: &str) -> usize {
        self.hub.lock().calls.get(method).copied().unwrap_or(0)
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.hub
            .lock()
            .subscriptions
            .get(topic)
            .map_or(0, BTreeMap::len)
    }

    pub fn mailbox_len(&self, topic: &str) -> usize {
        self.hub.lock().mailbox.get(topic).map_or(0, Vec::len)
    }

    /// Delivers the latest message published on `topic` a second time.
    /// Returns how many subscribers received it.
    pub fn redeliver_last(&self, topic: &str) -> usize {
        let hub = self.hub.lock();
        match hub.published.get(topic).and_then(|sent| sent.last()) {
            Some((publisher, data)) => hub.fan_out(*publisher, data),
            None => 0,
        }
    }

    /// Like [`Self::redeliver_last`], for the latest message carrying `tag`.
    pub fn redeliver_last_tagged(&self, topic: &str, tag: u32) -> usize {
        let hub = self.hub.lock();
        let latest = hub
            .published
            .get(topic)
            .and_then(|sent| sent.iter().rev().find(|(_, data)| data.tag == tag));
        match latest {
            Some((publisher, data)) => hub.fan_out(*publisher, data),
            None => 0,
        }
    }
}

/// One client's socket to a [`MockRelay`].
pub struct MockTransport {
    hub: Arc<Mutex<HubState>>,
    client: u64,
    events: broadcast::Sender<TransportEvent>,
    connected: Arc<AtomicBool>,
    connect_calls: AtomicUsize,
    writes: AtomicUsize,
    /// Error to inject on next operation.
    inject_error: Mutex<Option<NetworkError>>,
}

impl MockTransport {
    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    /// Frames written while connected.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Injects an error to be returned on the next operation.
    pub fn inject_error(&self, error: NetworkError) {
        *self.inject_error.lock() = Some(error);
    }

    /// Drops the socket as a network failure would.
    pub fn simulate_drop(&self) {
        self.close(Some("connection reset".to_string()));
    }

    fn check_error(&self) -> TransportResult<()> {
        match self.inject_error.lock().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn close(&self, reason: Option<String>) {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return;
        }
        self.hub.lock().drop_client_subscriptions(self.client);
        let _ = self.events.send(TransportEvent::Disconnected(reason));
    }

    fn reply(&self, response: RpcResponse) {
        if let Ok(text) = serde_json::to_string(&response) {
            let _ = self.events.send(TransportEvent::Text(text));
        }
    }

    fn handle_request(&self, request: RpcRequest) {
        let mut hub = self.hub.lock();
        *hub.calls.entry(request.method.clone()).or_default() += 1;

        let response = match request.method.as_str() {
            IRN_PUBLISH => match request.params_as::<PublishParams>() {
                Ok(params) => {
                    if hub.rejected_tags.contains(&params.tag) {
                        RpcResponse::error(request.id, REJECTED, "publish rejected")
                    } else {
                        self.route(&mut hub, params);
                        if !hub.acknowledge_publishes {
                            return;
                        }
                        match RpcResponse::success(request.id, &true) {
                            Ok(response) => response,
                            Err(_) => return,
                        }
                    }
                }
                Err(e) => RpcResponse::error(request.id, INVALID_PARAMS, e.to_string()),
            },
            IRN_SUBSCRIBE => match request.params_as::<SubscribeParams>() {
                Ok(params) => {
                    let id = hub.subscription_id();
                    hub.subscriptions
                        .entry(params.topic.clone())
                        .or_default()
                        .insert(self.client, id.clone());
                    if let Ok(response) = RpcResponse::success(request.id, &id) {
                        self.reply(response);
                    }
                    hub.flush_mailbox(&params.topic, self.client);
                    return;
                }
                Err(e) => RpcResponse::error(request.id, INVALID_PARAMS, e.to_string()),
            },
            IRN_BATCH_SUBSCRIBE => match request.params_as::<BatchSubscribeParams>() {
                Ok(params) => {
                    let mut ids = Vec::with_capacity(params.topics.len());
                    for topic in &params.topics {
                        let id = hub.subscription_id();
                        hub.subscriptions
                            .entry(topic.clone())
                            .or_default()
                            .insert(self.client, id.clone());
                        ids.push(id);
                    }
                    if let Ok(response) = RpcResponse::success(request.id, &ids) {
                        self.reply(response);
                    }
                    for topic in &params.topics {
                        hub.flush_mailbox(topic, self.client);
                    }
                    return;
                }
                Err(e) => RpcResponse::error(request.id, INVALID_PARAMS, e.to_string()),
            },
            IRN_UNSUBSCRIBE => match request.params_as::<UnsubscribeParams>() {
                Ok(params) => {
                    if let Some(subscribers) = hub.subscriptions.get_mut(&params.topic) {
                        subscribers.remove(&self.client);
                        if subscribers.is_empty() {
                            hub.subscriptions.remove(&params.topic);
                        }
                    }
                    match RpcResponse::success(request.id, &true) {
                        Ok(response) => response,
                        Err(_) => return,
                    }
                }
                Err(e) => RpcResponse::error(request.id, INVALID_PARAMS, e.to_string()),
            },
            other => RpcResponse::error(
                request.id,
                METHOD_NOT_FOUND,
                format!("unknown method {}", other),
            ),
        };
        self.reply(response);
    }

    fn route(&self, hub: &mut HubState, params: PublishParams) {
        let data = SubscriptionData {
            topic: params.topic.clone(),
            message: params.message,
            published_at: now_millis(),
            tag: params.tag,
        };
        hub.published
            .entry(params.topic.clone())
            .or_default()
            .push((self.client, data.clone()));

        if hub.fan_out(self.client, &data) == 0 {
            hub.mailbox
                .entry(params.topic)
                .or_default()
                .push((self.client, data));
        }
    }
}

impl Transport for MockTransport {
    fn connect(&self) -> TransportResult<()> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        self.check_error()?;
        if self.connected.load(Ordering::SeqCst) {
            return Ok(());
        }
        if self.hub.lock().reachable {
            self.connected.store(true, Ordering::SeqCst);
            let _ = self.events.send(TransportEvent::Connected);
        } else {
            let _ = self
                .events
                .send(TransportEvent::Disconnected(Some("relay unreachable".into())));
        }
        Ok(())
    }

    fn disconnect(&self, _code: u16) -> TransportResult<()> {
        self.check_error()?;
        self.close(None);
        Ok(())
    }

    fn write(&self, text: String) -> TransportResult<()> {
        self.check_error()?;
        if !self.connected.load(Ordering::SeqCst) {
            return Err(NetworkError::NotConnected);
        }
        self.writes.fetch_add(1, Ordering::SeqCst);

        let value: Value = serde_json::from_str(&text)?;
        match RpcPayload::from_value(value)? {
            RpcPayload::Request(request) => self.handle_request(request),
            // Acks for delivered subscription messages.
            RpcPayload::Response(_) => {}
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn events(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        let mut hub = self.hub.lock();
        hub.drop_client_subscriptions(self.client);
        hub.peers.remove(&self.client);
    }
}
