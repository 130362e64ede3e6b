// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Duplicate Delivery Integration Tests
//!
//! The relay may hand the same frame over twice. A repeated settlement,
//! acknowledgement, request or response must not change state again.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tether_core::api::SignEvent;
use tether_core::network::MockRelay;
use tether_core::rpc::ProtocolMethod;
use tether_core::storage::MemoryKeychain;
use tether_core::{RequestPayload, RpcOutcome};
use tokio::sync::broadcast;

use crate::common::*;

/// Events queued so far, after giving spawned handlers a moment to run.
async fn drain(events: &mut broadcast::Receiver<SignEvent>) -> Vec<SignEvent> {
    tokio::time::sleep(Duration::from_millis(50)).await;
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

#[tokio::test]
async fn test_repeated_settlement_is_applied_once() {
    let relay = MockRelay::new();
    let store = Arc::new(CountingStore::new());
    let mut dapp = peer_with(&relay, "dapp", store.clone(), Arc::new(MemoryKeychain::new())).await;
    let mut wallet = peer(&relay, "wallet").await;
    let (session, _) = settle(&mut dapp, &mut wallet).await;
    let session_writes = store.writes("session/");

    let settle_tag = ProtocolMethod::SessionSettle.request_policy().tag;
    let ack_tag = ProtocolMethod::SessionSettle.response_policy().tag;
    assert_eq!(relay.redeliver_last_tagged(&session.topic, settle_tag), 1);
    assert_eq!(relay.redeliver_last_tagged(&session.topic, ack_tag), 1);

    // A round trip behind the repeats: both sides have consumed them.
    dapp.client.ping(&session.topic).await.unwrap();

    let dapp_events = drain(&mut dapp.events).await;
    assert!(!dapp_events
        .iter()
        .any(|event| matches!(event, SignEvent::SessionSettled { .. })));
    let wallet_events = drain(&mut wallet.events).await;
    assert!(!wallet_events
        .iter()
        .any(|event| matches!(event, SignEvent::SessionAcknowledged { .. })));

    assert_eq!(store.writes("session/"), session_writes);
    assert_eq!(dapp.client.get_sessions().unwrap().len(), 1);
}

#[tokio::test]
async fn test_repeated_request_and_response_surface_once() {
    let relay = MockRelay::new();
    let mut dapp = peer(&relay, "dapp").await;
    let store = Arc::new(CountingStore::new());
    let mut wallet =
        peer_with(&relay, "wallet", store.clone(), Arc::new(MemoryKeychain::new())).await;
    let (session, _) = settle(&mut dapp, &mut wallet).await;

    let id = dapp
        .client
        .request(
            &session.topic,
            "eip155:1".parse().unwrap(),
            RequestPayload {
                method: "personal_sign".into(),
                params: json!(["0x01", ADDRESS]),
                expiry_timestamp: None,
            },
        )
        .await
        .unwrap();
    next_event(&mut wallet.events, |event| match event {
        SignEvent::SessionRequest { id: received, .. } if received == id => Some(()),
        _ => None,
    })
    .await;

    let request_tag = ProtocolMethod::SessionRequest.request_policy().tag;
    assert_eq!(relay.redeliver_last_tagged(&session.topic, request_tag), 1);

    wallet
        .client
        .respond(&session.topic, id, RpcOutcome::Result(json!("0x02")))
        .await
        .unwrap();
    next_event(&mut dapp.events, |event| match event {
        SignEvent::SessionResponse { id: answered, .. } if answered == id => Some(()),
        _ => None,
    })
    .await;
    let history_writes = store.writes("history/");

    let response_tag = ProtocolMethod::SessionRequest.response_policy().tag;
    assert_eq!(relay.redeliver_last_tagged(&session.topic, response_tag), 1);
    wallet.client.ping(&session.topic).await.unwrap();

    assert!(!drain(&mut wallet.events)
        .await
        .iter()
        .any(|event| matches!(event, SignEvent::SessionRequest { .. })));
    assert!(!drain(&mut dapp.events)
        .await
        .iter()
        .any(|event| matches!(event, SignEvent::SessionResponse { .. })));

    // Only the ping itself touched the wallet's history.
    assert_eq!(store.writes("history/"), history_writes + 2);
}
