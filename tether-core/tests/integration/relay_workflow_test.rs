// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Relay Workflow Integration Tests
//!
//! Connection loss, resubscription and request correlation.

use std::collections::HashSet;

use serde_json::json;
use tether_core::api::SignEvent;
use tether_core::network::MockRelay;
use tether_core::rpc::ProtocolMethod;
use tether_core::{ConnectionState, RequestPayload, RpcId, SignError};

use crate::common::*;

/// After a drop, every tracked topic comes back in a single batch.
#[tokio::test]
async fn test_reconnect_resubscribes_in_one_batch() {
    let relay = MockRelay::new();
    let mut dapp = peer(&relay, "dapp").await;
    let mut wallet = peer(&relay, "wallet").await;
    let (session, _) = settle(&mut dapp, &mut wallet).await;
    assert_eq!(relay.call_count("irn_batchSubscribe"), 0);

    wallet.transport.simulate_drop();
    eventually(|| wallet.client.connection_state() == ConnectionState::Disconnected).await;
    assert_eq!(relay.subscriber_count(&session.topic), 1);

    wallet.client.connect_relay().unwrap();
    eventually(|| relay.subscriber_count(&session.topic) == 2).await;
    assert_eq!(relay.call_count("irn_batchSubscribe"), 1);
    assert_eq!(relay.subscriber_count(&session.pairing_topic), 2);

    // The session works again.
    dapp.client
        .request(
            &session.topic,
            "eip155:1".parse().unwrap(),
            RequestPayload {
                method: "personal_sign".into(),
                params: json!(["0x00", ADDRESS]),
                expiry_timestamp: None,
            },
        )
        .await
        .unwrap();
    next_event(&mut wallet.events, |event| match event {
        SignEvent::SessionRequest { .. } => Some(()),
        _ => None,
    })
    .await;
}

#[tokio::test]
async fn test_connection_changes_are_reported() {
    let relay = MockRelay::new();
    let mut dapp = peer(&relay, "dapp").await;
    assert_eq!(dapp.client.connection_state(), ConnectionState::Disconnected);

    dapp.client.connect_relay().unwrap();
    let state = next_event(&mut dapp.events, |event| match event {
        SignEvent::ConnectionStateChanged { state } => Some(state),
        _ => None,
    })
    .await;
    assert_eq!(state, ConnectionState::Connected);

    dapp.client.disconnect_relay().unwrap();
    let state = next_event(&mut dapp.events, |event| match event {
        SignEvent::ConnectionStateChanged { state } => Some(state),
        _ => None,
    })
    .await;
    assert_eq!(state, ConnectionState::Disconnected);
}

/// Every request carries a fresh id, even across threads.
#[tokio::test]
async fn test_rpc_ids_are_unique() {
    let handles: Vec<_> = (0..4)
        .map(|_| std::thread::spawn(|| (0..1_000).map(|_| RpcId::generate()).collect::<Vec<_>>()))
        .collect();
    let mut seen = HashSet::new();
    for handle in handles {
        let ids = handle.join().unwrap();
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
        for id in ids {
            assert!(seen.insert(id), "duplicate id {}", id);
        }
    }

    let relay = MockRelay::new();
    let mut dapp = peer(&relay, "dapp").await;
    let mut wallet = peer(&relay, "wallet").await;
    let (session, _) = settle(&mut dapp, &mut wallet).await;
    let mut ids = Vec::new();
    for n in 0..10 {
        let id = dapp
            .client
            .request(
                &session.topic,
                "eip155:1".parse().unwrap(),
                RequestPayload {
                    method: "personal_sign".into(),
                    params: json!([format!("0x{:02x}", n), ADDRESS]),
                    expiry_timestamp: None,
                },
            )
            .await
            .unwrap();
        ids.push(id);
    }
    assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));

    // Each request reaches the wallet under its own id.
    let mut received = HashSet::new();
    while received.len() < ids.len() {
        let id = next_event(&mut wallet.events, |event| match event {
            SignEvent::SessionRequest { id, .. } => Some(id),
            _ => None,
        })
        .await;
        received.insert(id);
    }
    assert_eq!(received, ids.into_iter().collect());
}

/// A refused proposal publish leaves no pairing behind.
#[tokio::test]
async fn test_failed_proposal_discards_pairing() {
    let relay = MockRelay::new();
    let dapp = peer(&relay, "dapp").await;
    relay.reject_publishes_with_tag(ProtocolMethod::SessionPropose.request_policy().tag);

    let result = dapp
        .client
        .connect(eip155_required(), Default::default(), None)
        .await;
    assert!(matches!(result, Err(SignError::Networking(_))));
    assert!(dapp.client.get_pairings().unwrap().is_empty());
}
