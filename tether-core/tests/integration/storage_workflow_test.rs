// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Storage Workflow Integration Tests
//!
//! A wallet that restarts on a SQLite store picks up where it left off.

use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;
use tether_core::api::SignEvent;
use tether_core::network::MockRelay;
use tether_core::storage::{MemoryKeychain, SecureStorage};
use tether_core::{KeyValueStore, RequestPayload, RpcOutcome, SqliteStore};

use crate::common::*;

fn sqlite(dir: &TempDir) -> Arc<dyn KeyValueStore> {
    Arc::new(SqliteStore::open(dir.path().join("sign.db")).unwrap())
}

#[tokio::test]
async fn test_session_survives_restart() {
    let dir = TempDir::new().unwrap();
    let keychain: Arc<dyn SecureStorage> = Arc::new(MemoryKeychain::new());
    let relay = MockRelay::new();
    let mut dapp = peer(&relay, "dapp").await;

    let mut wallet = peer_with(&relay, "wallet", sqlite(&dir), keychain.clone()).await;
    let (session, _) = settle(&mut dapp, &mut wallet).await;
    wallet.client.disconnect_relay().unwrap();
    drop(wallet);

    // Step 1: the restored wallet still knows the session and its pairing.
    let mut wallet = peer_with(&relay, "wallet", sqlite(&dir), keychain.clone()).await;
    let sessions = wallet.client.get_sessions().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].topic, session.topic);
    assert_eq!(sessions[0].namespaces, session.namespaces);
    assert!(sessions[0].acknowledged);
    assert_eq!(wallet.client.get_pairings().unwrap().len(), 1);
    eventually(|| relay.subscriber_count(&session.topic) == 2).await;

    // Step 2: a request from the dApp reaches it and is answered.
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
    let received = next_event(&mut wallet.events, |event| match event {
        SignEvent::SessionRequest { id, .. } => Some(id),
        _ => None,
    })
    .await;
    assert_eq!(received, id);

    wallet
        .client
        .respond(&session.topic, id, RpcOutcome::Result(json!("0x02")))
        .await
        .unwrap();
    let outcome = next_event(&mut dapp.events, |event| match event {
        SignEvent::SessionResponse { id: answered, outcome, .. } if answered == id => {
            Some(outcome)
        }
        _ => None,
    })
    .await;
    assert_eq!(outcome, RpcOutcome::Result(json!("0x02")));
}

/// A session deleted before the restart stays deleted.
#[tokio::test]
async fn test_disconnect_is_persisted() {
    let dir = TempDir::new().unwrap();
    let keychain: Arc<dyn SecureStorage> = Arc::new(MemoryKeychain::new());
    let relay = MockRelay::new();
    let mut dapp = peer(&relay, "dapp").await;

    let mut wallet = peer_with(&relay, "wallet", sqlite(&dir), keychain.clone()).await;
    let (session, _) = settle(&mut dapp, &mut wallet).await;
    wallet.client.disconnect(&session.topic).await.unwrap();
    wallet.client.disconnect_relay().unwrap();
    drop(wallet);

    let wallet = peer_with(&relay, "wallet", sqlite(&dir), keychain).await;
    assert!(wallet.client.get_sessions().unwrap().is_empty());
    assert_eq!(wallet.client.get_pairings().unwrap().len(), 1);
    eventually(|| relay.subscriber_count(&session.topic) == 0).await;
}

/// A request received before a restart can still be answered after it.
#[tokio::test]
async fn test_pending_request_answered_after_restart() {
    let dir = TempDir::new().unwrap();
    let keychain: Arc<dyn SecureStorage> = Arc::new(MemoryKeychain::new());
    let relay = MockRelay::new();
    let mut dapp = peer(&relay, "dapp").await;

    let mut wallet = peer_with(&relay, "wallet", sqlite(&dir), keychain.clone()).await;
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
    wallet.client.disconnect_relay().unwrap();
    drop(wallet);

    let wallet = peer_with(&relay, "wallet", sqlite(&dir), keychain).await;
    eventually(|| relay.subscriber_count(&session.topic) == 2).await;
    wallet
        .client
        .respond(&session.topic, id, RpcOutcome::Result(json!("0x02")))
        .await
        .unwrap();

    let outcome = next_event(&mut dapp.events, |event| match event {
        SignEvent::SessionResponse { id: answered, outcome, .. } if answered == id => {
            Some(outcome)
        }
        _ => None,
    })
    .await;
    assert_eq!(outcome, RpcOutcome::Result(json!("0x02")));

    // Answered once; a second answer is refused.
    assert!(wallet
        .client
        .respond(&session.topic, id, RpcOutcome::Result(json!("0x03")))
        .await
        .is_err());
}
