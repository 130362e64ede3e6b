// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Session lifecycle on eip155, from pairing URI to disconnect.

use serde_json::json;
use tether_core::api::SignEvent;
use tether_core::network::MockRelay;
use tether_core::sign::Validation;
use tether_core::{Blockchain, EventPayload, Reason, RequestPayload, RpcOutcome};

use crate::common::*;

#[tokio::test]
async fn test_eip155_session_lifecycle() {
    let relay = MockRelay::new();
    let mut dapp = peer(&relay, "dapp").await;
    let mut wallet = peer(&relay, "wallet").await;

    // Step 1: the dApp shares a URI, the wallet pairs and sees the proposal.
    let connect = dapp
        .client
        .connect(eip155_required(), Default::default(), None)
        .await
        .unwrap();
    assert!(connect.uri.to_string().starts_with("wc:"));
    wallet.client.pair(&connect.uri.to_string()).await.unwrap();

    let (proposal, verify_context) = next_event(&mut wallet.events, |event| match event {
        SignEvent::SessionProposal {
            proposal,
            verify_context,
        } => Some((proposal, verify_context)),
        _ => None,
    })
    .await;
    assert_eq!(proposal.proposer.public_key, connect.proposer_public_key);
    assert_eq!(proposal.pairing_topic, connect.pairing_topic);
    assert_eq!(proposal.proposer.metadata.name, "dapp");
    assert_eq!(verify_context.validation, Validation::Unknown);
    assert_eq!(wallet.client.get_pending_proposals().unwrap().len(), 1);

    // Step 2: the wallet grants mainnet and polygon.
    let wallet_session = wallet
        .client
        .approve(
            &proposal.proposer.public_key,
            eip155_granted(&["eip155:1", "eip155:137"]),
            None,
            None,
        )
        .await
        .unwrap();
    assert!(!wallet_session.acknowledged);
    assert!(wallet_session.self_is_controller());
    assert!(wallet.client.get_pending_proposals().unwrap().is_empty());

    let dapp_session = next_event(&mut dapp.events, |event| match event {
        SignEvent::SessionSettled { session } => Some(session),
        _ => None,
    })
    .await;
    assert_eq!(dapp_session.topic, wallet_session.topic);
    assert_eq!(dapp_session.namespaces, wallet_session.namespaces);
    assert!(dapp_session.acknowledged);
    assert!(dapp_session.peer_is_controller());

    let topic = next_event(&mut wallet.events, |event| match event {
        SignEvent::SessionAcknowledged { topic } => Some(topic),
        _ => None,
    })
    .await;
    assert_eq!(topic, wallet_session.topic);
    let topic = wallet_session.topic.clone();
    assert!(wallet.client.get_sessions().unwrap()[0].acknowledged);

    // Both sides keep the pairing, now active.
    for side in [&dapp, &wallet] {
        let pairings = side.client.get_pairings().unwrap();
        assert_eq!(pairings.len(), 1);
        assert!(pairings[0].active);
    }

    // Step 3: a signing round trip.
    let mainnet: Blockchain = "eip155:1".parse().unwrap();
    let id = dapp
        .client
        .request(
            &topic,
            mainnet.clone(),
            RequestPayload {
                method: "personal_sign".into(),
                params: json!(["0x68656c6c6f", ADDRESS]),
                expiry_timestamp: None,
            },
        )
        .await
        .unwrap();
    let (received, chain) = next_event(&mut wallet.events, |event| match event {
        SignEvent::SessionRequest { id, chain_id, .. } => Some((id, chain_id)),
        _ => None,
    })
    .await;
    assert_eq!(received, id);
    assert_eq!(chain, mainnet);
    assert!(wallet.client.get_verify_context(id).unwrap().is_some());

    wallet
        .client
        .respond(&topic, id, RpcOutcome::Result(json!("0x5c2c")))
        .await
        .unwrap();
    let outcome = next_event(&mut dapp.events, |event| match event {
        SignEvent::SessionResponse { id: answered, outcome, .. } if answered == id => {
            Some(outcome)
        }
        _ => None,
    })
    .await;
    assert_eq!(outcome, RpcOutcome::Result(json!("0x5c2c")));

    // Step 4: the wallet switches chain and tells the dApp.
    let polygon: Blockchain = "eip155:137".parse().unwrap();
    wallet
        .client
        .emit(
            &topic,
            polygon.clone(),
            EventPayload {
                name: "chainChanged".into(),
                data: json!(137),
            },
        )
        .await
        .unwrap();
    let (chain, event) = next_event(&mut dapp.events, |event| match event {
        SignEvent::SessionEvent {
            chain_id, event, ..
        } => Some((chain_id, event)),
        _ => None,
    })
    .await;
    assert_eq!(chain, polygon);
    assert_eq!(event.name, "chainChanged");

    // Step 5: the wallet extends a day later.
    wallet.clock.advance(86_400);
    dapp.clock.advance(86_400);
    let expiry = wallet.client.extend(&topic).await.unwrap();
    assert_eq!(expiry, T0 + 86_400 + 7 * 86_400);
    let extended = next_event(&mut dapp.events, |event| match event {
        SignEvent::SessionExtended { expiry, .. } => Some(expiry),
        _ => None,
    })
    .await;
    assert_eq!(extended, expiry);

    // Step 6: the dApp disconnects.
    dapp.client.ping(&topic).await.unwrap();
    dapp.client.disconnect(&topic).await.unwrap();
    assert!(dapp.client.get_sessions().unwrap().is_empty());

    let reason = next_event(&mut wallet.events, |event| match event {
        SignEvent::SessionDeleted { reason, .. } => Some(reason),
        _ => None,
    })
    .await;
    assert_eq!(reason.reason(), Some(Reason::UserDisconnected));
    assert!(wallet.client.get_sessions().unwrap().is_empty());
    assert_eq!(relay.subscriber_count(&topic), 0);
}

#[tokio::test]
async fn test_wallet_update_reaches_dapp() {
    let relay = MockRelay::new();
    let mut dapp = peer(&relay, "dapp").await;
    let mut wallet = peer(&relay, "wallet").await;
    let (session, _) = settle(&mut dapp, &mut wallet).await;

    let widened = eip155_granted(&["eip155:1", "eip155:10"]);
    wallet
        .client
        .update(&session.topic, widened.clone())
        .await
        .unwrap();
    let namespaces = next_event(&mut dapp.events, |event| match event {
        SignEvent::SessionUpdated { namespaces, .. } => Some(namespaces),
        _ => None,
    })
    .await;
    assert_eq!(namespaces, widened);
    assert_eq!(dapp.client.get_sessions().unwrap()[0].namespaces, widened);

    // Dropping a required chain is refused before anything is sent.
    let result = wallet
        .client
        .update(&session.topic, eip155_granted(&["eip155:10"]))
        .await;
    assert!(matches!(
        result,
        Err(tether_core::SignError::Invalid(Reason::UnsupportedChains))
    ));
}

#[tokio::test]
async fn test_wallet_error_response_reaches_dapp() {
    let relay = MockRelay::new();
    let mut dapp = peer(&relay, "dapp").await;
    let mut wallet = peer(&relay, "wallet").await;
    let (session, _) = settle(&mut dapp, &mut wallet).await;

    let id = dapp
        .client
        .request(
            &session.topic,
            "eip155:1".parse().unwrap(),
            RequestPayload {
                method: "eth_sendTransaction".into(),
                params: json!([{ "to": ADDRESS, "value": "0x0" }]),
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

    let rejected = Reason::UserRejected.payload();
    wallet
        .client
        .respond(
            &session.topic,
            id,
            RpcOutcome::Error(tether_core::RpcErrorPayload {
                code: rejected.code,
                message: rejected.message,
            }),
        )
        .await
        .unwrap();
    let outcome = next_event(&mut dapp.events, |event| match event {
        SignEvent::SessionResponse { outcome, .. } => Some(outcome),
        _ => None,
    })
    .await;
    match outcome {
        RpcOutcome::Error(error) => assert_eq!(error.code, 5000),
        other => panic!("expected an error outcome, got {:?}", other),
    }
}
