// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Settlement Workflow Integration Tests
//!
//! Approval guards, expiry and topic derivation.

use tether_core::api::SignEvent;
use tether_core::crypto::sha256_hex;
use tether_core::network::MockRelay;
use tether_core::{SessionNamespaces, SignError};

use crate::common::*;

/// An expired proposal is reported once, then gone.
#[tokio::test]
async fn test_expired_proposal_then_not_found() {
    let relay = MockRelay::new();
    let dapp = peer(&relay, "dapp").await;
    let mut wallet = peer(&relay, "wallet").await;
    let (_, proposal) = propose(&dapp, &mut wallet).await;
    assert_eq!(proposal.expiry_timestamp, T0 + 300);

    // At the expiry second the proposal is still good.
    wallet.clock.set(T0 + 300);
    assert_eq!(wallet.client.get_pending_proposals().unwrap().len(), 1);

    wallet.clock.advance(1);
    let key = proposal.proposer.public_key;
    let first = wallet
        .client
        .approve(&key, eip155_granted(&["eip155:1"]), None, None)
        .await;
    assert!(matches!(first, Err(SignError::ProposalExpired)));

    let second = wallet
        .client
        .approve(&key, eip155_granted(&["eip155:1"]), None, None)
        .await;
    assert!(matches!(second, Err(SignError::ProposalNotFound)));
    assert!(wallet.client.get_sessions().unwrap().is_empty());
}

/// Racing approvals settle exactly one session.
#[tokio::test]
async fn test_concurrent_approvals_settle_once() {
    let relay = MockRelay::new();
    let mut dapp = peer(&relay, "dapp").await;
    let mut wallet = peer(&relay, "wallet").await;
    let (_, proposal) = propose(&dapp, &mut wallet).await;
    let key = proposal.proposer.public_key;

    let (a, b) = tokio::join!(
        wallet
            .client
            .approve(&key, eip155_granted(&["eip155:1"]), None, None),
        wallet
            .client
            .approve(&key, eip155_granted(&["eip155:1"]), None, None),
    );
    let settled = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(settled, 1);
    assert!([a, b]
        .into_iter()
        .any(|r| matches!(r, Err(SignError::ProposalNotFound))));

    next_event(&mut dapp.events, |event| match event {
        SignEvent::SessionSettled { .. } => Some(()),
        _ => None,
    })
    .await;
    assert_eq!(wallet.client.get_sessions().unwrap().len(), 1);
    assert_eq!(dapp.client.get_sessions().unwrap().len(), 1);

    // Nothing is left to approve.
    let again = wallet
        .client
        .approve(&key, eip155_granted(&["eip155:1"]), None, None)
        .await;
    assert!(matches!(again, Err(SignError::ProposalNotFound)));
}

/// Approving with nothing granted fails before touching the socket.
#[tokio::test]
async fn test_empty_namespaces_make_no_transport_calls() {
    let relay = MockRelay::new();
    let dapp = peer(&relay, "dapp").await;
    let mut wallet = peer(&relay, "wallet").await;
    let (_, proposal) = propose(&dapp, &mut wallet).await;

    let writes = wallet.transport.writes();
    let publishes = relay.call_count("irn_publish");
    let result = wallet
        .client
        .approve(
            &proposal.proposer.public_key,
            SessionNamespaces::new(),
            None,
            None,
        )
        .await;
    assert!(matches!(
        result,
        Err(SignError::EmptySessionNamespacesForbidden)
    ));
    assert_eq!(wallet.transport.writes(), writes);
    assert_eq!(relay.call_count("irn_publish"), publishes);

    // The proposal is untouched and can still be answered.
    assert_eq!(wallet.client.get_pending_proposals().unwrap().len(), 1);
}

/// Approving offline keeps the proposal for a later attempt.
#[tokio::test]
async fn test_offline_approval_is_refused() {
    let relay = MockRelay::new();
    let dapp = peer(&relay, "dapp").await;
    let mut wallet = peer(&relay, "wallet").await;
    let (_, proposal) = propose(&dapp, &mut wallet).await;

    wallet.client.disconnect_relay().unwrap();
    let result = wallet
        .client
        .approve(
            &proposal.proposer.public_key,
            eip155_granted(&["eip155:1"]),
            None,
            None,
        )
        .await;
    assert!(matches!(result, Err(SignError::NetworkNotConnected)));
    assert_eq!(wallet.client.get_pending_proposals().unwrap().len(), 1);
}

/// Pairing and session topics are derived, never exchanged.
#[tokio::test]
async fn test_topics_are_derived_from_keys() {
    let relay = MockRelay::new();
    let mut dapp = peer(&relay, "dapp").await;
    let mut wallet = peer(&relay, "wallet").await;

    let connect = dapp
        .client
        .connect(eip155_required(), Default::default(), None)
        .await
        .unwrap();
    assert_eq!(connect.uri.topic, sha256_hex(connect.uri.sym_key.as_bytes()));
    assert_eq!(connect.uri.topic, connect.pairing_topic);

    wallet.client.pair(&connect.uri.to_string()).await.unwrap();
    let proposal = next_event(&mut wallet.events, |event| match event {
        SignEvent::SessionProposal { proposal, .. } => Some(proposal),
        _ => None,
    })
    .await;
    let wallet_session = wallet
        .client
        .approve(
            &proposal.proposer.public_key,
            eip155_granted(&["eip155:1"]),
            None,
            None,
        )
        .await
        .unwrap();
    let dapp_session = next_event(&mut dapp.events, |event| match event {
        SignEvent::SessionSettled { session } => Some(session),
        _ => None,
    })
    .await;

    assert_eq!(wallet_session.topic, dapp_session.topic);
    assert_ne!(wallet_session.topic, connect.pairing_topic);
    assert_eq!(wallet_session.topic.len(), 64);
    assert_eq!(
        dapp_session.self_participant.public_key,
        connect.proposer_public_key
    );
    assert_eq!(
        wallet_session.peer_participant.public_key,
        connect.proposer_public_key
    );
}

/// Expired sessions are swept on both sides with one event each.
#[tokio::test]
async fn test_sweep_removes_expired_session() {
    let relay = MockRelay::new();
    let mut dapp = peer(&relay, "dapp").await;
    let mut wallet = peer(&relay, "wallet").await;
    let (session, _) = settle(&mut dapp, &mut wallet).await;

    wallet.clock.set(session.expiry);
    assert_eq!(wallet.client.sweep_expired().await.unwrap().sessions, 0);

    wallet.clock.advance(1);
    let report = wallet.client.sweep_expired().await.unwrap();
    assert_eq!(report.sessions, 1);
    let topic = next_event(&mut wallet.events, |event| match event {
        SignEvent::SessionExpired { topic } => Some(topic),
        _ => None,
    })
    .await;
    assert_eq!(topic, session.topic);
    assert!(wallet.client.get_sessions().unwrap().is_empty());
}
