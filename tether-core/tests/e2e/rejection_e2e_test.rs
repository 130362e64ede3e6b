// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! A wallet turning a proposal down.

use tether_core::api::SignEvent;
use tether_core::network::MockRelay;
use tether_core::{Reason, SignError};

use crate::common::*;

#[tokio::test]
async fn test_user_rejection_reaches_dapp() {
    let relay = MockRelay::new();
    let mut dapp = peer(&relay, "dapp").await;
    let mut wallet = peer(&relay, "wallet").await;
    let (connect, proposal) = propose(&dapp, &mut wallet).await;

    wallet
        .client
        .reject(&proposal.proposer.public_key, Reason::UserRejected)
        .await
        .unwrap();
    assert!(wallet.client.get_pending_proposals().unwrap().is_empty());

    let (pairing_topic, proposer, reason) = next_event(&mut dapp.events, |event| match event {
        SignEvent::SessionRejected {
            pairing_topic,
            proposer_public_key,
            reason,
        } => Some((pairing_topic, proposer_public_key, reason)),
        _ => None,
    })
    .await;
    assert_eq!(pairing_topic, connect.pairing_topic);
    assert_eq!(proposer, connect.proposer_public_key);
    assert_eq!(reason.code, 5000);
    assert_eq!(reason.reason(), Some(Reason::UserRejected));

    assert!(dapp.client.get_sessions().unwrap().is_empty());
    assert!(wallet.client.get_sessions().unwrap().is_empty());

    // The pairing survives for another proposal.
    assert_eq!(wallet.client.get_pairings().unwrap().len(), 1);

    // A second answer to the same proposal is refused.
    let again = wallet
        .client
        .reject(&proposal.proposer.public_key, Reason::UserRejected)
        .await;
    assert!(matches!(again, Err(SignError::ProposalNotFound)));
}

#[tokio::test]
async fn test_approval_missing_required_chain_is_refused() {
    let relay = MockRelay::new();
    let mut dapp = peer(&relay, "dapp").await;
    let mut wallet = peer(&relay, "wallet").await;
    let (_, proposal) = propose(&dapp, &mut wallet).await;

    let result = wallet
        .client
        .approve(
            &proposal.proposer.public_key,
            eip155_granted(&["eip155:137"]),
            None,
            None,
        )
        .await;
    assert!(matches!(
        result,
        Err(SignError::UnsupportedNamespace(Reason::UnsupportedChains))
    ));

    let reason = next_event(&mut dapp.events, |event| match event {
        SignEvent::SessionRejected { reason, .. } => Some(reason),
        _ => None,
    })
    .await;
    assert_eq!(reason.reason(), Some(Reason::UnsupportedChains));
    assert!(wallet.client.get_sessions().unwrap().is_empty());
}

#[tokio::test]
async fn test_second_proposal_on_same_pairing() {
    let relay = MockRelay::new();
    let mut dapp = peer(&relay, "dapp").await;
    let mut wallet = peer(&relay, "wallet").await;
    let (connect, proposal) = propose(&dapp, &mut wallet).await;
    wallet
        .client
        .reject(&proposal.proposer.public_key, Reason::UserRejected)
        .await
        .unwrap();

    let proposer = dapp
        .client
        .connect_on_pairing(
            &connect.pairing_topic,
            eip155_required(),
            Default::default(),
            None,
        )
        .await
        .unwrap();
    let second = next_event(&mut wallet.events, |event| match event {
        SignEvent::SessionProposal { proposal, .. } => Some(proposal),
        _ => None,
    })
    .await;
    assert_eq!(second.proposer.public_key, proposer);
    assert_ne!(proposer, connect.proposer_public_key);
}
