// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Proptest Strategies
//!
//! Reusable proptest strategies for namespace properties.

use std::collections::BTreeSet;

use proptest::prelude::*;
use tether_core::{Account, Blockchain, ProposalNamespace, SessionNamespace};

use super::ADDRESS;

/// eip155 chain references.
pub fn chain_strategy() -> impl Strategy<Value = Blockchain> {
    (1u32..200).prop_map(|reference| Blockchain::new("eip155", &reference.to_string()).unwrap())
}

pub fn chains_strategy() -> impl Strategy<Value = BTreeSet<Blockchain>> {
    prop::collection::btree_set(chain_strategy(), 1..5)
}

pub fn method_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec![
        "eth_sendTransaction",
        "eth_signTransaction",
        "eth_sign",
        "personal_sign",
        "eth_signTypedData",
        "wallet_switchEthereumChain",
    ])
    .prop_map(str::to_string)
}

pub fn event_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["chainChanged", "accountsChanged", "message", "connect"])
        .prop_map(str::to_string)
}

/// A well-formed `eip155` proposal namespace.
pub fn proposal_namespace_strategy() -> impl Strategy<Value = ProposalNamespace> {
    (
        chains_strategy(),
        prop::collection::btree_set(method_strategy(), 1..4),
        prop::collection::btree_set(event_strategy(), 0..3),
    )
        .prop_map(|(chains, methods, events)| ProposalNamespace::new(chains, methods, events))
}

/// The minimal session namespace satisfying `proposal`: one account per
/// chain, exactly the requested methods and events.
pub fn exact_grant(proposal: &ProposalNamespace) -> SessionNamespace {
    let accounts: Vec<Account> = proposal
        .chains
        .iter()
        .flatten()
        .map(|chain| Account::new(chain.clone(), ADDRESS).unwrap())
        .collect();
    SessionNamespace::new(
        accounts,
        proposal.methods.iter().cloned(),
        proposal.events.iter().cloned(),
    )
}
