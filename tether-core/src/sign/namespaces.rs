// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Namespaces
//!
//! Chain identifiers (CAIP-2), accounts (CAIP-10), proposal and session
//! namespaces, and the validation rules that reconcile them.
//!
//! Identifiers are parsed once at the wire boundary; everything past
//! deserialization holds already-valid values.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::reason::Reason;

/// Identifier parsing error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NamespaceError {
    #[error("Invalid namespace: {0}")]
    InvalidNamespace(String),
    #[error("Invalid chain id: {0}")]
    InvalidChain(String),
    #[error("Invalid account: {0}")]
    InvalidAccount(String),
}

fn is_valid_namespace(ns: &str) -> bool {
    (3..=8).contains(&ns.len())
        && ns
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

fn is_valid_reference(reference: &str) -> bool {
    (1..=32).contains(&reference.len())
        && reference
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn is_valid_address(address: &str) -> bool {
    (1..=128).contains(&address.len())
        && address
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '%'))
}

/// CAIP-2 chain id, e.g. `eip155:1`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Blockchain {
    namespace: String,
    reference: String,
}

impl Blockchain {
    pub fn new(namespace: &str, reference: &str) -> Result<Self, NamespaceError> {
        format!("{}:{}", namespace, reference).parse()
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }
}

impl FromStr for Blockchain {
    type Err = NamespaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, reference) = s
            .split_once(':')
            .ok_or_else(|| NamespaceError::InvalidChain(s.to_string()))?;
        if !is_valid_namespace(namespace) || !is_valid_reference(reference) {
            return Err(NamespaceError::InvalidChain(s.to_string()));
        }
        Ok(Blockchain {
            namespace: namespace.to_string(),
            reference: reference.to_string(),
        })
    }
}

impl TryFrom<String> for Blockchain {
    type Error = NamespaceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Blockchain> for String {
    fn from(chain: Blockchain) -> Self {
        chain.to_string()
    }
}

impl fmt::Display for Blockchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.reference)
    }
}

impl fmt::Debug for Blockchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Blockchain({})", self)
    }
}

/// CAIP-10 account id, e.g. `eip155:1:0xab16...`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Account {
    chain: Blockchain,
    address: String,
}

impl Account {
    pub fn new(chain: Blockchain, address: &str) -> Result<Self, NamespaceError> {
        if !is_valid_address(address) {
            return Err(NamespaceError::InvalidAccount(format!("{}:{}", chain, address)));
        }
        Ok(Account {
            chain,
            address: address.to_string(),
        })
    }

    pub fn blockchain(&self) -> &Blockchain {
        &self.chain
    }

    pub fn namespace(&self) -> &str {
        self.chain.namespace()
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

impl FromStr for Account {
    type Err = NamespaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        let (Some(ns), Some(reference), Some(address)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(NamespaceError::InvalidAccount(s.to_string()));
        };
        let chain = Blockchain::new(ns, reference)
            .map_err(|_| NamespaceError::InvalidAccount(s.to_string()))?;
        Account::new(chain, address)
    }
}

impl TryFrom<String> for Account {
    type Error = NamespaceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Account> for String {
    fn from(account: Account) -> Self {
        account.to_string()
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chain, self.address)
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Account({})", self)
    }
}

/// Namespace requested by a proposer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalNamespace {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chains: Option<BTreeSet<Blockchain>>,
    #[serde(default)]
    pub methods: BTreeSet<String>,
    #[serde(default)]
    pub events: BTreeSet<String>,
}

impl ProposalNamespace {
    pub fn new<C, M, E>(chains: C, methods: M, events: E) -> Self
    where
        C: IntoIterator<Item = Blockchain>,
        M: IntoIterator<Item = String>,
        E: IntoIterator<Item = String>,
    {
        ProposalNamespace {
            chains: Some(chains.into_iter().collect()),
            methods: methods.into_iter().collect(),
            events: events.into_iter().collect(),
        }
    }
}

/// Namespace granted by the responder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionNamespace {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chains: Option<BTreeSet<Blockchain>>,
    #[serde(default)]
    pub accounts: BTreeSet<Account>,
    #[serde(default)]
    pub methods: BTreeSet<String>,
    #[serde(default)]
    pub events: BTreeSet<String>,
}

impl SessionNamespace {
    pub fn new<A, M, E>(accounts: A, methods: M, events: E) -> Self
    where
        A: IntoIterator<Item = Account>,
        M: IntoIterator<Item = String>,
        E: IntoIterator<Item = String>,
    {
        SessionNamespace {
            chains: None,
            accounts: accounts.into_iter().collect(),
            methods: methods.into_iter().collect(),
            events: events.into_iter().collect(),
        }
    }

    /// Explicit chains plus every chain an account lives on.
    pub fn all_chains(&self) -> BTreeSet<Blockchain> {
        let mut chains = self.chains.clone().unwrap_or_default();
        chains.extend(self.accounts.iter().map(|a| a.blockchain().clone()));
        chains
    }
}

pub type ProposalNamespaces = BTreeMap<String, ProposalNamespace>;
pub type SessionNamespaces = BTreeMap<String, SessionNamespace>;

/// Splits a namespace key into its namespace and, for CAIP-2 keys, its chain.
fn parse_key(key: &str) -> Option<(&str, Option<Blockchain>)> {
    if key.contains(':') {
        let chain: Blockchain = key.parse().ok()?;
        let ns = key.split(':').next()?;
        Some((ns, Some(chain)))
    } else if is_valid_namespace(key) {
        Some((key, None))
    } else {
        None
    }
}

/// Shape rules for proposer namespaces (required or optional).
///
/// Plain keys need a non-empty chain list in that namespace; CAIP-2 keys
/// imply their chain and must not list others. Every namespace must name
/// at least one method.
pub fn validate_proposal_namespaces(namespaces: &ProposalNamespaces) -> Result<(), Reason> {
    for (key, namespace) in namespaces {
        let (ns, key_chain) = parse_key(key).ok_or(Reason::UnsupportedNamespaceKey)?;
        match (key_chain, &namespace.chains) {
            (Some(chain), Some(chains)) => {
                if chains.iter().any(|c| *c != chain) {
                    return Err(Reason::UnsupportedChains);
                }
            }
            (Some(_), None) => {}
            (None, Some(chains)) => {
                if chains.is_empty() || chains.iter().any(|c| c.namespace() != ns) {
                    return Err(Reason::UnsupportedChains);
                }
            }
            (None, None) => return Err(Reason::UnsupportedChains),
        }
        if namespace.methods.is_empty() {
            return Err(Reason::UnsupportedMethods);
        }
    }
    Ok(())
}

/// Well-formedness of responder namespaces on their own.
pub fn validate_session_namespaces(namespaces: &SessionNamespaces) -> Result<(), Reason> {
    for (key, namespace) in namespaces {
        let (ns, key_chain) = parse_key(key).ok_or(Reason::UnsupportedNamespaceKey)?;
        if namespace.accounts.is_empty() {
            return Err(Reason::UnsupportedAccounts);
        }
        for account in &namespace.accounts {
            let on_key_chain = match &key_chain {
                Some(chain) => account.blockchain() == chain,
                None => account.namespace() == ns,
            };
            if !on_key_chain {
                return Err(Reason::UnsupportedAccounts);
            }
        }
        if let Some(chains) = &namespace.chains {
            if chains.iter().any(|c| c.namespace() != ns) {
                return Err(Reason::UnsupportedChains);
            }
        }
    }
    Ok(())
}

/// Checks that `session` grants everything `required` asks for.
///
/// Each required chain must be granted with at least one account on it, and
/// required methods and events must be subsets of the granted ones. Extra
/// namespaces, chains, methods and events are allowed.
pub fn validate_conformance(
    required: &ProposalNamespaces,
    session: &SessionNamespaces,
) -> Result<(), Reason> {
    for (key, proposal) in required {
        let (ns, key_chain) = parse_key(key).ok_or(Reason::UnsupportedNamespaceKey)?;
        let granted = session
            .get(key)
            .or_else(|| session.get(ns))
            .ok_or(Reason::UnsupportedNamespaceKey)?;

        let required_chains: BTreeSet<Blockchain> = match key_chain {
            Some(chain) => std::iter::once(chain).collect(),
            None => proposal.chains.clone().unwrap_or_default(),
        };
        let granted_chains = granted.all_chains();

        for chain in &required_chains {
            if !granted_chains.contains(chain) {
                return Err(Reason::UnsupportedChains);
            }
            if !granted.accounts.iter().any(|a| a.blockchain() == chain) {
                return Err(Reason::UnsupportedAccounts);
            }
        }
        if !proposal.methods.is_subset(&granted.methods) {
            return Err(Reason::UnsupportedMethods);
        }
        if !proposal.events.is_subset(&granted.events) {
            return Err(Reason::UnsupportedEvents);
        }
    }
    Ok(())
}

/// The namespace entry covering `chain`, preferring an exact CAIP-2 key.
pub fn namespace_for_chain<'a>(
    namespaces: &'a SessionNamespaces,
    chain: &Blockchain,
) -> Option<&'a SessionNamespace> {
    namespaces
        .get(&chain.to_string())
        .or_else(|| namespaces.get(chain.namespace()))
        .filter(|ns| ns.all_chains().contains(chain))
}
