// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! X25519 Key Agreement
//!
//! Keypairs and agreement keys used to establish per-session topics.

use std::fmt;
use std::str::FromStr;

use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey as DalekPublicKey, StaticSecret};

use super::encryption::{EncryptionError, SymmetricKey};
use super::kdf::{sha256_hex, HKDF};

/// X25519 public key, carried on the wire as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PublicKey([u8; 32]);

impl PublicKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        PublicKey(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Topic addressing messages sealed to this key (type 1 envelopes).
    pub fn derive_topic(&self) -> String {
        sha256_hex(&self.0)
    }
}

impl FromStr for PublicKey {
    type Err = EncryptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = hex::decode(s).map_err(|e| EncryptionError::InvalidKey(e.to_string()))?;
        let bytes: [u8; 32] = raw
            .try_into()
            .map_err(|_| EncryptionError::InvalidKey("public key must be 32 bytes".into()))?;
        Ok(PublicKey(bytes))
    }
}

impl TryFrom<String> for PublicKey {
    type Error = EncryptionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PublicKey> for String {
    fn from(key: PublicKey) -> Self {
        key.to_hex()
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

/// X25519 keypair.
pub struct KeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl KeyPair {
    /// Generates a new random X25519 keypair.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey(*DalekPublicKey::from(&secret).as_bytes());
        KeyPair { secret, public }
    }

    /// Restores a keypair from its secret bytes.
    pub fn from_secret_bytes(bytes: [u8; 32]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = PublicKey(*DalekPublicKey::from(&secret).as_bytes());
        KeyPair { secret, public }
    }

    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    /// Returns the secret key bytes (for the keychain).
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    /// X25519 with `peer`, then HKDF-SHA256 without salt or info.
    pub fn agree(&self, peer: &PublicKey) -> AgreementKeys {
        let shared = self.secret.diffie_hellman(&DalekPublicKey::from(peer.0));
        let sym = HKDF::derive_key(None, shared.as_bytes(), &[]);
        AgreementKeys {
            shared_key: SymmetricKey::from_bytes(sym),
            public_key: self.public,
        }
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Result of a key agreement: the derived sym key plus our public half.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgreementKeys {
    pub shared_key: SymmetricKey,
    pub public_key: PublicKey,
}

impl AgreementKeys {
    /// Both peers compute the same topic without exchanging it.
    pub fn derive_topic(&self) -> String {
        self.shared_key.derive_topic()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agreement_is_symmetric() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();

        let a = alice.agree(&bob.public_key());
        let b = bob.agree(&alice.public_key());

        assert_eq!(a.shared_key, b.shared_key);
        assert_eq!(a.derive_topic(), b.derive_topic());
        assert_eq!(a.derive_topic().len(), 64);
    }

    #[test]
    fn test_public_key_serde_hex() {
        let key = KeyPair::generate().public_key();
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, format!("\"{}\"", key.to_hex()));
        let back: PublicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
        assert!(serde_json::from_str::<PublicKey>("\"zz\"").is_err());
    }

    #[test]
    fn test_restore_from_secret() {
        let pair = KeyPair::generate();
        let restored = KeyPair::from_secret_bytes(pair.secret_bytes());
        assert_eq!(restored.public_key(), pair.public_key());
    }
}
