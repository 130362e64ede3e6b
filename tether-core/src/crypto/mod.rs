// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

pub mod encryption;
pub mod kdf;
pub mod keys;

pub use encryption::{decrypt, encrypt, open, seal, EncryptionError, SymmetricKey, IV_SIZE};
pub use kdf::{sha256_hex, HKDF};
pub use keys::{AgreementKeys, KeyPair, PublicKey};
