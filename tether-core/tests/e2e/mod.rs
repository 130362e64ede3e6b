// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! End-to-End Tests
//!
//! A dApp and a wallet, each a full `SignClient`, talking through one
//! in-process relay.
//!
//! Run with: cargo test --test e2e

#[path = "../common/mod.rs"]
mod common;

mod rejection_e2e_test;
mod sign_e2e_test;
