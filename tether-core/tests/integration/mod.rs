// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Integration Tests for Tether Core
//!
//! Protocol guarantees checked through the public client: settlement,
//! relay behavior, duplicate delivery and persistence.
//!
//! Run with: cargo test --test integration

#[path = "../common/mod.rs"]
mod common;

mod duplicate_delivery_test;
mod relay_workflow_test;
mod settlement_workflow_test;
mod storage_workflow_test;
