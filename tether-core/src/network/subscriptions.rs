// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Topic → relay subscription id tracking.

use std::collections::HashMap;

use parking_lot::Mutex;

/// Subscriptions acknowledged by the relay. Reads are consistent snapshots.
#[derive(Debug, Default)]
pub struct SubscriptionsTracker {
    subscriptions: Mutex<HashMap<String, String>>,
}

impl SubscriptionsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, topic: &str, subscription_id: &str) {
        self.subscriptions
            .lock()
            .insert(topic.to_string(), subscription_id.to_string());
    }

    pub fn get(&self, topic: &str) -> Option<String> {
        self.subscriptions.lock().get(topic).cloned()
    }

    pub fn remove(&self, topic: &str) -> Option<String> {
        self.subscriptions.lock().remove(topic)
    }

    /// Sorted snapshot of tracked topics.
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.subscriptions.lock().keys().cloned().collect();
        topics.sort();
        topics
    }

    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.subscriptions.lock().contains_key(topic)
    }

    pub fn is_subscribed_to_any(&self) -> bool {
        !self.subscriptions.lock().is_empty()
    }
}
