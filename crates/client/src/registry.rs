// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

/// Shared callback receiving event payloads.
///
/// Identity is the `Arc` allocation: keep the handle returned by [`listener`]
/// to unregister it later.
pub type Listener = Arc<dyn Fn(&Value) + Send + Sync>;

/// Wrap a closure as a [`Listener`].
pub fn listener<F>(f: F) -> Listener
where
    F: Fn(&Value) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Event name → listeners in registration order.
///
/// Keys are created on first registration and kept after their last listener
/// is removed.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: HashMap<String, Vec<Listener>>,
}

impl ListenerRegistry {
    pub fn add(&mut self, event: &str, listener: Listener) {
        self.listeners.entry(event.to_owned()).or_default().push(listener);
    }

    /// Remove every registration of `listener` under `event`. Returns the
    /// number removed.
    pub fn remove(&mut self, event: &str, listener: &Listener) -> usize {
        let Some(list) = self.listeners.get_mut(event) else {
            return 0;
        };
        let before = list.len();
        list.retain(|l| !Arc::ptr_eq(l, listener));
        before - list.len()
    }

    /// Clone out the listeners for `event` so they can run without the
    /// registry borrowed.
    pub fn snapshot(&self, event: &str) -> Vec<Listener> {
        self.listeners.get(event).cloned().unwrap_or_default()
    }

    #[cfg(test)]
    fn count(&self, event: &str) -> usize {
        self.listeners.get(event).map_or(0, Vec::len)
    }

    #[cfg(test)]
    fn contains_key(&self, event: &str) -> bool {
        self.listeners.contains_key(event)
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
