// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session collaborators consumed by the realtime client.
//!
//! The client never snapshots session values.  It holds these seams as trait
//! objects and asks them for the current token, route, and notifier at the
//! moment a frame is dispatched.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::identity::token_subject;

/// Source of the current bearer token.
pub trait AuthTokenSource: Send + Sync {
    /// Current token, if signed in.
    fn token(&self) -> Option<String>;

    /// Change notifications. Every `set`/`clear` wakes the receiver, including
    /// re-applying an unchanged token.
    fn watch(&self) -> watch::Receiver<Option<String>>;
}

/// Source of the route the user is currently viewing.
pub trait NavigationLocationSource: Send + Sync {
    fn current(&self) -> Route;
}

/// Human-readable notification surface (toasts in the app).
pub trait Notifier: Send + Sync {
    fn success(&self, text: &str);
    fn error(&self, text: &str);
}

/// Navigation location as a list of path segments.
///
/// Route-group segments written in parentheses, e.g. `(tabs)`, only organise
/// screens and are skipped when matching.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Route {
    segments: Vec<String>,
}

impl Route {
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { segments: segments.into_iter().map(Into::into).collect() }
    }

    /// Parse a slash-separated path such as `/(tabs)/myclubs/c1/posts`.
    pub fn parse(path: &str) -> Self {
        Self::from_segments(path.split('/').filter(|s| !s.is_empty()))
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Whether this is the posts screen of `club_id` (`myclubs/<club_id>/posts`).
    pub fn is_club_posts(&self, club_id: &str) -> bool {
        let visible: Vec<&str> = self
            .segments
            .iter()
            .map(String::as_str)
            .filter(|s| !(s.starts_with('(') && s.ends_with(')')))
            .collect();
        matches!(visible.as_slice(), ["myclubs", id, "posts"] if *id == club_id)
    }
}

/// In-memory token holder.
///
/// Stands in for the platform key-value store: `set` and `clear` map to its
/// set and delete, and every change is published to watchers.
pub struct TokenStore {
    tx: watch::Sender<Option<String>>,
}

impl TokenStore {
    pub fn new(initial: Option<String>) -> Self {
        let (tx, _) = watch::channel(normalize(initial));
        Self { tx }
    }

    pub fn set(&self, token: impl Into<String>) {
        self.tx.send_replace(normalize(Some(token.into())));
    }

    pub fn clear(&self) {
        self.tx.send_replace(None);
    }
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new(None)
    }
}

impl AuthTokenSource for TokenStore {
    fn token(&self) -> Option<String> {
        self.tx.borrow().clone()
    }

    fn watch(&self) -> watch::Receiver<Option<String>> {
        self.tx.subscribe()
    }
}

/// Mutable current-route holder, updated by the navigation layer.
#[derive(Default)]
pub struct LocationCell {
    route: RwLock<Route>,
}

impl LocationCell {
    pub fn new(route: Route) -> Self {
        Self { route: RwLock::new(route) }
    }

    pub fn set(&self, route: Route) {
        *self.route.write() = route;
    }
}

impl NavigationLocationSource for LocationCell {
    fn current(&self) -> Route {
        self.route.read().clone()
    }
}

/// Notifier that writes toasts to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn success(&self, text: &str) {
        info!(toast = %text, "notification");
    }

    fn error(&self, text: &str) {
        warn!(toast = %text, "notification");
    }
}

/// The three collaborators, resolved live at dispatch time.
#[derive(Clone)]
pub struct SessionContext {
    pub tokens: Arc<dyn AuthTokenSource>,
    pub location: Arc<dyn NavigationLocationSource>,
    pub notifier: Arc<dyn Notifier>,
}

impl SessionContext {
    pub fn new(
        tokens: Arc<dyn AuthTokenSource>,
        location: Arc<dyn NavigationLocationSource>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self { tokens, location, notifier }
    }

    /// Current token; an empty string counts as signed out.
    pub fn token(&self) -> Option<String> {
        normalize(self.tokens.token())
    }

    /// User id embedded in the current token.
    pub fn identity(&self) -> Option<String> {
        self.token().as_deref().and_then(token_subject)
    }
}

/// Treat an empty token as no token.
pub(crate) fn normalize(token: Option<String>) -> Option<String> {
    token.filter(|t| !t.is_empty())
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
