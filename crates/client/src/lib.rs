// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clubwire: realtime club event client.
//!
//! Keeps one WebSocket per signed-in session, applies notification policy to
//! global events, and fans every envelope out to per-event listeners.

pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod identity;
pub mod policy;
pub mod registry;
pub mod session;
pub mod state;

pub use crate::client::RealtimeClient;
pub use crate::config::RealtimeConfig;
pub use crate::envelope::Envelope;
pub use crate::error::ClientError;
pub use crate::registry::{listener, Listener};
pub use crate::session::{
    AuthTokenSource, LocationCell, LogNotifier, NavigationLocationSource, Notifier, Route,
    SessionContext, TokenStore,
};
pub use crate::state::ConnectionState;
