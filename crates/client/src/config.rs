// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

/// Configuration for the realtime event client.
///
/// Derives [`clap::Args`] so a host binary can flatten it into its own CLI.
#[derive(Debug, Clone, clap::Args)]
pub struct RealtimeConfig {
    /// Backend WebSocket endpoint. `http(s)://` is rewritten to `ws(s)://`.
    #[arg(long, default_value = "ws://127.0.0.1:8080/ws", env = "CLUBWIRE_WS_URL")]
    pub ws_url: String,

    /// Upper bound on a single connect handshake, in milliseconds.
    #[arg(long, default_value_t = 10000, env = "CLUBWIRE_CONNECT_TIMEOUT_MS")]
    pub connect_timeout_ms: u64,

    /// Retry with exponential backoff after an unexpected close.
    #[arg(long, env = "CLUBWIRE_RECONNECT")]
    pub reconnect: bool,

    /// Initial reconnect delay in milliseconds.
    #[arg(long, default_value_t = 100, env = "CLUBWIRE_RECONNECT_INITIAL_MS")]
    pub reconnect_initial_ms: u64,

    /// Reconnect delay ceiling in milliseconds.
    #[arg(long, default_value_t = 5000, env = "CLUBWIRE_RECONNECT_MAX_MS")]
    pub reconnect_max_ms: u64,
}

impl RealtimeConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// First reconnect delay. Never zero, so doubling always grows it.
    pub fn reconnect_initial(&self) -> Duration {
        Duration::from_millis(self.reconnect_initial_ms.max(1))
    }

    /// Backoff ceiling, never below the initial delay.
    pub fn reconnect_max(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_ms).max(self.reconnect_initial())
    }

    /// Socket URL for the given bearer token.
    pub fn socket_url(&self, token: &str) -> String {
        build_socket_url(&self.ws_url, token)
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            ws_url: "ws://127.0.0.1:8080/ws".to_owned(),
            connect_timeout_ms: 10000,
            reconnect: false,
            reconnect_initial_ms: 100,
            reconnect_max_ms: 5000,
        }
    }
}

/// Build the realtime socket URL from a base endpoint and a bearer token.
///
/// The token travels percent-encoded as the `token` query parameter; it is
/// never re-sent per frame.
pub fn build_socket_url(base_url: &str, token: &str) -> String {
    // Convert http(s):// to ws(s)://
    let ws_base = if let Some(rest) = base_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base_url.to_owned()
    };

    let sep = if ws_base.contains('?') { '&' } else { '?' };
    format!("{ws_base}{sep}token={}", urlencoding::encode(token))
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
