// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

/// Failure codes for the realtime client.
///
/// None of these are fatal: the client degrades to "no live updates".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientError {
    /// No open socket; the outbound frame was dropped.
    NotConnected,
    /// A frame could not be encoded or decoded as an envelope.
    MalformedFrame,
    /// The socket failed to open, errored, or dropped.
    Transport,
    /// The connect handshake exceeded the configured timeout.
    ConnectTimeout,
}

impl ClientError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotConnected => "NOT_CONNECTED",
            Self::MalformedFrame => "MALFORMED_FRAME",
            Self::Transport => "TRANSPORT",
            Self::ConnectTimeout => "CONNECT_TIMEOUT",
        }
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for ClientError {}
