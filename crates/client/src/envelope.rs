// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire envelope exchanged over the realtime socket.
//!
//! Every text frame in either direction is a JSON object of the form
//! `{"event": "<name>", "payload": <any>}`.  The payload shape depends on the
//! event name and is opaque at this layer.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single realtime event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    pub fn new(event: impl Into<String>, payload: Value) -> Self {
        Self { event: event.into(), payload }
    }

    /// Decode an inbound text frame.
    ///
    /// Only a JSON object with a non-empty string `event` is accepted; arrays
    /// are rejected even though serde would map them onto the struct. A
    /// missing `payload` decodes as `null`.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(text)?;
        if !value.is_object() {
            return Err(<serde_json::Error as serde::de::Error>::custom("frame is not an object"));
        }
        let envelope = Self::deserialize(value)?;
        if envelope.event.is_empty() {
            return Err(<serde_json::Error as serde::de::Error>::custom("empty event name"));
        }
        Ok(envelope)
    }

    /// Encode as an outbound text frame.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;
