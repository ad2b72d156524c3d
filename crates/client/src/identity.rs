// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local identity lookup from a bearer token.
//!
//! The backend issues HS256 JWTs whose `sub` claim is the user id.  The client
//! only needs that id to recognise its own posts, so the payload segment is
//! decoded without verifying the signature.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(default)]
    sub: Option<Value>,
}

/// Return the `sub` claim of a JWT, or `None` if the token is not a readable JWT.
pub fn token_subject(token: &str) -> Option<String> {
    let mut parts = token.split('.');
    let (_header, payload) = (parts.next()?, parts.next()?);

    // Some issuers pad the segments; URL_SAFE_NO_PAD rejects trailing '='.
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: Claims = serde_json::from_slice(&bytes).ok()?;

    match claims.sub? {
        Value::String(s) if !s.is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
#[path = "identity_tests.rs"]
mod tests;
