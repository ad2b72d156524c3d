// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cross-cutting notification policy for global events.
//!
//! Runs before listener dispatch and only decides whether a toast is shown.
//! Listeners receive the payload whatever the decision.

use std::fmt;

use serde::Deserialize;

use crate::envelope::Envelope;
use crate::session::Route;

/// A post was created in a club the viewer belongs to.
pub const NEW_POST: &str = "new_post";

/// Someone joined a club the viewer belongs to.
pub const USER_JOINED_CLUB: &str = "user_joined_club";

/// Toast shown when the socket fails.
pub const CONNECT_ERROR_TEXT: &str = "Cannot connect to server notifications.";

/// Whether `event` has global policy attached.
pub fn is_global(event: &str) -> bool {
    matches!(event, NEW_POST | USER_JOINED_CLUB)
}

/// Outcome of the policy for one envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Not a global event.
    Pass,
    /// Show a success toast with this text.
    Toast(String),
    /// Global event whose toast is withheld.
    Suppress(Suppression),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suppression {
    /// The viewer wrote the post.
    OwnPost,
    /// The viewer is already on the club's posts screen.
    ViewingClub,
    /// The payload lacks the fields needed to word the toast.
    IncompletePayload,
}

impl Suppression {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OwnPost => "own_post",
            Self::ViewingClub => "viewing_club",
            Self::IncompletePayload => "incomplete_payload",
        }
    }
}

impl fmt::Display for Suppression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Default, Deserialize)]
struct NewPost {
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    author_username: Option<String>,
    #[serde(default)]
    club_id: Option<String>,
    #[serde(default)]
    club_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct MemberJoined {
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    club_id: Option<String>,
    #[serde(default)]
    club_name: Option<String>,
}

/// Evaluate the policy for `envelope`.
///
/// `viewer` is the user id from the current token and `route` the current
/// navigation location, both sampled by the caller at dispatch time.
pub fn evaluate(envelope: &Envelope, viewer: Option<&str>, route: &Route) -> Decision {
    match envelope.event.as_str() {
        NEW_POST => {
            let post = NewPost::deserialize(&envelope.payload).unwrap_or_default();
            new_post(&post, viewer, route)
        }
        USER_JOINED_CLUB => {
            let joined = MemberJoined::deserialize(&envelope.payload).unwrap_or_default();
            member_joined(&joined)
        }
        _ => Decision::Pass,
    }
}

fn new_post(post: &NewPost, viewer: Option<&str>, route: &Route) -> Decision {
    if let (Some(author), Some(viewer)) = (post.user_id.as_deref(), viewer) {
        if author == viewer {
            return Decision::Suppress(Suppression::OwnPost);
        }
    }
    if let Some(club_id) = post.club_id.as_deref() {
        if route.is_club_posts(club_id) {
            return Decision::Suppress(Suppression::ViewingClub);
        }
    }

    let who = post.author_username.as_deref().or(post.user_id.as_deref());
    let club = post.club_name.as_deref().or(post.club_id.as_deref());
    match (who, club) {
        (Some(who), Some(club)) => Decision::Toast(format!("{who} posted in {club}")),
        _ => Decision::Suppress(Suppression::IncompletePayload),
    }
}

fn member_joined(joined: &MemberJoined) -> Decision {
    let who = joined.username.as_deref().or(joined.user_id.as_deref());
    let club = joined.club_name.as_deref().or(joined.club_id.as_deref());
    match (who, club) {
        (Some(who), Some(club)) => Decision::Toast(format!("{who} joined {club}")),
        _ => Decision::Suppress(Suppression::IncompletePayload),
    }
}

#[cfg(test)]
#[path = "policy_tests.rs"]
mod tests;
