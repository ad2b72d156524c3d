// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::registry::listener;
use crate::session::{LocationCell, Notifier, Route, TokenStore};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::json;

#[derive(Default)]
struct RecordingNotifier {
    success: Mutex<Vec<String>>,
    error: Mutex<Vec<String>>,
}

impl Notifier for RecordingNotifier {
    fn success(&self, text: &str) {
        self.success.lock().push(text.to_owned());
    }

    fn error(&self, text: &str) {
        self.error.lock().push(text.to_owned());
    }
}

struct Fixture {
    client: RealtimeClient,
    tokens: Arc<TokenStore>,
    location: Arc<LocationCell>,
    notifier: Arc<RecordingNotifier>,
}

fn jwt_for(sub: &str) -> String {
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"{sub}"}}"#));
    format!("eyJhbGciOiJIUzI1NiJ9.{payload}.sig")
}

fn fixture(token: Option<String>) -> Fixture {
    let tokens = Arc::new(TokenStore::new(token));
    let location = Arc::new(LocationCell::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let session = SessionContext::new(tokens.clone(), location.clone(), notifier.clone());
    let client = RealtimeClient::new(RealtimeConfig::default(), session);
    Fixture { client, tokens, location, notifier }
}

/// Install a tracked connection without a socket task behind it.
fn track(client: &RealtimeClient, generation: u64) -> mpsc::UnboundedReceiver<String> {
    let (outbound, rx) = mpsc::unbounded_channel();
    *client.inner.connection.lock() =
        Some(Connection { generation, outbound, cancel: CancellationToken::new() });
    rx
}

fn collect(client: &RealtimeClient, event: &str) -> (Listener, Arc<Mutex<Vec<Value>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let l = listener(move |payload| sink.lock().push(payload.clone()));
    client.on(event, Arc::clone(&l));
    (l, seen)
}

// ── send / connect without a socket ───────────────────────────────────

#[test]
fn send_while_disconnected_is_dropped() {
    let fx = fixture(None);
    let result = fx.client.send("typing", json!({"club_id": "c1"}));
    assert_eq!(result, Err(ClientError::NotConnected));
    assert_eq!(fx.client.state(), ConnectionState::Disconnected);
}

#[test]
fn send_while_connecting_is_dropped() {
    let fx = fixture(Some("T1".to_owned()));
    let mut rx = track(&fx.client, 1);
    fx.client.inner.set_state(ConnectionState::Connecting);

    assert_eq!(fx.client.send("typing", json!({})), Err(ClientError::NotConnected));
    assert_eq!(fx.client.state(), ConnectionState::Connecting);
    assert!(rx.try_recv().is_err());
}

#[test]
fn send_while_connected_enqueues_envelope() -> anyhow::Result<()> {
    let fx = fixture(Some("T1".to_owned()));
    let mut rx = track(&fx.client, 1);
    assert!(fx.client.inner.opened(1));

    fx.client.send("typing", json!({"club_id": "c1"}))?;
    let text = rx.try_recv()?;
    let parsed: Value = serde_json::from_str(&text)?;
    assert_eq!(parsed, json!({"event": "typing", "payload": {"club_id": "c1"}}));
    Ok(())
}

#[test]
fn connect_without_token_is_noop() {
    let fx = fixture(None);
    fx.client.connect();
    assert_eq!(fx.client.state(), ConnectionState::Disconnected);
    assert!(fx.client.inner.connection.lock().is_none());

    fx.tokens.set("");
    fx.client.connect();
    assert_eq!(fx.client.state(), ConnectionState::Disconnected);
}

#[test]
fn disconnect_is_idempotent() {
    let fx = fixture(Some("T1".to_owned()));
    fx.client.disconnect();
    fx.client.disconnect();
    assert_eq!(fx.client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn connect_is_idempotent() {
    // The spawned socket task cannot run before the next await point.
    let fx = fixture(Some("T1".to_owned()));
    fx.client.connect();
    let first = fx.client.inner.connection.lock().as_ref().map(|c| c.generation);
    fx.client.connect();
    let second = fx.client.inner.connection.lock().as_ref().map(|c| c.generation);
    assert_eq!(first, Some(1));
    assert_eq!(first, second);
    fx.client.disconnect();
}

// ── generation guard ──────────────────────────────────────────────────

#[test]
fn superseded_socket_cannot_touch_state() {
    let fx = fixture(Some("T1".to_owned()));
    let _rx = track(&fx.client, 2);
    fx.client.inner.set_state(ConnectionState::Connecting);

    assert!(!fx.client.inner.opened(1));
    assert_eq!(fx.client.state(), ConnectionState::Connecting);
    assert_eq!(fx.client.inner.lost(1, Some(ClientError::Transport), true), None);
    assert_eq!(fx.client.state(), ConnectionState::Connecting);
    assert!(fx.notifier.error.lock().is_empty());
}

#[test]
fn superseded_socket_frames_are_ignored() {
    let fx = fixture(Some("T1".to_owned()));
    let (_l, seen) = collect(&fx.client, "ping");
    let _rx = track(&fx.client, 5);

    fx.client.inner.handle_frame(4, r#"{"event":"ping","payload":1}"#);
    fx.client.inner.handle_frame(5, r#"{"event":"ping","payload":2}"#);
    assert_eq!(*seen.lock(), [json!(2)]);

    fx.client.disconnect();
    fx.client.inner.handle_frame(5, r#"{"event":"ping","payload":3}"#);
    assert_eq!(*seen.lock(), [json!(2)]);
}

// ── loss handling ─────────────────────────────────────────────────────

#[test]
fn failure_releases_connection_and_notifies() {
    let fx = fixture(Some("T1".to_owned()));
    let _rx = track(&fx.client, 1);
    fx.client.inner.opened(1);

    assert_eq!(fx.client.inner.lost(1, Some(ClientError::Transport), true), None);
    assert_eq!(fx.client.state(), ConnectionState::Disconnected);
    assert!(fx.client.inner.connection.lock().is_none());
    assert_eq!(*fx.notifier.error.lock(), [CONNECT_ERROR_TEXT]);
}

#[test]
fn server_close_is_quiet() {
    let fx = fixture(Some("T1".to_owned()));
    let _rx = track(&fx.client, 1);
    fx.client.inner.opened(1);

    assert_eq!(fx.client.inner.lost(1, None, false), None);
    assert_eq!(fx.client.state(), ConnectionState::Disconnected);
    assert!(fx.notifier.error.lock().is_empty());
}

#[test]
fn reconnect_keeps_slot_while_token_present() {
    let tokens = Arc::new(TokenStore::new(Some("T1".to_owned())));
    let session = SessionContext::new(
        tokens.clone(),
        Arc::new(LocationCell::default()),
        Arc::new(RecordingNotifier::default()),
    );
    let config = RealtimeConfig { reconnect: true, ..Default::default() };
    let client = RealtimeClient::new(config, session);
    let _rx = track(&client, 1);
    client.inner.opened(1);

    assert_eq!(client.inner.lost(1, None, false).as_deref(), Some("T1"));
    assert_eq!(client.state(), ConnectionState::Connecting);
    assert!(client.inner.is_current(1));

    tokens.clear();
    assert_eq!(client.inner.lost(1, None, false), None);
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

// ── dispatch ──────────────────────────────────────────────────────────

#[test]
fn malformed_frames_never_reach_listeners() {
    let fx = fixture(Some("T1".to_owned()));
    let (_l, seen) = collect(&fx.client, "ping");
    let _rx = track(&fx.client, 1);
    fx.client.inner.opened(1);

    fx.client.inner.handle_frame(1, "not json");
    fx.client.inner.handle_frame(1, r#"{"payload":1}"#);
    fx.client.inner.handle_frame(1, r#"{"event":"ping""#);
    fx.client.inner.handle_frame(1, r#"["ping", {"x": 1}]"#);
    assert!(seen.lock().is_empty());
    assert_eq!(fx.client.state(), ConnectionState::Connected);
}

#[test]
fn own_post_reaches_listener_without_toast() {
    let fx = fixture(Some(jwt_for("user-42")));
    let (_l, seen) = collect(&fx.client, policy::NEW_POST);
    let _rx = track(&fx.client, 1);

    let frame = r#"{"event":"new_post","payload":{"user_id":"user-42","club_id":"c1","club_name":"Chess","content":"hi"}}"#;
    fx.client.inner.handle_frame(1, frame);

    assert!(fx.notifier.success.lock().is_empty());
    assert_eq!(seen.lock().len(), 1);
    assert_eq!(seen.lock()[0]["user_id"], "user-42");
}

#[test]
fn foreign_post_toasts_and_dispatches_unchanged() {
    let fx = fixture(Some(jwt_for("user-42")));
    let (_l, seen) = collect(&fx.client, policy::NEW_POST);
    let _rx = track(&fx.client, 1);

    let payload = json!({"user_id": "user-1", "club_id": "c1", "club_name": "Chess", "content": "hi"});
    let frame = json!({"event": "new_post", "payload": payload}).to_string();
    fx.client.inner.handle_frame(1, &frame);

    assert_eq!(*fx.notifier.success.lock(), ["user-1 posted in Chess"]);
    assert_eq!(*seen.lock(), [payload]);
}

#[test]
fn location_is_sampled_at_dispatch_time() {
    let fx = fixture(Some(jwt_for("user-42")));
    let _rx = track(&fx.client, 1);
    let frame = r#"{"event":"new_post","payload":{"user_id":"user-1","club_id":"c1","club_name":"Chess"}}"#;

    fx.location.set(Route::parse("/(tabs)/myclubs/c1/posts"));
    fx.client.inner.handle_frame(1, frame);
    assert!(fx.notifier.success.lock().is_empty());

    fx.location.set(Route::parse("/(tabs)/explore"));
    fx.client.inner.handle_frame(1, frame);
    assert_eq!(fx.notifier.success.lock().len(), 1);
}

#[test]
fn listener_registered_during_dispatch_sees_only_later_frames() {
    let fx = fixture(Some("T1".to_owned()));
    let _rx = track(&fx.client, 1);
    let late_seen = Arc::new(Mutex::new(Vec::new()));

    let client = fx.client.clone();
    let sink = Arc::clone(&late_seen);
    let late = listener(move |p| sink.lock().push(p.clone()));
    let registered = Arc::new(Mutex::new(false));
    fx.client.on(
        "ping",
        listener(move |_| {
            let mut done = registered.lock();
            if !*done {
                client.on("ping", Arc::clone(&late));
                *done = true;
            }
        }),
    );

    fx.client.inner.handle_frame(1, r#"{"event":"ping","payload":1}"#);
    assert!(late_seen.lock().is_empty());
    fx.client.inner.handle_frame(1, r#"{"event":"ping","payload":2}"#);
    assert_eq!(*late_seen.lock(), [json!(2)]);
}

#[test]
fn off_stops_one_listener_only() {
    let fx = fixture(Some("T1".to_owned()));
    let _rx = track(&fx.client, 1);
    let (a, seen_a) = collect(&fx.client, "ping");
    let (_b, seen_b) = collect(&fx.client, "ping");

    fx.client.inner.handle_frame(1, r#"{"event":"ping","payload":1}"#);
    fx.client.off("ping", &a);
    fx.client.inner.handle_frame(1, r#"{"event":"ping","payload":2}"#);

    assert_eq!(*seen_a.lock(), [json!(1)]);
    assert_eq!(*seen_b.lock(), [json!(1), json!(2)]);
}
