// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Realtime event client: one socket per auth token, fanned out to listeners.
//!
//! A single [`RealtimeClient`] lives for the whole app session.  Screens
//! register and unregister listeners; they never own the connection.  Each
//! socket runs on its own task, tagged with a generation number, and anything
//! a superseded task reports after `disconnect()` is ignored.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::RealtimeConfig;
use crate::envelope::Envelope;
use crate::error::ClientError;
use crate::policy::{self, Decision, Suppression, CONNECT_ERROR_TEXT};
use crate::registry::{Listener, ListenerRegistry};
use crate::session::{normalize, SessionContext};
use crate::state::ConnectionState;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// The tracked socket task.
struct Connection {
    generation: u64,
    outbound: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
}

struct Inner {
    config: RealtimeConfig,
    session: SessionContext,
    registry: Mutex<ListenerRegistry>,
    /// State is only written while this lock is held.
    connection: Mutex<Option<Connection>>,
    state: watch::Sender<ConnectionState>,
    generations: AtomicU64,
}

/// Handle to the session's realtime connection. Cheap to clone.
#[derive(Clone)]
pub struct RealtimeClient {
    inner: Arc<Inner>,
}

impl RealtimeClient {
    pub fn new(config: RealtimeConfig, session: SessionContext) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                config,
                session,
                registry: Mutex::new(ListenerRegistry::default()),
                connection: Mutex::new(None),
                state,
                generations: AtomicU64::new(0),
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Observe state transitions.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Open a socket for the current token.
    ///
    /// No-op without a token or while a socket is open or opening. Returns
    /// immediately; the handshake runs on a spawned task, so this must be
    /// called from within a tokio runtime.
    pub fn connect(&self) {
        let Some(token) = self.inner.session.token() else {
            debug!("no auth token, realtime connect skipped");
            return;
        };

        let (generation, outbound_rx, cancel) = {
            let mut slot = self.inner.connection.lock();
            if slot.is_some() {
                return;
            }
            let generation = self.inner.generations.fetch_add(1, Ordering::Relaxed) + 1;
            let (outbound, outbound_rx) = mpsc::unbounded_channel();
            let cancel = CancellationToken::new();
            *slot = Some(Connection { generation, outbound, cancel: cancel.clone() });
            self.inner.set_state(ConnectionState::Connecting);
            (generation, outbound_rx, cancel)
        };

        info!(generation, "realtime connecting");
        tokio::spawn(run_connection(
            Arc::clone(&self.inner),
            generation,
            token,
            outbound_rx,
            cancel,
        ));
    }

    /// Close the socket, if any, without failure side effects.
    pub fn disconnect(&self) {
        let mut slot = self.inner.connection.lock();
        if let Some(conn) = slot.take() {
            conn.cancel.cancel();
            info!(generation = conn.generation, "realtime disconnected");
        }
        self.inner.set_state(ConnectionState::Disconnected);
    }

    /// Register `listener` for future `event` payloads.
    pub fn on(&self, event: &str, listener: Listener) {
        self.inner.registry.lock().add(event, listener);
    }

    /// Unregister `listener` (by reference) from `event`.
    pub fn off(&self, event: &str, listener: &Listener) {
        self.inner.registry.lock().remove(event, listener);
    }

    /// Send an envelope over the open socket.
    ///
    /// Nothing is queued: while not connected the payload is dropped with a
    /// warning and `NotConnected` is returned. Never changes the state.
    pub fn send(&self, event: &str, payload: Value) -> Result<(), ClientError> {
        let slot = self.inner.connection.lock();
        let conn = match slot.as_ref() {
            Some(conn) if *self.inner.state.borrow() == ConnectionState::Connected => conn,
            _ => {
                warn!(event, "realtime not connected, dropping outbound event");
                return Err(ClientError::NotConnected);
            }
        };

        let text = Envelope::new(event, payload).encode().map_err(|e| {
            warn!(event, err = %e, "failed to encode outbound event");
            ClientError::MalformedFrame
        })?;

        conn.outbound.send(text).map_err(|_| {
            warn!(event, "realtime socket task gone, dropping outbound event");
            ClientError::NotConnected
        })
    }

    /// Follow the session's token: connect when one appears, disconnect when
    /// it is cleared, rebind when it changes. Disconnects on `shutdown`.
    pub fn spawn_token_watch(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        let client = self.clone();
        let mut rx = self.inner.session.tokens.watch();
        tokio::spawn(async move {
            let initial = normalize(rx.borrow_and_update().clone());
            let mut bound = client.apply_token(None, initial);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            debug!("auth token source dropped");
                            break;
                        }
                        let next = normalize(rx.borrow_and_update().clone());
                        bound = client.apply_token(bound, next);
                    }
                }
            }
            client.disconnect();
        })
    }

    fn apply_token(&self, bound: Option<String>, next: Option<String>) -> Option<String> {
        match (bound.as_deref(), next.as_deref()) {
            (_, None) => self.disconnect(),
            (Some(prev), Some(cur)) if prev != cur => {
                debug!("auth token changed, rebinding realtime socket");
                self.disconnect();
                self.connect();
            }
            // Re-applying the same token is the explicit reconnect trigger.
            _ => self.connect(),
        }
        next
    }
}

impl Inner {
    fn set_state(&self, next: ConnectionState) {
        self.state.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            *state = next;
            true
        });
    }

    fn is_current(&self, generation: u64) -> bool {
        self.connection.lock().as_ref().is_some_and(|c| c.generation == generation)
    }

    /// Mark the socket open. False if the task has been superseded.
    fn opened(&self, generation: u64) -> bool {
        let slot = self.connection.lock();
        if !slot.as_ref().is_some_and(|c| c.generation == generation) {
            return false;
        }
        self.set_state(ConnectionState::Connected);
        true
    }

    /// Handle an unexpected close or failure of the current socket.
    ///
    /// Returns the token to retry with when automatic reconnect is enabled and
    /// a token is still present; otherwise releases the connection.
    fn lost(&self, generation: u64, failure: Option<ClientError>, notify: bool) -> Option<String> {
        if !self.is_current(generation) {
            return None;
        }
        match failure {
            Some(err) => {
                warn!(generation, err = %err, "realtime connection failed");
                if notify {
                    self.session.notifier.error(CONNECT_ERROR_TEXT);
                }
            }
            None => info!(generation, "realtime connection closed by server"),
        }

        let mut slot = self.connection.lock();
        if !slot.as_ref().is_some_and(|c| c.generation == generation) {
            return None;
        }
        let retry = if self.config.reconnect { self.session.token() } else { None };
        match retry {
            Some(token) => {
                self.set_state(ConnectionState::Connecting);
                Some(token)
            }
            None => {
                *slot = None;
                self.set_state(ConnectionState::Disconnected);
                None
            }
        }
    }

    /// Decode one inbound frame, apply global policy, and dispatch it.
    fn handle_frame(&self, generation: u64, text: &str) {
        if !self.is_current(generation) {
            debug!(generation, "dropping frame from superseded socket");
            return;
        }

        let envelope = match Envelope::decode(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(generation, err = %e, "discarding malformed realtime frame");
                return;
            }
        };

        if policy::is_global(&envelope.event) {
            self.apply_policy(&envelope);
        }

        // Snapshot so listeners run unlocked and may call on/off themselves.
        let listeners = self.registry.lock().snapshot(&envelope.event);
        for listener in listeners {
            listener(&envelope.payload);
        }
    }

    fn apply_policy(&self, envelope: &Envelope) {
        let viewer = self.session.identity();
        let route = self.session.location.current();
        match policy::evaluate(envelope, viewer.as_deref(), &route) {
            Decision::Toast(text) => self.session.notifier.success(&text),
            Decision::Suppress(Suppression::IncompletePayload) => {
                warn!(event = %envelope.event, "global event payload missing fields, no toast");
            }
            Decision::Suppress(reason) => {
                debug!(event = %envelope.event, reason = %reason, "toast suppressed");
            }
            Decision::Pass => {}
        }
    }
}

enum Ended {
    Cancelled,
    Closed,
    Failed,
}

async fn run_connection(
    inner: Arc<Inner>,
    generation: u64,
    mut token: String,
    mut outbound: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
) {
    let mut backoff = inner.config.reconnect_initial();
    // Only the first failure in a streak raises a toast.
    let mut notified = false;

    loop {
        let url = inner.config.socket_url(&token);
        let opened = tokio::select! {
            _ = cancel.cancelled() => return,
            opened = open_socket(&url, inner.config.connect_timeout()) => opened,
        };

        let failure = match opened {
            Ok(stream) => {
                // Frames meant for an earlier socket are not replayed.
                while outbound.try_recv().is_ok() {}
                if !inner.opened(generation) {
                    return;
                }
                info!(generation, "realtime connected");
                backoff = inner.config.reconnect_initial();
                notified = false;

                match pump(&inner, generation, stream, &mut outbound, &cancel).await {
                    Ended::Cancelled => return,
                    Ended::Closed => None,
                    Ended::Failed => Some(ClientError::Transport),
                }
            }
            Err(e) => Some(e),
        };

        let Some(next) = inner.lost(generation, failure, failure.is_some() && !notified) else {
            return;
        };
        notified |= failure.is_some();
        token = next;

        debug!(generation, backoff_ms = backoff.as_millis() as u64, "realtime reconnect scheduled");
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(backoff) => {}
        }
        backoff = (backoff * 2).min(inner.config.reconnect_max());
    }
}

async fn open_socket(url: &str, timeout: Duration) -> Result<WsStream, ClientError> {
    // The URL carries the token, so it is never logged.
    match tokio::time::timeout(timeout, tokio_tungstenite::connect_async(url)).await {
        Ok(Ok((stream, _))) => Ok(stream),
        Ok(Err(e)) => {
            debug!(err = %e, "realtime connect failed");
            Err(ClientError::Transport)
        }
        Err(_) => {
            debug!(timeout_ms = timeout.as_millis() as u64, "realtime connect timed out");
            Err(ClientError::ConnectTimeout)
        }
    }
}

/// Shuttle frames for one open socket until it ends.
async fn pump(
    inner: &Inner,
    generation: u64,
    stream: WsStream,
    outbound: &mut mpsc::UnboundedReceiver<String>,
    cancel: &CancellationToken,
) -> Ended {
    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                return Ended::Cancelled;
            }
            frame = outbound.recv() => {
                let Some(text) = frame else {
                    let _ = write.send(Message::Close(None)).await;
                    return Ended::Cancelled;
                };
                if let Err(e) = write.send(Message::text(text)).await {
                    debug!(generation, err = %e, "realtime write failed");
                    return Ended::Failed;
                }
            }
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => inner.handle_frame(generation, text.as_str()),
                    Some(Ok(Message::Close(_))) | None => return Ended::Closed,
                    Some(Err(e)) => {
                        debug!(generation, err = %e, "realtime read failed");
                        return Ended::Failed;
                    }
                    _ => {} // ping/pong/binary ignored
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
