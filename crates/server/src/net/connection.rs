//! Per-client connection handler.
//!
//! PreHandshake -> Connected -> Closed
//!
//! Each socket gets a reader loop (this task) and a writer task draining the
//! connection's outbox. Envelopes from one socket are handled strictly one
//! at a time, in arrival order; a handler finishes, broadcasts included,
//! before the next frame is read.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use digsite_engine::ids::ShortId;

use crate::broadcast::{Outbound, Outbox};
use crate::protocol::{Envelope, Route};
use crate::session_registry::ConnId;
use crate::state::ServerState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    PreHandshake,
    Connected,
    Closed,
}

/// What happened to one inbound envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Handled,
    /// Unknown route, or a game operation before `requestconnect`.
    Ignored,
}

/// The session this connection registered as.
#[derive(Debug, Clone)]
pub(super) struct Binding {
    pub(super) id: ShortId,
    pub(super) identity: String,
}

/// Protocol state for one socket, independent of the transport so that it
/// can be driven directly in tests.
pub struct Connection {
    pub(super) conn_id: ConnId,
    pub(super) state: Arc<ServerState>,
    pub(super) outbox: Outbox,
    pub(super) phase: Phase,
    /// Last id handed out by `requestid`, used if `requestconnect` omits one.
    pub(super) issued: Option<ShortId>,
    pub(super) binding: Option<Binding>,
}

impl Connection {
    pub fn new(state: Arc<ServerState>, outbox: Outbox) -> Self {
        let conn_id = state.sessions.allocate_conn_id();
        Self {
            conn_id,
            state,
            outbox,
            phase: Phase::PreHandshake,
            issued: None,
            binding: None,
        }
    }

    pub fn conn_id(&self) -> ConnId {
        self.conn_id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn session_id(&self) -> Option<&ShortId> {
        self.binding.as_ref().map(|b| &b.id)
    }

    /// Decode and handle one raw frame. Failures only affect this frame:
    /// they are logged and counted, and the connection stays open.
    pub async fn handle_frame(&mut self, frame: &[u8]) {
        let result = match Envelope::decode(frame) {
            Ok(envelope) => self.handle(envelope).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(Outcome::Handled) => self.state.metrics.envelope_handled(),
            Ok(Outcome::Ignored) => self.state.metrics.envelope_ignored(),
            Err(e) => {
                self.state.metrics.envelope_rejected();
                tracing::warn!("Connection {}: rejected message: {:#}", self.conn_id, e);
            }
        }
    }

    pub async fn handle(&mut self, envelope: Envelope) -> Result<Outcome> {
        if self.phase == Phase::Closed {
            return Ok(Outcome::Ignored);
        }
        let Some(route) = Route::lookup(&envelope.event, &envelope.kind) else {
            tracing::debug!(
                "Connection {}: ignoring unknown {}/{}",
                self.conn_id,
                envelope.event,
                envelope.kind
            );
            return Ok(Outcome::Ignored);
        };
        if route.requires_session() && !self.holds_session() {
            tracing::debug!(
                "Connection {}: ignoring {}/{} before connect",
                self.conn_id,
                envelope.event,
                envelope.kind
            );
            return Ok(Outcome::Ignored);
        }
        self.dispatch(route, envelope).await?;
        Ok(Outcome::Handled)
    }

    /// Is the bound session still registered to this connection? A stale
    /// binding is dropped so the client has to connect again.
    fn holds_session(&mut self) -> bool {
        let Some(binding) = &self.binding else {
            return false;
        };
        if self.state.sessions.is_held_by(&binding.id, self.conn_id) {
            return true;
        }
        tracing::warn!(
            "Connection {}: session {} is no longer registered here",
            self.conn_id,
            binding.id
        );
        self.binding = None;
        self.phase = Phase::PreHandshake;
        false
    }

    /// Queue a frame for this connection only. Waits for queue space rather
    /// than dropping, so paged replies arrive complete and in order.
    pub(super) async fn reply(&self, frame: Outbound) -> Result<()> {
        self.outbox
            .send(frame)
            .await
            .map_err(|_| anyhow!("connection {} is closed", self.conn_id))
    }

    /// Release the session, announcing the leave. Safe to call twice.
    pub fn close(&mut self) {
        if self.phase == Phase::Closed {
            return;
        }
        self.phase = Phase::Closed;
        self.binding = None;
        if let Some(session) = self.state.disconnect_session(self.conn_id) {
            tracing::info!("{} ({}) has left the server", session.username, session.id);
        }
    }
}

/// Drive one upgraded WebSocket until the client goes away.
pub async fn handle_socket(socket: WebSocket, state: Arc<ServerState>) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Outbound>(state.options().outbox_capacity);
    let mut conn = Connection::new(Arc::clone(&state), tx);
    let conn_id = conn.conn_id();
    state.metrics.connection_opened();

    // Ends once every sender is gone: ours on return, the session's on close.
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if let Err(e) = sink.send(WsMessage::Binary(frame.to_vec())).await {
                tracing::debug!("Connection {}: write failed: {}", conn_id, e);
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(msg) = stream.next().await {
        match msg {
            Ok(WsMessage::Text(text)) => conn.handle_frame(text.as_bytes()).await,
            Ok(WsMessage::Binary(bytes)) => conn.handle_frame(&bytes).await,
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => {} // ping/pong are answered by axum
            Err(e) => {
                tracing::debug!("Connection {}: read failed: {}", conn_id, e);
                break;
            }
        }
        if conn.outbox.is_closed() {
            break;
        }
    }

    conn.close();
    drop(conn);
    let _ = writer.await;
    state.metrics.connection_closed();
    tracing::debug!("Connection {} finished", conn_id);
}
