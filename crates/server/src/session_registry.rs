//! Live sessions: which connection is which player right now.
//!
//! A connection first asks for a session id, then registers under it with
//! its durable identity. Sessions vanish when their connection closes; the
//! player profile they point at does not.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

use indexmap::IndexMap;

use digsite_engine::ids::ShortId;
use digsite_engine::world::position::Position;

use crate::broadcast::{self, FanoutReport, Outbound, Outbox};
use crate::protocol::RosterEntry;

/// Opaque per-socket handle, unique for the life of the process.
pub type ConnId = u64;

/// A connection asked to register an id another connection owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdTaken(pub ShortId);

impl fmt::Display for SessionIdTaken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session id {} belongs to another connection", self.0)
    }
}

impl std::error::Error for SessionIdTaken {}

#[derive(Clone, Debug)]
pub struct Session {
    pub id: ShortId,
    pub conn_id: ConnId,
    pub identity: String,
    pub username: String,
    /// Last position this session reported.
    pub position: Position,
    outbox: Outbox,
}

impl Session {
    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }
}

/// Thread-safe registry of live sessions.
///
/// Uses `std::sync` locks because every operation is brief and never awaits
/// while a lock is held.
pub struct SessionRegistry {
    sessions: RwLock<IndexMap<ShortId, Session>>,
    /// Ids handed out by `issue_session_id` that have not registered yet.
    pending: Mutex<HashMap<ShortId, ConnId>>,
    next_conn_id: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(IndexMap::new()),
            pending: Mutex::new(HashMap::new()),
            next_conn_id: AtomicU64::new(1),
        }
    }

    pub fn allocate_conn_id(&self) -> ConnId {
        self.next_conn_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Hand out a fresh session id to `conn_id`, unique among live sessions
    /// and ids still waiting to register.
    pub fn issue_session_id(&self, conn_id: ConnId) -> ShortId {
        let sessions = self.sessions.read().expect("session registry poisoned");
        let mut pending = self.pending.lock().expect("session registry poisoned");
        let id = ShortId::generate_unique(|candidate| {
            sessions.contains_key(candidate) || pending.contains_key(candidate)
        });
        pending.insert(id.clone(), conn_id);
        id
    }

    /// Register `id` for a connection. A connection holds at most one
    /// session: re-registering drops whatever it held before, and the
    /// dropped sessions are returned.
    ///
    /// Fails when `id` is live or pending for a different connection.
    pub fn connect(
        &self,
        id: ShortId,
        identity: &str,
        username: &str,
        position: Position,
        conn_id: ConnId,
        outbox: Outbox,
    ) -> Result<Vec<Session>, SessionIdTaken> {
        let mut sessions = self.sessions.write().expect("session registry poisoned");
        let mut pending = self.pending.lock().expect("session registry poisoned");

        let live_owner = sessions.get(&id).map(|s| s.conn_id);
        let pending_owner = pending.get(&id).copied();
        if live_owner.or(pending_owner).is_some_and(|owner| owner != conn_id) {
            return Err(SessionIdTaken(id));
        }
        pending.remove(&id);
        drop(pending);

        let held: Vec<ShortId> = sessions
            .values()
            .filter(|s| s.conn_id == conn_id)
            .map(|s| s.id.clone())
            .collect();
        let replaced = held
            .iter()
            .filter_map(|held_id| sessions.shift_remove(held_id))
            .collect();

        sessions.insert(
            id.clone(),
            Session {
                id,
                conn_id,
                identity: identity.to_string(),
                username: username.to_string(),
                position,
                outbox,
            },
        );
        Ok(replaced)
    }

    /// Does `conn_id` still hold the live session `id`?
    pub fn is_held_by(&self, id: &ShortId, conn_id: ConnId) -> bool {
        self.sessions
            .read()
            .expect("session registry poisoned")
            .get(id)
            .is_some_and(|s| s.conn_id == conn_id)
    }

    /// Remove whatever session `conn_id` holds, plus any id it was issued but
    /// never used. No-op for unknown connections.
    pub fn disconnect(&self, conn_id: ConnId) -> Option<Session> {
        self.pending
            .lock()
            .expect("session registry poisoned")
            .retain(|_, owner| *owner != conn_id);

        let mut sessions = self.sessions.write().expect("session registry poisoned");
        let id = sessions
            .values()
            .find(|s| s.conn_id == conn_id)
            .map(|s| s.id.clone())?;
        sessions.shift_remove(&id)
    }

    pub fn lookup_by_connection(&self, conn_id: ConnId) -> Option<Session> {
        self.sessions
            .read()
            .expect("session registry poisoned")
            .values()
            .find(|s| s.conn_id == conn_id)
            .cloned()
    }

    pub fn get(&self, id: &ShortId) -> Option<Session> {
        self.sessions
            .read()
            .expect("session registry poisoned")
            .get(id)
            .cloned()
    }

    /// Is any live session bound to `identity`?
    pub fn identity_in_use(&self, identity: &str) -> bool {
        self.sessions
            .read()
            .expect("session registry poisoned")
            .values()
            .any(|s| s.identity == identity)
    }

    pub fn update_position(&self, id: &ShortId, position: Position) {
        if let Some(session) = self
            .sessions
            .write()
            .expect("session registry poisoned")
            .get_mut(id)
        {
            session.position = position;
        }
    }

    /// Roster of every live session, in join order.
    pub fn list_all(&self) -> IndexMap<ShortId, RosterEntry> {
        self.sessions
            .read()
            .expect("session registry poisoned")
            .iter()
            .map(|(id, s)| {
                (
                    id.clone(),
                    RosterEntry {
                        username: s.username.clone(),
                        position: s.position,
                    },
                )
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().expect("session registry poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Enqueue `message` for every live session except `exclude`.
    pub fn broadcast(&self, exclude: Option<&ShortId>, message: &Outbound) -> FanoutReport {
        let sessions = self.sessions.read().expect("session registry poisoned");
        broadcast::fan_out(
            sessions.iter().map(|(id, s)| (id, &s.outbox)),
            exclude,
            message,
        )
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
