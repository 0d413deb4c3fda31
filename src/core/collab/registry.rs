//! Session registry
//!
//! Maps each session key to the participants currently connected to it.
//! Sessions are created by the first `join` and removed by the `leave` that
//! empties them; nothing about a session outlives its last connection.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use tokio::sync::{Notify, mpsc};
use uuid::Uuid;

use super::protocol::{Outbound, ParticipantId, SessionKey};

// ============================================================================
// Participant Handle
// ============================================================================

/// Reference to one live connection: its outbound queue plus an eviction signal
#[derive(Debug, Clone)]
pub struct ParticipantHandle {
    id: ParticipantId,
    tx: mpsc::Sender<Outbound>,
    evicted: Arc<Notify>,
}

impl ParticipantHandle {
    /// Create a handle with a bounded outbound queue of `capacity` messages
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = Self {
            id: Uuid::new_v4(),
            tx,
            evicted: Arc::new(Notify::new()),
        };
        (handle, rx)
    }

    pub fn id(&self) -> ParticipantId {
        self.id
    }

    /// Queue a message without waiting; fails when the queue is full or closed
    pub fn try_deliver(
        &self,
        message: Outbound,
    ) -> Result<(), mpsc::error::TrySendError<Outbound>> {
        self.tx.try_send(message)
    }

    /// Tell the owning connection it has been dropped from its session
    pub fn evict(&self) {
        self.evicted.notify_one();
    }

    /// Signal fired by [`ParticipantHandle::evict`]
    pub fn eviction_signal(&self) -> Arc<Notify> {
        Arc::clone(&self.evicted)
    }
}

// ============================================================================
// Session Registry
// ============================================================================

/// Snapshot of a session right after a join
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionView {
    pub session_key: SessionKey,
    pub participants: usize,
}

/// Concurrent map from session key to its participant set
///
/// Every operation locks only the shard holding its session, so independent
/// sessions never contend with each other.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionKey, HashMap<ParticipantId, ParticipantHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a participant, creating the session if needed
    ///
    /// Re-joining with a handle that is already registered is a no-op.
    pub fn join(&self, session_key: &SessionKey, handle: ParticipantHandle) -> SessionView {
        let mut participants = self.sessions.entry(session_key.clone()).or_default();
        participants.entry(handle.id()).or_insert(handle);

        SessionView {
            session_key: session_key.clone(),
            participants: participants.len(),
        }
    }

    /// Remove a participant, dropping the session once it is empty
    ///
    /// Returns whether the participant was still registered.
    pub fn leave(&self, session_key: &SessionKey, participant_id: ParticipantId) -> bool {
        match self.sessions.entry(session_key.clone()) {
            Entry::Occupied(mut entry) => {
                let removed = entry.get_mut().remove(&participant_id).is_some();
                if entry.get().is_empty() {
                    entry.remove();
                    tracing::debug!(session_key = %session_key, "Session closed");
                }
                removed
            }
            Entry::Vacant(_) => false,
        }
    }

    /// Handles of a session's participants, optionally excluding one
    ///
    /// The result is a snapshot; the shard lock is released before returning.
    pub fn participants_of(
        &self,
        session_key: &SessionKey,
        excluding: Option<ParticipantId>,
    ) -> Vec<ParticipantHandle> {
        self.sessions
            .get(session_key)
            .map(|participants| {
                participants
                    .values()
                    .filter(|handle| Some(handle.id()) != excluding)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Ids of a session's participants
    #[cfg(test)]
    pub fn participant_ids(
        &self,
        session_key: &SessionKey,
    ) -> std::collections::HashSet<ParticipantId> {
        self.sessions
            .get(session_key)
            .map(|participants| participants.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn participant_count(&self, session_key: &SessionKey) -> usize {
        self.sessions
            .get(session_key)
            .map(|participants| participants.len())
            .unwrap_or(0)
    }

    #[cfg(test)]
    pub fn contains(&self, session_key: &SessionKey, participant_id: ParticipantId) -> bool {
        self.sessions
            .get(session_key)
            .is_some_and(|participants| participants.contains_key(&participant_id))
    }

    /// Number of live sessions
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
