//! Collaboration session manager
//!
//! Glue between one live connection and the registry/relay pair. A
//! [`Connection`] moves through `Connecting -> Active -> Closed`; leaving the
//! session happens exactly once, from [`Connection::close`] or from `Drop` if
//! the owning task ends any other way.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ws::Utf8Bytes;
use tokio::sync::{Notify, mpsc};

use super::protocol::{
    ClientMessage, Outbound, ParticipantId, ServerMessage, SessionKey, Update, WsErrorCode,
};
use super::registry::{ParticipantHandle, SessionRegistry, SessionView};
use super::relay::{BroadcastRelay, RelayOutcome};
use crate::core::config::DEFAULT_OUTBOUND_CAPACITY;
use crate::core::db::models::{DiagramId, SaveDiagram};
use crate::core::db::repositories::{DiagramRepository, DiagramRepositoryError};

/// Errors from driving a connection outside its valid states
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollabError {
    #[error("Connection is not active yet")]
    NotActive,

    #[error("Connection is already active")]
    AlreadyActive,

    #[error("Connection is closed")]
    Closed,
}

/// Lifecycle of one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Active,
    Closed,
}

// ============================================================================
// Manager
// ============================================================================

/// Owns the shared registry and relay and hands out connections
#[derive(Debug, Clone)]
pub struct CollabManager {
    registry: Arc<SessionRegistry>,
    relay: BroadcastRelay,
    diagram_repo: DiagramRepository,
    outbound_capacity: usize,
}

impl CollabManager {
    pub fn new(diagram_repo: DiagramRepository) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        Self {
            relay: BroadcastRelay::new(Arc::clone(&registry)),
            registry,
            diagram_repo,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
        }
    }

    /// Set the per-participant outbound queue capacity
    pub fn outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity.max(1);
        self
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Create a connection for `session_key`, still in `Connecting`
    ///
    /// `owner` is the authenticated username, if any; anonymous participants
    /// can relay but not save. The receiver is the participant's outbound
    /// queue and must be drained by the caller.
    pub fn connect(
        &self,
        session_key: SessionKey,
        owner: Option<String>,
    ) -> (Connection, mpsc::Receiver<Outbound>) {
        let (handle, rx) = ParticipantHandle::new(self.outbound_capacity);
        let connection = Connection {
            session_key,
            owner,
            handle,
            state: ConnectionState::Connecting,
            manager: self.clone(),
        };
        (connection, rx)
    }
}

// ============================================================================
// Connection
// ============================================================================

/// One participant's view of its session
#[derive(Debug)]
pub struct Connection {
    session_key: SessionKey,
    owner: Option<String>,
    handle: ParticipantHandle,
    state: ConnectionState,
    manager: CollabManager,
}

impl Connection {
    pub fn participant_id(&self) -> ParticipantId {
        self.handle.id()
    }

    pub fn session_key(&self) -> &SessionKey {
        &self.session_key
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Fires when the relay has dropped this participant from its session
    pub fn eviction_signal(&self) -> Arc<Notify> {
        self.handle.eviction_signal()
    }

    /// Join the session and greet the participant
    pub fn activate(&mut self) -> Result<SessionView, CollabError> {
        match self.state {
            ConnectionState::Connecting => {}
            ConnectionState::Active => return Err(CollabError::AlreadyActive),
            ConnectionState::Closed => return Err(CollabError::Closed),
        }

        let view = self
            .manager
            .registry
            .join(&self.session_key, self.handle.clone());
        self.state = ConnectionState::Active;

        tracing::info!(
            session_key = %self.session_key,
            participant_id = %self.participant_id(),
            participants = view.participants,
            authenticated = self.owner.is_some(),
            "Participant joined"
        );

        self.reply(ServerMessage::Joined {
            session_key: self.session_key.clone(),
            participant_id: self.participant_id(),
            participants: view.participants,
        });

        Ok(view)
    }

    /// Handle an inbound text frame: a control message or a drawing update
    pub async fn handle_text(&mut self, text: Utf8Bytes) -> Result<(), CollabError> {
        self.ensure_active()?;

        match ClientMessage::classify(text.as_str()) {
            Ok(None) => {
                self.relay(Update::Text(text));
            }
            Ok(Some(ClientMessage::Ping)) => {
                self.reply(ServerMessage::Pong);
            }
            Ok(Some(ClientMessage::Save { id, title, content })) => {
                let reply = self.save(id, title, content).await;
                self.reply(reply);
            }
            Err(e) => {
                tracing::debug!(
                    session_key = %self.session_key,
                    participant_id = %self.participant_id(),
                    "Invalid control message: {}",
                    e
                );
                self.reply(ServerMessage::error(
                    WsErrorCode::InvalidMessage,
                    format!("Invalid message format: {}", e),
                ));
            }
        }

        Ok(())
    }

    /// Handle an inbound binary frame; always a drawing update
    pub fn handle_binary(&mut self, data: Bytes) -> Result<RelayOutcome, CollabError> {
        self.ensure_active()?;
        Ok(self.relay(Update::Binary(data)))
    }

    /// Leave the session; later calls are no-ops
    pub fn close(&mut self) {
        if self.state == ConnectionState::Active {
            self.manager
                .registry
                .leave(&self.session_key, self.participant_id());

            tracing::info!(
                session_key = %self.session_key,
                participant_id = %self.participant_id(),
                "Participant left"
            );
        }
        self.state = ConnectionState::Closed;
    }

    fn ensure_active(&self) -> Result<(), CollabError> {
        match self.state {
            ConnectionState::Active => Ok(()),
            ConnectionState::Connecting => Err(CollabError::NotActive),
            ConnectionState::Closed => Err(CollabError::Closed),
        }
    }

    fn relay(&self, update: Update) -> RelayOutcome {
        self.manager
            .relay
            .relay(&self.session_key, self.participant_id(), update)
    }

    /// Queue a server message for this participant
    ///
    /// If our own queue cannot take it the connection is as stuck as any
    /// other slow recipient, so it is evicted the same way.
    fn reply(&self, message: ServerMessage) {
        if self.handle.try_deliver(Outbound::Server(message)).is_err() {
            tracing::warn!(
                session_key = %self.session_key,
                participant_id = %self.participant_id(),
                "Reply queue full, closing connection"
            );
            self.handle.evict();
        }
    }

    async fn save(
        &self,
        id: Option<DiagramId>,
        title: Option<String>,
        content: Option<String>,
    ) -> ServerMessage {
        let Some(owner) = self.owner.clone() else {
            return ServerMessage::error(
                WsErrorCode::Unauthorized,
                "Saving requires an authenticated connection",
            );
        };
        let Some(content) = content else {
            return ServerMessage::error(WsErrorCode::InvalidMessage, "content is required");
        };

        let request = SaveDiagram {
            owner,
            id,
            title,
            content,
        };

        match self.manager.diagram_repo.upsert(&request).await {
            Ok((diagram, status)) => {
                tracing::info!(
                    session_key = %self.session_key,
                    participant_id = %self.participant_id(),
                    diagram_id = diagram.id,
                    %status,
                    "Diagram checkpointed"
                );
                ServerMessage::Saved {
                    id: diagram.id,
                    status,
                }
            }
            Err(DiagramRepositoryError::NotFound) => {
                ServerMessage::error(WsErrorCode::NotFound, "Diagram not found")
            }
            Err(DiagramRepositoryError::Validation(msg)) => {
                ServerMessage::error(WsErrorCode::InvalidMessage, msg)
            }
            Err(e) => {
                tracing::error!(
                    session_key = %self.session_key,
                    participant_id = %self.participant_id(),
                    "Failed to save diagram: {}",
                    e
                );
                ServerMessage::error(WsErrorCode::InternalError, "Failed to save diagram")
            }
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}
