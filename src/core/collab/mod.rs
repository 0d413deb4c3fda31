//! Live collaboration
//!
//! Participants connect over WebSocket to a session keyed by diagram id or
//! room name. Updates from one participant are relayed verbatim to the others
//! in the same session; a `save` control message checkpoints the drawing into
//! the diagram store.

pub mod api;
pub mod manager;
pub mod protocol;
pub mod registry;
pub mod relay;
pub mod websocket;

pub use api::{CollabState, SessionInfo, collab_router};
pub use manager::{CollabError, CollabManager, Connection, ConnectionState};
pub use protocol::{
    ClientMessage, Outbound, ParticipantId, ServerMessage, SessionKey, Update, WsErrorCode,
};
pub use registry::{ParticipantHandle, SessionRegistry, SessionView};
pub use relay::{BroadcastRelay, RelayOutcome};
