//! WebSocket protocol messages for live collaboration
//!
//! Drawing updates are opaque: the server never inspects them and forwards
//! the exact frame it received. Only a small set of JSON control messages
//! (`save`, `ping`) is interpreted.

use std::borrow::Cow;

use axum::body::Bytes;
use axum::extract::ws::Utf8Bytes;
use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::db::models::{DiagramId, SaveStatus};

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier of one live connection
pub type ParticipantId = Uuid;

/// Key of a collaboration session (a diagram id or an ad-hoc room name)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, From, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionKey(String);

impl SessionKey {
    /// Maximum accepted key length in bytes
    pub const MAX_LEN: usize = 128;

    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Check the key is usable as a session address
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty() && self.0.len() <= Self::MAX_LEN
    }
}

impl From<&str> for SessionKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

// ============================================================================
// Updates
// ============================================================================

/// One opaque drawing update, kept in the frame type it arrived in
///
/// Both variants are reference counted, so fanning out to many participants
/// never copies the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    Text(Utf8Bytes),
    Binary(Bytes),
}

impl Update {
    /// Payload size in bytes
    pub(crate) fn len(&self) -> usize {
        match self {
            Update::Text(text) => text.len(),
            Update::Binary(data) => data.len(),
        }
    }
}

impl From<&str> for Update {
    fn from(text: &str) -> Self {
        Update::Text(Utf8Bytes::from(text))
    }
}

/// Anything queued for delivery to one participant
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Another participant's update, forwarded verbatim
    Update(Update),
    /// Message generated by the server for this participant
    Server(ServerMessage),
}

// ============================================================================
// Client -> Server
// ============================================================================

/// Control messages a client may send
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Checkpoint the drawing into the diagram store
    Save {
        #[serde(default)]
        id: Option<DiagramId>,
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        content: Option<String>,
    },

    /// Keepalive
    Ping,
}

impl ClientMessage {
    /// `type` values reserved for control messages
    pub const CONTROL_TYPES: &'static [&'static str] = &["save", "ping"];

    /// Decide whether a text frame is a control message
    ///
    /// Returns `Ok(None)` for anything that is not a JSON object tagged with a
    /// control type; such frames are drawing updates. A frame tagged as a
    /// control message that does not match its schema is an error.
    pub fn classify(text: &str) -> Result<Option<Self>, serde_json::Error> {
        #[derive(Deserialize)]
        struct TypeProbe<'a> {
            #[serde(rename = "type", borrow, default)]
            kind: Option<Cow<'a, str>>,
        }

        if !text.trim_start().starts_with('{') {
            return Ok(None);
        }

        let is_control = match serde_json::from_str::<TypeProbe>(text) {
            Ok(probe) => probe
                .kind
                .is_some_and(|kind| Self::CONTROL_TYPES.contains(&kind.as_ref())),
            Err(_) => false,
        };

        if !is_control {
            return Ok(None);
        }

        serde_json::from_str(text).map(Some)
    }
}

// ============================================================================
// Server -> Client
// ============================================================================

/// Messages generated by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once when the connection becomes active
    Joined {
        session_key: SessionKey,
        participant_id: ParticipantId,
        /// Live participants including the new one
        participants: usize,
    },

    /// Result of a save request
    Saved { id: DiagramId, status: SaveStatus },

    /// Reply to a ping
    Pong,

    /// Error tied to the sender's last message
    Error { code: WsErrorCode, message: String },
}

impl ServerMessage {
    pub fn error(code: WsErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }
}

/// Error codes carried by [`ServerMessage::Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WsErrorCode {
    Unauthorized,
    NotFound,
    InvalidMessage,
    InternalError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_key_validation() {
        assert!(SessionKey::from("room1").is_valid());
        assert!(!SessionKey::from("").is_valid());
        assert!(!SessionKey::new("k".repeat(SessionKey::MAX_LEN + 1)).is_valid());
        assert_eq!(SessionKey::from("room1").to_string(), "room1");
    }

    #[test]
    fn test_classify_drawing_updates() {
        assert_eq!(ClientMessage::classify(r#"{"x":1}"#).unwrap(), None);
        assert_eq!(ClientMessage::classify("not json at all").unwrap(), None);
        assert_eq!(ClientMessage::classify("[1,2,3]").unwrap(), None);
        assert_eq!(
            ClientMessage::classify(r#"{"type":"stroke","points":[]}"#).unwrap(),
            None
        );
        assert_eq!(ClientMessage::classify(r#"{"type":5}"#).unwrap(), None);
    }

    #[test]
    fn test_classify_control_messages() {
        assert_eq!(
            ClientMessage::classify(r#"{"type":"ping"}"#).unwrap(),
            Some(ClientMessage::Ping)
        );

        let save = ClientMessage::classify(r#"{"type":"save","id":3,"content":"X"}"#).unwrap();
        assert_eq!(
            save,
            Some(ClientMessage::Save {
                id: Some(3),
                title: None,
                content: Some("X".to_string()),
            })
        );
    }

    #[test]
    fn test_classify_malformed_control_message() {
        assert!(ClientMessage::classify(r#"{"type":"save","id":"abc"}"#).is_err());
    }

    #[test]
    fn test_server_message_serialization() {
        let joined = ServerMessage::Joined {
            session_key: SessionKey::from("room1"),
            participant_id: Uuid::nil(),
            participants: 2,
        };
        let json: serde_json::Value = serde_json::to_value(&joined).unwrap();
        assert_eq!(json["type"], "joined");
        assert_eq!(json["session_key"], "room1");
        assert_eq!(json["participants"], 2);

        let saved = ServerMessage::Saved {
            id: 7,
            status: SaveStatus::Created,
        };
        assert_eq!(
            serde_json::to_string(&saved).unwrap(),
            r#"{"type":"saved","id":7,"status":"created"}"#
        );

        assert_eq!(
            serde_json::to_string(&ServerMessage::Pong).unwrap(),
            r#"{"type":"pong"}"#
        );

        let error = ServerMessage::error(WsErrorCode::InvalidMessage, "bad");
        assert_eq!(
            serde_json::to_string(&error).unwrap(),
            r#"{"type":"error","code":"invalid_message","message":"bad"}"#
        );
    }
}
