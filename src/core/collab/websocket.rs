//! WebSocket handler for live collaboration
//!
//! WebSocket URL: ws(s)://{host}/ws/{session_key}?token={bearer}
//!
//! Each socket gets a writer task draining the participant's outbound queue
//! while the reader loop feeds inbound frames to its [`Connection`].

use std::time::Duration;

use axum::{
    extract::{
        Path, Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::api::{CollabState, invalid_session_key};
use super::protocol::{Outbound, SessionKey, Update};
use crate::core::auth::AuthError;

/// How long the writer may keep flushing after the reader loop ends
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Query parameters accepted on upgrade
#[derive(Debug, Default, Deserialize)]
pub struct WsParams {
    #[serde(default)]
    pub token: Option<String>,
}

// ============================================================================
// WebSocket Handler
// ============================================================================

/// WebSocket upgrade handler
///
/// A token, when present, must be valid or the upgrade is refused with 401.
/// Without one the participant joins anonymously.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(session_key): Path<String>,
    Query(params): Query<WsParams>,
    State(state): State<CollabState>,
) -> Response {
    let session_key = SessionKey::from(session_key);
    if !session_key.is_valid() {
        return invalid_session_key();
    }

    let owner = match params.token.as_deref() {
        Some(token) => match state.jwt_service.validate_access_token(token) {
            Ok(claims) => Some(claims.sub),
            Err(e) => {
                tracing::debug!(session_key = %session_key, "Rejected WebSocket upgrade: {}", e);
                return AuthError::from(e).into_response();
            }
        },
        None => None,
    };

    ws.on_upgrade(move |socket| handle_socket(socket, session_key, owner, state))
}

/// Drive one WebSocket connection until it closes
async fn handle_socket(
    socket: WebSocket,
    session_key: SessionKey,
    owner: Option<String>,
    state: CollabState,
) {
    let (ws_sender, mut ws_receiver) = socket.split();

    let (mut connection, rx) = state.manager.connect(session_key, owner);
    let evicted = connection.eviction_signal();

    let send_task = tokio::spawn(write_outbound(ws_sender, rx));
    let abort_send = send_task.abort_handle();

    if let Err(e) = connection.activate() {
        tracing::error!("Failed to activate connection: {}", e);
        abort_send.abort();
        return;
    }

    let idle_timeout = state.idle_timeout;
    let idle = tokio::time::sleep(idle_timeout.unwrap_or(Duration::MAX));
    tokio::pin!(idle);

    loop {
        tokio::select! {
            frame = ws_receiver.next() => {
                let Some(frame) = frame else {
                    break;
                };

                let result = match frame {
                    Ok(Message::Text(text)) => connection.handle_text(text).await,
                    Ok(Message::Binary(data)) => connection.handle_binary(data).map(|_| ()),
                    Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                        tracing::trace!("Received ping/pong");
                        Ok(())
                    }
                    Ok(Message::Close(_)) => {
                        tracing::debug!(
                            session_key = %connection.session_key(),
                            participant_id = %connection.participant_id(),
                            "Client closed connection"
                        );
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(
                            session_key = %connection.session_key(),
                            participant_id = %connection.participant_id(),
                            "WebSocket error: {}",
                            e
                        );
                        break;
                    }
                };

                if let Err(e) = result {
                    tracing::error!("Error handling frame: {}", e);
                    break;
                }

                // A deadline past what Instant can represent never fires anyway
                if let Some(deadline) = idle_timeout.and_then(|t| Instant::now().checked_add(t)) {
                    idle.as_mut().reset(deadline);
                }
            }
            _ = evicted.notified() => {
                tracing::info!(
                    session_key = %connection.session_key(),
                    participant_id = %connection.participant_id(),
                    "Closing evicted participant"
                );
                break;
            }
            _ = &mut idle, if idle_timeout.is_some() => {
                tracing::info!(
                    session_key = %connection.session_key(),
                    participant_id = %connection.participant_id(),
                    "Closing idle participant"
                );
                break;
            }
        }
    }

    connection.close();
    // Dropping the connection releases the last sender, letting the writer finish
    drop(connection);

    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, send_task)
        .await
        .is_err()
    {
        abort_send.abort();
    }
}

/// Forward queued messages to the socket until the queue closes
async fn write_outbound<S>(mut ws_sender: S, mut rx: mpsc::Receiver<Outbound>)
where
    S: futures::Sink<Message> + Unpin,
{
    while let Some(outbound) = rx.recv().await {
        let message = match outbound {
            Outbound::Update(Update::Text(text)) => Message::Text(text),
            Outbound::Update(Update::Binary(data)) => Message::Binary(data),
            Outbound::Server(message) => match serde_json::to_string(&message) {
                Ok(json) => Message::Text(json.into()),
                Err(e) => {
                    tracing::error!("Failed to serialize message: {}", e);
                    continue;
                }
            },
        };

        if ws_sender.send(message).await.is_err() {
            break;
        }
    }

    let _ = ws_sender.close().await;
}
