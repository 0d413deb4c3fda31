//! HTTP routes for live collaboration
//!
//! - GET /ws/{session_key} - WebSocket upgrade into a session
//! - GET /api/sessions/{session_key} - Live participant count

use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;

use super::manager::CollabManager;
use super::protocol::SessionKey;
use super::websocket::ws_handler;
use crate::core::auth::{ApiError, JwtService};

// ============================================================================
// Application State
// ============================================================================

/// Shared state for the collaboration routes
#[derive(Clone)]
pub struct CollabState {
    pub manager: CollabManager,
    /// Validates the optional `token` query parameter on upgrade
    pub jwt_service: JwtService,
    /// Close connections that send nothing for this long
    pub idle_timeout: Option<Duration>,
}

impl CollabState {
    pub fn new(manager: CollabManager, jwt_service: JwtService) -> Self {
        Self {
            manager,
            jwt_service,
            idle_timeout: None,
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }
}

/// Live state of one session
#[derive(Debug, Serialize)]
pub struct SessionInfo {
    pub session_key: SessionKey,
    pub participants: usize,
}

// ============================================================================
// Router
// ============================================================================

/// Create the collaboration router
pub fn collab_router(state: CollabState) -> Router {
    Router::new()
        .route("/ws/{session_key}", get(ws_handler))
        .route("/api/sessions/{session_key}", get(session_info))
        .with_state(state)
}

/// 400 response for a key outside the accepted length
pub(super) fn invalid_session_key() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiError::new("Invalid session key", "BAD_REQUEST")),
    )
        .into_response()
}

/// GET /api/sessions/{session_key}
///
/// Unknown sessions report zero participants.
async fn session_info(
    State(state): State<CollabState>,
    Path(session_key): Path<String>,
) -> Response {
    let session_key = SessionKey::from(session_key);
    if !session_key.is_valid() {
        return invalid_session_key();
    }
    let participants = state.manager.registry().participant_count(&session_key);

    Json(SessionInfo {
        session_key,
        participants,
    })
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::core::auth::JwtConfig;
    use crate::core::collab::registry::ParticipantHandle;
    use crate::core::db::pool::{DbConfig, create_pool_with_migrations};
    use crate::core::db::repositories::DiagramRepository;

    async fn state() -> CollabState {
        let pool = create_pool_with_migrations(&DbConfig::in_memory())
            .await
            .unwrap();
        CollabState::new(
            CollabManager::new(DiagramRepository::new(pool)),
            JwtService::new(JwtConfig::new("test_secret")),
        )
    }

    #[tokio::test]
    async fn test_session_info_counts_participants() {
        let state = state().await;
        let key = SessionKey::from("room1");
        state
            .manager
            .registry()
            .join(&key, ParticipantHandle::new(4).0);
        let app = collab_router(state);

        let response = app
            .oneshot(
                Request::get("/api/sessions/room1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["session_key"], "room1");
        assert_eq!(body["participants"], 1);
    }

    #[tokio::test]
    async fn test_session_info_unknown_session() {
        let app = collab_router(state().await);

        let response = app
            .oneshot(
                Request::get("/api/sessions/nobody-here")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["participants"], 0);
    }

    #[tokio::test]
    async fn test_session_info_rejects_overlong_key() {
        let app = collab_router(state().await);
        let uri = format!("/api/sessions/{}", "k".repeat(SessionKey::MAX_LEN + 1));

        let response = app
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn test_session_info_accepts_longest_key() {
        let app = collab_router(state().await);
        let uri = format!("/api/sessions/{}", "k".repeat(SessionKey::MAX_LEN));

        let response = app
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_plain_get_on_ws_route_is_rejected() {
        let app = collab_router(state().await);

        let response = app
            .oneshot(Request::get("/ws/room1").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert!(response.status().is_client_error());
    }
}
