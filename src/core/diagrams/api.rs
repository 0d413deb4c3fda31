//! Diagram API endpoints
//!
//! Provides REST API endpoints for diagram management (auth required on all):
//! - POST /api/diagrams - Save a diagram (create, or update when `id` is owned)
//! - GET /api/diagrams - List the caller's diagrams, latest first
//! - GET /api/diagrams/:id - Open one diagram
//! - DELETE /api/diagrams/:id - Delete a diagram

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::auth::{ApiError, AuthError, JwtService, extract_bearer_token};
use crate::core::db::models::{Diagram, DiagramId, SaveDiagram, SaveStatus};
use crate::core::db::repositories::{DiagramRepository, DiagramRepositoryError};

/// Diagram API state containing the diagram repository and JWT service
#[derive(Clone)]
pub struct DiagramApiState {
    pub diagram_repo: DiagramRepository,
    pub jwt_service: JwtService,
}

/// Diagram API error types
#[derive(Debug, thiserror::Error)]
pub enum DiagramApiError {
    #[error("Diagram not found")]
    NotFound,

    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<DiagramRepositoryError> for DiagramApiError {
    fn from(err: DiagramRepositoryError) -> Self {
        match err {
            DiagramRepositoryError::NotFound => DiagramApiError::NotFound,
            DiagramRepositoryError::Validation(msg) => DiagramApiError::BadRequest(msg),
            DiagramRepositoryError::DatabaseError(e) => {
                DiagramApiError::InternalError(e.to_string())
            }
        }
    }
}

impl From<AuthError> for DiagramApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingToken => DiagramApiError::Unauthorized,
            AuthError::TokenExpired => DiagramApiError::TokenExpired,
            AuthError::InternalError(e) => DiagramApiError::InternalError(e),
            _ => DiagramApiError::InvalidToken,
        }
    }
}

impl IntoResponse for DiagramApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            DiagramApiError::NotFound => (StatusCode::NOT_FOUND, "DIAGRAM_NOT_FOUND"),
            DiagramApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            DiagramApiError::InvalidToken => (StatusCode::UNAUTHORIZED, "INVALID_TOKEN"),
            DiagramApiError::TokenExpired => (StatusCode::UNAUTHORIZED, "TOKEN_EXPIRED"),
            DiagramApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            DiagramApiError::InternalError(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        };

        if status.is_server_error() {
            tracing::error!("Diagram request failed: {}", self);
        }

        let body = ApiError::new(self.to_string(), code);

        (status, Json(body)).into_response()
    }
}

// ============================================================================
// Request/Response DTOs
// ============================================================================

/// Request for saving a diagram
#[derive(Debug, Deserialize)]
pub struct SaveDiagramRequest {
    #[serde(default)]
    pub id: Option<DiagramId>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

impl SaveDiagramRequest {
    /// Check required fields and bind the request to its owner
    pub fn into_save(self, owner: &str) -> Result<SaveDiagram, DiagramApiError> {
        let content = self
            .content
            .ok_or_else(|| DiagramApiError::BadRequest("content is required".to_string()))?;

        Ok(SaveDiagram {
            owner: owner.to_string(),
            id: self.id,
            title: self.title,
            content,
        })
    }
}

/// Response for a save
#[derive(Debug, Serialize)]
pub struct SaveDiagramResponse {
    pub id: DiagramId,
    pub status: SaveStatus,
}

/// Response for a single diagram
#[derive(Debug, Serialize)]
pub struct DiagramResponse {
    pub id: DiagramId,
    pub title: String,
    pub content: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<Diagram> for DiagramResponse {
    fn from(diagram: Diagram) -> Self {
        Self {
            id: diagram.id,
            title: diagram.title,
            content: diagram.content,
            created_at: diagram.created_at,
            updated_at: diagram.updated_at,
        }
    }
}

/// Response for delete operation
#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub id: DiagramId,
    pub status: String,
}

// ============================================================================
// Router
// ============================================================================

/// Create the diagram API router
pub fn diagram_api_router(state: DiagramApiState) -> Router {
    let state = Arc::new(state);

    Router::new()
        .route(
            "/api/diagrams",
            get(list_diagrams_handler).post(save_diagram_handler),
        )
        .route(
            "/api/diagrams/{id}",
            get(get_diagram_handler).delete(delete_diagram_handler),
        )
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/diagrams
/// Save a diagram: update when `id` is present and owned, otherwise create
async fn save_diagram_handler(
    State(state): State<Arc<DiagramApiState>>,
    headers: HeaderMap,
    Json(request): Json<SaveDiagramRequest>,
) -> Result<(StatusCode, Json<SaveDiagramResponse>), DiagramApiError> {
    let owner = extract_owner(&state.jwt_service, &headers)?;
    let save = request.into_save(&owner)?;

    let (diagram, status) = state.diagram_repo.upsert(&save).await?;

    tracing::info!(diagram_id = diagram.id, owner = %owner, %status, "Diagram saved");

    let code = match status {
        SaveStatus::Created => StatusCode::CREATED,
        SaveStatus::Updated => StatusCode::OK,
    };

    Ok((
        code,
        Json(SaveDiagramResponse {
            id: diagram.id,
            status,
        }),
    ))
}

/// GET /api/diagrams
/// List the caller's diagrams
async fn list_diagrams_handler(
    State(state): State<Arc<DiagramApiState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<DiagramResponse>>, DiagramApiError> {
    let owner = extract_owner(&state.jwt_service, &headers)?;

    tracing::debug!("Listing diagrams for {}", owner);

    let diagrams = state.diagram_repo.list_by_owner(&owner).await?;

    Ok(Json(diagrams.into_iter().map(Into::into).collect()))
}

/// GET /api/diagrams/:id
/// Open one of the caller's diagrams
async fn get_diagram_handler(
    State(state): State<Arc<DiagramApiState>>,
    headers: HeaderMap,
    Path(id): Path<DiagramId>,
) -> Result<Json<DiagramResponse>, DiagramApiError> {
    let owner = extract_owner(&state.jwt_service, &headers)?;

    let diagram = state.diagram_repo.find_for_owner(id, &owner).await?;

    Ok(Json(diagram.into()))
}

/// DELETE /api/diagrams/:id
/// Delete one of the caller's diagrams
async fn delete_diagram_handler(
    State(state): State<Arc<DiagramApiState>>,
    headers: HeaderMap,
    Path(id): Path<DiagramId>,
) -> Result<Json<DeleteResponse>, DiagramApiError> {
    let owner = extract_owner(&state.jwt_service, &headers)?;

    state.diagram_repo.delete(id, &owner).await?;

    tracing::info!(diagram_id = id, owner = %owner, "Diagram deleted");

    Ok(Json(DeleteResponse {
        id,
        status: "deleted".to_string(),
    }))
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Resolve the bearer token in the Authorization header to its username
fn extract_owner(jwt_service: &JwtService, headers: &HeaderMap) -> Result<String, DiagramApiError> {
    let token = extract_bearer_token(headers)?;

    let claims = jwt_service
        .validate_access_token(&token)
        .map_err(AuthError::from)?;

    Ok(claims.sub)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, header};
    use tower::ServiceExt;

    use crate::core::auth::JwtConfig;
    use crate::core::db::pool::{DbConfig, create_pool_with_migrations};

    struct Harness {
        app: Router,
        jwt: JwtService,
    }

    impl Harness {
        async fn new() -> Self {
            let pool = create_pool_with_migrations(&DbConfig::in_memory())
                .await
                .unwrap();
            let jwt = JwtService::new(JwtConfig::new("test_secret"));
            let app = diagram_api_router(DiagramApiState {
                diagram_repo: DiagramRepository::new(pool),
                jwt_service: jwt.clone(),
            });
            Self { app, jwt }
        }

        fn bearer(&self, username: &str) -> String {
            format!(
                "Bearer {}",
                self.jwt.generate_access_token(username).unwrap().token
            )
        }

        async fn send(&self, request: Request<Body>) -> (StatusCode, serde_json::Value) {
            let response = self.app.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let body = if bytes.is_empty() {
                serde_json::Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, body)
        }

        async fn save(&self, user: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
            self.send(
                Request::post("/api/diagrams")
                    .header(header::AUTHORIZATION, self.bearer(user))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
        }

        async fn list(&self, user: &str) -> serde_json::Value {
            let (status, body) = self
                .send(
                    Request::get("/api/diagrams")
                        .header(header::AUTHORIZATION, self.bearer(user))
                        .body(Body::empty())
                        .unwrap(),
                )
                .await;
            assert_eq!(status, StatusCode::OK);
            body
        }

        async fn delete(&self, user: &str, id: i64) -> (StatusCode, serde_json::Value) {
            self.send(
                Request::delete(format!("/api/diagrams/{id}"))
                    .header(header::AUTHORIZATION, self.bearer(user))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
        }
    }

    #[test]
    fn test_save_request_requires_content() {
        let request: SaveDiagramRequest = serde_json::from_str(r#"{"title": "x"}"#).unwrap();
        assert!(matches!(
            request.into_save("alice"),
            Err(DiagramApiError::BadRequest(_))
        ));
    }

    #[test]
    fn test_save_request_deserialization() {
        let request: SaveDiagramRequest =
            serde_json::from_str(r#"{"id": 7, "content": "{\"shapes\":[]}"}"#).unwrap();
        let save = request.into_save("alice").unwrap();

        assert_eq!(save.id, Some(7));
        assert_eq!(save.owner, "alice");
        assert!(save.title.is_none());
        assert_eq!(save.content, r#"{"shapes":[]}"#);
    }

    #[tokio::test]
    async fn test_save_create_then_update() {
        let h = Harness::new().await;

        let (status, body) = h
            .save("alice", serde_json::json!({"title": "Sketch", "content": "X"}))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "created");
        let id = body["id"].as_i64().unwrap();

        let (status, body) = h
            .save("alice", serde_json::json!({"id": id, "content": "Y"}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "updated");
        assert_eq!(body["id"], id);

        let list = h.list("alice").await;
        let list = list.as_array().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0]["content"], "Y");
        assert_eq!(list[0]["title"], "Sketch");
    }

    #[tokio::test]
    async fn test_save_without_content_is_rejected() {
        let h = Harness::new().await;

        let (status, body) = h.save("alice", serde_json::json!({"title": "x"})).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "BAD_REQUEST");
        assert!(h.list("alice").await.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_with_overlong_title_is_rejected() {
        let h = Harness::new().await;
        let title = "t".repeat(crate::core::db::models::MAX_TITLE_LEN + 1);

        let (status, body) = h
            .save("alice", serde_json::json!({"title": title, "content": "X"}))
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "BAD_REQUEST");
        assert!(h.list("alice").await.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_requests_without_token_are_unauthorized() {
        let h = Harness::new().await;

        let (status, body) = h
            .send(Request::get("/api/diagrams").body(Body::empty()).unwrap())
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "UNAUTHORIZED");

        let (status, body) = h
            .send(
                Request::get("/api/diagrams")
                    .header(header::AUTHORIZATION, "Bearer forged")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "INVALID_TOKEN");
    }

    #[tokio::test]
    async fn test_list_is_isolated_per_owner() {
        let h = Harness::new().await;
        h.save("alice", serde_json::json!({"content": "A"})).await;
        h.save("bob", serde_json::json!({"content": "B"})).await;

        let alice = h.list("alice").await;
        assert_eq!(alice.as_array().unwrap().len(), 1);
        assert_eq!(alice[0]["content"], "A");
    }

    #[tokio::test]
    async fn test_open_foreign_diagram_is_not_found() {
        let h = Harness::new().await;
        let (_, body) = h.save("alice", serde_json::json!({"content": "A"})).await;
        let id = body["id"].as_i64().unwrap();

        let (status, _) = h
            .send(
                Request::get(format!("/api/diagrams/{id}"))
                    .header(header::AUTHORIZATION, h.bearer("bob"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = h
            .send(
                Request::get(format!("/api/diagrams/{id}"))
                    .header(header::AUTHORIZATION, h.bearer("alice"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["content"], "A");
    }

    #[tokio::test]
    async fn test_delete_nonexistent_is_not_found() {
        let h = Harness::new().await;

        let (status, body) = h.delete("alice", 42).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "DIAGRAM_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_delete_own_and_foreign() {
        let h = Harness::new().await;
        let (_, body) = h.save("alice", serde_json::json!({"content": "A"})).await;
        let id = body["id"].as_i64().unwrap();

        let (status, _) = h.delete("bob", id).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = h.delete("alice", id).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "deleted");
        assert!(h.list("alice").await.as_array().unwrap().is_empty());
    }
}
