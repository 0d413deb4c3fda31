//! HTTP application assembly
//!
//! Merges the auth, diagram and collaboration routers into one axum app and
//! wraps it in CORS and compression. When the frontend build directory
//! exists it is served as a single-page app.

use std::path::PathBuf;

use axum::{Json, Router, extract::State, http::StatusCode, routing::get};
use sqlx::SqlitePool;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};

use crate::core::auth::{AuthApiState, AuthService, JwtService, auth_api_router};
use crate::core::collab::{CollabManager, CollabState, collab_router};
use crate::core::config::Config;
use crate::core::db::pool::health_check;
use crate::core::db::repositories::{DiagramRepository, UserRepository};
use crate::core::diagrams::{DiagramApiState, diagram_api_router};

/// Everything the routers need, built once at startup
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub auth_service: AuthService,
    pub diagram_repo: DiagramRepository,
    pub collab: CollabState,
    /// Frontend build directory, if it should be served
    pub static_dir: Option<PathBuf>,
}

impl AppState {
    /// Wire repositories and services over one pool
    pub fn new(pool: SqlitePool, jwt_service: JwtService, config: &Config) -> Self {
        let diagram_repo = DiagramRepository::new(pool.clone());
        let auth_service = AuthService::new(UserRepository::new(pool.clone()), jwt_service.clone());

        let manager =
            CollabManager::new(diagram_repo.clone()).outbound_capacity(config.outbound_capacity);
        let collab =
            CollabState::new(manager, jwt_service).with_idle_timeout(config.idle_timeout);

        let static_dir = PathBuf::from(&config.static_dir);
        let static_dir = static_dir.is_dir().then_some(static_dir);

        Self {
            pool,
            auth_service,
            diagram_repo,
            collab,
            static_dir,
        }
    }
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let jwt_service = state.auth_service.jwt_service().clone();

    let mut app = Router::new()
        .route("/api/health", get(health_handler).with_state(state.pool.clone()))
        .merge(auth_api_router(AuthApiState {
            auth_service: state.auth_service.clone(),
        }))
        .merge(diagram_api_router(DiagramApiState {
            diagram_repo: state.diagram_repo.clone(),
            jwt_service,
        }))
        .merge(collab_router(state.collab.clone()));

    if let Some(dir) = state.static_dir {
        tracing::info!("Serving frontend from {}", dir.display());
        let spa = ServeDir::new(&dir).fallback(ServeFile::new(dir.join("index.html")));
        app = app.fallback_service(spa);
    }

    app.layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
}

/// GET /api/health
async fn health_handler(
    State(pool): State<SqlitePool>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    match health_check(&pool).await {
        Ok(()) => Ok(Json(serde_json::json!({ "status": "ok" }))),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}
