//! Auth API endpoints
//!
//! Provides REST API endpoints for authentication:
//! - POST /api/auth/register - Register a new user
//! - POST /api/auth/login - Login and get a bearer token
//! - GET /api/auth/me - Get current user info

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use std::sync::Arc;

use crate::core::auth::{AuthError, AuthResponse, AuthService, LoginRequest, RegisterRequest};
use crate::core::db::models::UserResponse;

/// Auth API state containing the auth service
#[derive(Clone)]
pub struct AuthApiState {
    pub auth_service: AuthService,
}

/// API error response
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub code: String,
}

impl ApiError {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
        }
    }
}

/// Convert AuthError to API response
impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AuthError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS"),
            AuthError::UserNotFound => (StatusCode::NOT_FOUND, "USER_NOT_FOUND"),
            AuthError::UsernameAlreadyExists => (StatusCode::CONFLICT, "USERNAME_EXISTS"),
            AuthError::MissingToken => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "INVALID_TOKEN"),
            AuthError::TokenExpired => (StatusCode::UNAUTHORIZED, "TOKEN_EXPIRED"),
            AuthError::Validation(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            AuthError::InternalError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        if status.is_server_error() {
            tracing::error!("Auth request failed: {}", self);
        }

        let body = ApiError::new(self.to_string(), code);

        (status, Json(body)).into_response()
    }
}

/// Response for a successful registration
#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub message: String,
    pub user: UserResponse,
}

/// Create the auth API router
pub fn auth_api_router(state: AuthApiState) -> Router {
    let state = Arc::new(state);

    Router::new()
        .route("/api/auth/register", post(register_handler))
        .route("/api/auth/login", post(login_handler))
        .route("/api/auth/me", get(me_handler))
        .with_state(state)
}

/// POST /api/auth/register
/// Register a new user
async fn register_handler(
    State(state): State<Arc<AuthApiState>>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AuthError> {
    tracing::info!("Registration attempt for username: {:?}", request.username);

    let user = state.auth_service.register(request).await?;

    tracing::info!("User registered successfully: {}", user.username);

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "Registered successfully".to_string(),
            user,
        }),
    ))
}

/// POST /api/auth/login
/// Login and get a bearer token
async fn login_handler(
    State(state): State<Arc<AuthApiState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AuthError> {
    tracing::info!("Login attempt for username: {:?}", request.username);

    let response = state.auth_service.login(request).await?;

    tracing::info!("User logged in successfully: {}", response.user.username);

    Ok(Json(response))
}

/// GET /api/auth/me
/// Get current user info from the bearer token
async fn me_handler(
    State(state): State<Arc<AuthApiState>>,
    headers: HeaderMap,
) -> Result<Json<UserResponse>, AuthError> {
    let token = extract_bearer_token(&headers)?;

    let user = state.auth_service.get_current_user(&token).await?;

    Ok(Json(user))
}

/// Extract Bearer token from Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<String, AuthError> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingToken)?;

    let Some(token) = auth_header.strip_prefix("Bearer ") else {
        return Err(AuthError::InvalidToken);
    };

    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::InvalidToken);
    }

    Ok(token.to_string())
}
