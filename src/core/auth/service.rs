//! Authentication service
//!
//! Provides business logic for user registration, login and token validation.
//! Coordinates between the user repository and the JWT service.

use crate::core::auth::jwt::{AccessToken, JwtError, JwtService};
use crate::core::db::models::UserResponse;
use crate::core::db::repositories::{UserRepository, UserRepositoryError};

/// Maximum accepted username length
const MAX_USERNAME_LEN: usize = 64;

/// Authentication service error types
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("User not found")]
    UserNotFound,

    #[error("Username already taken")]
    UsernameAlreadyExists,

    #[error("Authentication required")]
    MissingToken,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<UserRepositoryError> for AuthError {
    fn from(err: UserRepositoryError) -> Self {
        match err {
            UserRepositoryError::NotFound => AuthError::UserNotFound,
            UserRepositoryError::UsernameAlreadyExists => AuthError::UsernameAlreadyExists,
            _ => AuthError::InternalError(err.to_string()),
        }
    }
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Expired => AuthError::TokenExpired,
            JwtError::InvalidToken | JwtError::DecodingError(_) => AuthError::InvalidToken,
            _ => AuthError::InternalError(err.to_string()),
        }
    }
}

/// Registration request data
#[derive(Debug, Clone, serde::Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// Login request data
#[derive(Debug, Clone, serde::Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// Authentication response with user data and token
#[derive(Debug, Clone, serde::Serialize)]
pub struct AuthResponse {
    pub user: UserResponse,
    #[serde(flatten)]
    pub token: AccessToken,
}

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    user_repo: UserRepository,
    jwt_service: JwtService,
}

impl AuthService {
    /// Create a new authentication service
    pub fn new(user_repo: UserRepository, jwt_service: JwtService) -> Self {
        Self {
            user_repo,
            jwt_service,
        }
    }

    /// Token validator shared with the other routers
    pub fn jwt_service(&self) -> &JwtService {
        &self.jwt_service
    }

    fn require_field<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, AuthError> {
        match value.as_deref() {
            Some(v) if !v.is_empty() => Ok(v),
            _ => Err(AuthError::Validation(format!("{name} is required"))),
        }
    }

    /// Validate username format
    fn validate_username(username: &str) -> Result<(), AuthError> {
        if username.trim() != username {
            return Err(AuthError::Validation(
                "username must not start or end with whitespace".to_string(),
            ));
        }

        if username.chars().count() > MAX_USERNAME_LEN {
            return Err(AuthError::Validation(format!(
                "username must be at most {MAX_USERNAME_LEN} characters"
            )));
        }

        Ok(())
    }

    /// Register a new user
    pub async fn register(&self, request: RegisterRequest) -> Result<UserResponse, AuthError> {
        let username = Self::require_field(&request.username, "username")?;
        let password = Self::require_field(&request.password, "password")?;
        Self::validate_username(username)?;

        let user = self.user_repo.create(username, password).await?;

        Ok(user.into())
    }

    /// Login with username and password
    pub async fn login(&self, request: LoginRequest) -> Result<AuthResponse, AuthError> {
        let username = Self::require_field(&request.username, "username")?;
        let password = Self::require_field(&request.password, "password")?;

        let user = self
            .user_repo
            .verify_credentials(username, password)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        let token = self.jwt_service.generate_access_token(&user.username)?;

        Ok(AuthResponse {
            user: user.into(),
            token,
        })
    }

    /// Validate a bearer token and return the username it was issued to
    pub fn validate_access_token(&self, token: &str) -> Result<String, AuthError> {
        let claims = self.jwt_service.validate_access_token(token)?;
        Ok(claims.sub)
    }

    /// Resolve a bearer token to the stored user
    pub async fn get_current_user(&self, token: &str) -> Result<UserResponse, AuthError> {
        let username = self.validate_access_token(token)?;

        // A token for a user that no longer exists is no longer valid
        let user = self
            .user_repo
            .find_by_username(&username)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        Ok(user.into())
    }
}
