//! Authentication module
//!
//! This module provides the identity service the rest of the backend calls into:
//! - Bearer token generation and validation
//! - User registration and login
//! - REST API endpoints for auth operations

pub mod api;
pub mod jwt;
pub mod service;

pub use api::{ApiError, AuthApiState, auth_api_router, extract_bearer_token};
pub use jwt::{AccessToken, Claims, JwtConfig, JwtError, JwtService};
pub use service::{AuthError, AuthResponse, AuthService, LoginRequest, RegisterRequest};
