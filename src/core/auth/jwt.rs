//! JWT utilities for token generation and validation
//!
//! Provides bearer token creation and validation using the HS256 algorithm.
//! Tokens carry the username as subject and live for 60 minutes by default.

use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default access token expiration time (60 minutes)
const ACCESS_TOKEN_EXPIRATION_MINUTES: i64 = 60;

/// Token issuer
const DEFAULT_ISSUER: &str = "whiteboard";

/// Signing secret used by debug builds when `JWT_SECRET` is unset
const DEV_SECRET: &str = "whiteboard_dev_secret_key_not_for_production_32chars";

/// JWT configuration
#[derive(Clone)]
pub struct JwtConfig {
    /// Secret key for signing tokens
    pub secret: String,
    /// Access token expiration in minutes
    pub access_token_expiration_minutes: i64,
    /// Token issuer
    pub issuer: String,
}

impl JwtConfig {
    /// Create a new JWT configuration
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            access_token_expiration_minutes: ACCESS_TOKEN_EXPIRATION_MINUTES,
            issuer: DEFAULT_ISSUER.to_string(),
        }
    }

    /// Create config from environment variables
    pub fn from_env() -> Result<Self, JwtError> {
        let secret = std::env::var("JWT_SECRET").map_err(|_| JwtError::MissingSecret)?;
        Ok(Self::new(secret).with_env_overrides())
    }

    /// Like `from_env`, but debug builds fall back to a fixed development secret
    pub fn from_env_or_dev() -> Result<Self, JwtError> {
        match Self::from_env() {
            Ok(config) => Ok(config),
            Err(JwtError::MissingSecret) if cfg!(debug_assertions) => {
                tracing::warn!("JWT_SECRET not set, using the development secret");
                Ok(Self::new(DEV_SECRET).with_env_overrides())
            }
            Err(e) => Err(e),
        }
    }

    fn with_env_overrides(mut self) -> Self {
        if let Some(minutes) = std::env::var("JWT_ACCESS_EXPIRATION_MINUTES")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.access_token_expiration_minutes = minutes;
        }
        if let Ok(issuer) = std::env::var("JWT_ISSUER") {
            self.issuer = issuer;
        }
        self
    }

    /// Set access token expiration
    pub fn access_token_expiration(mut self, minutes: i64) -> Self {
        self.access_token_expiration_minutes = minutes;
        self
    }

    /// Set issuer
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }
}

/// JWT errors
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("JWT_SECRET environment variable not set")]
    MissingSecret,

    #[error("Token encoding failed: {0}")]
    EncodingError(String),

    #[error("Token decoding failed: {0}")]
    DecodingError(String),

    #[error("Token expired")]
    Expired,

    #[error("Invalid token")]
    InvalidToken,
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => JwtError::Expired,
            ErrorKind::InvalidToken
            | ErrorKind::InvalidSignature
            | ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidIssuer => JwtError::InvalidToken,
            _ => JwtError::DecodingError(err.to_string()),
        }
    }
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (username)
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issuer
    pub iss: String,
    /// JWT ID (unique identifier for this token)
    pub jti: String,
}

/// Issued bearer token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessToken {
    pub token: String,
    /// Expiration (Unix timestamp)
    pub expires_at: i64,
    /// Always "Bearer"
    pub token_type: String,
}

/// JWT service for token operations
#[derive(Clone)]
pub struct JwtService {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtService {
    /// Create a new JWT service
    pub fn new(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    /// Generate an access token for a username
    pub fn generate_access_token(&self, username: &str) -> Result<AccessToken, JwtError> {
        let now = Utc::now();
        let exp = now + Duration::minutes(self.config.access_token_expiration_minutes);

        let claims = Claims {
            sub: username.to_string(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
            iss: self.config.issuer.clone(),
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| JwtError::EncodingError(e.to_string()))?;

        Ok(AccessToken {
            token,
            expires_at: exp.timestamp(),
            token_type: "Bearer".to_string(),
        })
    }

    /// Validate and decode a token
    pub fn validate_access_token(&self, token: &str) -> Result<Claims, JwtError> {
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.config.issuer]);
        // Set leeway to 0 for strict expiration checking
        validation.leeway = 0;

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation)?;

        if token_data.claims.sub.is_empty() {
            return Err(JwtError::InvalidToken);
        }

        Ok(token_data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_service() -> JwtService {
        JwtService::new(JwtConfig::new("test_secret_key_for_testing_only_32bytes!"))
    }

    #[test]
    fn test_jwt_config_new() {
        let config = JwtConfig::new("my_secret");

        assert_eq!(config.secret, "my_secret");
        assert_eq!(
            config.access_token_expiration_minutes,
            ACCESS_TOKEN_EXPIRATION_MINUTES
        );
        assert_eq!(config.issuer, DEFAULT_ISSUER);
    }

    #[test]
    fn test_jwt_config_builder() {
        let config = JwtConfig::new("secret")
            .access_token_expiration(30)
            .issuer("my_app");

        assert_eq!(config.access_token_expiration_minutes, 30);
        assert_eq!(config.issuer, "my_app");
    }

    #[test]
    fn test_generate_and_validate_token() {
        let service = create_test_service();

        let token = service.generate_access_token("alice").unwrap();
        assert_eq!(token.token_type, "Bearer");
        assert!(token.expires_at > Utc::now().timestamp());

        let claims = service.validate_access_token(&token.token).unwrap();
        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.iss, DEFAULT_ISSUER);
    }

    #[test]
    fn test_expired_token_rejected() {
        let service =
            JwtService::new(JwtConfig::new("test_secret").access_token_expiration(-5));

        let token = service.generate_access_token("alice").unwrap();
        let result = service.validate_access_token(&token.token);

        assert!(matches!(result, Err(JwtError::Expired)));
    }

    #[test]
    fn test_token_from_other_secret_rejected() {
        let other = JwtService::new(JwtConfig::new("a_completely_different_secret"));
        let token = other.generate_access_token("alice").unwrap();

        let result = create_test_service().validate_access_token(&token.token);
        assert!(matches!(result, Err(JwtError::InvalidToken)));
    }

    #[test]
    fn test_garbage_token_rejected() {
        let result = create_test_service().validate_access_token("not.a.jwt");
        assert!(result.is_err());
    }
}
