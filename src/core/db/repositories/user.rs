//! User repository for database operations
//!
//! Stores registered users with bcrypt password hashes.

use chrono::Utc;
use sqlx::SqlitePool;

use crate::core::db::models::User;

/// Cost factor for bcrypt hashing (12 is recommended for production)
const BCRYPT_COST: u32 = 12;

/// User repository error types
#[derive(Debug, thiserror::Error)]
pub enum UserRepositoryError {
    #[error("User not found")]
    NotFound,

    #[error("Username already exists")]
    UsernameAlreadyExists,

    #[error("Password hashing failed: {0}")]
    HashingError(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

/// User repository for database operations
#[derive(Clone)]
pub struct UserRepository {
    pool: SqlitePool,
    bcrypt_cost: u32,
}

impl UserRepository {
    /// Create a new user repository
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            bcrypt_cost: BCRYPT_COST,
        }
    }

    /// Override the bcrypt cost (tests use the minimum to stay fast)
    pub fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }

    /// Hash a password using bcrypt with automatic salt generation
    pub fn hash_password(&self, password: &str) -> Result<String, UserRepositoryError> {
        bcrypt::hash(password, self.bcrypt_cost)
            .map_err(|e| UserRepositoryError::HashingError(e.to_string()))
    }

    /// Verify a password against a bcrypt hash
    pub fn verify_password(password: &str, hash: &str) -> Result<bool, UserRepositoryError> {
        bcrypt::verify(password, hash).map_err(|e| UserRepositoryError::HashingError(e.to_string()))
    }

    /// Create a new user with a plain text password (will be hashed)
    pub async fn create(&self, username: &str, password: &str) -> Result<User, UserRepositoryError> {
        if self.find_by_username(username).await?.is_some() {
            return Err(UserRepositoryError::UsernameAlreadyExists);
        }

        let password_hash = self.hash_password(password)?;

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, password_hash, created_at)
            VALUES (?, ?, ?)
            RETURNING id, username, password_hash, created_at
            "#,
        )
        .bind(username)
        .bind(&password_hash)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            // Lost a race with a concurrent registration of the same name
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                UserRepositoryError::UsernameAlreadyExists
            }
            other => UserRepositoryError::DatabaseError(other),
        })?;

        Ok(user)
    }

    /// Find a user by username
    pub async fn find_by_username(&self, username: &str) -> Result<Option<User>, UserRepositoryError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, password_hash, created_at
            FROM users
            WHERE username = ?
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Look up a user and check the password. `None` covers both an unknown
    /// username and a wrong password.
    pub async fn verify_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<User>, UserRepositoryError> {
        let Some(user) = self.find_by_username(username).await? else {
            return Ok(None);
        };

        if Self::verify_password(password, &user.password_hash)? {
            Ok(Some(user))
        } else {
            Ok(None)
        }
    }
}
