//! Database models for the whiteboard backend
//!
//! This module defines the database entity structs that map to SQLite tables.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Title given to diagrams saved without one
pub const DEFAULT_DIAGRAM_TITLE: &str = "Untitled";

/// Longest accepted diagram title, in characters
pub const MAX_TITLE_LEN: usize = 255;

/// Diagram identifier, assigned by the store and never reused
pub type DiagramId = i64;

// ============================================================================
// User Model
// ============================================================================

/// User entity representing a registered user
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// User without sensitive data (for API responses)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            created_at: user.created_at,
        }
    }
}

// ============================================================================
// Diagram Model
// ============================================================================

/// One saved drawing. `content` is an opaque payload and is never inspected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Diagram {
    pub id: DiagramId,
    pub owner: String,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Diagram data for creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDiagram {
    pub owner: String,
    pub title: Option<String>,
    pub content: String,
}

impl CreateDiagram {
    pub fn new(owner: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            title: None,
            content: content.into(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Title to store, falling back to the placeholder for missing or blank input
    pub fn resolved_title(&self) -> String {
        normalize_title(self.title.as_deref()).unwrap_or_else(|| DEFAULT_DIAGRAM_TITLE.to_string())
    }
}

/// Diagram save request as the store sees it: create when `id` is absent or
/// not owned by `owner`, update otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveDiagram {
    pub owner: String,
    pub id: Option<DiagramId>,
    pub title: Option<String>,
    pub content: String,
}

/// Whether a save produced a new row or replaced an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveStatus {
    Created,
    Updated,
}

impl std::fmt::Display for SaveStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SaveStatus::Created => write!(f, "created"),
            SaveStatus::Updated => write!(f, "updated"),
        }
    }
}

/// Trimmed title, or `None` when nothing usable was supplied
pub fn normalize_title(title: Option<&str>) -> Option<String> {
    title
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}
