//! Diagram repository for database operations
//!
//! Provides the diagram store used by the REST surface and by live sessions:
//! - Create, update, upsert, list, open and delete
//! - Ownership enforcement on every operation that touches an existing row
//! - Last-write-wins: an update replaces the content wholesale

use chrono::Utc;
use sqlx::SqlitePool;

use crate::core::db::models::{
    CreateDiagram, Diagram, DiagramId, MAX_TITLE_LEN, SaveDiagram, SaveStatus,
};

const DIAGRAM_COLUMNS: &str = "id, owner, title, content, created_at, updated_at";

/// Diagram repository error types
#[derive(Debug, thiserror::Error)]
pub enum DiagramRepositoryError {
    /// No diagram with that id, or it belongs to someone else
    #[error("Diagram not found")]
    NotFound,

    /// Input the store refuses before touching the database
    #[error("Invalid diagram: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

fn check_title(title: Option<&str>) -> Result<(), DiagramRepositoryError> {
    match title {
        Some(title) if title.chars().count() > MAX_TITLE_LEN => {
            Err(DiagramRepositoryError::Validation(format!(
                "title too long (max {MAX_TITLE_LEN} characters)"
            )))
        }
        _ => Ok(()),
    }
}

/// Diagram repository for database operations
#[derive(Debug, Clone)]
pub struct DiagramRepository {
    pool: SqlitePool,
}

impl DiagramRepository {
    /// Create a new diagram repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new diagram with a freshly assigned id
    pub async fn create(&self, dto: &CreateDiagram) -> Result<Diagram, DiagramRepositoryError> {
        check_title(dto.title.as_deref())?;
        let now = Utc::now();

        let diagram = sqlx::query_as::<_, Diagram>(&format!(
            r#"
            INSERT INTO diagrams (owner, title, content, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING {DIAGRAM_COLUMNS}
            "#
        ))
        .bind(&dto.owner)
        .bind(dto.resolved_title())
        .bind(&dto.content)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(diagram)
    }

    /// Replace the content of a diagram owned by `owner`.
    ///
    /// A `title` of `None` keeps the stored title.
    pub async fn update(
        &self,
        id: DiagramId,
        owner: &str,
        title: Option<&str>,
        content: &str,
    ) -> Result<Diagram, DiagramRepositoryError> {
        check_title(title)?;

        let diagram = sqlx::query_as::<_, Diagram>(&format!(
            r#"
            UPDATE diagrams
            SET content = ?, title = COALESCE(?, title), updated_at = ?
            WHERE id = ? AND owner = ?
            RETURNING {DIAGRAM_COLUMNS}
            "#
        ))
        .bind(content)
        .bind(title)
        .bind(Utc::now())
        .bind(id)
        .bind(owner)
        .fetch_optional(&self.pool)
        .await?;

        diagram.ok_or(DiagramRepositoryError::NotFound)
    }

    /// Update when `id` names a diagram owned by the caller, otherwise create.
    ///
    /// An id belonging to another owner never takes over their row; the save
    /// lands in a new diagram instead.
    pub async fn upsert(
        &self,
        dto: &SaveDiagram,
    ) -> Result<(Diagram, SaveStatus), DiagramRepositoryError> {
        let title = crate::core::db::models::normalize_title(dto.title.as_deref());

        if let Some(id) = dto.id {
            match self
                .update(id, &dto.owner, title.as_deref(), &dto.content)
                .await
            {
                Ok(diagram) => return Ok((diagram, SaveStatus::Updated)),
                Err(DiagramRepositoryError::NotFound) => {
                    tracing::debug!(
                        diagram_id = id,
                        owner = %dto.owner,
                        "Save referenced an unknown or foreign diagram, creating a new one"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        let create = CreateDiagram {
            owner: dto.owner.clone(),
            title,
            content: dto.content.clone(),
        };

        let diagram = self.create(&create).await?;
        Ok((diagram, SaveStatus::Created))
    }

    /// Open a diagram owned by `owner`
    pub async fn find_for_owner(
        &self,
        id: DiagramId,
        owner: &str,
    ) -> Result<Diagram, DiagramRepositoryError> {
        let diagram = sqlx::query_as::<_, Diagram>(&format!(
            "SELECT {DIAGRAM_COLUMNS} FROM diagrams WHERE id = ? AND owner = ?"
        ))
        .bind(id)
        .bind(owner)
        .fetch_optional(&self.pool)
        .await?;

        diagram.ok_or(DiagramRepositoryError::NotFound)
    }

    /// List diagrams owned by a user, most recently saved first
    pub async fn list_by_owner(&self, owner: &str) -> Result<Vec<Diagram>, DiagramRepositoryError> {
        let diagrams = sqlx::query_as::<_, Diagram>(&format!(
            r#"
            SELECT {DIAGRAM_COLUMNS}
            FROM diagrams
            WHERE owner = ?
            ORDER BY updated_at DESC, id DESC
            "#
        ))
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        Ok(diagrams)
    }

    /// Delete a diagram owned by `owner`. Irreversible.
    pub async fn delete(&self, id: DiagramId, owner: &str) -> Result<(), DiagramRepositoryError> {
        let result = sqlx::query("DELETE FROM diagrams WHERE id = ? AND owner = ?")
            .bind(id)
            .bind(owner)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DiagramRepositoryError::NotFound);
        }

        Ok(())
    }
}
