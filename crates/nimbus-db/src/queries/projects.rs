//! Database query functions for the `projects` table.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::models::{Project, ADMIN};
use crate::pagination::Page;

/// Create a project. Fails with [`StoreError::Conflict`] if `(owner_id,
/// name)` collides with a live (non soft-deleted) project.
pub async fn create(pool: &PgPool, owner_id: i64, name: &str) -> StoreResult<Project> {
    if owner_id <= 0 {
        return Err(StoreError::validation("owner_id must be > 0"));
    }
    if name.trim().is_empty() {
        return Err(StoreError::validation("name must not be empty"));
    }

    let existing = sqlx::query_scalar::<_, i64>(
        "SELECT 1 FROM projects WHERE owner_id = $1 AND name = $2 AND deleted_at IS NULL",
    )
    .bind(owner_id)
    .bind(name)
    .fetch_optional(pool)
    .await?;
    if existing.is_some() {
        return Err(StoreError::conflict(format!(
            "project {name:?} already exists for this owner"
        )));
    }

    let project = sqlx::query_as::<_, Project>(
        "INSERT INTO projects (owner_id, name) VALUES ($1, $2) RETURNING *",
    )
    .bind(owner_id)
    .bind(name)
    .fetch_one(pool)
    .await?;

    Ok(project)
}

/// Fetch a project by id, tenancy-enforced.
pub async fn get_by_id(pool: &PgPool, owner_id: i64, id: Uuid) -> StoreResult<Project> {
    let project = if owner_id == ADMIN {
        sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE id = $1 AND deleted_at IS NULL")
            .bind(id)
            .fetch_optional(pool)
            .await?
    } else {
        sqlx::query_as::<_, Project>(
            "SELECT * FROM projects WHERE id = $1 AND owner_id = $2 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(owner_id)
        .fetch_optional(pool)
        .await?
    };
    project.ok_or(StoreError::NotFound)
}

/// Fetch a project by name, tenancy-enforced.
pub async fn get_by_name(pool: &PgPool, owner_id: i64, name: &str) -> StoreResult<Project> {
    let project = if owner_id == ADMIN {
        sqlx::query_as::<_, Project>(
            "SELECT * FROM projects WHERE name = $1 AND deleted_at IS NULL",
        )
        .bind(name)
        .fetch_optional(pool)
        .await?
    } else {
        sqlx::query_as::<_, Project>(
            "SELECT * FROM projects WHERE name = $1 AND owner_id = $2 AND deleted_at IS NULL",
        )
        .bind(name)
        .bind(owner_id)
        .fetch_optional(pool)
        .await?
    };
    project.ok_or(StoreError::NotFound)
}

/// List live projects, tenancy-enforced, newest first.
pub async fn list(pool: &PgPool, owner_id: i64, page: Page) -> StoreResult<Vec<Project>> {
    let projects = if owner_id == ADMIN {
        sqlx::query_as::<_, Project>(
            "SELECT * FROM projects WHERE deleted_at IS NULL \
             ORDER BY created_at DESC OFFSET $1 LIMIT $2",
        )
        .bind(page.offset)
        .bind(page.limit)
        .fetch_all(pool)
        .await?
    } else {
        sqlx::query_as::<_, Project>(
            "SELECT * FROM projects WHERE owner_id = $1 AND deleted_at IS NULL \
             ORDER BY created_at DESC OFFSET $2 LIMIT $3",
        )
        .bind(owner_id)
        .bind(page.offset)
        .bind(page.limit)
        .fetch_all(pool)
        .await?
    };
    Ok(projects)
}

/// Soft-delete a project, tenancy-enforced. Idempotent.
pub async fn soft_delete(pool: &PgPool, owner_id: i64, id: Uuid) -> StoreResult<()> {
    let result = if owner_id == ADMIN {
        sqlx::query(
            "UPDATE projects SET deleted_at = now(), updated_at = now() \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(pool)
        .await?
    } else {
        sqlx::query(
            "UPDATE projects SET deleted_at = now(), updated_at = now() \
             WHERE id = $1 AND owner_id = $2 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(owner_id)
        .execute(pool)
        .await?
    };

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound);
    }
    Ok(())
}
