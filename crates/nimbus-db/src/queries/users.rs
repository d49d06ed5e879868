//! Database query functions for the `users` table.

use sqlx::PgPool;

use crate::error::{StoreError, StoreResult};
use crate::models::User;

/// Create a user, or return the existing row if `owner_id` is already
/// registered. Used by the API to lazily register a caller on first use.
pub async fn get_or_create(pool: &PgPool, owner_id: i64, name: &str) -> StoreResult<User> {
    if owner_id <= 0 {
        return Err(StoreError::validation("owner_id must be > 0"));
    }

    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (owner_id, name) VALUES ($1, $2) \
         ON CONFLICT (owner_id) DO UPDATE SET owner_id = users.owner_id \
         RETURNING *",
    )
    .bind(owner_id)
    .bind(name)
    .fetch_one(pool)
    .await?;

    Ok(user)
}

/// Fetch a user by id.
pub async fn get_by_id(pool: &PgPool, owner_id: i64) -> StoreResult<User> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE owner_id = $1")
        .bind(owner_id)
        .fetch_optional(pool)
        .await?;

    user.ok_or(StoreError::NotFound)
}

/// List all registered users, newest first.
pub async fn list(pool: &PgPool) -> StoreResult<Vec<User>> {
    let users = sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY created_at DESC")
        .fetch_all(pool)
        .await?;
    Ok(users)
}
