//! Database query functions for the `ssh_keys` table.

use sqlx::PgPool;

use crate::error::{StoreError, StoreResult};
use crate::models::SshKey;

/// Create or replace an SSH key for an owner.
pub async fn upsert(pool: &PgPool, owner_id: i64, name: &str, public_key: &str) -> StoreResult<SshKey> {
    if owner_id <= 0 {
        return Err(StoreError::validation("owner_id must be > 0"));
    }
    if public_key.trim().is_empty() {
        return Err(StoreError::validation("public_key must not be empty"));
    }

    let key = sqlx::query_as::<_, SshKey>(
        "INSERT INTO ssh_keys (owner_id, name, public_key) VALUES ($1, $2, $3) \
         ON CONFLICT (owner_id, name) DO UPDATE SET public_key = EXCLUDED.public_key \
         RETURNING *",
    )
    .bind(owner_id)
    .bind(name)
    .bind(public_key)
    .fetch_one(pool)
    .await?;

    Ok(key)
}

/// Fetch an SSH key by (owner_id, name).
pub async fn get_by_name(pool: &PgPool, owner_id: i64, name: &str) -> StoreResult<SshKey> {
    let key = sqlx::query_as::<_, SshKey>(
        "SELECT * FROM ssh_keys WHERE owner_id = $1 AND name = $2",
    )
    .bind(owner_id)
    .bind(name)
    .fetch_optional(pool)
    .await?;

    key.ok_or(StoreError::NotFound)
}

/// List every SSH key registered to an owner.
pub async fn list(pool: &PgPool, owner_id: i64) -> StoreResult<Vec<SshKey>> {
    let keys = sqlx::query_as::<_, SshKey>(
        "SELECT * FROM ssh_keys WHERE owner_id = $1 ORDER BY name ASC",
    )
    .bind(owner_id)
    .fetch_all(pool)
    .await?;
    Ok(keys)
}

/// Delete an SSH key by (owner_id, name).
pub async fn delete(pool: &PgPool, owner_id: i64, name: &str) -> StoreResult<()> {
    let result = sqlx::query("DELETE FROM ssh_keys WHERE owner_id = $1 AND name = $2")
        .bind(owner_id)
        .bind(name)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound);
    }
    Ok(())
}
