//! Database query functions for the `instances` table.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::models::{StatusFilterMode, Instance, InstanceStatus, ADMIN};
use crate::pagination::Page;

/// Filter for [`list`].
#[derive(Debug, Clone, Default)]
pub struct InstanceFilter {
    pub status: Option<InstanceStatus>,
    pub status_filter: StatusFilterModeOrDefault,
    pub include_deleted: bool,
}

/// Wraps [`StatusFilterMode`] with an `Equal` default so callers don't need
/// to specify it when only filtering by presence/absence of `status`.
#[derive(Debug, Clone, Copy)]
pub struct StatusFilterModeOrDefault(pub StatusFilterMode);

impl Default for StatusFilterModeOrDefault {
    fn default() -> Self {
        Self(StatusFilterMode::Equal)
    }
}

#[derive(Debug, Clone)]
pub struct NewInstance {
    pub owner_id: i64,
    pub project_id: Uuid,
    pub name: String,
    pub provider_id: String,
    pub region: String,
    pub size: String,
    pub image: String,
    pub tags: Vec<String>,
}

/// Insert a new instance row with status `pending`.
pub async fn create(pool: &PgPool, new: &NewInstance) -> StoreResult<Instance> {
    if new.owner_id <= 0 {
        return Err(StoreError::validation("owner_id must be > 0"));
    }

    let instance = sqlx::query_as::<_, Instance>(
        "INSERT INTO instances \
            (owner_id, project_id, name, provider_id, region, size, image, tags, status) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending') \
         RETURNING *",
    )
    .bind(new.owner_id)
    .bind(new.project_id)
    .bind(&new.name)
    .bind(&new.provider_id)
    .bind(&new.region)
    .bind(&new.size)
    .bind(&new.image)
    .bind(&new.tags)
    .fetch_one(pool)
    .await?;

    Ok(instance)
}

/// Insert many instance rows in one round trip.
pub async fn create_batch(pool: &PgPool, news: &[NewInstance]) -> StoreResult<Vec<Instance>> {
    let mut created = Vec::with_capacity(news.len());
    // sqlx's Postgres driver has no ergonomic multi-row `INSERT ... VALUES`
    // binder for heterogeneous arrays of strings/tags here, so we issue one
    // insert per row inside a single transaction -- still one network round
    // trip per statement but atomic as a unit.
    let mut tx = pool.begin().await?;
    for new in news {
        if new.owner_id <= 0 {
            return Err(StoreError::validation("owner_id must be > 0"));
        }
        let instance = sqlx::query_as::<_, Instance>(
            "INSERT INTO instances \
                (owner_id, project_id, name, provider_id, region, size, image, tags, status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending') \
             RETURNING *",
        )
        .bind(new.owner_id)
        .bind(new.project_id)
        .bind(&new.name)
        .bind(&new.provider_id)
        .bind(&new.region)
        .bind(&new.size)
        .bind(&new.image)
        .bind(&new.tags)
        .fetch_one(&mut *tx)
        .await?;
        created.push(instance);
    }
    tx.commit().await?;
    Ok(created)
}

/// Fetch an instance by id, tenancy-enforced.
pub async fn get_by_id(pool: &PgPool, owner_id: i64, id: Uuid) -> StoreResult<Instance> {
    let instance = if owner_id == ADMIN {
        sqlx::query_as::<_, Instance>("SELECT * FROM instances WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?
    } else {
        sqlx::query_as::<_, Instance>("SELECT * FROM instances WHERE id = $1 AND owner_id = $2")
            .bind(id)
            .bind(owner_id)
            .fetch_optional(pool)
            .await?
    };
    instance.ok_or(StoreError::NotFound)
}

/// Fetch instances by name within a project, tenancy-enforced. Excludes
/// soft-deleted rows.
pub async fn get_by_names(
    pool: &PgPool,
    owner_id: i64,
    project_id: Uuid,
    names: &[String],
) -> StoreResult<Vec<Instance>> {
    let instances = if owner_id == ADMIN {
        sqlx::query_as::<_, Instance>(
            "SELECT * FROM instances \
             WHERE project_id = $1 AND name = ANY($2) AND deleted_at IS NULL",
        )
        .bind(project_id)
        .bind(names)
        .fetch_all(pool)
        .await?
    } else {
        sqlx::query_as::<_, Instance>(
            "SELECT * FROM instances \
             WHERE project_id = $1 AND name = ANY($2) AND owner_id = $3 AND deleted_at IS NULL",
        )
        .bind(project_id)
        .bind(names)
        .bind(owner_id)
        .fetch_all(pool)
        .await?
    };
    Ok(instances)
}

/// Fetch every live instance in a project, tenancy-enforced, oldest first.
pub async fn get_by_project_id(
    pool: &PgPool,
    owner_id: i64,
    project_id: Uuid,
) -> StoreResult<Vec<Instance>> {
    let instances = if owner_id == ADMIN {
        sqlx::query_as::<_, Instance>(
            "SELECT * FROM instances \
             WHERE project_id = $1 AND deleted_at IS NULL ORDER BY created_at ASC",
        )
        .bind(project_id)
        .fetch_all(pool)
        .await?
    } else {
        sqlx::query_as::<_, Instance>(
            "SELECT * FROM instances \
             WHERE project_id = $1 AND owner_id = $2 AND deleted_at IS NULL \
             ORDER BY created_at ASC",
        )
        .bind(project_id)
        .bind(owner_id)
        .fetch_all(pool)
        .await?
    };
    Ok(instances)
}

/// Fetch every live instance created as part of a given task (`job_id`),
/// tenancy-enforced.
pub async fn get_by_job_id(
    pool: &PgPool,
    owner_id: i64,
    job_id: Uuid,
) -> StoreResult<Vec<Instance>> {
    let instances = if owner_id == ADMIN {
        sqlx::query_as::<_, Instance>(
            "SELECT i.* FROM instances i \
             JOIN tasks t ON t.instance_id = i.id \
             WHERE t.id = $1 AND i.deleted_at IS NULL",
        )
        .bind(job_id)
        .fetch_all(pool)
        .await?
    } else {
        sqlx::query_as::<_, Instance>(
            "SELECT i.* FROM instances i \
             JOIN tasks t ON t.instance_id = i.id \
             WHERE t.id = $1 AND i.owner_id = $2 AND i.deleted_at IS NULL",
        )
        .bind(job_id)
        .bind(owner_id)
        .fetch_all(pool)
        .await?
    };
    Ok(instances)
}

/// List instances matching `filter`, tenancy-enforced. Default (no filter)
/// excludes `Terminated` rows.
pub async fn list(
    pool: &PgPool,
    owner_id: i64,
    filter: &InstanceFilter,
    page: Page,
) -> StoreResult<Vec<Instance>> {
    let mut query = String::from("SELECT * FROM instances WHERE 1 = 1");
    let mut binds: Vec<String> = Vec::new();

    if owner_id != ADMIN {
        binds.push(owner_id.to_string());
        query.push_str(&format!(" AND owner_id = ${}", binds.len()));
    }

    if !filter.include_deleted {
        query.push_str(" AND deleted_at IS NULL");
    }

    // Placeholder positions for status are computed after owner_id so the
    // numbering stays contiguous regardless of tenancy branch taken above.
    if let Some(status) = filter.status {
        let op = match filter.status_filter.0 {
            StatusFilterMode::Equal => "=",
            StatusFilterMode::NotEqual => "!=",
        };
        binds.push(status.to_string());
        query.push_str(&format!(" AND status {op} ${}", binds.len()));
    } else if !filter.include_deleted {
        // Default listing excludes Terminated even without an explicit filter.
        query.push_str(" AND status != 'terminated'");
    }

    query.push_str(" ORDER BY created_at DESC");

    let offset_idx = binds.len() + 1;
    let limit_idx = binds.len() + 2;
    query.push_str(&format!(" OFFSET ${offset_idx} LIMIT ${limit_idx}"));

    let mut q = sqlx::query_as::<_, Instance>(&query);
    if owner_id != ADMIN {
        q = q.bind(owner_id);
    }
    if let Some(status) = filter.status {
        q = q.bind(status);
    }
    q = q.bind(page.offset).bind(page.limit);

    let instances = q.fetch_all(pool).await?;
    Ok(instances)
}

/// Atomically update `public_ip` and move status, keyed by name within a
/// project. Used by the executor after a provider call returns.
pub async fn update_by_name(
    pool: &PgPool,
    project_id: Uuid,
    name: &str,
    public_ip: Option<&str>,
    external_id: Option<&str>,
    status: InstanceStatus,
) -> StoreResult<Instance> {
    let instance = sqlx::query_as::<_, Instance>(
        "UPDATE instances \
         SET public_ip = COALESCE($1, public_ip), \
             external_id = COALESCE($2, external_id), \
             status = $3, \
             updated_at = now() \
         WHERE project_id = $4 AND name = $5 AND deleted_at IS NULL \
         RETURNING *",
    )
    .bind(public_ip)
    .bind(external_id)
    .bind(status)
    .bind(project_id)
    .bind(name)
    .fetch_optional(pool)
    .await?;

    instance.ok_or(StoreError::NotFound)
}

/// Move an instance to a new status, identified by id. Used for batch
/// transitions where the caller already holds instance ids.
pub async fn update_status(pool: &PgPool, id: Uuid, status: InstanceStatus) -> StoreResult<()> {
    let result = sqlx::query("UPDATE instances SET status = $1, updated_at = now() WHERE id = $2")
        .bind(status)
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound);
    }
    Ok(())
}

/// Terminate an instance: atomically flips status to `Terminated` and
/// soft-deletes in one statement. Idempotent -- calling it twice leaves the
/// row unchanged the second time.
pub async fn terminate(pool: &PgPool, id: Uuid) -> StoreResult<()> {
    sqlx::query(
        "UPDATE instances \
         SET status = 'terminated', deleted_at = COALESCE(deleted_at, now()), updated_at = now() \
         WHERE id = $1",
    )
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}
