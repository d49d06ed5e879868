//! Database query functions for the `tasks` table.
//!
//! This module is the single source of mutual exclusion for task
//! processing: [`acquire_task_lock`] is the only statement that may flip a
//! task's lock fields, and it does so with an optimistic, conditional
//! `UPDATE ... WHERE ...` so exactly one caller observes `rows_affected() ==
//! 1` under concurrent callers.

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::models::{Action, Priority, Task, TaskStatus, ADMIN, MAX_ATTEMPTS};
use crate::pagination::Page;

/// Insert a new task row with status `pending`.
pub async fn create(
    pool: &PgPool,
    owner_id: i64,
    project_id: Uuid,
    instance_id: Option<Uuid>,
    action: Action,
    priority: Priority,
    payload: serde_json::Value,
) -> StoreResult<Task> {
    if owner_id <= 0 {
        return Err(StoreError::validation("owner_id must be > 0"));
    }

    let task = sqlx::query_as::<_, Task>(
        "INSERT INTO tasks (owner_id, project_id, instance_id, action, priority, payload) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         RETURNING *",
    )
    .bind(owner_id)
    .bind(project_id)
    .bind(instance_id)
    .bind(action)
    .bind(priority)
    .bind(payload)
    .fetch_one(pool)
    .await?;

    Ok(task)
}

/// Fetch a task by id, enforcing tenancy unless `owner_id == ADMIN`.
pub async fn get_by_id(pool: &PgPool, owner_id: i64, id: Uuid) -> StoreResult<Task> {
    let task = if owner_id == ADMIN {
        sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?
    } else {
        sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = $1 AND owner_id = $2")
            .bind(id)
            .bind(owner_id)
            .fetch_optional(pool)
            .await?
    };

    task.ok_or(StoreError::NotFound)
}

/// List tasks for a project, newest first, tenancy-enforced.
pub async fn list_by_project(
    pool: &PgPool,
    owner_id: i64,
    project_id: Uuid,
    page: Page,
) -> StoreResult<Vec<Task>> {
    let tasks = if owner_id == ADMIN {
        sqlx::query_as::<_, Task>(
            "SELECT * FROM tasks WHERE project_id = $1 \
             ORDER BY created_at DESC OFFSET $2 LIMIT $3",
        )
        .bind(project_id)
        .bind(page.offset)
        .bind(page.limit)
        .fetch_all(pool)
        .await?
    } else {
        sqlx::query_as::<_, Task>(
            "SELECT * FROM tasks WHERE project_id = $1 AND owner_id = $2 \
             ORDER BY created_at DESC OFFSET $3 LIMIT $4",
        )
        .bind(project_id)
        .bind(owner_id)
        .bind(page.offset)
        .bind(page.limit)
        .fetch_all(pool)
        .await?
    };

    Ok(tasks)
}

/// List tasks referencing a given instance, newest first, optionally
/// filtered to one action, tenancy-enforced.
pub async fn list_by_instance_id(
    pool: &PgPool,
    owner_id: i64,
    instance_id: Uuid,
    action_filter: Option<Action>,
    page: Page,
) -> StoreResult<Vec<Task>> {
    let tasks = match (owner_id == ADMIN, action_filter) {
        (true, None) => {
            sqlx::query_as::<_, Task>(
                "SELECT * FROM tasks WHERE instance_id = $1 \
                 ORDER BY created_at DESC OFFSET $2 LIMIT $3",
            )
            .bind(instance_id)
            .bind(page.offset)
            .bind(page.limit)
            .fetch_all(pool)
            .await?
        }
        (true, Some(action)) => {
            sqlx::query_as::<_, Task>(
                "SELECT * FROM tasks WHERE instance_id = $1 AND action = $2 \
                 ORDER BY created_at DESC OFFSET $3 LIMIT $4",
            )
            .bind(instance_id)
            .bind(action)
            .bind(page.offset)
            .bind(page.limit)
            .fetch_all(pool)
            .await?
        }
        (false, None) => {
            sqlx::query_as::<_, Task>(
                "SELECT * FROM tasks WHERE instance_id = $1 AND owner_id = $2 \
                 ORDER BY created_at DESC OFFSET $3 LIMIT $4",
            )
            .bind(instance_id)
            .bind(owner_id)
            .bind(page.offset)
            .bind(page.limit)
            .fetch_all(pool)
            .await?
        }
        (false, Some(action)) => {
            sqlx::query_as::<_, Task>(
                "SELECT * FROM tasks WHERE instance_id = $1 AND owner_id = $2 AND action = $3 \
                 ORDER BY created_at DESC OFFSET $4 LIMIT $5",
            )
            .bind(instance_id)
            .bind(owner_id)
            .bind(action)
            .bind(page.offset)
            .bind(page.limit)
            .fetch_all(pool)
            .await?
        }
    };

    Ok(tasks)
}

/// Atomically set a task's status. No effect (but no error) if the task is
/// not owned by `owner_id` and `owner_id` is not `ADMIN`.
pub async fn update_status(
    pool: &PgPool,
    owner_id: i64,
    id: Uuid,
    status: TaskStatus,
) -> StoreResult<()> {
    let result = if owner_id == ADMIN {
        sqlx::query("UPDATE tasks SET status = $1, updated_at = now() WHERE id = $2")
            .bind(status)
            .bind(id)
            .execute(pool)
            .await?
    } else {
        sqlx::query(
            "UPDATE tasks SET status = $1, updated_at = now() WHERE id = $2 AND owner_id = $3",
        )
        .bind(status)
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

/// Partial patch: only the fields that are `Some` are applied. Never
/// touches `id`/`created_at`.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub status: Option<TaskStatus>,
    pub error: Option<String>,
    pub logs_append: Option<String>,
    pub result: Option<serde_json::Value>,
}

/// Apply a partial patch to a task row, tenancy-enforced.
pub async fn update(
    pool: &PgPool,
    owner_id: i64,
    id: Uuid,
    patch: TaskPatch,
) -> StoreResult<Task> {
    let task = get_by_id(pool, owner_id, id).await?;

    let status = patch.status.unwrap_or(task.status);
    let error = patch.error.unwrap_or(task.error);
    let logs = match patch.logs_append {
        Some(extra) if task.logs.is_empty() => extra,
        Some(extra) => format!("{}\n{}", task.logs, extra),
        None => task.logs,
    };
    let result = patch.result.or(task.result);

    let updated = sqlx::query_as::<_, Task>(
        "UPDATE tasks SET status = $1, error = $2, logs = $3, result = $4, updated_at = now() \
         WHERE id = $5 \
         RETURNING *",
    )
    .bind(status)
    .bind(error)
    .bind(logs)
    .bind(result)
    .bind(id)
    .fetch_one(pool)
    .await?;

    Ok(updated)
}

/// The lock lease duration used by [`acquire_task_lock`] and
/// [`refresh_task_lock`].
pub fn lock_ttl() -> Duration {
    Duration::seconds(300)
}

/// Attempt to acquire a task's lock.
///
/// Single atomic conditional UPDATE: sets `locked_at = now`,
/// `lock_expiry = now + LOCK_TTL`, `status = Running`, and increments
/// `attempts`, but only if `locked_at IS NULL OR lock_expiry < now`. This is
/// the sole source of mutual exclusion for task processing.
///
/// Returns the `locked_at` the UPDATE just wrote if acquired, `None` if
/// contended (another executor already holds the lock). Callers must
/// thread this value through rather than trusting any previously-fetched
/// `Task::locked_at` snapshot, which predates the write and is `None` for
/// a task that has never been locked before.
pub async fn acquire_task_lock(pool: &PgPool, id: Uuid) -> StoreResult<Option<DateTime<Utc>>> {
    let now = Utc::now();
    let expiry = now + lock_ttl();

    let row: Option<(DateTime<Utc>,)> = sqlx::query_as(
        "UPDATE tasks \
         SET locked_at = $1, lock_expiry = $2, status = 'running', attempts = attempts + 1, \
             updated_at = now() \
         WHERE id = $3 \
           AND attempts < $4 \
           AND status IN ('pending', 'running') \
           AND (locked_at IS NULL OR lock_expiry < $1) \
         RETURNING locked_at",
    )
    .bind(now)
    .bind(expiry)
    .bind(id)
    .bind(MAX_ATTEMPTS)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|(locked_at,)| locked_at))
}

/// Extend a held lock's expiry (the scheduler's heartbeat). No-op (returns
/// `false`) if the lock has already expired or moved to another holder.
pub async fn refresh_task_lock(pool: &PgPool, id: Uuid, locked_at: DateTime<Utc>) -> StoreResult<bool> {
    let now = Utc::now();
    let expiry = now + lock_ttl();

    let result = sqlx::query(
        "UPDATE tasks SET lock_expiry = $1 \
         WHERE id = $2 AND locked_at = $3",
    )
    .bind(expiry)
    .bind(id)
    .bind(locked_at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Clear a task's lock fields. Idempotent.
pub async fn release_task_lock(pool: &PgPool, id: Uuid) -> StoreResult<()> {
    sqlx::query("UPDATE tasks SET locked_at = NULL, lock_expiry = NULL WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Crash recovery: reclaim tasks left `Running` with an absent or expired
/// lock. Sets `status = Pending`, clears lock fields, increments
/// `attempts`, and appends a recovery marker to `logs`.
///
/// Returns the recovered tasks.
pub async fn recover_stale_tasks(pool: &PgPool) -> StoreResult<Vec<Task>> {
    let now = Utc::now();
    let marker = format!("[recovery] reclaimed stale running task at {now}");

    let tasks = sqlx::query_as::<_, Task>(
        "UPDATE tasks \
         SET status = 'pending', \
             locked_at = NULL, \
             lock_expiry = NULL, \
             attempts = attempts + 1, \
             logs = CASE WHEN logs = '' THEN $2 ELSE logs || '\n' || $2 END, \
             updated_at = now() \
         WHERE status = 'running' \
           AND (locked_at IS NULL OR lock_expiry < $1) \
         RETURNING *",
    )
    .bind(now)
    .bind(&marker)
    .fetch_all(pool)
    .await?;

    Ok(tasks)
}

/// Select a bounded, ordered batch of schedulable tasks at a given
/// priority.
///
/// `status ∈ {Pending, Running} ∧ attempts < MAX_ATTEMPTS ∧ (locked_at IS
/// NULL ∨ lock_expiry < now) ∧ priority = p`, ordered by `(error = '' DESC,
/// created_at ASC, id ASC)` -- tasks without an error (first attempt, or a
/// clean retry) are preferred over ones that previously failed, then by
/// age, then by id as a stable tiebreaker.
pub async fn get_schedulable_tasks(
    pool: &PgPool,
    priority: Priority,
    limit: i64,
) -> StoreResult<Vec<Task>> {
    let now = Utc::now();

    let tasks = sqlx::query_as::<_, Task>(
        "SELECT * FROM tasks \
         WHERE priority = $1 \
           AND status IN ('pending', 'running') \
           AND attempts < $2 \
           AND (locked_at IS NULL OR lock_expiry < $3) \
         ORDER BY (error = '') DESC, created_at ASC, id ASC \
         LIMIT $4",
    )
    .bind(priority)
    .bind(MAX_ATTEMPTS)
    .bind(now)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(tasks)
}

/// Atomic `+1` on the attempt counter (used outside the lock-acquisition
/// path, e.g. by operator-triggered retries).
pub async fn increment_attempts(pool: &PgPool, id: Uuid) -> StoreResult<i32> {
    let (attempts,): (i32,) =
        sqlx::query_as("UPDATE tasks SET attempts = attempts + 1 WHERE id = $1 RETURNING attempts")
            .bind(id)
            .fetch_one(pool)
            .await?;
    Ok(attempts)
}

/// Explicit retry of a `Failed` task back to `Pending`, gated on
/// `attempts < MAX_ATTEMPTS`. This is distinct from crash recovery (see
/// [`recover_stale_tasks`]): it is the operator-triggered path for
/// recoverable failures, rather than a scheduler-detected stale lock.
pub async fn retry_failed_to_pending(pool: &PgPool, id: Uuid) -> StoreResult<bool> {
    let result = sqlx::query(
        "UPDATE tasks \
         SET status = 'pending', attempts = attempts + 1, locked_at = NULL, lock_expiry = NULL, \
             updated_at = now() \
         WHERE id = $1 AND status = 'failed' AND attempts < $2",
    )
    .bind(id)
    .bind(MAX_ATTEMPTS)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}
