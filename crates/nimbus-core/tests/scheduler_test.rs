//! End-to-end tests for the [`nimbus_core::scheduler::Scheduler`] loop:
//! dispatch to completion, crash recovery on startup, and single-attempt
//! failure (no automatic retry without an operator-triggered one).

use std::time::Duration;

use nimbus_db::models::{Action, Priority, TaskStatus};
use nimbus_db::queries::{projects, tasks};

use nimbus_core::provider::{MockProviderAdapter, ProviderRegistry};
use nimbus_core::provisioner::NoopProvisioner;
use nimbus_core::scheduler::{Scheduler, SchedulerConfig};

use nimbus_test_utils::{create_test_db, drop_test_db};

const OWNER: i64 = 1;

fn fast_config() -> SchedulerConfig {
    SchedulerConfig {
        poll_interval: Duration::from_millis(20),
        max_poll_interval: Duration::from_millis(100),
        shutdown_grace: Duration::from_secs(2),
        ..SchedulerConfig::default()
    }
}

fn new_scheduler(pool: sqlx::PgPool) -> Scheduler {
    let mut providers = ProviderRegistry::new();
    providers.register(MockProviderAdapter::new("mock"));
    Scheduler::new(pool, providers, NoopProvisioner, fast_config())
}

/// Poll `get_by_id` until the task leaves `Pending`/`Running`, or time out.
async fn wait_for_terminal(pool: &sqlx::PgPool, task_id: uuid::Uuid) -> nimbus_db::models::Task {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let task = tasks::get_by_id(pool, OWNER, task_id).await.unwrap();
        if matches!(task.status, TaskStatus::Completed | TaskStatus::Failed) {
            return task;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("task {task_id} did not reach a terminal state in time (status: {:?})", task.status);
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn scheduler_drives_a_pending_task_to_completion() {
    let (pool, db_name) = create_test_db().await;

    let project = projects::create(&pool, OWNER, "fleet-a").await.unwrap();
    let task = tasks::create(
        &pool,
        OWNER,
        project.id,
        None,
        Action::TerminateInstances,
        Priority::Normal,
        serde_json::json!({}),
    )
    .await
    .unwrap();

    let scheduler = new_scheduler(pool.clone());
    let token = scheduler.cancellation_token();
    let handle = tokio::spawn(async move { scheduler.run().await });

    let completed = wait_for_terminal(&pool, task.id).await;
    assert_eq!(completed.status, TaskStatus::Completed);

    token.cancel();
    tokio::time::timeout(Duration::from_secs(3), handle).await.unwrap().unwrap();

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn scheduler_recovers_and_completes_a_crashed_task() {
    let (pool, db_name) = create_test_db().await;

    let project = projects::create(&pool, OWNER, "fleet-b").await.unwrap();
    let task = tasks::create(
        &pool,
        OWNER,
        project.id,
        None,
        Action::TerminateInstances,
        Priority::High,
        serde_json::json!({}),
    )
    .await
    .unwrap();

    // Simulate a process that crashed mid-task: Running with an expired lock.
    assert!(tasks::acquire_task_lock(&pool, task.id).await.unwrap().is_some());
    sqlx::query("UPDATE tasks SET lock_expiry = now() - interval '1 minute' WHERE id = $1")
        .bind(task.id)
        .execute(&pool)
        .await
        .unwrap();

    let scheduler = new_scheduler(pool.clone());
    let token = scheduler.cancellation_token();
    let handle = tokio::spawn(async move { scheduler.run().await });

    let completed = wait_for_terminal(&pool, task.id).await;
    assert_eq!(completed.status, TaskStatus::Completed);
    assert!(completed.logs.contains("[recovery]"));
    assert_eq!(completed.attempts, 3, "the original acquire, the recovery increment, and the scheduler's re-acquire");

    token.cancel();
    tokio::time::timeout(Duration::from_secs(3), handle).await.unwrap().unwrap();

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn scheduler_fails_a_task_with_an_invalid_payload_without_retrying() {
    let (pool, db_name) = create_test_db().await;

    let project = projects::create(&pool, OWNER, "fleet-c").await.unwrap();
    let task = tasks::create(
        &pool,
        OWNER,
        project.id,
        None,
        Action::CreateInstances,
        Priority::Normal,
        serde_json::json!({}),
    )
    .await
    .unwrap();

    let scheduler = new_scheduler(pool.clone());
    let token = scheduler.cancellation_token();
    let handle = tokio::spawn(async move { scheduler.run().await });

    let failed = wait_for_terminal(&pool, task.id).await;
    assert_eq!(failed.status, TaskStatus::Failed);
    assert!(failed.error.contains("invalid payload"));
    assert_eq!(failed.attempts, 1, "a failed task is not retried without an explicit operator retry");

    token.cancel();
    tokio::time::timeout(Duration::from_secs(3), handle).await.unwrap().unwrap();

    pool.close().await;
    drop_test_db(&db_name).await;
}
