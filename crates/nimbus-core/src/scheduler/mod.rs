//! The Scheduler: a single long-running loop that performs crash
//! recovery on startup, then repeatedly selects schedulable tasks under
//! priority/fairness rules, acquires their lock, and dispatches them to
//! the [`crate::executor`] with bounded concurrency.
//!
//! Built around a `Semaphore` + `CancellationToken` skeleton for bounded
//! dispatch and graceful shutdown, with readiness determined by a
//! row-level optimistic lock (`acquire_task_lock`) rather than in-memory
//! state, and a per-task heartbeat added as a child task per in-flight
//! job to detect and reclaim stuck work.

pub mod config;

use std::sync::Arc;
use std::time::Duration;

use nimbus_db::models::{Priority, Task};
use nimbus_db::queries::tasks;
use sqlx::PgPool;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::executor::{self, TaskOutcome};
use crate::provider::ProviderRegistry;
use crate::provisioner::Provisioner;

pub use config::SchedulerConfig;

/// Priority levels considered each tick, highest first.
const PRIORITY_ORDER: [Priority; 3] = [Priority::High, Priority::Normal, Priority::Low];

pub struct Scheduler {
    pool: PgPool,
    providers: Arc<ProviderRegistry>,
    provisioner: Arc<dyn Provisioner>,
    config: SchedulerConfig,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl Scheduler {
    pub fn new(
        pool: PgPool,
        providers: ProviderRegistry,
        provisioner: impl Provisioner + 'static,
        config: SchedulerConfig,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_inflight));
        Self {
            pool,
            providers: Arc::new(providers),
            provisioner: Arc::new(provisioner),
            config,
            semaphore,
            cancel: CancellationToken::new(),
        }
    }

    /// A token the caller can cancel to trigger graceful shutdown.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the scheduler to completion (i.e. until cancelled).
    ///
    /// 1. Crash recovery, exactly once.
    /// 2. The main poll loop, with exponential idle backoff.
    /// 3. A bounded drain on shutdown.
    pub async fn run(&self) {
        let recovered = tasks::recover_stale_tasks(&self.pool)
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "crash recovery failed, continuing with an empty recovery set");
                Vec::new()
            });
        if !recovered.is_empty() {
            info!(count = recovered.len(), "recovered stale running tasks on startup");
        }

        let mut poll_interval = self.config.poll_interval;

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let found_work = self.tick().await;

            poll_interval = if found_work {
                self.config.poll_interval
            } else {
                (poll_interval * 2).min(self.config.max_poll_interval)
            };

            tokio::select! {
                _ = tokio::time::sleep(poll_interval) => {}
                _ = self.cancel.cancelled() => break,
            }
        }

        self.shutdown().await;
    }

    /// One scheduling pass over every priority level. Returns whether any
    /// task was found and dispatched (used to reset idle backoff).
    async fn tick(&self) -> bool {
        let mut found_work = false;

        for priority in PRIORITY_ORDER {
            if self.cancel.is_cancelled() {
                break;
            }

            let candidates = match tasks::get_schedulable_tasks(&self.pool, priority, self.config.batch).await {
                Ok(tasks) => tasks,
                Err(e) => {
                    warn!(error = %e, ?priority, "failed to list schedulable tasks");
                    continue;
                }
            };

            for task in candidates {
                let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() else {
                    // No capacity left this tick; the task remains
                    // schedulable and will be reconsidered next tick.
                    break;
                };

                match tasks::acquire_task_lock(&self.pool, task.id).await {
                    Ok(Some(locked_at)) => {
                        found_work = true;
                        self.dispatch(task, locked_at, permit);
                    }
                    Ok(None) => {
                        // Contended: another executor holds it. Drop the
                        // permit and move on.
                        drop(permit);
                    }
                    Err(e) => {
                        warn!(task_id = %task.id, error = %e, "failed to acquire task lock");
                        drop(permit);
                    }
                }
            }
        }

        found_work
    }

    /// Spawn the executor (plus its heartbeat) for a newly-acquired task.
    /// `permit` is held for the lifetime of the spawned task, bounding
    /// global in-flight concurrency. `locked_at` must be the value
    /// `acquire_task_lock` just wrote for this task, not any earlier
    /// snapshot -- the heartbeat's `refresh_task_lock` matches against it
    /// exactly, and a stale value (or the `None` a never-before-locked
    /// task carries in its `get_schedulable_tasks` snapshot) would never
    /// match the row.
    fn dispatch(&self, task: Task, locked_at: chrono::DateTime<chrono::Utc>, permit: tokio::sync::OwnedSemaphorePermit) {
        let pool = self.pool.clone();
        let providers = Arc::clone(&self.providers);
        let provisioner = Arc::clone(&self.provisioner);
        let heartbeat_interval = self.config.heartbeat_interval;
        let max_heartbeat_failures = self.config.max_heartbeat_failures;
        let max_task_runtime = self.config.max_task_runtime;
        let child_token = self.cancel.child_token();
        let task_id = task.id;

        tokio::spawn(async move {
            let _permit = permit;

            let heartbeat_token = child_token.clone();
            let heartbeat_pool = pool.clone();
            let heartbeat = tokio::spawn(async move {
                run_heartbeat(
                    heartbeat_pool,
                    task_id,
                    locked_at,
                    heartbeat_interval,
                    max_heartbeat_failures,
                    heartbeat_token,
                )
                .await;
            });

            let outcome = tokio::time::timeout(
                max_task_runtime,
                executor::execute_task(&pool, &providers, &provisioner, &task, child_token.clone()),
            )
            .await
            .unwrap_or_else(|_| {
                TaskOutcome::failed("task exceeded MAX_TASK_RUNTIME", vec![])
            });

            child_token.cancel();
            let _ = heartbeat.await;

            finalize(&pool, task_id, outcome).await;
        });
    }

    /// Cancel the loop and wait up to `SHUTDOWN_GRACE` for in-flight work
    /// to drain. Anything still running when the grace period elapses is
    /// left locked; the lock's expiry guarantees another process (or this
    /// one, on restart) recovers it via [`tasks::recover_stale_tasks`].
    async fn shutdown(&self) {
        info!("scheduler shutting down, waiting for in-flight tasks to drain");
        let total_permits = self.config.max_inflight;
        let drain = Arc::clone(&self.semaphore).acquire_many_owned(total_permits as u32);
        match tokio::time::timeout(self.config.shutdown_grace, drain).await {
            Ok(Ok(_permits)) => info!("all in-flight tasks drained"),
            _ => warn!("shutdown grace period elapsed with tasks still in flight; their locks will expire and be recovered"),
        }
    }
}

/// Periodically extend a held task lock's expiry while the executor is
/// working. Stops when `token` is cancelled (task finished, or the
/// scheduler is shutting down). After [`MAX_HEARTBEAT_FAILURES`]
/// consecutive refresh failures, cancels `token` itself so the executor
/// aborts -- the task is left for crash recovery.
async fn run_heartbeat(
    pool: PgPool,
    task_id: uuid::Uuid,
    locked_at: chrono::DateTime<chrono::Utc>,
    interval: Duration,
    max_failures: u32,
    token: CancellationToken,
) {
    let mut consecutive_failures = 0u32;

    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(interval) => {}
        }

        if token.is_cancelled() {
            return;
        }

        match tasks::refresh_task_lock(&pool, task_id, locked_at).await {
            Ok(true) => consecutive_failures = 0,
            Ok(false) | Err(_) => {
                consecutive_failures += 1;
                warn!(task_id = %task_id, consecutive_failures, "failed to refresh task lock");
                if consecutive_failures >= max_failures {
                    warn!(task_id = %task_id, "aborting task after repeated heartbeat failures");
                    token.cancel();
                    return;
                }
            }
        }
    }
}

/// Persist a task's terminal outcome and release its lock. Runs
/// regardless of whether the executor succeeded, failed, or was aborted.
async fn finalize(pool: &PgPool, task_id: uuid::Uuid, outcome: TaskOutcome) {
    let patch = tasks::TaskPatch {
        status: Some(outcome.status),
        error: Some(outcome.error),
        logs_append: if outcome.logs.is_empty() {
            None
        } else {
            Some(outcome.logs)
        },
        result: outcome.result,
    };

    if let Err(e) = tasks::update(pool, nimbus_db::models::ADMIN, task_id, patch).await {
        warn!(task_id = %task_id, error = %e, "failed to persist task outcome");
    }
    if let Err(e) = tasks::release_task_lock(pool, task_id).await {
        warn!(task_id = %task_id, error = %e, "failed to release task lock");
    }
}
