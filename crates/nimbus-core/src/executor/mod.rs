//! Task Executor: given an already-locked task, drives its action's state
//! machine to a terminal outcome.
//!
//! Numbered steps, `tracing` at each transition, a final match that writes
//! exactly one terminal outcome: validate -> persist pending rows -> call
//! provider -> update rows -> optionally provision -> result.
//!
//! The executor never calls the scheduler and never returns a `Result`
//! that escapes to the caller: every branch is folded into a
//! [`TaskOutcome`] so the caller always has exactly one terminal status
//! and error/result payload to persist.

pub mod create_instances;
pub mod terminate_instances;

use std::sync::Arc;

use nimbus_db::models::{Action, Task, TaskStatus};
use tokio_util::sync::CancellationToken;

use crate::provider::ProviderRegistry;
use crate::provisioner::Provisioner;

/// The terminal result of driving one task to completion.
///
/// Invariant: `status` is always [`TaskStatus::Completed`] or
/// [`TaskStatus::Failed`] -- the executor never leaves a task `Running`.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub status: TaskStatus,
    pub error: String,
    pub result: Option<serde_json::Value>,
    pub logs: String,
}

impl TaskOutcome {
    pub fn completed(result: serde_json::Value, logs: Vec<String>) -> Self {
        Self {
            status: TaskStatus::Completed,
            error: String::new(),
            result: Some(result),
            logs: logs.join("\n"),
        }
    }

    pub fn failed(error: impl Into<String>, logs: Vec<String>) -> Self {
        Self {
            status: TaskStatus::Failed,
            error: error.into(),
            result: None,
            logs: logs.join("\n"),
        }
    }
}

/// Drive `task` (already `Running`, locked, with `attempts` incremented)
/// to a terminal outcome.
///
/// Dispatches on [`Task::action`]. Adding a new action variant means
/// adding one arm here plus its own payload/result module.
pub async fn execute_task(
    pool: &sqlx::PgPool,
    providers: &Arc<ProviderRegistry>,
    provisioner: &Arc<dyn Provisioner>,
    task: &Task,
    cancel: CancellationToken,
) -> TaskOutcome {
    match task.action {
        Action::CreateInstances => {
            create_instances::run(pool, providers, provisioner, task, cancel).await
        }
        Action::TerminateInstances => {
            terminate_instances::run(pool, providers, task, cancel).await
        }
    }
}
