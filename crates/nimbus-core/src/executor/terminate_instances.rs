//! `TerminateInstances` action state machine.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use nimbus_db::models::{Instance, InstanceStatus, Task};
use nimbus_db::queries::instances;

use crate::error::ProviderError;
use crate::provider::ProviderRegistry;

use super::TaskOutcome;

const PER_TASK_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TerminateInstancesPayload {
    #[serde(default)]
    pub instance_ids: Vec<Uuid>,
    #[serde(default)]
    pub instance_names: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminateInstancesResult {
    pub status: String,
    pub deleted: Vec<String>,
    pub count: usize,
}

pub async fn run(
    pool: &sqlx::PgPool,
    providers: &Arc<ProviderRegistry>,
    task: &Task,
    cancel: CancellationToken,
) -> TaskOutcome {
    let mut logs = Vec::new();

    let payload: TerminateInstancesPayload = match serde_json::from_value(task.payload.clone()) {
        Ok(p) => p,
        Err(e) => return TaskOutcome::failed(format!("invalid payload: {e}"), logs),
    };

    // -----------------------------------------------------------------
    // 1. Resolve instance rows, oldest first, tenancy-scoped. Already
    //    Terminated rows are dropped here -- a repeat run over the same
    //    identifiers must be a no-op, not a re-deletion attempt.
    // -----------------------------------------------------------------
    let mut resolved: Vec<Instance> = Vec::new();

    for id in &payload.instance_ids {
        match instances::get_by_id(pool, task.owner_id, *id).await {
            Ok(row) => resolved.push(row),
            Err(e) if matches!(e, nimbus_db::StoreError::NotFound) => {
                logs.push(format!("instance {id} already gone"));
            }
            Err(e) => return TaskOutcome::failed(format!("failed to resolve instance {id}: {e}"), logs),
        }
    }

    if !payload.instance_names.is_empty() {
        match instances::get_by_names(pool, task.owner_id, task.project_id, &payload.instance_names)
            .await
        {
            Ok(mut rows) => resolved.append(&mut rows),
            Err(e) => return TaskOutcome::failed(format!("failed to resolve instance names: {e}"), logs),
        }
    }

    resolved.retain(|i| i.status != InstanceStatus::Terminated);
    resolved.sort_by_key(|i| i.created_at);
    resolved.dedup_by_key(|i| i.id);

    logs.push(format!("resolved {} instance(s) to terminate", resolved.len()));

    if resolved.is_empty() {
        let result = serde_json::to_value(TerminateInstancesResult {
            status: "deleted".to_string(),
            deleted: Vec::new(),
            count: 0,
        })
        .expect("TerminateInstancesResult always serializes");
        return TaskOutcome::completed(result, logs);
    }

    if cancel.is_cancelled() {
        return TaskOutcome::failed("cancelled before provider calls", logs);
    }

    // -----------------------------------------------------------------
    // 2 & 3. Per-instance provider delete + terminate, bounded fan-out.
    // -----------------------------------------------------------------
    let semaphore = Arc::new(Semaphore::new(PER_TASK_CONCURRENCY));
    let mut futs = Vec::new();
    for instance in resolved {
        let providers = Arc::clone(providers);
        let semaphore = Arc::clone(&semaphore);
        futs.push(async move {
            let _permit = semaphore.acquire().await.expect("semaphore not closed");
            let outcome = match providers.get(&instance.provider_id) {
                Some(adapter) => adapter.delete_instance(&instance.name, &instance.region).await,
                None => Err(ProviderError::Transient(format!(
                    "no provider registered for tag {:?}",
                    instance.provider_id
                ))),
            };
            (instance, outcome)
        });
    }
    let delete_outcomes = futures::future::join_all(futs).await;

    let mut deleted = Vec::new();
    let mut errors = Vec::new();
    for (instance, outcome) in delete_outcomes {
        match outcome {
            Ok(()) | Err(ProviderError::AlreadyDone(_)) => {
                if let Err(e) = instances::terminate(pool, instance.id).await {
                    errors.push(format!("instance {:?}: failed to soft-delete: {e}", instance.name));
                    continue;
                }
                info!(instance = %instance.name, "instance terminated");
                deleted.push(instance.name);
            }
            Err(e) => {
                warn!(instance = %instance.name, error = %e, "failed to delete instance");
                errors.push(format!("instance {:?}: {e}", instance.name));
            }
        }
    }

    if !errors.is_empty() {
        return TaskOutcome::failed(errors.join("; "), logs);
    }

    let count = deleted.len();
    let result = serde_json::to_value(TerminateInstancesResult {
        status: "deleted".to_string(),
        deleted,
        count,
    })
    .expect("TerminateInstancesResult always serializes");
    TaskOutcome::completed(result, logs)
}
