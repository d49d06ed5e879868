//! `CreateInstances` action state machine.
//!
//! Validate -> persist Pending rows -> call the provider -> update rows ->
//! optionally provision -> write `result` -- see [`run`].

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use nimbus_db::models::{Instance, InstanceStatus, Task};
use nimbus_db::queries::{instances, ssh_keys};

use crate::error::ProviderError;
use crate::hostname::{deterministic_instance_name, is_valid_hostname};
use crate::provider::{InstanceConfig, ProviderRegistry};
use crate::provisioner::Provisioner;

use super::TaskOutcome;

/// Bound on per-instance fan-out within a single task, mirroring the
/// scheduler's own `MAX_INFLIGHT` bound.
const PER_TASK_CONCURRENCY: usize = 8;

/// One logical instance request within a `CreateInstances` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceRequest {
    pub provider: String,
    pub count: u32,
    pub region: String,
    pub size: String,
    pub image: String,
    pub ssh_key_name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub provision: bool,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CreateInstancesPayload {
    pub requests: Vec<InstanceRequest>,
}

/// One created instance, as recorded in the task's `result`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceInfoResult {
    pub id: Uuid,
    pub name: String,
    pub public_ip: Option<String>,
    pub region: String,
    pub size: String,
    pub status: InstanceStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CreateInstancesResult {
    pub created: Vec<InstanceInfoResult>,
}

/// A single logical instance awaiting provider creation, after validation
/// and row insertion.
struct PendingInstance {
    row_id: Uuid,
    name: String,
    provision: bool,
    cfg: InstanceConfig,
}

pub async fn run(
    pool: &sqlx::PgPool,
    providers: &Arc<ProviderRegistry>,
    provisioner: &Arc<dyn Provisioner>,
    task: &Task,
    cancel: CancellationToken,
) -> TaskOutcome {
    let mut logs = Vec::new();

    let payload: CreateInstancesPayload = match serde_json::from_value(task.payload.clone()) {
        Ok(p) => p,
        Err(e) => return TaskOutcome::failed(format!("invalid payload: {e}"), logs),
    };

    // -----------------------------------------------------------------
    // 1. Validate.
    // -----------------------------------------------------------------
    for req in &payload.requests {
        if req.count < 1 {
            return TaskOutcome::failed(
                format!("request for provider {:?} has count < 1", req.provider),
                logs,
            );
        }
        if req.provider.trim().is_empty()
            || req.region.trim().is_empty()
            || req.size.trim().is_empty()
            || req.image.trim().is_empty()
            || req.ssh_key_name.trim().is_empty()
        {
            return TaskOutcome::failed("request has an empty required field", logs);
        }
        if let Some(name) = &req.name {
            if !is_valid_hostname(name) {
                return TaskOutcome::failed(format!("invalid instance hostname: {name:?}"), logs);
            }
        }
    }
    logs.push(format!(
        "validated {} instance request(s)",
        payload.requests.len()
    ));

    // -----------------------------------------------------------------
    // 2. Persist Pending rows, resolving each request's SSH key.
    //
    // Names are derived deterministically from the task id and each
    // logical instance's position in the payload (unless a request
    // supplies its own), so re-executing this exact task -- which is
    // exactly what crash recovery does -- computes the same names every
    // time and can reconcile against rows a prior, interrupted run
    // already persisted instead of duplicating them.
    // -----------------------------------------------------------------
    let mut candidates = Vec::new(); // (NewInstance, ssh_key_id, provision), one per logical instance
    let mut index = 0usize;

    for req in &payload.requests {
        let key = match ssh_keys::get_by_name(pool, task.owner_id, &req.ssh_key_name).await {
            Ok(k) => k,
            Err(e) => {
                return TaskOutcome::failed(
                    format!("ssh key {:?} not found: {e}", req.ssh_key_name),
                    logs,
                );
            }
        };

        for _ in 0..req.count {
            let name = if req.count == 1 {
                req.name
                    .clone()
                    .unwrap_or_else(|| deterministic_instance_name(task.id, index))
            } else {
                deterministic_instance_name(task.id, index)
            };
            index += 1;

            candidates.push((
                instances::NewInstance {
                    owner_id: task.owner_id,
                    project_id: task.project_id,
                    name,
                    provider_id: req.provider.clone(),
                    region: req.region.clone(),
                    size: req.size.clone(),
                    image: req.image.clone(),
                    tags: req.tags.clone(),
                },
                key.name.clone(),
                req.provision,
            ));
        }
    }

    let all_names: Vec<String> = candidates.iter().map(|(n, _, _)| n.name.clone()).collect();
    let already_persisted: HashMap<String, Instance> =
        match instances::get_by_names(pool, task.owner_id, task.project_id, &all_names).await {
            Ok(rows) => rows.into_iter().map(|row| (row.name.clone(), row)).collect(),
            Err(e) => {
                return TaskOutcome::failed(
                    format!("failed to look up existing instances: {e}"),
                    logs,
                );
            }
        };

    let mut to_insert = Vec::new();
    let mut pending: Vec<(String, PendingInstance)> = Vec::new();

    for (new, ssh_key_id, provision) in candidates {
        if let Some(row) = already_persisted.get(&new.name) {
            let cfg = InstanceConfig {
                region: row.region.clone(),
                size: row.size.clone(),
                image: row.image.clone(),
                ssh_key_id,
                tags: row.tags.clone(),
            };
            pending.push((
                row.provider_id.clone(),
                PendingInstance {
                    row_id: row.id,
                    name: row.name.clone(),
                    provision,
                    cfg,
                },
            ));
        } else {
            to_insert.push((new, ssh_key_id, provision));
        }
    }

    if !already_persisted.is_empty() {
        logs.push(format!(
            "reused {} instance row(s) persisted by a prior attempt of this task",
            already_persisted.len()
        ));
    }

    if !to_insert.is_empty() {
        let news: Vec<_> = to_insert.iter().map(|(n, _, _)| n.clone()).collect();
        let created_rows = match instances::create_batch(pool, &news).await {
            Ok(rows) => rows,
            Err(e) => return TaskOutcome::failed(format!("failed to persist instances: {e}"), logs),
        };
        logs.push(format!("persisted {} pending instance row(s)", created_rows.len()));

        for (row, (_, ssh_key_id, provision)) in created_rows.iter().zip(to_insert.into_iter()) {
            let cfg = InstanceConfig {
                region: row.region.clone(),
                size: row.size.clone(),
                image: row.image.clone(),
                ssh_key_id,
                tags: row.tags.clone(),
            };
            pending.push((
                row.provider_id.clone(),
                PendingInstance {
                    row_id: row.id,
                    name: row.name.clone(),
                    provision,
                    cfg,
                },
            ));
        }
    }

    if cancel.is_cancelled() {
        return TaskOutcome::failed("cancelled before provider call", logs);
    }

    // -----------------------------------------------------------------
    // 3 & 4. Provider call + row update, bounded fan-out/fan-in.
    // -----------------------------------------------------------------
    let semaphore = Arc::new(Semaphore::new(PER_TASK_CONCURRENCY));
    let mut futs = Vec::new();
    for (provider_tag, p) in pending {
        let providers = Arc::clone(providers);
        let semaphore = Arc::clone(&semaphore);
        futs.push(async move {
            let _permit = semaphore.acquire().await.expect("semaphore not closed");
            let adapter = match providers.get(&provider_tag) {
                Some(a) => a,
                None => {
                    return (p, Err(ProviderError::Transient(format!(
                        "no provider registered for tag {provider_tag:?}"
                    ))));
                }
            };
            let result = adapter.create_instance(&p.name, &p.cfg).await;
            (p, result)
        });
    }
    let outcomes = futures::future::join_all(futs).await;

    let mut created_infos = Vec::new();
    for (p, result) in outcomes {
        match result {
            Ok(info) => {
                match instances::update_by_name(
                    pool,
                    task.project_id,
                    &p.name,
                    Some(&info.public_ip),
                    Some(&info.id),
                    InstanceStatus::Provisioning,
                )
                .await
                {
                    Ok(row) => {
                        info!(instance = %p.name, "instance provisioned by provider");
                        created_infos.push((row, p.provision));
                    }
                    Err(e) => {
                        return TaskOutcome::failed(
                            format!("failed to update instance {:?} after creation: {e}", p.name),
                            logs,
                        );
                    }
                }
            }
            Err(ProviderError::AlreadyDone(msg)) => {
                warn!(instance = %p.name, reason = %msg, "provider reports instance already exists, treating as created");
                match instances::update_status(pool, p.row_id, InstanceStatus::Provisioning).await {
                    Ok(()) => {
                        if let Ok(row) = instances::get_by_id(pool, task.owner_id, p.row_id).await
                        {
                            created_infos.push((row, p.provision));
                        }
                    }
                    Err(e) => {
                        return TaskOutcome::failed(
                            format!("failed to mark already-existing instance {:?}: {e}", p.name),
                            logs,
                        );
                    }
                }
            }
            Err(e) => {
                return TaskOutcome::failed(
                    format!("provider failed to create instance {:?}: {e}", p.name),
                    logs,
                );
            }
        }
    }
    logs.push(format!("{} instance(s) reached provisioning", created_infos.len()));

    if cancel.is_cancelled() {
        return TaskOutcome::failed("cancelled before provisioning step", logs);
    }

    // -----------------------------------------------------------------
    // 5. Optional provisioning.
    // -----------------------------------------------------------------
    let to_provision: Vec<_> = created_infos.iter().filter(|(_, p)| *p).collect();
    if !to_provision.is_empty() {
        let mut hosts = HashMap::new();
        for (row, _) in &to_provision {
            if instances::update_status(pool, row.id, InstanceStatus::Configuring)
                .await
                .is_err()
            {
                continue;
            }
            if let Some(ip) = &row.public_ip {
                hosts.insert(row.name.clone(), ip.clone());
            }
        }

        let inventory = match provisioner.create_inventory(&hosts).await {
            Ok(inv) => inv,
            Err(e) => return TaskOutcome::failed(format!("provisioning failed: {e}"), logs),
        };

        let semaphore = Arc::new(Semaphore::new(PER_TASK_CONCURRENCY));
        let mut futs = Vec::new();
        for name in hosts.keys().cloned() {
            let provisioner = Arc::clone(provisioner);
            let inventory = inventory.clone();
            let semaphore = Arc::clone(&semaphore);
            futs.push(async move {
                let _permit = semaphore.acquire().await.expect("semaphore not closed");
                let result = provisioner.configure_host(&inventory, &name).await;
                (name, result)
            });
        }
        let configure_outcomes = futures::future::join_all(futs).await;
        for (name, result) in &configure_outcomes {
            if let Err(e) = result {
                return TaskOutcome::failed(
                    format!("provisioning host {name:?} failed: {e}"),
                    logs,
                );
            }
        }

        if let Err(e) = provisioner.run_playbook(&inventory, task.id).await {
            return TaskOutcome::failed(format!("provisioning playbook failed: {e}"), logs);
        }

        for (row, _) in &to_provision {
            if let Err(e) = instances::update_status(pool, row.id, InstanceStatus::Ready).await {
                return TaskOutcome::failed(
                    format!("failed to mark instance {:?} ready: {e}", row.name),
                    logs,
                );
            }
        }
        logs.push(format!("{} instance(s) provisioned and ready", to_provision.len()));
    }

    // -----------------------------------------------------------------
    // 6. Completion.
    // -----------------------------------------------------------------
    let mut result_rows = Vec::with_capacity(created_infos.len());
    for (row, provision) in &created_infos {
        let status = if *provision {
            InstanceStatus::Ready
        } else {
            row.status
        };
        result_rows.push(InstanceInfoResult {
            id: row.id,
            name: row.name.clone(),
            public_ip: row.public_ip.clone(),
            region: row.region.clone(),
            size: row.size.clone(),
            status,
        });
    }

    let result = serde_json::to_value(CreateInstancesResult { created: result_rows })
        .expect("CreateInstancesResult always serializes");
    TaskOutcome::completed(result, logs)
}
