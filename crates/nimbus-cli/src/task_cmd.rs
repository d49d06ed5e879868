//! `nimbus task` subcommands.

use anyhow::Context;
use sqlx::PgPool;
use uuid::Uuid;

use nimbus_db::models::{Action, Priority};
use nimbus_db::pagination::Page;
use nimbus_db::queries::{projects, tasks};

use crate::exit::CliError;

fn parse_uuid(raw: &str, what: &str) -> Result<Uuid, CliError> {
    Uuid::parse_str(raw).map_err(|e| CliError::Usage(format!("invalid {what} {raw:?}: {e}")))
}

pub async fn submit(
    pool: &PgPool,
    owner_id: i64,
    project: &str,
    action: Action,
    priority: Priority,
    payload: serde_json::Value,
    instance_id: Option<&str>,
) -> Result<(), CliError> {
    let instance_id = instance_id
        .map(|raw| parse_uuid(raw, "instance id"))
        .transpose()?;

    let project = projects::get_by_name(pool, owner_id, project)
        .await
        .context("failed to look up project")?;

    let task = tasks::create(pool, owner_id, project.id, instance_id, action, priority, payload)
        .await
        .context("failed to submit task")?;
    println!("{}", task.id);
    Ok(())
}

pub async fn list(pool: &PgPool, owner_id: i64, project: &str) -> Result<(), CliError> {
    let project = projects::get_by_name(pool, owner_id, project)
        .await
        .context("failed to look up project")?;
    let tasks = tasks::list_by_project(pool, owner_id, project.id, Page::default())
        .await
        .context("failed to list tasks")?;
    for t in tasks {
        println!("{} {} {} attempts={}", t.id, t.action, t.status, t.attempts);
    }
    Ok(())
}

pub async fn get(pool: &PgPool, owner_id: i64, task_id: &str) -> Result<(), CliError> {
    let id = parse_uuid(task_id, "task id")?;
    let task = tasks::get_by_id(pool, owner_id, id)
        .await
        .context("failed to fetch task")?;
    println!(
        "{} action={} status={} priority={} attempts={} error={:?}",
        task.id, task.action, task.status, task.priority, task.attempts, task.error
    );
    if let Some(result) = &task.result {
        println!("result: {result}");
    }
    Ok(())
}

pub async fn retry(pool: &PgPool, task_id: &str) -> Result<(), CliError> {
    let id = parse_uuid(task_id, "task id")?;
    let retried = tasks::retry_failed_to_pending(pool, id)
        .await
        .context("failed to retry task")?;
    if retried {
        println!("task {id} reset to pending");
    } else {
        return Err(CliError::Usage(format!(
            "task {id} is not in a retryable state (must be failed with attempts < MAX_ATTEMPTS)"
        )));
    }
    Ok(())
}
