//! `nimbus instance` subcommands.

use anyhow::Context;
use sqlx::PgPool;

use nimbus_db::models::{InstanceStatus, Priority, StatusFilterMode};
use nimbus_db::pagination::Page;
use nimbus_db::queries::instances::{self, InstanceFilter, StatusFilterModeOrDefault};
use nimbus_db::queries::{projects, tasks};
use nimbus_core::executor::create_instances::CreateInstancesPayload;
use nimbus_core::executor::terminate_instances::TerminateInstancesPayload;

use crate::exit::CliError;

pub async fn list(
    pool: &PgPool,
    owner_id: i64,
    status: Option<InstanceStatus>,
    not_equal: bool,
    include_deleted: bool,
) -> Result<(), CliError> {
    let filter = InstanceFilter {
        status,
        status_filter: StatusFilterModeOrDefault(if not_equal {
            StatusFilterMode::NotEqual
        } else {
            StatusFilterMode::Equal
        }),
        include_deleted,
    };

    let rows = instances::list(pool, owner_id, &filter, Page::default())
        .await
        .context("failed to list instances")?;
    for i in rows {
        println!(
            "{} {} {} {} ip={}",
            i.id,
            i.name,
            i.status,
            i.region,
            i.public_ip.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

/// Enqueue a `CreateInstances` task (the CLI equivalent of `POST /instances`).
pub async fn create(
    pool: &PgPool,
    owner_id: i64,
    project: &str,
    priority: Priority,
    payload: CreateInstancesPayload,
) -> Result<(), CliError> {
    let project = projects::get_by_name(pool, owner_id, project)
        .await
        .context("failed to look up project")?;
    let payload = serde_json::to_value(payload).expect("CreateInstancesPayload always serializes");

    let task = tasks::create(
        pool,
        owner_id,
        project.id,
        None,
        nimbus_db::models::Action::CreateInstances,
        priority,
        payload,
    )
    .await
    .context("failed to submit create-instances task")?;
    println!("{}", task.id);
    Ok(())
}

/// Enqueue a `TerminateInstances` task (the CLI equivalent of `DELETE /instances`).
pub async fn terminate(
    pool: &PgPool,
    owner_id: i64,
    project: &str,
    priority: Priority,
    payload: TerminateInstancesPayload,
) -> Result<(), CliError> {
    let project = projects::get_by_name(pool, owner_id, project)
        .await
        .context("failed to look up project")?;
    let payload = serde_json::to_value(payload).expect("TerminateInstancesPayload always serializes");

    let task = tasks::create(
        pool,
        owner_id,
        project.id,
        None,
        nimbus_db::models::Action::TerminateInstances,
        priority,
        payload,
    )
    .await
    .context("failed to submit terminate-instances task")?;
    println!("{}", task.id);
    Ok(())
}
