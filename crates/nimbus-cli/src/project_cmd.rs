//! `nimbus project` subcommands.

use anyhow::Context;
use sqlx::PgPool;

use nimbus_db::pagination::Page;
use nimbus_db::queries::projects;

use crate::exit::CliError;

pub async fn create(pool: &PgPool, owner_id: i64, name: &str) -> Result<(), CliError> {
    let project = projects::create(pool, owner_id, name)
        .await
        .context("failed to create project")?;
    println!("{} {}", project.id, project.name);
    Ok(())
}

pub async fn list(pool: &PgPool, owner_id: i64) -> Result<(), CliError> {
    let projects = projects::list(pool, owner_id, Page::default())
        .await
        .context("failed to list projects")?;
    for p in projects {
        println!("{} {}", p.id, p.name);
    }
    Ok(())
}
