//! `nimbus ssh-key` subcommands.

use anyhow::Context;
use sqlx::PgPool;

use nimbus_db::queries::ssh_keys;

use crate::exit::CliError;

pub async fn add(pool: &PgPool, owner_id: i64, name: &str, public_key: &str) -> Result<(), CliError> {
    let key = ssh_keys::upsert(pool, owner_id, name, public_key)
        .await
        .context("failed to add ssh key")?;
    println!("{} {}", key.owner_id, key.name);
    Ok(())
}

pub async fn list(pool: &PgPool, owner_id: i64) -> Result<(), CliError> {
    let keys = ssh_keys::list(pool, owner_id)
        .await
        .context("failed to list ssh keys")?;
    for k in keys {
        println!("{} {}", k.owner_id, k.name);
    }
    Ok(())
}

pub async fn remove(pool: &PgPool, owner_id: i64, name: &str) -> Result<(), CliError> {
    ssh_keys::delete(pool, owner_id, name)
        .await
        .context("failed to delete ssh key")?;
    println!("deleted {name}");
    Ok(())
}
