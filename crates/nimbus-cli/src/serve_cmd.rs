//! `nimbus serve`: run the scheduler loop and the HTTP API side by side,
//! shutting both down gracefully on Ctrl-C.

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::info;

use nimbus_core::api;
use nimbus_core::provider::{MockProviderAdapter, ProviderRegistry};
use nimbus_core::provisioner::registry::create_provisioner;
use nimbus_core::scheduler::{Scheduler, SchedulerConfig};

/// Build the provider registry this process serves.
///
/// Only [`MockProviderAdapter`] is wired in -- concrete cloud adapters
/// (AWS, Hetzner, ...) are out of scope here; the `ProviderAdapter` trait
/// is the seam a real deployment plugs into.
fn build_provider_registry() -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    registry.register(MockProviderAdapter::new("mock"));
    registry
}

pub async fn run(pool: PgPool, bind: &str, port: u16) -> Result<()> {
    let providers = build_provider_registry();

    let provisioner_mode = std::env::var("NIMBUS_PROVISIONER").unwrap_or_else(|_| "noop".to_string());
    let provisioner = create_provisioner(&provisioner_mode)
        .with_context(|| format!("invalid NIMBUS_PROVISIONER value {provisioner_mode:?}"))?;

    let scheduler = Arc::new(Scheduler::new(
        pool.clone(),
        providers,
        BoxedProvisioner(provisioner),
        SchedulerConfig::default(),
    ));
    let cancel = scheduler.cancellation_token();

    let scheduler_handle = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move { scheduler.run().await })
    };

    let router = api::build_router(pool);
    let addr = format!("{bind}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "nimbus API listening");

    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
    });

    server.await.context("HTTP server failed")?;

    cancel.cancel();
    scheduler_handle.await.context("scheduler task panicked")?;

    Ok(())
}

/// `Scheduler::new` takes `impl Provisioner`, but the mode string is only
/// known at runtime, so we box it and forward the trait.
struct BoxedProvisioner(Box<dyn nimbus_core::provisioner::Provisioner>);

#[async_trait::async_trait]
impl nimbus_core::provisioner::Provisioner for BoxedProvisioner {
    fn name(&self) -> &str {
        self.0.name()
    }

    async fn create_inventory(
        &self,
        hosts: &std::collections::HashMap<String, String>,
    ) -> Result<String, nimbus_core::ProvisionerError> {
        self.0.create_inventory(hosts).await
    }

    async fn configure_host(&self, inventory: &str, host: &str) -> Result<(), nimbus_core::ProvisionerError> {
        self.0.configure_host(inventory, host).await
    }

    async fn run_playbook(&self, inventory: &str, task_id: uuid::Uuid) -> Result<(), nimbus_core::ProvisionerError> {
        self.0.run_playbook(inventory, task_id).await
    }
}
