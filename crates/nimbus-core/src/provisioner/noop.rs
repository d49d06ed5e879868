//! A provisioner that always succeeds without doing anything. Used when a
//! request does not set `provision = true`, or in tests.

use std::collections::HashMap;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::ProvisionerError;

use super::trait_def::Provisioner;

#[derive(Debug, Default)]
pub struct NoopProvisioner;

#[async_trait]
impl Provisioner for NoopProvisioner {
    fn name(&self) -> &str {
        "noop"
    }

    async fn create_inventory(
        &self,
        hosts: &HashMap<String, String>,
    ) -> Result<String, ProvisionerError> {
        Ok(format!("noop-inventory:{}", hosts.len()))
    }

    async fn configure_host(&self, _inventory: &str, _host: &str) -> Result<(), ProvisionerError> {
        Ok(())
    }

    async fn run_playbook(&self, _inventory: &str, _task_id: Uuid) -> Result<(), ProvisionerError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_always_succeeds() {
        let provisioner = NoopProvisioner;
        let mut hosts = HashMap::new();
        hosts.insert("web-1".to_string(), "10.0.0.1".to_string());

        let inventory = provisioner.create_inventory(&hosts).await.unwrap();
        provisioner.configure_host(&inventory, "web-1").await.unwrap();
        provisioner
            .run_playbook(&inventory, Uuid::new_v4())
            .await
            .unwrap();
    }
}
