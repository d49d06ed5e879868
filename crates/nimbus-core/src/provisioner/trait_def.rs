//! The [`Provisioner`] trait -- configuration-management capability.

use std::collections::HashMap;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::ProvisionerError;

/// Configuration-management backend invoked after instances come up.
///
/// Object-safe so it can be stored as `Box<dyn Provisioner>` in a
/// [`super::ProvisionerRegistry`].
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Human-readable name of the provisioner (e.g. "noop", "script").
    fn name(&self) -> &str;

    /// Build an inventory from a name -> public IP map. Returns an opaque
    /// handle the provisioner itself understands (e.g. a file path).
    async fn create_inventory(
        &self,
        hosts: &HashMap<String, String>,
    ) -> Result<String, ProvisionerError>;

    /// Configure a single host via the created inventory.
    async fn configure_host(&self, inventory: &str, host: &str) -> Result<(), ProvisionerError>;

    /// Run the configuration playbook identified by the owning task.
    async fn run_playbook(&self, inventory: &str, task_id: Uuid) -> Result<(), ProvisionerError>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn Provisioner) {}
};
