//! A provisioner that shells out to a local script, standing in for an
//! SSH-based configuration-management run.
//!
//! The inventory is a temp file of `name=ip` lines; `configure_host` and
//! `run_playbook` invoke `self.command` with the inventory path and the
//! relevant argument appended, via `std::process::Command`.

use std::collections::HashMap;
use std::io::Write;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use uuid::Uuid;

use crate::error::ProvisionerError;

use super::trait_def::Provisioner;

/// Runs `command <args...>` for each provisioning step.
pub struct ScriptProvisioner {
    command: String,
}

impl ScriptProvisioner {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<(), ProvisionerError> {
        let output = std::process::Command::new(&self.command)
            .args(args)
            .output()
            .map_err(|e| ProvisionerError::Failed(format!("failed to spawn {}: {e}", self.command)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProvisionerError::Failed(format!(
                "{} exited with {}: {stderr}",
                self.command, output.status
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Provisioner for ScriptProvisioner {
    fn name(&self) -> &str {
        "script"
    }

    async fn create_inventory(
        &self,
        hosts: &HashMap<String, String>,
    ) -> Result<String, ProvisionerError> {
        let mut file = NamedTempFile::new()
            .map_err(|e| ProvisionerError::Failed(format!("failed to create inventory file: {e}")))?;

        for (name, ip) in hosts {
            writeln!(file, "{name}={ip}")
                .map_err(|e| ProvisionerError::Failed(format!("failed to write inventory: {e}")))?;
        }

        let path = file
            .into_temp_path()
            .keep()
            .map_err(|e| ProvisionerError::Failed(format!("failed to persist inventory: {e}")))?;

        Ok(path.to_string_lossy().into_owned())
    }

    async fn configure_host(&self, inventory: &str, host: &str) -> Result<(), ProvisionerError> {
        self.run(&["--inventory", inventory, "--configure", host])
    }

    async fn run_playbook(&self, inventory: &str, task_id: Uuid) -> Result<(), ProvisionerError> {
        let task_id = task_id.to_string();
        self.run(&["--inventory", inventory, "--playbook", &task_id])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_inventory_writes_name_ip_lines() {
        let provisioner = ScriptProvisioner::new("true");
        let mut hosts = HashMap::new();
        hosts.insert("web-1".to_string(), "10.0.0.1".to_string());

        let inventory = provisioner.create_inventory(&hosts).await.unwrap();
        let contents = std::fs::read_to_string(&inventory).unwrap();
        assert_eq!(contents.trim(), "web-1=10.0.0.1");

        let _ = std::fs::remove_file(inventory);
    }

    #[tokio::test]
    async fn configure_host_surfaces_nonzero_exit() {
        let provisioner = ScriptProvisioner::new("false");
        let err = provisioner
            .configure_host("/tmp/doesnotmatter", "web-1")
            .await
            .expect_err("`false` should exit non-zero");
        assert!(matches!(err, ProvisionerError::Failed(_)));
    }
}
