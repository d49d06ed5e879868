//! An in-process reference [`ProviderAdapter`] implementation.
//!
//! Used by tests and as documentation of the contract: it tracks
//! "created" instances in memory so `create_instance`/`delete_instance`
//! can exercise the idempotent already-exists/not-found paths real cloud
//! adapters must also implement.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::ProviderError;

use super::trait_def::{InstanceConfig, InstanceInfo, ProviderAdapter};

/// A provider adapter backed by an in-memory set of instance names.
pub struct MockProviderAdapter {
    tag: String,
    created: Mutex<HashSet<String>>,
    /// When set, `validate_credentials` fails with this message.
    reject_credentials: Option<String>,
}

impl MockProviderAdapter {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            created: Mutex::new(HashSet::new()),
            reject_credentials: None,
        }
    }

    /// Build an adapter whose `validate_credentials` always fails.
    pub fn with_rejected_credentials(tag: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            created: Mutex::new(HashSet::new()),
            reject_credentials: Some(reason.into()),
        }
    }
}

#[async_trait]
impl ProviderAdapter for MockProviderAdapter {
    fn name(&self) -> &str {
        &self.tag
    }

    async fn validate_credentials(&self) -> Result<(), ProviderError> {
        match &self.reject_credentials {
            Some(reason) => Err(ProviderError::Auth(reason.clone())),
            None => Ok(()),
        }
    }

    async fn create_instance(
        &self,
        name: &str,
        cfg: &InstanceConfig,
    ) -> Result<InstanceInfo, ProviderError> {
        let mut created = self.created.lock().expect("mock provider lock poisoned");
        if created.contains(name) {
            return Err(ProviderError::classify(format!(
                "instance {name} already exists"
            )));
        }
        created.insert(name.to_string());

        Ok(InstanceInfo {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            public_ip: "203.0.113.10".to_string(),
            provider_tag: self.tag.clone(),
            region: cfg.region.clone(),
            size: cfg.size.clone(),
        })
    }

    async fn delete_instance(&self, name: &str, _region: &str) -> Result<(), ProviderError> {
        let mut created = self.created.lock().expect("mock provider lock poisoned");
        if !created.remove(name) {
            return Err(ProviderError::classify(format!(
                "instance {name} not found"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> InstanceConfig {
        InstanceConfig {
            region: "us-east-1".to_string(),
            size: "small".to_string(),
            image: "ubuntu-22.04".to_string(),
            ssh_key_id: "default".to_string(),
            tags: vec![],
        }
    }

    #[tokio::test]
    async fn create_then_create_again_is_already_done() {
        let provider = MockProviderAdapter::new("mock");
        provider.create_instance("web-1", &cfg()).await.unwrap();

        let err = provider
            .create_instance("web-1", &cfg())
            .await
            .expect_err("duplicate create should fail");
        assert!(matches!(err, ProviderError::AlreadyDone(_)));
    }

    #[tokio::test]
    async fn delete_missing_is_already_done() {
        let provider = MockProviderAdapter::new("mock");
        let err = provider
            .delete_instance("ghost", "us-east-1")
            .await
            .expect_err("deleting a missing instance should fail");
        assert!(matches!(err, ProviderError::AlreadyDone(_)));
    }

    #[tokio::test]
    async fn create_then_delete_succeeds() {
        let provider = MockProviderAdapter::new("mock");
        provider.create_instance("web-2", &cfg()).await.unwrap();
        provider.delete_instance("web-2", "us-east-1").await.unwrap();
    }

    #[tokio::test]
    async fn rejected_credentials_surface_as_auth_error() {
        let provider = MockProviderAdapter::with_rejected_credentials("mock", "expired token");
        let err = provider.validate_credentials().await.unwrap_err();
        assert!(matches!(err, ProviderError::Auth(_)));
    }
}
