//! The [`ProviderAdapter`] trait -- the boundary to a specific cloud.

use async_trait::async_trait;

use crate::error::ProviderError;

/// Instance configuration requested from a provider.
#[derive(Debug, Clone)]
pub struct InstanceConfig {
    pub region: String,
    pub size: String,
    pub image: String,
    pub ssh_key_id: String,
    pub tags: Vec<String>,
}

/// A provider's view of a created instance.
#[derive(Debug, Clone)]
pub struct InstanceInfo {
    pub id: String,
    pub name: String,
    pub public_ip: String,
    pub provider_tag: String,
    pub region: String,
    pub size: String,
}

/// Adapter interface for a specific cloud provider.
///
/// Implementors wrap a provider's API/CLI/SDK and translate provider
/// errors into [`ProviderError`]'s closed taxonomy.
///
/// # Object Safety
///
/// Every method returns a concrete type, so `Box<dyn ProviderAdapter>` can
/// be stored in a [`super::ProviderRegistry`].
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Human-readable tag for this provider (e.g. "mock", "aws").
    fn name(&self) -> &str;

    /// Verify that the adapter's configured credentials are usable.
    async fn validate_credentials(&self) -> Result<(), ProviderError>;

    /// Create a single instance with the given logical name.
    ///
    /// A provider error whose message carries an "already exists" marker
    /// should surface as [`ProviderError::AlreadyDone`], not a hard
    /// failure -- see [`ProviderError::classify`].
    async fn create_instance(
        &self,
        name: &str,
        cfg: &InstanceConfig,
    ) -> Result<InstanceInfo, ProviderError>;

    /// Delete an instance by name within a region.
    ///
    /// A 404/"not found" response should surface as
    /// [`ProviderError::AlreadyDone`] -- the resource is already gone.
    async fn delete_instance(&self, name: &str, region: &str) -> Result<(), ProviderError>;
}

// Compile-time assertion: ProviderAdapter must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn ProviderAdapter) {}
};
