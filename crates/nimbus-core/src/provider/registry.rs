//! Provider registry -- a named collection of available provider adapters.
//!
//! Lets the executor look up adapters by the `provider_id` tag stored on
//! each instance request at runtime.

use std::collections::HashMap;

use super::trait_def::ProviderAdapter;

/// A collection of registered [`ProviderAdapter`] implementations, keyed
/// by provider tag.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Box<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider adapter under the name returned by
    /// [`ProviderAdapter::name`]. Replaces and returns any prior adapter
    /// registered under the same name.
    pub fn register(
        &mut self,
        provider: impl ProviderAdapter + 'static,
    ) -> Option<Box<dyn ProviderAdapter>> {
        let name = provider.name().to_string();
        self.providers.insert(name, Box::new(provider))
    }

    /// Look up a provider adapter by tag.
    pub fn get(&self, name: &str) -> Option<&dyn ProviderAdapter> {
        self.providers.get(name).map(|b| b.as_ref())
    }

    /// List the tags of all registered providers. Order is not guaranteed.
    pub fn list(&self) -> Vec<&str> {
        self.providers.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::mock::MockProviderAdapter;

    #[test]
    fn registry_starts_empty() {
        let registry = ProviderRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn register_and_get() {
        let mut registry = ProviderRegistry::new();
        let old = registry.register(MockProviderAdapter::new("mock"));
        assert!(old.is_none());
        assert_eq!(registry.get("mock").unwrap().name(), "mock");
    }

    #[test]
    fn register_replaces_existing() {
        let mut registry = ProviderRegistry::new();
        registry.register(MockProviderAdapter::new("mock"));
        let old = registry.register(MockProviderAdapter::new("mock"));
        assert!(old.is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn get_missing_returns_none() {
        let registry = ProviderRegistry::new();
        assert!(registry.get("nonexistent").is_none());
    }
}
