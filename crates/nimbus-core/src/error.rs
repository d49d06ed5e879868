//! Error taxonomies for the adapter layer: [`ProviderError`] (cloud
//! provider calls) and [`ProvisionerError`] (configuration-management
//! calls). Both close over a small set of kinds the executor classifies
//! into terminal task outcomes.

use thiserror::Error;

/// Errors returned by a [`crate::provider::ProviderAdapter`].
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("credentials rejected: {0}")]
    Auth(String),

    /// 404 / "not found" on delete, or "already exists" on create. The
    /// executor classifies this as success (the resource is in the
    /// desired state already).
    #[error("already done: {0}")]
    AlreadyDone(String),

    #[error("provider error: {0}")]
    Transient(String),
}

impl ProviderError {
    /// Recognize the provider's canonical "already in desired state"
    /// markers in an arbitrary error message, the way a real adapter's
    /// wire errors would need to be classified.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if lower.contains("404")
            || lower.contains("not found")
            || lower.contains("could not be found")
            || lower.contains("already exists")
        {
            Self::AlreadyDone(message)
        } else {
            Self::Transient(message)
        }
    }
}

/// Errors returned by a [`crate::provisioner::Provisioner`].
#[derive(Debug, Error)]
pub enum ProvisionerError {
    #[error("provisioning failed: {0}")]
    Failed(String),
}
