//! Provisioner interface: the configuration-management step invoked after
//! instance creation when a request opts in via `provision = true`.

pub mod noop;
pub mod registry;
pub mod script;
pub mod trait_def;

pub use noop::NoopProvisioner;
pub use registry::ProvisionerRegistry;
pub use script::ScriptProvisioner;
pub use trait_def::Provisioner;
