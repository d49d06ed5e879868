//! Provisioner registry plus a `create_provisioner` factory, mirroring the
//! teacher's `create_isolation` mode-string dispatch.

use std::collections::HashMap;

use anyhow::{bail, Result};

use super::trait_def::Provisioner;
use super::{NoopProvisioner, ScriptProvisioner};

#[derive(Default)]
pub struct ProvisionerRegistry {
    provisioners: HashMap<String, Box<dyn Provisioner>>,
}

impl ProvisionerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        provisioner: impl Provisioner + 'static,
    ) -> Option<Box<dyn Provisioner>> {
        let name = provisioner.name().to_string();
        self.provisioners.insert(name, Box::new(provisioner))
    }

    pub fn get(&self, name: &str) -> Option<&dyn Provisioner> {
        self.provisioners.get(name).map(|b| b.as_ref())
    }

    pub fn len(&self) -> usize {
        self.provisioners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.provisioners.is_empty()
    }
}

/// Build a provisioner from a mode string: `"noop"` or `"script:<command>"`.
pub fn create_provisioner(mode: &str) -> Result<Box<dyn Provisioner>> {
    match mode.split_once(':') {
        Some(("script", command)) => Ok(Box::new(ScriptProvisioner::new(command))),
        _ if mode == "noop" => Ok(Box::new(NoopProvisioner)),
        _ => bail!("unknown provisioner mode: {mode:?} (expected \"noop\" or \"script:<command>\")"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_noop() {
        let provisioner = create_provisioner("noop").unwrap();
        assert_eq!(provisioner.name(), "noop");
    }

    #[test]
    fn create_script() {
        let provisioner = create_provisioner("script:/usr/bin/true").unwrap();
        assert_eq!(provisioner.name(), "script");
    }

    #[test]
    fn unknown_mode_errors() {
        assert!(create_provisioner("bogus").is_err());
    }

    #[test]
    fn registry_register_and_get() {
        let mut registry = ProvisionerRegistry::new();
        registry.register(NoopProvisioner);
        assert_eq!(registry.len(), 1);
        assert!(registry.get("noop").is_some());
        assert!(!registry.is_empty());
    }
}
