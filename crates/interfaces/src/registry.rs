//! The capability catalogue.

use crate::{Error, Interface, Result, StaticInfo};
use indexmap::IndexMap;
use tracing::debug;

/// Capability definitions keyed by name, in registration order.
///
/// A registry is filled once and then only read. Tests build their own
/// instance; production code uses [`crate::builtin::registry`].
#[derive(Debug, Default)]
pub struct Registry {
    interfaces: IndexMap<&'static str, Box<dyn Interface>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a definition. Fails if the name is taken.
    pub fn register(&mut self, iface: Box<dyn Interface>) -> Result<()> {
        let name = iface.name();
        if self.interfaces.contains_key(name) {
            return Err(Error::DuplicateCapability(name.to_string()));
        }
        debug!(interface = name, "registered interface");
        self.interfaces.insert(name, iface);
        Ok(())
    }

    /// Find a definition by name.
    pub fn lookup(&self, name: &str) -> Result<&dyn Interface> {
        self.interfaces
            .get(name)
            .map(|iface| iface.as_ref())
            .ok_or_else(|| Error::UnknownCapability(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.interfaces.contains_key(name)
    }

    /// Every definition in registration order. Each call starts over.
    pub fn all(&self) -> impl Iterator<Item = &dyn Interface> + '_ {
        self.interfaces.values().map(|iface| iface.as_ref())
    }

    pub fn static_info(&self, name: &str) -> Result<StaticInfo> {
        Ok(self.lookup(name)?.static_info())
    }

    pub fn len(&self) -> usize {
        self.interfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interfaces.is_empty()
    }
}
