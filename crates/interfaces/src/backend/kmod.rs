//! Kernel modules to load at boot.

use super::{Definer, Scoped, SecuritySystem, Snippets};
use crate::{ConnectedPlug, ConnectedSlot, Error, HostMode, Interface, PlugInfo, Result, SecurityTag, SlotInfo};

/// Kernel module names per security tag.
///
/// Order does not matter to the module loader, so the assembled list is
/// sorted.
#[derive(Debug)]
pub struct Specification {
    mode: HostMode,
    snippets: Snippets,
}

impl Specification {
    pub fn new(mode: HostMode) -> Self {
        Self {
            mode,
            snippets: Snippets::default(),
        }
    }

    /// Request a module for every tag in scope.
    pub fn add_module(&mut self, module: &str) -> Result<()> {
        if module.is_empty() || module.chars().any(|c| c.is_whitespace() || c == '/') {
            return Err(Error::InvalidDeclaration(format!(
                "invalid kernel module name {module:?}"
            )));
        }
        self.snippets.add(module);
        Ok(())
    }
}

impl Scoped for Specification {
    fn snippets_mut(&mut self) -> &mut Snippets {
        &mut self.snippets
    }

    fn mode(&self) -> HostMode {
        self.mode
    }

    fn definer(iface: &dyn Interface) -> Option<&dyn Definer<Self>> {
        iface.kmod()
    }
}

impl super::Specification for Specification {
    fn security_system(&self) -> SecuritySystem {
        SecuritySystem::KMod
    }

    fn host_mode(&self) -> HostMode {
        self.mode
    }

    fn add_connected_plug(&mut self, iface: &dyn Interface, plug: &ConnectedPlug, slot: &ConnectedSlot) -> Result<()> {
        super::connected_plug(self, iface, plug, slot)
    }

    fn add_connected_slot(&mut self, iface: &dyn Interface, plug: &ConnectedPlug, slot: &ConnectedSlot) -> Result<()> {
        super::connected_slot(self, iface, plug, slot)
    }

    fn add_permanent_plug(&mut self, iface: &dyn Interface, plug: &PlugInfo) -> Result<()> {
        super::permanent_plug(self, iface, plug)
    }

    fn add_permanent_slot(&mut self, iface: &dyn Interface, slot: &SlotInfo) -> Result<()> {
        super::permanent_slot(self, iface, slot)
    }

    fn security_tags(&self) -> Vec<SecurityTag> {
        self.snippets.tags()
    }

    fn snippet_for_tag(&self, tag: &str) -> Result<String> {
        let mut modules: Vec<&String> = self.snippets.for_tag(tag)?.iter().collect();
        modules.sort();
        Ok(super::join_lines(modules))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Specification as _;

    #[test]
    fn modules_are_sorted_and_unique() {
        let mut spec = Specification::new(HostMode::Trusted);
        let previous = spec.snippets.enter(vec![SecurityTag::app("dialer", "pppd")]);
        spec.add_module("ppp_generic").unwrap();
        spec.add_module("bsd_comp").unwrap();
        spec.add_module("ppp_generic").unwrap();
        spec.snippets.leave(previous);

        assert_eq!(spec.snippet_for_tag("snap.dialer.pppd").unwrap(), "bsd_comp\nppp_generic\n");
    }

    #[test]
    fn module_names_are_checked() {
        let mut spec = Specification::new(HostMode::Trusted);
        assert!(spec.add_module("").is_err());
        assert!(spec.add_module("../evil").is_err());
        assert!(spec.add_module("two words").is_err());
    }
}
