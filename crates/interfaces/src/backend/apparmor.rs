//! AppArmor profile snippets.

use super::{Definer, Scoped, SecuritySystem, Snippets};
use crate::{ConnectedPlug, ConnectedSlot, HostMode, Interface, PlugInfo, Result, SecurityTag, SlotInfo};

/// AppArmor rules per security tag, in contribution order.
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

    /// Add rules to every tag in scope.
    pub fn add_snippet(&mut self, snippet: impl Into<String>) {
        self.snippets.add(snippet);
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
        iface.apparmor()
    }
}

impl super::Specification for Specification {
    fn security_system(&self) -> SecuritySystem {
        SecuritySystem::AppArmor
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

    /// Rules in contribution order, one snippet per line group.
    fn snippet_for_tag(&self, tag: &str) -> Result<String> {
        Ok(super::join_lines(self.snippets.for_tag(tag)?))
    }
}
