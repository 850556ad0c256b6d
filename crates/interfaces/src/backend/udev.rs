//! udev rules tagging devices for a security tag.

use super::{Definer, Scoped, SecuritySystem, Snippets};
use crate::{ConnectedPlug, ConnectedSlot, HostMode, Interface, PlugInfo, Result, SecurityTag, SlotInfo};

/// udev rules per security tag, in contribution order.
#[derive(Debug)]
pub struct Specification {
    mode: HostMode,
    snippets: Snippets,
    /// Name of the interface whose hook is running, for rule comments.
    current: Option<&'static str>,
}

impl Specification {
    pub fn new(mode: HostMode) -> Self {
        Self {
            mode,
            snippets: Snippets::default(),
            current: None,
        }
    }

    /// Add a raw rule to every tag in scope.
    pub fn add_snippet(&mut self, snippet: impl Into<String>) {
        self.snippets.add(snippet);
    }

    /// Tag devices matching `rule` (a comma separated list of match keys)
    /// for every security tag in scope.
    pub fn tag_device(&mut self, rule: &str) {
        let comment = self.current.map(|name| format!("# {name}\n")).unwrap_or_default();
        let scope = self.snippets.scope().to_vec();
        for tag in scope {
            let previous = self.snippets.enter(vec![tag.clone()]);
            self.snippets
                .add(format!("{comment}{rule}, TAG+=\"{}\"", tag.udev_tag()));
            self.snippets.leave(previous);
        }
    }

    fn run<F>(&mut self, iface: &dyn Interface, f: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        let previous = self.current.replace(iface.name());
        let result = f(self);
        self.current = previous;
        result
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
        iface.udev()
    }
}

impl super::Specification for Specification {
    fn security_system(&self) -> SecuritySystem {
        SecuritySystem::UDev
    }

    fn host_mode(&self) -> HostMode {
        self.mode
    }

    fn add_connected_plug(&mut self, iface: &dyn Interface, plug: &ConnectedPlug, slot: &ConnectedSlot) -> Result<()> {
        self.run(iface, |spec| super::connected_plug(spec, iface, plug, slot))
    }

    fn add_connected_slot(&mut self, iface: &dyn Interface, plug: &ConnectedPlug, slot: &ConnectedSlot) -> Result<()> {
        self.run(iface, |spec| super::connected_slot(spec, iface, plug, slot))
    }

    fn add_permanent_plug(&mut self, iface: &dyn Interface, plug: &PlugInfo) -> Result<()> {
        self.run(iface, |spec| super::permanent_plug(spec, iface, plug))
    }

    fn add_permanent_slot(&mut self, iface: &dyn Interface, slot: &SlotInfo) -> Result<()> {
        self.run(iface, |spec| super::permanent_slot(spec, iface, slot))
    }

    fn security_tags(&self) -> Vec<SecurityTag> {
        self.snippets.tags()
    }

    fn snippet_for_tag(&self, tag: &str) -> Result<String> {
        Ok(super::join_lines(self.snippets.for_tag(tag)?))
    }
}
