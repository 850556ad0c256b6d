//! D-Bus bus policy.

use super::{Definer, Scoped, SecuritySystem, Snippets};
use crate::{ConnectedPlug, ConnectedSlot, Error, HostMode, Interface, PlugInfo, Result, SecurityTag, SlotInfo};

const HEADER: &str = r#"<?xml version="1.0"?>
<!DOCTYPE busconfig PUBLIC
 "-//freedesktop//DTD D-BUS Bus Configuration 1.0//EN"
 "http://www.freedesktop.org/standards/dbus/1.0/busconfig.dtd">
<busconfig>
"#;

const FOOTER: &str = "</busconfig>\n";

/// Bus policy fragments per security tag, in contribution order.
///
/// The assembled output for a tag is a complete `busconfig` document.
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

    /// Add a policy fragment to every tag in scope.
    ///
    /// Fragments must be XML elements; anything not starting with `<` is
    /// refused so a broken hook cannot produce an unparseable document.
    pub fn add_snippet(&mut self, snippet: impl Into<String>) -> Result<()> {
        let snippet = snippet.into();
        if !snippet.trim_start().starts_with('<') {
            return Err(Error::InvalidDeclaration(format!(
                "bus policy fragment is not XML: {snippet:?}"
            )));
        }
        self.snippets.add(snippet);
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
        iface.dbus()
    }
}

impl super::Specification for Specification {
    fn security_system(&self) -> SecuritySystem {
        SecuritySystem::DBus
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
        let body = super::join_lines(self.snippets.for_tag(tag)?);
        Ok(format!("{HEADER}{body}{FOOTER}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Specification as _;

    #[test]
    fn document_wraps_fragments() {
        let mut spec = Specification::new(HostMode::Isolated);
        let previous = spec.snippets.enter(vec![SecurityTag::app("producer", "app")]);
        spec.add_snippet("<policy user=\"root\"/>").unwrap();
        spec.snippets.leave(previous);

        let doc = spec.snippet_for_tag("snap.producer.app").unwrap();
        assert!(doc.starts_with("<?xml version=\"1.0\"?>"));
        assert!(doc.contains("<busconfig>\n<policy user=\"root\"/>\n</busconfig>\n"));
    }

    #[test]
    fn non_xml_fragment_is_refused() {
        let mut spec = Specification::new(HostMode::Trusted);
        assert!(spec.add_snippet("allow everything").is_err());
    }
}
