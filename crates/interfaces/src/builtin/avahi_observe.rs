//! `avahi-observe`: mDNS/DNS-SD discovery without the right to publish.

use super::slot_label;
use crate::backend::{Definer, apparmor, dbus, implicit_system_connected_slot, implicit_system_permanent_slot};
use crate::{ConnectedPlug, ConnectedSlot, HostMode, Interface, Result, SlotInfo, StaticInfo};

const SUMMARY: &str = "allows discovery on a local network via the mDNS/DNS-SD protocol suite";

const BASE_DECLARATION_SLOTS: &str = r#"
[slots.avahi-observe]
auto-connection = { platform = "allow", privileged = "ask" }
"#;

/// Slot side: the avahi daemon itself.
const PERMANENT_SLOT_APPARMOR: &str = r#"# Description: Allow operating as the avahi service. This gives
# privileged access to the system.

#include <abstractions/dbus-strict>

dbus (send)
    bus=system
    path=/org/freedesktop/DBus
    interface=org.freedesktop.DBus
    member="{Request,Release}Name"
    peer=(name=org.freedesktop.DBus, label=unconfined),

dbus (send)
    bus=system
    path=/org/freedesktop/DBus
    interface=org.freedesktop.DBus
    member="GetConnectionUnix{ProcessID,User}"
    peer=(label=unconfined),

# Allow binding the service to the requested connection name
dbus (bind)
    bus=system
    name="org.freedesktop.Avahi","#;

/// Resolver and browser objects an observer may use. Entry groups, which
/// publish services, are not listed.
const OBSERVED_OBJECTS: [(&str, &str); 4] = [
    ("AddressResolver", "address resolving"),
    ("HostNameResolver", "host name resolving"),
    ("ServiceResolver", "service resolving"),
    ("RecordBrowser", "record browsing"),
];

const BROWSERS: [(&str, &str); 3] = [
    ("DomainBrowser", "domain browsing"),
    ("ServiceBrowser", "service browsing"),
    ("ServiceTypeBrowser", "service type browsing"),
];

const PERMANENT_SLOT_DBUS: &str = r#"<policy user="root">
    <allow own="org.freedesktop.Avahi"/>
</policy>
<policy context="default">
    <allow send_destination="org.freedesktop.Avahi"/>
    <allow receive_sender="org.freedesktop.Avahi"/>
    <deny send_destination="org.freedesktop.Avahi" send_interface="org.freedesktop.Avahi.EntryGroup"/>
</policy>"#;

#[derive(Debug, Clone, Copy, Default)]
pub struct AvahiObserve;

impl Interface for AvahiObserve {
    fn name(&self) -> &'static str {
        "avahi-observe"
    }

    fn static_info(&self) -> StaticInfo {
        StaticInfo {
            summary: SUMMARY,
            implicit_on_trusted: true,
            implicit_on_isolated: false,
            base_declaration_plugs: "",
            base_declaration_slots: BASE_DECLARATION_SLOTS,
        }
    }

    fn apparmor(&self) -> Option<&dyn Definer<apparmor::Specification>> {
        Some(self)
    }

    fn dbus(&self) -> Option<&dyn Definer<dbus::Specification>> {
        Some(self)
    }
}

impl Definer<apparmor::Specification> for AvahiObserve {
    fn connected_plug(
        &self,
        spec: &mut apparmor::Specification,
        mode: HostMode,
        _plug: &ConnectedPlug,
        slot: &ConnectedSlot,
    ) -> Result<()> {
        spec.add_snippet(plug_rules(&slot_label(slot, mode)));
        Ok(())
    }

    fn connected_slot(
        &self,
        spec: &mut apparmor::Specification,
        mode: HostMode,
        plug: &ConnectedPlug,
        slot: &ConnectedSlot,
    ) -> Result<()> {
        if implicit_system_connected_slot(slot, mode) {
            return Ok(());
        }
        spec.add_snippet(slot_rules(&plug.label_expression()));
        Ok(())
    }

    fn permanent_slot(&self, spec: &mut apparmor::Specification, mode: HostMode, slot: &SlotInfo) -> Result<()> {
        if !implicit_system_permanent_slot(slot, mode) {
            spec.add_snippet(PERMANENT_SLOT_APPARMOR);
        }
        Ok(())
    }
}

impl Definer<dbus::Specification> for AvahiObserve {
    fn permanent_slot(&self, spec: &mut dbus::Specification, mode: HostMode, slot: &SlotInfo) -> Result<()> {
        if implicit_system_permanent_slot(slot, mode) {
            return Ok(());
        }
        spec.add_snippet(PERMANENT_SLOT_DBUS)
    }
}

/// Rules for a process observing the daemon labelled `label`.
fn plug_rules(label: &str) -> String {
    let mut rules = format!(
        r#"# Description: allows domain browsing, service browsing and service
# resolution

#include <abstractions/dbus-strict>

dbus (send)
    bus=system
    path=/
    interface=org.freedesktop.DBus.Peer
    member=Ping
    peer=(name=org.freedesktop.Avahi,label={label}),

# Allow accessing DBus properties and resolving
dbus (send)
    bus=system
    path=/
    interface=org.freedesktop.Avahi.Server{{,2}}
    member={{Get*,Resolve*,IsNSSSupportAvailable}}
    peer=(name=org.freedesktop.Avahi,label={label}),

# Allow receiving anything from the slot server
dbus (receive)
    bus=system
    interface=org.freedesktop.Avahi.Server{{,2}}
    peer=(label={label}),
"#
    );

    for (object, what) in OBSERVED_OBJECTS {
        rules.push_str(&format!(
            r#"
# {what}
dbus (send)
    bus=system
    path=/
    interface=org.freedesktop.Avahi.Server{{,2}}
    member={object}New
    peer=(name=org.freedesktop.Avahi,label={label}),

dbus (send)
    bus=system
    path=/Client*/{object}*
    interface=org.freedesktop.Avahi.{object}
    member=Free
    peer=(name=org.freedesktop.Avahi,label={label}),

dbus (receive)
    bus=system
    interface=org.freedesktop.Avahi.{object}
    peer=(label={label}),
"#
        ));
    }

    for (object, what) in BROWSERS {
        rules.push_str(&format!(
            r#"
# {what}
dbus (send)
    bus=system
    path=/
    interface=org.freedesktop.Avahi.Server{{,2}}
    member={object}{{New,PrepareNew}}
    peer=(name=org.freedesktop.Avahi,label={label}),

dbus (send)
    bus=system
    path=/Client*/{object}*
    interface=org.freedesktop.Avahi.{object}
    member={{Free,Start}}
    peer=(name=org.freedesktop.Avahi,label={label}),

dbus (receive)
    bus=system
    interface=org.freedesktop.Avahi.{object}
    peer=(label={label}),
"#
        ));
    }
    rules
}

/// Rules letting the daemon answer observers labelled `label`.
fn slot_rules(label: &str) -> String {
    let mut rules = format!(
        r#"# Allow observers to query the avahi service
dbus (receive)
    bus=system
    path=/
    interface=org.freedesktop.DBus.Peer
    member=Ping
    peer=(label={label}),

dbus (receive)
    bus=system
    path=/
    interface=org.freedesktop.Avahi.Server{{,2}}
    peer=(label={label}),

dbus (send)
    bus=system
    interface=org.freedesktop.Avahi.Server{{,2}}
    peer=(label={label}),
"#
    );

    for (object, what) in OBSERVED_OBJECTS.into_iter().chain(BROWSERS) {
        rules.push_str(&format!(
            r#"
# {what}
dbus (receive)
    bus=system
    path=/Client*/{object}*
    interface=org.freedesktop.Avahi.{object}
    peer=(label={label}),

dbus (send)
    bus=system
    interface=org.freedesktop.Avahi.{object}
    peer=(label={label}),
"#
        ));
    }
    rules
}
