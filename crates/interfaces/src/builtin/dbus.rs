//! `dbus`: owning, or talking to, one well-known bus name.

use super::slot_label;
use crate::backend::{Definer, apparmor, dbus, implicit_system_connected_slot, implicit_system_permanent_slot};
use crate::{
    Attributes, Cardinality, ConnectedPlug, ConnectedSlot, Error, HostMode, Interface, PlugInfo, Result, SlotInfo,
    StaticInfo,
};
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

const BASE_DECLARATION_SLOTS: &str = r#"
[slots.dbus]
auto-connection = { platform = "allow", privileged = "allow", ordinary = "ask" }
"#;

const MAX_NAME_LEN: usize = 255;

// Compile-time constant; a failure here is a bug in the pattern.
static BUS_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_-][A-Za-z0-9_-]*(\.[A-Za-z_-][A-Za-z0-9_-]*)+$")
        .unwrap_or_else(|e| panic!("BUG: invalid bus name pattern: {e}"))
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bus {
    System,
    Session,
}

impl fmt::Display for Bus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bus::System => f.write_str("system"),
            Bus::Session => f.write_str("session"),
        }
    }
}

/// The bus and well-known name a declaration refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Endpoint {
    bus: Bus,
    name: String,
}

impl Endpoint {
    fn from_attrs(attrs: &Attributes) -> Result<Self> {
        let bus = match attrs.require_str("bus")? {
            "system" => Bus::System,
            "session" => Bus::Session,
            other => {
                return Err(Error::InvalidDeclaration(format!(
                    "bus must be \"system\" or \"session\", not {other:?}"
                )));
            }
        };
        let name = attrs.require_str("name")?;
        if name.len() > MAX_NAME_LEN || !BUS_NAME.is_match(name) {
            return Err(Error::InvalidDeclaration(format!("invalid bus name {name:?}")));
        }
        Ok(Self {
            bus,
            name: name.to_string(),
        })
    }

    /// Object path pattern covering the name's tree: `org.example.Foo`
    /// serves `/org/example/Foo{,/**}`.
    fn path(&self) -> String {
        format!("/{}{{,/**}}", self.name.replace('.', "/").replace('-', "_"))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DBus;

impl Interface for DBus {
    fn name(&self) -> &'static str {
        "dbus"
    }

    fn static_info(&self) -> StaticInfo {
        StaticInfo {
            summary: "allows owning a specific name on DBus",
            implicit_on_trusted: false,
            implicit_on_isolated: false,
            base_declaration_plugs: "",
            base_declaration_slots: BASE_DECLARATION_SLOTS,
        }
    }

    fn sanitize_plug(&self, plug: &PlugInfo) -> Result<()> {
        Endpoint::from_attrs(&plug.attrs).map(|_| ())
    }

    fn sanitize_slot(&self, slot: &SlotInfo) -> Result<()> {
        Endpoint::from_attrs(&slot.attrs).map(|_| ())
    }

    /// Plug and slot must name the same bus and the same name.
    fn auto_connect(&self, plug: &PlugInfo, slot: &SlotInfo) -> bool {
        match (Endpoint::from_attrs(&plug.attrs), Endpoint::from_attrs(&slot.attrs)) {
            (Ok(plug), Ok(slot)) => plug == slot,
            _ => false,
        }
    }

    fn cardinality(&self) -> Cardinality {
        Cardinality {
            plug: None,
            slot: Some(1),
        }
    }

    fn apparmor(&self) -> Option<&dyn Definer<apparmor::Specification>> {
        Some(self)
    }

    fn dbus(&self) -> Option<&dyn Definer<dbus::Specification>> {
        Some(self)
    }
}

impl Definer<apparmor::Specification> for DBus {
    fn connected_plug(
        &self,
        spec: &mut apparmor::Specification,
        mode: HostMode,
        _plug: &ConnectedPlug,
        slot: &ConnectedSlot,
    ) -> Result<()> {
        let endpoint = Endpoint::from_attrs(slot.static_attrs())?;
        let label = slot_label(slot, mode);
        spec.add_snippet(format!(
            r#"# Description: Allow talking to {name} on the {bus} bus
dbus (receive, send)
    bus={bus}
    path={path}
    peer=(name={name}, label={label}),

dbus (send)
    bus={bus}
    path={path}
    interface=org.freedesktop.DBus.Properties
    peer=(name={name}, label={label}),

dbus (send)
    bus={bus}
    path={path}
    interface=org.freedesktop.DBus.Introspectable
    member=Introspect
    peer=(name={name}, label={label}),"#,
            name = endpoint.name,
            bus = endpoint.bus,
            path = endpoint.path(),
        ));
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
        let endpoint = Endpoint::from_attrs(slot.static_attrs())?;
        spec.add_snippet(format!(
            r#"# Allow {plug_label} to talk to {name}
dbus (receive, send)
    bus={bus}
    path={path}
    peer=(label={plug_label}),"#,
            plug_label = plug.label_expression(),
            name = endpoint.name,
            bus = endpoint.bus,
            path = endpoint.path(),
        ));
        Ok(())
    }

    fn permanent_slot(&self, spec: &mut apparmor::Specification, mode: HostMode, slot: &SlotInfo) -> Result<()> {
        if implicit_system_permanent_slot(slot, mode) {
            return Ok(());
        }
        let endpoint = Endpoint::from_attrs(&slot.attrs)?;
        let abstraction = match endpoint.bus {
            Bus::System => "#include <abstractions/dbus-strict>",
            Bus::Session => "#include <abstractions/dbus-session-strict>",
        };
        spec.add_snippet(format!(
            r#"# Description: Allow owning {name} on the {bus} bus
{abstraction}

dbus (send)
    bus={bus}
    path=/org/freedesktop/DBus
    interface=org.freedesktop.DBus
    member="{{Request,Release}}Name"
    peer=(name=org.freedesktop.DBus, label=unconfined),

dbus (send)
    bus={bus}
    path=/org/freedesktop/DBus
    interface=org.freedesktop.DBus
    member="GetConnectionUnix{{ProcessID,User}}"
    peer=(name=org.freedesktop.DBus, label=unconfined),

dbus (bind)
    bus={bus}
    name={name},

# Unconfined clients may talk to the service
dbus (receive, send)
    bus={bus}
    path={path}
    interface={name}{{,.*}}
    peer=(label=unconfined),"#,
            name = endpoint.name,
            bus = endpoint.bus,
            path = endpoint.path(),
        ));
        Ok(())
    }
}

impl Definer<dbus::Specification> for DBus {
    /// Only the system bus daemon reads per-service policy.
    fn permanent_slot(&self, spec: &mut dbus::Specification, mode: HostMode, slot: &SlotInfo) -> Result<()> {
        let endpoint = Endpoint::from_attrs(&slot.attrs)?;
        if endpoint.bus != Bus::System || implicit_system_permanent_slot(slot, mode) {
            return Ok(());
        }
        let name = endpoint.name;
        spec.add_snippet(format!(
            r#"<policy user="root">
    <allow own="{name}"/>
    <allow send_destination="{name}"/>
</policy>
<policy context="default">
    <allow send_destination="{name}"/>
</policy>"#
        ))
    }
}
