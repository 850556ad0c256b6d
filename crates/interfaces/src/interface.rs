//! The capability definition contract.

use crate::backend::{Definer, apparmor, dbus, kmod, udev};
use crate::policy::{Decision, PolicyKind};
use crate::{Error, PlugInfo, Result, SlotInfo};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether the platform package is part of the trusted base.
///
/// On a trusted host the platform's services run unconfined, so no peer
/// label can be predicted for them; on an isolated host they run under the
/// same enforcement as any other package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostMode {
    #[default]
    Trusted,
    Isolated,
}

impl fmt::Display for HostMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostMode::Trusted => f.write_str("trusted"),
            HostMode::Isolated => f.write_str("isolated"),
        }
    }
}

/// Metadata about a capability, fixed when it is defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StaticInfo {
    pub summary: &'static str,
    /// Present as a slot of the platform package on trusted hosts.
    pub implicit_on_trusted: bool,
    /// Present as a slot of the platform package on isolated hosts.
    pub implicit_on_isolated: bool,
    /// Base declaration text contributed for plugs of this capability.
    pub base_declaration_plugs: &'static str,
    /// Base declaration text contributed for slots of this capability.
    pub base_declaration_slots: &'static str,
}

/// Maximum number of simultaneous connections per declaration.
///
/// `None` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Cardinality {
    pub plug: Option<usize>,
    pub slot: Option<usize>,
}

/// A capability definition.
///
/// Implementations are stateless values. Every backend accessor defaults to
/// `None`, meaning the capability contributes nothing to that backend; a
/// definition that has hooks for a backend implements [`Definer`] for the
/// backend's specification and returns itself.
pub trait Interface: Send + Sync + fmt::Debug {
    /// Unique name of the capability.
    fn name(&self) -> &'static str;

    fn static_info(&self) -> StaticInfo;

    /// Structural checks on a plug declaration. Must not depend on any
    /// connection.
    fn sanitize_plug(&self, _plug: &PlugInfo) -> Result<()> {
        Ok(())
    }

    /// Structural checks on a slot declaration.
    fn sanitize_slot(&self, _slot: &SlotInfo) -> Result<()> {
        Ok(())
    }

    /// Capability-specific auto-connect predicate, consulted in addition to
    /// the base declaration.
    fn auto_connect(&self, _plug: &PlugInfo, _slot: &SlotInfo) -> bool {
        true
    }

    /// Replace the base declaration's decision for this pair.
    ///
    /// Must never be stricter for a more trusted owner of either side;
    /// resolution fails for an override that is.
    fn policy_override(&self, _kind: PolicyKind, _plug: &PlugInfo, _slot: &SlotInfo) -> Option<Decision> {
        None
    }

    fn cardinality(&self) -> Cardinality {
        Cardinality::default()
    }

    /// Whether a plug may connect to a slot of its own package.
    fn allows_self_connection(&self) -> bool {
        true
    }

    fn apparmor(&self) -> Option<&dyn Definer<apparmor::Specification>> {
        None
    }

    fn dbus(&self) -> Option<&dyn Definer<dbus::Specification>> {
        None
    }

    fn kmod(&self) -> Option<&dyn Definer<kmod::Specification>> {
        None
    }

    fn udev(&self) -> Option<&dyn Definer<udev::Specification>> {
        None
    }
}

/// Check a plug declaration against its capability definition.
///
/// Sanitization never mutates the declaration; running it twice on the same
/// input gives the same answer.
pub fn sanitize_plug(iface: &dyn Interface, plug: &PlugInfo) -> Result<()> {
    if plug.interface != iface.name() {
        return Err(Error::InvalidDeclaration(format!(
            "plug {}:{} uses interface {}, not {}",
            plug.package.name,
            plug.name,
            plug.interface,
            iface.name()
        )));
    }
    iface
        .sanitize_plug(plug)
        .map_err(|e| in_context(e, "plug", &plug.package.name, &plug.name))
}

/// Check a slot declaration against its capability definition.
pub fn sanitize_slot(iface: &dyn Interface, slot: &SlotInfo) -> Result<()> {
    if slot.interface != iface.name() {
        return Err(Error::InvalidDeclaration(format!(
            "slot {}:{} uses interface {}, not {}",
            slot.package.name,
            slot.name,
            slot.interface,
            iface.name()
        )));
    }
    iface
        .sanitize_slot(slot)
        .map_err(|e| in_context(e, "slot", &slot.package.name, &slot.name))
}

fn in_context(err: Error, side: &str, package: &str, name: &str) -> Error {
    match err {
        Error::InvalidDeclaration(reason) => {
            Error::InvalidDeclaration(format!("{side} {package}:{name}: {reason}"))
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::{DBus, SerialPort, testutil};
    use crate::{AttrValue, Declaration, PackageInfo, PackageKind};
    use proptest::prelude::*;

    #[derive(Debug)]
    struct NeedsPath;

    impl Interface for NeedsPath {
        fn name(&self) -> &'static str {
            "needs-path"
        }

        fn static_info(&self) -> StaticInfo {
            StaticInfo {
                summary: "test interface",
                implicit_on_trusted: false,
                implicit_on_isolated: false,
                base_declaration_plugs: "",
                base_declaration_slots: "",
            }
        }

        fn sanitize_slot(&self, slot: &SlotInfo) -> Result<()> {
            slot.attrs.require_str("path").map(|_| ())
        }
    }

    fn slot(decl: Declaration) -> SlotInfo {
        let pkg = PackageInfo::builder("producer", PackageKind::App)
            .slot(decl)
            .build()
            .unwrap();
        pkg.slots().next().unwrap().clone()
    }

    #[test]
    fn sanitize_reports_declaration_context() {
        let err = sanitize_slot(&NeedsPath, &slot(Declaration::new("needs-path"))).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid declaration: slot producer:needs-path: missing attribute \"path\""
        );
    }

    #[test]
    fn sanitize_rejects_interface_mismatch() {
        let decl = Declaration::new("foo").interface("other");
        let err = sanitize_slot(&NeedsPath, &slot(decl)).unwrap_err();
        assert!(err.to_string().contains("uses interface other"));
    }

    #[test]
    fn sanitize_is_idempotent() {
        let slot = slot(Declaration::new("needs-path").attr("path", "/dev/null"));
        let before = slot.clone();
        assert!(sanitize_slot(&NeedsPath, &slot).is_ok());
        assert!(sanitize_slot(&NeedsPath, &slot).is_ok());
        assert_eq!(slot, before);
    }

    #[test]
    fn backends_default_to_none() {
        assert!(NeedsPath.apparmor().is_none());
        assert!(NeedsPath.dbus().is_none());
        assert!(NeedsPath.kmod().is_none());
        assert!(NeedsPath.udev().is_none());
        assert_eq!(NeedsPath.cardinality(), Cardinality::default());
    }

    fn attr_value() -> impl Strategy<Value = AttrValue> {
        prop_oneof![
            Just(AttrValue::from("system")),
            Just(AttrValue::from("session")),
            Just(AttrValue::from("org.example.Foo")),
            Just(AttrValue::from("/dev/ttyUSB0")),
            Just(AttrValue::from("/dev/sda")),
            "[a-zA-Z0-9./_-]{0,16}".prop_map(AttrValue::from),
            any::<i64>().prop_map(AttrValue::from),
            any::<bool>().prop_map(AttrValue::from),
        ]
    }

    fn attrs() -> impl Strategy<Value = Vec<(String, AttrValue)>> {
        proptest::collection::vec(
            (prop_oneof![Just("bus"), Just("name"), Just("path"), Just("extra")], attr_value())
                .prop_map(|(key, value)| (key.to_string(), value)),
            0..4,
        )
    }

    fn owner() -> impl Strategy<Value = PackageKind> {
        prop_oneof![Just(PackageKind::App), Just(PackageKind::Gadget), Just(PackageKind::Platform)]
    }

    fn outcome(result: Result<()>) -> std::result::Result<(), String> {
        result.map_err(|e| e.to_string())
    }

    proptest! {
        /// Sanitizing a declaration twice gives the same answer and leaves
        /// it untouched.
        #[test]
        fn builtin_sanitizers_are_idempotent(pairs in attrs(), kind in owner()) {
            for iface in [&DBus as &dyn Interface, &SerialPort] {
                let mut decl = Declaration::new(iface.name());
                for (key, value) in &pairs {
                    decl = decl.attr(key.clone(), value.clone());
                }
                let (_, slot) = testutil::slot("producer", kind, decl.clone());
                let (_, plug) = testutil::plug("consumer", decl);

                let before = slot.clone();
                let first = outcome(sanitize_slot(iface, &slot));
                prop_assert_eq!(&first, &outcome(sanitize_slot(iface, &slot)));
                prop_assert_eq!(&slot, &before);

                let before = plug.clone();
                let first = outcome(sanitize_plug(iface, &plug));
                prop_assert_eq!(&first, &outcome(sanitize_plug(iface, &plug)));
                prop_assert_eq!(&plug, &before);
            }
        }
    }
}
