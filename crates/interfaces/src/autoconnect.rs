//! Auto-connect evaluation and the structural checks shared with explicit
//! connects.

use crate::policy::{BaseDeclaration, Decision, PolicyKind};
use crate::{Connection, Error, Interface, PlugInfo, Result, SlotInfo};
use tracing::debug;

/// Whether `plug` may be connected to `slot` without asking anyone.
///
/// True only when the base declaration (or the capability's override)
/// allows auto-connection on both sides, the capability's own predicate
/// agrees, and the connection would not break a structural rule given the
/// `existing` connections. Pure: nothing is connected.
pub fn can_auto_connect<'a>(
    base: &BaseDeclaration,
    iface: &dyn Interface,
    plug: &PlugInfo,
    slot: &SlotInfo,
    existing: impl IntoIterator<Item = &'a Connection>,
) -> bool {
    match check_auto_connect(base, iface, plug, slot, existing) {
        Ok(()) => true,
        Err(e) => {
            debug!(
                plug_package = %plug.package.name,
                plug = %plug.name,
                slot_package = %slot.package.name,
                slot = %slot.name,
                reason = %e,
                "not auto-connecting"
            );
            false
        }
    }
}

/// Like [`can_auto_connect`], but reports why the pair was refused.
pub fn check_auto_connect<'a>(
    base: &BaseDeclaration,
    iface: &dyn Interface,
    plug: &PlugInfo,
    slot: &SlotInfo,
    existing: impl IntoIterator<Item = &'a Connection>,
) -> Result<()> {
    check_decision(base, iface, PolicyKind::Connection, plug, slot, Decision::Ask)?;
    check_decision(base, iface, PolicyKind::AutoConnection, plug, slot, Decision::Allow)?;
    if !iface.auto_connect(plug, slot) {
        return Err(Error::PolicyDenied(format!(
            "{} does not auto-connect {}:{} to {}:{}",
            iface.name(),
            plug.package.name,
            plug.name,
            slot.package.name,
            slot.name
        )));
    }
    check_structure(iface, plug, slot, existing)
}

/// Fail with [`Error::PolicyDenied`] unless the combined decision for
/// `kind` is at least `required`.
pub fn check_decision(
    base: &BaseDeclaration,
    iface: &dyn Interface,
    kind: PolicyKind,
    plug: &PlugInfo,
    slot: &SlotInfo,
    required: Decision,
) -> Result<()> {
    let resolution = base.resolve(iface, kind, plug, slot)?;
    let decision = resolution.combined();
    if decision < required {
        return Err(Error::PolicyDenied(format!(
            "{kind} of {}:{} to {}:{} is {decision} (plug side {}, slot side {})",
            plug.package.name, plug.name, slot.package.name, slot.name, resolution.plug, resolution.slot
        )));
    }
    Ok(())
}

/// Self-connection and connection-count rules.
///
/// `existing` is every live connection; the pair itself must not be among
/// them.
pub fn check_structure<'a>(
    iface: &dyn Interface,
    plug: &PlugInfo,
    slot: &SlotInfo,
    existing: impl IntoIterator<Item = &'a Connection>,
) -> Result<()> {
    let pair = format!("{}:{} to {}:{}", plug.package.name, plug.name, slot.package.name, slot.name);

    if !iface.allows_self_connection() && plug.package.name == slot.package.name {
        return Err(Error::StructuralConflict(format!(
            "{} forbids connecting a package to itself ({pair})",
            iface.name()
        )));
    }

    let mut plug_uses = 0;
    let mut slot_uses = 0;
    for conn in existing {
        let same_plug = conn.plug.package.name == plug.package.name && conn.plug.name == plug.name;
        let same_slot = conn.slot.package.name == slot.package.name && conn.slot.name == slot.name;
        if same_plug && same_slot {
            return Err(Error::StructuralConflict(format!("{pair} is already connected")));
        }
        plug_uses += usize::from(same_plug);
        slot_uses += usize::from(same_slot);
    }

    let limits = iface.cardinality();
    if limits.plug.is_some_and(|max| plug_uses >= max) {
        return Err(Error::StructuralConflict(format!(
            "plug {}:{} already has {plug_uses} connection(s)",
            plug.package.name, plug.name
        )));
    }
    if limits.slot.is_some_and(|max| slot_uses >= max) {
        return Err(Error::StructuralConflict(format!(
            "slot {}:{} already has {slot_uses} connection(s)",
            slot.package.name, slot.name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Attributes, Cardinality, Declaration, PackageInfo, PackageKind, Provenance, StaticInfo};
    use std::sync::Arc;

    #[derive(Debug)]
    struct Limited {
        slot_limit: Option<usize>,
        self_ok: bool,
        predicate: bool,
    }

    impl Interface for Limited {
        fn name(&self) -> &'static str {
            "limited"
        }

        fn static_info(&self) -> StaticInfo {
            StaticInfo {
                summary: "limited",
                implicit_on_trusted: false,
                implicit_on_isolated: false,
                base_declaration_plugs: "",
                base_declaration_slots: "",
            }
        }

        fn auto_connect(&self, _plug: &PlugInfo, _slot: &SlotInfo) -> bool {
            self.predicate
        }

        fn cardinality(&self) -> Cardinality {
            Cardinality {
                plug: None,
                slot: self.slot_limit,
            }
        }

        fn allows_self_connection(&self) -> bool {
            self.self_ok
        }
    }

    const PERMISSIVE: &str = r#"
[defaults.plugs]
connection = "allow"
auto-connection = "allow"

[defaults.slots]
connection = "allow"
auto-connection = "allow"
"#;

    fn plug_of(package: &str) -> PlugInfo {
        PackageInfo::builder(package, PackageKind::App)
            .app("app")
            .plug(Declaration::new("limited"))
            .build()
            .unwrap()
            .plug("limited")
            .unwrap()
            .clone()
    }

    fn slot_of(package: &str) -> SlotInfo {
        PackageInfo::builder(package, PackageKind::App)
            .app("app")
            .slot(Declaration::new("limited"))
            .build()
            .unwrap()
            .slot("limited")
            .unwrap()
            .clone()
    }

    fn connection(plug: &PlugInfo, slot: &SlotInfo) -> Connection {
        Connection {
            plug: Arc::new(plug.clone()),
            slot: Arc::new(slot.clone()),
            plug_attrs: Attributes::new(),
            slot_attrs: Attributes::new(),
            provenance: Provenance::Auto,
        }
    }

    #[test]
    fn first_pairing_auto_connects_until_limit() {
        let base = BaseDeclaration::parse(PERMISSIVE).unwrap();
        let iface = Limited {
            slot_limit: Some(1),
            self_ok: true,
            predicate: true,
        };
        let slot = slot_of("producer");
        let first = plug_of("consumer");
        let second = plug_of("other");

        assert!(can_auto_connect(&base, &iface, &first, &slot, []));

        let existing = [connection(&first, &slot)];
        assert!(!can_auto_connect(&base, &iface, &second, &slot, &existing));
        assert!(matches!(
            check_auto_connect(&base, &iface, &second, &slot, &existing),
            Err(Error::StructuralConflict(_))
        ));
    }

    #[test]
    fn ask_blocks_auto_connect_only() {
        let base = BaseDeclaration::parse(
            r#"
[slots.limited]
auto-connection = "ask"
"#,
        )
        .unwrap();
        let iface = Limited {
            slot_limit: None,
            self_ok: true,
            predicate: true,
        };
        let (plug, slot) = (plug_of("consumer"), slot_of("producer"));
        assert!(!can_auto_connect(&base, &iface, &plug, &slot, []));
        assert!(check_decision(&base, &iface, PolicyKind::Connection, &plug, &slot, Decision::Ask).is_ok());
    }

    #[test]
    fn predicate_is_consulted() {
        let base = BaseDeclaration::parse(PERMISSIVE).unwrap();
        let iface = Limited {
            slot_limit: None,
            self_ok: true,
            predicate: false,
        };
        let err = check_auto_connect(&base, &iface, &plug_of("consumer"), &slot_of("producer"), []).unwrap_err();
        assert!(matches!(err, Error::PolicyDenied(_)));
    }

    #[test]
    fn self_connection_can_be_forbidden() {
        let iface = Limited {
            slot_limit: None,
            self_ok: false,
            predicate: true,
        };
        let err = check_structure(&iface, &plug_of("both"), &slot_of("both"), []).unwrap_err();
        assert!(err.to_string().contains("to itself"));
    }

    #[test]
    fn reconnecting_the_same_pair_is_a_conflict() {
        let iface = Limited {
            slot_limit: None,
            self_ok: true,
            predicate: true,
        };
        let (plug, slot) = (plug_of("consumer"), slot_of("producer"));
        let existing = [connection(&plug, &slot)];
        let err = check_structure(&iface, &plug, &slot, &existing).unwrap_err();
        assert!(err.to_string().contains("already connected"));
    }
}
