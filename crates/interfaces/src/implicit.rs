//! Slots the platform package provides without declaring them.

use crate::{Declaration, Error, HostMode, PackageInfo, PackageKind, Registry, Result};
use tracing::debug;

/// Add a slot for every capability that is implicitly present on hosts of
/// this mode, unless the package already has a slot of that capability.
///
/// Returns the number of slots added. Only the platform package carries
/// implicit slots.
pub fn add_implicit_slots(package: &mut PackageInfo, registry: &Registry, mode: HostMode) -> Result<usize> {
    if package.kind() != PackageKind::Platform {
        return Err(Error::InvalidDeclaration(format!(
            "package {} is not the platform package",
            package.name()
        )));
    }

    let mut added = 0;
    for iface in registry.all() {
        let info = iface.static_info();
        let implicit = match mode {
            HostMode::Trusted => info.implicit_on_trusted,
            HostMode::Isolated => info.implicit_on_isolated,
        };
        if !implicit || package.slots().any(|slot| slot.interface == iface.name()) {
            continue;
        }
        package.add_slot(Declaration::new(iface.name()))?;
        added += 1;
    }
    debug!(package = package.name(), %mode, added, "added implicit slots");
    Ok(added)
}
