//! The connection model: installed packages and the connections between
//! their plugs and slots.

use crate::autoconnect::{self, check_decision, check_structure};
use crate::interface::{sanitize_plug, sanitize_slot};
use crate::policy::{BaseDeclaration, Decision, PolicyKind};
use crate::{
    Attributes, ConnRef, ConnectedPlug, ConnectedSlot, Connection, Error, PackageInfo, PackageKind, PlugInfo,
    PlugRef, Provenance, Registry, Result, SlotInfo, SlotRef,
};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Packages and connections, guarded by a single reader-writer lock.
///
/// Every mutation takes the write lock for its whole duration, so a
/// [`Snapshot`] taken under the read lock is always consistent.
#[derive(Debug)]
pub struct Repository {
    registry: Arc<Registry>,
    base: BaseDeclaration,
    state: RwLock<State>,
}

#[derive(Debug, Default)]
struct State {
    packages: BTreeMap<String, PackageInfo>,
    connections: BTreeMap<ConnRef, Connection>,
}

/// A consistent, immutable copy of the connection model.
///
/// Packages are ordered by name, connections by plug then slot reference.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub packages: Vec<PackageInfo>,
    pub connections: Vec<Connection>,
}

impl Repository {
    pub fn new(registry: Arc<Registry>, base: BaseDeclaration) -> Self {
        Self {
            registry,
            base,
            state: RwLock::new(State::default()),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn base_declaration(&self) -> &BaseDeclaration {
        &self.base
    }

    /// Add a package after sanitizing every plug and slot it declares.
    ///
    /// Nothing is stored unless every declaration passes.
    pub fn add_package(&self, package: PackageInfo) -> Result<()> {
        for plug in package.plugs() {
            sanitize_plug(self.registry.lookup(&plug.interface)?, plug)?;
        }
        for slot in package.slots() {
            sanitize_slot(self.registry.lookup(&slot.interface)?, slot)?;
        }

        let mut state = self.state.write();
        if state.packages.contains_key(package.name()) {
            return Err(Error::DuplicatePackage(package.name().to_string()));
        }
        info!(
            package = package.name(),
            plugs = package.plugs().count(),
            slots = package.slots().count(),
            "added package"
        );
        state.packages.insert(package.name().to_string(), package);
        Ok(())
    }

    /// Remove a package. Its connections must have been removed first.
    pub fn remove_package(&self, name: &str) -> Result<PackageInfo> {
        let mut state = self.state.write();
        if !state.packages.contains_key(name) {
            return Err(Error::UnknownPackage(name.to_string()));
        }
        if state
            .connections
            .keys()
            .any(|conn| conn.plug.package == name || conn.slot.package == name)
        {
            return Err(Error::StillConnected(name.to_string()));
        }
        let package = state
            .packages
            .remove(name)
            .ok_or_else(|| Error::UnknownPackage(name.to_string()))?;
        info!(package = name, "removed package");
        Ok(package)
    }

    pub fn package(&self, name: &str) -> Result<PackageInfo> {
        self.state
            .read()
            .packages
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownPackage(name.to_string()))
    }

    /// Names of every package, in name order.
    pub fn packages(&self) -> Vec<String> {
        self.state.read().packages.keys().cloned().collect()
    }

    pub fn plug(&self, plug_ref: &PlugRef) -> Result<PlugInfo> {
        self.state.read().plug(plug_ref).cloned()
    }

    pub fn slot(&self, slot_ref: &SlotRef) -> Result<SlotInfo> {
        self.state.read().slot(slot_ref).cloned()
    }

    /// Connect a plug to a slot.
    ///
    /// Automatic connections need the pair to pass [`autoconnect::check_auto_connect`].
    /// Manual connections need a connection decision of at least ask on
    /// both sides and must not break a structural rule.
    pub fn connect(
        &self,
        conn_ref: &ConnRef,
        plug_attrs: Attributes,
        slot_attrs: Attributes,
        provenance: Provenance,
    ) -> Result<Connection> {
        let mut state = self.state.write();
        let plug = state.plug(&conn_ref.plug)?;
        let slot = state.slot(&conn_ref.slot)?;
        if plug.interface != slot.interface {
            return Err(Error::InvalidDeclaration(format!(
                "cannot connect {} ({}) to {} ({})",
                conn_ref.plug, plug.interface, conn_ref.slot, slot.interface
            )));
        }
        let iface = self.registry.lookup(&plug.interface)?;

        match provenance {
            Provenance::Auto => {
                autoconnect::check_auto_connect(&self.base, iface, plug, slot, state.connections.values())?
            }
            Provenance::Manual => {
                check_decision(&self.base, iface, PolicyKind::Connection, plug, slot, Decision::Ask)?;
                check_structure(iface, plug, slot, state.connections.values())?;
            }
        }

        let connection = Connection {
            plug: Arc::new(plug.clone()),
            slot: Arc::new(slot.clone()),
            plug_attrs,
            slot_attrs,
            provenance,
        };
        info!(
            plug = %conn_ref.plug,
            slot = %conn_ref.slot,
            interface = iface.name(),
            ?provenance,
            "connected"
        );
        state.connections.insert(conn_ref.clone(), connection.clone());
        Ok(connection)
    }

    /// Remove a connection. Its policy disappears on the next compilation
    /// pass.
    pub fn disconnect(&self, conn_ref: &ConnRef) -> Result<Connection> {
        let connection = self
            .state
            .write()
            .connections
            .remove(conn_ref)
            .ok_or_else(|| Error::NotConnected(conn_ref.to_string()))?;
        info!(plug = %conn_ref.plug, slot = %conn_ref.slot, "disconnected");
        Ok(connection)
    }

    /// Every live connection, in reference order.
    pub fn connections(&self) -> Vec<ConnRef> {
        self.state.read().connections.keys().cloned().collect()
    }

    pub fn connection(&self, conn_ref: &ConnRef) -> Result<Connection> {
        self.state
            .read()
            .connections
            .get(conn_ref)
            .cloned()
            .ok_or_else(|| Error::NotConnected(conn_ref.to_string()))
    }

    pub fn connected_plug(&self, conn_ref: &ConnRef) -> Result<ConnectedPlug> {
        Ok(self.connection(conn_ref)?.connected_plug())
    }

    pub fn connected_slot(&self, conn_ref: &ConnRef) -> Result<ConnectedSlot> {
        Ok(self.connection(conn_ref)?.connected_slot())
    }

    /// Slots the plug could be connected to automatically right now, in
    /// package order.
    pub fn auto_connect_candidate_slots(&self, plug_ref: &PlugRef) -> Result<Vec<SlotRef>> {
        let state = self.state.read();
        let plug = state.plug(plug_ref)?;
        let iface = self.registry.lookup(&plug.interface)?;

        let candidates: Vec<SlotRef> = state
            .packages
            .values()
            .flat_map(|package| package.slots())
            .filter(|slot| slot.interface == plug.interface)
            .filter(|slot| autoconnect::can_auto_connect(&self.base, iface, plug, slot, state.connections.values()))
            .map(|slot| SlotRef::new(&slot.package.name, &slot.name))
            .collect();
        debug!(plug = %plug_ref, candidates = candidates.len(), "auto-connect candidates");
        Ok(candidates)
    }

    /// Fill in a partially specified connect request.
    ///
    /// An empty slot package means the platform package. An empty slot
    /// name means the only slot of that package with the plug's
    /// capability.
    pub fn resolve_connect(&self, plug_ref: &PlugRef, slot_ref: &SlotRef) -> Result<ConnRef> {
        let state = self.state.read();
        let plug = state.plug(plug_ref)?;

        let package = if slot_ref.package.is_empty() {
            state
                .packages
                .values()
                .find(|package| package.kind() == PackageKind::Platform)
                .ok_or_else(|| Error::UnknownPackage("platform package".to_string()))?
        } else {
            state
                .packages
                .get(&slot_ref.package)
                .ok_or_else(|| Error::UnknownPackage(slot_ref.package.clone()))?
        };

        let slot_name = if slot_ref.name.is_empty() {
            let matching: Vec<&SlotInfo> = package
                .slots()
                .filter(|slot| slot.interface == plug.interface)
                .collect();
            match matching.as_slice() {
                [] => {
                    return Err(Error::UnknownSlot {
                        package: package.name().to_string(),
                        slot: format!("<any {}>", plug.interface),
                    });
                }
                [slot] => slot.name.clone(),
                _ => return Err(Error::AmbiguousSlot(plug_ref.to_string())),
            }
        } else {
            package
                .slot(&slot_ref.name)
                .ok_or_else(|| Error::UnknownSlot {
                    package: package.name().to_string(),
                    slot: slot_ref.name.clone(),
                })?
                .name
                .clone()
        };

        Ok(ConnRef::new(plug_ref.clone(), SlotRef::new(package.name(), slot_name)))
    }

    /// A consistent copy of the whole model for a compilation pass.
    pub fn snapshot(&self) -> Snapshot {
        let state = self.state.read();
        Snapshot {
            packages: state.packages.values().cloned().collect(),
            connections: state.connections.values().cloned().collect(),
        }
    }
}

impl State {
    fn plug(&self, plug_ref: &PlugRef) -> Result<&PlugInfo> {
        self.packages
            .get(&plug_ref.package)
            .ok_or_else(|| Error::UnknownPackage(plug_ref.package.clone()))?
            .plug(&plug_ref.name)
            .ok_or_else(|| Error::UnknownPlug {
                package: plug_ref.package.clone(),
                plug: plug_ref.name.clone(),
            })
    }

    fn slot(&self, slot_ref: &SlotRef) -> Result<&SlotInfo> {
        self.packages
            .get(&slot_ref.package)
            .ok_or_else(|| Error::UnknownPackage(slot_ref.package.clone()))?
            .slot(&slot_ref.name)
            .ok_or_else(|| Error::UnknownSlot {
                package: slot_ref.package.clone(),
                slot: slot_ref.name.clone(),
            })
    }
}
