//! Backend specification builders.
//!
//! Each enforcement backend has a [`Specification`] that collects snippets
//! per security tag while a compilation pass walks the connection model.
//! Capability definitions contribute to a backend by implementing
//! [`Definer`] for its specification type; a capability that does not
//! contributes nothing to that backend.

pub mod apparmor;
pub mod dbus;
pub mod kmod;
pub mod udev;

use crate::{ConnectedPlug, ConnectedSlot, Error, HostMode, Interface, PlugInfo, Result, SecurityTag, SlotInfo};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An enforcement backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecuritySystem {
    AppArmor,
    DBus,
    KMod,
    UDev,
}

impl SecuritySystem {
    pub const ALL: [SecuritySystem; 4] = [
        SecuritySystem::AppArmor,
        SecuritySystem::DBus,
        SecuritySystem::KMod,
        SecuritySystem::UDev,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SecuritySystem::AppArmor => "apparmor",
            SecuritySystem::DBus => "dbus",
            SecuritySystem::KMod => "kmod",
            SecuritySystem::UDev => "udev",
        }
    }

    /// A fresh, empty specification for this backend.
    pub fn new_specification(self, mode: HostMode) -> Box<dyn Specification> {
        match self {
            SecuritySystem::AppArmor => Box::new(apparmor::Specification::new(mode)),
            SecuritySystem::DBus => Box::new(dbus::Specification::new(mode)),
            SecuritySystem::KMod => Box::new(kmod::Specification::new(mode)),
            SecuritySystem::UDev => Box::new(udev::Specification::new(mode)),
        }
    }
}

impl fmt::Display for SecuritySystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SecuritySystem {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        SecuritySystem::ALL
            .into_iter()
            .find(|system| system.name() == s)
            .ok_or_else(|| format!("unknown security backend: {s}"))
    }
}

/// The builder contract shared by every backend.
pub trait Specification: Send {
    fn security_system(&self) -> SecuritySystem;

    /// The host mode this pass was started with.
    fn host_mode(&self) -> HostMode;

    /// Contribute the plug side of a connection.
    fn add_connected_plug(&mut self, iface: &dyn Interface, plug: &ConnectedPlug, slot: &ConnectedSlot) -> Result<()>;

    /// Contribute the slot side of a connection.
    fn add_connected_slot(&mut self, iface: &dyn Interface, plug: &ConnectedPlug, slot: &ConnectedSlot) -> Result<()>;

    /// Contribute what a plug needs regardless of connections.
    fn add_permanent_plug(&mut self, iface: &dyn Interface, plug: &PlugInfo) -> Result<()>;

    /// Contribute what a slot needs regardless of connections.
    fn add_permanent_slot(&mut self, iface: &dyn Interface, slot: &SlotInfo) -> Result<()>;

    /// Tags that received any snippet, in first-contribution order.
    fn security_tags(&self) -> Vec<SecurityTag>;

    /// The assembled policy for one tag.
    fn snippet_for_tag(&self, tag: &str) -> Result<String>;
}

/// Snippets keyed by security tag, deduplicated by exact text and kept in
/// contribution order.
///
/// Snippets are added to the tags currently in scope; builders set the
/// scope to the plug's or slot's tags around each hook call.
#[derive(Debug, Default)]
pub struct Snippets {
    by_tag: IndexMap<SecurityTag, IndexSet<String>>,
    scope: Vec<SecurityTag>,
}

impl Snippets {
    /// Put `tags` in scope, returning the previous scope for [`Snippets::leave`].
    pub(crate) fn enter(&mut self, tags: Vec<SecurityTag>) -> Vec<SecurityTag> {
        std::mem::replace(&mut self.scope, tags)
    }

    pub(crate) fn leave(&mut self, previous: Vec<SecurityTag>) {
        self.scope = previous;
    }

    /// Add a snippet to every tag in scope.
    pub fn add(&mut self, snippet: impl Into<String>) {
        let snippet = snippet.into();
        for tag in &self.scope {
            self.by_tag
                .entry(tag.clone())
                .or_default()
                .insert(snippet.clone());
        }
    }

    /// Tags currently in scope.
    pub fn scope(&self) -> &[SecurityTag] {
        &self.scope
    }

    pub fn tags(&self) -> Vec<SecurityTag> {
        self.by_tag.keys().cloned().collect()
    }

    pub fn for_tag(&self, tag: &str) -> Result<&IndexSet<String>> {
        self.by_tag
            .get(tag)
            .ok_or_else(|| Error::NoSuchTag(tag.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.by_tag.is_empty()
    }
}

/// Policy hooks of a capability definition for the backend whose
/// specification type is `S`.
///
/// Hooks add snippets through the specification's own methods; the builder
/// has already put the relevant side's security tags in scope. The host
/// mode is passed explicitly so hooks stay pure functions of their inputs.
pub trait Definer<S>: Send + Sync {
    fn connected_plug(&self, _spec: &mut S, _mode: HostMode, _plug: &ConnectedPlug, _slot: &ConnectedSlot) -> Result<()> {
        Ok(())
    }

    fn connected_slot(&self, _spec: &mut S, _mode: HostMode, _plug: &ConnectedPlug, _slot: &ConnectedSlot) -> Result<()> {
        Ok(())
    }

    fn permanent_plug(&self, _spec: &mut S, _mode: HostMode, _plug: &PlugInfo) -> Result<()> {
        Ok(())
    }

    fn permanent_slot(&self, _spec: &mut S, _mode: HostMode, _slot: &SlotInfo) -> Result<()> {
        Ok(())
    }
}

/// Glue between a backend specification and the generic builder steps.
pub(crate) trait Scoped: Sized {
    fn snippets_mut(&mut self) -> &mut Snippets;

    fn mode(&self) -> HostMode;

    /// The capability's hooks for this backend, if any.
    fn definer(iface: &dyn Interface) -> Option<&dyn Definer<Self>>;
}

/// Call `hook` with `tags` in scope, restoring the previous scope afterwards
/// even when the hook fails.
pub(crate) fn with_scope<S: Scoped>(
    spec: &mut S,
    tags: Vec<SecurityTag>,
    hook: impl FnOnce(&mut S, HostMode) -> Result<()>,
) -> Result<()> {
    let mode = spec.mode();
    let previous = spec.snippets_mut().enter(tags);
    let result = hook(spec, mode);
    spec.snippets_mut().leave(previous);
    result
}

pub(crate) fn connected_plug<S: Scoped>(
    spec: &mut S,
    iface: &dyn Interface,
    plug: &ConnectedPlug,
    slot: &ConnectedSlot,
) -> Result<()> {
    let Some(definer) = S::definer(iface) else {
        return Ok(());
    };
    with_scope(spec, plug.security_tags(), |spec, mode| {
        definer.connected_plug(spec, mode, plug, slot)
    })
}

pub(crate) fn connected_slot<S: Scoped>(
    spec: &mut S,
    iface: &dyn Interface,
    plug: &ConnectedPlug,
    slot: &ConnectedSlot,
) -> Result<()> {
    let Some(definer) = S::definer(iface) else {
        return Ok(());
    };
    with_scope(spec, slot.security_tags(), |spec, mode| {
        definer.connected_slot(spec, mode, plug, slot)
    })
}

pub(crate) fn permanent_plug<S: Scoped>(spec: &mut S, iface: &dyn Interface, plug: &PlugInfo) -> Result<()> {
    let Some(definer) = S::definer(iface) else {
        return Ok(());
    };
    with_scope(spec, plug.security_tags(), |spec, mode| {
        definer.permanent_plug(spec, mode, plug)
    })
}

pub(crate) fn permanent_slot<S: Scoped>(spec: &mut S, iface: &dyn Interface, slot: &SlotInfo) -> Result<()> {
    let Some(definer) = S::definer(iface) else {
        return Ok(());
    };
    with_scope(spec, slot.security_tags(), |spec, mode| {
        definer.permanent_slot(spec, mode, slot)
    })
}

/// Join snippets with newlines and terminate the result with one.
pub(crate) fn join_lines<'a>(snippets: impl IntoIterator<Item = &'a String>) -> String {
    let mut out = String::new();
    for snippet in snippets {
        out.push_str(snippet);
        out.push('\n');
    }
    out
}

/// Whether the slot is an implicit slot of the platform package on a
/// trusted host. Such slots are served by unconfined processes: nothing is
/// emitted for the slot side and plugs cannot name a peer label.
pub fn implicit_system_connected_slot(slot: &ConnectedSlot, mode: HostMode) -> bool {
    implicit_system_permanent_slot(slot.info(), mode)
}

pub fn implicit_system_permanent_slot(slot: &SlotInfo, mode: HostMode) -> bool {
    mode == HostMode::Trusted && slot.package.trust_class() == crate::TrustClass::Platform
}
