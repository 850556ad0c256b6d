//! Connections between plugs and slots, and the merged views handed to
//! policy hooks.

use crate::{AttrValue, Attributes, PackageId, PlugInfo, SecurityTag, SlotInfo};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Reference to a plug by package and plug name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlugRef {
    pub package: String,
    pub name: String,
}

/// Reference to a slot by package and slot name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SlotRef {
    pub package: String,
    pub name: String,
}

impl PlugRef {
    pub fn new(package: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            name: name.into(),
        }
    }
}

impl SlotRef {
    pub fn new(package: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for PlugRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.package, self.name)
    }
}

impl fmt::Display for SlotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.package, self.name)
    }
}

/// An ordered (plug, slot) pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConnRef {
    pub plug: PlugRef,
    pub slot: SlotRef,
}

impl ConnRef {
    pub fn new(plug: PlugRef, slot: SlotRef) -> Self {
        Self { plug, slot }
    }
}

impl fmt::Display for ConnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.plug, self.slot)
    }
}

/// Whether a connection was made without asking anyone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Auto,
    Manual,
}

/// A live binding between one plug and one slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub plug: Arc<PlugInfo>,
    pub slot: Arc<SlotInfo>,
    /// Connection-time attributes layered over the plug's own.
    pub plug_attrs: Attributes,
    /// Connection-time attributes layered over the slot's own.
    pub slot_attrs: Attributes,
    pub provenance: Provenance,
}

impl Connection {
    pub fn conn_ref(&self) -> ConnRef {
        ConnRef::new(
            PlugRef::new(&self.plug.package.name, &self.plug.name),
            SlotRef::new(&self.slot.package.name, &self.slot.name),
        )
    }

    pub fn connected_plug(&self) -> ConnectedPlug {
        ConnectedPlug::new(Arc::clone(&self.plug), self.plug_attrs.clone())
    }

    pub fn connected_slot(&self) -> ConnectedSlot {
        ConnectedSlot::new(Arc::clone(&self.slot), self.slot_attrs.clone())
    }
}

/// Read-only view of a connected plug: declaration plus connection
/// attributes.
#[derive(Debug, Clone)]
pub struct ConnectedPlug {
    info: Arc<PlugInfo>,
    dynamic: Attributes,
}

/// Read-only view of a connected slot: declaration plus connection
/// attributes.
#[derive(Debug, Clone)]
pub struct ConnectedSlot {
    info: Arc<SlotInfo>,
    dynamic: Attributes,
}

impl ConnectedPlug {
    pub fn new(info: Arc<PlugInfo>, dynamic: Attributes) -> Self {
        Self { info, dynamic }
    }

    pub fn info(&self) -> &PlugInfo {
        &self.info
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn interface(&self) -> &str {
        &self.info.interface
    }

    pub fn package(&self) -> &PackageId {
        &self.info.package
    }

    pub fn security_tags(&self) -> Vec<SecurityTag> {
        self.info.security_tags()
    }

    pub fn label_expression(&self) -> String {
        self.info.label_expression()
    }

    /// Look up an attribute, preferring the connection's value over the
    /// declaration's.
    pub fn attr(&self, key: &str) -> Option<&AttrValue> {
        self.dynamic.get(key).or_else(|| self.info.attrs.get(key))
    }

    pub fn static_attrs(&self) -> &Attributes {
        &self.info.attrs
    }

    pub fn dynamic_attrs(&self) -> &Attributes {
        &self.dynamic
    }

    /// The merged attribute set.
    pub fn attrs(&self) -> Attributes {
        merge(&self.info.attrs, &self.dynamic)
    }
}

impl ConnectedSlot {
    pub fn new(info: Arc<SlotInfo>, dynamic: Attributes) -> Self {
        Self { info, dynamic }
    }

    pub fn info(&self) -> &SlotInfo {
        &self.info
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn interface(&self) -> &str {
        &self.info.interface
    }

    pub fn package(&self) -> &PackageId {
        &self.info.package
    }

    pub fn security_tags(&self) -> Vec<SecurityTag> {
        self.info.security_tags()
    }

    pub fn label_expression(&self) -> String {
        self.info.label_expression()
    }

    pub fn attr(&self, key: &str) -> Option<&AttrValue> {
        self.dynamic.get(key).or_else(|| self.info.attrs.get(key))
    }

    pub fn static_attrs(&self) -> &Attributes {
        &self.info.attrs
    }

    pub fn dynamic_attrs(&self) -> &Attributes {
        &self.dynamic
    }

    pub fn attrs(&self) -> Attributes {
        merge(&self.info.attrs, &self.dynamic)
    }
}

fn merge(declared: &Attributes, dynamic: &Attributes) -> Attributes {
    declared
        .iter()
        .chain(dynamic.iter())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Declaration, PackageInfo, PackageKind};

    fn plug() -> Arc<PlugInfo> {
        let pkg = PackageInfo::builder("consumer", PackageKind::App)
            .app("app")
            .plug(Declaration::new("dbus").attr("bus", "session").attr("name", "org.example.Foo"))
            .build()
            .unwrap();
        Arc::new(pkg.plug("dbus").unwrap().clone())
    }

    #[test]
    fn dynamic_attributes_take_precedence() {
        let connected = ConnectedPlug::new(plug(), Attributes::new().with("bus", "system"));

        assert_eq!(connected.attr("bus"), Some(&AttrValue::from("system")));
        assert_eq!(connected.attr("name"), Some(&AttrValue::from("org.example.Foo")));
        assert_eq!(connected.static_attrs().get_str("bus").unwrap(), Some("session"));

        let merged = connected.attrs();
        assert_eq!(merged.get_str("bus").unwrap(), Some("system"));
        assert_eq!(merged.get_str("name").unwrap(), Some("org.example.Foo"));
    }

    #[test]
    fn conn_ref_display() {
        let conn = ConnRef::new(PlugRef::new("consumer", "dbus"), SlotRef::new("producer", "dbus"));
        assert_eq!(conn.to_string(), "consumer:dbus producer:dbus");
    }
}
