//! Package identity records and the plug/slot declarations they carry.

use crate::{Attributes, Error, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// The kind of a package, as recorded by the manifest loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageKind {
    App,
    Gadget,
    Kernel,
    Base,
    /// The distinguished package providing the host's system services.
    Platform,
}

impl PackageKind {
    pub fn trust_class(self) -> TrustClass {
        match self {
            PackageKind::Platform => TrustClass::Platform,
            PackageKind::Gadget | PackageKind::Kernel => TrustClass::Privileged,
            PackageKind::App | PackageKind::Base => TrustClass::Ordinary,
        }
    }
}

/// How much the host trusts a package. Ordered from least to most trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustClass {
    Ordinary,
    Privileged,
    Platform,
}

impl TrustClass {
    pub const ALL: [TrustClass; 3] = [TrustClass::Ordinary, TrustClass::Privileged, TrustClass::Platform];
}

impl fmt::Display for TrustClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TrustClass::Ordinary => "ordinary",
            TrustClass::Privileged => "privileged",
            TrustClass::Platform => "platform",
        };
        f.write_str(name)
    }
}

/// Identity of one enforceable process: one app or hook of one package.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecurityTag(String);

impl SecurityTag {
    pub fn app(package: &str, app: &str) -> Self {
        Self(format!("snap.{package}.{app}"))
    }

    pub fn hook(package: &str, hook: &str) -> Self {
        Self(format!("snap.{package}.hook.{hook}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The form used in udev `TAG` keys, which may not contain dots.
    pub fn udev_tag(&self) -> String {
        self.0.replace('.', "_")
    }
}

impl fmt::Display for SecurityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for SecurityTag {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for SecurityTag {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The owner of a declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageId {
    pub name: String,
    pub kind: PackageKind,
}

impl PackageId {
    pub fn trust_class(&self) -> TrustClass {
        self.kind.trust_class()
    }
}

/// A package's declared need for a capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlugInfo {
    pub package: PackageId,
    pub name: String,
    pub interface: String,
    pub attrs: Attributes,
    pub apps: Vec<String>,
    pub hooks: Vec<String>,
}

/// A package's declared offer of a capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotInfo {
    pub package: PackageId,
    pub name: String,
    pub interface: String,
    pub attrs: Attributes,
    pub apps: Vec<String>,
    pub hooks: Vec<String>,
}

impl PlugInfo {
    /// Security tags of every app and hook bound to this plug.
    pub fn security_tags(&self) -> Vec<SecurityTag> {
        security_tags(&self.package.name, &self.apps, &self.hooks)
    }

    /// AppArmor label expression matching the processes bound to this plug.
    pub fn label_expression(&self) -> String {
        label_expression(&self.package.name, &self.apps, &self.hooks)
    }
}

impl SlotInfo {
    pub fn security_tags(&self) -> Vec<SecurityTag> {
        security_tags(&self.package.name, &self.apps, &self.hooks)
    }

    pub fn label_expression(&self) -> String {
        label_expression(&self.package.name, &self.apps, &self.hooks)
    }
}

fn security_tags(package: &str, apps: &[String], hooks: &[String]) -> Vec<SecurityTag> {
    let mut tags: Vec<SecurityTag> = apps.iter().map(|app| SecurityTag::app(package, app)).collect();
    tags.extend(hooks.iter().map(|hook| SecurityTag::hook(package, hook)));
    tags
}

fn label_expression(package: &str, apps: &[String], hooks: &[String]) -> String {
    let mut names: Vec<String> = apps
        .iter()
        .cloned()
        .chain(hooks.iter().map(|hook| format!("hook.{hook}")))
        .collect();
    names.sort();

    match names.as_slice() {
        [] => format!("\"snap.{package}.*\""),
        [one] => format!("\"snap.{package}.{one}\""),
        many => format!("\"snap.{package}.{{{}}}\"", many.join(",")),
    }
}

/// A plug or slot as written by the package author, before it is bound to
/// its owning package.
#[derive(Debug, Clone, Default)]
pub struct Declaration {
    pub name: String,
    pub interface: String,
    pub attrs: Attributes,
    /// Apps that may use the declaration; `None` binds every app.
    pub apps: Option<Vec<String>>,
    pub hooks: Vec<String>,
}

impl Declaration {
    /// A declaration whose name is also its interface name.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            interface: name.clone(),
            name,
            ..Default::default()
        }
    }

    pub fn interface(mut self, interface: impl Into<String>) -> Self {
        self.interface = interface.into();
        self
    }

    pub fn attr(mut self, key: impl Into<String>, value: impl Into<crate::AttrValue>) -> Self {
        self.attrs.insert(key, value);
        self
    }

    pub fn apps<I, S>(mut self, apps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.apps = Some(apps.into_iter().map(Into::into).collect());
        self
    }

    pub fn hooks<I, S>(mut self, hooks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hooks = hooks.into_iter().map(Into::into).collect();
        self
    }
}

/// A package together with its plugs and slots.
#[derive(Debug, Clone)]
pub struct PackageInfo {
    id: PackageId,
    apps: Vec<String>,
    hooks: Vec<String>,
    plugs: IndexMap<String, PlugInfo>,
    slots: IndexMap<String, SlotInfo>,
}

impl PackageInfo {
    pub fn builder(name: impl Into<String>, kind: PackageKind) -> PackageBuilder {
        PackageBuilder {
            name: name.into(),
            kind,
            apps: Vec::new(),
            hooks: Vec::new(),
            plugs: Vec::new(),
            slots: Vec::new(),
        }
    }

    pub fn id(&self) -> &PackageId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.id.name
    }

    pub fn kind(&self) -> PackageKind {
        self.id.kind
    }

    pub fn trust_class(&self) -> TrustClass {
        self.id.trust_class()
    }

    pub fn apps(&self) -> &[String] {
        &self.apps
    }

    pub fn hooks(&self) -> &[String] {
        &self.hooks
    }

    pub fn plugs(&self) -> impl Iterator<Item = &PlugInfo> {
        self.plugs.values()
    }

    pub fn slots(&self) -> impl Iterator<Item = &SlotInfo> {
        self.slots.values()
    }

    pub fn plug(&self, name: &str) -> Option<&PlugInfo> {
        self.plugs.get(name)
    }

    pub fn slot(&self, name: &str) -> Option<&SlotInfo> {
        self.slots.get(name)
    }

    /// Add a slot after the package was built. Used for implicit slots of
    /// the platform package.
    pub fn add_slot(&mut self, decl: Declaration) -> Result<()> {
        let slot = bind_slot(&self.id, &self.apps, decl)?;
        if self.slots.contains_key(&slot.name) {
            return Err(Error::InvalidDeclaration(format!(
                "package {} already has a slot named {}",
                self.id.name, slot.name
            )));
        }
        self.slots.insert(slot.name.clone(), slot);
        Ok(())
    }
}

/// Builder for [`PackageInfo`].
#[derive(Debug)]
pub struct PackageBuilder {
    name: String,
    kind: PackageKind,
    apps: Vec<String>,
    hooks: Vec<String>,
    plugs: Vec<Declaration>,
    slots: Vec<Declaration>,
}

impl PackageBuilder {
    pub fn app(mut self, app: impl Into<String>) -> Self {
        self.apps.push(app.into());
        self
    }

    pub fn hook(mut self, hook: impl Into<String>) -> Self {
        self.hooks.push(hook.into());
        self
    }

    pub fn plug(mut self, decl: Declaration) -> Self {
        self.plugs.push(decl);
        self
    }

    pub fn slot(mut self, decl: Declaration) -> Self {
        self.slots.push(decl);
        self
    }

    /// Bind every declaration to the package.
    ///
    /// Fails if a declaration names an app or hook the package does not
    /// have, or if two plugs (or two slots) share a name.
    pub fn build(self) -> Result<PackageInfo> {
        let id = PackageId {
            name: self.name,
            kind: self.kind,
        };

        let mut plugs = IndexMap::new();
        for decl in self.plugs {
            check_bindings(&id, &self.apps, &self.hooks, &decl)?;
            let (package, apps, hooks) = bind(&id, &self.apps, &decl);
            let plug = PlugInfo {
                package,
                name: decl.name,
                interface: decl.interface,
                attrs: decl.attrs,
                apps,
                hooks,
            };
            if plugs.contains_key(&plug.name) {
                return Err(duplicate(&id, "plug", &plug.name));
            }
            plugs.insert(plug.name.clone(), plug);
        }

        let mut slots = IndexMap::new();
        for decl in self.slots {
            check_bindings(&id, &self.apps, &self.hooks, &decl)?;
            let slot = bind_slot(&id, &self.apps, decl)?;
            if slots.contains_key(&slot.name) {
                return Err(duplicate(&id, "slot", &slot.name));
            }
            slots.insert(slot.name.clone(), slot);
        }

        Ok(PackageInfo {
            id,
            apps: self.apps,
            hooks: self.hooks,
            plugs,
            slots,
        })
    }
}

fn bind(id: &PackageId, all_apps: &[String], decl: &Declaration) -> (PackageId, Vec<String>, Vec<String>) {
    let mut apps = decl.apps.clone().unwrap_or_else(|| all_apps.to_vec());
    apps.sort();
    let mut hooks = decl.hooks.clone();
    hooks.sort();
    (id.clone(), apps, hooks)
}

fn bind_slot(id: &PackageId, all_apps: &[String], decl: Declaration) -> Result<SlotInfo> {
    if decl.name.is_empty() || decl.interface.is_empty() {
        return Err(Error::InvalidDeclaration(format!(
            "slot of package {} needs a name and an interface",
            id.name
        )));
    }
    let (package, apps, hooks) = bind(id, all_apps, &decl);
    Ok(SlotInfo {
        package,
        name: decl.name,
        interface: decl.interface,
        attrs: decl.attrs,
        apps,
        hooks,
    })
}

fn check_bindings(id: &PackageId, apps: &[String], hooks: &[String], decl: &Declaration) -> Result<()> {
    if decl.name.is_empty() || decl.interface.is_empty() {
        return Err(Error::InvalidDeclaration(format!(
            "declaration of package {} needs a name and an interface",
            id.name
        )));
    }
    if let Some(bound) = &decl.apps {
        if let Some(app) = bound.iter().find(|app| !apps.contains(*app)) {
            return Err(Error::InvalidDeclaration(format!(
                "{} of package {} refers to unknown app {app}",
                decl.name, id.name
            )));
        }
    }
    if let Some(hook) = decl.hooks.iter().find(|hook| !hooks.contains(*hook)) {
        return Err(Error::InvalidDeclaration(format!(
            "{} of package {} refers to unknown hook {hook}",
            decl.name, id.name
        )));
    }
    Ok(())
}

fn duplicate(id: &PackageId, side: &str, name: &str) -> Error {
    Error::InvalidDeclaration(format!("package {} declares {side} {name} twice", id.name))
}
