//! State files: packages and connections to rehydrate a repository from.
//!
//! ```toml
//! [[packages]]
//! name = "consumer"
//! kind = "app"
//! apps = ["app"]
//!
//! [[packages.plugs]]
//! name = "avahi-observe"
//!
//! [[connections]]
//! plug = "consumer:avahi-observe"
//! slot = ":avahi-observe"
//! ```

use crate::config::Config;
use crate::error::{Error, Result};
use interfaces::{
    Attributes, Declaration, PackageInfo, PackageKind, PlugRef, Provenance, Registry, Repository, SlotRef,
    add_implicit_slots,
};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct StateFile {
    #[serde(default)]
    pub packages: Vec<PackageEntry>,
    #[serde(default)]
    pub connections: Vec<ConnectionEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageEntry {
    pub name: String,
    pub kind: PackageKind,
    #[serde(default)]
    pub apps: Vec<String>,
    #[serde(default)]
    pub hooks: Vec<String>,
    #[serde(default)]
    pub plugs: Vec<DeclarationEntry>,
    #[serde(default)]
    pub slots: Vec<DeclarationEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeclarationEntry {
    pub name: String,
    /// Defaults to the declaration name.
    pub interface: Option<String>,
    /// Defaults to every app of the package.
    pub apps: Option<Vec<String>>,
    #[serde(default)]
    pub hooks: Vec<String>,
    #[serde(default)]
    pub attrs: Attributes,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ConnectionEntry {
    /// `<package>:<plug>`.
    pub plug: String,
    /// `<package>:<slot>`; either part may be empty.
    pub slot: String,
    #[serde(default)]
    pub auto: bool,
    #[serde(default)]
    pub plug_attrs: Attributes,
    #[serde(default)]
    pub slot_attrs: Attributes,
}

impl StateFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::StateNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(toml: &str) -> Result<Self> {
        toml::from_str(toml).map_err(|e| Error::State(e.to_string()))
    }

    /// Build a repository holding every package and connection.
    ///
    /// The platform package named in the config is created when the file
    /// has none, and receives the implicit slots of the host mode.
    pub fn into_repository(self, config: &Config, registry: Arc<Registry>) -> Result<Repository> {
        let base = config.base_declaration(&registry)?;
        let mode = config.host.mode;

        let mut packages = self
            .packages
            .into_iter()
            .map(PackageEntry::build)
            .collect::<Result<Vec<_>>>()?;
        if !packages.iter().any(|pkg| pkg.kind() == PackageKind::Platform) {
            debug!(platform = %config.host.platform, "state has no platform package, adding one");
            packages.push(PackageInfo::builder(&config.host.platform, PackageKind::Platform).build()?);
        }
        for package in packages.iter_mut().filter(|pkg| pkg.kind() == PackageKind::Platform) {
            add_implicit_slots(package, &registry, mode)?;
        }

        let repo = Repository::new(registry, base);
        for package in packages {
            repo.add_package(package)?;
        }
        for entry in self.connections {
            let plug = parse_ref(&entry.plug, false)?;
            let slot = parse_ref(&entry.slot, true)?;
            let conn_ref = repo.resolve_connect(&PlugRef::new(plug.0, plug.1), &SlotRef::new(slot.0, slot.1))?;
            let provenance = if entry.auto {
                Provenance::Auto
            } else {
                Provenance::Manual
            };
            repo.connect(&conn_ref, entry.plug_attrs, entry.slot_attrs, provenance)?;
        }
        Ok(repo)
    }
}

impl PackageEntry {
    fn build(self) -> Result<PackageInfo> {
        let mut builder = PackageInfo::builder(self.name, self.kind);
        for app in self.apps {
            builder = builder.app(app);
        }
        for hook in self.hooks {
            builder = builder.hook(hook);
        }
        for plug in self.plugs {
            builder = builder.plug(plug.into_declaration());
        }
        for slot in self.slots {
            builder = builder.slot(slot.into_declaration());
        }
        Ok(builder.build()?)
    }
}

impl DeclarationEntry {
    fn into_declaration(self) -> Declaration {
        let interface = self.interface.unwrap_or_else(|| self.name.clone());
        Declaration {
            name: self.name,
            interface,
            attrs: self.attrs,
            apps: self.apps,
            hooks: self.hooks,
        }
    }
}

/// Split `<package>:<name>`. With `partial`, either side may be empty and
/// a bare package name is accepted.
pub fn parse_ref(s: &str, partial: bool) -> Result<(String, String)> {
    let (package, name) = match s.split_once(':') {
        Some(parts) => parts,
        None if partial => (s, ""),
        None => return Err(Error::InvalidRef(s.to_string())),
    };
    if !partial && (package.is_empty() || name.is_empty()) {
        return Err(Error::InvalidRef(s.to_string()));
    }
    if name.contains(':') {
        return Err(Error::InvalidRef(s.to_string()));
    }
    Ok((package.to_string(), name.to_string()))
}
