//! Capability interfaces between packages.
//!
//! Packages declare the capabilities they offer (slots) and need (plugs).
//! This crate decides which plugs may connect to which slots and compiles
//! every live connection into policy for each enforcement backend.
//!
//! Core principle: **a connection grants nothing until a compilation pass
//! turns it into backend policy, and a failed pass publishes nothing.**

mod attrs;
pub mod autoconnect;
pub mod backend;
pub mod builtin;
mod compile;
mod connection;
mod error;
mod implicit;
mod interface;
mod package;
pub mod policy;
mod registry;
mod repo;

pub use attrs::{AttrValue, Attributes};
pub use autoconnect::can_auto_connect;
pub use backend::SecuritySystem;
pub use compile::{BackendPolicy, CompiledPolicy, PolicyStore, compile};
pub use connection::{ConnRef, ConnectedPlug, ConnectedSlot, Connection, PlugRef, Provenance, SlotRef};
pub use error::{Error, Result};
pub use implicit::add_implicit_slots;
pub use interface::{Cardinality, HostMode, Interface, StaticInfo, sanitize_plug, sanitize_slot};
pub use package::{
    Declaration, PackageBuilder, PackageId, PackageInfo, PackageKind, PlugInfo, SecurityTag, SlotInfo, TrustClass,
};
pub use policy::{BaseDeclaration, Decision};
pub use registry::Registry;
pub use repo::{Repository, Snapshot};
