//! Builtin capability definitions.

mod avahi_observe;
mod dbus;
mod network;
mod ppp;
mod serial_port;

pub use avahi_observe::AvahiObserve;
pub use dbus::DBus;
pub use network::Network;
pub use ppp::Ppp;
pub use serial_port::SerialPort;

use crate::backend::implicit_system_connected_slot;
use crate::{ConnectedSlot, HostMode, Interface, Registry};
use std::sync::{Arc, OnceLock};

static REGISTRY: OnceLock<Arc<Registry>> = OnceLock::new();

/// Every builtin definition, in registration order.
pub fn interfaces() -> Vec<Box<dyn Interface>> {
    vec![
        Box::new(AvahiObserve),
        Box::new(DBus),
        Box::new(Network),
        Box::new(Ppp),
        Box::new(SerialPort),
    ]
}

/// The process-wide registry of builtin definitions, built on first use.
pub fn registry() -> Arc<Registry> {
    Arc::clone(REGISTRY.get_or_init(|| Arc::new(new_registry())))
}

/// A fresh registry holding the builtin definitions.
pub fn new_registry() -> Registry {
    registry_of(interfaces())
}

// Builtin names are compile-time constants; a clash is a bug in the catalogue.
fn registry_of(interfaces: Vec<Box<dyn Interface>>) -> Registry {
    let mut registry = Registry::new();
    for iface in interfaces {
        registry
            .register(iface)
            .unwrap_or_else(|e| panic!("BUG: builtin catalogue is inconsistent: {e}"));
    }
    registry
}

/// Peer label a plug should expect from the slot side.
///
/// Implicit platform slots on a trusted host are served unconfined.
pub(crate) fn slot_label(slot: &ConnectedSlot, mode: HostMode) -> String {
    if implicit_system_connected_slot(slot, mode) {
        "unconfined".to_string()
    } else {
        slot.label_expression()
    }
}
