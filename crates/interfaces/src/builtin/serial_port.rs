//! `serial-port`: access to one serial device.

use crate::backend::{Definer, apparmor, udev};
use crate::{
    Cardinality, ConnectedPlug, ConnectedSlot, Error, HostMode, Interface, Result, SlotInfo, StaticInfo, TrustClass,
};
use regex::Regex;
use std::sync::LazyLock;

const BASE_DECLARATION_SLOTS: &str = r#"
[slots.serial-port]
connection = { platform = "allow", privileged = "allow", ordinary = "deny" }
auto-connection = "ask"
"#;

// Compile-time constant; a failure here is a bug in the pattern.
static DEVICE_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/dev/tty(USB|ACM|AMA|S|XRUSB|mxc)[0-9]+$")
        .unwrap_or_else(|e| panic!("BUG: invalid serial device pattern: {e}"))
});

#[derive(Debug, Clone, Copy, Default)]
pub struct SerialPort;

/// The device path of a sanitized slot.
fn device_path(slot: &ConnectedSlot) -> Result<&str> {
    slot.static_attrs().require_str("path")
}

impl Interface for SerialPort {
    fn name(&self) -> &'static str {
        "serial-port"
    }

    fn static_info(&self) -> StaticInfo {
        StaticInfo {
            summary: "allows accessing a specific serial port",
            implicit_on_trusted: false,
            implicit_on_isolated: false,
            base_declaration_plugs: "",
            base_declaration_slots: BASE_DECLARATION_SLOTS,
        }
    }

    /// Only the platform or privileged packages describe hardware, and the
    /// path must name a serial tty device.
    fn sanitize_slot(&self, slot: &SlotInfo) -> Result<()> {
        if slot.package.trust_class() < TrustClass::Privileged {
            return Err(Error::InvalidDeclaration(format!(
                "serial-port slots are reserved for platform or privileged packages, not {}",
                slot.package.trust_class()
            )));
        }
        let path = slot.attrs.require_str("path")?;
        if !DEVICE_PATH.is_match(path) {
            return Err(Error::InvalidDeclaration(format!(
                "serial-port path {path:?} is not a serial device"
            )));
        }
        Ok(())
    }

    fn cardinality(&self) -> Cardinality {
        Cardinality {
            plug: Some(1),
            slot: None,
        }
    }

    fn allows_self_connection(&self) -> bool {
        false
    }

    fn apparmor(&self) -> Option<&dyn Definer<apparmor::Specification>> {
        Some(self)
    }

    fn udev(&self) -> Option<&dyn Definer<udev::Specification>> {
        Some(self)
    }
}

impl Definer<apparmor::Specification> for SerialPort {
    fn connected_plug(
        &self,
        spec: &mut apparmor::Specification,
        _mode: HostMode,
        _plug: &ConnectedPlug,
        slot: &ConnectedSlot,
    ) -> Result<()> {
        let path = device_path(slot)?;
        spec.add_snippet(format!("# Description: Allow accessing serial port {path}\n{path} rwk,"));
        Ok(())
    }
}

impl Definer<udev::Specification> for SerialPort {
    fn connected_plug(
        &self,
        spec: &mut udev::Specification,
        _mode: HostMode,
        _plug: &ConnectedPlug,
        slot: &ConnectedSlot,
    ) -> Result<()> {
        let path = device_path(slot)?;
        let kernel = path.trim_start_matches("/dev/");
        spec.tag_device(&format!("SUBSYSTEM==\"tty\", KERNEL==\"{kernel}\""));
        Ok(())
    }
}
