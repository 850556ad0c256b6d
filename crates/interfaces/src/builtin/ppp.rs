//! `ppp`: running the point-to-point protocol daemon.

use crate::backend::{Definer, apparmor, kmod};
use crate::{ConnectedPlug, ConnectedSlot, HostMode, Interface, Result, StaticInfo};

const BASE_DECLARATION_SLOTS: &str = r#"
[slots.ppp]
connection = { platform = "allow", privileged = "deny" }
auto-connection = "deny"
"#;

const CONNECTED_PLUG_APPARMOR: &str = r#"# Description: Allow operating ppp daemon. This gives privileged access to the
# ppp daemon.

# Needed for modem connections using PPP
/usr/sbin/pppd ix,
/etc/ppp/** rwix,
/dev/ppp rw,
/dev/tty[^0-9]* rw,
/{,var/}run/lock/*tty[^0-9]* rw,
/{,var/}run/ppp* rwk,
/var/log/ppp* rw,
/bin/run-parts ix,
@{PROC}/@{pid}/loginuid r,
capability setgid,
capability setuid,"#;

const KERNEL_MODULE: &str = "ppp_generic";

#[derive(Debug, Clone, Copy, Default)]
pub struct Ppp;

impl Interface for Ppp {
    fn name(&self) -> &'static str {
        "ppp"
    }

    fn static_info(&self) -> StaticInfo {
        StaticInfo {
            summary: "allows operating as the ppp service",
            implicit_on_trusted: true,
            implicit_on_isolated: true,
            base_declaration_plugs: "",
            base_declaration_slots: BASE_DECLARATION_SLOTS,
        }
    }

    fn auto_connect(&self, _plug: &crate::PlugInfo, _slot: &crate::SlotInfo) -> bool {
        false
    }

    fn apparmor(&self) -> Option<&dyn Definer<apparmor::Specification>> {
        Some(self)
    }

    fn kmod(&self) -> Option<&dyn Definer<kmod::Specification>> {
        Some(self)
    }
}

impl Definer<apparmor::Specification> for Ppp {
    fn connected_plug(
        &self,
        spec: &mut apparmor::Specification,
        _mode: HostMode,
        _plug: &ConnectedPlug,
        _slot: &ConnectedSlot,
    ) -> Result<()> {
        spec.add_snippet(CONNECTED_PLUG_APPARMOR);
        Ok(())
    }
}

impl Definer<kmod::Specification> for Ppp {
    fn connected_plug(
        &self,
        spec: &mut kmod::Specification,
        _mode: HostMode,
        _plug: &ConnectedPlug,
        _slot: &ConnectedSlot,
    ) -> Result<()> {
        spec.add_module(KERNEL_MODULE)
    }
}
