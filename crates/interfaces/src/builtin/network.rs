//! `network`: outbound network access.

use crate::backend::{Definer, apparmor};
use crate::{ConnectedPlug, ConnectedSlot, HostMode, Interface, Result, StaticInfo};

const BASE_DECLARATION_SLOTS: &str = r#"
[slots.network]
connection = { platform = "allow", privileged = "deny" }
"#;

const CONNECTED_PLUG_APPARMOR: &str = r#"# Description: Can access the network as a client.
#include <abstractions/nameservice>
/run/systemd/resolve/stub-resolv.conf rk,
/etc/mdns.allow r,

#include <abstractions/ssl_certs>

@{PROC}/sys/net/core/somaxconn r,
@{PROC}/sys/net/ipv4/tcp_fastopen r,

# Allow using netcat as client
/{,usr/}bin/nc{,.openbsd} ixr,

network inet,
network inet6,
network netlink dgram,"#;

#[derive(Debug, Clone, Copy, Default)]
pub struct Network;

impl Interface for Network {
    fn name(&self) -> &'static str {
        "network"
    }

    fn static_info(&self) -> StaticInfo {
        StaticInfo {
            summary: "allows access to the network",
            implicit_on_trusted: true,
            implicit_on_isolated: true,
            base_declaration_plugs: "",
            base_declaration_slots: BASE_DECLARATION_SLOTS,
        }
    }

    fn apparmor(&self) -> Option<&dyn Definer<apparmor::Specification>> {
        Some(self)
    }
}

impl Definer<apparmor::Specification> for Network {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autoconnect::can_auto_connect;
    use crate::backend::Specification as _;
    use crate::builtin::testutil;
    use crate::policy::BaseDeclaration;
    use crate::{Declaration, PackageKind, SecurityTag};

    fn base() -> BaseDeclaration {
        BaseDeclaration::from_registry(&crate::builtin::new_registry()).unwrap()
    }

    #[test]
    fn only_the_plug_side_gets_rules() {
        let (plug, _) = testutil::plug("browser", Declaration::new("network"));
        let (slot, _) = testutil::slot("core", PackageKind::Platform, Declaration::new("network"));

        for mode in [HostMode::Trusted, HostMode::Isolated] {
            let mut spec = apparmor::Specification::new(mode);
            spec.add_connected_plug(&Network, &plug, &slot).unwrap();
            spec.add_connected_slot(&Network, &plug, &slot).unwrap();
            spec.add_permanent_slot(&Network, slot.info()).unwrap();
            assert_eq!(spec.security_tags(), vec![SecurityTag::app("browser", "app")]);
            assert!(spec.snippet_for_tag("snap.browser.app").unwrap().contains("network inet,"));
        }
    }

    #[test]
    fn auto_connects_to_the_platform_only() {
        let base = base();
        let (plug, _) = testutil::plug("browser", Declaration::new("network"));
        let (core, _) = testutil::slot("core", PackageKind::Platform, Declaration::new("network"));
        let (app, _) = testutil::slot("proxy", PackageKind::App, Declaration::new("network"));

        assert!(can_auto_connect(&base, &Network, plug.info(), core.info(), []));
        assert!(!can_auto_connect(&base, &Network, plug.info(), app.info(), []));
    }

    #[test]
    fn implicit_everywhere() {
        let info = Network.static_info();
        assert!(info.implicit_on_trusted && info.implicit_on_isolated);
    }
}
