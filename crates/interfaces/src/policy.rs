//! Base declaration: host-wide default connection policy.
//!
//! The base declaration is a TOML document giving, per side (plug or slot)
//! and per capability, a decision for each kind of connection. Decisions may
//! vary by the owning package's [`TrustClass`], but never become more
//! permissive for a less trusted owner.

use crate::{Error, Interface, PackageKind, PlugInfo, Registry, Result, SlotInfo, TrustClass};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tracing::debug;

/// Defaults preceding the per-capability text contributed by each
/// registered definition.
const BUILTIN_HEADER: &str = r#"
[defaults.plugs]
connection = "allow"
auto-connection = "allow"

[defaults.slots]
connection = "allow"
auto-connection = "allow"
"#;

/// Outcome of a policy check, ordered from most to least restrictive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Deny,
    /// Allowed only on explicit request.
    Ask,
    Allow,
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        matches!(self, Decision::Allow)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Deny => f.write_str("deny"),
            Decision::Ask => f.write_str("ask"),
            Decision::Allow => f.write_str("allow"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyKind {
    Connection,
    AutoConnection,
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyKind::Connection => f.write_str("connection"),
            PolicyKind::AutoConnection => f.write_str("auto-connection"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Plug,
    Slot,
}

/// A decision per trust class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustRule {
    pub ordinary: Decision,
    pub privileged: Decision,
    pub platform: Decision,
}

impl TrustRule {
    pub fn uniform(decision: Decision) -> Self {
        Self {
            ordinary: decision,
            privileged: decision,
            platform: decision,
        }
    }

    pub fn decide(&self, class: TrustClass) -> Decision {
        match class {
            TrustClass::Ordinary => self.ordinary,
            TrustClass::Privileged => self.privileged,
            TrustClass::Platform => self.platform,
        }
    }

    fn is_monotone(&self) -> bool {
        self.ordinary <= self.privileged && self.privileged <= self.platform
    }
}

/// Connection and auto-connection rules for one side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SideRules {
    pub connection: Option<TrustRule>,
    pub auto_connection: Option<TrustRule>,
}

impl SideRules {
    fn get(&self, kind: PolicyKind) -> Option<&TrustRule> {
        match kind {
            PolicyKind::Connection => self.connection.as_ref(),
            PolicyKind::AutoConnection => self.auto_connection.as_ref(),
        }
    }
}

/// Per-side decisions for one candidate connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub plug: Decision,
    pub slot: Decision,
    /// The capability definition replaced the base decision.
    pub overridden: bool,
}

impl Resolution {
    /// Deny on either side denies; ask on either side asks.
    pub fn combined(&self) -> Decision {
        self.plug.min(self.slot)
    }
}

/// The host-wide default policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseDeclaration {
    plug_defaults: SideRules,
    slot_defaults: SideRules,
    plugs: BTreeMap<String, SideRules>,
    slots: BTreeMap<String, SideRules>,
}

impl BaseDeclaration {
    /// Load a base declaration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse a base declaration from TOML.
    pub fn parse(toml: &str) -> Result<Self> {
        let file: BaseDeclarationFile =
            toml::from_str(toml).map_err(|e| Error::BaseDeclaration(e.to_string()))?;
        file.into_declaration()
    }

    /// The builtin declaration: the defaults header followed by the text each
    /// registered capability contributes, in registration order.
    pub fn from_registry(registry: &Registry) -> Result<Self> {
        Self::parse(&Self::builtin_text(registry))
    }

    pub fn builtin_text(registry: &Registry) -> String {
        let mut text = String::from(BUILTIN_HEADER);
        for iface in registry.all() {
            let info = iface.static_info();
            for part in [info.base_declaration_plugs, info.base_declaration_slots] {
                if !part.trim().is_empty() {
                    text.push('\n');
                    text.push_str(part.trim());
                    text.push('\n');
                }
            }
        }
        text
    }

    /// The base decision for one side, before any capability override.
    pub fn side_decision(&self, side: Side, interface: &str, kind: PolicyKind, class: TrustClass) -> Decision {
        let (specific, defaults) = match side {
            Side::Plug => (self.plugs.get(interface), &self.plug_defaults),
            Side::Slot => (self.slots.get(interface), &self.slot_defaults),
        };
        specific
            .and_then(|rules| rules.get(kind))
            .or_else(|| defaults.get(kind))
            .map_or(Decision::Allow, |rule| rule.decide(class))
    }

    /// Decide a candidate connection.
    ///
    /// The capability's own override, when present, replaces the base
    /// decision on both sides. An override that is stricter for a more
    /// trusted owner of either side fails with [`Error::BaseDeclaration`].
    pub fn resolve(
        &self,
        iface: &dyn Interface,
        kind: PolicyKind,
        plug: &PlugInfo,
        slot: &SlotInfo,
    ) -> Result<Resolution> {
        if let Some(decision) = iface.policy_override(kind, plug, slot) {
            check_override_monotone(iface, kind, plug, slot)?;
            debug!(interface = iface.name(), %kind, %decision, "interface overrides base declaration");
            return Ok(Resolution {
                plug: decision,
                slot: decision,
                overridden: true,
            });
        }
        Ok(Resolution {
            plug: self.side_decision(Side::Plug, iface.name(), kind, plug.package.trust_class()),
            slot: self.side_decision(Side::Slot, iface.name(), kind, slot.package.trust_class()),
            overridden: false,
        })
    }
}

/// A package kind of the given trust class.
fn kind_of_class(class: TrustClass) -> PackageKind {
    match class {
        TrustClass::Ordinary => PackageKind::App,
        TrustClass::Privileged => PackageKind::Gadget,
        TrustClass::Platform => PackageKind::Platform,
    }
}

/// Re-run the override with each side's owner moved through every trust
/// class and require the decisions never to tighten as trust grows.
fn check_override_monotone(iface: &dyn Interface, kind: PolicyKind, plug: &PlugInfo, slot: &SlotInfo) -> Result<()> {
    let plug_side = TrustClass::ALL.map(|class| {
        let mut owner = plug.clone();
        owner.package.kind = kind_of_class(class);
        iface.policy_override(kind, &owner, slot)
    });
    let slot_side = TrustClass::ALL.map(|class| {
        let mut owner = slot.clone();
        owner.package.kind = kind_of_class(class);
        iface.policy_override(kind, plug, &owner)
    });

    for (side, decisions) in [("plug", plug_side), ("slot", slot_side)] {
        let decided: Vec<Decision> = decisions.into_iter().flatten().collect();
        if decided.windows(2).any(|pair| pair[0] > pair[1]) {
            return Err(Error::BaseDeclaration(format!(
                "{} override of {kind} is stricter for a more trusted {side} owner",
                iface.name()
            )));
        }
    }
    Ok(())
}

/// Raw TOML structure of a base declaration.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct BaseDeclarationFile {
    #[serde(default)]
    defaults: DefaultsSection,
    #[serde(default)]
    plugs: BTreeMap<String, SideSection>,
    #[serde(default)]
    slots: BTreeMap<String, SideSection>,
}

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DefaultsSection {
    #[serde(default)]
    plugs: SideSection,
    #[serde(default)]
    slots: SideSection,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct SideSection {
    connection: Option<RuleSection>,
    auto_connection: Option<RuleSection>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RuleSection {
    Uniform(Decision),
    PerClass(ClassTable),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ClassTable {
    platform: Option<Decision>,
    privileged: Option<Decision>,
    ordinary: Option<Decision>,
}

impl BaseDeclarationFile {
    fn into_declaration(self) -> Result<BaseDeclaration> {
        let plug_defaults = self.defaults.plugs.into_rules("defaults.plugs")?;
        let slot_defaults = self.defaults.slots.into_rules("defaults.slots")?;

        let mut plugs = BTreeMap::new();
        for (name, section) in self.plugs {
            let rules = section.into_rules(&format!("plugs.{name}"))?;
            plugs.insert(name, rules);
        }
        let mut slots = BTreeMap::new();
        for (name, section) in self.slots {
            let rules = section.into_rules(&format!("slots.{name}"))?;
            slots.insert(name, rules);
        }

        debug!(plugs = plugs.len(), slots = slots.len(), "parsed base declaration");
        Ok(BaseDeclaration {
            plug_defaults,
            slot_defaults,
            plugs,
            slots,
        })
    }
}

impl SideSection {
    fn into_rules(self, path: &str) -> Result<SideRules> {
        Ok(SideRules {
            connection: self
                .connection
                .map(|r| r.into_rule(&format!("{path}.connection")))
                .transpose()?,
            auto_connection: self
                .auto_connection
                .map(|r| r.into_rule(&format!("{path}.auto-connection")))
                .transpose()?,
        })
    }
}

impl RuleSection {
    /// Missing classes inherit from the next more trusted class; a missing
    /// platform entry is `allow`.
    fn into_rule(self, path: &str) -> Result<TrustRule> {
        let rule = match self {
            RuleSection::Uniform(decision) => TrustRule::uniform(decision),
            RuleSection::PerClass(table) => {
                let platform = table.platform.unwrap_or(Decision::Allow);
                let privileged = table.privileged.unwrap_or(platform);
                let ordinary = table.ordinary.unwrap_or(privileged);
                TrustRule {
                    ordinary,
                    privileged,
                    platform,
                }
            }
        };
        if !rule.is_monotone() {
            return Err(Error::BaseDeclaration(format!(
                "{path}: a less trusted owner may not be allowed more \
                 (ordinary={}, privileged={}, platform={})",
                rule.ordinary, rule.privileged, rule.platform
            )));
        }
        Ok(rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Declaration, PackageInfo, PackageKind, StaticInfo};
    use proptest::prelude::*;

    #[derive(Debug)]
    struct Plain;

    impl Interface for Plain {
        fn name(&self) -> &'static str {
            "plain"
        }

        fn static_info(&self) -> StaticInfo {
            StaticInfo {
                summary: "plain",
                implicit_on_trusted: false,
                implicit_on_isolated: false,
                base_declaration_plugs: "",
                base_declaration_slots: r#"
[slots.plain]
auto-connection = { platform = "allow", ordinary = "ask" }
"#,
            }
        }
    }

    #[derive(Debug)]
    struct AlwaysDenied;

    impl Interface for AlwaysDenied {
        fn name(&self) -> &'static str {
            "always-denied"
        }

        fn static_info(&self) -> StaticInfo {
            StaticInfo {
                summary: "denied by its own definition",
                implicit_on_trusted: false,
                implicit_on_isolated: false,
                base_declaration_plugs: "",
                base_declaration_slots: "",
            }
        }

        fn policy_override(&self, _kind: PolicyKind, _plug: &PlugInfo, _slot: &SlotInfo) -> Option<Decision> {
            Some(Decision::Deny)
        }
    }

    /// Allows ordinary slot owners and denies the platform.
    #[derive(Debug)]
    struct Inverted;

    impl Interface for Inverted {
        fn name(&self) -> &'static str {
            "inverted"
        }

        fn static_info(&self) -> StaticInfo {
            StaticInfo {
                summary: "stricter for the platform",
                implicit_on_trusted: false,
                implicit_on_isolated: false,
                base_declaration_plugs: "",
                base_declaration_slots: "",
            }
        }

        fn policy_override(&self, _kind: PolicyKind, _plug: &PlugInfo, slot: &SlotInfo) -> Option<Decision> {
            match slot.package.trust_class() {
                TrustClass::Platform => Some(Decision::Deny),
                _ => Some(Decision::Allow),
            }
        }
    }

    fn pair(iface: &str, slot_kind: PackageKind) -> (PlugInfo, SlotInfo) {
        let consumer = PackageInfo::builder("consumer", PackageKind::App)
            .app("app")
            .plug(Declaration::new(iface))
            .build()
            .unwrap();
        let producer = PackageInfo::builder("producer", slot_kind)
            .slot(Declaration::new(iface))
            .build()
            .unwrap();
        (
            consumer.plug(iface).unwrap().clone(),
            producer.slot(iface).unwrap().clone(),
        )
    }

    #[test]
    fn test_parse_toml() {
        let decl = BaseDeclaration::parse(
            r#"
[defaults.plugs]
connection = "allow"
auto-connection = "ask"

[slots.serial-port]
connection = { platform = "allow", privileged = "allow", ordinary = "deny" }
"#,
        )
        .unwrap();

        assert_eq!(
            decl.side_decision(Side::Plug, "network", PolicyKind::AutoConnection, TrustClass::Ordinary),
            Decision::Ask
        );
        assert_eq!(
            decl.side_decision(Side::Slot, "serial-port", PolicyKind::Connection, TrustClass::Ordinary),
            Decision::Deny
        );
        assert_eq!(
            decl.side_decision(Side::Slot, "serial-port", PolicyKind::Connection, TrustClass::Privileged),
            Decision::Allow
        );
        // Nothing said about slot defaults.
        assert_eq!(
            decl.side_decision(Side::Slot, "network", PolicyKind::Connection, TrustClass::Ordinary),
            Decision::Allow
        );
    }

    #[test]
    fn missing_classes_inherit_from_more_trusted() {
        let decl = BaseDeclaration::parse(
            r#"
[slots.x]
auto-connection = { privileged = "ask" }
"#,
        )
        .unwrap();
        let decide = |class| decl.side_decision(Side::Slot, "x", PolicyKind::AutoConnection, class);
        assert_eq!(decide(TrustClass::Platform), Decision::Allow);
        assert_eq!(decide(TrustClass::Privileged), Decision::Ask);
        assert_eq!(decide(TrustClass::Ordinary), Decision::Ask);
    }

    #[test]
    fn non_monotone_rule_is_rejected() {
        let err = BaseDeclaration::parse(
            r#"
[slots.x]
connection = { platform = "deny", ordinary = "allow" }
"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::BaseDeclaration(msg) if msg.contains("slots.x.connection")));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(BaseDeclaration::parse("[slots.x]\nallow-everything = true\n").is_err());
        assert!(BaseDeclaration::parse("[slots.x]\nconnection = \"maybe\"\n").is_err());
    }

    #[test]
    fn builtin_text_includes_registered_snippets() {
        let mut registry = Registry::new();
        registry.register(Box::new(Plain)).unwrap();
        let text = BaseDeclaration::builtin_text(&registry);
        assert!(text.contains("[defaults.slots]"));
        assert!(text.contains("[slots.plain]"));

        let decl = BaseDeclaration::from_registry(&registry).unwrap();
        let (plug, slot) = pair("plain", PackageKind::App);
        let resolution = decl.resolve(&Plain, PolicyKind::AutoConnection, &plug, &slot).unwrap();
        assert_eq!(resolution.plug, Decision::Allow);
        assert_eq!(resolution.slot, Decision::Ask);
        assert_eq!(resolution.combined(), Decision::Ask);
        assert!(!resolution.overridden);

        let (plug, slot) = pair("plain", PackageKind::Platform);
        let resolution = decl.resolve(&Plain, PolicyKind::AutoConnection, &plug, &slot).unwrap();
        assert_eq!(resolution.combined(), Decision::Allow);
    }

    #[test]
    fn interface_override_wins() {
        let decl = BaseDeclaration::parse(BUILTIN_HEADER).unwrap();
        let (plug, slot) = pair("always-denied", PackageKind::Platform);
        let resolution = decl.resolve(&AlwaysDenied, PolicyKind::Connection, &plug, &slot).unwrap();
        assert_eq!(resolution.combined(), Decision::Deny);
        assert!(resolution.overridden);
    }

    #[test]
    fn non_monotone_override_is_rejected() {
        let decl = BaseDeclaration::parse(BUILTIN_HEADER).unwrap();
        for slot_kind in [PackageKind::App, PackageKind::Platform] {
            let (plug, slot) = pair("inverted", slot_kind);
            let err = decl
                .resolve(&Inverted, PolicyKind::Connection, &plug, &slot)
                .unwrap_err();
            assert!(
                matches!(&err, Error::BaseDeclaration(msg) if msg.contains("more trusted slot owner")),
                "{err}"
            );
        }
    }

    fn decision() -> impl Strategy<Value = Decision> {
        prop_oneof![Just(Decision::Deny), Just(Decision::Ask), Just(Decision::Allow)]
    }

    proptest! {
        /// Any rule that loads is never stricter for a more trusted owner.
        #[test]
        fn loaded_rules_are_monotone(
            platform in proptest::option::of(decision()),
            privileged in proptest::option::of(decision()),
            ordinary in proptest::option::of(decision()),
        ) {
            let mut entries = Vec::new();
            for (class, value) in [("platform", platform), ("privileged", privileged), ("ordinary", ordinary)] {
                if let Some(value) = value {
                    entries.push(format!("{class} = \"{value}\""));
                }
            }
            let text = format!("[slots.x]\nconnection = {{ {} }}\n", entries.join(", "));
            if let Ok(decl) = BaseDeclaration::parse(&text) {
                let decide = |class| decl.side_decision(Side::Slot, "x", PolicyKind::Connection, class);
                prop_assert!(decide(TrustClass::Ordinary) <= decide(TrustClass::Privileged));
                prop_assert!(decide(TrustClass::Privileged) <= decide(TrustClass::Platform));
            }
        }
    }
}
