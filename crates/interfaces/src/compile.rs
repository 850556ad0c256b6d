//! Compilation passes and publication of their result.

use crate::backend::{SecuritySystem, Specification};
use crate::repo::Snapshot;
use crate::{HostMode, Registry, Repository, Result, SecurityTag};
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Assembled policy of one backend, by security tag in first-contribution
/// order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct BackendPolicy {
    snippets: IndexMap<SecurityTag, String>,
}

impl BackendPolicy {
    pub fn tags(&self) -> impl Iterator<Item = &SecurityTag> {
        self.snippets.keys()
    }

    pub fn snippet(&self, tag: &str) -> Option<&str> {
        self.snippets.get(tag).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SecurityTag, &str)> {
        self.snippets.iter().map(|(tag, snippet)| (tag, snippet.as_str()))
    }

    pub fn len(&self) -> usize {
        self.snippets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snippets.is_empty()
    }
}

/// The output of one compilation pass: every backend's policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompiledPolicy {
    pub mode: HostMode,
    pub backends: BTreeMap<SecuritySystem, BackendPolicy>,
}

impl CompiledPolicy {
    pub fn backend(&self, system: SecuritySystem) -> Option<&BackendPolicy> {
        self.backends.get(&system)
    }
}

/// Rebuild every backend's policy from scratch.
///
/// Permanent plugs and slots of every package come first (packages in name
/// order), then every connection (in reference order), plug side before
/// slot side. Any hook failure aborts the whole pass.
pub fn compile(snapshot: &Snapshot, registry: &Registry, mode: HostMode) -> Result<CompiledPolicy> {
    info!(
        %mode,
        packages = snapshot.packages.len(),
        connections = snapshot.connections.len(),
        "compiling policy"
    );

    let mut backends = BTreeMap::new();
    for system in SecuritySystem::ALL {
        let mut spec = system.new_specification(mode);
        build(spec.as_mut(), snapshot, registry)?;

        let mut policy = BackendPolicy::default();
        for tag in spec.security_tags() {
            let snippet = spec.snippet_for_tag(tag.as_str())?;
            policy.snippets.insert(tag, snippet);
        }
        debug!(backend = %system, tags = policy.len(), "assembled backend policy");
        backends.insert(system, policy);
    }

    Ok(CompiledPolicy { mode, backends })
}

fn build(spec: &mut dyn Specification, snapshot: &Snapshot, registry: &Registry) -> Result<()> {
    for package in &snapshot.packages {
        for plug in package.plugs() {
            spec.add_permanent_plug(registry.lookup(&plug.interface)?, plug)?;
        }
        for slot in package.slots() {
            spec.add_permanent_slot(registry.lookup(&slot.interface)?, slot)?;
        }
    }

    for conn in &snapshot.connections {
        let iface = registry.lookup(&conn.plug.interface)?;
        let plug = conn.connected_plug();
        let slot = conn.connected_slot();
        spec.add_connected_plug(iface, &plug, &slot)?;
        spec.add_connected_slot(iface, &plug, &slot)?;
    }
    Ok(())
}

/// The policy currently in force.
///
/// Readers get the whole compiled set of one pass; a new set replaces it
/// in one step, and only after its pass succeeded. Refreshes run one at a
/// time, so a pass never publishes over the result of a pass that took its
/// snapshot later.
#[derive(Debug, Default)]
pub struct PolicyStore {
    current: RwLock<Arc<CompiledPolicy>>,
    /// Held from snapshot to publish.
    refresh: Mutex<()>,
}

impl PolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Arc<CompiledPolicy> {
        Arc::clone(&*self.current.read())
    }

    /// Replace the policy in force, returning the previous one.
    pub fn publish(&self, policy: CompiledPolicy) -> Arc<CompiledPolicy> {
        let _pass = self.refresh.lock();
        std::mem::replace(&mut *self.current.write(), Arc::new(policy))
    }

    /// Compile the repository's current state and publish it. On failure
    /// the previous policy stays in force.
    pub fn refresh(&self, repo: &Repository, mode: HostMode) -> Result<Arc<CompiledPolicy>> {
        let _pass = self.refresh.lock();
        let snapshot = repo.snapshot();
        let policy = compile(&snapshot, repo.registry(), mode).inspect_err(|e| {
            warn!(error = %e, "compilation failed, keeping previous policy");
        })?;
        let policy = Arc::new(policy);
        *self.current.write() = Arc::clone(&policy);
        Ok(policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Definer, apparmor, kmod};
    use crate::policy::BaseDeclaration;
    use crate::{
        Attributes, ConnRef, ConnectedPlug, ConnectedSlot, Declaration, Error, Interface, PackageInfo, PackageKind,
        PlugRef, Provenance, SlotInfo, SlotRef, StaticInfo,
    };
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::sync::mpsc;

    #[derive(Debug)]
    struct Echo;

    impl Interface for Echo {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn static_info(&self) -> StaticInfo {
            StaticInfo {
                summary: "echoes connection details",
                implicit_on_trusted: false,
                implicit_on_isolated: false,
                base_declaration_plugs: "",
                base_declaration_slots: "",
            }
        }

        fn apparmor(&self) -> Option<&dyn Definer<apparmor::Specification>> {
            Some(self)
        }

        fn kmod(&self) -> Option<&dyn Definer<kmod::Specification>> {
            Some(self)
        }
    }

    impl Definer<apparmor::Specification> for Echo {
        fn connected_plug(
            &self,
            spec: &mut apparmor::Specification,
            _mode: HostMode,
            _plug: &ConnectedPlug,
            slot: &ConnectedSlot,
        ) -> crate::Result<()> {
            spec.add_snippet(format!("# talks to {}", slot.label_expression()));
            Ok(())
        }

        fn connected_slot(
            &self,
            spec: &mut apparmor::Specification,
            _mode: HostMode,
            plug: &ConnectedPlug,
            _slot: &ConnectedSlot,
        ) -> crate::Result<()> {
            spec.add_snippet(format!("# serves {}", plug.label_expression()));
            Ok(())
        }

        fn permanent_slot(&self, spec: &mut apparmor::Specification, _mode: HostMode, slot: &SlotInfo) -> crate::Result<()> {
            if slot.attrs.get_bool("fail")? == Some(true) {
                return Err(Error::InvalidDeclaration("hook failed".into()));
            }
            spec.add_snippet("# permanent");
            Ok(())
        }
    }

    impl Definer<kmod::Specification> for Echo {
        fn permanent_plug(&self, spec: &mut kmod::Specification, _mode: HostMode, _plug: &crate::PlugInfo) -> crate::Result<()> {
            spec.add_module("echo_mod")
        }
    }

    fn repo() -> Repository {
        let mut registry = Registry::new();
        registry.register(Box::new(Echo)).unwrap();
        let base = BaseDeclaration::from_registry(&registry).unwrap();
        Repository::new(Arc::new(registry), base)
    }

    fn populated(consumers: &[&str]) -> Repository {
        let repo = repo();
        repo.add_package(
            PackageInfo::builder("producer", PackageKind::App)
                .app("daemon")
                .slot(Declaration::new("echo"))
                .build()
                .unwrap(),
        )
        .unwrap();
        for name in consumers {
            repo.add_package(
                PackageInfo::builder(*name, PackageKind::App)
                    .app("app")
                    .plug(Declaration::new("echo"))
                    .build()
                    .unwrap(),
            )
            .unwrap();
            repo.connect(&pair(name), Attributes::new(), Attributes::new(), Provenance::Manual)
                .unwrap();
        }
        repo
    }

    fn pair(consumer: &str) -> ConnRef {
        ConnRef::new(PlugRef::new(consumer, "echo"), SlotRef::new("producer", "echo"))
    }

    #[test]
    fn connections_contribute_to_both_sides() {
        let repo = populated(&["consumer"]);
        let policy = compile(&repo.snapshot(), repo.registry(), HostMode::Isolated).unwrap();

        let apparmor = policy.backend(SecuritySystem::AppArmor).unwrap();
        let tags: Vec<&str> = apparmor.tags().map(SecurityTag::as_str).collect();
        assert_eq!(tags, vec!["snap.producer.daemon", "snap.consumer.app"]);
        assert_eq!(
            apparmor.snippet("snap.producer.daemon").unwrap(),
            "# permanent\n# serves \"snap.consumer.app\"\n"
        );
        assert_eq!(
            apparmor.snippet("snap.consumer.app").unwrap(),
            "# talks to \"snap.producer.daemon\"\n"
        );

        let kmod = policy.backend(SecuritySystem::KMod).unwrap();
        assert_eq!(kmod.snippet("snap.consumer.app").unwrap(), "echo_mod\n");
        assert!(policy.backend(SecuritySystem::DBus).unwrap().is_empty());
    }

    #[test]
    fn disconnect_drops_only_connection_policy() {
        let repo = populated(&["consumer"]);
        repo.disconnect(&pair("consumer")).unwrap();
        let policy = compile(&repo.snapshot(), repo.registry(), HostMode::Isolated).unwrap();

        let apparmor = policy.backend(SecuritySystem::AppArmor).unwrap();
        assert_eq!(apparmor.snippet("snap.producer.daemon").unwrap(), "# permanent\n");
        assert!(apparmor.snippet("snap.consumer.app").is_none());
    }

    #[test]
    fn failed_pass_keeps_published_policy() {
        let store = PolicyStore::new();
        let repo = populated(&["consumer"]);
        let first = store.refresh(&repo, HostMode::Isolated).unwrap();
        assert!(!first.backends.is_empty());

        repo.add_package(
            PackageInfo::builder("broken", PackageKind::App)
                .app("app")
                .slot(Declaration::new("echo").attr("fail", true))
                .build()
                .unwrap(),
        )
        .unwrap();
        assert!(store.refresh(&repo, HostMode::Isolated).is_err());
        assert!(Arc::ptr_eq(&first, &store.current()));
    }

    #[test]
    fn tags_and_snippets_agree() {
        let repo = populated(&["a", "b"]);
        let mode = HostMode::Trusted;
        for system in SecuritySystem::ALL {
            let mut spec = system.new_specification(mode);
            build(spec.as_mut(), &repo.snapshot(), repo.registry()).unwrap();
            for tag in spec.security_tags() {
                assert!(spec.snippet_for_tag(tag.as_str()).is_ok());
            }
            assert!(matches!(spec.snippet_for_tag("snap.nobody.app"), Err(Error::NoSuchTag(_))));
        }
    }

    /// Blocks the first `permanent_slot` call until released.
    #[derive(Debug)]
    struct Gate {
        entered: parking_lot::Mutex<Option<mpsc::Sender<()>>>,
        release: parking_lot::Mutex<Option<mpsc::Receiver<()>>>,
    }

    impl Interface for Gate {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn static_info(&self) -> StaticInfo {
            Echo.static_info()
        }

        fn apparmor(&self) -> Option<&dyn Definer<apparmor::Specification>> {
            Some(self)
        }
    }

    impl Definer<apparmor::Specification> for Gate {
        fn connected_plug(
            &self,
            spec: &mut apparmor::Specification,
            mode: HostMode,
            plug: &ConnectedPlug,
            slot: &ConnectedSlot,
        ) -> crate::Result<()> {
            Definer::<apparmor::Specification>::connected_plug(&Echo, spec, mode, plug, slot)
        }

        fn permanent_slot(&self, spec: &mut apparmor::Specification, _mode: HostMode, _slot: &SlotInfo) -> crate::Result<()> {
            let release = self.release.lock().take();
            if let Some(release) = release {
                if let Some(entered) = self.entered.lock().take() {
                    entered.send(()).unwrap();
                }
                release.recv().unwrap();
            }
            spec.add_snippet("# permanent");
            Ok(())
        }
    }

    #[test]
    fn overlapping_refreshes_publish_the_latest_state() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let mut registry = Registry::new();
        registry
            .register(Box::new(Gate {
                entered: parking_lot::Mutex::new(Some(entered_tx)),
                release: parking_lot::Mutex::new(Some(release_rx)),
            }))
            .unwrap();
        let base = BaseDeclaration::from_registry(&registry).unwrap();
        let repo = Repository::new(Arc::new(registry), base);
        repo.add_package(
            PackageInfo::builder("producer", PackageKind::App)
                .app("daemon")
                .slot(Declaration::new("echo"))
                .build()
                .unwrap(),
        )
        .unwrap();
        repo.add_package(
            PackageInfo::builder("consumer", PackageKind::App)
                .app("app")
                .plug(Declaration::new("echo"))
                .build()
                .unwrap(),
        )
        .unwrap();

        let store = PolicyStore::new();
        std::thread::scope(|s| {
            // The first pass snapshots an unconnected model, then stalls.
            let stale = s.spawn(|| store.refresh(&repo, HostMode::Isolated));
            entered_rx.recv().unwrap();

            repo.connect(&pair("consumer"), Attributes::new(), Attributes::new(), Provenance::Manual)
                .unwrap();
            let fresh = s.spawn(|| store.refresh(&repo, HostMode::Isolated));
            release_tx.send(()).unwrap();

            stale.join().unwrap().unwrap();
            fresh.join().unwrap().unwrap();
        });

        assert_eq!(repo.connections().len(), 1);
        let current = store.current();
        let apparmor = current.backend(SecuritySystem::AppArmor).unwrap();
        assert_eq!(
            apparmor.snippet("snap.consumer.app"),
            Some("# talks to \"snap.producer.daemon\"\n")
        );
    }

    proptest! {
        #[test]
        fn compilation_is_deterministic(count in 1usize..5, trusted in any::<bool>()) {
            let names: Vec<String> = (0..count).map(|i| format!("consumer{i}")).collect();
            let refs: Vec<&str> = names.iter().map(String::as_str).collect();
            let repo = populated(&refs);
            let mode = if trusted { HostMode::Trusted } else { HostMode::Isolated };

            let first = compile(&repo.snapshot(), repo.registry(), mode).unwrap();
            let second = compile(&repo.snapshot(), repo.registry(), mode).unwrap();
            prop_assert_eq!(first, second);
        }
    }
}
