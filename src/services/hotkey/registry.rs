use crate::config::{ClientGroup, HotkeysConfig};
use crate::error::{GlanceError, Result};
use crate::events::{HotkeyDirection, HotkeyEvent};
use crate::mappings::native_chord;
use crate::platform::{AnimationStyle, PlatformBackend};
use crate::services::cycle::WindowCycleEngine;
use crate::services::reconciler::ThumbnailReconciler;
use crate::services::ui_thread::UiDispatcher;
use crate::trace_if_enabled;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::parser::HotkeySpec;
use super::r#trait::{GlobalHotkeySource, HotkeyBinding};

/// A hotkey that could not be registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationFailure {
    pub group_id: String,
    pub direction: HotkeyDirection,
    pub chord: String,
    pub reason: String,
}

/// Outcome of registering a set of groups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationReport {
    pub registered: usize,
    pub failures: Vec<RegistrationFailure>,
    /// The id range ran out; later hotkeys were not attempted.
    pub exhausted: bool,
}

struct RegistryState {
    next_id: i32,
    animation: AnimationStyle,
    bindings: HashMap<i32, HotkeyBinding>,
    forward: HashMap<i32, String>,
    backward: HashMap<i32, String>,
    groups: HashMap<String, ClientGroup>,
    dispatch: Option<JoinHandle<()>>,
}

/// Owns the group hotkeys and turns presses into window activations.
pub struct HotkeyRegistry {
    source: Arc<dyn GlobalHotkeySource>,
    backend: Arc<dyn PlatformBackend>,
    ui: UiDispatcher,
    reconciler: Arc<ThumbnailReconciler>,
    id_base: i32,
    max_ids: usize,
    /// Serializes register/unregister passes against each other.
    registration: Mutex<()>,
    state: Mutex<RegistryState>,
}

impl HotkeyRegistry {
    pub fn new(
        source: Arc<dyn GlobalHotkeySource>,
        backend: Arc<dyn PlatformBackend>,
        ui: UiDispatcher,
        reconciler: Arc<ThumbnailReconciler>,
        config: &HotkeysConfig,
    ) -> Self {
        Self {
            source,
            backend,
            ui,
            reconciler,
            id_base: config.id_base,
            max_ids: config.max_ids,
            registration: Mutex::new(()),
            state: Mutex::new(RegistryState {
                next_id: config.id_base,
                animation: config.animation,
                bindings: HashMap::new(),
                forward: HashMap::new(),
                backward: HashMap::new(),
                groups: HashMap::new(),
                dispatch: None,
            }),
        }
    }

    pub fn set_animation(&self, animation: AnimationStyle) {
        self.state.lock().animation = animation;
    }

    /// Register the forward/backward hotkeys of every group, in order.
    pub fn register_groups(&self, groups: &[ClientGroup]) -> RegistrationReport {
        let _registration = self.registration.lock();
        self.register_groups_locked(groups)
    }

    /// Drop every hotkey and register `groups` from a fresh id range.
    pub fn reregister(&self, groups: &[ClientGroup]) -> RegistrationReport {
        let _registration = self.registration.lock();
        self.unregister_all_locked();
        self.state.lock().groups.clear();
        self.register_groups_locked(groups)
    }

    /// Caller holds `registration`. `state` is only locked between OS calls,
    /// so presses keep resolving while a slow `register` is in flight.
    fn register_groups_locked(&self, groups: &[ClientGroup]) -> RegistrationReport {
        let mut report = RegistrationReport::default();
        let mut next_id = self.state.lock().next_id;

        'groups: for group in groups {
            self.state.lock().groups.insert(group.id.clone(), group.clone());

            let chords = [
                (HotkeyDirection::Forward, &group.forward_hotkey),
                (HotkeyDirection::Backward, &group.backward_hotkey),
            ];
            for (direction, chord) in chords {
                let Some(chord) = chord else {
                    continue;
                };
                let failure = |reason: String| RegistrationFailure {
                    group_id: group.id.clone(),
                    direction,
                    chord: chord.clone(),
                    reason,
                };

                let spec = match HotkeySpec::parse(chord) {
                    Ok(spec) => spec,
                    Err(e) => {
                        warn!("Group '{}': {}", group.id, e);
                        report.failures.push(failure(e.to_string()));
                        continue;
                    }
                };

                // Ids are only consumed by successful registrations
                if (next_id - self.id_base) as usize >= self.max_ids {
                    let e = GlanceError::HotkeyIdsExhausted {
                        base: self.id_base,
                        max: self.max_ids,
                    };
                    error!("Group '{}' {} hotkey not registered: {}", group.id, direction, e);
                    report.failures.push(failure(e.to_string()));
                    report.exhausted = true;
                    break 'groups;
                }

                let (modifier_mask, key_code) = native_chord(self.source.kind(), &spec);
                let binding = HotkeyBinding {
                    id: next_id,
                    group_id: group.id.clone(),
                    direction,
                    spec,
                    modifier_mask,
                    key_code,
                };

                // May block on the OS; no state lock held here
                match self.source.register(&binding) {
                    Ok(()) => {
                        info!(
                            "Hotkey {} → group '{}' {} (id {})",
                            binding.spec, group.id, direction, binding.id
                        );
                        next_id += 1;
                        self.commit(binding, next_id);
                        report.registered += 1;
                    }
                    Err(e) => {
                        if e.is_expected() {
                            debug!("Group '{}' hotkey {} unavailable: {}", group.id, chord, e);
                        } else {
                            warn!("Group '{}' hotkey {} not registered: {}", group.id, chord, e);
                        }
                        report.failures.push(failure(e.to_string()));
                    }
                }
            }
        }

        report
    }

    fn commit(&self, binding: HotkeyBinding, next_id: i32) {
        let mut state = self.state.lock();
        let map = match binding.direction {
            HotkeyDirection::Forward => &mut state.forward,
            HotkeyDirection::Backward => &mut state.backward,
        };
        map.insert(binding.id, binding.group_id.clone());
        state.bindings.insert(binding.id, binding);
        state.next_id = next_id;
    }

    /// Group and direction bound to hotkey `id`.
    pub fn resolve(&self, id: i32) -> Option<(String, HotkeyDirection)> {
        let state = self.state.lock();
        if let Some(group) = state.forward.get(&id) {
            return Some((group.clone(), HotkeyDirection::Forward));
        }
        state
            .backward
            .get(&id)
            .map(|group| (group.clone(), HotkeyDirection::Backward))
    }

    pub fn registered_ids(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = self.state.lock().bindings.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub async fn handle_activation(&self, id: i32) -> Result<Option<String>> {
        let Some((group_id, direction)) = self.resolve(id) else {
            debug!("Ignoring unknown hotkey id {}", id);
            return Ok(None);
        };
        self.cycle_group(&group_id, direction.is_forward()).await
    }

    /// Activate the next active member of `group_id`. Returns the activated title.
    pub async fn cycle_group(&self, group_id: &str, forward: bool) -> Result<Option<String>> {
        let (members, animation) = {
            let state = self.state.lock();
            let Some(group) = state.groups.get(group_id) else {
                debug!("Unknown group '{}'", group_id);
                return Ok(None);
            };
            (group.members.clone(), state.animation)
        };

        // Position in the cycle comes from whichever client is in front
        let active = self.reconciler.active_titles();
        let foreground = match self.backend.foreground_window() {
            Ok(foreground) => foreground,
            Err(e) => {
                debug!("Foreground window unavailable: {}", e);
                None
            }
        };
        let current = foreground.and_then(|window| self.reconciler.title_for_window(window));

        let Some(next) = WindowCycleEngine::next(&members, &active, current.as_deref(), forward) else {
            debug!("Group '{}' has no active members", group_id);
            return Ok(None);
        };
        let Some(window) = self.reconciler.window_for_title(&next) else {
            return Ok(None);
        };

        // Activation touches windows, so it runs on the UI thread
        match self
            .ui
            .invoke(move |backend| backend.activate_window(window, animation))
            .await?
        {
            Ok(()) => {
                debug!("Group '{}': activated '{}'", group_id, next);
                Ok(Some(next))
            }
            Err(e) if e.is_expected() => {
                debug!("Group '{}': '{}' is gone: {}", group_id, next, e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Dispatch presses from `events` until `stop`. No-op if already running.
    pub fn start(self: &Arc<Self>, mut events: mpsc::UnboundedReceiver<HotkeyEvent>) {
        let mut state = self.state.lock();
        if state.dispatch.is_some() {
            return;
        }

        let this = Arc::clone(self);
        state.dispatch = Some(tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                trace_if_enabled!("Hotkey {} queued for {:?}", event.id, event.timestamp.elapsed());
                if let Err(e) = this.handle_activation(event.id).await {
                    warn!("Hotkey {} failed: {}", event.id, e);
                }
            }
            debug!("Hotkey dispatch finished");
        }));
    }

    /// Unregister everything and stop the OS pump and the dispatch task. Idempotent.
    pub async fn stop(&self, timeout: Duration) {
        {
            let _registration = self.registration.lock();
            self.unregister_all_locked();
        }
        self.source.stop(timeout);

        let dispatch = self.state.lock().dispatch.take();
        if let Some(task) = dispatch {
            task.abort();
            let _ = tokio::time::timeout(timeout, task).await;
        }
        info!("Hotkey registry stopped");
    }

    /// Caller holds `registration`.
    fn unregister_all_locked(&self) {
        // Forget the ids first, then release them with the lock dropped
        let ids: Vec<i32> = {
            let mut state = self.state.lock();
            state.forward.clear();
            state.backward.clear();
            state.next_id = self.id_base;
            state.bindings.drain().map(|(id, _)| id).collect()
        };
        for id in ids {
            if let Err(e) = self.source.unregister(id) {
                debug!("Unregistering hotkey {} failed: {}", id, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::platform::{BackendKind, DryRunBackend, DryRunProcessTable, WindowHandle};
    use crate::services::hotkey::dry_run::{DryRunHotkeySource, UnsupportedHotkeySource};
    use crate::services::profile::ConfigProfile;
    use crate::services::ui_thread::UiThread;
    use std::sync::Weak;

    struct Harness {
        backend: Arc<DryRunBackend>,
        source: Arc<DryRunHotkeySource>,
        registry: Arc<HotkeyRegistry>,
        windows: Vec<WindowHandle>,
        events: Option<mpsc::UnboundedReceiver<HotkeyEvent>>,
        ui: UiThread,
    }

    fn group(id: &str, members: &[&str], forward: Option<&str>, backward: Option<&str>) -> ClientGroup {
        ClientGroup {
            id: id.to_string(),
            members: members.iter().map(|m| m.to_string()).collect(),
            forward_hotkey: forward.map(str::to_string),
            backward_hotkey: backward.map(str::to_string),
        }
    }

    async fn harness(hotkeys: HotkeysConfig) -> Harness {
        let backend = Arc::new(DryRunBackend::new());
        let table = Arc::new(DryRunProcessTable::new());
        let mut windows = Vec::new();
        for (pid, name) in [(1, "A"), (2, "B"), (3, "C")] {
            table.add(pid, "game");
            windows.push(backend.spawn_window(pid, name));
        }

        let mut config = Config::default();
        config.reconciler.processes = vec!["game".to_string()];
        let ui = UiThread::spawn(backend.clone()).unwrap();
        let reconciler = Arc::new(ThumbnailReconciler::new(
            backend.clone(),
            table,
            Arc::new(ConfigProfile::new(config)),
            ui.dispatcher(),
            Duration::from_millis(100),
        ));
        reconciler.scan_once().await.unwrap();

        let (tx, rx) = mpsc::unbounded_channel();
        let source = Arc::new(DryRunHotkeySource::new(tx));
        let registry = Arc::new(HotkeyRegistry::new(
            source.clone(),
            backend.clone(),
            ui.dispatcher(),
            reconciler,
            &hotkeys,
        ));
        Harness {
            backend,
            source,
            registry,
            windows,
            events: Some(rx),
            ui,
        }
    }

    impl Harness {
        fn foreground(&self) -> Option<WindowHandle> {
            self.backend.foreground_window().unwrap()
        }
    }

    #[tokio::test]
    async fn test_sequential_ids_and_parse_failures() {
        let h = harness(HotkeysConfig::default()).await;
        let report = h.registry.register_groups(&[
            group("main", &["A", "B"], Some("Ctrl+F1"), Some("Ctrl+Shift+F1")),
            group("bad", &["C"], Some("Ctrl+Foo"), None),
            group("alt", &["C"], Some("Alt+2"), None),
        ]);

        assert_eq!(report.registered, 3);
        assert!(!report.exhausted);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].group_id, "bad");
        assert_eq!(h.source.registered_ids(), vec![9000, 9001, 9002]);
        assert_eq!(h.registry.resolve(9001), Some(("main".to_string(), HotkeyDirection::Backward)));
        assert_eq!(h.registry.resolve(9002), Some(("alt".to_string(), HotkeyDirection::Forward)));
    }

    #[tokio::test]
    async fn test_exhausted_ids_stop_registration() {
        let hotkeys = HotkeysConfig {
            id_base: 100,
            max_ids: 2,
            ..HotkeysConfig::default()
        };
        let h = harness(hotkeys).await;
        let report = h.registry.register_groups(&[
            group("one", &["A"], Some("F1"), Some("F2")),
            group("two", &["B"], Some("F3"), Some("F4")),
        ]);

        assert_eq!(report.registered, 2);
        assert!(report.exhausted);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(h.registry.registered_ids(), vec![100, 101]);
    }

    #[tokio::test]
    async fn test_rejected_chord_does_not_consume_id() {
        let h = harness(HotkeysConfig::default()).await;
        h.source.reject("Ctrl+F1");
        let report = h.registry.register_groups(&[group("main", &["A"], Some("ctrl+f1"), Some("Ctrl+F2"))]);

        assert_eq!(report.registered, 1);
        assert_eq!(report.failures[0].direction, HotkeyDirection::Forward);
        assert_eq!(h.registry.resolve(9000), Some(("main".to_string(), HotkeyDirection::Backward)));
    }

    #[tokio::test]
    async fn test_cycle_forward_backward_and_outside_group() {
        let h = harness(HotkeysConfig::default()).await;
        h.registry.register_groups(&[group("main", &["A", "B", "C"], None, None)]);
        let [a, b, c] = [h.windows[0], h.windows[1], h.windows[2]];

        h.backend.set_foreground(Some(b));
        assert_eq!(h.registry.cycle_group("main", true).await.unwrap().as_deref(), Some("C"));
        assert_eq!(h.foreground(), Some(c));

        h.backend.set_foreground(Some(a));
        assert_eq!(h.registry.cycle_group("main", false).await.unwrap().as_deref(), Some("C"));

        h.backend.set_foreground(None);
        assert_eq!(h.registry.cycle_group("main", true).await.unwrap().as_deref(), Some("A"));
        assert_eq!(h.foreground(), Some(a));
    }

    #[tokio::test]
    async fn test_cycle_tolerates_vanished_target() {
        let h = harness(HotkeysConfig::default()).await;
        h.registry.register_groups(&[group("main", &["A", "B"], None, None)]);
        h.backend.set_foreground(Some(h.windows[0]));
        h.backend.close_window(h.windows[1]);

        assert_eq!(h.registry.cycle_group("main", true).await.unwrap(), None);
        assert_eq!(h.registry.cycle_group("missing", true).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_hotkey_press_is_dispatched() {
        let mut h = harness(HotkeysConfig::default()).await;
        h.registry
            .register_groups(&[group("main", &["A", "B", "C"], Some("Ctrl+Tab"), Some("Ctrl+Shift+Tab"))]);
        h.registry.start(h.events.take().unwrap());
        h.backend.set_foreground(Some(h.windows[2]));

        assert!(h.source.trigger(9000));
        let mut activated = false;
        for _ in 0..100 {
            if h.foreground() == Some(h.windows[0]) {
                activated = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(activated);

        h.registry.stop(Duration::from_secs(1)).await;
        h.registry.stop(Duration::from_secs(1)).await;
        assert!(h.source.registered_ids().is_empty());
        assert!(!h.source.trigger(9000));
    }

    #[tokio::test]
    async fn test_reregister_starts_from_base() {
        let h = harness(HotkeysConfig::default()).await;
        h.registry.register_groups(&[group("main", &["A"], Some("F1"), Some("F2"))]);
        let report = h.registry.reregister(&[group("other", &["B"], Some("F5"), None)]);

        assert_eq!(report.registered, 1);
        assert_eq!(h.source.registered_ids(), vec![9000]);
        assert_eq!(h.registry.resolve(9000), Some(("other".to_string(), HotkeyDirection::Forward)));
        assert_eq!(h.registry.cycle_group("main", true).await.unwrap(), None);
    }

    /// Source that looks back into the registry from inside `register`,
    /// like a dispatch arriving while the OS call is still pending.
    struct ReentrantSource {
        registry: Mutex<Weak<HotkeyRegistry>>,
        seen: Mutex<Vec<Vec<i32>>>,
    }

    impl GlobalHotkeySource for ReentrantSource {
        fn kind(&self) -> BackendKind {
            BackendKind::DryRun
        }

        fn register(&self, binding: &HotkeyBinding) -> Result<()> {
            if let Some(registry) = self.registry.lock().upgrade() {
                assert_eq!(registry.resolve(binding.id), None);
                self.seen.lock().push(registry.registered_ids());
            }
            Ok(())
        }

        fn unregister(&self, _id: i32) -> Result<()> {
            Ok(())
        }

        fn stop(&self, _timeout: Duration) {}
    }

    #[tokio::test]
    async fn test_registry_readable_while_source_registers() {
        let h = harness(HotkeysConfig::default()).await;
        let source = Arc::new(ReentrantSource {
            registry: Mutex::new(Weak::new()),
            seen: Mutex::new(Vec::new()),
        });
        let registry = Arc::new(HotkeyRegistry::new(
            source.clone(),
            h.backend.clone(),
            h.ui.dispatcher(),
            h.registry.reconciler.clone(),
            &HotkeysConfig::default(),
        ));
        *source.registry.lock() = Arc::downgrade(&registry);

        let groups = vec![group("main", &["A"], Some("F1"), Some("F2"))];
        let worker = {
            let registry = registry.clone();
            tokio::task::spawn_blocking(move || registry.register_groups(&groups))
        };
        let report = tokio::time::timeout(Duration::from_secs(2), worker)
            .await
            .expect("registration blocked on the registry lock")
            .unwrap();

        assert_eq!(report.registered, 2);
        assert_eq!(*source.seen.lock(), vec![vec![], vec![9000]]);
        assert_eq!(registry.resolve(9001), Some(("main".to_string(), HotkeyDirection::Backward)));
    }

    #[tokio::test]
    async fn test_unsupported_source_reports_every_hotkey() {
        let h = harness(HotkeysConfig::default()).await;
        let registry = HotkeyRegistry::new(
            Arc::new(UnsupportedHotkeySource::new(BackendKind::Wayland)),
            h.backend.clone(),
            h.ui.dispatcher(),
            h.registry.reconciler.clone(),
            &HotkeysConfig::default(),
        );
        let report = registry.register_groups(&[group("main", &["A"], Some("F1"), Some("F2"))]);

        assert_eq!(report.registered, 0);
        assert_eq!(report.failures.len(), 2);
        assert!(registry.registered_ids().is_empty());
    }
}
