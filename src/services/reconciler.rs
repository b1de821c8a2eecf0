use crate::config::ThumbnailConfig;
use crate::debug_if_enabled;
use crate::error::{GlanceError, Result};
use crate::events::ThumbnailEvent;
use crate::platform::{PlatformBackend, ProcessEntry, ProcessTable, Rect, SurfaceSpec, WindowHandle};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::profile::ProfileSource;
use super::thumbnail::LiveThumbnail;
use super::ui_thread::UiDispatcher;

const EVENT_CAPACITY: usize = 64;

/// Bare client title shown before a character is selected.
const UNIDENTIFIED_TITLE: &str = "EVE";

/// One watched process with a thumbnail surface.
pub struct TrackedThumbnail {
    pub pid: u32,
    pub process_name: String,
    pub title: String,
    pub source: WindowHandle,
    pub surface: WindowHandle,
    pub config: ThumbnailConfig,
    /// `None` when the backend cannot mirror live content.
    pub thumbnail: Option<LiveThumbnail>,
}

/// What one pass saw for a matching process.
struct Observation {
    entry: ProcessEntry,
    window: WindowHandle,
    title: String,
}

struct Control {
    paused: bool,
    task: Option<JoinHandle<()>>,
    events: Option<broadcast::Sender<ThumbnailEvent>>,
}

/// Keeps one thumbnail per watched process that has a usable main window.
pub struct ThumbnailReconciler {
    backend: Arc<dyn PlatformBackend>,
    processes: Arc<dyn ProcessTable>,
    profile: Arc<dyn ProfileSource>,
    ui: UiDispatcher,
    poll_interval: Duration,
    tracked: Arc<DashMap<u32, TrackedThumbnail>>,
    control: Mutex<Control>,
}

/// Whether a window title identifies a client worth previewing.
pub fn is_identified_title(title: &str) -> bool {
    let title = title.trim();
    !title.is_empty() && title != UNIDENTIFIED_TITLE
}

impl ThumbnailReconciler {
    pub fn new(
        backend: Arc<dyn PlatformBackend>,
        processes: Arc<dyn ProcessTable>,
        profile: Arc<dyn ProfileSource>,
        ui: UiDispatcher,
        poll_interval: Duration,
    ) -> Self {
        Self {
            backend,
            processes,
            profile,
            ui,
            poll_interval,
            tracked: Arc::new(DashMap::new()),
            control: Mutex::new(Control {
                paused: false,
                task: None,
                events: None,
            }),
        }
    }

    /// Start the polling task. No-op if already running.
    pub fn start(self: &Arc<Self>) {
        let mut control = self.control.lock();
        if control.task.is_some() {
            return;
        }
        control
            .events
            .get_or_insert_with(|| broadcast::channel(EVENT_CAPACITY).0);

        let this = Arc::clone(self);
        control.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(e) = this.scan_once().await {
                    warn!("Thumbnail scan failed: {}", e);
                    if matches!(e, GlanceError::ServiceUnavailable(_)) {
                        break;
                    }
                }
            }
        }));
        info!("Thumbnail reconciler started ({:?} interval)", self.poll_interval);
    }

    /// Stop polling, remove every thumbnail and close event subscriptions.
    /// Idempotent.
    pub async fn stop(&self, timeout: Duration) {
        let (task, events) = {
            let mut control = self.control.lock();
            (control.task.take(), control.events.take())
        };

        if let Some(task) = task {
            task.abort();
            let _ = tokio::time::timeout(timeout, task).await;
        }

        // Collect pids on the UI thread so creates still queued there are torn down too
        let tracked = self.tracked.clone();
        let job = self.ui.invoke(move |backend| {
            let pids: Vec<u32> = tracked.iter().map(|t| *t.key()).collect();
            remove_tracked(backend, &tracked, &pids, events.as_ref());
        });
        match tokio::time::timeout(timeout, job).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!("Thumbnail teardown off the UI thread: {}", e);
                self.tracked.clear();
            }
            Err(_) => warn!("Thumbnail teardown timed out after {:?}", timeout),
        }
        info!("Thumbnail reconciler stopped");
    }

    pub fn set_paused(&self, paused: bool) {
        self.control.lock().paused = paused;
        debug!("Thumbnail reconciler {}", if paused { "paused" } else { "resumed" });
    }

    pub fn is_paused(&self) -> bool {
        self.control.lock().paused
    }

    /// Lifecycle notifications until the next `stop`.
    pub fn subscribe(&self) -> broadcast::Receiver<ThumbnailEvent> {
        self.control
            .lock()
            .events
            .get_or_insert_with(|| broadcast::channel(EVENT_CAPACITY).0)
            .subscribe()
    }

    pub fn tracked_count(&self) -> usize {
        self.tracked.len()
    }

    pub fn active_titles(&self) -> Vec<String> {
        let mut tracked: Vec<(u32, String)> = self.tracked.iter().map(|t| (t.pid, t.title.clone())).collect();
        tracked.sort_by_key(|(pid, _)| *pid);
        tracked.into_iter().map(|(_, title)| title).collect()
    }

    /// Title of the tracked client whose main window is `window`.
    pub fn title_for_window(&self, window: WindowHandle) -> Option<String> {
        self.tracked
            .iter()
            .find(|t| t.source == window)
            .map(|t| t.title.clone())
    }

    /// Main window of the tracked client titled `title` (case-insensitive).
    pub fn window_for_title(&self, title: &str) -> Option<WindowHandle> {
        self.tracked
            .iter()
            .find(|t| t.title.eq_ignore_ascii_case(title))
            .map(|t| t.source)
    }

    /// One reconciliation pass.
    pub async fn scan_once(&self) -> Result<()> {
        if self.is_paused() {
            return Ok(());
        }

        // Snapshot what the previous pass left behind
        let previous: HashSet<u32> = self.tracked.iter().map(|t| *t.key()).collect();
        let mut present: HashSet<u32> = HashSet::new();
        let mut claimed_titles: HashSet<String> = self.tracked.iter().map(|t| t.title.to_lowercase()).collect();

        for pattern in self.profile.watched_processes().await {
            // A failed enumeration only hides this pattern for one pass
            let entries = match self.processes.find_by_name(&pattern) {
                Ok(entries) => entries,
                Err(e) => {
                    debug!("Enumerating '{}' failed: {}", pattern, e);
                    continue;
                }
            };

            for entry in entries {
                // Several patterns can match the same process
                if present.contains(&entry.pid) {
                    continue;
                }
                let Some(observation) = self.observe(entry) else {
                    continue;
                };
                let pid = observation.entry.pid;

                if previous.contains(&pid) {
                    let tracked_source = self.tracked.get(&pid).map(|t| t.source);
                    if tracked_source == Some(observation.window) {
                        present.insert(pid);
                        self.refresh(pid).await?;
                        continue;
                    }

                    // Same pid, different main window: the old client is gone
                    // and the pid was handed to a new process.
                    debug!("pid {} now owns a different window, replacing its thumbnail", pid);
                    if let Some(stale) = self.remove(pid).await? {
                        claimed_titles.remove(&stale.to_lowercase());
                    }
                }

                if !is_identified_title(&observation.title) {
                    debug_if_enabled!("Skipping pid {} with title '{}'", pid, observation.title);
                    continue;
                }
                // Two clients with the same title: the first one seen keeps it.
                if !claimed_titles.insert(observation.title.to_lowercase()) {
                    debug!("Title '{}' already has a thumbnail, skipping pid {}", observation.title, pid);
                    continue;
                }

                if self.create(observation).await? {
                    present.insert(pid);
                }
            }
        }

        // Anything tracked but not seen this pass has exited or lost its window
        let gone: Vec<u32> = previous.difference(&present).copied().collect();
        if !gone.is_empty() {
            let tracked = self.tracked.clone();
            let events = self.events();
            self.ui
                .invoke(move |backend| remove_tracked(backend, &tracked, &gone, events.as_ref()))
                .await?;
        }

        debug_if_enabled!("Scan complete: {} tracked", self.tracked.len());
        Ok(())
    }

    /// Reapply the current profile to every tracked thumbnail.
    pub async fn resync(&self) -> Result<()> {
        let pids: Vec<u32> = self.tracked.iter().map(|t| *t.key()).collect();
        for pid in pids {
            self.refresh(pid).await?;
        }
        info!("Resynchronized {} thumbnails", self.tracked.len());
        Ok(())
    }

    fn events(&self) -> Option<broadcast::Sender<ThumbnailEvent>> {
        self.control.lock().events.clone()
    }

    /// Exited, windowless or unreadable processes are absent this pass.
    fn observe(&self, entry: ProcessEntry) -> Option<Observation> {
        let pid = entry.pid;
        let attempt = || -> Result<Option<Observation>> {
            if self.processes.has_exited(pid)? {
                return Ok(None);
            }
            let Some(window) = self.backend.find_main_window(pid)? else {
                return Ok(None);
            };
            if window.is_null() {
                return Ok(None);
            }
            let title = self.backend.window_title(window)?.trim().to_string();
            Ok(Some(Observation { entry, window, title }))
        };

        match attempt() {
            Ok(observation) => observation,
            Err(e) => {
                debug!("pid {} treated as absent: {}", pid, e);
                None
            }
        }
    }

    /// Tear down one tracked thumbnail. Returns the title it had.
    async fn remove(&self, pid: u32) -> Result<Option<String>> {
        let tracked = self.tracked.clone();
        let events = self.events();
        self.ui
            .invoke(move |backend| {
                let title = tracked.get(&pid).map(|t| t.title.clone());
                remove_tracked(backend, &tracked, &[pid], events.as_ref());
                title
            })
            .await
    }

    async fn create(&self, observation: Observation) -> Result<bool> {
        let config = self.profile.thumbnail_config(&observation.title).await;
        let tracked = self.tracked.clone();
        let events = self.events();

        self.ui
            .invoke(move |backend| create_tracked(backend, &tracked, observation, config, events.as_ref()))
            .await
    }

    /// Pick up profile changes for a tracked thumbnail without touching its binding.
    async fn refresh(&self, pid: u32) -> Result<()> {
        let Some(title) = self.tracked.get(&pid).map(|t| t.title.clone()) else {
            return Ok(());
        };
        let config = self.profile.thumbnail_config(&title).await;
        if self.tracked.get(&pid).is_some_and(|t| t.config == config) {
            return Ok(());
        }

        let tracked = self.tracked.clone();
        self.ui
            .invoke(move |backend| {
                if let Some(mut entry) = tracked.get_mut(&pid) {
                    entry.config = config;
                    apply_config(backend, &mut entry);
                }
            })
            .await
    }
}

fn content_rect(config: &ThumbnailConfig) -> Rect {
    Rect::from_origin_size(0, 0, config.width, config.height)
}

/// Runs on the UI thread.
fn apply_config(backend: &Arc<dyn PlatformBackend>, entry: &mut TrackedThumbnail) {
    let config = &entry.config;
    if let Err(e) = backend.move_window(entry.surface, config.x, config.y, config.width, config.height) {
        debug!("Moving surface for '{}' failed: {}", entry.title, e);
    }
    if let Some(thumbnail) = entry.thumbnail.as_mut() {
        thumbnail.move_to(content_rect(config));
        thumbnail.set_opacity(config.opacity);
        thumbnail.set_visible(true);
        if let Err(e) = thumbnail.update() {
            debug!("Thumbnail update for '{}' failed: {}", entry.title, e);
        }
    }
}

/// Runs on the UI thread. Returns whether a new entry was inserted.
fn create_tracked(
    backend: &Arc<dyn PlatformBackend>,
    tracked: &DashMap<u32, TrackedThumbnail>,
    observation: Observation,
    config: ThumbnailConfig,
    events: Option<&broadcast::Sender<ThumbnailEvent>>,
) -> bool {
    let pid = observation.entry.pid;
    // A queued duplicate create for the same pid loses
    let Entry::Vacant(slot) = tracked.entry(pid) else {
        return false;
    };

    let spec = SurfaceSpec {
        title: observation.title.clone(),
        x: config.x,
        y: config.y,
        width: config.width,
        height: config.height,
    };
    let surface = match backend.create_surface(&spec) {
        Ok(surface) => surface,
        Err(e) => {
            debug!("No surface for '{}': {}", observation.title, e);
            return false;
        }
    };

    // Without live mirroring the surface stays up with a static frame at most
    let mut thumbnail = LiveThumbnail::new(backend.clone(), surface, observation.window);
    let thumbnail = match thumbnail.register() {
        Ok(()) => Some(thumbnail),
        Err(GlanceError::Unsupported { .. }) => {
            if let Some(frame) = backend.capture_static_thumbnail(observation.window) {
                debug_if_enabled!(
                    "Static capture {}x{} for '{}'",
                    frame.width(),
                    frame.height(),
                    observation.title
                );
            }
            None
        }
        Err(e) => {
            debug!("Registering thumbnail for '{}' failed: {}", observation.title, e);
            let _ = backend.destroy_surface(surface);
            return false;
        }
    };

    let mut entry = TrackedThumbnail {
        pid,
        process_name: observation.entry.name,
        title: observation.title,
        source: observation.window,
        surface,
        config,
        thumbnail,
    };
    apply_config(backend, &mut entry);

    info!("Thumbnail added: '{}' (pid {})", entry.title, pid);
    let title = entry.title.clone();
    slot.insert(entry);
    if let Some(events) = events {
        let _ = events.send(ThumbnailEvent::Added(title));
    }
    true
}

/// Runs on the UI thread.
fn remove_tracked(
    backend: &Arc<dyn PlatformBackend>,
    tracked: &DashMap<u32, TrackedThumbnail>,
    pids: &[u32],
    events: Option<&broadcast::Sender<ThumbnailEvent>>,
) {
    for pid in pids {
        let Some((_, mut entry)) = tracked.remove(pid) else {
            continue;
        };
        // Binding first, then the surface it renders into
        if let Some(mut thumbnail) = entry.thumbnail.take() {
            thumbnail.unregister();
        }
        if let Err(e) = backend.destroy_surface(entry.surface) {
            debug!("Destroying surface for '{}' failed: {}", entry.title, e);
        }
        info!("Thumbnail removed: '{}' (pid {})", entry.title, pid);
        if let Some(events) = events {
            let _ = events.send(ThumbnailEvent::Removed(entry.title));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::platform::dry_run::BackendCall;
    use crate::platform::{DryRunBackend, DryRunProcessTable};
    use crate::services::profile::ConfigProfile;
    use crate::services::ui_thread::UiThread;
    use tokio::sync::broadcast::error::TryRecvError;

    struct Harness {
        backend: Arc<DryRunBackend>,
        table: Arc<DryRunProcessTable>,
        profile: Arc<ConfigProfile>,
        reconciler: Arc<ThumbnailReconciler>,
        _ui: UiThread,
    }

    fn harness_with(backend: DryRunBackend, processes: &[&str]) -> Harness {
        let backend = Arc::new(backend);
        let table = Arc::new(DryRunProcessTable::new());
        let mut config = Config::default();
        config.reconciler.processes = processes.iter().map(|p| p.to_string()).collect();
        let profile = Arc::new(ConfigProfile::new(config));
        let ui = UiThread::spawn(backend.clone()).unwrap();
        let reconciler = Arc::new(ThumbnailReconciler::new(
            backend.clone(),
            table.clone(),
            profile.clone(),
            ui.dispatcher(),
            Duration::from_millis(100),
        ));
        Harness {
            backend,
            table,
            profile,
            reconciler,
            _ui: ui,
        }
    }

    fn harness(processes: &[&str]) -> Harness {
        harness_with(DryRunBackend::new(), processes)
    }

    impl Harness {
        fn client(&self, pid: u32, process: &str, title: &str) -> WindowHandle {
            self.table.add(pid, process);
            self.backend.spawn_window(pid, title)
        }

        fn drain(events: &mut broadcast::Receiver<ThumbnailEvent>) -> Vec<ThumbnailEvent> {
            let mut out = Vec::new();
            loop {
                match events.try_recv() {
                    Ok(event) => out.push(event),
                    Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return out,
                    Err(TryRecvError::Lagged(_)) => continue,
                }
            }
        }
    }

    #[tokio::test]
    async fn test_two_clients_then_one_exits() {
        let h = harness(&["game.exe"]);
        let mut events = h.reconciler.subscribe();
        h.client(100, "game", "EVE - Alice");
        h.client(200, "game", "EVE - Bob");

        h.reconciler.scan_once().await.unwrap();
        let added = Harness::drain(&mut events);
        assert_eq!(added.len(), 2);
        assert!(added.contains(&ThumbnailEvent::Added("EVE - Alice".into())));
        assert!(added.contains(&ThumbnailEvent::Added("EVE - Bob".into())));
        assert_eq!(h.backend.live_thumbnail_count(), 2);
        assert_eq!(h.backend.surface_count(), 2);

        h.table.mark_exited(200);
        h.reconciler.scan_once().await.unwrap();
        assert_eq!(Harness::drain(&mut events), vec![ThumbnailEvent::Removed("EVE - Bob".into())]);
        assert_eq!(h.backend.live_thumbnail_count(), 1);
        assert_eq!(h.backend.surface_count(), 1);
        assert_eq!(h.reconciler.active_titles(), vec!["EVE - Alice".to_string()]);
    }

    #[tokio::test]
    async fn test_repeated_scans_do_not_duplicate() {
        let h = harness(&["game"]);
        let mut events = h.reconciler.subscribe();
        for pid in 1..=3 {
            h.client(pid, "game.exe", &format!("EVE - Pilot {}", pid));
        }

        for _ in 0..3 {
            h.reconciler.scan_once().await.unwrap();
        }
        assert_eq!(h.reconciler.tracked_count(), 3);
        assert_eq!(h.backend.live_thumbnail_count(), 3);
        assert_eq!(Harness::drain(&mut events).len(), 3);
        let registrations = h
            .backend
            .calls()
            .iter()
            .filter(|c| matches!(c, BackendCall::RegisterThumbnail { .. }))
            .count();
        assert_eq!(registrations, 3);
    }

    #[tokio::test]
    async fn test_unidentified_client_is_skipped_until_named() {
        let h = harness(&["game"]);
        let window = h.client(1, "game", "EVE");
        h.client(2, "game", "   ");

        h.reconciler.scan_once().await.unwrap();
        assert_eq!(h.reconciler.tracked_count(), 0);

        h.backend.set_title(window, "EVE - Alice");
        h.reconciler.scan_once().await.unwrap();
        assert_eq!(h.reconciler.active_titles(), vec!["EVE - Alice".to_string()]);
    }

    #[tokio::test]
    async fn test_closed_window_removes_once() {
        let h = harness(&["game"]);
        let mut events = h.reconciler.subscribe();
        let window = h.client(1, "game", "EVE - Alice");
        h.reconciler.scan_once().await.unwrap();
        Harness::drain(&mut events);

        h.backend.close_window(window);
        h.reconciler.scan_once().await.unwrap();
        h.reconciler.scan_once().await.unwrap();

        assert_eq!(Harness::drain(&mut events), vec![ThumbnailEvent::Removed("EVE - Alice".into())]);
        assert_eq!(h.backend.live_thumbnail_count(), 0);
    }

    #[tokio::test]
    async fn test_enumeration_failure_only_affects_that_process() {
        let h = harness(&["game"]);
        h.client(1, "game", "EVE - Alice");
        h.client(2, "game", "EVE - Bob");
        h.backend.deny_access(2);

        h.reconciler.scan_once().await.unwrap();
        assert_eq!(h.reconciler.active_titles(), vec!["EVE - Alice".to_string()]);
    }

    #[tokio::test]
    async fn test_duplicate_titles_first_match_wins() {
        let h = harness(&["game"]);
        h.client(1, "game", "EVE - Alice");
        h.client(2, "game", "EVE - Alice");

        h.reconciler.scan_once().await.unwrap();
        assert_eq!(h.reconciler.tracked_count(), 1);
        assert_eq!(h.reconciler.window_for_title("eve - alice"), h.backend.find_main_window(1).unwrap());
    }

    #[tokio::test]
    async fn test_unsupported_backend_keeps_surface_without_preview() {
        let h = harness_with(DryRunBackend::new().without_live_thumbnails(), &["game"]);
        let mut events = h.reconciler.subscribe();
        h.client(1, "game", "EVE - Alice");

        h.reconciler.scan_once().await.unwrap();
        assert_eq!(Harness::drain(&mut events), vec![ThumbnailEvent::Added("EVE - Alice".into())]);
        assert_eq!(h.backend.surface_count(), 1);
        assert_eq!(h.backend.live_thumbnail_count(), 0);
    }

    #[tokio::test]
    async fn test_pause_skips_scans() {
        let h = harness(&["game"]);
        h.client(1, "game", "EVE - Alice");

        h.reconciler.set_paused(true);
        h.reconciler.scan_once().await.unwrap();
        assert_eq!(h.reconciler.tracked_count(), 0);

        h.reconciler.set_paused(false);
        h.reconciler.scan_once().await.unwrap();
        assert_eq!(h.reconciler.tracked_count(), 1);
    }

    #[tokio::test]
    async fn test_profile_change_is_reapplied() {
        let h = harness(&["game"]);
        h.client(1, "game", "EVE - Alice");
        h.reconciler.scan_once().await.unwrap();
        let surface = h.reconciler.tracked.get(&1).unwrap().surface;

        let mut config = h.profile.snapshot();
        config.thumbnails.default.x = 640;
        config.thumbnails.default.opacity = 0.5;
        h.profile.replace(config);
        h.reconciler.resync().await.unwrap();

        assert_eq!(h.backend.window(surface).unwrap().rect.left, 640);
        let token = h.reconciler.tracked.get(&1).unwrap().thumbnail.as_ref().unwrap().binding().unwrap().token;
        assert_eq!(h.backend.thumbnail(token).unwrap().opacity, 128);
        assert_eq!(h.backend.live_thumbnail_count(), 1);
    }

    #[tokio::test]
    async fn test_stop_tears_down_and_closes_subscriptions() {
        let h = harness(&["game"]);
        h.client(1, "game", "EVE - Alice");
        h.client(2, "game", "EVE - Bob");
        h.reconciler.start();
        let mut events = h.reconciler.subscribe();
        h.reconciler.scan_once().await.unwrap();

        h.reconciler.stop(Duration::from_secs(1)).await;
        h.reconciler.stop(Duration::from_secs(1)).await;

        assert_eq!(h.reconciler.tracked_count(), 0);
        assert_eq!(h.backend.live_thumbnail_count(), 0);
        assert_eq!(h.backend.surface_count(), 0);

        let mut removed = 0;
        loop {
            match events.recv().await {
                Ok(ThumbnailEvent::Removed(_)) => removed += 1,
                Ok(ThumbnailEvent::Added(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
                Err(broadcast::error::RecvError::Lagged(_)) => {}
            }
        }
        assert_eq!(removed, 2);
    }

    #[tokio::test]
    async fn test_reused_pid_replaces_stale_thumbnail() {
        let h = harness(&["game"]);
        let mut events = h.reconciler.subscribe();
        let old = h.client(42, "game", "EVE - Alice");
        h.reconciler.scan_once().await.unwrap();

        // Alice exits and the OS hands pid 42 to a new client before the next pass
        h.backend.close_window(old);
        h.table.remove(42);
        let new = h.client(42, "game", "EVE - Bob");
        h.reconciler.scan_once().await.unwrap();

        assert_eq!(
            Harness::drain(&mut events),
            vec![
                ThumbnailEvent::Added("EVE - Alice".into()),
                ThumbnailEvent::Removed("EVE - Alice".into()),
                ThumbnailEvent::Added("EVE - Bob".into()),
            ]
        );
        assert_eq!(h.reconciler.active_titles(), vec!["EVE - Bob".to_string()]);
        assert_eq!(h.reconciler.title_for_window(new).as_deref(), Some("EVE - Bob"));
        assert_eq!(h.reconciler.title_for_window(old), None);
        assert_eq!(h.backend.live_thumbnail_count(), 1);
        assert_eq!(h.backend.surface_count(), 1);
    }

    #[tokio::test]
    async fn test_reused_pid_may_keep_the_same_title() {
        let h = harness(&["game"]);
        let old = h.client(42, "game", "EVE - Alice");
        h.reconciler.scan_once().await.unwrap();

        h.backend.close_window(old);
        let new = h.backend.spawn_window(42, "EVE - Alice");
        h.reconciler.scan_once().await.unwrap();

        assert_eq!(h.reconciler.window_for_title("EVE - Alice"), Some(new));
        assert_eq!(h.backend.live_thumbnail_count(), 1);
    }

    #[tokio::test]
    async fn test_stop_removes_create_still_queued_on_ui_thread() {
        let h = harness(&["game"]);
        let window = h.client(7, "game", "EVE - Alice");
        let ui = h.reconciler.ui.clone();

        // Keep the UI thread busy so the create below is still queued when stop runs
        ui.post(|_| std::thread::sleep(Duration::from_millis(100))).unwrap();
        let tracked = h.reconciler.tracked.clone();
        let observation = Observation {
            entry: ProcessEntry {
                pid: 7,
                name: "game".into(),
            },
            window,
            title: "EVE - Alice".into(),
        };
        let config = h.profile.snapshot().thumbnails.default;
        ui.post(move |backend| {
            create_tracked(backend, &tracked, observation, config, None);
        })
        .unwrap();

        h.reconciler.stop(Duration::from_secs(2)).await;

        assert_eq!(h.reconciler.tracked_count(), 0);
        assert_eq!(h.backend.live_thumbnail_count(), 0);
        assert_eq!(h.backend.surface_count(), 0);
    }

    #[tokio::test]
    async fn test_title_lookup_by_window() {
        let h = harness(&["game"]);
        let window = h.client(1, "game", "EVE - Alice");
        h.reconciler.scan_once().await.unwrap();

        assert_eq!(h.reconciler.title_for_window(window).as_deref(), Some("EVE - Alice"));
        assert!(is_identified_title("EVE - Alice"));
        assert!(!is_identified_title(" EVE "));
    }
}
