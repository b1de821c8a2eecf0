use crate::error::{GlanceError, Result};
use crate::glance_error;
use image::RgbaImage;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use tracing::info;

use super::process::{matches_process_name, normalize_process_name, ProcessEntry, ProcessTable};
use super::r#trait::{
    AnimationStyle, BackendKind, PlatformBackend, Rect, SurfaceSpec, ThumbnailBinding, ThumbnailToken,
    WindowHandle,
};

const KIND: BackendKind = BackendKind::DryRun;

/// Side effects recorded by `DryRunBackend`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Activate(WindowHandle),
    Restore(WindowHandle),
    Move(WindowHandle, Rect),
    Maximize(WindowHandle),
    RegisterThumbnail { destination: WindowHandle, source: WindowHandle },
    UpdateThumbnail(ThumbnailBinding),
    UnregisterThumbnail(ThumbnailToken),
    CreateSurface(String),
    DestroySurface(WindowHandle),
}

#[derive(Debug, Clone)]
pub struct FakeWindow {
    pub title: String,
    pub pid: Option<u32>,
    pub rect: Rect,
    pub minimized: bool,
    pub maximized: bool,
    pub surface: bool,
}

#[derive(Default)]
struct DryRunState {
    next_handle: u64,
    next_token: u64,
    windows: HashMap<u64, FakeWindow>,
    foreground: Option<u64>,
    thumbnails: HashMap<ThumbnailToken, ThumbnailBinding>,
    denied_pids: HashSet<u32>,
    calls: Vec<BackendCall>,
}

/// In-memory backend: `--dry-run` mode and the test double for everything above `platform`.
pub struct DryRunBackend {
    live_thumbnails: bool,
    state: Mutex<DryRunState>,
}

impl Default for DryRunBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DryRunBackend {
    pub fn new() -> Self {
        info!("Dry-run backend: no real windows will be touched");
        Self {
            live_thumbnails: true,
            state: Mutex::new(DryRunState {
                next_handle: 0x100,
                next_token: 1,
                ..Default::default()
            }),
        }
    }

    /// Behave like X11/Wayland: live mirroring reports `Unsupported`.
    pub fn without_live_thumbnails(mut self) -> Self {
        self.live_thumbnails = false;
        self
    }

    pub fn spawn_window(&self, pid: u32, title: &str) -> WindowHandle {
        let mut state = self.state.lock();
        let raw = state.next_handle;
        state.next_handle += 1;
        state.windows.insert(
            raw,
            FakeWindow {
                title: title.to_string(),
                pid: Some(pid),
                rect: Rect::from_origin_size(0, 0, 1280, 720),
                minimized: false,
                maximized: false,
                surface: false,
            },
        );
        WindowHandle::new(KIND, raw)
    }

    pub fn close_window(&self, handle: WindowHandle) {
        let mut state = self.state.lock();
        state.windows.remove(&handle.raw());
        if state.foreground == Some(handle.raw()) {
            state.foreground = None;
        }
    }

    pub fn set_title(&self, handle: WindowHandle, title: &str) {
        if let Some(window) = self.state.lock().windows.get_mut(&handle.raw()) {
            window.title = title.to_string();
        }
    }

    pub fn set_foreground(&self, handle: Option<WindowHandle>) {
        self.state.lock().foreground = handle.map(|h| h.raw());
    }

    pub fn set_minimized(&self, handle: WindowHandle, minimized: bool) {
        if let Some(window) = self.state.lock().windows.get_mut(&handle.raw()) {
            window.minimized = minimized;
        }
    }

    /// Make `find_main_window(pid)` fail as if access were denied.
    pub fn deny_access(&self, pid: u32) {
        self.state.lock().denied_pids.insert(pid);
    }

    pub fn window(&self, handle: WindowHandle) -> Option<FakeWindow> {
        self.state.lock().windows.get(&handle.raw()).cloned()
    }

    pub fn surface_count(&self) -> usize {
        self.state.lock().windows.values().filter(|w| w.surface).count()
    }

    pub fn live_thumbnail_count(&self) -> usize {
        self.state.lock().thumbnails.len()
    }

    pub fn thumbnail(&self, token: ThumbnailToken) -> Option<ThumbnailBinding> {
        self.state.lock().thumbnails.get(&token).cloned()
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    fn with_window<T>(&self, handle: WindowHandle, f: impl FnOnce(&mut FakeWindow) -> T) -> Result<T> {
        let mut state = self.state.lock();
        state
            .windows
            .get_mut(&handle.raw())
            .map(f)
            .ok_or(GlanceError::WindowGone(handle))
    }
}

impl PlatformBackend for DryRunBackend {
    fn kind(&self) -> BackendKind {
        KIND
    }

    fn is_composition_enabled(&self) -> bool {
        self.live_thumbnails
    }

    fn foreground_window(&self) -> Result<Option<WindowHandle>> {
        Ok(self.state.lock().foreground.map(|raw| WindowHandle::new(KIND, raw)))
    }

    fn activate_window(&self, handle: WindowHandle, _style: AnimationStyle) -> Result<()> {
        let mut state = self.state.lock();
        let is_foreground = state.foreground == Some(handle.raw());
        let window = state
            .windows
            .get_mut(&handle.raw())
            .ok_or(GlanceError::WindowGone(handle))?;

        if is_foreground && !window.minimized {
            return Ok(());
        }

        let restored = std::mem::replace(&mut window.minimized, false);
        if restored {
            state.calls.push(BackendCall::Restore(handle));
        }
        state.foreground = Some(handle.raw());
        state.calls.push(BackendCall::Activate(handle));
        Ok(())
    }

    fn move_window(&self, handle: WindowHandle, left: i32, top: i32, width: u32, height: u32) -> Result<()> {
        let rect = Rect::from_origin_size(left, top, width, height);
        self.with_window(handle, |w| w.rect = rect)?;
        self.state.lock().calls.push(BackendCall::Move(handle, rect));
        Ok(())
    }

    fn maximize_window(&self, handle: WindowHandle) -> Result<()> {
        self.with_window(handle, |w| {
            w.maximized = true;
            w.minimized = false;
        })?;
        self.state.lock().calls.push(BackendCall::Maximize(handle));
        Ok(())
    }

    fn window_position(&self, handle: WindowHandle) -> Result<Rect> {
        self.with_window(handle, |w| w.rect)
    }

    fn is_window_maximized(&self, handle: WindowHandle) -> Result<bool> {
        self.with_window(handle, |w| w.maximized)
    }

    fn is_window_minimized(&self, handle: WindowHandle) -> Result<bool> {
        self.with_window(handle, |w| w.minimized)
    }

    fn is_window_valid(&self, handle: WindowHandle) -> bool {
        handle.kind() == KIND && self.state.lock().windows.contains_key(&handle.raw())
    }

    fn window_title(&self, handle: WindowHandle) -> Result<String> {
        self.with_window(handle, |w| w.title.clone())
    }

    fn find_main_window(&self, pid: u32) -> Result<Option<WindowHandle>> {
        let state = self.state.lock();
        if state.denied_pids.contains(&pid) {
            return Err(GlanceError::Enumeration {
                pid,
                reason: "access denied".to_string(),
            });
        }

        Ok(state
            .windows
            .iter()
            .filter(|(_, w)| !w.surface && w.pid == Some(pid))
            .map(|(raw, _)| *raw)
            .min()
            .map(|raw| WindowHandle::new(KIND, raw)))
    }

    fn register_live_thumbnail(&self, destination: WindowHandle, source: WindowHandle) -> Result<ThumbnailBinding> {
        if !self.live_thumbnails {
            return GlanceError::unsupported(KIND.name(), "live thumbnail");
        }

        let mut state = self.state.lock();
        for handle in [destination, source] {
            if !state.windows.contains_key(&handle.raw()) {
                return Err(GlanceError::WindowGone(handle));
            }
        }

        let token = ThumbnailToken(state.next_token);
        state.next_token += 1;
        let binding = ThumbnailBinding::new(destination, source, token);
        state.thumbnails.insert(token, binding.clone());
        state.calls.push(BackendCall::RegisterThumbnail { destination, source });
        Ok(binding)
    }

    fn update_live_thumbnail(&self, binding: &ThumbnailBinding) -> Result<()> {
        let mut state = self.state.lock();
        if !state.windows.contains_key(&binding.source.raw()) {
            return Err(GlanceError::WindowGone(binding.source));
        }
        match state.thumbnails.get_mut(&binding.token) {
            Some(stored) => *stored = binding.clone(),
            None => return Err(glance_error!(native, "unknown thumbnail token {:?}", binding.token)),
        }
        state.calls.push(BackendCall::UpdateThumbnail(binding.clone()));
        Ok(())
    }

    fn unregister_live_thumbnail(&self, binding: &ThumbnailBinding) -> Result<()> {
        let mut state = self.state.lock();
        if state.thumbnails.remove(&binding.token).is_none() {
            return Err(glance_error!(native, "unknown thumbnail token {:?}", binding.token));
        }
        state.calls.push(BackendCall::UnregisterThumbnail(binding.token));
        Ok(())
    }

    fn capture_static_thumbnail(&self, source: WindowHandle) -> Option<RgbaImage> {
        let rect = self.window_position(source).ok()?;
        Some(RgbaImage::new(rect.width().max(1), rect.height().max(1)))
    }

    fn create_surface(&self, spec: &SurfaceSpec) -> Result<WindowHandle> {
        let mut state = self.state.lock();
        let raw = state.next_handle;
        state.next_handle += 1;
        state.windows.insert(
            raw,
            FakeWindow {
                title: spec.title.clone(),
                pid: None,
                rect: Rect::from_origin_size(spec.x, spec.y, spec.width, spec.height),
                minimized: false,
                maximized: false,
                surface: true,
            },
        );
        state.calls.push(BackendCall::CreateSurface(spec.title.clone()));
        Ok(WindowHandle::new(KIND, raw))
    }

    fn destroy_surface(&self, handle: WindowHandle) -> Result<()> {
        let mut state = self.state.lock();
        match state.windows.get(&handle.raw()) {
            Some(w) if w.surface => {
                state.windows.remove(&handle.raw());
                state.calls.push(BackendCall::DestroySurface(handle));
                Ok(())
            }
            _ => Err(GlanceError::WindowGone(handle)),
        }
    }
}

/// In-memory process table paired with `DryRunBackend`.
pub struct DryRunProcessTable {
    processes: Mutex<Vec<ProcessEntry>>,
    exited: Mutex<HashSet<u32>>,
}

impl Default for DryRunProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl DryRunProcessTable {
    pub fn new() -> Self {
        Self {
            processes: Mutex::new(Vec::new()),
            exited: Mutex::new(HashSet::new()),
        }
    }

    pub fn add(&self, pid: u32, name: &str) {
        self.processes.lock().push(ProcessEntry {
            pid,
            name: name.to_string(),
        });
    }

    /// Drop the process from the table entirely.
    pub fn remove(&self, pid: u32) {
        self.processes.lock().retain(|p| p.pid != pid);
        self.exited.lock().remove(&pid);
    }

    /// Keep the entry enumerable but report it as exited (zombie).
    pub fn mark_exited(&self, pid: u32) {
        self.exited.lock().insert(pid);
    }
}

impl ProcessTable for DryRunProcessTable {
    fn find_by_name(&self, pattern: &str) -> Result<Vec<ProcessEntry>> {
        Ok(self
            .processes
            .lock()
            .iter()
            .filter(|p| matches_process_name(&p.name, pattern))
            .cloned()
            .collect())
    }

    fn has_exited(&self, pid: u32) -> Result<bool> {
        let known = self.processes.lock().iter().any(|p| p.pid == pid);
        Ok(!known || self.exited.lock().contains(&pid))
    }
}

/// Populate a dry-run session with one fake client per watched process name.
pub fn seed_clients(backend: &DryRunBackend, table: &DryRunProcessTable, process_names: &[String]) {
    let names = ["Alpha", "Bravo", "Charlie"];
    let mut pid = 4000;
    for process in process_names {
        // Titles must stay unique across processes or only the first set is tracked
        let suffix = normalize_process_name(process);
        for name in names {
            pid += 1;
            table.add(pid, process);
            backend.spawn_window(pid, &format!("EVE - {} ({})", name, suffix));
        }
    }
    info!("Dry-run: seeded {} fake clients", pid - 4000);
}
