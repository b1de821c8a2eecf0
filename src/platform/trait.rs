use crate::error::Result;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which implementation is behind a `PlatformBackend`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    Windows,
    X11,
    Wayland,
    DryRun,
}

impl BackendKind {
    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::Windows => "windows",
            BackendKind::X11 => "x11",
            BackendKind::Wayland => "wayland",
            BackendKind::DryRun => "dry-run",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Opaque, platform-tagged window identifier.
///
/// HWND value on Windows, XID on X11, an internal id for Wayland and dry-run.
/// Holding one owns nothing; the window may be gone by the time it is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle {
    kind: BackendKind,
    raw: u64,
}

impl WindowHandle {
    pub const fn new(kind: BackendKind, raw: u64) -> Self {
        Self { kind, raw }
    }

    pub const fn null(kind: BackendKind) -> Self {
        Self { kind, raw: 0 }
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    /// Raw value for the owning backend. Nothing outside `platform` should need this.
    pub fn raw(&self) -> u64 {
        self.raw
    }

    pub fn is_null(&self) -> bool {
        self.raw == 0
    }
}

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:#x}", self.kind, self.raw)
    }
}

/// Screen rectangle in (left, top, right, bottom) form.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self { left, top, right, bottom }
    }

    pub fn from_origin_size(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            left: x,
            top: y,
            right: x.saturating_add(width as i32),
            bottom: y.saturating_add(height as i32),
        }
    }

    pub fn width(&self) -> u32 {
        (self.right - self.left).max(0) as u32
    }

    pub fn height(&self) -> u32 {
        (self.bottom - self.top).max(0) as u32
    }
}

/// Backend-issued compositor registration token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThumbnailToken(pub u64);

/// A live source → destination mirror as known to the compositor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbnailBinding {
    pub source: WindowHandle,
    pub destination: WindowHandle,
    pub destination_rect: Rect,
    pub opacity: u8,
    pub visible: bool,
    pub source_client_area_only: bool,
    pub token: ThumbnailToken,
}

impl ThumbnailBinding {
    /// Binding as it exists right after registration: nothing shown yet.
    pub fn new(destination: WindowHandle, source: WindowHandle, token: ThumbnailToken) -> Self {
        Self {
            source,
            destination,
            destination_rect: Rect::default(),
            opacity: u8::MAX,
            visible: false,
            source_client_area_only: true,
            token,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnimationStyle {
    #[default]
    Animated,
    /// Skip the restore/raise animation where the OS allows it.
    Instant,
}

/// Geometry and caption for a destination surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceSpec {
    pub title: String,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Per-OS window and compositor primitives.
///
/// Every method that touches a window must be called from the UI thread
/// (see `services::ui_thread`). Query methods are safe anywhere.
pub trait PlatformBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn is_composition_enabled(&self) -> bool;

    fn foreground_window(&self) -> Result<Option<WindowHandle>>;

    /// Raise, focus and, if minimized, restore. No-op for the current foreground window.
    fn activate_window(&self, handle: WindowHandle, style: AnimationStyle) -> Result<()>;

    fn move_window(&self, handle: WindowHandle, left: i32, top: i32, width: u32, height: u32) -> Result<()>;

    fn maximize_window(&self, handle: WindowHandle) -> Result<()>;

    fn window_position(&self, handle: WindowHandle) -> Result<Rect>;

    fn is_window_maximized(&self, handle: WindowHandle) -> Result<bool>;

    fn is_window_minimized(&self, handle: WindowHandle) -> Result<bool>;

    fn is_window_valid(&self, handle: WindowHandle) -> bool;

    fn window_title(&self, handle: WindowHandle) -> Result<String>;

    /// Main top-level window of a process, `None` if it has none (yet).
    fn find_main_window(&self, pid: u32) -> Result<Option<WindowHandle>>;

    /// Fails with `GlanceError::Unsupported` when live mirroring is impossible.
    fn register_live_thumbnail(&self, destination: WindowHandle, source: WindowHandle) -> Result<ThumbnailBinding>;

    /// Push the full property set of `binding` in a single call.
    fn update_live_thumbnail(&self, binding: &ThumbnailBinding) -> Result<()>;

    fn unregister_live_thumbnail(&self, binding: &ThumbnailBinding) -> Result<()>;

    /// Best-effort single frame. Never errors.
    fn capture_static_thumbnail(&self, source: WindowHandle) -> Option<RgbaImage>;

    fn create_surface(&self, spec: &SurfaceSpec) -> Result<WindowHandle>;

    fn destroy_surface(&self, handle: WindowHandle) -> Result<()>;

    /// Drain pending native messages. Called by the UI thread between jobs.
    fn pump_events(&self) {}
}
