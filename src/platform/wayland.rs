use crate::error::{GlanceError, Result};
use crate::glance_error;
use image::RgbaImage;
use tracing::{debug, info};
use wayland_client::globals::{registry_queue_init, GlobalListContents};
use wayland_client::protocol::wl_registry;
use wayland_client::{Connection, Dispatch, QueueHandle};

use super::r#trait::{
    AnimationStyle, BackendKind, PlatformBackend, Rect, SurfaceSpec, ThumbnailBinding, WindowHandle,
};

const KIND: BackendKind = BackendKind::Wayland;

/// Registry state for the one-off global listing at connect time.
struct RegistryProbe;

impl Dispatch<wl_registry::WlRegistry, GlobalListContents> for RegistryProbe {
    fn event(
        _state: &mut Self,
        _proxy: &wl_registry::WlRegistry,
        _event: wl_registry::Event,
        _data: &GlobalListContents,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
    }
}

/// Wayland session backend.
///
/// Core Wayland gives clients no access to other clients' windows: no
/// foreground query, no activation, no mirroring. The connection is still
/// opened so that a broken session is detected at startup and the selector
/// can fall back to X11 (XWayland).
pub struct WaylandBackend {
    _conn: Connection,
    globals: Vec<String>,
}

impl WaylandBackend {
    pub fn connect() -> Result<Self> {
        let conn = Connection::connect_to_env()
            .map_err(|e| glance_error!(init, "Wayland connect: {}", e))?;

        let (globals, _queue) = registry_queue_init::<RegistryProbe>(&conn)
            .map_err(|e| glance_error!(init, "Wayland registry: {}", e))?;

        let globals: Vec<String> = globals
            .contents()
            .with_list(|list| list.iter().map(|g| g.interface.clone()).collect());

        info!("Connected to Wayland compositor ({} globals)", globals.len());
        debug!("Wayland globals: {:?}", globals);

        let backend = Self { _conn: conn, globals };
        if backend.has_global("zwlr_foreign_toplevel_manager_v1") {
            debug!("Compositor advertises wlr foreign-toplevel management");
        }
        Ok(backend)
    }

    /// Whether the compositor advertises `interface`.
    pub fn has_global(&self, interface: &str) -> bool {
        self.globals.iter().any(|g| g == interface)
    }

    fn unsupported<T>(operation: &'static str) -> Result<T> {
        GlanceError::unsupported(KIND.name(), operation)
    }
}

impl PlatformBackend for WaylandBackend {
    fn kind(&self) -> BackendKind {
        KIND
    }

    fn is_composition_enabled(&self) -> bool {
        true
    }

    fn foreground_window(&self) -> Result<Option<WindowHandle>> {
        Ok(None)
    }

    fn activate_window(&self, _handle: WindowHandle, _style: AnimationStyle) -> Result<()> {
        Self::unsupported("activate window")
    }

    fn move_window(&self, _handle: WindowHandle, _left: i32, _top: i32, _width: u32, _height: u32) -> Result<()> {
        Self::unsupported("move window")
    }

    fn maximize_window(&self, _handle: WindowHandle) -> Result<()> {
        Self::unsupported("maximize window")
    }

    fn window_position(&self, _handle: WindowHandle) -> Result<Rect> {
        Self::unsupported("window position")
    }

    fn is_window_maximized(&self, _handle: WindowHandle) -> Result<bool> {
        Self::unsupported("window state")
    }

    fn is_window_minimized(&self, _handle: WindowHandle) -> Result<bool> {
        Self::unsupported("window state")
    }

    fn is_window_valid(&self, _handle: WindowHandle) -> bool {
        false
    }

    fn window_title(&self, _handle: WindowHandle) -> Result<String> {
        Self::unsupported("window title")
    }

    fn find_main_window(&self, _pid: u32) -> Result<Option<WindowHandle>> {
        Self::unsupported("window lookup")
    }

    fn register_live_thumbnail(&self, _destination: WindowHandle, _source: WindowHandle) -> Result<ThumbnailBinding> {
        Self::unsupported("live thumbnail")
    }

    fn update_live_thumbnail(&self, _binding: &ThumbnailBinding) -> Result<()> {
        Self::unsupported("live thumbnail")
    }

    fn unregister_live_thumbnail(&self, _binding: &ThumbnailBinding) -> Result<()> {
        Self::unsupported("live thumbnail")
    }

    fn capture_static_thumbnail(&self, _source: WindowHandle) -> Option<RgbaImage> {
        None
    }

    fn create_surface(&self, _spec: &SurfaceSpec) -> Result<WindowHandle> {
        Self::unsupported("thumbnail surface")
    }

    fn destroy_surface(&self, _handle: WindowHandle) -> Result<()> {
        Self::unsupported("thumbnail surface")
    }
}
