use crate::error::{GlanceError, Result};
use crate::glance_error;
use image::RgbaImage;
use tracing::{debug, info};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{
    AtomEnum, ClientMessageEvent, ConfigureWindowAux, ConnectionExt as _, CreateWindowAux, EventMask,
    ImageFormat, InputFocus, PropMode, Window, WindowClass,
};
use x11rb::rust_connection::RustConnection;
use x11rb::wrapper::ConnectionExt as _;
use x11rb::{COPY_DEPTH_FROM_PARENT, COPY_FROM_PARENT, CURRENT_TIME};

use super::r#trait::{
    AnimationStyle, BackendKind, PlatformBackend, Rect, SurfaceSpec, ThumbnailBinding, WindowHandle,
};

const KIND: BackendKind = BackendKind::X11;

// _NET_WM_STATE actions
const NET_WM_STATE_ADD: u32 = 1;
// _NET_ACTIVE_WINDOW source indication: pager
const SOURCE_PAGER: u32 = 2;
// ICCCM WM_STATE values
const ICONIC_STATE: u32 = 3;

x11rb::atom_manager! {
    pub Atoms: AtomsCookie {
        _NET_ACTIVE_WINDOW,
        _NET_CLIENT_LIST,
        _NET_WM_PID,
        _NET_WM_NAME,
        _NET_WM_STATE,
        _NET_WM_STATE_HIDDEN,
        _NET_WM_STATE_MAXIMIZED_VERT,
        _NET_WM_STATE_MAXIMIZED_HORZ,
        UTF8_STRING,
        WM_STATE,
    }
}

/// EWMH-driven backend over an x11rb connection.
///
/// There is no live mirroring primitive without a compositor-specific
/// protocol, so live thumbnails report `Unsupported`; static captures use
/// `GetImage`.
pub struct X11Backend {
    conn: RustConnection,
    root: Window,
    black_pixel: u32,
    atoms: Atoms,
}

impl X11Backend {
    pub fn connect() -> Result<Self> {
        let (conn, screen_num) = x11rb::connect(None)?;
        let screen = &conn.setup().roots[screen_num];
        let root = screen.root;
        let black_pixel = screen.black_pixel;
        let atoms = Atoms::new(&conn)
            .map_err(|e| glance_error!(init, "X11 atoms: {}", e))?
            .reply()
            .map_err(|e| glance_error!(init, "X11 atoms: {}", e))?;

        info!("Connected to X11 display, screen {}, root {:#x}", screen_num, root);

        Ok(Self {
            conn,
            root,
            black_pixel,
            atoms,
        })
    }

    fn window(handle: WindowHandle) -> Result<Window> {
        if handle.kind() != KIND || handle.is_null() {
            return Err(GlanceError::WindowGone(handle));
        }
        Ok(handle.raw() as Window)
    }

    fn handle(window: Window) -> WindowHandle {
        WindowHandle::new(KIND, window as u64)
    }

    fn property32(&self, window: Window, property: u32, kind: impl Into<u32>) -> Result<Vec<u32>> {
        let reply = self
            .conn
            .get_property(false, window, property, kind, 0, u32::MAX)?
            .reply()?;
        Ok(reply.value32().map(|v| v.collect()).unwrap_or_default())
    }

    fn net_wm_state(&self, window: Window) -> Result<Vec<u32>> {
        self.property32(window, self.atoms._NET_WM_STATE, AtomEnum::ATOM)
    }

    fn send_root_message(&self, window: Window, message_type: u32, data: [u32; 5]) -> Result<()> {
        let event = ClientMessageEvent::new(32, window, message_type, data);
        self.conn.send_event(
            false,
            self.root,
            EventMask::SUBSTRUCTURE_REDIRECT | EventMask::SUBSTRUCTURE_NOTIFY,
            event,
        )?;
        Ok(())
    }

    fn ensure_exists(&self, handle: WindowHandle) -> Result<Window> {
        let window = Self::window(handle)?;
        match self.conn.get_window_attributes(window)?.reply() {
            Ok(_) => Ok(window),
            Err(_) => Err(GlanceError::WindowGone(handle)),
        }
    }
}

impl PlatformBackend for X11Backend {
    fn kind(&self) -> BackendKind {
        KIND
    }

    fn is_composition_enabled(&self) -> bool {
        true
    }

    fn foreground_window(&self) -> Result<Option<WindowHandle>> {
        let active = self.property32(self.root, self.atoms._NET_ACTIVE_WINDOW, AtomEnum::WINDOW)?;
        Ok(active.first().copied().filter(|w| *w != 0).map(Self::handle))
    }

    fn activate_window(&self, handle: WindowHandle, _style: AnimationStyle) -> Result<()> {
        let window = self.ensure_exists(handle)?;
        let minimized = self.is_window_minimized(handle)?;

        if !minimized && self.foreground_window()? == Some(handle) {
            return Ok(());
        }

        if minimized {
            debug!("Restoring minimized window {}", handle);
            self.conn.map_window(window)?;
        }

        self.send_root_message(window, self.atoms._NET_ACTIVE_WINDOW, [SOURCE_PAGER, CURRENT_TIME, 0, 0, 0])?;
        self.conn.set_input_focus(InputFocus::PARENT, window, CURRENT_TIME)?;
        self.conn.flush()?;
        Ok(())
    }

    fn move_window(&self, handle: WindowHandle, left: i32, top: i32, width: u32, height: u32) -> Result<()> {
        let window = Self::window(handle)?;
        let aux = ConfigureWindowAux::new().x(left).y(top).width(width).height(height);
        self.conn.configure_window(window, &aux)?;
        self.conn.flush()?;
        Ok(())
    }

    fn maximize_window(&self, handle: WindowHandle) -> Result<()> {
        let window = Self::window(handle)?;
        self.send_root_message(
            window,
            self.atoms._NET_WM_STATE,
            [
                NET_WM_STATE_ADD,
                self.atoms._NET_WM_STATE_MAXIMIZED_VERT,
                self.atoms._NET_WM_STATE_MAXIMIZED_HORZ,
                SOURCE_PAGER,
                0,
            ],
        )?;
        self.conn.flush()?;
        Ok(())
    }

    fn window_position(&self, handle: WindowHandle) -> Result<Rect> {
        let window = Self::window(handle)?;
        let geometry = self
            .conn
            .get_geometry(window)?
            .reply()
            .map_err(|_| GlanceError::WindowGone(handle))?;
        let origin = self.conn.translate_coordinates(window, self.root, 0, 0)?.reply()?;
        Ok(Rect::from_origin_size(
            origin.dst_x as i32,
            origin.dst_y as i32,
            geometry.width as u32,
            geometry.height as u32,
        ))
    }

    fn is_window_maximized(&self, handle: WindowHandle) -> Result<bool> {
        let state = self.net_wm_state(Self::window(handle)?)?;
        Ok(state.contains(&self.atoms._NET_WM_STATE_MAXIMIZED_VERT)
            && state.contains(&self.atoms._NET_WM_STATE_MAXIMIZED_HORZ))
    }

    fn is_window_minimized(&self, handle: WindowHandle) -> Result<bool> {
        let window = Self::window(handle)?;
        if self.net_wm_state(window)?.contains(&self.atoms._NET_WM_STATE_HIDDEN) {
            return Ok(true);
        }
        let wm_state = self.property32(window, self.atoms.WM_STATE, self.atoms.WM_STATE)?;
        Ok(wm_state.first() == Some(&ICONIC_STATE))
    }

    fn is_window_valid(&self, handle: WindowHandle) -> bool {
        self.ensure_exists(handle).is_ok()
    }

    fn window_title(&self, handle: WindowHandle) -> Result<String> {
        let window = Self::window(handle)?;
        let reply = self
            .conn
            .get_property(false, window, self.atoms._NET_WM_NAME, self.atoms.UTF8_STRING, 0, 1024)?
            .reply()
            .map_err(|_| GlanceError::WindowGone(handle))?;
        if !reply.value.is_empty() {
            return Ok(String::from_utf8_lossy(&reply.value).into_owned());
        }

        let reply = self
            .conn
            .get_property(false, window, AtomEnum::WM_NAME, AtomEnum::STRING, 0, 1024)?
            .reply()?;
        Ok(String::from_utf8_lossy(&reply.value).into_owned())
    }

    fn find_main_window(&self, pid: u32) -> Result<Option<WindowHandle>> {
        let clients = self.property32(self.root, self.atoms._NET_CLIENT_LIST, AtomEnum::WINDOW)?;
        for window in clients {
            // Clients can vanish between the list read and the pid read.
            let Ok(owner) = self.property32(window, self.atoms._NET_WM_PID, AtomEnum::CARDINAL) else {
                continue;
            };
            if owner.first() == Some(&pid) {
                return Ok(Some(Self::handle(window)));
            }
        }
        Ok(None)
    }

    fn register_live_thumbnail(&self, _destination: WindowHandle, _source: WindowHandle) -> Result<ThumbnailBinding> {
        GlanceError::unsupported(KIND.name(), "live thumbnail")
    }

    fn update_live_thumbnail(&self, _binding: &ThumbnailBinding) -> Result<()> {
        GlanceError::unsupported(KIND.name(), "live thumbnail")
    }

    fn unregister_live_thumbnail(&self, _binding: &ThumbnailBinding) -> Result<()> {
        GlanceError::unsupported(KIND.name(), "live thumbnail")
    }

    fn capture_static_thumbnail(&self, source: WindowHandle) -> Option<RgbaImage> {
        let window = Self::window(source).ok()?;
        let geometry = self.conn.get_geometry(window).ok()?.reply().ok()?;
        let (width, height) = (geometry.width, geometry.height);
        if width == 0 || height == 0 {
            return None;
        }

        let reply = self
            .conn
            .get_image(ImageFormat::Z_PIXMAP, window, 0, 0, width, height, !0)
            .ok()?
            .reply()
            .ok()?;
        if reply.depth != 24 && reply.depth != 32 {
            debug!("Unsupported capture depth {} for {}", reply.depth, source);
            return None;
        }

        let pixels = width as usize * height as usize;
        let bytes_per_pixel = reply.data.len() / pixels;
        if bytes_per_pixel < 3 {
            return None;
        }

        let mut image = RgbaImage::new(width as u32, height as u32);
        for (i, pixel) in image.pixels_mut().enumerate() {
            let offset = i * bytes_per_pixel;
            // Z_PIXMAP on little-endian servers is BGR(X)
            let (b, g, r) = (reply.data[offset], reply.data[offset + 1], reply.data[offset + 2]);
            *pixel = image::Rgba([r, g, b, 255]);
        }
        Some(image)
    }

    fn create_surface(&self, spec: &SurfaceSpec) -> Result<WindowHandle> {
        let window = self.conn.generate_id()?;
        let aux = CreateWindowAux::new()
            .override_redirect(1)
            .background_pixel(self.black_pixel)
            .event_mask(EventMask::EXPOSURE | EventMask::BUTTON_PRESS);

        self.conn.create_window(
            COPY_DEPTH_FROM_PARENT,
            window,
            self.root,
            spec.x as i16,
            spec.y as i16,
            spec.width.max(1) as u16,
            spec.height.max(1) as u16,
            0,
            WindowClass::INPUT_OUTPUT,
            COPY_FROM_PARENT,
            &aux,
        )?;
        self.conn.change_property8(
            PropMode::REPLACE,
            window,
            self.atoms._NET_WM_NAME,
            self.atoms.UTF8_STRING,
            spec.title.as_bytes(),
        )?;
        self.conn.map_window(window)?;
        self.conn.flush()?;

        debug!("Created X11 surface {:#x} for '{}'", window, spec.title);
        Ok(Self::handle(window))
    }

    fn destroy_surface(&self, handle: WindowHandle) -> Result<()> {
        let window = Self::window(handle)?;
        self.conn.destroy_window(window)?;
        self.conn.flush()?;
        Ok(())
    }
}
