use crate::error::{GlanceError, Result};
use image::RgbaImage;
use once_cell::sync::OnceCell;
use std::ffi::c_void;
use tracing::{debug, info, trace};
use windows::core::{w, PCWSTR};
use windows::Win32::Foundation::{BOOL, FALSE, HWND, LPARAM, LRESULT, RECT, TRUE, WPARAM};
use windows::Win32::Graphics::Dwm::{
    DwmIsCompositionEnabled, DwmRegisterThumbnail, DwmSetWindowAttribute, DwmUnregisterThumbnail,
    DwmUpdateThumbnailProperties, DWMWA_TRANSITIONS_FORCEDISABLED, DWM_THUMBNAIL_PROPERTIES,
};
use windows::Win32::Graphics::Gdi::{
    CreateCompatibleBitmap, CreateCompatibleDC, DeleteDC, DeleteObject, GetDC, GetDIBits, ReleaseDC,
    SelectObject, BITMAPINFO, BITMAPINFOHEADER, BI_RGB, DIB_RGB_COLORS,
};
use windows::Win32::Storage::Xps::{PrintWindow, PRINT_WINDOW_FLAGS};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::System::Threading::{AttachThreadInput, GetCurrentThreadId};
use windows::Win32::UI::Input::KeyboardAndMouse::SetFocus;
use windows::Win32::UI::WindowsAndMessaging::{
    BringWindowToTop, CreateWindowExW, DefWindowProcW, DestroyWindow, DispatchMessageW, EnumWindows,
    GetForegroundWindow, GetWindow, GetWindowRect, GetWindowTextW, GetWindowThreadProcessId, IsIconic,
    IsWindow, IsWindowVisible, IsZoomed, MoveWindow, PeekMessageW, RegisterClassW, SetForegroundWindow,
    ShowWindow, TranslateMessage, GW_OWNER, MSG, PM_REMOVE, SW_MAXIMIZE, SW_RESTORE, SW_SHOWNOACTIVATE,
    WNDCLASSW, WS_EX_TOOLWINDOW, WS_EX_TOPMOST, WS_POPUP,
};

use super::r#trait::{
    AnimationStyle, BackendKind, PlatformBackend, Rect, SurfaceSpec, ThumbnailBinding, ThumbnailToken,
    WindowHandle,
};

const KIND: BackendKind = BackendKind::Windows;

// DWM_THUMBNAIL_PROPERTIES.dwFlags
const DWM_TNP_RECTDESTINATION: u32 = 0x1;
const DWM_TNP_OPACITY: u32 = 0x4;
const DWM_TNP_VISIBLE: u32 = 0x8;
const DWM_TNP_SOURCECLIENTAREAONLY: u32 = 0x10;

// PrintWindow: render DirectComposition content too
const PW_RENDERFULLCONTENT: u32 = 0x2;

const SURFACE_CLASS: PCWSTR = w!("EveGlanceThumbnail");

static SURFACE_CLASS_ATOM: OnceCell<u16> = OnceCell::new();

fn hwnd(handle: WindowHandle) -> Result<HWND> {
    if handle.kind() != KIND || handle.is_null() {
        return Err(GlanceError::WindowGone(handle));
    }
    Ok(HWND(handle.raw() as *mut c_void))
}

fn handle(hwnd: HWND) -> WindowHandle {
    WindowHandle::new(KIND, hwnd.0 as u64)
}

unsafe extern "system" fn surface_window_proc(hwnd: HWND, msg: u32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    DefWindowProcW(hwnd, msg, wparam, lparam)
}

struct MainWindowSearch {
    pid: u32,
    found: Option<HWND>,
}

unsafe extern "system" fn find_main_window_callback(hwnd: HWND, lparam: LPARAM) -> BOOL {
    let search = &mut *(lparam.0 as *mut MainWindowSearch);

    let mut owner_pid = 0u32;
    GetWindowThreadProcessId(hwnd, Some(&mut owner_pid));
    if owner_pid != search.pid || !IsWindowVisible(hwnd).as_bool() {
        return TRUE;
    }

    // Owned windows are dialogs and tool palettes, not the main window.
    if let Ok(owner) = GetWindow(hwnd, GW_OWNER) {
        if !owner.is_invalid() {
            return TRUE;
        }
    }

    search.found = Some(hwnd);
    FALSE
}

/// DWM compositor backend.
///
/// All window-mutating calls assume they run on the UI thread, which is also
/// the thread that created every thumbnail surface.
pub struct WindowsBackend;

impl WindowsBackend {
    pub fn connect() -> Result<Self> {
        let backend = Self;
        if !backend.is_composition_enabled() {
            // Always on since Windows 8; only reachable on very old hosts.
            return Err(GlanceError::Initialization("DWM composition is disabled".to_string()));
        }
        info!("Using DWM compositor backend");
        Ok(backend)
    }

    fn register_surface_class() -> Result<()> {
        SURFACE_CLASS_ATOM.get_or_try_init(|| unsafe {
            let instance = GetModuleHandleW(None)?;
            let class = WNDCLASSW {
                lpfnWndProc: Some(surface_window_proc),
                hInstance: instance.into(),
                lpszClassName: SURFACE_CLASS,
                ..Default::default()
            };
            match RegisterClassW(&class) {
                0 => Err(GlanceError::native("RegisterClassW failed for thumbnail surface")),
                atom => Ok(atom),
            }
        })?;
        Ok(())
    }

    fn set_transitions_disabled(hwnd: HWND, disabled: bool) {
        let value: BOOL = disabled.into();
        unsafe {
            let _ = DwmSetWindowAttribute(
                hwnd,
                DWMWA_TRANSITIONS_FORCEDISABLED,
                &value as *const BOOL as *const c_void,
                std::mem::size_of::<BOOL>() as u32,
            );
        }
    }

    fn force_foreground(hwnd: HWND) {
        unsafe {
            let target_thread = GetWindowThreadProcessId(hwnd, None);
            let current_thread = GetCurrentThreadId();

            // Foreground lock: borrow the target's input queue for the switch.
            let attached = target_thread != 0
                && target_thread != current_thread
                && AttachThreadInput(current_thread, target_thread, true).as_bool();

            if !SetForegroundWindow(hwnd).as_bool() {
                let _ = BringWindowToTop(hwnd);
            }
            let _ = SetFocus(Some(hwnd));

            if attached {
                let _ = AttachThreadInput(current_thread, target_thread, false);
            }
        }
    }

    fn thumbnail_properties(binding: &ThumbnailBinding) -> DWM_THUMBNAIL_PROPERTIES {
        let rect = binding.destination_rect;
        DWM_THUMBNAIL_PROPERTIES {
            dwFlags: DWM_TNP_RECTDESTINATION | DWM_TNP_OPACITY | DWM_TNP_VISIBLE | DWM_TNP_SOURCECLIENTAREAONLY,
            rcDestination: RECT {
                left: rect.left,
                top: rect.top,
                right: rect.right,
                bottom: rect.bottom,
            },
            rcSource: RECT::default(),
            opacity: binding.opacity,
            fVisible: binding.visible.into(),
            fSourceClientAreaOnly: binding.source_client_area_only.into(),
        }
    }
}

impl PlatformBackend for WindowsBackend {
    fn kind(&self) -> BackendKind {
        KIND
    }

    fn is_composition_enabled(&self) -> bool {
        unsafe { DwmIsCompositionEnabled().map(|b| b.as_bool()).unwrap_or(false) }
    }

    fn foreground_window(&self) -> Result<Option<WindowHandle>> {
        let foreground = unsafe { GetForegroundWindow() };
        Ok((!foreground.is_invalid()).then(|| handle(foreground)))
    }

    fn activate_window(&self, target: WindowHandle, style: AnimationStyle) -> Result<()> {
        let window = hwnd(target)?;
        if !self.is_window_valid(target) {
            return Err(GlanceError::WindowGone(target));
        }

        let minimized = unsafe { IsIconic(window).as_bool() };
        if !minimized && unsafe { GetForegroundWindow() } == window {
            return Ok(());
        }

        if minimized {
            let instant = style == AnimationStyle::Instant;
            if instant {
                Self::set_transitions_disabled(window, true);
            }
            unsafe {
                let _ = ShowWindow(window, SW_RESTORE);
            }
            if instant {
                Self::set_transitions_disabled(window, false);
            }
        }

        Self::force_foreground(window);
        Ok(())
    }

    fn move_window(&self, target: WindowHandle, left: i32, top: i32, width: u32, height: u32) -> Result<()> {
        let window = hwnd(target)?;
        unsafe { MoveWindow(window, left, top, width as i32, height as i32, true)? };
        Ok(())
    }

    fn maximize_window(&self, target: WindowHandle) -> Result<()> {
        let window = hwnd(target)?;
        unsafe {
            let _ = ShowWindow(window, SW_MAXIMIZE);
        }
        Ok(())
    }

    fn window_position(&self, target: WindowHandle) -> Result<Rect> {
        let window = hwnd(target)?;
        let mut rect = RECT::default();
        unsafe { GetWindowRect(window, &mut rect) }.map_err(|_| GlanceError::WindowGone(target))?;
        Ok(Rect::new(rect.left, rect.top, rect.right, rect.bottom))
    }

    fn is_window_maximized(&self, target: WindowHandle) -> Result<bool> {
        Ok(unsafe { IsZoomed(hwnd(target)?).as_bool() })
    }

    fn is_window_minimized(&self, target: WindowHandle) -> Result<bool> {
        Ok(unsafe { IsIconic(hwnd(target)?).as_bool() })
    }

    fn is_window_valid(&self, target: WindowHandle) -> bool {
        match hwnd(target) {
            Ok(window) => unsafe { IsWindow(Some(window)).as_bool() },
            Err(_) => false,
        }
    }

    fn window_title(&self, target: WindowHandle) -> Result<String> {
        let window = hwnd(target)?;
        if !self.is_window_valid(target) {
            return Err(GlanceError::WindowGone(target));
        }
        let mut buffer = [0u16; 512];
        let len = unsafe { GetWindowTextW(window, &mut buffer) };
        Ok(String::from_utf16_lossy(&buffer[..len.max(0) as usize]))
    }

    fn find_main_window(&self, pid: u32) -> Result<Option<WindowHandle>> {
        let mut search = MainWindowSearch { pid, found: None };
        // EnumWindows reports an error when the callback stops early.
        let _ = unsafe {
            EnumWindows(
                Some(find_main_window_callback),
                LPARAM(&mut search as *mut MainWindowSearch as isize),
            )
        };
        Ok(search.found.map(handle))
    }

    fn register_live_thumbnail(&self, destination: WindowHandle, source: WindowHandle) -> Result<ThumbnailBinding> {
        let id = unsafe { DwmRegisterThumbnail(hwnd(destination)?, hwnd(source)?)? };
        trace!("DwmRegisterThumbnail {} -> {} = {:#x}", source, destination, id);
        Ok(ThumbnailBinding::new(destination, source, ThumbnailToken(id as u64)))
    }

    fn update_live_thumbnail(&self, binding: &ThumbnailBinding) -> Result<()> {
        let properties = Self::thumbnail_properties(binding);
        unsafe { DwmUpdateThumbnailProperties(binding.token.0 as isize, &properties)? };
        Ok(())
    }

    fn unregister_live_thumbnail(&self, binding: &ThumbnailBinding) -> Result<()> {
        unsafe { DwmUnregisterThumbnail(binding.token.0 as isize)? };
        Ok(())
    }

    fn capture_static_thumbnail(&self, source: WindowHandle) -> Option<RgbaImage> {
        let rect = self.window_position(source).ok()?;
        let (width, height) = (rect.width(), rect.height());
        if width == 0 || height == 0 {
            return None;
        }
        let window = hwnd(source).ok()?;

        unsafe {
            let screen_dc = GetDC(None);
            let memory_dc = CreateCompatibleDC(Some(screen_dc));
            let bitmap = CreateCompatibleBitmap(screen_dc, width as i32, height as i32);
            let previous = SelectObject(memory_dc, bitmap.into());

            let printed = PrintWindow(window, memory_dc, PRINT_WINDOW_FLAGS(PW_RENDERFULLCONTENT)).as_bool();

            let mut info = BITMAPINFO {
                bmiHeader: BITMAPINFOHEADER {
                    biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
                    biWidth: width as i32,
                    // Negative height: top-down rows
                    biHeight: -(height as i32),
                    biPlanes: 1,
                    biBitCount: 32,
                    biCompression: BI_RGB.0,
                    ..Default::default()
                },
                ..Default::default()
            };
            let mut pixels = vec![0u8; width as usize * height as usize * 4];
            let lines = if printed {
                GetDIBits(
                    memory_dc,
                    bitmap,
                    0,
                    height,
                    Some(pixels.as_mut_ptr() as *mut c_void),
                    &mut info,
                    DIB_RGB_COLORS,
                )
            } else {
                0
            };

            SelectObject(memory_dc, previous);
            let _ = DeleteObject(bitmap.into());
            let _ = DeleteDC(memory_dc);
            ReleaseDC(None, screen_dc);

            if lines == 0 {
                debug!("PrintWindow capture failed for {}", source);
                return None;
            }

            // BGRA -> RGBA
            for pixel in pixels.chunks_exact_mut(4) {
                pixel.swap(0, 2);
                pixel[3] = 255;
            }
            RgbaImage::from_raw(width, height, pixels)
        }
    }

    fn create_surface(&self, spec: &SurfaceSpec) -> Result<WindowHandle> {
        Self::register_surface_class()?;
        let title: Vec<u16> = spec.title.encode_utf16().chain(std::iter::once(0)).collect();

        let window = unsafe {
            let instance = GetModuleHandleW(None)?;
            CreateWindowExW(
                WS_EX_TOOLWINDOW | WS_EX_TOPMOST,
                SURFACE_CLASS,
                PCWSTR(title.as_ptr()),
                WS_POPUP,
                spec.x,
                spec.y,
                spec.width as i32,
                spec.height as i32,
                None,
                None,
                Some(instance.into()),
                None,
            )?
        };
        unsafe {
            let _ = ShowWindow(window, SW_SHOWNOACTIVATE);
        }

        debug!("Created DWM surface {:?} for '{}'", window.0, spec.title);
        Ok(handle(window))
    }

    fn destroy_surface(&self, target: WindowHandle) -> Result<()> {
        let window = hwnd(target)?;
        unsafe { DestroyWindow(window)? };
        Ok(())
    }

    fn pump_events(&self) {
        let mut msg = MSG::default();
        unsafe {
            while PeekMessageW(&mut msg, None, 0, 0, PM_REMOVE).as_bool() {
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }
        }
    }
}
