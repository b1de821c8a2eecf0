use crate::error::{GlanceError, Result};
use crate::events::HotkeyEvent;
use crate::platform::BackendKind;
use crate::utils::join_with_timeout;
use parking_lot::Mutex;
use std::ffi::c_void;
use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use windows::core::w;
use windows::Win32::Foundation::{HWND, LPARAM, LRESULT, WPARAM};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::UI::Input::KeyboardAndMouse::{RegisterHotKey, UnregisterHotKey, HOT_KEY_MODIFIERS};
use windows::Win32::UI::WindowsAndMessaging::{
    CreateWindowExW, DefWindowProcW, DestroyWindow, DispatchMessageW, GetMessageW, PostMessageW,
    RegisterClassW, TranslateMessage, HWND_MESSAGE, MSG, WM_HOTKEY, WM_USER, WNDCLASSW,
};

use super::r#trait::{GlobalHotkeySource, HotkeyBinding};

const WM_GLANCE_COMMAND: u32 = WM_USER + 1;
const WM_GLANCE_QUIT: u32 = WM_USER + 2;
const REPLY_TIMEOUT: Duration = Duration::from_secs(2);

enum Command {
    Register {
        id: i32,
        modifiers: u32,
        vk: u32,
        reply: std_mpsc::SyncSender<Result<()>>,
    },
    Unregister {
        id: i32,
        reply: std_mpsc::SyncSender<Result<()>>,
    },
}

/// `RegisterHotKey` on a dedicated message-only window thread.
///
/// Hotkeys belong to the thread that registered them, so every
/// register/unregister is marshalled onto that thread.
pub struct Win32HotkeySource {
    // HWND is !Send; keep the raw value.
    hwnd: isize,
    commands: std_mpsc::Sender<Command>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Win32HotkeySource {
    pub fn spawn(events: mpsc::UnboundedSender<HotkeyEvent>) -> Result<Self> {
        let (command_tx, command_rx) = std_mpsc::channel::<Command>();
        let (init_tx, init_rx) = std_mpsc::channel::<Result<isize>>();

        let thread = std::thread::Builder::new()
            .name("eve-glance-hotkeys".to_string())
            .spawn(move || unsafe {
                let hwnd = match create_message_window() {
                    Ok(hwnd) => hwnd,
                    Err(e) => {
                        let _ = init_tx.send(Err(e));
                        return;
                    }
                };
                let _ = init_tx.send(Ok(hwnd.0 as isize));

                let mut registered = Vec::new();
                let mut msg = MSG::default();
                while GetMessageW(&mut msg, None, 0, 0).0 > 0 {
                    match msg.message {
                        WM_HOTKEY => {
                            let id = msg.wParam.0 as i32;
                            debug!("Hotkey {} pressed", id);
                            let _ = events.send(HotkeyEvent::new(id));
                        }
                        WM_GLANCE_COMMAND => {
                            while let Ok(command) = command_rx.try_recv() {
                                run_command(hwnd, command, &mut registered);
                            }
                        }
                        WM_GLANCE_QUIT => break,
                        _ => {
                            let _ = TranslateMessage(&msg);
                            DispatchMessageW(&msg);
                        }
                    }
                }

                for id in registered.drain(..) {
                    let _ = UnregisterHotKey(Some(hwnd), id);
                }
                let _ = DestroyWindow(hwnd);
                debug!("Hotkey message thread finished");
            })?;

        let hwnd = init_rx
            .recv()
            .map_err(|_| GlanceError::Initialization("hotkey thread exited during startup".to_string()))??;

        info!("Hotkey message window ready");
        Ok(Self {
            hwnd,
            commands: command_tx,
            thread: Mutex::new(Some(thread)),
        })
    }

    fn post(&self, message: u32) -> Result<()> {
        let hwnd = HWND(self.hwnd as *mut c_void);
        unsafe { PostMessageW(Some(hwnd), message, WPARAM(0), LPARAM(0))? };
        Ok(())
    }

    fn request(&self, build: impl FnOnce(std_mpsc::SyncSender<Result<()>>) -> Command) -> Result<()> {
        let (reply_tx, reply_rx) = std_mpsc::sync_channel(1);
        self.commands
            .send(build(reply_tx))
            .map_err(|_| GlanceError::ServiceUnavailable("hotkey thread has stopped".to_string()))?;
        self.post(WM_GLANCE_COMMAND)?;
        reply_rx
            .recv_timeout(REPLY_TIMEOUT)
            .map_err(|_| GlanceError::ServiceUnavailable("hotkey thread did not answer".to_string()))?
    }
}

unsafe extern "system" fn hotkey_window_proc(hwnd: HWND, msg: u32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    DefWindowProcW(hwnd, msg, wparam, lparam)
}

unsafe fn create_message_window() -> Result<HWND> {
    let instance = GetModuleHandleW(None)?;
    let class_name = w!("EveGlanceHotkeys");
    let class = WNDCLASSW {
        lpfnWndProc: Some(hotkey_window_proc),
        hInstance: instance.into(),
        lpszClassName: class_name,
        ..Default::default()
    };
    RegisterClassW(&class);

    let hwnd = CreateWindowExW(
        Default::default(),
        class_name,
        None,
        Default::default(),
        0,
        0,
        0,
        0,
        Some(HWND_MESSAGE),
        None,
        Some(instance.into()),
        None,
    )?;
    Ok(hwnd)
}

unsafe fn run_command(hwnd: HWND, command: Command, registered: &mut Vec<i32>) {
    match command {
        Command::Register { id, modifiers, vk, reply } => {
            let result = RegisterHotKey(Some(hwnd), id, HOT_KEY_MODIFIERS(modifiers), vk)
                .map_err(|e| GlanceError::HotkeyRegistration(format!("RegisterHotKey({}): {}", id, e)));
            if result.is_ok() {
                registered.push(id);
            }
            let _ = reply.send(result);
        }
        Command::Unregister { id, reply } => {
            registered.retain(|r| *r != id);
            let result = UnregisterHotKey(Some(hwnd), id).map_err(GlanceError::from);
            let _ = reply.send(result);
        }
    }
}

impl GlobalHotkeySource for Win32HotkeySource {
    fn kind(&self) -> BackendKind {
        BackendKind::Windows
    }

    fn register(&self, binding: &HotkeyBinding) -> Result<()> {
        let (id, modifiers, vk) = (binding.id, binding.modifier_mask, binding.key_code);
        self.request(|reply| Command::Register { id, modifiers, vk, reply })
    }

    fn unregister(&self, id: i32) -> Result<()> {
        self.request(|reply| Command::Unregister { id, reply })
    }

    fn stop(&self, timeout: Duration) {
        let Some(thread) = self.thread.lock().take() else {
            return;
        };
        if let Err(e) = self.post(WM_GLANCE_QUIT) {
            error!("Failed to signal hotkey thread: {}", e);
            return;
        }
        if !join_with_timeout(thread, timeout) {
            warn!("Hotkey thread did not stop within {:?}", timeout);
        }
    }
}
