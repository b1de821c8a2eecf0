use crate::error::{GlanceError, Result};
use crate::events::HotkeyEvent;
use crate::mappings::key_to_keysym::{KeyToKeysym, LOCK_MASK, MOD2_MASK};
use crate::platform::BackendKind;
use crate::utils::join_with_timeout;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{ConnectionExt as _, GrabMode, Keycode, ModMask, Timestamp, Window};
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;

use super::r#trait::{GlobalHotkeySource, HotkeyBinding};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Grab variants so NumLock/CapsLock state does not swallow the chord.
const LOCK_VARIANTS: [u32; 4] = [0, LOCK_MASK, MOD2_MASK, LOCK_MASK | MOD2_MASK];

#[derive(Debug, Clone, Copy)]
struct Grab {
    keycode: Keycode,
    modifiers: u32,
}

/// Drops the extra presses generated while a key is held down.
///
/// Core auto-repeat sends a KeyRelease/KeyPress pair sharing one timestamp;
/// with detectable auto-repeat only the presses repeat.
#[derive(Debug, Default)]
struct RepeatFilter {
    last_release: Option<(Keycode, Timestamp)>,
    held: HashSet<Keycode>,
}

impl RepeatFilter {
    /// Whether this press starts a new keystroke.
    fn press(&mut self, keycode: Keycode, time: Timestamp) -> bool {
        let synthetic = self.last_release.take() == Some((keycode, time));
        let fresh = self.held.insert(keycode);
        fresh && !synthetic
    }

    fn release(&mut self, keycode: Keycode, time: Timestamp) {
        self.held.remove(&keycode);
        self.last_release = Some((keycode, time));
    }
}

/// Passive `GrabKey`s on the root window of a dedicated connection, with a
/// polling event thread.
pub struct X11HotkeySource {
    conn: Arc<RustConnection>,
    root: Window,
    keysym_to_keycode: HashMap<u32, Keycode>,
    grabs: Arc<Mutex<HashMap<i32, Grab>>>,
    running: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl X11HotkeySource {
    pub fn spawn(events: mpsc::UnboundedSender<HotkeyEvent>) -> Result<Self> {
        let (conn, screen_num) = x11rb::connect(None)?;
        let conn = Arc::new(conn);
        let root = conn.setup().roots[screen_num].root;
        let keysym_to_keycode = Self::keyboard_map(&conn)?;

        let grabs: Arc<Mutex<HashMap<i32, Grab>>> = Arc::new(Mutex::new(HashMap::new()));
        let running = Arc::new(AtomicBool::new(true));

        let thread = {
            let conn = conn.clone();
            let grabs = grabs.clone();
            let running = running.clone();
            std::thread::Builder::new()
                .name("eve-glance-hotkeys".to_string())
                .spawn(move || Self::event_loop(&conn, &grabs, &running, &events))?
        };

        info!("X11 hotkey grabs ready on root {:#x}", root);
        Ok(Self {
            conn,
            root,
            keysym_to_keycode,
            grabs,
            running,
            thread: Mutex::new(Some(thread)),
        })
    }

    fn keyboard_map(conn: &RustConnection) -> Result<HashMap<u32, Keycode>> {
        let setup = conn.setup();
        let (min_keycode, max_keycode) = (setup.min_keycode, setup.max_keycode);
        let mapping = conn
            .get_keyboard_mapping(min_keycode, max_keycode - min_keycode + 1)?
            .reply()?;

        let per_keycode = mapping.keysyms_per_keycode as usize;
        let mut map = HashMap::new();
        if per_keycode == 0 {
            return Ok(map);
        }
        for (i, chunk) in mapping.keysyms.chunks(per_keycode).enumerate() {
            for keysym in chunk.iter().filter(|k| **k != 0) {
                map.entry(*keysym).or_insert(min_keycode + i as u8);
            }
        }
        Ok(map)
    }

    fn event_loop(
        conn: &RustConnection,
        grabs: &Mutex<HashMap<i32, Grab>>,
        running: &AtomicBool,
        events: &mpsc::UnboundedSender<HotkeyEvent>,
    ) {
        let mut repeats = RepeatFilter::default();
        while running.load(Ordering::Acquire) {
            match conn.poll_for_event() {
                Ok(Some(Event::KeyPress(press))) => {
                    let state = KeyToKeysym::clean_state(u16::from(press.state) as u32);
                    trace!("KeyPress keycode={} state={:#x}", press.detail, state);
                    // Holding the chord must not keep cycling
                    if !repeats.press(press.detail, press.time) {
                        continue;
                    }
                    let hit = grabs
                        .lock()
                        .iter()
                        .find(|(_, g)| g.keycode == press.detail && g.modifiers == state)
                        .map(|(id, _)| *id);
                    if let Some(id) = hit {
                        debug!("Hotkey {} pressed", id);
                        let _ = events.send(HotkeyEvent::new(id));
                    }
                }
                Ok(Some(Event::KeyRelease(release))) => repeats.release(release.detail, release.time),
                Ok(Some(_)) => {}
                Ok(None) => std::thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    warn!("X11 hotkey connection lost: {}", e);
                    break;
                }
            }
        }
        debug!("X11 hotkey thread finished");
    }

    fn ungrab(&self, grab: Grab) -> Result<()> {
        for extra in LOCK_VARIANTS {
            self.conn
                .ungrab_key(grab.keycode, self.root, ModMask::from((grab.modifiers | extra) as u16))?;
        }
        self.conn.flush()?;
        Ok(())
    }
}

impl GlobalHotkeySource for X11HotkeySource {
    fn kind(&self) -> BackendKind {
        BackendKind::X11
    }

    fn register(&self, binding: &HotkeyBinding) -> Result<()> {
        let keycode = *self.keysym_to_keycode.get(&binding.key_code).ok_or_else(|| {
            GlanceError::HotkeyRegistration(format!(
                "no keycode for {} (keysym {:#x})",
                binding.spec, binding.key_code
            ))
        })?;
        let grab = Grab {
            keycode,
            modifiers: binding.modifier_mask,
        };

        for extra in LOCK_VARIANTS {
            // Checked: BadAccess means another client owns the chord.
            self.conn
                .grab_key(
                    false,
                    self.root,
                    ModMask::from((grab.modifiers | extra) as u16),
                    keycode,
                    GrabMode::ASYNC,
                    GrabMode::ASYNC,
                )?
                .check()
                .map_err(|e| GlanceError::HotkeyRegistration(format!("{} is already grabbed: {}", binding.spec, e)))?;
        }

        self.grabs.lock().insert(binding.id, grab);
        debug!("Grabbed {} (keycode {}, mods {:#x})", binding.spec, keycode, grab.modifiers);
        Ok(())
    }

    fn unregister(&self, id: i32) -> Result<()> {
        let Some(grab) = self.grabs.lock().remove(&id) else {
            return Ok(());
        };
        self.ungrab(grab)
    }

    fn stop(&self, timeout: Duration) {
        let grabs: Vec<Grab> = self.grabs.lock().drain().map(|(_, g)| g).collect();
        for grab in grabs {
            if let Err(e) = self.ungrab(grab) {
                debug!("Ungrab failed during shutdown: {}", e);
            }
        }

        self.running.store(false, Ordering::Release);
        if let Some(thread) = self.thread.lock().take() {
            if !join_with_timeout(thread, timeout) {
                warn!("X11 hotkey thread did not stop within {:?}", timeout);
            }
        }
    }
}
