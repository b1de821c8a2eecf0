use crate::error::Result;
use crate::events::{HotkeyDirection, HotkeyEvent};
use crate::platform::BackendKind;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use super::parser::HotkeySpec;

/// One registered chord: (group, direction) → OS hotkey id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotkeyBinding {
    pub id: i32,
    pub group_id: String,
    pub direction: HotkeyDirection,
    pub spec: HotkeySpec,
    /// Native modifier mask (`MOD_*` on Windows, X11 core mask bits otherwise).
    pub modifier_mask: u32,
    /// Virtual-key code on Windows, keysym on X11.
    pub key_code: u32,
}

/// OS delivery of global hotkey presses.
///
/// Presses are sent as `HotkeyEvent`s on the channel given to
/// `create_hotkey_source`.
pub trait GlobalHotkeySource: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn register(&self, binding: &HotkeyBinding) -> Result<()>;

    fn unregister(&self, id: i32) -> Result<()>;

    /// Unregister everything and stop the event pump, waiting at most `timeout`.
    fn stop(&self, timeout: Duration);
}

/// Factory for the hotkey source matching the window backend.
pub fn create_hotkey_source(
    kind: BackendKind,
    events: mpsc::UnboundedSender<HotkeyEvent>,
) -> Result<Arc<dyn GlobalHotkeySource>> {
    match kind {
        BackendKind::DryRun => Ok(Arc::new(super::dry_run::DryRunHotkeySource::new(events))),
        #[cfg(windows)]
        BackendKind::Windows => Ok(Arc::new(super::win32::Win32HotkeySource::spawn(events)?)),
        #[cfg(target_os = "linux")]
        BackendKind::X11 => Ok(Arc::new(super::x11::X11HotkeySource::spawn(events)?)),
        other => Ok(Arc::new(super::dry_run::UnsupportedHotkeySource::new(other))),
    }
}
