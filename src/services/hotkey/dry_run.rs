use crate::error::{GlanceError, Result};
use crate::events::HotkeyEvent;
use crate::platform::BackendKind;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashSet};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::r#trait::{GlobalHotkeySource, HotkeyBinding};

/// In-memory hotkey source; presses are injected with `trigger`.
pub struct DryRunHotkeySource {
    events: mpsc::UnboundedSender<HotkeyEvent>,
    registered: Mutex<BTreeSet<i32>>,
    rejected: Mutex<HashSet<String>>,
}

impl DryRunHotkeySource {
    pub fn new(events: mpsc::UnboundedSender<HotkeyEvent>) -> Self {
        Self {
            events,
            registered: Mutex::new(BTreeSet::new()),
            rejected: Mutex::new(HashSet::new()),
        }
    }

    /// Simulate another application owning `chord` (e.g. "Ctrl+F1").
    pub fn reject(&self, chord: &str) {
        self.rejected.lock().insert(chord.to_string());
    }

    /// Deliver a press of hotkey `id`. Returns `false` if it is not registered.
    pub fn trigger(&self, id: i32) -> bool {
        if !self.registered.lock().contains(&id) {
            return false;
        }
        self.events.send(HotkeyEvent::new(id)).is_ok()
    }

    pub fn registered_ids(&self) -> Vec<i32> {
        self.registered.lock().iter().copied().collect()
    }
}

impl GlobalHotkeySource for DryRunHotkeySource {
    fn kind(&self) -> BackendKind {
        BackendKind::DryRun
    }

    fn register(&self, binding: &HotkeyBinding) -> Result<()> {
        if self.rejected.lock().contains(&binding.spec.to_string()) {
            return Err(GlanceError::HotkeyRegistration(format!("{} is already in use", binding.spec)));
        }
        if !self.registered.lock().insert(binding.id) {
            return Err(GlanceError::HotkeyRegistration(format!("id {} is already registered", binding.id)));
        }
        info!("Dry-run: registered hotkey {} as id {}", binding.spec, binding.id);
        Ok(())
    }

    fn unregister(&self, id: i32) -> Result<()> {
        self.registered.lock().remove(&id);
        Ok(())
    }

    fn stop(&self, _timeout: Duration) {
        let count = std::mem::take(&mut *self.registered.lock()).len();
        debug!("Dry-run hotkey source stopped, released {} hotkeys", count);
    }
}

/// Stand-in for sessions without a global hotkey facility (Wayland).
pub struct UnsupportedHotkeySource {
    kind: BackendKind,
}

impl UnsupportedHotkeySource {
    pub fn new(kind: BackendKind) -> Self {
        info!("Global hotkeys are not available on {}", kind);
        Self { kind }
    }
}

impl GlobalHotkeySource for UnsupportedHotkeySource {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn register(&self, _binding: &HotkeyBinding) -> Result<()> {
        GlanceError::unsupported(self.kind.name(), "global hotkeys")
    }

    fn unregister(&self, _id: i32) -> Result<()> {
        Ok(())
    }

    fn stop(&self, _timeout: Duration) {}
}
