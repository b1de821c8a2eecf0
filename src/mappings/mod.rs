//! Key tables translating parsed hotkeys into native codes.

pub mod key_to_keysym;
pub mod key_to_virtual_key;

pub use key_to_keysym::KeyToKeysym;
pub use key_to_virtual_key::KeyToVirtualKey;

use crate::platform::BackendKind;
use crate::services::hotkey::HotkeySpec;

/// `(modifier mask, key code)` in the encoding `kind` registers with.
pub fn native_chord(kind: BackendKind, spec: &HotkeySpec) -> (u32, u32) {
    match kind {
        BackendKind::X11 => (KeyToKeysym::modifier_mask(&spec.modifiers), KeyToKeysym::translate(&spec.key)),
        _ => (
            KeyToVirtualKey::modifier_mask(&spec.modifiers),
            KeyToVirtualKey::translate(&spec.key),
        ),
    }
}
