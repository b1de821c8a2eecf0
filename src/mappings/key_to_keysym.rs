use crate::services::hotkey::parser::{Key, Modifiers, NamedKey};

// X11 core modifier bits
pub const SHIFT_MASK: u32 = 1 << 0;
pub const LOCK_MASK: u32 = 1 << 1;
pub const CONTROL_MASK: u32 = 1 << 2;
pub const MOD1_MASK: u32 = 1 << 3; // Alt
pub const MOD2_MASK: u32 = 1 << 4; // NumLock
pub const MOD4_MASK: u32 = 1 << 6; // Super

/// X11 keysyms.
pub struct KeyToKeysym;

impl KeyToKeysym {
    pub fn translate(key: &Key) -> u32 {
        match key {
            // Latin-1 keysyms: unshifted level is the lowercase letter
            Key::Char(c) => c.to_ascii_lowercase() as u32,
            Key::F(n) => 0xffbe + (*n as u32 - 1),  // XK_F1
            Key::NumPad(n) => 0xffb0 + *n as u32,   // XK_KP_0
            Key::Named(named) => match named {
                NamedKey::Space => 0x0020,      // XK_space
                NamedKey::Backspace => 0xff08,  // XK_BackSpace
                NamedKey::Tab => 0xff09,        // XK_Tab
                NamedKey::Enter => 0xff0d,      // XK_Return
                NamedKey::Escape => 0xff1b,     // XK_Escape
                NamedKey::Home => 0xff50,       // XK_Home
                NamedKey::Left => 0xff51,       // XK_Left
                NamedKey::Up => 0xff52,         // XK_Up
                NamedKey::Right => 0xff53,      // XK_Right
                NamedKey::Down => 0xff54,       // XK_Down
                NamedKey::PageUp => 0xff55,     // XK_Prior
                NamedKey::PageDown => 0xff56,   // XK_Next
                NamedKey::End => 0xff57,        // XK_End
                NamedKey::Insert => 0xff63,     // XK_Insert
                NamedKey::Delete => 0xffff,     // XK_Delete
            },
        }
    }

    pub fn modifier_mask(modifiers: &Modifiers) -> u32 {
        let mut mask = 0;
        if modifiers.shift { mask |= SHIFT_MASK; }
        if modifiers.ctrl { mask |= CONTROL_MASK; }
        if modifiers.alt { mask |= MOD1_MASK; }
        if modifiers.win { mask |= MOD4_MASK; }
        mask
    }

    /// Strip lock modifiers so NumLock/CapsLock do not affect matching.
    pub fn clean_state(state: u32) -> u32 {
        state & !(LOCK_MASK | MOD2_MASK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::hotkey::HotkeySpec;

    fn keysym(spec: &str) -> u32 {
        KeyToKeysym::translate(&HotkeySpec::parse(spec).unwrap().key)
    }

    #[test]
    fn test_translate() {
        assert_eq!(keysym("A"), 0x61);
        assert_eq!(keysym("5"), 0x35);
        assert_eq!(keysym("F12"), 0xffc9);
        assert_eq!(keysym("NumPad0"), 0xffb0);
        assert_eq!(keysym("Del"), 0xffff);
    }

    #[test]
    fn test_modifier_mask_and_lock_stripping() {
        let spec = HotkeySpec::parse("Alt+Win+1").unwrap();
        let mask = KeyToKeysym::modifier_mask(&spec.modifiers);
        assert_eq!(mask, MOD1_MASK | MOD4_MASK);
        assert_eq!(KeyToKeysym::clean_state(mask | LOCK_MASK | MOD2_MASK), mask);
    }
}
