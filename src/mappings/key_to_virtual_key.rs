use crate::services::hotkey::parser::{Key, Modifiers, NamedKey};

// RegisterHotKey fsModifiers
pub const MOD_ALT: u32 = 0x0001;
pub const MOD_CONTROL: u32 = 0x0002;
pub const MOD_SHIFT: u32 = 0x0004;
pub const MOD_WIN: u32 = 0x0008;
pub const MOD_NOREPEAT: u32 = 0x4000;

/// Windows virtual-key codes.
pub struct KeyToVirtualKey;

impl KeyToVirtualKey {
    pub fn translate(key: &Key) -> u32 {
        match key {
            // VK_0..VK_9 and VK_A..VK_Z equal their ASCII uppercase values
            Key::Char(c) => *c as u32,
            Key::F(n) => 0x70 + (*n as u32 - 1),   // VK_F1
            Key::NumPad(n) => 0x60 + *n as u32,    // VK_NUMPAD0
            Key::Named(named) => match named {
                NamedKey::Backspace => 0x08,  // VK_BACK
                NamedKey::Tab => 0x09,        // VK_TAB
                NamedKey::Enter => 0x0D,      // VK_RETURN
                NamedKey::Escape => 0x1B,     // VK_ESCAPE
                NamedKey::Space => 0x20,      // VK_SPACE
                NamedKey::PageUp => 0x21,     // VK_PRIOR
                NamedKey::PageDown => 0x22,   // VK_NEXT
                NamedKey::End => 0x23,        // VK_END
                NamedKey::Home => 0x24,       // VK_HOME
                NamedKey::Left => 0x25,       // VK_LEFT
                NamedKey::Up => 0x26,         // VK_UP
                NamedKey::Right => 0x27,      // VK_RIGHT
                NamedKey::Down => 0x28,       // VK_DOWN
                NamedKey::Insert => 0x2D,     // VK_INSERT
                NamedKey::Delete => 0x2E,     // VK_DELETE
            },
        }
    }

    /// Held keys do not re-fire the hotkey.
    pub fn modifier_mask(modifiers: &Modifiers) -> u32 {
        let mut mask = MOD_NOREPEAT;
        if modifiers.alt { mask |= MOD_ALT; }
        if modifiers.ctrl { mask |= MOD_CONTROL; }
        if modifiers.shift { mask |= MOD_SHIFT; }
        if modifiers.win { mask |= MOD_WIN; }
        mask
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::hotkey::HotkeySpec;

    fn vk(spec: &str) -> u32 {
        KeyToVirtualKey::translate(&HotkeySpec::parse(spec).unwrap().key)
    }

    #[test]
    fn test_translate() {
        assert_eq!(vk("A"), 0x41);
        assert_eq!(vk("z"), 0x5A);
        assert_eq!(vk("7"), 0x37);
        assert_eq!(vk("F1"), 0x70);
        assert_eq!(vk("F24"), 0x87);
        assert_eq!(vk("NumPad9"), 0x69);
        assert_eq!(vk("PgDn"), 0x22);
    }

    #[test]
    fn test_modifier_mask() {
        let spec = HotkeySpec::parse("Ctrl+Shift+Tab").unwrap();
        assert_eq!(
            KeyToVirtualKey::modifier_mask(&spec.modifiers),
            MOD_CONTROL | MOD_SHIFT | MOD_NOREPEAT
        );
    }
}
