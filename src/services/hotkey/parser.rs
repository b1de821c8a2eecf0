use crate::error::{GlanceError, Result};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Modifiers {
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
    pub win: bool,
}

impl Modifiers {
    pub fn is_empty(&self) -> bool {
        !self.ctrl && !self.alt && !self.shift && !self.win
    }

    fn set(&mut self, token: &str) -> bool {
        match token.to_lowercase().as_str() {
            "ctrl" | "control" => self.ctrl = true,
            "alt" => self.alt = true,
            "shift" => self.shift = true,
            "win" => self.win = true,
            _ => return false,
        }
        true
    }
}

impl fmt::Display for Modifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: SmallVec<[&str; 4]> = SmallVec::new();
        if self.ctrl { parts.push("Ctrl"); }
        if self.alt { parts.push("Alt"); }
        if self.shift { parts.push("Shift"); }
        if self.win { parts.push("Win"); }
        write!(f, "{}", parts.join("+"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamedKey {
    Space,
    Enter,
    Tab,
    Escape,
    Backspace,
    Delete,
    Insert,
    Home,
    End,
    PageUp,
    PageDown,
    Up,
    Down,
    Left,
    Right,
}

impl NamedKey {
    fn parse(token: &str) -> Option<Self> {
        let key = match token.to_lowercase().as_str() {
            "space" => NamedKey::Space,
            "enter" => NamedKey::Enter,
            "tab" => NamedKey::Tab,
            "escape" | "esc" => NamedKey::Escape,
            "backspace" | "back" => NamedKey::Backspace,
            "delete" | "del" => NamedKey::Delete,
            "insert" | "ins" => NamedKey::Insert,
            "home" => NamedKey::Home,
            "end" => NamedKey::End,
            "pageup" | "pgup" => NamedKey::PageUp,
            "pagedown" | "pgdn" => NamedKey::PageDown,
            "up" => NamedKey::Up,
            "down" => NamedKey::Down,
            "left" => NamedKey::Left,
            "right" => NamedKey::Right,
            _ => return None,
        };
        Some(key)
    }

    fn name(&self) -> &'static str {
        match self {
            NamedKey::Space => "Space",
            NamedKey::Enter => "Enter",
            NamedKey::Tab => "Tab",
            NamedKey::Escape => "Escape",
            NamedKey::Backspace => "Backspace",
            NamedKey::Delete => "Delete",
            NamedKey::Insert => "Insert",
            NamedKey::Home => "Home",
            NamedKey::End => "End",
            NamedKey::PageUp => "PageUp",
            NamedKey::PageDown => "PageDown",
            NamedKey::Up => "Up",
            NamedKey::Down => "Down",
            NamedKey::Left => "Left",
            NamedKey::Right => "Right",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    /// `A`..`Z` (stored uppercase) or `0`..`9`.
    Char(char),
    /// `F1`..`F24`
    F(u8),
    /// `NumPad0`..`NumPad9`
    NumPad(u8),
    Named(NamedKey),
}

impl Key {
    fn parse(token: &str) -> Option<Self> {
        let mut chars = token.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            return c.is_ascii_alphanumeric().then(|| Key::Char(c.to_ascii_uppercase()));
        }

        let lower = token.to_lowercase();
        if let Some(n) = lower.strip_prefix("numpad").and_then(|n| n.parse::<u8>().ok()) {
            return (n <= 9).then_some(Key::NumPad(n));
        }
        if let Some(n) = lower.strip_prefix('f').and_then(|n| n.parse::<u8>().ok()) {
            return (1..=24).contains(&n).then_some(Key::F(n));
        }
        NamedKey::parse(&lower).map(Key::Named)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Char(c) => write!(f, "{}", c),
            Key::F(n) => write!(f, "F{}", n),
            Key::NumPad(n) => write!(f, "NumPad{}", n),
            Key::Named(named) => f.write_str(named.name()),
        }
    }
}

/// A parsed `[Modifier+]*Key` chord.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HotkeySpec {
    pub modifiers: Modifiers,
    pub key: Key,
}

impl HotkeySpec {
    pub fn parse(spec: &str) -> Result<Self> {
        let fail = |reason: &str| GlanceError::HotkeyParse {
            spec: spec.to_string(),
            reason: reason.to_string(),
        };

        let tokens: SmallVec<[&str; 4]> = spec.split('+').map(str::trim).collect();
        if tokens.iter().any(|t| t.is_empty()) {
            return Err(fail("empty token"));
        }
        let Some((key_token, modifier_tokens)) = tokens.split_last() else {
            return Err(fail("empty hotkey"));
        };

        let mut modifiers = Modifiers::default();
        for token in modifier_tokens {
            if !modifiers.set(token) {
                return Err(fail(&format!("unknown modifier '{}'", token)));
            }
        }

        let key = Key::parse(key_token).ok_or_else(|| fail(&format!("unknown key '{}'", key_token)))?;
        Ok(Self { modifiers, key })
    }
}

impl FromStr for HotkeySpec {
    type Err = GlanceError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for HotkeySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.modifiers.is_empty() {
            write!(f, "{}", self.key)
        } else {
            write!(f, "{}+{}", self.modifiers, self.key)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modifiers_and_function_key() {
        let spec = HotkeySpec::parse("Ctrl+Shift+F1").unwrap();
        assert!(spec.modifiers.ctrl && spec.modifiers.shift);
        assert!(!spec.modifiers.alt && !spec.modifiers.win);
        assert_eq!(spec.key, Key::F(1));
        assert_eq!(spec.to_string(), "Ctrl+Shift+F1");
    }

    #[test]
    fn test_bare_key() {
        let spec = HotkeySpec::parse("a").unwrap();
        assert!(spec.modifiers.is_empty());
        assert_eq!(spec.key, Key::Char('A'));
    }

    #[test]
    fn test_case_and_aliases() {
        let spec = HotkeySpec::parse("control + ALT + pgdn").unwrap();
        assert!(spec.modifiers.ctrl && spec.modifiers.alt);
        assert_eq!(spec.key, Key::Named(NamedKey::PageDown));

        assert_eq!(HotkeySpec::parse("Win+NumPad7").unwrap().key, Key::NumPad(7));
        assert_eq!(HotkeySpec::parse("Esc").unwrap().key, Key::Named(NamedKey::Escape));
        assert_eq!(HotkeySpec::parse("F24").unwrap().key, Key::F(24));
    }

    #[test]
    fn test_rejects_unknown_tokens() {
        for bad in ["Foo", "F25", "F0", "NumPad10", "Hyper+A", "Ctrl+", "", "Ctrl", "+A", "é"] {
            let err = HotkeySpec::parse(bad).unwrap_err();
            assert!(matches!(err, GlanceError::HotkeyParse { .. }), "{:?} should fail", bad);
        }
    }
}
