use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HotkeyDirection {
    Forward,
    Backward,
}

impl HotkeyDirection {
    pub fn is_forward(&self) -> bool {
        matches!(self, HotkeyDirection::Forward)
    }
}

impl fmt::Display for HotkeyDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HotkeyDirection::Forward => write!(f, "forward"),
            HotkeyDirection::Backward => write!(f, "backward"),
        }
    }
}

/// A global hotkey press as delivered by the OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HotkeyEvent {
    pub id: i32,
    pub timestamp: Instant,
}

impl HotkeyEvent {
    pub fn new(id: i32) -> Self {
        Self {
            id,
            timestamp: Instant::now(),
        }
    }
}
