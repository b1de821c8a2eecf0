pub mod hotkey;
pub mod thumbnail;

pub use hotkey::{HotkeyDirection, HotkeyEvent};
pub use thumbnail::ThumbnailEvent;
