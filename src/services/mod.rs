pub mod cycle;
pub mod hotkey;
pub mod profile;
pub mod reconciler;
pub mod thumbnail;
pub mod ui_thread;

pub use cycle::WindowCycleEngine;
pub use hotkey::{create_hotkey_source, GlobalHotkeySource, HotkeyRegistry};
pub use profile::{ConfigProfile, ProfileSource};
pub use reconciler::ThumbnailReconciler;
pub use thumbnail::LiveThumbnail;
pub use ui_thread::{UiDispatcher, UiThread};
