pub mod dry_run;
pub mod parser;
pub mod registry;
mod r#trait;
#[cfg(windows)]
pub mod win32;
#[cfg(target_os = "linux")]
pub mod x11;

pub use dry_run::{DryRunHotkeySource, UnsupportedHotkeySource};
pub use parser::{HotkeySpec, Key, Modifiers, NamedKey};
pub use r#trait::{create_hotkey_source, GlobalHotkeySource, HotkeyBinding};
pub use registry::{HotkeyRegistry, RegistrationFailure, RegistrationReport};
