//! Platform layer: everything that touches native window handles.
//!
//! Code outside this module only sees `WindowHandle` values and the
//! `PlatformBackend` / `ProcessTable` traits.

mod r#trait;
pub mod detector;
pub mod dry_run;
pub mod process;
pub mod selector;

#[cfg(windows)]
pub mod dwm;
#[cfg(target_os = "linux")]
pub mod wayland;
#[cfg(target_os = "linux")]
pub mod x11;

pub use self::detector::{DisplayServer, DisplayServerDetector};
pub use self::dry_run::{DryRunBackend, DryRunProcessTable};
pub use self::process::{create_process_table, ProcessEntry, ProcessTable};
pub use self::r#trait::{
    AnimationStyle, BackendKind, PlatformBackend, Rect, SurfaceSpec, ThumbnailBinding, ThumbnailToken,
    WindowHandle,
};
pub use self::selector::{create_backend, BackendMode};
