//! Live window thumbnails and hotkey-driven window cycling for multi-client
//! desktops, on Windows (DWM), X11 and Wayland.

pub mod config;
pub mod error;
pub mod events;
pub mod mappings;
pub mod platform;
pub mod services;
pub mod utils;
