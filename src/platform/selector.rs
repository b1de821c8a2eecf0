use crate::error::{GlanceError, Result};
use crate::glance_error;
use serde::{Deserialize, Serialize};
use smallvec::{smallvec, SmallVec};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

use super::detector::{DisplayServer, DisplayServerDetector};
use super::dry_run::DryRunBackend;
use super::r#trait::{BackendKind, PlatformBackend};

/// Backend requested by configuration or the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendMode {
    #[default]
    Auto,
    Windows,
    X11,
    Wayland,
    DryRun,
}

impl FromStr for BackendMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(BackendMode::Auto),
            "windows" | "dwm" => Ok(BackendMode::Windows),
            "x11" => Ok(BackendMode::X11),
            "wayland" => Ok(BackendMode::Wayland),
            "dry-run" | "dry_run" | "dryrun" => Ok(BackendMode::DryRun),
            other => Err(format!("unknown backend '{}'", other)),
        }
    }
}

impl fmt::Display for BackendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendMode::Auto => "auto",
            BackendMode::Windows => "windows",
            BackendMode::X11 => "x11",
            BackendMode::Wayland => "wayland",
            BackendMode::DryRun => "dry-run",
        };
        f.write_str(name)
    }
}

/// Backends to try, in order. At most one fallback.
pub fn candidates(mode: BackendMode, server: DisplayServer) -> SmallVec<[BackendKind; 2]> {
    match mode {
        BackendMode::DryRun => smallvec![BackendKind::DryRun],
        BackendMode::Windows => smallvec![BackendKind::Windows],
        BackendMode::X11 => smallvec![BackendKind::X11],
        BackendMode::Wayland => smallvec![BackendKind::Wayland],
        BackendMode::Auto if cfg!(windows) => smallvec![BackendKind::Windows],
        BackendMode::Auto => match server {
            DisplayServer::Wayland => smallvec![BackendKind::Wayland, BackendKind::X11],
            DisplayServer::X11 | DisplayServer::Unknown => smallvec![BackendKind::X11, BackendKind::Wayland],
        },
    }
}

/// Instantiate the backend for this host. Called once at startup.
pub fn create_backend(mode: BackendMode, detector: &DisplayServerDetector) -> Result<Arc<dyn PlatformBackend>> {
    select_with(mode, detector, connect)
}

fn select_with<F>(mode: BackendMode, detector: &DisplayServerDetector, connect: F) -> Result<Arc<dyn PlatformBackend>>
where
    F: Fn(BackendKind) -> Result<Arc<dyn PlatformBackend>>,
{
    let server = match mode {
        BackendMode::Auto if !cfg!(windows) => detector.detect(),
        _ => DisplayServer::Unknown,
    };

    let mut last_error = None;
    for kind in candidates(mode, server) {
        match connect(kind) {
            Ok(backend) => {
                info!("Platform backend: {}", backend.kind());
                return Ok(backend);
            }
            Err(e) => {
                warn!("{} backend failed to initialize: {}", kind, e);
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| glance_error!(init, "no backend for mode {}", mode)))
}

fn connect(kind: BackendKind) -> Result<Arc<dyn PlatformBackend>> {
    match kind {
        BackendKind::DryRun => Ok(Arc::new(DryRunBackend::new())),
        #[cfg(windows)]
        BackendKind::Windows => Ok(Arc::new(super::dwm::WindowsBackend::connect()?)),
        #[cfg(target_os = "linux")]
        BackendKind::X11 => Ok(Arc::new(super::x11::X11Backend::connect()?)),
        #[cfg(target_os = "linux")]
        BackendKind::Wayland => Ok(Arc::new(super::wayland::WaylandBackend::connect()?)),
        #[allow(unreachable_patterns)]
        other => Err(GlanceError::Initialization(format!(
            "{} backend is not available on this platform",
            other
        ))),
    }
}
