use parking_lot::Mutex;
use std::fmt;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisplayServer {
    X11,
    Wayland,
    Unknown,
}

impl fmt::Display for DisplayServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplayServer::X11 => write!(f, "X11"),
            DisplayServer::Wayland => write!(f, "Wayland"),
            DisplayServer::Unknown => write!(f, "unknown"),
        }
    }
}

type EnvLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// One-shot probe of the Linux session type.
///
/// The result is computed on first use and cached inside this value; callers
/// construct one detector at startup and pass it to the selector.
pub struct DisplayServerDetector {
    env: EnvLookup,
    cached: Mutex<Option<DisplayServer>>,
}

impl Default for DisplayServerDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplayServerDetector {
    pub fn new() -> Self {
        Self::with_env(|key| std::env::var(key).ok())
    }

    /// Detector reading session indicators from a custom source.
    pub fn with_env<F>(env: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            env: Box::new(env),
            cached: Mutex::new(None),
        }
    }

    pub fn detect(&self) -> DisplayServer {
        let mut cached = self.cached.lock();
        if let Some(server) = *cached {
            return server;
        }

        let server = self.probe();
        info!("Detected display server: {}", server);
        *cached = Some(server);
        server
    }

    /// Forget the cached result so the next `detect` probes again.
    pub fn invalidate(&self) {
        debug!("Display server detection invalidated");
        *self.cached.lock() = None;
    }

    fn probe(&self) -> DisplayServer {
        if let Some(session) = (self.env)("XDG_SESSION_TYPE") {
            match session.trim().to_lowercase().as_str() {
                "wayland" => return DisplayServer::Wayland,
                "x11" => return DisplayServer::X11,
                other => debug!("Ignoring XDG_SESSION_TYPE={}", other),
            }
        }

        if (self.env)("WAYLAND_DISPLAY").is_some_and(|v| !v.is_empty()) {
            return DisplayServer::Wayland;
        }

        if (self.env)("DISPLAY").is_some_and(|v| !v.is_empty()) {
            return DisplayServer::X11;
        }

        DisplayServer::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn detector(vars: &[(&str, &str)]) -> DisplayServerDetector {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        DisplayServerDetector::with_env(move |key| vars.get(key).cloned())
    }

    #[test]
    fn test_session_type_wins() {
        let d = detector(&[("XDG_SESSION_TYPE", "x11"), ("WAYLAND_DISPLAY", "wayland-0")]);
        assert_eq!(d.detect(), DisplayServer::X11);

        let d = detector(&[("XDG_SESSION_TYPE", "Wayland")]);
        assert_eq!(d.detect(), DisplayServer::Wayland);
    }

    #[test]
    fn test_falls_back_to_display_variables() {
        let d = detector(&[("XDG_SESSION_TYPE", "tty"), ("WAYLAND_DISPLAY", "wayland-1")]);
        assert_eq!(d.detect(), DisplayServer::Wayland);

        let d = detector(&[("DISPLAY", ":0")]);
        assert_eq!(d.detect(), DisplayServer::X11);

        let d = detector(&[("DISPLAY", "")]);
        assert_eq!(d.detect(), DisplayServer::Unknown);
    }

    #[test]
    fn test_result_is_cached_until_invalidated() {
        let probes = Arc::new(AtomicUsize::new(0));
        let counter = probes.clone();
        let d = DisplayServerDetector::with_env(move |key| {
            if key == "XDG_SESSION_TYPE" {
                counter.fetch_add(1, Ordering::SeqCst);
                Some("x11".to_string())
            } else {
                None
            }
        });

        d.detect();
        d.detect();
        assert_eq!(probes.load(Ordering::SeqCst), 1);

        d.invalidate();
        d.detect();
        assert_eq!(probes.load(Ordering::SeqCst), 2);
    }
}
