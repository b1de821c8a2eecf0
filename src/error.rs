use thiserror::Error;

use crate::platform::WindowHandle;

#[derive(Error, Debug)]
pub enum GlanceError {
    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backend cannot perform this operation at all (e.g. live mirroring on X11).
    #[error("Operation not supported by the {backend} backend: {operation}")]
    Unsupported {
        backend: &'static str,
        operation: &'static str,
    },

    /// The window went away between lookup and use.
    #[error("Window {0} no longer exists")]
    WindowGone(WindowHandle),

    #[error("Native call failed: {0}")]
    Native(String),

    #[error("Failed to inspect process {pid}: {reason}")]
    Enumeration { pid: u32, reason: String },

    #[error("Backend initialization failed: {0}")]
    Initialization(String),

    #[error("Invalid hotkey '{spec}': {reason}")]
    HotkeyParse { spec: String, reason: String },

    #[error("Hotkey id space exhausted ({max} ids starting at {base})")]
    HotkeyIdsExhausted { base: i32, max: usize },

    #[error("Hotkey registration failed: {0}")]
    HotkeyRegistration(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl GlanceError {
    pub fn unsupported<T>(backend: &'static str, operation: &'static str) -> Result<T> {
        Err(GlanceError::Unsupported { backend, operation })
    }

    pub fn native(msg: impl Into<String>) -> Self {
        GlanceError::Native(msg.into())
    }

    /// Unsupported capability, transient native failure or enumeration failure.
    /// These are degraded silently rather than reported to the user.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            GlanceError::Unsupported { .. }
                | GlanceError::WindowGone(_)
                | GlanceError::Native(_)
                | GlanceError::Enumeration { .. }
        )
    }
}

#[cfg(target_os = "linux")]
mod x11_conversions {
    use super::GlanceError;

    impl From<x11rb::errors::ConnectError> for GlanceError {
        fn from(e: x11rb::errors::ConnectError) -> Self {
            GlanceError::Initialization(format!("X11: {}", e))
        }
    }

    impl From<x11rb::errors::ConnectionError> for GlanceError {
        fn from(e: x11rb::errors::ConnectionError) -> Self {
            GlanceError::Native(format!("X11 connection: {}", e))
        }
    }

    impl From<x11rb::errors::ReplyError> for GlanceError {
        fn from(e: x11rb::errors::ReplyError) -> Self {
            GlanceError::Native(format!("X11 reply: {}", e))
        }
    }

    impl From<x11rb::errors::ReplyOrIdError> for GlanceError {
        fn from(e: x11rb::errors::ReplyOrIdError) -> Self {
            GlanceError::Native(format!("X11: {}", e))
        }
    }
}

#[cfg(windows)]
impl From<windows::core::Error> for GlanceError {
    fn from(e: windows::core::Error) -> Self {
        GlanceError::Native(format!("Win32: {}", e))
    }
}

pub type Result<T> = std::result::Result<T, GlanceError>;

#[macro_export]
macro_rules! glance_error {
    (native, $($arg:tt)*) => {
        $crate::error::GlanceError::Native(format!($($arg)*))
    };
    (init, $($arg:tt)*) => {
        $crate::error::GlanceError::Initialization(format!($($arg)*))
    };
    (invalid_state, $($arg:tt)*) => {
        $crate::error::GlanceError::InvalidState(format!($($arg)*))
    };
    (service_unavailable, $($arg:tt)*) => {
        $crate::error::GlanceError::ServiceUnavailable(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_errors_are_classified() {
        let unsupported: Result<()> = GlanceError::unsupported("x11", "live thumbnail");
        assert!(unsupported.unwrap_err().is_expected());
        assert!(GlanceError::WindowGone(WindowHandle::new(crate::platform::BackendKind::DryRun, 7)).is_expected());
        assert!(GlanceError::Enumeration { pid: 1, reason: "denied".into() }.is_expected());

        assert!(!GlanceError::Initialization("no display".into()).is_expected());
        assert!(!GlanceError::HotkeyIdsExhausted { base: 9000, max: 2 }.is_expected());
    }

    #[test]
    fn test_error_macro() {
        let err = glance_error!(invalid_state, "already {}", "registered");
        assert_eq!(err.to_string(), "Invalid state: already registered");
    }
}
