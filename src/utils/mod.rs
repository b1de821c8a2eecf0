use std::thread::JoinHandle;
use std::time::{Duration, Instant};

// Conditional logging macros for hot paths
#[macro_export]
macro_rules! debug_if_enabled {
    ($($arg:tt)*) => {
        if tracing::enabled!(tracing::Level::DEBUG) {
            tracing::debug!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! trace_if_enabled {
    ($($arg:tt)*) => {
        if tracing::enabled!(tracing::Level::TRACE) {
            tracing::trace!($($arg)*);
        }
    };
}

const JOIN_POLL: Duration = Duration::from_millis(10);

/// Join a native thread, giving up after `timeout`.
///
/// Returns `false` if the thread was still running at the deadline; it is then
/// left detached.
pub fn join_with_timeout<T>(handle: JoinHandle<T>, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(JOIN_POLL);
    }
    if handle.join().is_err() {
        tracing::warn!("Joined thread had panicked");
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_with_timeout() {
        let quick = std::thread::spawn(|| ());
        assert!(join_with_timeout(quick, Duration::from_secs(1)));

        let (tx, rx) = std::sync::mpsc::channel::<()>();
        let stuck = std::thread::spawn(move || {
            let _ = rx.recv();
        });
        assert!(!join_with_timeout(stuck, Duration::from_millis(30)));
        drop(tx);
    }
}
