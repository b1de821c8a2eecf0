use crate::error::Result;
use crate::glance_error;
use crate::platform::PlatformBackend;
use crate::utils::join_with_timeout;
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// Native message queue drain interval while idle.
const PUMP_INTERVAL: Duration = Duration::from_millis(16);

type Job = Box<dyn FnOnce(&Arc<dyn PlatformBackend>) + Send>;

enum UiMessage {
    Job(Job),
    Shutdown,
}

/// Cloneable handle for posting work to the UI thread.
#[derive(Clone)]
pub struct UiDispatcher {
    tx: mpsc::Sender<UiMessage>,
}

impl UiDispatcher {
    /// Queue `job` without waiting for it.
    pub fn post<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce(&Arc<dyn PlatformBackend>) + Send + 'static,
    {
        self.tx
            .send(UiMessage::Job(Box::new(job)))
            .map_err(|_| glance_error!(service_unavailable, "UI thread has stopped"))
    }

    /// Run `job` on the UI thread and wait for its result.
    pub async fn invoke<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&Arc<dyn PlatformBackend>) -> T + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.post(move |backend| {
            let _ = reply_tx.send(job(backend));
        })?;
        reply_rx
            .await
            .map_err(|_| glance_error!(service_unavailable, "UI job was dropped"))
    }
}

/// The single thread that owns window creation and mutation.
pub struct UiThread {
    dispatcher: UiDispatcher,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl UiThread {
    pub fn spawn(backend: Arc<dyn PlatformBackend>) -> Result<Self> {
        let (tx, rx) = mpsc::channel::<UiMessage>();

        let handle = std::thread::Builder::new()
            .name("eve-glance-ui".to_string())
            .spawn(move || {
                info!("UI thread started ({} backend)", backend.kind());
                loop {
                    // Jobs run in arrival order; idle ticks still drain native events
                    match rx.recv_timeout(PUMP_INTERVAL) {
                        Ok(UiMessage::Job(job)) => {
                            // A panicking job must not take the window owner down with it
                            if catch_unwind(AssertUnwindSafe(|| job(&backend))).is_err() {
                                error!("Panic in UI job");
                            }
                            backend.pump_events();
                        }
                        // Shutdown is queued behind pending jobs, so they finish first
                        Ok(UiMessage::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                        Err(RecvTimeoutError::Timeout) => backend.pump_events(),
                    }
                }
                debug!("UI thread finished");
            })?;

        Ok(Self {
            dispatcher: UiDispatcher { tx },
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn dispatcher(&self) -> UiDispatcher {
        self.dispatcher.clone()
    }

    /// Stop after queued jobs have run. Idempotent.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        let Some(handle) = self.handle.lock().take() else {
            return true;
        };
        // The loop may already be gone if every sender dropped
        let _ = self.dispatcher.tx.send(UiMessage::Shutdown);
        let joined = join_with_timeout(handle, timeout);
        if !joined {
            warn!("UI thread did not stop within {:?}", timeout);
        }
        joined
    }
}

impl Drop for UiThread {
    fn drop(&mut self) {
        self.shutdown(Duration::from_secs(1));
    }
}
