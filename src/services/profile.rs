use crate::config::{ClientGroup, Config, ThumbnailConfig};
use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::info;

/// Source of the user's active profile.
///
/// Every read reflects the current profile; `subscribe` yields a generation
/// counter that changes whenever the profile is replaced.
#[async_trait]
pub trait ProfileSource: Send + Sync {
    /// Watched process names, in configured order.
    async fn watched_processes(&self) -> Vec<String>;

    /// Per-title settings, falling back to the profile default.
    async fn thumbnail_config(&self, title: &str) -> ThumbnailConfig;

    async fn groups(&self) -> Vec<ClientGroup>;

    fn subscribe(&self) -> watch::Receiver<u64>;
}

/// Profile backed by the loaded configuration file.
pub struct ConfigProfile {
    config: RwLock<Config>,
    generation: watch::Sender<u64>,
}

impl ConfigProfile {
    pub fn new(config: Config) -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            config: RwLock::new(config),
            generation,
        }
    }

    /// Swap in a new configuration and notify subscribers.
    pub fn replace(&self, config: Config) {
        *self.config.write() = config;
        self.generation.send_modify(|g| *g += 1);
        info!("Profile replaced (generation {})", *self.generation.borrow());
    }

    pub fn generation(&self) -> u64 {
        *self.generation.borrow()
    }

    pub fn snapshot(&self) -> Config {
        self.config.read().clone()
    }
}

#[async_trait]
impl ProfileSource for ConfigProfile {
    async fn watched_processes(&self) -> Vec<String> {
        self.config.read().reconciler.processes.clone()
    }

    async fn thumbnail_config(&self, title: &str) -> ThumbnailConfig {
        self.config.read().thumbnail_for(title)
    }

    async fn groups(&self) -> Vec<ClientGroup> {
        self.config.read().groups.clone()
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        self.generation.subscribe()
    }
}
