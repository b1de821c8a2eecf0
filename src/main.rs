use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};

use eve_glance::config::Config;
use eve_glance::platform::dry_run::seed_clients;
use eve_glance::platform::{
    create_backend, create_process_table, BackendMode, DisplayServerDetector, DryRunBackend, DryRunProcessTable,
    PlatformBackend, ProcessTable,
};
use eve_glance::services::{
    create_hotkey_source, ConfigProfile, HotkeyRegistry, ProfileSource, ThumbnailReconciler, UiThread,
};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "eve-glance")]
#[command(about = "Live previews of game client windows with hotkey cycling between them")]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "eve-glance.toml")]
    config: String,

    /// Run against fake in-memory windows
    #[arg(long)]
    dry_run: bool,

    /// Log filter, overrides logging.level and logging.filter
    #[arg(long)]
    log_level: Option<String>,

    /// Window backend: auto, windows, x11, wayland or dry-run
    #[arg(long)]
    backend: Option<BackendMode>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load(&args.config)?;
    // --log-level, else logging.level plus logging.filter; RUST_LOG still wins
    let filter = args.log_level.clone().unwrap_or_else(|| config.logging.directive());
    init_tracing(&filter, &config.logging.format)?;

    info!("Starting eve-glance v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded from: {}", args.config);

    if args.dry_run {
        config.backend.mode = BackendMode::DryRun;
    } else if let Some(mode) = args.backend {
        config.backend.mode = mode;
    }

    // Window backend and process table, then the UI thread that owns all window mutation
    let (backend, processes) = build_platform(&config)?;
    let profile = Arc::new(ConfigProfile::new(config.clone()));

    let ui = UiThread::spawn(backend.clone())?;
    let reconciler = Arc::new(ThumbnailReconciler::new(
        backend.clone(),
        processes,
        profile.clone(),
        ui.dispatcher(),
        Duration::from_millis(config.reconciler.poll_interval_ms),
    ));
    // Subscribe before the first scan so no Added event is missed
    let mut thumbnail_events = reconciler.subscribe();
    reconciler.start();

    // Hotkeys need the reconciler to map presses onto tracked windows
    let (hotkey_tx, hotkey_rx) = tokio::sync::mpsc::unbounded_channel();
    let source = create_hotkey_source(backend.kind(), hotkey_tx)?;
    let registry = Arc::new(HotkeyRegistry::new(
        source,
        backend.clone(),
        ui.dispatcher(),
        reconciler.clone(),
        &config.hotkeys,
    ));
    report_registration(&registry.register_groups(&config.groups));
    registry.start(hotkey_rx);

    info!("All services started");

    let events_handle = tokio::spawn(async move {
        while let Ok(event) = thumbnail_events.recv().await {
            info!("{}", event);
        }
    });

    // Profile changes re-register hotkeys and reposition thumbnails
    let profile_handle = {
        let profile = profile.clone();
        let reconciler = reconciler.clone();
        let registry = registry.clone();
        tokio::spawn(async move {
            let mut changes = profile.subscribe();
            while changes.changed().await.is_ok() {
                let config = profile.snapshot();
                registry.set_animation(config.hotkeys.animation);
                report_registration(&registry.reregister(&profile.groups().await));
                if let Err(e) = reconciler.resync().await {
                    warn!("Resync after profile change failed: {}", e);
                }
            }
        })
    };

    let reload_handle = spawn_reload_on_sighup(args.config.clone(), profile.clone());

    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C"),
        Err(err) => error!("Failed to wait for the shutdown signal: {}", err),
    }

    info!("Shutting down...");
    profile_handle.abort();
    if let Some(handle) = reload_handle {
        handle.abort();
    }

    // Hotkeys first so no press lands on a half torn down reconciler
    let shutdown_result = tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        registry.stop(SHUTDOWN_TIMEOUT).await;
        reconciler.stop(SHUTDOWN_TIMEOUT).await;
        let _ = events_handle.await;
    })
    .await;

    match shutdown_result {
        Ok(_) => info!("All services stopped"),
        Err(_) => warn!("Timed out while stopping services"),
    }

    // Last, after every teardown job has been queued
    if !ui.shutdown(SHUTDOWN_TIMEOUT) {
        warn!("UI thread did not stop in time");
    }

    info!("eve-glance stopped");
    Ok(())
}

fn build_platform(config: &Config) -> Result<(Arc<dyn PlatformBackend>, Arc<dyn ProcessTable>)> {
    if config.backend.mode == BackendMode::DryRun {
        warn!("Dry-run mode: fake clients only, no real windows are touched");
        let backend = Arc::new(DryRunBackend::new());
        let table = Arc::new(DryRunProcessTable::new());
        seed_clients(&backend, &table, &config.reconciler.processes);
        let backend: Arc<dyn PlatformBackend> = backend;
        let table: Arc<dyn ProcessTable> = table;
        return Ok((backend, table));
    }

    let detector = DisplayServerDetector::new();
    let backend = create_backend(config.backend.mode, &detector).context("No usable window backend")?;
    let processes = create_process_table(backend.kind());
    Ok((backend, processes))
}

fn report_registration(report: &eve_glance::services::hotkey::RegistrationReport) {
    info!(
        "Registered {} hotkeys ({} failed)",
        report.registered,
        report.failures.len()
    );
    if report.exhausted {
        error!("Hotkey id range exhausted; raise hotkeys.max_ids");
    }
}

#[cfg(unix)]
fn spawn_reload_on_sighup(path: String, profile: Arc<ConfigProfile>) -> Option<tokio::task::JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(hangup) => hangup,
        Err(e) => {
            warn!("SIGHUP reload unavailable: {}", e);
            return None;
        }
    };

    Some(tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            match Config::load(&path) {
                Ok(config) => {
                    info!("Reloaded configuration from {}", path);
                    profile.replace(config);
                }
                Err(e) => error!("Keeping previous configuration: {:#}", e),
            }
        }
    }))
}

#[cfg(not(unix))]
fn spawn_reload_on_sighup(_path: String, _profile: Arc<ConfigProfile>) -> Option<tokio::task::JoinHandle<()>> {
    None
}

fn init_tracing(filter: &str, format: &str) -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(filter))?;

    let registry = tracing_subscriber::registry().with(filter);
    if format == "full" {
        registry.with(tracing_subscriber::fmt::layer()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().compact()).init();
    }

    Ok(())
}
