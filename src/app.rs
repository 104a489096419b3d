use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::core::{
    config::ConfigManager,
    error::AppError,
    mention::{LogDispatcher, MentionEngine, NeverInCombat},
    service::MentionService,
    storage::{self, StorageBackend},
    sweeper,
};

const CONFIG_DIR_ENV: &str = "MENTION_NOTIFIER_CONFIG_DIR";

fn init_logging() {
    // RUST_LOG, or info
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

pub fn run() -> Result<(), AppError> {
    init_logging();

    // Initialize Config
    let config_dir = std::env::var_os(CONFIG_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let config_manager = ConfigManager::new(config_dir);
    let settings = config_manager.load();
    settings.validate()?;

    // Storage is opened outside the async runtime: the MySQL adapter drives its
    // own runtime and must not be started from inside another one.
    let storage: Arc<dyn StorageBackend> = Arc::from(storage::open_backend(&settings.storage));
    if !storage.load() || !storage.check_schema() {
        storage.unload();
        return Err(AppError::Storage(storage.name()));
    }

    let engine = Arc::new(MentionEngine::new(
        storage.clone(),
        &settings,
        Arc::new(NeverInCombat),
        Arc::new(LogDispatcher),
    ));
    let service = MentionService::new(engine, settings.mentions.storage_workers);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let sweep_period = Duration::from_secs(settings.mentions.sweep_interval_seconds);

    runtime.block_on(async {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let sweeper = sweeper::spawn_sweeper(service.engine().clone(), sweep_period, shutdown_rx);
        log::info!(
            "Mention notifier running on {} storage, press Ctrl-C to stop",
            storage.name()
        );

        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for shutdown signal: {}", e);
        }
        log::info!("Shutting down");

        let _ = shutdown_tx.send(true);
        if let Err(e) = sweeper.await {
            log::warn!("Sweeper ended abnormally: {}", e);
        }
    });

    // Let in-flight blocking storage calls finish before closing the backend
    runtime.shutdown_timeout(Duration::from_secs(5));
    storage.unload();
    Ok(())
}
