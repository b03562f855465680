use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::Result;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use anomaly_image_cache::application::{BatchMode, ImageCache};
use anomaly_image_cache::domain::DurableStorePort;
use anomaly_image_cache::infrastructure::{
    AppConfig, CliArgs, Command, FileStore, HttpImageSource, MemoryStore, StorageManager,
};

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));

    if let Some(log_path) = config.effective_log_path() {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();

        info!(path = %log_path.display(), "Logging initialized");
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    Ok(())
}

fn load_config(args: &CliArgs) -> Result<AppConfig> {
    let storage = match args.config.as_deref() {
        Some(path) => StorageManager::with_dir(
            path.parent()
                .map(std::path::Path::to_path_buf)
                .unwrap_or_default(),
        ),
        None => StorageManager::new()?,
    };
    let mut config = storage.load_config(args.config.as_deref())?;
    config.merge_with_args(args);
    Ok(config)
}

async fn create_cache(config: &AppConfig) -> Result<ImageCache> {
    let source = Arc::new(HttpImageSource::new(config.http.to_source_config())?);
    let store: Arc<dyn DurableStorePort> = if config.ephemeral {
        info!("Using in-memory store");
        Arc::new(MemoryStore::new())
    } else {
        let store = config
            .store_dir
            .clone()
            .map_or_else(FileStore::default_location, FileStore::new);
        info!(dir = %store.dir().display(), "Using durable store");
        Arc::new(store)
    };

    let cache = ImageCache::create(config.cache.to_settings(), source, store).await;
    let restored = cache.wait_for_restore().await;
    info!(restored, "Image cache ready");
    Ok(cache)
}

async fn run(cache: &ImageCache, command: Command) {
    match command {
        Command::Preload { urls, sequential } => {
            let mode = if sequential {
                BatchMode::Sequential
            } else {
                BatchMode::Parallel
            };
            let report = cache.preload_many(&urls, mode).await;
            println!("Loaded {} of {} images", report.loaded, urls.len());
            for url in &report.failed {
                println!("  failed: {url}");
            }
        }
        Command::Status => {
            let cached = cache.cached_urls();
            println!("Persisted ({}):", cache.persisted_urls().len());
            for url in cache.persisted_urls() {
                let state = if cached.contains(url) { "restored" } else { "not restored" };
                println!("  {url} [{state}]");
            }
            println!("Cached ({}):", cached.len());
            for url in &cached {
                println!("  {url}");
            }
        }
        Command::Remove { urls } => {
            let removed = cache.remove_many(&urls);
            println!("Removed {removed} images");
        }
        Command::Clear => {
            cache.clear().await;
            println!("Cache cleared");
        }
    }
    println!("{}", cache.stats());
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = CliArgs::parse();
    let config = load_config(&args)?;

    init_logging(&config)?;

    info!(version = anomaly_image_cache::VERSION, "Starting anomaly-cache");

    let cache = create_cache(&config).await?;
    run(&cache, args.command).await;
    cache.dispose().await;

    Ok(())
}
