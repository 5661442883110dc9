use std::sync::Arc;

use color_eyre::eyre::Result;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use hyperproxy::application::ImagePipeline;
use hyperproxy::domain::ports::{CacheSizeObserver, TransformBackend};
use hyperproxy::infrastructure::cache::sweeper;
use hyperproxy::infrastructure::config::{FETCH_TIMEOUT, USER_AGENT};
use hyperproxy::infrastructure::{
    AppConfig, DiskCache, ImageEngine, LoggingCacheSizeObserver, OriginFetcher, SsrfGuard,
};
use hyperproxy::presentation;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_logging();

    let config = AppConfig::from_env();
    info!(
        version = hyperproxy::VERSION,
        port = config.port,
        cache = %config.cache_path.display(),
        "starting hyperproxy"
    );

    let cache = Arc::new(DiskCache::new(&config.cache_path, config.max_cache_size));

    let backend = Arc::new(ImageEngine::new());
    backend.init(config.transform_memory_limit)?;

    let fetcher = OriginFetcher::new(FETCH_TIMEOUT, USER_AGENT)?;
    let guard = SsrfGuard::with_default_deny();

    let pipeline = Arc::new(ImagePipeline::new(
        Arc::clone(&cache),
        guard,
        fetcher,
        backend,
        &config,
    ));

    let observer: Arc<dyn CacheSizeObserver> = Arc::new(LoggingCacheSizeObserver);
    sweeper::spawn(cache, observer);

    let app = presentation::router(pipeline);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
