mod cache;
mod config;
mod favicon;
mod models;
mod parser;
mod routes;
mod source;
mod view;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cache::{start_refresh_worker, FeedCache};
use crate::config::Config;
use crate::parser::FeedParser;
use crate::routes::AppState;
use crate::source::file_source_from_config;
use crate::view::HomePageService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "feedmux=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration, falling back to defaults when absent
    let config = match Config::load("feedmux.toml") {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "no usable feedmux.toml, using default configuration");
            Config::default()
        }
    };
    info!(feed_file = %config.feed_file, "configuration loaded");

    // Compose the pipeline: source -> parser -> cache
    let source = Arc::new(file_source_from_config(
        &config.feed_file,
        config.seed_file.as_deref(),
    ));
    let cache = Arc::new(FeedCache::with_ttls(
        FeedParser::new(),
        source,
        Duration::from_secs(config.cache_ttl * 60),
        Duration::from_secs(config.error_cache_ttl * 60),
    ));

    // Refresh worker: interval ticks plus external refresh signals
    let (refresh_tx, refresh_rx) = mpsc::channel(8);
    tokio::spawn(start_refresh_worker(
        cache.clone(),
        refresh_rx,
        Duration::from_secs(config.refresh_interval * 60),
    ));

    // Create app state
    let state = Arc::new(AppState {
        view: HomePageService::new(cache.clone(), config.entries_per_page),
        cache: cache.clone(),
        refresh_tx,
    });

    // Build router
    let app = routes::router(state).layer(TraceLayer::new_for_http());

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("server starting on http://{}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
