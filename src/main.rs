use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use mcp_meta_server::cache::ResultCache;
use mcp_meta_server::cli::Cli;
use mcp_meta_server::discovery;
use mcp_meta_server::inventory::Inventory;
use mcp_meta_server::metrics::MetricsStore;
use mcp_meta_server::registry::ProviderRegistry;
use mcp_meta_server::server::MetaServer;

/// Interval for the cache's periodic TTL adaptation pass.
const CACHE_ADAPT_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(cli.log_level.as_str()),
    )
    .init();

    // Startup failures (an unreadable --config) are fatal; individual bad
    // provider configs are only logged.
    let cli_configs = match &cli.config {
        Some(path) => discovery::load_cli_configs(path)?,
        None => Vec::new(),
    };
    let configs = discovery::discover_providers(cli_configs);
    if configs.is_empty() {
        log::warn!("no provider configs discovered; serving meta-tools only");
    }

    // Cancellation token shared by the upstream session, the dispatchers,
    // and the signal handler.
    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        wait_for_interrupt().await;
        log::info!("interrupt received, shutting down");
        signal_token.cancel();
    });

    let metrics = Arc::new(MetricsStore::new());
    let cache = Arc::new(ResultCache::new());
    let inventory = Arc::new(Inventory::new(cli.dedup_config()));
    let registry = Arc::new(ProviderRegistry::new(metrics.clone(), shutdown.clone()));

    for config in configs {
        let id = config.id.clone();
        if let Err(e) = registry.register(config) {
            log::warn!("dropping provider '{id}': {e}");
        }
    }

    log::info!(
        "connecting to {} configured provider(s)",
        registry.provider_ids().len()
    );
    registry.connect_all().await;

    let server = MetaServer::new(
        registry.clone(),
        metrics,
        cache.clone(),
        inventory,
        shutdown.clone(),
    );
    server.rebuild_inventory();

    // Periodic cache maintenance: expired-entry sweep and TTL adaptation.
    let adapt_cache = cache.clone();
    let adapt_token = shutdown.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(CACHE_ADAPT_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => adapt_cache.adapt(),
                _ = adapt_token.cancelled() => break,
            }
        }
    });

    server.serve_stdio().await?;

    registry.shutdown().await;
    log::info!("shutdown complete");
    Ok(())
}

/// Wait for an interrupt signal (cross-platform).
#[cfg(unix)]
async fn wait_for_interrupt() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate());
    let mut sigint = signal(SignalKind::interrupt());

    match (sigterm.as_mut(), sigint.as_mut()) {
        (Ok(sigterm), Ok(sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {}
                _ = sigint.recv() => {}
            }
        }
        (Ok(sigterm), Err(_)) => {
            let _ = sigterm.recv().await;
        }
        (Err(_), Ok(sigint)) => {
            let _ = sigint.recv().await;
        }
        (Err(_), Err(_)) => {
            let () = std::future::pending().await;
        }
    }
}

/// Wait for an interrupt signal (cross-platform).
#[cfg(windows)]
async fn wait_for_interrupt() {
    use tokio::signal::windows;

    match windows::ctrl_c() {
        Ok(mut ctrl_c) => {
            let _ = ctrl_c.recv().await;
        }
        Err(_) => {
            let () = std::future::pending().await;
        }
    }
}
