//! # MakrX Dispatcher
//!
//! Offers pending service orders to providers and expires unanswered offers.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p makrx-dispatcher
//! ```
//!
//! Several dispatchers may run against the same database.

use makrx_dispatcher::config::DispatcherConfig;
use makrx_dispatcher::orchestrator::{DispatchOrchestrator, OrchestratorConfig};
use makrx_shared::db::pool::{close_pool, create_pool, DatabaseConfig};
use makrx_shared::dispatch::DispatchService;
use makrx_shared::integration::{HttpStoreSync, NoopStoreSync, StoreSync};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    tracing::info!("MakrX Dispatcher v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = DispatcherConfig::from_env()?;

    let pool = create_pool(DatabaseConfig {
        url: config.database_url.clone(),
        max_connections: config.max_connections,
        ..DatabaseConfig::default()
    })
    .await?;

    let store_sync: Arc<dyn StoreSync> = match &config.store_sync_url {
        Some(url) => Arc::new(HttpStoreSync::new(url, config.store_sync_timeout())?),
        None => Arc::new(NoopStoreSync),
    };

    let dispatch = DispatchService::new(pool.clone(), store_sync).with_retry(config.retry_policy());
    let orchestrator = DispatchOrchestrator::new(pool.clone(), dispatch, OrchestratorConfig::from(&config));

    let shutdown = orchestrator.shutdown_token();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Shutdown signal received, finishing current cycle..."),
            Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signal"),
        }
        shutdown.cancel();
    });

    orchestrator.run().await;

    close_pool(pool).await;
    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "makrx_dispatcher=debug,makrx_shared=debug".into());

    let json = std::env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false);
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
