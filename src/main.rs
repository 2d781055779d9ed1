//! Gaswatch - real-time multi-chain gas dashboard backend
//!
//! Two generators (gas every 15s, ETH/USD every 30s) feed a bounded in-memory
//! store; every new sample is pushed to WebSocket viewers, and the same data
//! is served over REST.

use anyhow::{Context, Result};
use dotenv::dotenv;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gaswatch_backend::{
    api::{create_router, AppState},
    config::{AppConfig, GasSourceKind},
    fanout::FanoutHub,
    feeds::{Generator, RpcGasSource, SampleSource, SyntheticGasSource, SyntheticPriceSource},
    storage::SeriesStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    init_tracing();

    let config = AppConfig::from_env().context("Invalid configuration")?;
    info!("🚀 Gaswatch starting");
    info!(
        retention = config.retention_cap,
        gas_poll_secs = config.gas_poll_secs,
        price_poll_secs = config.price_poll_secs,
        gas_source = ?config.gas_source,
        "Configuration loaded"
    );

    let store = Arc::new(SeriesStore::new(config.retention_cap));
    let hub = FanoutHub::new(
        store.clone(),
        config.subscriber_queue,
        config.fallback_eth_price,
    );

    let gas_source: Arc<dyn SampleSource> = match config.gas_source {
        GasSourceKind::Synthetic => Arc::new(SyntheticGasSource::new(config.gas_seed)),
        GasSourceKind::Rpc => {
            let rpc = RpcGasSource::from_env();
            warn!(
                endpoints = rpc.endpoints().len(),
                "🔌 Live RPC gas source selected but disabled; gas ticks will be skipped"
            );
            Arc::new(rpc)
        }
    };
    let price_source = Arc::new(SyntheticPriceSource::new(
        config.price_walk,
        config.price_seed,
    ));

    let gas_generator = Generator::new(gas_source, store.clone(), hub.clone(), config.gas_period());
    let price_generator = Generator::new(
        price_source,
        store.clone(),
        hub.clone(),
        config.price_period(),
    );
    gas_generator.start();
    price_generator.start();

    let state = AppState::new(hub, config.ws_send_timeout());
    let app = create_router(state);

    let listener = TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    info!("🎯 API server listening on {}", config.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    gas_generator.stop();
    price_generator.stop();
    info!("Gaswatch stopped");
    Ok(())
}

/// Initialize tracing with env-filter control
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gaswatch_backend=debug,gaswatch=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_env() {
    // Standard dotenv search (cwd + parents), then the crate directory
    let _ = dotenv();
    let manifest_env = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    if manifest_env.exists() {
        let _ = dotenv::from_path(&manifest_env);
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
