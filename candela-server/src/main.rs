use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;

use candela::{Candela, ProcessLock};
use candela_binance::BinanceClient;
use candela_core::CsvStore;
use candela_server::{AppState, ServerConfig, bootstrap, router};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cfg = ServerConfig::from_env()?;
    bootstrap::prepare_data_dir(&cfg.data_dir)?;
    // Held until main returns.
    let _lock = ProcessLock::acquire(&cfg.data_dir)?;
    if cfg.cleanup {
        let removed = bootstrap::cleanup(&cfg.data_dir, &cfg.sync)?;
        if !removed.is_empty() {
            tracing::info!(count = removed.len(), "data directory cleaned");
        }
    }

    let store = Arc::new(CsvStore::create(&cfg.data_dir)?);
    let client = Arc::new(BinanceClient::new_default().with_base_url(cfg.exchange_url.clone()));
    let mut builder = Candela::builder()
        .config(cfg.sync.clone())
        .client(client)
        .store(store);
    if let Some(quota) = cfg.rate_limit.clone() {
        builder = builder.quota(quota);
    }
    let candela = Arc::new(builder.build()?);

    let catalog = candela.catalog();
    let handle = Arc::clone(&candela).spawn();
    let state = AppState::with_reports(catalog, handle.subscribe());

    let addr: SocketAddr = format!("{}:{}", cfg.bind, cfg.port).parse()?;
    tracing::info!(
        %addr,
        data_dir = %cfg.data_dir.display(),
        symbols = cfg.sync.symbols.len(),
        "candela server listening"
    );
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    handle.stop().await;
    tracing::info!("synchronizer stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received, stopping");
}
