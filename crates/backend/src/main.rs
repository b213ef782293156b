//! Commity backend binary.
//!
//! Usage: `commity-backend [config.toml]`. Without a file the defaults
//! apply; `COMMITY_*` environment variables override either.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use commity_backend::{
    router, AppState, ChainExecutor, Indexer, JsonRpcEventSource, JsonRpcExecutor, LocalChain, ProjectionStore,
    PushHub, Sponsor,
};
use commity_common::config::load_backend_config;
use commity_common::crypto::{generate_keypair_bytes, signing_key_from_bytes, signing_key_from_hex};
use commity_common::BackendConfig;

const RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// `rpc_url` value selecting the in-process chain.
const LOCAL_CHAIN: &str = "local";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut config = match std::env::args().nth(1) {
        Some(path) => load_backend_config(&path).with_context(|| format!("loading {}", path))?,
        None => BackendConfig::default(),
    };
    config.apply_env()?;

    let package = config.network.package()?;
    let module = config.network.module.clone();
    let key = match &config.sponsor_key_hex {
        Some(hex) => signing_key_from_hex(hex).context("sponsor key")?,
        None => {
            warn!("no sponsor key configured, using an ephemeral key");
            signing_key_from_bytes(&generate_keypair_bytes())?
        }
    };

    let store = Arc::new(ProjectionStore::new());
    let hub = PushHub::default();
    let indexer = Arc::new(Indexer::new(Arc::clone(&store), hub.clone(), package.clone(), &module));

    let (executor, indexer_handle) = if config.rpc_url == LOCAL_CHAIN {
        info!("using in-process chain");
        let chain: Arc<dyn ChainExecutor> = Arc::new(LocalChain::new(Arc::clone(&indexer)));
        (chain, None)
    } else {
        let source = Arc::new(JsonRpcEventSource::new(&config.rpc_url, package.clone(), &module, RPC_TIMEOUT)?);
        let handle = Arc::clone(&indexer).spawn(source, Duration::from_millis(config.index_interval_ms));
        let chain: Arc<dyn ChainExecutor> = Arc::new(JsonRpcExecutor::new(&config.rpc_url, RPC_TIMEOUT)?);
        (chain, Some(handle))
    };

    let sponsor = Arc::new(Sponsor::new(
        key,
        package.clone(),
        &module,
        config.gas_budget,
        config.gas_price,
        executor,
    ));

    let sponsor_address = sponsor.address().clone();
    let app = router(AppState::new(store, hub, sponsor));

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    info!(
        addr = %config.bind_addr,
        package = %package,
        module = %module,
        sponsor = %sponsor_address,
        "commity backend listening"
    );

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            if let Err(e) = result {
                error!(error = %e, "server error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    if let Some(handle) = indexer_handle {
        handle.shutdown().await;
    }
    info!("backend shutdown complete");
    Ok(())
}
