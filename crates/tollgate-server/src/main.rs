//! Tollgate server entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tollgate_db::{DbManager, MemoryStore};
use tollgate_server::bootstrap::ensure_bootstrap;
use tollgate_server::maintenance::spawn_sweeper;
use tollgate_server::{
    AppState, Backend, HttpModelInvoker, Repositories, ServerConfig, StoreKind, router,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("tollgate=info,tollgate_server=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .init();

    let config = ServerConfig::from_env().context("invalid configuration")?;
    let model_url = config
        .model_url
        .clone()
        .context("TOLLGATE_MODEL_URL must be set")?;
    let invoker = HttpModelInvoker::new(&model_url, config.model_timeout())?;

    info!(
        listen_addr = %config.listen_addr,
        store = ?config.store,
        model_url = %model_url,
        "Starting Tollgate control plane"
    );

    match config.store {
        StoreKind::Memory => {
            let repos = Repositories::memory(MemoryStore::new());
            serve(repos, invoker, config).await
        }
        StoreKind::Surreal => {
            let db = DbManager::connect(&config.db)
                .await
                .context("failed to open SurrealDB")?;
            let repos = Repositories::surreal(db.client());
            serve(repos, invoker, config).await
        }
    }
}

async fn serve<B: Backend>(
    repos: Repositories<B>,
    invoker: HttpModelInvoker,
    config: ServerConfig,
) -> anyhow::Result<()> {
    let state = Arc::new(AppState::new(repos, invoker, &config)?);

    if let Some(bootstrap) = &config.bootstrap {
        let tenant = ensure_bootstrap(&*state, bootstrap)
            .await
            .context("bootstrap failed")?;
        info!(tenant_id = %tenant.id, slug = %tenant.slug, "Bootstrap tenant ready");
    }

    let sweeper = spawn_sweeper(Arc::clone(&state), config.sweep_interval());
    let app = router(state);

    let listener = TcpListener::bind(&config.listen_addr).await?;
    info!(listen_addr = %config.listen_addr, "Tollgate listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    sweeper.abort();
    info!("Tollgate stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
