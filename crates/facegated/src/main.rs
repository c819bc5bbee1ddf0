use anyhow::Result;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod decode;
mod engine;
mod error;
mod identity;

use api::AppState;
use config::Config;
use identity::FaceIdentity;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env();
    tracing::info!(
        store = %config.model.store_address,
        store_kind = %config.model.store_kind,
        model = %config.model.model_name,
        model_dir = %config.model_dir.display(),
        "facegated starting"
    );

    let engine = engine::spawn_engine(
        config.detector_model_path(),
        config.representer_model_path(),
        config.model.model_name,
    )?;
    let service = FaceIdentity::new(engine, reqwest::Client::new(), config.search_limit);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "facegated ready");

    let state = AppState {
        service: Arc::new(service),
        config: Arc::new(config),
    };
    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("facegated shutting down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
